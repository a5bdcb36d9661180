//! SQL schema for the frames SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS versions (
    version_id         INTEGER PRIMARY KEY,
    name               TEXT NOT NULL UNIQUE COLLATE NOCASE,
    status             TEXT NOT NULL DEFAULT 'proposed',   -- 'proposed' | 'final'
    description        TEXT,
    creation_user      TEXT NOT NULL,
    creation_timestamp TEXT NOT NULL,                      -- RFC 3339 UTC
    updated_user       TEXT,
    updated_timestamp  TEXT,
    CHECK (status IN ('proposed', 'final'))
);

-- version_id requires required_version_id: resolving under the first also
-- resolves under the second.
CREATE TABLE IF NOT EXISTS version_requires (
    version_id          INTEGER NOT NULL REFERENCES versions(version_id),
    required_version_id INTEGER NOT NULL REFERENCES versions(version_id),
    creation_user       TEXT NOT NULL,
    creation_timestamp  TEXT NOT NULL,
    PRIMARY KEY (version_id, required_version_id),
    CHECK (version_id != required_version_id)
);

-- Slot rows are never deleted; deletion writes the '<DELETED>' sentinel.
-- slot_list_order is NULL for scalar slots.
CREATE TABLE IF NOT EXISTS slots (
    slot_id            INTEGER PRIMARY KEY,
    frame_id           INTEGER NOT NULL,
    name               TEXT NOT NULL,
    slot_list_order    REAL,
    description        TEXT,
    value              TEXT NOT NULL,
    creation_user      TEXT NOT NULL,
    creation_timestamp TEXT NOT NULL,
    updated_user       TEXT,
    updated_timestamp  TEXT
);

CREATE TABLE IF NOT EXISTS slot_versions (
    slot_id            INTEGER NOT NULL REFERENCES slots(slot_id),
    version_id         INTEGER NOT NULL REFERENCES versions(version_id),
    creation_user      TEXT NOT NULL,
    creation_timestamp TEXT NOT NULL,
    PRIMARY KEY (slot_id, version_id)
);

CREATE INDEX IF NOT EXISTS slots_frame_idx        ON slots(frame_id, slot_list_order);
CREATE INDEX IF NOT EXISTS slots_name_idx         ON slots(upper(name));
CREATE INDEX IF NOT EXISTS slot_versions_ver_idx  ON slot_versions(version_id);
CREATE INDEX IF NOT EXISTS version_requires_r_idx ON version_requires(required_version_id);

PRAGMA user_version = 1;
";
