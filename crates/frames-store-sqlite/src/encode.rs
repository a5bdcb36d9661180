//! Encoding and decoding helpers between frames domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, version statuses as their
//! lower-case names and list positions as `REAL`.

use chrono::{DateTime, Utc};
use frames_core::{FrameId, Position, RawSlot, SlotId, Version, VersionId, VersionStatus};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── VersionStatus ───────────────────────────────────────────────────────────

pub fn encode_status(status: VersionStatus) -> &'static str { status.as_str() }

pub fn decode_status(s: &str) -> Result<VersionStatus> {
  VersionStatus::parse(s).ok_or_else(|| Error::UnknownStatus(s.to_owned()))
}

// ─── Placeholders ────────────────────────────────────────────────────────────

/// `?, ?, ...` with `n` parameters, for `IN (...)` lists.
pub fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const VERSION_COLUMNS: &str =
  "version_id, name, status, description, creation_user, creation_timestamp";

/// Raw values read directly from a `versions` row.
pub struct RawVersion {
  pub version_id:         i64,
  pub name:               String,
  pub status:             String,
  pub description:        Option<String>,
  pub creation_user:      String,
  pub creation_timestamp: String,
}

impl RawVersion {
  /// Read a row selected with [`VERSION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:         row.get(0)?,
      name:               row.get(1)?,
      status:             row.get(2)?,
      description:        row.get(3)?,
      creation_user:      row.get(4)?,
      creation_timestamp: row.get(5)?,
    })
  }

  pub fn into_version(self) -> Result<Version> {
    Ok(Version {
      version_id:         VersionId(self.version_id),
      name:               self.name,
      status:             decode_status(&self.status)?,
      description:        self.description,
      creation_user:      self.creation_user,
      creation_timestamp: decode_dt(&self.creation_timestamp)?,
    })
  }
}

pub const SLOT_COLUMNS: &str = "slot_id, frame_id, name, slot_list_order, description, value";

/// Read a `slots` row selected with [`SLOT_COLUMNS`].
pub fn read_slot(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSlot> {
  Ok(RawSlot {
    slot_id:     SlotId(row.get(0)?),
    frame_id:    FrameId(row.get(1)?),
    name:        row.get(2)?,
    position:    row.get::<_, Option<f64>>(3)?.map(Position),
    description: row.get(4)?,
    value:       row.get(5)?,
  })
}
