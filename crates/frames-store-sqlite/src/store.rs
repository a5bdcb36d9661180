//! [`SqliteStore`], the SQLite implementation of [`SlotStore`].

use std::{collections::BTreeSet, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, params, params_from_iter, types::Value as SqlValue};
use tracing::{debug, info};

use frames_core::{
  CandidateRow, FrameId, NewSlot, NewVersion, Position, RawSlot, SlotFilter, SlotId, SlotStore,
  SlotUpdate, Version, VersionId, VersionStatus,
};

use crate::{
  Error, Result,
  encode::{RawVersion, SLOT_COLUMNS, VERSION_COLUMNS, encode_dt, encode_status, placeholders, read_slot},
  schema::SCHEMA,
};

/// Upper bound on `IN (...)` list length per statement.
const IN_CHUNK: usize = 500;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A frames store backed by a single SQLite database.
pub struct SqliteStore {
  conn: rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = rusqlite::Connection::open(path)?;
    let store = Self { conn };
    store.init_schema()?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = rusqlite::Connection::open_in_memory()?;
    let store = Self { conn };
    store.init_schema()?;
    Ok(store)
  }

  fn init_schema(&self) -> Result<()> {
    self.conn.execute_batch(SCHEMA)?;
    Ok(())
  }

  /// Run `f` inside a savepoint, rolling back to it when `f` fails. Works
  /// both inside and outside an open transaction.
  fn with_savepoint<T>(&self, name: &str, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
    self.savepoint(name)?;
    match f(self) {
      Ok(value) => {
        self.release_savepoint(name)?;
        Ok(value)
      }
      Err(e) => {
        self.rollback_to_savepoint(name)?;
        Err(e)
      }
    }
  }

  fn version_by_name(&self, name: &str) -> Result<Option<Version>> {
    let raw = self
      .conn
      .query_row(
        &format!("SELECT {VERSION_COLUMNS} FROM versions WHERE name = ?1"),
        params![name],
        RawVersion::from_row,
      )
      .optional()?;
    raw.map(RawVersion::into_version).transpose()
  }
}

// ─── SlotStore impl ──────────────────────────────────────────────────────────

impl SlotStore for SqliteStore {
  type Error = Error;

  // ── Transactions ──────────────────────────────────────────────────────────

  fn begin(&self) -> Result<()> {
    self.conn.execute_batch("BEGIN")?;
    Ok(())
  }

  fn commit(&self) -> Result<()> {
    self.conn.execute_batch("COMMIT")?;
    Ok(())
  }

  fn rollback(&self) -> Result<()> {
    self.conn.execute_batch("ROLLBACK")?;
    Ok(())
  }

  fn savepoint(&self, name: &str) -> Result<()> {
    self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    Ok(())
  }

  fn release_savepoint(&self, name: &str) -> Result<()> {
    self.conn.execute_batch(&format!("RELEASE {name}"))?;
    Ok(())
  }

  fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
    self.conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
    Ok(())
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  fn lookup_versions(&self, names: &[String]) -> Result<Vec<Version>> {
    if names.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {VERSION_COLUMNS} FROM versions WHERE upper(name) IN ({}) ORDER BY version_id",
      placeholders(names.len())
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let raws = stmt
      .query_map(params_from_iter(names.iter().map(|n| n.to_uppercase())), RawVersion::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawVersion::into_version).collect()
  }

  fn list_versions(&self) -> Result<Vec<Version>> {
    let mut stmt =
      self.conn.prepare(&format!("SELECT {VERSION_COLUMNS} FROM versions ORDER BY version_id"))?;
    let raws = stmt.query_map([], RawVersion::from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawVersion::into_version).collect()
  }

  fn add_version(&self, input: NewVersion, user: &str) -> Result<Version> {
    self.with_savepoint("add_version", |store| {
      if store.version_by_name(&input.name)?.is_some() {
        return Err(frames_core::Error::DuplicateVersion(input.name.clone()).into());
      }

      let required = store.lookup_versions(&input.requires)?;
      let missing: Vec<String> = input
        .requires
        .iter()
        .filter(|name| !required.iter().any(|v| v.name.eq_ignore_ascii_case(name)))
        .cloned()
        .collect();
      if !missing.is_empty() {
        return Err(frames_core::Error::UnknownVersions(missing).into());
      }

      let now = Utc::now();
      let now_str = encode_dt(now);
      store.conn.execute(
        "INSERT INTO versions (name, status, description, creation_user, creation_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
          input.name,
          encode_status(VersionStatus::Proposed),
          input.description,
          user,
          now_str,
        ],
      )?;
      let version_id = VersionId(store.conn.last_insert_rowid());

      for req in &required {
        store.conn.execute(
          "INSERT INTO version_requires
             (version_id, required_version_id, creation_user, creation_timestamp)
           VALUES (?1, ?2, ?3, ?4)",
          params![version_id.0, req.version_id.0, user, now_str],
        )?;
      }

      info!(
        version = %input.name,
        %version_id,
        requires = ?required.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
        "added version"
      );
      Ok(Version {
        version_id,
        name: input.name.clone(),
        status: VersionStatus::Proposed,
        description: input.description.clone(),
        creation_user: user.to_owned(),
        creation_timestamp: now,
      })
    })
  }

  fn set_version_status(&self, name: &str, status: VersionStatus, user: &str) -> Result<Version> {
    let mut version = self.version_by_name(name)?.ok_or_else(|| Error::VersionNotFound(name.to_owned()))?;
    if version.status == status {
      return Ok(version);
    }
    if version.status.is_final() {
      return Err(frames_core::Error::FinalIsFinal(version.name).into());
    }

    self.conn.execute(
      "UPDATE versions
          SET status = ?1, updated_user = ?2, updated_timestamp = ?3
        WHERE version_id = ?4",
      params![encode_status(status), user, encode_dt(Utc::now()), version.version_id.0],
    )?;
    info!(version = %version.name, %status, "changed version status");
    version.status = status;
    Ok(version)
  }

  fn requires_edges(&self, from: &BTreeSet<VersionId>) -> Result<Vec<(VersionId, VersionId)>> {
    if from.is_empty() {
      return Ok(Vec::new());
    }
    // UNION (not UNION ALL) keeps the walk finite on cyclic data.
    let sql = format!(
      "WITH RECURSIVE req(version_id, required_version_id) AS (
           SELECT version_id, required_version_id
             FROM version_requires
            WHERE version_id IN ({})
         UNION
           SELECT vr.version_id, vr.required_version_id
             FROM version_requires vr
                  INNER JOIN req ON vr.version_id = req.required_version_id
       )
       SELECT version_id, required_version_id FROM req
        ORDER BY version_id, required_version_id",
      placeholders(from.len())
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let edges = stmt
      .query_map(params_from_iter(from.iter().map(|v| v.0)), |row| {
        Ok((VersionId(row.get(0)?), VersionId(row.get(1)?)))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    debug!(from = ?from, edges = edges.len(), "loaded requires edges");
    Ok(edges)
  }

  // ── Slot reads ────────────────────────────────────────────────────────────

  fn slot_candidates(&self, filter: &SlotFilter) -> Result<Vec<CandidateRow>> {
    let (predicate, args): (String, Vec<SqlValue>) = match filter {
      SlotFilter::Frame(frame_id) => ("frame_id = ?".to_owned(), vec![SqlValue::Integer(frame_id.0)]),
      SlotFilter::Names(names) if names.is_empty() => return Ok(Vec::new()),
      SlotFilter::Names(names) => (
        format!("upper(name) IN ({})", placeholders(names.len())),
        names.iter().map(|n| SqlValue::Text(n.to_uppercase())).collect(),
      ),
    };

    // Rows sharing a (frame, name, position) key with a desired row come back
    // as undesired competitors so that selection still weighs them.
    let sql = format!(
      "WITH desired AS (
           SELECT slot_id, frame_id, name, slot_list_order
             FROM slots
            WHERE {predicate}
       )
       SELECT d.frame_id, d.name, d.slot_list_order, d.slot_id, sv.version_id, 1
         FROM desired d
              INNER JOIN slot_versions sv ON sv.slot_id = d.slot_id
       UNION ALL
       SELECT s.frame_id, s.name, s.slot_list_order, s.slot_id, sv.version_id, 0
         FROM slots s
              INNER JOIN slot_versions sv ON sv.slot_id = s.slot_id
        WHERE s.slot_id NOT IN (SELECT slot_id FROM desired)
          AND EXISTS (SELECT 1
                        FROM desired d
                       WHERE d.frame_id = s.frame_id
                         AND upper(d.name) = upper(s.name)
                         AND d.slot_list_order IS s.slot_list_order)
       ORDER BY 1, 2 COLLATE NOCASE, 3, 4"
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let rows = stmt
      .query_map(params_from_iter(args.iter()), |row| {
        Ok(CandidateRow {
          frame_id:   FrameId(row.get(0)?),
          name:       row.get(1)?,
          position:   row.get::<_, Option<f64>>(2)?.map(Position),
          slot_id:    SlotId(row.get(3)?),
          version_id: VersionId(row.get(4)?),
          desired:    row.get(5)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }

  fn slots_by_id(&self, ids: &[SlotId]) -> Result<Vec<RawSlot>> {
    let mut slots = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_CHUNK) {
      let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM slots WHERE slot_id IN ({})",
        placeholders(chunk.len())
      );
      let mut stmt = self.conn.prepare(&sql)?;
      let rows = stmt
        .query_map(params_from_iter(chunk.iter().map(|id| id.0)), read_slot)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      slots.extend(rows);
    }
    Ok(slots)
  }

  fn get_slot(&self, id: SlotId) -> Result<Option<RawSlot>> {
    Ok(
      self
        .conn
        .query_row(&format!("SELECT {SLOT_COLUMNS} FROM slots WHERE slot_id = ?1"), params![id.0], read_slot)
        .optional()?,
    )
  }

  fn slot_versions(&self, id: SlotId) -> Result<BTreeSet<VersionId>> {
    let mut stmt = self.conn.prepare("SELECT version_id FROM slot_versions WHERE slot_id = ?1")?;
    let versions = stmt
      .query_map(params![id.0], |row| Ok(VersionId(row.get(0)?)))?
      .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(versions)
  }

  fn max_frame_id(&self) -> Result<Option<FrameId>> {
    let max: Option<i64> = self.conn.query_row("SELECT MAX(frame_id) FROM slots", [], |row| row.get(0))?;
    Ok(max.map(FrameId))
  }

  // ── Slot writes ───────────────────────────────────────────────────────────

  fn insert_slot(&self, slot: NewSlot, versions: &BTreeSet<VersionId>, user: &str) -> Result<SlotId> {
    let now_str = encode_dt(Utc::now());
    self.conn.execute(
      "INSERT INTO slots
         (frame_id, name, slot_list_order, description, value, creation_user, creation_timestamp)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        slot.frame_id.0,
        slot.name,
        slot.position.map(Position::value),
        slot.description,
        slot.value,
        user,
        now_str,
      ],
    )?;
    let slot_id = SlotId(self.conn.last_insert_rowid());

    for version_id in versions {
      self.conn.execute(
        "INSERT INTO slot_versions (slot_id, version_id, creation_user, creation_timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![slot_id.0, version_id.0, user, now_str],
      )?;
    }
    Ok(slot_id)
  }

  fn update_slot(&self, id: SlotId, update: SlotUpdate, user: &str) -> Result<()> {
    let changed = self.conn.execute(
      "UPDATE slots
          SET value = ?1, slot_list_order = ?2, description = ?3,
              updated_user = ?4, updated_timestamp = ?5
        WHERE slot_id = ?6",
      params![
        update.value,
        update.position.map(Position::value),
        update.description,
        user,
        encode_dt(Utc::now()),
        id.0,
      ],
    )?;
    if changed == 0 {
      return Err(Error::SlotNotFound(id.0));
    }
    Ok(())
  }
}
