//! Writes through a version context.
//!
//! Every write is refused when the context is frozen. A write to an existing
//! slot row changes it in place only when the row's version set is exactly
//! the context's active versions; otherwise a new row is appended for the
//! active versions and the old row stays visible under its own versions.
//! Deletion is a write of the `<DELETED>` sentinel, never a row removal.

use tracing::{info, warn};

use crate::{
  Error, Result,
  context::VersionContext,
  frame::{FrameHandle, RawEntry},
  slot::{
    DELETED, FRAME_NAME, FrameId, FrameLabel, LIST_BASE_POSITION, Position, RawSlot, SINGLE_VALUED,
    SlotId, SlotKey,
  },
  store::{NewSlot, SlotFilter, SlotStore, SlotUpdate},
};

/// A value to write to a slot: one scalar or a whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotInput {
  Scalar(String),
  List(Vec<String>),
}

impl From<&str> for SlotInput {
  fn from(value: &str) -> Self { Self::Scalar(value.to_owned()) }
}

impl From<String> for SlotInput {
  fn from(value: String) -> Self { Self::Scalar(value) }
}

impl From<Vec<String>> for SlotInput {
  fn from(values: Vec<String>) -> Self { Self::List(values) }
}

impl From<Vec<&str>> for SlotInput {
  fn from(values: Vec<&str>) -> Self { Self::List(values.into_iter().map(str::to_owned).collect()) }
}

/// Savepoint wrapping each public write.
const WRITE_SAVEPOINT: &str = "frames_write";

fn check_multi_valued(name: &str) -> Result<()> {
  if SINGLE_VALUED.iter().any(|reserved| reserved.eq_ignore_ascii_case(name)) {
    return Err(Error::MultiValuedReserved(name.to_owned()));
  }
  Ok(())
}

impl<S: SlotStore> VersionContext<'_, S> {
  // ─── Row level ─────────────────────────────────────────────────────────────

  /// Append a slot row for the active versions.
  pub fn create_slot(
    &mut self,
    frame_id: FrameId,
    name: &str,
    value: impl Into<String>,
    position: Option<Position>,
    description: Option<String>,
  ) -> Result<RawSlot> {
    let value = value.into();
    self.write_unit(|ctx| ctx.insert_row(frame_id, name, value, position, description))
  }

  fn insert_row(
    &mut self,
    frame_id: FrameId,
    name: &str,
    value: String,
    position: Option<Position>,
    description: Option<String>,
  ) -> Result<RawSlot> {
    let new = NewSlot {
      frame_id,
      name: name.to_owned(),
      position,
      value: value.clone(),
      description: description.clone(),
    };
    let slot_id = self.store.insert_slot(new, self.version_ids(), &self.user).map_err(Error::store)?;
    info!(%frame_id, name, %slot_id, position = ?position.map(Position::value), "created slot");

    self.after_write(frame_id, name)?;
    Ok(RawSlot { frame_id, slot_id, name: name.to_owned(), position, description, value })
  }

  /// Change a slot row's contents. Returns the id of the row now holding
  /// them, which differs from `slot_id` when a new row had to be appended.
  pub fn update_slot(
    &mut self,
    slot_id: SlotId,
    value: impl Into<String>,
    position: Option<Position>,
    description: Option<String>,
  ) -> Result<SlotId> {
    let value = value.into();
    self.write_unit(|ctx| ctx.update_row(slot_id, value, position, description))
  }

  fn update_row(
    &mut self,
    slot_id: SlotId,
    value: String,
    position: Option<Position>,
    description: Option<String>,
  ) -> Result<SlotId> {
    let current = self
      .store
      .get_slot(slot_id)
      .map_err(Error::store)?
      .ok_or(Error::SlotIdNotFound(slot_id))?;
    let versions = self.store.slot_versions(slot_id).map_err(Error::store)?;

    if versions == *self.version_ids() {
      let update = SlotUpdate { value, position, description };
      self.store.update_slot(slot_id, update, &self.user).map_err(Error::store)?;
      info!(frame_id = %current.frame_id, name = %current.name, %slot_id, "updated slot in place");
      self.after_write(current.frame_id, &current.name)?;
      return Ok(slot_id);
    }

    let created = self.insert_row(current.frame_id, &current.name, value, position, description)?;
    info!(
      frame_id = %current.frame_id,
      name = %current.name,
      old_slot_id = %slot_id,
      new_slot_id = %created.slot_id,
      "appended slot row for active versions"
    );
    Ok(created.slot_id)
  }

  /// Mark a slot row deleted, keeping its position and description.
  pub fn delete_slot(&mut self, slot_id: SlotId) -> Result<SlotId> {
    self.write_unit(|ctx| ctx.delete_row(slot_id))
  }

  fn delete_row(&mut self, slot_id: SlotId) -> Result<SlotId> {
    let current = self
      .store
      .get_slot(slot_id)
      .map_err(Error::store)?
      .ok_or(Error::SlotIdNotFound(slot_id))?;
    self.update_row(slot_id, DELETED.to_owned(), current.position, current.description)
  }

  /// Write `values` as a new list, at positions 1000, 1001, ...
  pub fn create_list<V>(&mut self, frame_id: FrameId, name: &str, values: V) -> Result<Vec<RawSlot>>
  where
    V: IntoIterator,
    V::Item: Into<String>,
  {
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    self.write_unit(|ctx| {
      check_multi_valued(name)?;
      ctx.insert_list(frame_id, name, values)
    })
  }

  fn insert_list(&mut self, frame_id: FrameId, name: &str, values: Vec<String>) -> Result<Vec<RawSlot>> {
    values
      .into_iter()
      .enumerate()
      .map(|(i, value)| {
        let position = Position(LIST_BASE_POSITION + i as f64);
        self.insert_row(frame_id, name, value, Some(position), None)
      })
      .collect()
  }

  /// Create a frame under the next free id.
  ///
  /// Returns the new id and the label to refer to the frame by: its
  /// `frame_name` when one was given, else its id.
  pub fn create_frame<I, N>(&mut self, slots: I) -> Result<(FrameId, FrameLabel)>
  where
    I: IntoIterator<Item = (N, SlotInput)>,
    N: AsRef<str>,
  {
    self.write_unit(|ctx| {
      let frame_id = match ctx.store.max_frame_id().map_err(Error::store)? {
        Some(FrameId(max)) => FrameId(max + 1),
        None => FrameId(1),
      };

      let mut label = FrameLabel::Id(frame_id);
      for (name, input) in slots {
        let name = name.as_ref();
        match input {
          SlotInput::Scalar(value) => {
            if name.eq_ignore_ascii_case(FRAME_NAME) {
              label = FrameLabel::Name(value.clone());
            }
            ctx.insert_row(frame_id, name, value, None, None)?;
          }
          SlotInput::List(values) => {
            check_multi_valued(name)?;
            ctx.insert_list(frame_id, name, values)?;
          }
        }
      }
      info!(%frame_id, %label, "created frame");
      Ok((frame_id, label))
    })
  }

  // ─── Frame level ───────────────────────────────────────────────────────────

  /// Set `name` on `h` to `input`, creating the slot when `h` does not have
  /// one of its own. A list replaces whatever `h` held before; its elements
  /// land at positions 1000, 1001, ... reusing `h`'s rows at those positions.
  pub fn set_slot(
    &mut self,
    h: FrameHandle,
    name: &str,
    input: impl Into<SlotInput>,
    description: Option<String>,
  ) -> Result<()> {
    let input = input.into();
    self.write_unit(|ctx| ctx.write_slot(h, name, input, description))
  }

  fn write_slot(
    &mut self,
    h: FrameHandle,
    name: &str,
    input: SlotInput,
    description: Option<String>,
  ) -> Result<()> {
    let frame_id = self.frame_id_of(h);
    let own = self.own_entry(h, name).cloned();

    match input {
      SlotInput::Scalar(value) => {
        if let Some(RawEntry::List(rows)) = &own {
          self.delete_rows(rows)?;
        }
        self.put_slot(frame_id, name, value, None, description)?;
      }
      SlotInput::List(values) => {
        check_multi_valued(name)?;
        let old_rows = match own {
          Some(RawEntry::Scalar(slot)) => {
            self.delete_rows(&[slot])?;
            Vec::new()
          }
          Some(RawEntry::List(rows)) => rows,
          None => Vec::new(),
        };
        let mut written = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
          let position = Position(LIST_BASE_POSITION + i as f64);
          self.put_slot(frame_id, name, value, Some(position), None)?;
          written.push(position);
        }
        let stale: Vec<RawSlot> = old_rows
          .into_iter()
          .filter(|row| !row.position.is_some_and(|p| written.contains(&p)))
          .collect();
        self.delete_rows(&stale)?;
      }
    }
    Ok(())
  }

  /// Write `value` at `name` and `position` on `frame_id`, over the row
  /// already holding that key when there is one. That row keeps its
  /// description unless a new one is given.
  fn put_slot(
    &mut self,
    frame_id: FrameId,
    name: &str,
    value: impl Into<String>,
    position: Option<Position>,
    description: Option<String>,
  ) -> Result<RawSlot> {
    let value = value.into();
    let key = SlotKey::new(frame_id, name, position);
    let Some(existing) = self.select_slots(&SlotFilter::Frame(frame_id))?.remove(&key) else {
      return self.insert_row(frame_id, name, value, position, description);
    };
    let description = description.or(existing.description);
    let slot_id = self.update_row(existing.slot_id, value.clone(), position, description.clone())?;
    Ok(RawSlot { frame_id, slot_id, name: existing.name, position, description, value })
  }

  fn delete_rows(&mut self, rows: &[RawSlot]) -> Result<()> {
    for row in rows.iter().filter(|row| !row.is_deleted()) {
      self.delete_row(row.slot_id)?;
    }
    Ok(())
  }

  /// Remove `name` from `h`. Inherited values are shadowed with deleted rows
  /// on `h`; rows of other frames are never touched.
  pub fn delete_named_slot(&mut self, h: FrameHandle, name: &str) -> Result<()> {
    self.write_unit(|ctx| match ctx.own_entry(h, name).cloned() {
      Some(RawEntry::Scalar(slot)) if !slot.is_deleted() => {
        ctx.delete_row(slot.slot_id)?;
        Ok(())
      }
      Some(RawEntry::Scalar(_)) => Err(ctx.not_found(h, name)),
      Some(RawEntry::List(_)) => ctx.delete_list_rows(h, name),
      None => match ctx.get_raw_slot_inherited(h, name, true)?.1 {
        RawEntry::Scalar(_) => {
          let frame_id = ctx.frame_id_of(h);
          ctx.put_slot(frame_id, name, DELETED, None, None)?;
          Ok(())
        }
        RawEntry::List(_) => ctx.delete_list_rows(h, name),
      },
    })
  }

  // ─── List editing ──────────────────────────────────────────────────────────

  /// Visible elements of `h`'s list `name` before splicing. This is the
  /// list the editing operations index into; a spliced-in block counts as
  /// the single element referring to its splice frame.
  pub fn editable_list(&mut self, h: FrameHandle, name: &str) -> Result<Vec<RawSlot>> {
    if let Some(RawEntry::Scalar(slot)) = self.own_entry(h, name) {
      if !slot.is_deleted() {
        return Err(Error::NotAList { frame: self.frame_label(h).to_string(), name: name.to_owned() });
      }
    }
    let rows = self.merged_rows(h, name)?;
    Ok(rows.into_iter().filter(|row| row.position.is_some() && !row.is_deleted()).collect())
  }

  /// Insert `value` into `h`'s list `name` before element `index`, or at the
  /// end when `index` is `None`.
  pub fn insert_list_value(
    &mut self,
    h: FrameHandle,
    name: &str,
    index: Option<usize>,
    value: impl Into<String>,
    description: Option<String>,
  ) -> Result<RawSlot> {
    let value = value.into();
    self.write_unit(|ctx| {
      check_multi_valued(name)?;
      ctx.insert_list_row(h, name, index, value, description)
    })
  }

  fn insert_list_row(
    &mut self,
    h: FrameHandle,
    name: &str,
    index: Option<usize>,
    value: String,
    description: Option<String>,
  ) -> Result<RawSlot> {
    let rows = self.editable_list(h, name)?;
    let positions: Vec<Position> = rows.iter().filter_map(|row| row.position).collect();

    let position = match (positions.first().copied(), positions.last().copied()) {
      (Some(first), Some(last)) => match index {
        None => Position(last.value() + 1.0),
        Some(0) => Position(first.value() - 1.0),
        Some(i) if i == positions.len() => Position(last.value() + 1.0),
        Some(i) if i < positions.len() => positions[i - 1].midpoint(positions[i]),
        Some(i) => return Err(self.list_index(h, name, i)),
      },
      _ => match index {
        None | Some(0) => Position(LIST_BASE_POSITION),
        Some(i) => return Err(self.list_index(h, name, i)),
      },
    };

    let frame_id = self.frame_id_of(h);
    self.put_slot(frame_id, name, value, Some(position), description)
  }

  /// Replace element `index` of `h`'s list `name`. An inherited element is
  /// overridden by a row of `h`'s own at the same position.
  pub fn set_list_value(
    &mut self,
    h: FrameHandle,
    name: &str,
    index: usize,
    value: impl Into<String>,
    description: Option<String>,
  ) -> Result<SlotId> {
    let value = value.into();
    self.write_unit(|ctx| {
      let rows = ctx.editable_list(h, name)?;
      let Some(row) = rows.get(index) else { return Err(ctx.list_index(h, name, index)) };

      let frame_id = ctx.frame_id_of(h);
      if row.frame_id == frame_id {
        let description = description.or_else(|| row.description.clone());
        ctx.update_row(row.slot_id, value, row.position, description)
      } else {
        Ok(ctx.put_slot(frame_id, name, value, row.position, description)?.slot_id)
      }
    })
  }

  /// Delete every element of `h`'s list `name`, shadowing inherited ones.
  pub fn delete_list(&mut self, h: FrameHandle, name: &str) -> Result<()> {
    self.write_unit(|ctx| ctx.delete_list_rows(h, name))
  }

  fn delete_list_rows(&mut self, h: FrameHandle, name: &str) -> Result<()> {
    let frame_id = self.frame_id_of(h);
    for row in self.editable_list(h, name)? {
      if row.frame_id == frame_id {
        self.delete_row(row.slot_id)?;
      } else {
        self.put_slot(frame_id, name, DELETED, row.position, None)?;
      }
    }
    Ok(())
  }

  fn list_index(&self, h: FrameHandle, name: &str, index: usize) -> Error {
    Error::ListIndex { frame: self.frame_label(h).to_string(), name: name.to_owned(), index }
  }

  // ─── Write units ───────────────────────────────────────────────────────────

  /// Run `write` inside a savepoint. When it fails, every row it wrote is
  /// rolled back and cached frames are re-read, so the context looks as it
  /// did before the call.
  fn write_unit<T>(&mut self, write: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
    self.ensure_writable()?;
    self.store.savepoint(WRITE_SAVEPOINT).map_err(Error::store)?;
    match write(self) {
      Ok(value) => {
        self.store.release_savepoint(WRITE_SAVEPOINT).map_err(Error::store)?;
        Ok(value)
      }
      Err(e) => {
        match self.store.rollback_to_savepoint(WRITE_SAVEPOINT) {
          Ok(()) => info!(error = %e, "undid failed write"),
          Err(undo) => warn!(error = %undo, "undoing failed write failed"),
        }
        self.refresh_cache();
        Err(e)
      }
    }
  }

  fn refresh_cache(&mut self) {
    let frame_ids: Vec<FrameId> = self.loaded_index.keys().copied().collect();
    for frame_id in frame_ids {
      if let Err(e) = self.reload(frame_id) {
        warn!(%frame_id, error = %e, "cached frame unreadable after undoing write");
      }
    }
    if let Err(e) = self.load_frame_names() {
      warn!(error = %e, "frame names unreadable after undoing write");
    }
  }

  // ─── Cache upkeep ──────────────────────────────────────────────────────────

  fn after_write(&mut self, frame_id: FrameId, name: &str) -> Result<()> {
    self.reload(frame_id)?;
    if name.eq_ignore_ascii_case(FRAME_NAME) {
      self.load_frame_names()?;
    }
    Ok(())
  }
}
