//! The `SlotStore` trait and supporting row types.
//!
//! The trait is implemented by storage backends (e.g. `frames-store-sqlite`).
//! The resolution engine in [`crate::context`] depends on this abstraction,
//! never on a concrete backend. All calls are synchronous; a version context
//! runs every resolution to completion on the calling thread.

use std::collections::BTreeSet;

use crate::{
  slot::{FrameId, Position, RawSlot, SlotId},
  version::{NewVersion, Version, VersionId, VersionStatus},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Which slot rows a selection starts from.
///
/// Rows matching the filter are *desired*; rows that merely share a
/// (frame, name, position) key with a desired row come along as undesired
/// competitors so that version selection still sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotFilter {
  /// Every slot of one frame.
  Frame(FrameId),
  /// Slots with any of these names, on every frame. Names are compared
  /// case-insensitively.
  Names(BTreeSet<String>),
}

impl SlotFilter {
  pub fn names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self::Names(names.into_iter().map(|n| n.as_ref().to_uppercase()).collect())
  }
}

/// One (slot row, version link) pair returned by
/// [`SlotStore::slot_candidates`].
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
  pub frame_id:   FrameId,
  pub name:       String,
  pub position:   Option<Position>,
  pub slot_id:    SlotId,
  pub version_id: VersionId,
  /// `false` for rows included only as version competitors.
  pub desired:    bool,
}

// ─── Write types ─────────────────────────────────────────────────────────────

/// Input to [`SlotStore::insert_slot`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSlot {
  pub frame_id:    FrameId,
  pub name:        String,
  pub position:    Option<Position>,
  pub value:       String,
  pub description: Option<String>,
}

/// New contents for an existing slot row, written in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotUpdate {
  pub value:       String,
  pub position:    Option<Position>,
  pub description: Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the tabular storage behind a frames database.
///
/// Slot rows are append-only apart from [`SlotStore::update_slot`], which the
/// engine only calls when a row's version set exactly matches the writer's.
pub trait SlotStore {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Transactions ──────────────────────────────────────────────────────

  fn begin(&self) -> Result<(), Self::Error>;

  fn commit(&self) -> Result<(), Self::Error>;

  fn rollback(&self) -> Result<(), Self::Error>;

  /// Open a savepoint named `name` inside the current transaction.
  /// Savepoints nest; the innermost one of a name is the one addressed.
  fn savepoint(&self, name: &str) -> Result<(), Self::Error>;

  /// Keep everything written since savepoint `name` and close it.
  fn release_savepoint(&self, name: &str) -> Result<(), Self::Error>;

  /// Undo everything written since savepoint `name` and close it.
  fn rollback_to_savepoint(&self, name: &str) -> Result<(), Self::Error>;

  // ── Versions ──────────────────────────────────────────────────────────

  /// Versions whose names match any of `names`, case-insensitively.
  /// Missing names are simply absent from the result.
  fn lookup_versions(&self, names: &[String]) -> Result<Vec<Version>, Self::Error>;

  /// All versions, ordered by id.
  fn list_versions(&self) -> Result<Vec<Version>, Self::Error>;

  /// Create a proposed version and its requires edges.
  fn add_version(&self, input: NewVersion, user: &str) -> Result<Version, Self::Error>;

  /// Change a version's status. `final` never returns to `proposed`.
  fn set_version_status(
    &self,
    name: &str,
    status: VersionStatus,
    user: &str,
  ) -> Result<Version, Self::Error>;

  /// Every requires edge `(version, required)` reachable from `from`.
  fn requires_edges(
    &self,
    from: &BTreeSet<VersionId>,
  ) -> Result<Vec<(VersionId, VersionId)>, Self::Error>;

  // ── Slot reads ────────────────────────────────────────────────────────

  /// Candidate rows for `filter`, one per version link, ordered by frame,
  /// upper-cased name, position and slot id.
  fn slot_candidates(&self, filter: &SlotFilter) -> Result<Vec<CandidateRow>, Self::Error>;

  /// Full rows for `ids`, in no particular order.
  fn slots_by_id(&self, ids: &[SlotId]) -> Result<Vec<RawSlot>, Self::Error>;

  fn get_slot(&self, id: SlotId) -> Result<Option<RawSlot>, Self::Error>;

  /// The exact version set a slot row is attached to.
  fn slot_versions(&self, id: SlotId) -> Result<BTreeSet<VersionId>, Self::Error>;

  /// Highest frame id in use, if any.
  fn max_frame_id(&self) -> Result<Option<FrameId>, Self::Error>;

  // ── Slot writes ───────────────────────────────────────────────────────

  /// Append a slot row and link it to every version in `versions`.
  fn insert_slot(
    &self,
    slot: NewSlot,
    versions: &BTreeSet<VersionId>,
    user: &str,
  ) -> Result<SlotId, Self::Error>;

  /// Overwrite a slot row in place, stamping the updated-by columns.
  fn update_slot(&self, id: SlotId, update: SlotUpdate, user: &str) -> Result<(), Self::Error>;
}
