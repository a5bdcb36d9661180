//! Slot rows and the conventions encoded in their stored values.
//!
//! A slot is a named attribute of a frame. Scalar slots have no list
//! position; list elements carry a fractional [`Position`] that orders them.
//! Values are stored as text with a few prefixes that change their meaning:
//!
//! - `<DELETED>` marks the slot as removed under its versions while still
//!   occupying its key, so it can shadow inherited values.
//! - `$label` refers to another frame, by id or by frame name.
//! - a leading backtick escapes a literal value.
//! - anything containing `{` is a template rendered on read.

use std::{cmp::Ordering, fmt, hash};

use serde::{Deserialize, Serialize};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Sentinel value of a soft-deleted slot.
pub const DELETED: &str = "<DELETED>";

/// First list position handed out by list creation; later elements count up
/// by one, leaving room for fractional insertions in between.
pub const LIST_BASE_POSITION: f64 = 1000.0;

/// Inheritance link followed on every lookup.
pub const AKO: &str = "ako";
/// Inheritance link followed only one level deep.
pub const ISA: &str = "isa";
/// Unique human-readable name of a frame; never inherited.
pub const FRAME_NAME: &str = "frame_name";
/// Scope name used when rendering templates against ancestor frames.
pub const CLASS_NAME: &str = "class_name";
/// Boolean slot marking a frame whose list is spliced into referencing lists.
pub const SPLICE: &str = "splice";

/// Slot names that may never hold a list.
pub const SINGLE_VALUED: [&str; 6] = ["name", AKO, ISA, FRAME_NAME, CLASS_NAME, SPLICE];

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Identifier of a frame. Immutable once allocated.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FrameId(pub i64);

impl fmt::Display for FrameId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Identifier of one conceptual (frame, name, position) slot row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotId(pub i64);

impl fmt::Display for SlotId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ─── Position ────────────────────────────────────────────────────────────────

/// Ordering key of a list element.
///
/// Totally ordered through [`f64::total_cmp`] so it can key maps. Repeated
/// midpoint insertion between the same two neighbours loses precision after
/// roughly fifty halvings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub f64);

impl Position {
  pub fn value(self) -> f64 { self.0 }

  /// Midpoint between two neighbours.
  pub fn midpoint(self, other: Position) -> Position { Position((self.0 + other.0) / 2.0) }

  /// `count` positions strictly between `self` and `next`, evenly spaced.
  ///
  /// With no following neighbour the new positions count up from `self` in
  /// steps of one.
  pub fn spread(self, next: Option<Position>, count: usize) -> Vec<Position> {
    let inc = match next {
      Some(end) => (end.0 - self.0) / (count as f64 + 1.0),
      None => 1.0,
    };
    (1..=count).map(|n| Position(self.0 + n as f64 * inc)).collect()
  }
}

impl PartialEq for Position {
  fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Position {}

impl PartialOrd for Position {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Position {
  fn cmp(&self, other: &Self) -> Ordering { self.0.total_cmp(&other.0) }
}

impl hash::Hash for Position {
  fn hash<H: hash::Hasher>(&self, state: &mut H) { self.0.to_bits().hash(state) }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<f64> for Position {
  fn from(v: f64) -> Self { Position(v) }
}

// ─── Raw slot ────────────────────────────────────────────────────────────────

/// A slot row as stored, before inheritance, references or templates are
/// applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSlot {
  pub frame_id:    FrameId,
  pub slot_id:     SlotId,
  /// Name as written; comparisons are case-insensitive.
  pub name:        String,
  pub position:    Option<Position>,
  pub description: Option<String>,
  pub value:       String,
}

impl RawSlot {
  pub fn is_deleted(&self) -> bool { self.value.eq_ignore_ascii_case(DELETED) }

  pub fn key(&self) -> SlotKey { SlotKey::new(self.frame_id, &self.name, self.position) }

  pub fn stored(&self) -> StoredValue<'_> { StoredValue::classify(&self.value) }
}

/// Grouping key for version selection: one authoritative row per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
  pub frame_id: FrameId,
  /// Upper-cased slot name.
  pub name:     String,
  pub position: Option<Position>,
}

impl SlotKey {
  pub fn new(frame_id: FrameId, name: &str, position: Option<Position>) -> Self {
    Self { frame_id, name: name.to_uppercase(), position }
  }
}

impl fmt::Display for SlotKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.position {
      Some(p) => write!(f, "{}.{}[{p}]", self.frame_id, self.name),
      None => write!(f, "{}.{}", self.frame_id, self.name),
    }
  }
}

// ─── Stored value ────────────────────────────────────────────────────────────

/// What a stored slot value means once its prefix is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue<'a> {
  Deleted,
  /// Backtick-escaped text, returned as is.
  Literal(&'a str),
  FrameRef(FrameLabel),
  Template(&'a str),
  Plain(&'a str),
}

impl<'a> StoredValue<'a> {
  pub fn classify(value: &'a str) -> Self {
    if value.eq_ignore_ascii_case(DELETED) {
      Self::Deleted
    } else if let Some(rest) = value.strip_prefix('`') {
      Self::Literal(rest)
    } else if let Some(rest) = value.strip_prefix('$') {
      Self::FrameRef(FrameLabel::parse(rest))
    } else if value.contains('{') {
      Self::Template(value)
    } else {
      Self::Plain(value)
    }
  }
}

/// Encode a reference to another frame as a stored value.
pub fn frame_ref(label: &FrameLabel) -> String { format!("${label}") }

/// Parse a stored boolean (`true`/`false`, any case).
pub fn parse_bool(value: &str) -> Option<bool> {
  if value.eq_ignore_ascii_case("true") {
    Some(true)
  } else if value.eq_ignore_ascii_case("false") {
    Some(false)
  } else {
    None
  }
}

// ─── Frame label ─────────────────────────────────────────────────────────────

/// How callers name a frame: by id or by its `frame_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameLabel {
  Id(FrameId),
  Name(String),
}

impl FrameLabel {
  /// Parse a label, with or without the leading `$`. All-digit labels are
  /// ids; anything else is a frame name.
  pub fn parse(label: &str) -> Self {
    let label = label.strip_prefix('$').unwrap_or(label);
    if !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit()) {
      if let Ok(id) = label.parse() {
        return Self::Id(FrameId(id));
      }
    }
    Self::Name(label.to_owned())
  }
}

impl fmt::Display for FrameLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Id(id) => write!(f, "{id}"),
      Self::Name(name) => f.write_str(name),
    }
  }
}

impl From<FrameId> for FrameLabel {
  fn from(id: FrameId) -> Self { Self::Id(id) }
}

impl From<&str> for FrameLabel {
  fn from(s: &str) -> Self { Self::parse(s) }
}
