//! Materialised frames and slot lookup with inheritance.
//!
//! Frames live in an arena owned by the [`VersionContext`]. A
//! [`LoadedFrame`] holds one frame's own winning rows; a frame node is a
//! view of a loaded frame seen from somewhere: the frame that referred to it
//! (its *parent*, used for template scopes) and the splice frames whose slots
//! were stuffed into it. [`FrameHandle`]s index nodes and stay valid for the
//! life of the context, unless [`VersionContext::clear_cache`] is called.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
  Error, Result,
  context::{RawFrame, VersionContext},
  slot::{AKO, CLASS_NAME, FRAME_NAME, FrameId, FrameLabel, ISA, RawSlot, SPLICE, StoredValue},
  store::{SlotFilter, SlotStore},
  template::{self, Leniency, RenderScopes},
};

/// Slot names a splice frame never lends to the elements it is spliced into.
pub(crate) const SPLICE_PRIVATE: [&str; 5] = [FRAME_NAME, CLASS_NAME, ISA, AKO, SPLICE];

// ─── Arena types ─────────────────────────────────────────────────────────────

/// Index of a frame view in a context's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(pub(crate) usize);

/// Provenance of a spliced list element: the list it was spliced into and
/// the splice frame it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Splice {
  /// Lower-cased list name.
  pub list_name: String,
  pub frame:     FrameHandle,
}

/// One own slot of a frame: a scalar row or the rows of a list.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
  Scalar(RawSlot),
  /// Sorted by position.
  List(Vec<RawSlot>),
}

impl RawEntry {
  /// Only a scalar can be deleted as a whole.
  pub fn is_deleted(&self) -> bool { matches!(self, Self::Scalar(slot) if slot.is_deleted()) }

  pub fn as_scalar(&self) -> Option<&RawSlot> {
    match self {
      Self::Scalar(slot) => Some(slot),
      Self::List(_) => None,
    }
  }
}

/// A frame's own slots under the context's versions, keyed by lower-cased
/// name.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedFrame {
  pub frame_id: FrameId,
  pub slots:    BTreeMap<String, RawEntry>,
}

impl LoadedFrame {
  /// Group winning rows by name.
  ///
  /// A name with a null-position row and positioned rows is a shape error,
  /// unless one side is entirely deleted; the deleted side is then dropped.
  pub fn from_raw(frame_id: FrameId, raw: RawFrame) -> Result<Self> {
    let mut grouped: BTreeMap<String, (Option<RawSlot>, Vec<RawSlot>)> = BTreeMap::new();
    for (key, slot) in raw {
      let group = grouped.entry(slot.name.to_lowercase()).or_default();
      match key.position {
        None => group.0 = Some(slot),
        Some(_) => group.1.push(slot),
      }
    }

    let mut slots = BTreeMap::new();
    for (name, (scalar, list)) in grouped {
      let entry = match scalar {
        None if list.is_empty() => continue,
        None => RawEntry::List(list),
        Some(slot) if list.is_empty() => RawEntry::Scalar(slot),
        Some(slot) if slot.is_deleted() => RawEntry::List(list),
        Some(slot) if list.iter().all(RawSlot::is_deleted) => RawEntry::Scalar(slot),
        Some(_) => return Err(Error::MixedSlotShape { frame_id, name }),
      };
      slots.insert(name, entry);
    }
    Ok(Self { frame_id, slots })
  }

  pub fn get(&self, name: &str) -> Option<&RawEntry> { self.slots.get(&name.to_lowercase()) }
}

/// Kinds of inheritance walk, for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Walk {
  Slot,
  List,
  Names,
}

#[derive(Debug, Clone)]
pub(crate) struct FrameNode {
  pub(crate) loaded:  usize,
  pub(crate) parent:  Option<FrameHandle>,
  pub(crate) splices: Vec<Splice>,
}

// ─── Resolved values ─────────────────────────────────────────────────────────

/// A list element together with the splices that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
  pub slot:    RawSlot,
  pub splices: Vec<Splice>,
}

/// A list slot after inheritance and splicing, deleted elements included.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotList {
  /// The frame whose list this is; elements are cooked against it.
  pub owner: FrameHandle,
  pub name:  String,
  pub items: Vec<ListItem>,
}

impl SlotList {
  /// Elements that are not deleted, in position order.
  pub fn visible(&self) -> impl Iterator<Item = &ListItem> {
    self.items.iter().filter(|item| !item.slot.is_deleted())
  }
}

/// A cooked slot value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Text(String),
  Frame(FrameHandle),
  List(Vec<Value>),
}

impl Value {
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(text) => Some(text),
      _ => None,
    }
  }

  pub fn as_frame(&self) -> Option<FrameHandle> {
    match self {
      Self::Frame(h) => Some(*h),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Self::List(items) => Some(items),
      _ => None,
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

impl<S: SlotStore> VersionContext<'_, S> {
  // ── Arena ─────────────────────────────────────────────────────────────

  /// Load a frame by id or name and return its root view.
  pub fn get_frame(&mut self, label: &FrameLabel) -> Result<FrameHandle> {
    let frame_id = self.frame_id(label)?;
    if let Some(&h) = self.roots.get(&frame_id) {
      return Ok(h);
    }
    let loaded = self.load(frame_id, label)?;
    let h = FrameHandle(self.nodes.len());
    self.nodes.push(FrameNode { loaded, parent: None, splices: Vec::new() });
    self.roots.insert(frame_id, h);
    Ok(h)
  }

  fn load(&mut self, frame_id: FrameId, label: &FrameLabel) -> Result<usize> {
    if let Some(&i) = self.loaded_index.get(&frame_id) {
      return Ok(i);
    }
    let raw = self.select_slots(&SlotFilter::Frame(frame_id))?;
    if raw.is_empty() {
      return Err(Error::FrameNotFound(label.clone()));
    }
    let loaded = LoadedFrame::from_raw(frame_id, raw)?;
    debug!(%frame_id, slots = loaded.slots.len(), "loaded frame");

    let i = self.loaded.len();
    self.loaded.push(loaded);
    self.loaded_index.insert(frame_id, i);
    Ok(i)
  }

  /// Re-read a loaded frame's own rows after a write. Existing handles keep
  /// pointing at it.
  pub(crate) fn reload(&mut self, frame_id: FrameId) -> Result<()> {
    let Some(&i) = self.loaded_index.get(&frame_id) else { return Ok(()) };
    let raw = self.select_slots(&SlotFilter::Frame(frame_id))?;
    self.loaded[i] = LoadedFrame::from_raw(frame_id, raw)?;
    Ok(())
  }

  /// The view of `root`'s frame seen from `parent` with `splices` attached.
  fn with_context(
    &mut self,
    root: FrameHandle,
    parent: Option<FrameHandle>,
    splices: Vec<Splice>,
  ) -> FrameHandle {
    let loaded = self.nodes[root.0].loaded;
    if parent.is_none() && splices.is_empty() {
      return root;
    }
    let key = (loaded, parent, splices);
    if let Some(&h) = self.contexts.get(&key) {
      return h;
    }
    let h = FrameHandle(self.nodes.len());
    self.nodes.push(FrameNode { loaded, parent: key.1, splices: key.2.clone() });
    self.contexts.insert(key, h);
    h
  }

  pub(crate) fn loaded_frame(&self, h: FrameHandle) -> &LoadedFrame {
    &self.loaded[self.nodes[h.0].loaded]
  }

  pub fn frame_id_of(&self, h: FrameHandle) -> FrameId { self.loaded_frame(h).frame_id }

  /// The frame that referred to `h`, if any.
  pub fn parent_of(&self, h: FrameHandle) -> Option<FrameHandle> { self.nodes[h.0].parent }

  /// `h`'s frame name when it has one, else its id.
  pub fn frame_label(&self, h: FrameHandle) -> FrameLabel {
    let frame_id = self.frame_id_of(h);
    match self.lookup_frame_name(frame_id) {
      Some(name) => FrameLabel::Name(name.to_owned()),
      None => FrameLabel::Id(frame_id),
    }
  }

  pub(crate) fn own_entry(&self, h: FrameHandle, name: &str) -> Option<&RawEntry> {
    self.loaded_frame(h).get(name)
  }

  pub(crate) fn not_found(&self, h: FrameHandle, name: &str) -> Error {
    Error::SlotNotFound { frame: self.frame_label(h).to_string(), name: name.to_owned() }
  }

  // ── Raw lookup ────────────────────────────────────────────────────────

  /// `h`'s own slot `name`, or one stuffed in from a splice frame. No
  /// inheritance. Returns the frame the entry belongs to along with it.
  pub fn get_raw_slot(&self, h: FrameHandle, name: &str) -> Result<(FrameHandle, RawEntry)> {
    self.raw_slot(h, name, true)
  }

  fn raw_slot(
    &self,
    h: FrameHandle,
    name: &str,
    deleted_is_error: bool,
  ) -> Result<(FrameHandle, RawEntry)> {
    let lower = name.to_lowercase();
    if !SPLICE_PRIVATE.contains(&lower.as_str()) {
      for splice in &self.nodes[h.0].splices {
        if splice.list_name == lower {
          continue;
        }
        if let Some(entry) = self.own_entry(splice.frame, &lower) {
          if !entry.is_deleted() {
            return Ok((splice.frame, entry.clone()));
          }
        }
      }
    }
    match self.own_entry(h, &lower) {
      Some(entry) if !(deleted_is_error && entry.is_deleted()) => Ok((h, entry.clone())),
      _ => Err(self.not_found(h, name)),
    }
  }

  /// Look `name` up on `h`, then through `ako`, then through `isa`.
  ///
  /// `isa` is followed one level only: lookups continuing past an `isa`
  /// link only follow `ako`. `frame_name` and `ako` are never inherited. A
  /// deleted own slot ends the search.
  pub fn get_raw_slot_inherited(
    &mut self,
    h: FrameHandle,
    name: &str,
    try_isa: bool,
  ) -> Result<(FrameHandle, RawEntry)> {
    let miss = match self.raw_slot(h, name, false) {
      Ok((_, entry)) if entry.is_deleted() => return Err(self.not_found(h, name)),
      Ok(found) => return Ok(found),
      Err(e) if e.is_not_found() => e,
      Err(e) => return Err(e),
    };
    if name.eq_ignore_ascii_case(FRAME_NAME) || name.eq_ignore_ascii_case(AKO) {
      return Err(miss);
    }

    let guard = self.enter_walk(Walk::Slot, h, name)?;
    let found = self.inherited_raw_slot(h, name, try_isa);
    self.inheriting.remove(&guard);
    found?.ok_or(miss)
  }

  fn inherited_raw_slot(
    &mut self,
    h: FrameHandle,
    name: &str,
    try_isa: bool,
  ) -> Result<Option<(FrameHandle, RawEntry)>> {
    if let Some(ako) = self.link(h, AKO)? {
      match self.get_raw_slot_inherited(ako, name, try_isa) {
        Err(e) if e.is_not_found() => {}
        found => return found.map(Some),
      }
    }
    if try_isa {
      if let Some(isa) = self.link(h, ISA)? {
        match self.get_raw_slot_inherited(isa, name, false) {
          Err(e) if e.is_not_found() => {}
          found => return found.map(Some),
        }
      }
    }
    Ok(None)
  }

  /// Mark `h`'s frame as being walked for `name`. Fails when the walk is
  /// already passing through it.
  pub(crate) fn enter_walk(
    &mut self,
    walk: Walk,
    h: FrameHandle,
    name: &str,
  ) -> Result<(Walk, FrameId, String)> {
    let guard = (walk, self.frame_id_of(h), name.to_lowercase());
    if !self.inheriting.insert(guard.clone()) {
      return Err(Error::InheritanceCycle {
        frame: self.frame_label(h).to_string(),
        name:  name.to_owned(),
      });
    }
    Ok(guard)
  }

  /// Follow the `ako` or `isa` link of `h`, if it has one.
  pub(crate) fn link(&mut self, h: FrameHandle, link: &'static str) -> Result<Option<FrameHandle>> {
    let Some(entry) = self.own_entry(h, link) else { return Ok(None) };
    if entry.is_deleted() {
      return Ok(None);
    }
    let label = match entry {
      RawEntry::Scalar(slot) => match slot.stored() {
        StoredValue::FrameRef(label) => Some(label),
        _ => None,
      },
      RawEntry::List(_) => None,
    };
    let Some(label) = label else {
      let value = entry.as_scalar().map_or_else(|| "<list>".to_owned(), |s| s.value.clone());
      return Err(Error::InvalidLink { frame: self.frame_label(h).to_string(), link, value });
    };
    let root = self.get_frame(&label)?;
    Ok(Some(self.with_context(root, Some(h), Vec::new())))
  }

  // ── Cooked lookup ─────────────────────────────────────────────────────

  /// The cooked value of `name` on `h`, with inheritance, references,
  /// templates and splices applied. Templates must render.
  pub fn get_slot(&mut self, h: FrameHandle, name: &str) -> Result<Value> {
    self.get_slot_with(h, name, Leniency::Strict)
  }

  pub fn get_slot_with(&mut self, h: FrameHandle, name: &str, leniency: Leniency) -> Result<Value> {
    let (owner, entry) = self.get_raw_slot_inherited(h, name, true)?;
    match entry {
      RawEntry::Scalar(slot) => {
        let is_link = name.eq_ignore_ascii_case(AKO) || name.eq_ignore_ascii_case(ISA);
        if !is_link && self.splice_frame_of(&slot)?.is_some() {
          return Err(Error::ScalarSplice {
            frame: self.frame_label(h).to_string(),
            name:  name.to_owned(),
          });
        }
        self.cook(h, &slot, &[], leniency)
      }
      RawEntry::List(_) => {
        let owner = self.list_owner(h, owner);
        let list = self.build_list(owner, name)?;
        self.cook_list(&list, leniency)
      }
    }
  }

  /// `name` on `h` as a list, after inheritance and splicing.
  pub fn get_slot_list(&mut self, h: FrameHandle, name: &str) -> Result<SlotList> {
    let (owner, entry) = self.get_raw_slot_inherited(h, name, true)?;
    match entry {
      RawEntry::List(_) => {
        let owner = self.list_owner(h, owner);
        self.build_list(owner, name)
      }
      RawEntry::Scalar(_) => {
        Err(Error::NotAList { frame: self.frame_label(h).to_string(), name: name.to_owned() })
      }
    }
  }

  /// Lists stuffed in from a splice frame belong to it; everything else is
  /// rebuilt from `h`'s point of view.
  fn list_owner(&self, h: FrameHandle, found_on: FrameHandle) -> FrameHandle {
    if self.nodes[h.0].splices.iter().any(|s| s.frame == found_on) { found_on } else { h }
  }

  /// Every visible slot name of `h`, lower-cased.
  pub fn get_slot_names(&mut self, h: FrameHandle) -> Result<BTreeSet<String>> {
    self.slot_names(h, false, false)
  }

  fn slot_names(&mut self, h: FrameHandle, seen_isa: bool, seen_ako: bool) -> Result<BTreeSet<String>> {
    let guard = self.enter_walk(Walk::Names, h, "*")?;
    let names = self.collect_slot_names(h, seen_isa, seen_ako);
    self.inheriting.remove(&guard);
    names
  }

  fn collect_slot_names(
    &mut self,
    h: FrameHandle,
    seen_isa: bool,
    seen_ako: bool,
  ) -> Result<BTreeSet<String>> {
    let mut names = match self.link(h, AKO)? {
      Some(ako) => self.slot_names(ako, seen_isa, true)?,
      None => BTreeSet::new(),
    };
    if !seen_isa {
      if let Some(isa) = self.link(h, ISA)? {
        names.extend(self.slot_names(isa, true, seen_ako)?);
      }
    }

    let inherited = seen_isa || seen_ako;
    for (name, entry) in &self.loaded_frame(h).slots {
      if entry.is_deleted() {
        names.remove(name);
      } else if !(inherited && (name == FRAME_NAME || name == AKO)) {
        names.insert(name.clone());
      }
    }

    for splice in &self.nodes[h.0].splices {
      for (name, entry) in &self.loaded_frame(splice.frame).slots {
        if SPLICE_PRIVATE.contains(&name.as_str()) || *name == splice.list_name || entry.is_deleted() {
          continue;
        }
        names.insert(name.clone());
      }
    }
    Ok(names)
  }

  /// Interpret a stored value as seen from `h`.
  pub(crate) fn cook(
    &mut self,
    h: FrameHandle,
    slot: &RawSlot,
    splices: &[Splice],
    leniency: Leniency,
  ) -> Result<Value> {
    match slot.stored() {
      StoredValue::Deleted => Ok(Value::Text(slot.value.clone())),
      StoredValue::Literal(text) | StoredValue::Plain(text) => Ok(Value::Text(text.to_owned())),
      StoredValue::FrameRef(label) => {
        let root = self.get_frame(&label)?;
        Ok(Value::Frame(self.with_context(root, Some(h), splices.to_vec())))
      }
      StoredValue::Template(text) => self.render_slot(h, &slot.name, text, leniency),
    }
  }

  pub(crate) fn cook_list(&mut self, list: &SlotList, leniency: Leniency) -> Result<Value> {
    let mut values = Vec::with_capacity(list.items.len());
    for item in list.visible() {
      values.push(self.cook(list.owner, &item.slot, &item.splices, leniency)?);
    }
    Ok(Value::List(values))
  }

  // ── Templates ─────────────────────────────────────────────────────────

  fn render_slot(
    &mut self,
    h: FrameHandle,
    name: &str,
    template: &str,
    leniency: Leniency,
  ) -> Result<Value> {
    let guard = (h.0, name.to_lowercase());
    let rendered = if self.rendering.insert(guard.clone()) {
      let rendered = match self.render_scopes(h) {
        Ok(scopes) => template::render(template, &scopes, |f, path| self.field_text(f, path)),
        Err(e) => Err(e),
      };
      self.rendering.remove(&guard);
      rendered
    } else {
      Err(Error::Template {
        template: template.to_owned(),
        reason:   format!("{name} refers to itself"),
      })
    };

    match rendered {
      Ok(text) => Ok(Value::Text(text)),
      Err(e @ Error::Template { .. }) if leniency == Leniency::Lenient => {
        debug!(error = %e, "leaving template unrendered");
        Ok(Value::Text(template.to_owned()))
      }
      Err(e) => Err(e),
    }
  }

  /// `frame` names `h` itself; every frame up the parent chain (starting at
  /// `h`) is also reachable under its `class_name`.
  fn render_scopes(&mut self, h: FrameHandle) -> Result<RenderScopes<FrameHandle>> {
    let mut scopes = RenderScopes::new();
    scopes.push("frame", h);
    let mut cursor = Some(h);
    while let Some(frame) = cursor {
      if let Some(class_name) = self.class_name(frame)? {
        scopes.push(class_name, frame);
      }
      cursor = self.nodes[frame.0].parent;
    }
    Ok(scopes)
  }

  fn class_name(&mut self, h: FrameHandle) -> Result<Option<String>> {
    match self.get_raw_slot_inherited(h, CLASS_NAME, true) {
      Ok((_, RawEntry::Scalar(slot))) => Ok(match slot.stored() {
        StoredValue::Literal(text) | StoredValue::Plain(text) | StoredValue::Template(text) => {
          Some(text.to_owned())
        }
        StoredValue::Deleted | StoredValue::FrameRef(_) => None,
      }),
      Ok((_, RawEntry::List(_))) => Ok(None),
      Err(e) if e.is_not_found() => Ok(None),
      Err(e) => Err(e),
    }
  }

  fn field_text(&mut self, h: FrameHandle, path: &[&str]) -> Result<String> {
    let mut current = Value::Frame(h);
    for name in path {
      let Value::Frame(frame) = current else {
        return Err(Error::SlotNotFound { frame: self.value_text(&current), name: (*name).to_owned() });
      };
      current = self.get_slot(frame, name)?;
    }
    Ok(self.value_text(&current))
  }

  /// Plain-text rendering of a value, as substituted into templates.
  pub fn value_text(&self, value: &Value) -> String {
    match value {
      Value::Text(text) => text.clone(),
      Value::Frame(h) => self.frame_label(*h).to_string(),
      Value::List(items) => {
        let items: Vec<String> = items.iter().map(|v| self.value_text(v)).collect();
        format!("[{}]", items.join(", "))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::slot::{Position, SlotId, SlotKey};

  fn slot(id: i64, name: &str, position: Option<f64>, value: &str) -> RawSlot {
    RawSlot {
      frame_id:    FrameId(7),
      slot_id:     SlotId(id),
      name:        name.into(),
      position:    position.map(Position),
      description: None,
      value:       value.into(),
    }
  }

  fn raw(slots: Vec<RawSlot>) -> RawFrame { slots.into_iter().map(|s| (s.key(), s)).collect() }

  #[test]
  fn rows_group_into_scalars_and_sorted_lists() {
    let frame = LoadedFrame::from_raw(FrameId(7), raw(vec![
      slot(1, "Color", None, "red"),
      slot(3, "items", Some(1001.0), "b"),
      slot(2, "ITEMS", Some(1000.0), "a"),
    ]))
    .unwrap();

    assert_eq!(frame.get("color").and_then(RawEntry::as_scalar).map(|s| s.slot_id), Some(SlotId(1)));
    match frame.get("Items") {
      Some(RawEntry::List(rows)) => {
        assert_eq!(rows.iter().map(|r| r.slot_id).collect::<Vec<_>>(), vec![SlotId(2), SlotId(3)]);
      }
      other => panic!("expected a list, got {other:?}"),
    }
  }

  #[test]
  fn scalar_mixed_with_list_rows_is_a_shape_error() {
    let err = LoadedFrame::from_raw(FrameId(7), raw(vec![
      slot(1, "items", None, "x"),
      slot(2, "items", Some(1000.0), "a"),
    ]))
    .unwrap_err();
    assert!(matches!(err, Error::MixedSlotShape { frame_id: FrameId(7), .. }));
  }

  #[test]
  fn deleted_side_of_a_mixed_slot_is_dropped() {
    let frame = LoadedFrame::from_raw(FrameId(7), raw(vec![
      slot(1, "items", None, "<DELETED>"),
      slot(2, "items", Some(1000.0), "a"),
    ]))
    .unwrap();
    assert!(matches!(frame.get("items"), Some(RawEntry::List(rows)) if rows.len() == 1));

    let frame = LoadedFrame::from_raw(FrameId(7), raw(vec![
      slot(1, "items", None, "x"),
      slot(2, "items", Some(1000.0), "<DELETED>"),
    ]))
    .unwrap();
    assert!(matches!(frame.get("items"), Some(RawEntry::Scalar(_))));
  }

  #[test]
  fn keys_of_grouped_rows_match_their_slot_keys() {
    let s = slot(1, "Color", None, "red");
    assert_eq!(s.key(), SlotKey::new(FrameId(7), "COLOR", None));
  }
}
