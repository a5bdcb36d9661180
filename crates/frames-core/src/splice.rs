//! List slots: merging inherited elements and splicing.
//!
//! A list is built in two passes. First the frame's own elements are merged
//! with those inherited through `ako` and `isa`, by position, own elements
//! winning ties. Then every element referring to a splice frame (a frame
//! whose `splice` slot is true) is replaced by that frame's list of the same
//! name, repositioned to sit strictly between the replaced element and its
//! successor.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
  Error, Result,
  context::VersionContext,
  frame::{FrameHandle, ListItem, RawEntry, SlotList, Splice, Walk},
  slot::{AKO, ISA, Position, RawSlot, SPLICE, StoredValue, parse_bool},
  store::SlotStore,
};

impl<S: SlotStore> VersionContext<'_, S> {
  /// `owner`'s list `name` after inheritance and splicing.
  pub(crate) fn build_list(&mut self, owner: FrameHandle, name: &str) -> Result<SlotList> {
    let items = self
      .merged_rows(owner, name)?
      .into_iter()
      .map(|slot| ListItem { slot, splices: Vec::new() })
      .collect();

    let guard = (self.frame_id_of(owner), name.to_lowercase());
    if !self.splicing.insert(guard.clone()) {
      return Err(Error::SpliceCycle {
        frame: self.frame_label(owner).to_string(),
        name:  name.to_owned(),
      });
    }
    let spliced = self.splice_items(owner, name, items);
    self.splicing.remove(&guard);

    Ok(SlotList { owner, name: name.to_owned(), items: spliced? })
  }

  /// Own elements of `owner`'s list `name` merged with inherited ones,
  /// deleted elements included. An own scalar shadows every inherited
  /// element and comes back alone.
  pub(crate) fn merged_rows(&mut self, owner: FrameHandle, name: &str) -> Result<Vec<RawSlot>> {
    let mut rows = match self.own_entry(owner, name) {
      Some(RawEntry::Scalar(slot)) => return Ok(vec![slot.clone()]),
      Some(RawEntry::List(rows)) => rows.clone(),
      None => Vec::new(),
    };

    let inherited = self.get_inherited_values(owner, name, true)?;
    for (position, slot) in inherited {
      if !rows.iter().any(|own| own.position == Some(position)) {
        rows.push(slot);
      }
    }
    rows.sort_by_key(|slot| slot.position);
    Ok(rows)
  }

  /// Elements `h` inherits for list `name`, by position. Does not include
  /// `h`'s own elements.
  ///
  /// `ako` contributions are applied before `isa` ones, so `isa` wins at
  /// equal positions. A scalar on an inherited frame discards everything
  /// inherited so far.
  pub fn get_inherited_values(
    &mut self,
    h: FrameHandle,
    name: &str,
    try_isa: bool,
  ) -> Result<BTreeMap<Position, RawSlot>> {
    let guard = self.enter_walk(Walk::List, h, name)?;
    let mut inherited = BTreeMap::new();
    let mut walked = self.inherit_through(h, AKO, name, try_isa, &mut inherited);
    if try_isa && walked.is_ok() {
      walked = self.inherit_through(h, ISA, name, false, &mut inherited);
    }
    self.inheriting.remove(&guard);
    walked.map(|()| inherited)
  }

  fn inherit_through(
    &mut self,
    h: FrameHandle,
    link: &'static str,
    name: &str,
    try_isa: bool,
    inherited: &mut BTreeMap<Position, RawSlot>,
  ) -> Result<()> {
    let Some(base) = self.link(h, link)? else { return Ok(()) };
    inherited.extend(self.get_inherited_values(base, name, try_isa)?);
    match self.own_entry(base, name) {
      None => {}
      Some(RawEntry::Scalar(_)) => inherited.clear(),
      Some(RawEntry::List(rows)) => {
        for row in rows {
          if let Some(position) = row.position {
            inherited.insert(position, row.clone());
          }
        }
      }
    }
    Ok(())
  }

  /// Replace splice references with the splice frames' elements until none
  /// are left. Spliced-in elements are scanned again, so a splice frame's
  /// own list may splice further.
  fn splice_items(
    &mut self,
    owner: FrameHandle,
    name: &str,
    mut items: Vec<ListItem>,
  ) -> Result<Vec<ListItem>> {
    let mut i = 0;
    while i < items.len() {
      let Some(splice_frame) = self.splice_frame_of(&items[i].slot)? else {
        i += 1;
        continue;
      };
      let Some(start) = items[i].slot.position else {
        return Err(Error::ScalarSplice {
          frame: self.frame_label(owner).to_string(),
          name:  name.to_owned(),
        });
      };
      let next = items.get(i + 1).and_then(|item| item.slot.position);

      let source = self.splice_source(splice_frame, name)?;
      let positions = start.spread(next, source.len());
      let provenance = Splice { list_name: name.to_lowercase(), frame: splice_frame };
      let inserted: Vec<ListItem> = source
        .into_iter()
        .zip(positions)
        .map(|(mut item, position)| {
          item.slot.position = Some(position);
          item.splices.insert(0, provenance.clone());
          item
        })
        .collect();

      debug!(
        frame = %self.frame_label(owner),
        list = name,
        splice = %self.frame_label(splice_frame),
        %start,
        count = inserted.len(),
        "spliced list"
      );
      items.splice(i..=i, inserted);
    }
    Ok(items)
  }

  /// The splice frame `slot` refers to, if it refers to one.
  pub(crate) fn splice_frame_of(&mut self, slot: &RawSlot) -> Result<Option<FrameHandle>> {
    let StoredValue::FrameRef(label) = slot.stored() else { return Ok(None) };
    let frame = self.get_frame(&label)?;
    Ok(self.is_splice_frame(frame)?.then_some(frame))
  }

  pub(crate) fn is_splice_frame(&mut self, h: FrameHandle) -> Result<bool> {
    let value = match self.get_raw_slot_inherited(h, SPLICE, true) {
      Ok((_, RawEntry::Scalar(slot))) => match slot.stored() {
        StoredValue::Literal(text) | StoredValue::Plain(text) => text.to_owned(),
        _ => slot.value.clone(),
      },
      Ok((_, RawEntry::List(_))) => "<list>".to_owned(),
      Err(e) if e.is_not_found() => return Ok(false),
      Err(e) => return Err(e),
    };
    parse_bool(&value).ok_or(Error::InvalidBoolean { value })
  }

  /// The elements a splice frame contributes for list `name`: its own list
  /// of that name, fully built. Frames without such a list contribute
  /// nothing.
  fn splice_source(&mut self, splice_frame: FrameHandle, name: &str) -> Result<Vec<ListItem>> {
    match self.get_raw_slot_inherited(splice_frame, name, true) {
      Ok((_, RawEntry::List(_))) => Ok(self.build_list(splice_frame, name)?.items),
      Ok((_, RawEntry::Scalar(_))) => Ok(Vec::new()),
      Err(e) if e.is_not_found() => Ok(Vec::new()),
      Err(e) => Err(e),
    }
  }
}
