//! Integration tests for `SqliteStore` and the resolution engine against an
//! in-memory database.

use std::collections::BTreeSet;

use frames_core::{
  Error as CoreError, FrameHandle, FrameId, FrameLabel, Leniency, NewVersion, Position, SlotInput,
  SlotStore, Value, Version, VersionContext, VersionStatus,
};

use crate::{Error, SqliteStore};

type Ctx<'s> = VersionContext<'s, SqliteStore>;

const USER: &str = "tester";

fn store() -> SqliteStore { SqliteStore::open_in_memory().expect("in-memory store") }

struct Versions {
  base:    Version,
  variant: Version,
  other:   Version,
}

/// `variant` and `other` both require `base`.
fn seed(s: &SqliteStore) -> Versions {
  let base = s.add_version(NewVersion::new("base"), USER).unwrap();
  let variant = s.add_version(NewVersion::new("variant").requiring(["base"]), USER).unwrap();
  let other = s.add_version(NewVersion::new("other").requiring(["base"]), USER).unwrap();
  Versions { base, variant, other }
}

fn seeded() -> SqliteStore {
  let s = store();
  seed(&s);
  s
}

fn ctx<'s>(s: &'s SqliteStore, versions: &[&str]) -> Ctx<'s> {
  VersionContext::open(s, USER, versions).expect("open context")
}

/// Create a frame from scalar `(name, value)` pairs.
fn create(c: &mut Ctx<'_>, slots: &[(&str, &str)]) -> FrameId {
  c.create_frame(slots.iter().map(|(name, value)| (*name, SlotInput::from(*value))))
    .unwrap()
    .0
}

fn frame(c: &mut Ctx<'_>, label: &str) -> FrameHandle { c.get_frame(&FrameLabel::from(label)).unwrap() }

fn text(c: &mut Ctx<'_>, h: FrameHandle, name: &str) -> String {
  match c.get_slot(h, name).unwrap() {
    Value::Text(text) => text,
    other => panic!("expected text for {name}, got {other:?}"),
  }
}

fn texts(c: &mut Ctx<'_>, h: FrameHandle, name: &str) -> Vec<String> {
  match c.get_slot(h, name).unwrap() {
    Value::List(items) => items.iter().map(|v| c.value_text(v)).collect(),
    other => panic!("expected a list for {name}, got {other:?}"),
  }
}

// ─── Versions ────────────────────────────────────────────────────────────────

#[test]
fn add_and_list_versions() {
  let s = store();
  let v = seed(&s);

  assert_eq!(v.base.status, VersionStatus::Proposed);
  assert_eq!(v.base.creation_user, USER);

  let all = s.list_versions().unwrap();
  let names: Vec<&str> = all.iter().map(|v| v.name.as_str()).collect();
  assert_eq!(names, vec!["base", "variant", "other"]);
}

#[test]
fn lookup_versions_ignores_case() {
  let s = seeded();
  let found = s.lookup_versions(&["BASE".into(), "Variant".into(), "nope".into()]).unwrap();
  let names: Vec<&str> = found.iter().map(|v| v.name.as_str()).collect();
  assert_eq!(names, vec!["base", "variant"]);
  assert!(s.lookup_versions(&[]).unwrap().is_empty());
}

#[test]
fn duplicate_version_names_are_rejected() {
  let s = seeded();
  let err = s.add_version(NewVersion::new("BASE"), USER).unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::DuplicateVersion(_))));
}

#[test]
fn unknown_requirements_are_all_reported() {
  let s = seeded();
  let err = s
    .add_version(NewVersion::new("deluxe").requiring(["base", "ghost", "phantom"]), USER)
    .unwrap_err();
  match err {
    Error::Core(CoreError::UnknownVersions(missing)) => {
      assert_eq!(missing, vec!["ghost".to_owned(), "phantom".to_owned()]);
    }
    other => panic!("expected unknown versions, got {other:?}"),
  }
  // The savepoint left nothing behind.
  assert_eq!(s.list_versions().unwrap().len(), 3);
}

#[test]
fn requires_edges_are_transitive() {
  let s = store();
  let v = seed(&s);
  let deluxe = s.add_version(NewVersion::new("deluxe").requiring(["variant"]), USER).unwrap();

  let edges = s.requires_edges(&BTreeSet::from([deluxe.version_id])).unwrap();
  assert_eq!(edges, vec![
    (v.variant.version_id, v.base.version_id),
    (deluxe.version_id, v.variant.version_id),
  ]);
  assert!(s.requires_edges(&BTreeSet::new()).unwrap().is_empty());
}

#[test]
fn final_versions_stay_final() {
  let s = seeded();
  let v = s.set_version_status("base", VersionStatus::Final, USER).unwrap();
  assert_eq!(v.status, VersionStatus::Final);

  // Same status is a no-op.
  s.set_version_status("base", VersionStatus::Final, USER).unwrap();

  let err = s.set_version_status("base", VersionStatus::Proposed, USER).unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::FinalIsFinal(_))));

  let err = s.set_version_status("ghost", VersionStatus::Final, USER).unwrap_err();
  assert!(matches!(err, Error::VersionNotFound(_)));
}

// ─── Version contexts ────────────────────────────────────────────────────────

#[test]
fn context_resolves_required_versions() {
  let s = store();
  let v = seed(&s);
  let deluxe = s.add_version(NewVersion::new("deluxe").requiring(["variant"]), USER).unwrap();

  let c = ctx(&s, &["deluxe"]);
  assert_eq!(c.version_ids(), &BTreeSet::from([deluxe.version_id]));
  assert_eq!(
    c.required_versions(),
    &BTreeSet::from([v.base.version_id, v.variant.version_id, deluxe.version_id])
  );
  assert!(c.graph().requires(deluxe.version_id, v.base.version_id));
  assert!(!c.is_frozen());
  assert!(!c.required_versions().contains(&v.other.version_id));
}

#[test]
fn unknown_context_versions_are_all_reported() {
  let s = seeded();
  let Err(err) = VersionContext::open(&s, USER, &["base", "nope", "missing"]) else {
    panic!("expected unknown versions");
  };
  match err {
    CoreError::UnknownVersions(missing) => assert_eq!(missing, vec!["nope", "missing"]),
    other => panic!("expected unknown versions, got {other:?}"),
  }

  // The failed open rolled its transaction back.
  let c = ctx(&s, &["base"]);
  drop(c);
}

#[test]
fn context_needs_a_version() {
  let s = seeded();
  let none: &[&str] = &[];
  assert!(matches!(VersionContext::open(&s, USER, none), Err(CoreError::NoVersions)));
}

#[test]
fn final_versions_refuse_writes() {
  let s = seeded();
  s.set_version_status("base", VersionStatus::Final, USER).unwrap();

  let mut c = ctx(&s, &["base"]);
  assert!(c.is_frozen());
  let err = c.create_frame([("color", SlotInput::from("red"))]).unwrap_err();
  assert!(matches!(err, CoreError::Frozen(_)));
  drop(c);

  // A proposed version alongside it reopens writes.
  let mut c = ctx(&s, &["base", "variant"]);
  assert!(!c.is_frozen());
  create(&mut c, &[("color", "red")]);
}

// ─── Selection ───────────────────────────────────────────────────────────────

#[test]
fn more_specific_version_set_wins() {
  let s = seeded();

  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "widget"), ("color", "red")]);
  c.commit().unwrap();

  let mut c = ctx(&s, &["base", "variant"]);
  let h = frame(&mut c, "widget");
  c.set_slot(h, "color", "blue", None).unwrap();
  assert_eq!(text(&mut c, h, "color"), "blue");
  c.commit().unwrap();

  for (versions, expected) in [(&["variant"][..], "blue"), (&["base"][..], "red"), (&["other"][..], "red")] {
    let mut c = ctx(&s, versions);
    let h = frame(&mut c, "widget");
    assert_eq!(text(&mut c, h, "color"), expected, "under {versions:?}");
  }
}

#[test]
fn unrelated_versions_conflict_until_resolved() {
  let s = seeded();

  let mut c = ctx(&s, &["base"]);
  let id = create(&mut c, &[("frame_name", "widget"), ("color", "red")]);
  c.commit().unwrap();

  for (version, color) in [("variant", "blue"), ("other", "green")] {
    let mut c = ctx(&s, &[version]);
    let h = frame(&mut c, "widget");
    c.set_slot(h, "color", color, None).unwrap();
    c.commit().unwrap();
  }

  let mut c = ctx(&s, &["variant", "other"]);
  match c.get_frame(&FrameLabel::from("widget")).unwrap_err() {
    CoreError::SlotConflict { key, candidates } => {
      assert_eq!(key.frame_id, id);
      assert_eq!(key.name, "COLOR");
      assert_eq!(candidates.len(), 3);
    }
    other => panic!("expected a conflict, got {other:?}"),
  }

  // A row under both versions settles it.
  c.create_slot(id, "color", "purple", None, None).unwrap();
  let h = frame(&mut c, "widget");
  assert_eq!(text(&mut c, h, "color"), "purple");
}

#[test]
fn raw_frame_reads_are_idempotent() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  let id = create(&mut c, &[("frame_name", "widget"), ("color", "red"), ("size", "10")]);

  let first = c.get_raw_frame(&FrameLabel::Id(id)).unwrap();
  let second = c.get_raw_frame(&FrameLabel::from("WIDGET")).unwrap();
  assert_eq!(first, second);
  assert_eq!(first.1.len(), 3);
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[test]
fn update_in_place_only_for_the_exact_version_set() {
  let s = store();
  let v = seed(&s);

  let mut c = ctx(&s, &["base"]);
  let id = create(&mut c, &[("color", "red")]);
  let (_, raw) = c.get_raw_frame(&FrameLabel::Id(id)).unwrap();
  let r1 = raw.values().next().unwrap().slot_id;

  let same = c.update_slot(r1, "crimson", None, None).unwrap();
  assert_eq!(same, r1);
  c.commit().unwrap();

  let mut c = ctx(&s, &["base", "variant"]);
  let r2 = c.update_slot(r1, "blue", None, Some("variant colour".into())).unwrap();
  assert_ne!(r2, r1);
  c.commit().unwrap();

  assert_eq!(s.get_slot(r1).unwrap().unwrap().value, "crimson");
  let new = s.get_slot(r2).unwrap().unwrap();
  assert_eq!(new.value, "blue");
  assert_eq!(new.description.as_deref(), Some("variant colour"));
  assert_eq!(
    s.slot_versions(r2).unwrap(),
    BTreeSet::from([v.base.version_id, v.variant.version_id])
  );
}

#[test]
fn updating_a_missing_slot_row_fails() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  let err = c.update_slot(frames_core::SlotId(42), "x", None, None).unwrap_err();
  assert!(matches!(err, CoreError::SlotIdNotFound(_)));
}

#[test]
fn create_frame_allocates_ids_and_registers_names() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);

  let (first, label) =
    c.create_frame([("frame_name", SlotInput::from("gear")), ("size", SlotInput::from("10"))]).unwrap();
  assert_eq!(first, FrameId(1));
  assert_eq!(label, FrameLabel::Name("gear".into()));

  let (second, label) = c.create_frame([("size", SlotInput::from("12"))]).unwrap();
  assert_eq!(second, FrameId(2));
  assert_eq!(label, FrameLabel::Id(second));

  assert_eq!(c.lookup_frame_name(first), Some("gear"));
  assert_eq!(c.frame_id(&FrameLabel::from("GEAR")).unwrap(), first);

  // Renaming updates the registry.
  let h = frame(&mut c, "gear");
  c.set_slot(h, "frame_name", "cog", None).unwrap();
  assert!(matches!(c.frame_id(&FrameLabel::from("gear")), Err(CoreError::FrameNotFound(_))));
  assert_eq!(c.frame_id(&FrameLabel::from("cog")).unwrap(), first);
  assert_eq!(c.frame_label(h), FrameLabel::Name("cog".into()));
}

#[test]
fn missing_frames_are_not_found() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  assert!(matches!(c.get_frame(&FrameLabel::from("ghost")), Err(CoreError::FrameNotFound(_))));
  assert!(matches!(c.get_frame(&FrameLabel::Id(FrameId(99))), Err(CoreError::FrameNotFound(_))));
}

#[test]
fn dropping_a_context_rolls_back() {
  let s = seeded();
  {
    let mut c = ctx(&s, &["base"]);
    create(&mut c, &[("frame_name", "widget")]);
  }
  assert_eq!(s.max_frame_id().unwrap(), None);

  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "widget")]);
  c.rollback().unwrap();
  assert_eq!(s.max_frame_id().unwrap(), None);

  let c = ctx(&s, &["base"]);
  assert!(c.frame_id(&FrameLabel::from("widget")).is_err());
}

#[test]
fn failed_writes_are_undone() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "gear"), ("color", "red")]);
  c.commit().unwrap();

  let mut c = ctx(&s, &["base", "variant"]);
  let h = frame(&mut c, "gear");
  c.set_slot(h, "color", "blue", None).unwrap();
  c.commit().unwrap();

  // A row for variant alone can not beat the {base, variant} row.
  let mut c = ctx(&s, &["variant"]);
  let h = frame(&mut c, "gear");
  assert_eq!(text(&mut c, h, "color"), "blue");
  let err = c.set_slot(h, "color", "green", None).unwrap_err();
  assert!(matches!(err, CoreError::SlotConflict { .. }));
  assert_eq!(text(&mut c, h, "color"), "blue");
  c.commit().unwrap();

  assert!(s.get_slot(frames_core::SlotId(4)).unwrap().is_none());
  let mut c = ctx(&s, &["variant"]);
  let h = frame(&mut c, "gear");
  assert_eq!(text(&mut c, h, "color"), "blue");
}

#[test]
fn rewriting_a_slot_keeps_its_description() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "kit")]);
  let h = frame(&mut c, "kit");
  c.set_slot(h, "color", "red", Some("paint".into())).unwrap();
  c.set_slot(h, "color", "blue", None).unwrap();

  let (_, entry) = c.get_raw_slot(h, "color").unwrap();
  let slot = entry.as_scalar().unwrap();
  assert_eq!(slot.value, "blue");
  assert_eq!(slot.description.as_deref(), Some("paint"));
}

// ─── Inheritance ─────────────────────────────────────────────────────────────

#[test]
fn ako_inherits_missing_slots() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "gear"), ("size", "10")]);
  create(&mut c, &[("frame_name", "small_gear"), ("ako", "$gear")]);
  create(&mut c, &[("ako", "$small_gear")]);

  let f = frame(&mut c, "small_gear");
  assert_eq!(text(&mut c, f, "size"), "10");
  let gear = frame(&mut c, "gear");
  assert_eq!(c.get_slot(f, "ako").unwrap().as_frame().map(|h| c.frame_id_of(h)), Some(c.frame_id_of(gear)));

  // Neither frame_name nor ako is inherited.
  let g = c.get_frame(&FrameLabel::Id(FrameId(3))).unwrap();
  assert_eq!(text(&mut c, g, "size"), "10");
  assert!(matches!(c.get_slot(g, "frame_name"), Err(CoreError::SlotNotFound { .. })));
  let names = c.get_slot_names(g).unwrap();
  assert_eq!(names, BTreeSet::from(["ako".to_owned(), "size".to_owned()]));
}

#[test]
fn isa_is_followed_one_level() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "root"), ("weight", "5")]);
  create(&mut c, &[("frame_name", "kind"), ("ako", "$root"), ("color", "red")]);
  create(&mut c, &[("frame_name", "thing"), ("isa", "$kind")]);
  create(&mut c, &[("frame_name", "copy"), ("isa", "$thing")]);

  let thing = frame(&mut c, "thing");
  assert_eq!(text(&mut c, thing, "color"), "red");
  // isa then ako is fine.
  assert_eq!(text(&mut c, thing, "weight"), "5");

  let copy = frame(&mut c, "copy");
  assert!(matches!(c.get_slot(copy, "color"), Err(CoreError::SlotNotFound { .. })));
}

#[test]
fn deletion_shadows_inherited_values() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "gear"), ("color", "red"), ("size", "10")]);
  create(&mut c, &[("frame_name", "plain_gear"), ("ako", "$gear")]);

  let f = frame(&mut c, "plain_gear");
  c.delete_named_slot(f, "color").unwrap();

  assert!(matches!(c.get_slot(f, "color"), Err(CoreError::SlotNotFound { .. })));
  assert_eq!(text(&mut c, f, "size"), "10");
  let names = c.get_slot_names(f).unwrap();
  assert!(!names.contains("color"));
  assert!(names.contains("size"));

  let g = frame(&mut c, "gear");
  assert_eq!(text(&mut c, g, "color"), "red");

  // Nothing left to delete.
  assert!(matches!(c.delete_named_slot(f, "color"), Err(CoreError::SlotNotFound { .. })));
}

#[test]
fn malformed_links_are_reported() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "broken"), ("ako", "gear")]);
  let h = frame(&mut c, "broken");
  assert!(matches!(
    c.get_slot(h, "size"),
    Err(CoreError::InvalidLink { link: "ako", .. })
  ));
}

#[test]
fn inheritance_cycles_are_reported() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  c.create_frame([
    ("frame_name", SlotInput::from("a")),
    ("ako", SlotInput::from("$b")),
    ("color", SlotInput::from("red")),
    ("parts", SlotInput::from(vec!["x"])),
  ])
  .unwrap();
  create(&mut c, &[("frame_name", "b"), ("ako", "$a")]);

  let a = frame(&mut c, "a");
  assert_eq!(text(&mut c, a, "color"), "red");
  assert!(matches!(c.get_slot(a, "size"), Err(CoreError::InheritanceCycle { .. })));
  assert!(matches!(c.get_slot_names(a), Err(CoreError::InheritanceCycle { .. })));
  assert!(matches!(c.get_slot_list(a, "parts"), Err(CoreError::InheritanceCycle { .. })));

  // Own slots still read after a failed walk.
  assert_eq!(text(&mut c, a, "color"), "red");
}

// ─── Lists ───────────────────────────────────────────────────────────────────

fn positions(c: &mut Ctx<'_>, h: FrameHandle, name: &str) -> Vec<f64> {
  let list = c.get_slot_list(h, name).unwrap();
  list.visible().filter_map(|item| item.slot.position).map(Position::value).collect()
}

#[test]
fn own_list_elements_win_position_ties() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  let g = create(&mut c, &[("frame_name", "gear")]);
  let f = create(&mut c, &[("frame_name", "gear_child"), ("ako", "$gear")]);
  for (pos, value) in [(1000.0, "g0"), (1001.0, "g1"), (1003.0, "g3")] {
    c.create_slot(g, "parts", value, Some(Position(pos)), None).unwrap();
  }
  for (pos, value) in [(1000.0, "f0"), (1002.0, "f2")] {
    c.create_slot(f, "parts", value, Some(Position(pos)), None).unwrap();
  }

  let h = frame(&mut c, "gear_child");
  assert_eq!(positions(&mut c, h, "parts"), vec![1000.0, 1001.0, 1002.0, 1003.0]);
  assert_eq!(texts(&mut c, h, "parts"), vec!["f0", "g1", "f2", "g3"]);

  let inherited = c.get_inherited_values(h, "parts", true).unwrap();
  assert_eq!(inherited.len(), 3);
}

#[test]
fn splices_land_strictly_between_neighbours() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  c.create_frame([
    ("frame_name", SlotInput::from("extras")),
    ("splice", SlotInput::from("true")),
    ("parts", SlotInput::from(vec!["x", "y", "z"])),
  ])
  .unwrap();
  let f = create(&mut c, &[("frame_name", "kit")]);
  c.create_slot(f, "parts", "$extras", Some(Position(5.0)), None).unwrap();
  c.create_slot(f, "parts", "b", Some(Position(7.0)), None).unwrap();

  let h = frame(&mut c, "kit");
  assert_eq!(positions(&mut c, h, "parts"), vec![5.5, 6.0, 6.5, 7.0]);
  assert_eq!(texts(&mut c, h, "parts"), vec!["x", "y", "z", "b"]);

  let list = c.get_slot_list(h, "parts").unwrap();
  let extras = frame(&mut c, "extras");
  assert!(list.items[..3].iter().all(|item| item.splices.len() == 1 && item.splices[0].frame == extras));
  assert!(list.items[3].splices.is_empty());
}

#[test]
fn spliced_frames_see_the_splice_frame_slots() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "bolt"), ("size", "M6")]);
  c.create_frame([
    ("frame_name", SlotInput::from("fasteners")),
    ("splice", SlotInput::from("TRUE")),
    ("finish", SlotInput::from("matte")),
    ("parts", SlotInput::from(vec!["$bolt"])),
  ])
  .unwrap();
  c.create_frame([("frame_name", SlotInput::from("kit")), ("parts", SlotInput::from(vec!["$fasteners", "washer"]))])
    .unwrap();

  let kit = frame(&mut c, "kit");
  let parts = c.get_slot(kit, "parts").unwrap();
  let items = parts.as_list().unwrap().to_vec();
  assert_eq!(items.len(), 2);
  let bolt = items[0].as_frame().unwrap();
  assert_eq!(text(&mut c, bolt, "size"), "M6");
  assert_eq!(text(&mut c, bolt, "finish"), "matte");
  assert!(matches!(c.get_slot(bolt, "splice"), Err(CoreError::SlotNotFound { .. })));
  assert_eq!(items[1], Value::Text("washer".into()));

  // The bolt frame on its own has no finish.
  let plain = frame(&mut c, "bolt");
  assert!(matches!(c.get_slot(plain, "finish"), Err(CoreError::SlotNotFound { .. })));
}

#[test]
fn splice_cycles_are_detected() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  c.create_frame([
    ("frame_name", SlotInput::from("loop")),
    ("splice", SlotInput::from("true")),
    ("parts", SlotInput::from(vec!["$loop"])),
  ])
  .unwrap();
  c.create_frame([("frame_name", SlotInput::from("kit")), ("parts", SlotInput::from(vec!["$loop"]))])
    .unwrap();

  let kit = frame(&mut c, "kit");
  assert!(matches!(c.get_slot(kit, "parts"), Err(CoreError::SpliceCycle { .. })));
}

#[test]
fn invalid_splice_flags_are_rejected() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "odd"), ("splice", "maybe")]);
  c.create_frame([("frame_name", SlotInput::from("kit")), ("parts", SlotInput::from(vec!["$odd"]))])
    .unwrap();

  let kit = frame(&mut c, "kit");
  assert!(matches!(c.get_slot(kit, "parts"), Err(CoreError::InvalidBoolean { .. })));
}

#[test]
fn scalar_slots_can_not_refer_to_splice_frames() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  c.create_frame([
    ("frame_name", SlotInput::from("extras")),
    ("splice", SlotInput::from("true")),
    ("parts", SlotInput::from(vec!["x"])),
  ])
  .unwrap();
  create(&mut c, &[("frame_name", "kit"), ("parts", "$extras")]);
  create(&mut c, &[("frame_name", "more_extras"), ("ako", "$extras")]);

  let kit = frame(&mut c, "kit");
  assert!(matches!(c.get_slot(kit, "parts"), Err(CoreError::ScalarSplice { .. })));

  // Links may still name splice frames.
  let more = frame(&mut c, "more_extras");
  let extras = frame(&mut c, "extras");
  let base = c.get_slot(more, "ako").unwrap().as_frame().map(|h| c.frame_id_of(h));
  assert_eq!(base, Some(c.frame_id_of(extras)));
}

#[test]
fn list_elements_can_be_inserted_set_and_deleted() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  c.create_frame([("frame_name", SlotInput::from("kit")), ("parts", SlotInput::from(vec!["a", "b", "c"]))])
    .unwrap();
  let h = frame(&mut c, "kit");

  let ab = c.insert_list_value(h, "parts", Some(1), "ab", None).unwrap();
  assert_eq!(ab.position, Some(Position(1000.5)));
  c.insert_list_value(h, "parts", None, "d", None).unwrap();
  c.insert_list_value(h, "parts", Some(0), "z", None).unwrap();
  assert_eq!(texts(&mut c, h, "parts"), vec!["z", "a", "ab", "b", "c", "d"]);
  assert_eq!(positions(&mut c, h, "parts"), vec![999.0, 1000.0, 1000.5, 1001.0, 1002.0, 1003.0]);

  let id = c.set_list_value(h, "parts", 2, "AB", None).unwrap();
  assert_eq!(id, ab.slot_id);
  assert_eq!(texts(&mut c, h, "parts"), vec!["z", "a", "AB", "b", "c", "d"]);

  assert!(matches!(
    c.insert_list_value(h, "parts", Some(99), "x", None),
    Err(CoreError::ListIndex { index: 99, .. })
  ));
  assert!(matches!(c.set_list_value(h, "parts", 6, "x", None), Err(CoreError::ListIndex { .. })));

  c.delete_list(h, "parts").unwrap();
  assert_eq!(texts(&mut c, h, "parts"), Vec::<String>::new());

  // Inserting into an emptied list starts over at the base position.
  let first = c.insert_list_value(h, "parts", None, "fresh", None).unwrap();
  assert_eq!(first.position, Some(Position(1000.0)));
}

#[test]
fn editing_inherited_lists_writes_own_rows() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  c.create_frame([("frame_name", SlotInput::from("gear")), ("parts", SlotInput::from(vec!["a", "b"]))])
    .unwrap();
  create(&mut c, &[("frame_name", "gear_child"), ("ako", "$gear")]);

  let f = frame(&mut c, "gear_child");
  c.set_list_value(f, "parts", 1, "B", None).unwrap();
  assert_eq!(texts(&mut c, f, "parts"), vec!["a", "B"]);

  let g = frame(&mut c, "gear");
  assert_eq!(texts(&mut c, g, "parts"), vec!["a", "b"]);

  c.delete_list(f, "parts").unwrap();
  assert_eq!(texts(&mut c, f, "parts"), Vec::<String>::new());
  assert_eq!(texts(&mut c, g, "parts"), vec!["a", "b"]);
}

#[test]
fn list_edits_reject_scalars_and_reserved_names() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "kit"), ("color", "red")]);
  let h = frame(&mut c, "kit");

  assert!(matches!(c.insert_list_value(h, "color", None, "x", None), Err(CoreError::NotAList { .. })));
  assert!(matches!(c.get_slot_list(h, "color"), Err(CoreError::NotAList { .. })));
  assert!(matches!(
    c.insert_list_value(h, "ako", None, "$kit", None),
    Err(CoreError::MultiValuedReserved(_))
  ));
  assert!(matches!(
    c.set_slot(h, "isa", vec!["$a", "$b"], None),
    Err(CoreError::MultiValuedReserved(_))
  ));
}

#[test]
fn set_slot_replaces_lists_and_scalars() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "kit"), ("tags", "single")]);
  let h = frame(&mut c, "kit");

  c.set_slot(h, "tags", vec!["x", "y"], None).unwrap();
  assert_eq!(texts(&mut c, h, "tags"), vec!["x", "y"]);

  c.set_slot(h, "tags", vec!["q"], None).unwrap();
  assert_eq!(texts(&mut c, h, "tags"), vec!["q"]);

  c.set_slot(h, "tags", "again", None).unwrap();
  assert_eq!(text(&mut c, h, "tags"), "again");
}

// ─── Templates ───────────────────────────────────────────────────────────────

#[test]
fn templates_render_against_the_reading_frame() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "gear"), ("size", "10"), ("label", "{frame.size}mm")]);
  create(&mut c, &[("frame_name", "big_gear"), ("ako", "$gear"), ("size", "12")]);
  create(&mut c, &[("frame_name", "odd"), ("price", "`{not a template}")]);

  let g = frame(&mut c, "gear");
  assert_eq!(text(&mut c, g, "label"), "10mm");
  let big = frame(&mut c, "big_gear");
  assert_eq!(text(&mut c, big, "label"), "12mm");

  let odd = frame(&mut c, "odd");
  assert_eq!(text(&mut c, odd, "price"), "{not a template}");
}

#[test]
fn templates_reach_ancestors_by_class_name() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "bolt"), ("caption", "part of {assembly.frame_name}")]);
  create(&mut c, &[("frame_name", "engine"), ("class_name", "assembly"), ("part", "$bolt")]);

  let engine = frame(&mut c, "engine");
  let part = c.get_slot(engine, "part").unwrap().as_frame().unwrap();
  assert_eq!(c.parent_of(part), Some(engine));
  assert_eq!(text(&mut c, part, "caption"), "part of engine");

  // Read on its own there is no assembly in scope.
  let bolt = frame(&mut c, "bolt");
  assert!(matches!(c.get_slot(bolt, "caption"), Err(CoreError::Template { .. })));
  assert_eq!(
    c.get_slot_with(bolt, "caption", Leniency::Lenient).unwrap(),
    Value::Text("part of {assembly.frame_name}".into())
  );
}

#[test]
fn self_referencing_templates_fail() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "knot"), ("loop", "again {frame.loop}")]);

  let h = frame(&mut c, "knot");
  assert!(matches!(c.get_slot(h, "loop"), Err(CoreError::Template { .. })));
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[test]
fn frame_search_follows_derivation() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  let gear = create(&mut c, &[("frame_name", "gear"), ("color", "red"), ("size", "10")]);
  let child = create(&mut c, &[("ako", "$gear")]);
  let blue = create(&mut c, &[("ako", "$gear"), ("color", "blue")]);
  let other = create(&mut c, &[("color", "RED")]);

  assert_eq!(
    c.frame_ids_with_slots(&[("color", "red")]).unwrap(),
    BTreeSet::from([gear, child, other])
  );
  assert_eq!(
    c.frame_ids_with_slots(&[("color", "*")]).unwrap(),
    BTreeSet::from([gear, child, blue, other])
  );
  assert_eq!(
    c.frame_ids_with_slots(&[("color", "red"), ("size", "10")]).unwrap(),
    BTreeSet::from([gear, child])
  );
  // frame_name is never inherited.
  assert_eq!(c.frame_ids_with_slots(&[("frame_name", "gear")]).unwrap(), BTreeSet::from([gear]));
  let none: &[(&str, &str)] = &[];
  assert!(c.frame_ids_with_slots(none).unwrap().is_empty());
}

#[test]
fn frame_search_skips_dangling_links_and_follows_isa_once() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  let gear = create(&mut c, &[("frame_name", "gear"), ("color", "red")]);
  let thing = create(&mut c, &[("frame_name", "thing"), ("isa", "$gear")]);
  let sub = create(&mut c, &[("frame_name", "sub_thing"), ("ako", "$thing")]);
  let copy = create(&mut c, &[("frame_name", "copy"), ("isa", "$thing")]);
  create(&mut c, &[("frame_name", "orphan"), ("ako", "$ghost")]);

  assert_eq!(c.frame_ids_with_slots(&[("color", "red")]).unwrap(), BTreeSet::from([gear, thing, sub]));

  let h = frame(&mut c, "sub_thing");
  assert_eq!(text(&mut c, h, "color"), "red");
  let h = c.get_frame(&FrameLabel::Id(copy)).unwrap();
  assert!(matches!(c.get_slot(h, "color"), Err(CoreError::SlotNotFound { .. })));
}

// ─── Dump ────────────────────────────────────────────────────────────────────

#[test]
fn dump_lists_slots_by_name() {
  let s = seeded();
  let mut c = ctx(&s, &["base"]);
  create(&mut c, &[("frame_name", "gear"), ("size", "10"), ("label", "{missing.size}")]);
  c.create_frame([
    ("frame_name", SlotInput::from("kit")),
    ("ako", SlotInput::from("$gear")),
    ("parts", SlotInput::from(vec!["a", "b"])),
  ])
  .unwrap();

  let kit = frame(&mut c, "kit");
  let dump = c.dump(kit).unwrap();
  assert_eq!(dump.lines().collect::<Vec<_>>(), vec![
    "ako: $gear",
    "frame_name: \"kit\"",
    "label: \"{missing.size}\"",
    "parts: [",
    "  \"a\",",
    "  \"b\",",
    "]",
    "size: \"10\"",
  ]);
}

// ─── Files ───────────────────────────────────────────────────────────────────

#[test]
fn file_store_persists_committed_writes() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("frames.db");

  {
    let s = SqliteStore::open(&path).unwrap();
    seed(&s);
    let mut c = ctx(&s, &["base"]);
    create(&mut c, &[("frame_name", "gear"), ("size", "10")]);
    c.commit().unwrap();
  }

  let s = SqliteStore::open(&path).unwrap();
  assert_eq!(s.list_versions().unwrap().len(), 3);
  let mut c = ctx(&s, &["variant"]);
  let h = frame(&mut c, "gear");
  assert_eq!(text(&mut c, h, "size"), "10");
}
