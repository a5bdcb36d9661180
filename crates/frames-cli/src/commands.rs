//! Subcommand implementations. Each one opens its own version context and
//! commits only when it writes.

use anyhow::{Context as _, Result, bail};
use frames_core::{
  FrameLabel, NewVersion, RawSlot, SlotInput, SlotStore as _, VersionContext, VersionStatus,
};
use frames_store_sqlite::SqliteStore;

use crate::Settings;

fn open<'s>(store: &'s SqliteStore, settings: &Settings) -> Result<VersionContext<'s, SqliteStore>> {
  if settings.versions.is_empty() {
    bail!("no versions given; pass --versions or set `versions` in the config file");
  }
  VersionContext::open(store, settings.user.clone(), settings.versions.as_slice())
    .with_context(|| format!("failed to open versions {}", settings.versions.join(", ")))
}

/// Split `NAME=VALUE`.
fn split_pair(pair: &str) -> Result<(&str, &str)> {
  pair
    .split_once('=')
    .filter(|(name, _)| !name.is_empty())
    .with_context(|| format!("expected NAME=VALUE, got {pair:?}"))
}

// ─── Reads ────────────────────────────────────────────────────────────────────

pub fn dump(store: &SqliteStore, settings: &Settings, frame: &str) -> Result<()> {
  let mut ctx = open(store, settings)?;
  let h = ctx.get_frame(&FrameLabel::parse(frame))?;
  println!("{}", ctx.dump(h)?);
  Ok(())
}

pub fn raw(store: &SqliteStore, settings: &Settings, frame: &str) -> Result<()> {
  let ctx = open(store, settings)?;
  let (_, slots) = ctx.get_raw_frame(&FrameLabel::parse(frame))?;
  let rows: Vec<&RawSlot> = slots.values().collect();
  println!("{}", serde_json::to_string_pretty(&rows).context("failed to encode slots")?);
  Ok(())
}

pub fn find(store: &SqliteStore, settings: &Settings, criteria: &[String]) -> Result<()> {
  let ctx = open(store, settings)?;
  let criteria = criteria.iter().map(|c| split_pair(c)).collect::<Result<Vec<_>>>()?;
  for frame_id in ctx.frame_ids_with_slots(&criteria)? {
    match ctx.lookup_frame_name(frame_id) {
      Some(name) => println!("{frame_id}\t{name}"),
      None => println!("{frame_id}"),
    }
  }
  Ok(())
}

// ─── Writes ───────────────────────────────────────────────────────────────────

pub fn create(store: &SqliteStore, settings: &Settings, slots: &[String]) -> Result<()> {
  let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
  for pair in slots {
    let (name, value) = split_pair(pair)?;
    match grouped.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
      Some((_, values)) => values.push(value.to_owned()),
      None => grouped.push((name.to_owned(), vec![value.to_owned()])),
    }
  }
  let inputs = grouped.into_iter().map(|(name, mut values)| {
    let input = if values.len() == 1 { SlotInput::Scalar(values.remove(0)) } else { SlotInput::List(values) };
    (name, input)
  });

  let mut ctx = open(store, settings)?;
  let (frame_id, label) = ctx.create_frame(inputs)?;
  ctx.commit()?;
  println!("{frame_id}\t${label}");
  Ok(())
}

pub fn set(
  store: &SqliteStore,
  settings: &Settings,
  frame: &str,
  name: &str,
  mut values: Vec<String>,
  list: bool,
  description: Option<String>,
) -> Result<()> {
  let input = if list || values.len() > 1 { SlotInput::List(values) } else { SlotInput::Scalar(values.remove(0)) };
  let mut ctx = open(store, settings)?;
  let h = ctx.get_frame(&FrameLabel::parse(frame))?;
  ctx.set_slot(h, name, input, description)?;
  ctx.commit()?;
  Ok(())
}

pub fn delete(store: &SqliteStore, settings: &Settings, frame: &str, name: &str) -> Result<()> {
  let mut ctx = open(store, settings)?;
  let h = ctx.get_frame(&FrameLabel::parse(frame))?;
  ctx.delete_named_slot(h, name)?;
  ctx.commit()?;
  Ok(())
}

// ─── Versions ─────────────────────────────────────────────────────────────────

pub fn list_versions(store: &SqliteStore) -> Result<()> {
  for v in store.list_versions()? {
    println!("{}\t{}\t{}\t{}", v.version_id, v.name, v.status, v.description.unwrap_or_default());
  }
  Ok(())
}

pub fn add_version(
  store: &SqliteStore,
  settings: &Settings,
  name: String,
  requires: Vec<String>,
  description: Option<String>,
) -> Result<()> {
  let input = NewVersion { name, description, requires };
  let v = store.add_version(input, &settings.user)?;
  println!("{}\t{}", v.version_id, v.name);
  Ok(())
}

pub fn finalize_version(store: &SqliteStore, settings: &Settings, name: &str) -> Result<()> {
  store.set_version_status(name, VersionStatus::Final, &settings.user)?;
  Ok(())
}
