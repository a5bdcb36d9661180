//! [`VersionContext`]: a transaction-scoped view of the frames database
//! under one set of active versions.
//!
//! Opening a context resolves the requested version names once: their ids,
//! whether writes are allowed, the transitive requirement map and the full
//! set of required versions. Every read and write made through the context
//! sees that same resolution. The context also owns the arena of
//! materialised frames; nothing it hands out outlives it.
//!
//! In-place slot updates assume a single writer per proposed version. Two
//! contexts writing the same slot under the same active version set race,
//! and the last writer wins.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::{
  Error, Result,
  frame::{FrameHandle, FrameNode, LoadedFrame, Splice, Walk},
  graph::RequirementGraph,
  select::select_best_matches,
  slot::{AKO, FRAME_NAME, FrameId, FrameLabel, ISA, RawSlot, SlotKey, StoredValue},
  store::{SlotFilter, SlotStore},
  version::{Version, VersionId, VersionStatus},
};

/// Winning slot rows keyed by (frame, upper-cased name, position).
pub type RawFrame = BTreeMap<SlotKey, RawSlot>;

// ─── Context ─────────────────────────────────────────────────────────────────

/// Resolution state for one set of active versions, bound to one store
/// transaction.
///
/// Dropping a context without calling [`VersionContext::commit`] rolls the
/// transaction back.
pub struct VersionContext<'s, S: SlotStore> {
  pub(crate) store:       &'s S,
  pub(crate) user:        String,
  version_names:          Vec<String>,
  version_ids:            BTreeSet<VersionId>,
  frozen:                 bool,
  graph:                  RequirementGraph,
  required:               BTreeSet<VersionId>,
  /// `{FRAME_NAME.upper(): frame_id}`
  frame_names:            HashMap<String, FrameId>,
  /// Frame names as stored, by id.
  names_by_id:            HashMap<FrameId, String>,

  // ── Arena ─────────────────────────────────────────────────────────────
  pub(crate) loaded:       Vec<LoadedFrame>,
  pub(crate) loaded_index: HashMap<FrameId, usize>,
  pub(crate) nodes:        Vec<FrameNode>,
  pub(crate) roots:        HashMap<FrameId, FrameHandle>,
  pub(crate) contexts:     HashMap<(usize, Option<FrameHandle>, Vec<Splice>), FrameHandle>,
  /// (frame, list name) pairs currently being spliced.
  pub(crate) splicing:     HashSet<(FrameId, String)>,
  /// (frame, slot name) pairs whose templates are being rendered.
  pub(crate) rendering:    HashSet<(usize, String)>,
  /// Frames whose `ako`/`isa` links are being followed, per walk.
  pub(crate) inheriting:   HashSet<(Walk, FrameId, String)>,

  finished: bool,
}

impl<'s, S: SlotStore> VersionContext<'s, S> {
  /// Begin a transaction on `store` and resolve `version_names` for `user`.
  ///
  /// Fails with [`Error::UnknownVersions`] naming every version that does not
  /// exist.
  pub fn open<N>(store: &'s S, user: impl Into<String>, version_names: &[N]) -> Result<Self>
  where
    N: AsRef<str>,
  {
    if version_names.is_empty() {
      return Err(Error::NoVersions);
    }
    store.begin().map_err(Error::store)?;

    let mut ctx = Self {
      store,
      user: user.into(),
      version_names: version_names.iter().map(|n| n.as_ref().to_owned()).collect(),
      version_ids: BTreeSet::new(),
      frozen: true,
      graph: RequirementGraph::default(),
      required: BTreeSet::new(),
      frame_names: HashMap::new(),
      names_by_id: HashMap::new(),
      loaded: Vec::new(),
      loaded_index: HashMap::new(),
      nodes: Vec::new(),
      roots: HashMap::new(),
      contexts: HashMap::new(),
      splicing: HashSet::new(),
      rendering: HashSet::new(),
      inheriting: HashSet::new(),
      finished: false,
    };
    // Any failure from here on drops `ctx`, which rolls back.
    ctx.resolve_versions()?;
    ctx.load_frame_names()?;
    Ok(ctx)
  }

  fn resolve_versions(&mut self) -> Result<()> {
    let found: Vec<Version> =
      self.store.lookup_versions(&self.version_names).map_err(Error::store)?;

    let found_names: HashSet<String> = found.iter().map(|v| v.name.to_uppercase()).collect();
    let mut missing: Vec<String> = Vec::new();
    for name in &self.version_names {
      if !found_names.contains(&name.to_uppercase()) && !missing.contains(name) {
        missing.push(name.clone());
      }
    }
    if !missing.is_empty() {
      return Err(Error::UnknownVersions(missing));
    }

    self.frozen = !found.iter().any(|v| v.status == VersionStatus::Proposed);
    self.version_ids = found.iter().map(|v| v.version_id).collect();

    let edges = self.store.requires_edges(&self.version_ids).map_err(Error::store)?;
    self.graph = RequirementGraph::from_edges(edges);
    self.required = self.graph.closure(&self.version_ids);

    debug!(
      versions = ?self.version_names,
      active = ?self.version_ids,
      required = ?self.required,
      frozen = self.frozen,
      "resolved version context"
    );
    Ok(())
  }

  pub(crate) fn load_frame_names(&mut self) -> Result<()> {
    let slots = self.select_slots(&SlotFilter::names([FRAME_NAME]))?;
    self.frame_names.clear();
    self.names_by_id.clear();
    for slot in slots.into_values().filter(|slot| !slot.is_deleted()) {
      self.register_frame_name(&slot.value, slot.frame_id);
    }
    Ok(())
  }

  // ── Accessors ─────────────────────────────────────────────────────────

  pub fn user(&self) -> &str { &self.user }

  pub fn version_names(&self) -> &[String] { &self.version_names }

  /// Ids of the active versions, exactly as requested.
  pub fn version_ids(&self) -> &BTreeSet<VersionId> { &self.version_ids }

  /// Active versions plus everything they require.
  pub fn required_versions(&self) -> &BTreeSet<VersionId> { &self.required }

  pub fn graph(&self) -> &RequirementGraph { &self.graph }

  /// `true` unless at least one active version is still proposed.
  pub fn is_frozen(&self) -> bool { self.frozen }

  pub(crate) fn ensure_writable(&self) -> Result<()> {
    if self.frozen {
      return Err(Error::Frozen(self.version_names.join(", ")));
    }
    Ok(())
  }

  // ── Transaction ───────────────────────────────────────────────────────

  /// Commit everything written through this context.
  pub fn commit(mut self) -> Result<()> {
    self.finished = true;
    if let Err(e) = self.store.commit() {
      if let Err(rollback) = self.store.rollback() {
        warn!(error = %rollback, "rollback after failed commit failed");
      }
      return Err(Error::store(e));
    }
    debug!(versions = ?self.version_names, "committed version context");
    Ok(())
  }

  /// Discard everything written through this context.
  pub fn rollback(mut self) -> Result<()> {
    self.finished = true;
    self.store.rollback().map_err(Error::store)
  }

  // ── Selection ─────────────────────────────────────────────────────────

  /// The authoritative slot rows matching `filter` under this context.
  pub fn select_slots(&self, filter: &SlotFilter) -> Result<RawFrame> {
    let rows = self.store.slot_candidates(filter).map_err(Error::store)?;
    let ids = select_best_matches(rows, &self.graph, &self.required)?;
    if ids.is_empty() {
      return Ok(RawFrame::new());
    }
    let slots = self.store.slots_by_id(&ids).map_err(Error::store)?;
    Ok(slots.into_iter().map(|slot| (slot.key(), slot)).collect())
  }

  /// Resolve a label to a frame id. Ids pass through unchecked.
  pub fn frame_id(&self, label: &FrameLabel) -> Result<FrameId> {
    match label {
      FrameLabel::Id(id) => Ok(*id),
      FrameLabel::Name(name) => self
        .frame_names
        .get(&name.to_uppercase())
        .copied()
        .ok_or_else(|| Error::FrameNotFound(label.clone())),
    }
  }

  /// One frame's own slots, without inheritance.
  pub fn get_raw_frame(&self, label: &FrameLabel) -> Result<(FrameId, RawFrame)> {
    let frame_id = self.frame_id(label)?;
    Ok((frame_id, self.select_slots(&SlotFilter::Frame(frame_id))?))
  }

  /// The registered frame name of `frame_id`, if any.
  pub fn lookup_frame_name(&self, frame_id: FrameId) -> Option<&str> {
    self.names_by_id.get(&frame_id).map(String::as_str)
  }

  pub(crate) fn register_frame_name(&mut self, name: &str, frame_id: FrameId) {
    self.frame_names.insert(name.to_uppercase(), frame_id);
    self.names_by_id.insert(frame_id, name.to_owned());
  }

  // ── Search ────────────────────────────────────────────────────────────

  /// Frames whose resolved slots match every `(name, value)` criterion.
  ///
  /// Values compare case-insensitively; `*` matches any value that is not
  /// deleted. Frames deriving (through `ako` or `isa`) from a matching frame
  /// match too unless they override the slot themselves, except for
  /// `frame_name`, which is never inherited.
  pub fn frame_ids_with_slots<N, V>(&self, criteria: &[(N, V)]) -> Result<BTreeSet<FrameId>>
  where
    N: AsRef<str>,
    V: AsRef<str>,
  {
    if criteria.is_empty() {
      return Ok(BTreeSet::new());
    }

    let names = criteria
      .iter()
      .map(|(n, _)| n.as_ref())
      .chain([AKO, ISA])
      .collect::<Vec<_>>();
    let raw = self.select_slots(&SlotFilter::names(names))?;

    // {base_id: {derived_id}}, per link kind. Links to unknown frames lead
    // nowhere and are skipped.
    let mut derived = Derived::default();
    let (ako, isa) = (AKO.to_uppercase(), ISA.to_uppercase());
    for (key, slot) in &raw {
      let links = if key.name == ako {
        &mut derived.ako
      } else if key.name == isa {
        &mut derived.isa
      } else {
        continue;
      };
      if let StoredValue::FrameRef(label) = slot.stored() {
        if let Ok(base) = self.frame_id(&label) {
          links.entry(base).or_default().insert(key.frame_id);
        }
      }
    }

    let mut found: Option<BTreeSet<FrameId>> = None;
    for (name, value) in criteria {
      let name = name.as_ref().to_uppercase();
      let value = value.as_ref();
      let mut matches = BTreeSet::new();
      for (key, slot) in raw.iter().filter(|(k, _)| k.name == name) {
        if slot.is_deleted() || !(value == "*" || slot.value.eq_ignore_ascii_case(value)) {
          continue;
        }
        matches.insert(key.frame_id);
        if !name.eq_ignore_ascii_case(FRAME_NAME) {
          derived.collect(key.frame_id, false, key, &raw, &mut BTreeSet::new(), &mut matches);
        }
      }
      found = Some(match found {
        None => matches,
        Some(prev) => prev.intersection(&matches).copied().collect(),
      });
    }
    Ok(found.unwrap_or_default())
  }

  // ── Arena bookkeeping ─────────────────────────────────────────────────

  /// Drop cached frames so the next access re-reads them. Call after
  /// writes made behind the context's back.
  pub fn clear_cache(&mut self) {
    self.loaded.clear();
    self.loaded_index.clear();
    self.nodes.clear();
    self.roots.clear();
    self.contexts.clear();
  }
}

/// Frames linking to each frame through `ako` and `isa`.
#[derive(Default)]
struct Derived {
  ako: BTreeMap<FrameId, BTreeSet<FrameId>>,
  isa: BTreeMap<FrameId, BTreeSet<FrameId>>,
}

impl Derived {
  /// Add frames inheriting `key` from `base` that do not override it
  /// themselves. Lookups cross at most one `isa` link, so once `used_isa`
  /// only `ako` links are followed further down.
  fn collect(
    &self,
    base: FrameId,
    used_isa: bool,
    key: &SlotKey,
    raw: &RawFrame,
    seen: &mut BTreeSet<(FrameId, bool)>,
    out: &mut BTreeSet<FrameId>,
  ) {
    if !seen.insert((base, used_isa)) {
      return;
    }
    let isa_children = if used_isa { None } else { self.isa.get(&base) };
    let children = self
      .ako
      .get(&base)
      .into_iter()
      .flatten()
      .map(|&child| (child, used_isa))
      .chain(isa_children.into_iter().flatten().map(|&child| (child, true)));
    for (child, used_isa) in children {
      let own_key = SlotKey { frame_id: child, name: key.name.clone(), position: key.position };
      if raw.contains_key(&own_key) {
        continue;
      }
      out.insert(child);
      self.collect(child, used_isa, key, raw, seen, out);
    }
  }
}

impl<S: SlotStore> Drop for VersionContext<'_, S> {
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    match self.store.rollback() {
      Ok(()) => debug!(versions = ?self.version_names, "rolled back version context"),
      Err(e) => warn!(error = %e, "rollback of version context failed"),
    }
  }
}
