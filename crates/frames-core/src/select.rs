//! Per-key candidate selection.
//!
//! Candidate rows are grouped by (frame, upper-cased name, position) and then
//! by slot id. Within a key, only slot rows whose whole version set lies
//! inside the context's required versions compete; the winner must be a
//! [`Fit::Better`] match than every other competitor.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::{
  Error, Result,
  error::Candidate,
  graph::{Fit, RequirementGraph},
  slot::{SlotId, SlotKey},
  store::CandidateRow,
  version::VersionId,
};

#[derive(Debug, Default)]
struct Competitor {
  versions: BTreeSet<VersionId>,
  desired:  bool,
}

/// Select the authoritative slot id for every key touched by `rows`.
///
/// Keys whose winner is an undesired row contribute nothing. Keys with no
/// eligible row contribute nothing either.
pub fn select_best_matches(
  rows: impl IntoIterator<Item = CandidateRow>,
  graph: &RequirementGraph,
  required: &BTreeSet<VersionId>,
) -> Result<Vec<SlotId>> {
  let mut groups: BTreeMap<SlotKey, BTreeMap<SlotId, Competitor>> = BTreeMap::new();
  for row in rows {
    let key = SlotKey::new(row.frame_id, &row.name, row.position);
    let competitor = groups.entry(key).or_default().entry(row.slot_id).or_default();
    competitor.versions.insert(row.version_id);
    competitor.desired |= row.desired;
  }

  let mut winners = Vec::new();
  for (key, competitors) in groups {
    let eligible: Vec<(SlotId, Competitor)> = competitors
      .into_iter()
      .filter(|(_, c)| c.versions.is_subset(required))
      .collect();

    if let Some((slot_id, desired)) = pick(&key, &eligible, graph)? {
      if desired {
        winners.push(slot_id);
      }
    }
  }
  Ok(winners)
}

fn pick(
  key: &SlotKey,
  eligible: &[(SlotId, Competitor)],
  graph: &RequirementGraph,
) -> Result<Option<(SlotId, bool)>> {
  match eligible {
    [] => Ok(None),
    [(slot_id, only)] => Ok(Some((*slot_id, only.desired))),
    _ => {
      let mut best: Option<(SlotId, bool)> = None;
      for (slot_id, candidate) in eligible {
        let beats_all = eligible
          .iter()
          .filter(|(other_id, _)| other_id != slot_id)
          .all(|(_, other)| graph.better_fit(&candidate.versions, &other.versions) == Fit::Better);
        if !beats_all {
          continue;
        }
        if best.is_some() {
          return Err(Error::ImpossibleConflict {
            key:        key.clone(),
            candidates: candidates(eligible),
          });
        }
        best = Some((*slot_id, candidate.desired));
      }

      match best {
        Some(winner) => {
          debug!(%key, slot_id = %winner.0, competitors = eligible.len(), "selected slot");
          Ok(Some(winner))
        }
        None => Err(Error::SlotConflict { key: key.clone(), candidates: candidates(eligible) }),
      }
    }
  }
}

fn candidates(eligible: &[(SlotId, Competitor)]) -> Vec<Candidate> {
  eligible
    .iter()
    .map(|(slot_id, c)| Candidate { slot_id: *slot_id, versions: c.versions.clone() })
    .collect()
}
