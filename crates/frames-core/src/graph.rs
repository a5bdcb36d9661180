//! The version requirement graph and the partial order derived from it.
//!
//! `required_map[v]` holds every version `v` requires, directly or
//! transitively. A version is *more specific* than every version it
//! requires; [`RequirementGraph::better_fit`] lifts that relation to the
//! version sets slot rows are attached to.

use std::collections::{BTreeMap, BTreeSet};

use crate::version::VersionId;

/// Outcome of comparing candidate A's version set against candidate B's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
  /// A is strictly the better match.
  Better,
  /// A is tied to fewer versions than B; B may still win the reverse check.
  Fewer,
  /// Some version of B is more specific than some version of A.
  Worse,
  /// B holds versions that nothing in A matches or dominates.
  Disjoint,
  /// Both sets are the same.
  Identical,
  /// Neither more specific nor larger.
  NotBetter,
}

impl Fit {
  pub fn is_better(self) -> bool { matches!(self, Self::Better) }
}

/// Transitive requirement map over the versions reachable from a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementGraph {
  required_map: BTreeMap<VersionId, BTreeSet<VersionId>>,
}

impl RequirementGraph {
  /// Build the transitive map from direct `(version, required)` edges.
  pub fn from_edges<I>(edges: I) -> Self
  where
    I: IntoIterator<Item = (VersionId, VersionId)>,
  {
    let mut direct: BTreeMap<VersionId, BTreeSet<VersionId>> = BTreeMap::new();
    for (version, required) in edges {
      direct.entry(version).or_default().insert(required);
    }

    let required_map = direct
      .keys()
      .map(|&version| {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<VersionId> = direct[&version].iter().copied().collect();
        while let Some(next) = stack.pop() {
          if seen.insert(next) {
            if let Some(deeper) = direct.get(&next) {
              stack.extend(deeper.iter().copied().filter(|v| !seen.contains(v)));
            }
          }
        }
        (version, seen)
      })
      .collect();

    Self { required_map }
  }

  /// Everything `version` requires, transitively.
  pub fn required_by(&self, version: VersionId) -> Option<&BTreeSet<VersionId>> {
    self.required_map.get(&version)
  }

  pub fn required_map(&self) -> &BTreeMap<VersionId, BTreeSet<VersionId>> { &self.required_map }

  /// `true` iff `version` transitively requires `other`.
  pub fn requires(&self, version: VersionId, other: VersionId) -> bool {
    self.required_map.get(&version).is_some_and(|req| req.contains(&other))
  }

  /// `active` plus every version any of them requires.
  pub fn closure(&self, active: &BTreeSet<VersionId>) -> BTreeSet<VersionId> {
    let mut all = active.clone();
    for version in active {
      if let Some(req) = self.required_map.get(version) {
        all.extend(req.iter().copied());
      }
    }
    all
  }

  /// Decide whether version set `a` is a better match than `b`.
  ///
  /// Only [`Fit::Better`] counts as a win. The comparison is never used to
  /// break ties silently: when no candidate beats every other one the
  /// selector reports a conflict.
  pub fn better_fit(&self, a: &BTreeSet<VersionId>, b: &BTreeSet<VersionId>) -> Fit {
    if b.len() > a.len() {
      return Fit::Fewer;
    }

    let mut better = 0;
    let mut matches = 0;
    for &v in a {
      for &w in b {
        if v == w {
          matches += 1;
        } else if self.requires(v, w) {
          better += 1;
        } else if self.requires(w, v) {
          return Fit::Worse;
        }
      }
    }

    if better + matches < b.len() {
      Fit::Disjoint
    } else if matches == b.len() && matches == a.len() {
      Fit::Identical
    } else if better > 0 || a.len() > b.len() {
      Fit::Better
    } else {
      Fit::NotBetter
    }
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;

  fn v(id: i64) -> VersionId { VersionId(id) }

  fn set(ids: &[i64]) -> BTreeSet<VersionId> { ids.iter().copied().map(VersionId).collect() }

  /// base(1) <- variant(2) <- deluxe(3); other(4) requires base.
  fn diamond() -> RequirementGraph {
    RequirementGraph::from_edges([(v(2), v(1)), (v(3), v(2)), (v(4), v(1))])
  }

  #[test]
  fn closure_is_transitive() {
    let g = diamond();
    assert_eq!(g.required_by(v(3)), Some(&set(&[1, 2])));
    assert_eq!(g.closure(&set(&[3])), set(&[1, 2, 3]));
    assert_eq!(g.closure(&set(&[3, 4])), set(&[1, 2, 3, 4]));
    assert_eq!(g.closure(&set(&[1])), set(&[1]));
  }

  #[test]
  fn closure_survives_cycles() {
    let g = RequirementGraph::from_edges([(v(1), v(2)), (v(2), v(1))]);
    assert_eq!(g.closure(&set(&[1])), set(&[1, 2]));
  }

  #[test]
  fn more_specific_version_wins() {
    let g = diamond();
    assert_eq!(g.better_fit(&set(&[2]), &set(&[1])), Fit::Better);
    assert_eq!(g.better_fit(&set(&[1]), &set(&[2])), Fit::Worse);
  }

  #[test]
  fn superset_beats_subset() {
    let g = diamond();
    assert_eq!(g.better_fit(&set(&[1, 2]), &set(&[1])), Fit::Better);
    assert_eq!(g.better_fit(&set(&[1]), &set(&[1, 2])), Fit::Fewer);
  }

  #[test]
  fn unrelated_versions_are_disjoint() {
    let g = diamond();
    assert_eq!(g.better_fit(&set(&[2]), &set(&[4])), Fit::Disjoint);
    assert_eq!(g.better_fit(&set(&[4]), &set(&[2])), Fit::Disjoint);
  }

  #[test]
  fn identical_sets_never_win() {
    let g = diamond();
    assert_eq!(g.better_fit(&set(&[2, 4]), &set(&[2, 4])), Fit::Identical);
  }

  fn edges() -> impl Strategy<Value = Vec<(VersionId, VersionId)>> {
    // Edges only point from higher to lower ids, which keeps the graph a DAG.
    prop::collection::vec((1i64..12, 1i64..12), 0..30).prop_map(|pairs| {
      pairs
        .into_iter()
        .filter(|(a, b)| a > b)
        .map(|(a, b)| (VersionId(a), VersionId(b)))
        .collect()
    })
  }

  fn version_set() -> impl Strategy<Value = BTreeSet<VersionId>> {
    prop::collection::btree_set((1i64..12).prop_map(VersionId), 1..5)
  }

  proptest! {
    #[test]
    fn closure_contains_start_and_is_monotonic(
      edges in edges(),
      start in version_set(),
      extra in 1i64..12,
    ) {
      let g = RequirementGraph::from_edges(edges);
      let base = g.closure(&start);
      prop_assert!(start.is_subset(&base));

      let mut bigger = start.clone();
      bigger.insert(VersionId(extra));
      prop_assert!(base.is_subset(&g.closure(&bigger)));
    }

    #[test]
    fn closure_is_closed_under_requires(edges in edges(), start in version_set()) {
      let g = RequirementGraph::from_edges(edges.clone());
      let all = g.closure(&start);
      for (from, to) in edges {
        if all.contains(&from) {
          prop_assert!(all.contains(&to));
        }
      }
    }

    #[test]
    fn better_fit_is_antisymmetric(edges in edges(), a in version_set(), b in version_set()) {
      let g = RequirementGraph::from_edges(edges);
      prop_assert!(!(g.better_fit(&a, &b).is_better() && g.better_fit(&b, &a).is_better()));
    }
  }
}
