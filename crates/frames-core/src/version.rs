//! Versions, the named configuration axes a slot value can vary along.
//!
//! Versions form a DAG through *requires* edges: resolving under a version
//! implicitly resolves under everything it requires. A version is frozen once
//! its status is [`VersionStatus::Final`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Database identifier of a version.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionId(pub i64);

impl fmt::Display for VersionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Write eligibility of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
  /// Still accepting slot writes.
  #[default]
  Proposed,
  /// Frozen; no further slot writes under this version alone.
  Final,
}

impl VersionStatus {
  /// The string stored in the `status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Proposed => "proposed",
      Self::Final => "final",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "proposed" => Some(Self::Proposed),
      "final" => Some(Self::Final),
      _ => None,
    }
  }

  pub fn is_final(self) -> bool { matches!(self, Self::Final) }
}

impl fmt::Display for VersionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Version ─────────────────────────────────────────────────────────────────

/// A persisted version row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
  pub version_id:         VersionId,
  pub name:               String,
  pub status:             VersionStatus,
  pub description:        Option<String>,
  pub creation_user:      String,
  pub creation_timestamp: DateTime<Utc>,
}

/// Input to [`crate::store::SlotStore::add_version`].
///
/// New versions always start out [`VersionStatus::Proposed`].
#[derive(Debug, Clone, Default)]
pub struct NewVersion {
  pub name:        String,
  pub description: Option<String>,
  /// Names of the versions this one requires (case-insensitive).
  pub requires:    Vec<String>,
}

impl NewVersion {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }

  pub fn requiring<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.requires.extend(names.into_iter().map(Into::into));
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_strings_roundtrip() {
    for status in [VersionStatus::Proposed, VersionStatus::Final] {
      assert_eq!(VersionStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(VersionStatus::parse("frozen"), None);
  }

  #[test]
  fn new_version_collects_requirements() {
    let v = NewVersion::new("variant").requiring(["base", "extras"]);
    assert_eq!(v.name, "variant");
    assert_eq!(v.requires, vec!["base".to_owned(), "extras".to_owned()]);
  }
}
