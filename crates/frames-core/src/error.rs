//! Error types for `frames-core`.
//!
//! Every variant is fatal: resolution runs over data that is expected to be
//! consistent, so a failure means bad input data or a genuine conflict.

use std::{collections::BTreeSet, fmt};

use thiserror::Error;

use crate::{
  slot::{FrameId, FrameLabel, SlotId, SlotKey},
  version::VersionId,
};

/// One competing slot row and the exact version set it is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
  pub slot_id:  SlotId,
  pub versions: BTreeSet<VersionId>,
}

impl fmt::Display for Candidate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{:?}", self.slot_id, self.versions.iter().map(|v| v.0).collect::<Vec<_>>())
  }
}

/// Formats a candidate list as `slot[versions], ...` for error messages.
pub struct CandidateList<'a>(pub &'a [Candidate]);

impl fmt::Display for CandidateList<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, c) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{c}")?;
    }
    Ok(())
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown version names: {}", .0.join(", "))]
  UnknownVersions(Vec<String>),

  #[error("a version context needs at least one version name")]
  NoVersions,

  #[error("version {0:?} already exists")]
  DuplicateVersion(String),

  #[error("version {0:?} is final and cannot return to proposed")]
  FinalIsFinal(String),

  #[error("slot version conflict at {key} between {}", CandidateList(.candidates))]
  SlotConflict { key: SlotKey, candidates: Vec<Candidate> },

  #[error("impossible slot version conflict at {key} between {}", CandidateList(.candidates))]
  ImpossibleConflict { key: SlotKey, candidates: Vec<Candidate> },

  #[error("frame {frame_id}: slot {name:?} mixes a scalar row with list rows")]
  MixedSlotShape { frame_id: FrameId, name: String },

  #[error("frame {0} not found")]
  FrameNotFound(FrameLabel),

  #[error("slot {frame}.{name} not found")]
  SlotNotFound { frame: String, name: String },

  #[error("slot {0} not found")]
  SlotIdNotFound(SlotId),

  #[error("can not make changes to frozen versions {0}")]
  Frozen(String),

  #[error("template {template:?} failed: {reason}")]
  Template { template: String, reason: String },

  #[error("frame {frame}: {link} slot {value:?} does not refer to a frame")]
  InvalidLink { frame: String, link: &'static str, value: String },

  #[error("{value:?} is not a legal boolean value")]
  InvalidBoolean { value: String },

  #[error("slot {0:?} is not allowed to have multiple values")]
  MultiValuedReserved(String),

  #[error("frame {frame}: splicing {name:?} refers back to itself")]
  SpliceCycle { frame: String, name: String },

  #[error("frame {frame}: ako/isa links loop back while resolving {name:?}")]
  InheritanceCycle { frame: String, name: String },

  #[error("frame {frame}: scalar slot {name:?} refers to a splice frame")]
  ScalarSplice { frame: String, name: String },

  #[error("frame {frame}: {name:?} is not a list")]
  NotAList { frame: String, name: String },

  #[error("frame {frame}: list {name:?} has no element {index}")]
  ListIndex { frame: String, name: String, index: usize },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a storage backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// `true` for lookup misses that inheritance is allowed to recover from.
  pub fn is_not_found(&self) -> bool { matches!(self, Self::SlotNotFound { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
