//! Core types and resolution engine for a versioned frames-and-slots store.
//!
//! A *frame* is an object identified by an id; a *slot* is a named attribute
//! on it, either a scalar or one positioned element of an ordered list. Slot
//! rows are attached to sets of *versions*, which form a requirement DAG.
//! Opening a [`VersionContext`] for some active versions picks, for every
//! (frame, name, position) key, the single row that best matches them, then
//! layers `ako`/`isa` inheritance, frame references, templates and list
//! splicing on top.
//!
//! Storage is abstracted behind [`SlotStore`]; see `frames-store-sqlite` for
//! the SQLite backend.

pub mod context;
mod dump;
pub mod error;
pub mod frame;
pub mod graph;
pub mod mutate;
pub mod select;
mod splice;
pub mod slot;
pub mod store;
pub mod template;
pub mod version;

pub use context::{RawFrame, VersionContext};
pub use error::{Candidate, Error, Result};
pub use frame::{FrameHandle, ListItem, LoadedFrame, RawEntry, SlotList, Splice, Value};
pub use graph::{Fit, RequirementGraph};
pub use mutate::SlotInput;
pub use slot::{FrameId, FrameLabel, Position, RawSlot, SlotId, SlotKey, StoredValue};
pub use store::{CandidateRow, NewSlot, SlotFilter, SlotStore, SlotUpdate};
pub use template::Leniency;
pub use version::{NewVersion, Version, VersionId, VersionStatus};
