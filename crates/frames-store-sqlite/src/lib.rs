//! SQLite backend for the frames store.
//!
//! [`SqliteStore`] owns a single [`rusqlite::Connection`] and implements
//! [`frames_core::SlotStore`] on it. A version context drives the
//! connection's transaction, so open at most one context per store at a time.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
