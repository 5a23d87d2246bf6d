//! flotilla-state — embedded persistence for job and tag records.
//!
//! Exposes the `JobStore` and `TagStore` traits the rest of the control
//! plane consumes, plus the redb-backed `RedbStore` implementing both.
//! Values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{JobStore, RedbStore, TagStore};
