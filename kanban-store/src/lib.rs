//! Kanban task store.
//!
//! An in-memory implementation of the board's persistence contract with
//! per-project task keys, soft deletion and snapshot-file persistence.

pub mod store;

pub use store::{StoreError, TaskStore};
