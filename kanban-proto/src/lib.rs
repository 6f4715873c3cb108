//! Shared task model, repository contract and snapshot format for the Kanban board.

pub mod codec;
pub mod project;
pub mod repository;
pub mod task;
