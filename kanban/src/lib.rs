//! Kanban board with optimistic drag-and-drop status changes.

pub mod board;
pub mod cli;
pub mod config;
pub mod ui;
