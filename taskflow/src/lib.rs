//! `Task Flow`: kanban task board with guest and live-synced storage.

pub mod board;
pub mod cli;
pub mod config;
pub mod identity;
pub mod remote;
pub mod session;
pub mod store;
pub mod sync;
pub mod tasks;
