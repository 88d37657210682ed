//! Task Flow relay server library.
//!
//! The relay is the remote document database for signed-in boards: it holds
//! accounts and per-user task collections, and pushes live snapshots of a
//! collection to every subscribed client after each write.

pub mod accounts;
pub mod config;
pub mod relay;
pub mod store;
