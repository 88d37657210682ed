//! Board synchronization.
//!
//! [`TaskSyncController`] owns the working task collection and routes every
//! board intent to the backend selected by the current identity.

pub mod controller;

pub use controller::{DEFAULT_WRITE_TIMEOUT, SyncState, SyncUpdate, TaskSyncController};

/// Hook fired when a task is moved into the done column.
pub trait Celebrate: Send {
    /// Called once per qualifying move, at intent time.
    fn celebrate(&self);
}

impl<F: Fn() + Send> Celebrate for F {
    fn celebrate(&self) {
        self();
    }
}

/// A [`Celebrate`] hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCelebration;

impl Celebrate for NoCelebration {
    fn celebrate(&self) {}
}
