//! Shared definitions for Task Flow: the task model, remote documents, and
//! the relay wire format.

pub mod account;
pub mod codec;
pub mod document;
pub mod task;
pub mod wire;
