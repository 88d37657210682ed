//! Board task helpers shared by every backend.
//!
//! Validation of user-entered task data and the in-memory [`Mutation`]s that
//! both the guest path and the remote-write fallback apply to the working
//! collection.

pub mod mutation;

pub use mutation::{Mutation, apply};

use taskflow_proto::task::{MAX_TASK_TITLE_LENGTH, NewTask, Task, TaskId, TaskStatus, now_millis};
use thiserror::Error;

/// Errors that can occur when building or editing a task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max 256 characters)")]
    TitleTooLong,
}

/// Checks a user-entered title.
///
/// # Errors
///
/// Returns [`TaskError::TitleEmpty`] if the title is empty or only
/// whitespace, or [`TaskError::TitleTooLong`] if it exceeds
/// [`MAX_TASK_TITLE_LENGTH`] characters.
pub fn validate_title(title: &str) -> Result<(), TaskError> {
    if title.trim().is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    Ok(())
}

/// Builds a fresh task from an add intent: new id, status `todo`, creation
/// time set, no extended fields.
///
/// # Errors
///
/// Returns a [`TaskError`] if the title is invalid.
pub fn build_task(draft: NewTask) -> Result<Task, TaskError> {
    validate_title(&draft.title)?;
    let mut task = Task::new(
        TaskId::generate(),
        draft.title,
        draft.description,
        TaskStatus::Todo,
    );
    task.created_at = Some(now_millis());
    Ok(task)
}
