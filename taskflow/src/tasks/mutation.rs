//! In-memory mutations of the working task collection.
//!
//! These are the synchronous edits a guest board makes directly, and the
//! edits a signed-in board falls back to when the matching remote write
//! fails. [`apply`] reports whether the collection actually changed so the
//! caller can skip persisting no-ops.

use taskflow_proto::task::{Task, TaskId, TaskPatch, TaskStatus};

/// A single edit to the working collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Append a new task.
    Add(Task),
    /// Move a task to another column.
    SetStatus {
        /// Task to move.
        id: TaskId,
        /// Destination column.
        status: TaskStatus,
    },
    /// Replace the user-editable details of a task.
    Details(Task),
    /// Remove a task.
    Delete(TaskId),
}

impl Mutation {
    /// The task this mutation targets.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Add(task) | Self::Details(task) => &task.id,
            Self::SetStatus { id, .. } | Self::Delete(id) => id,
        }
    }
}

/// Applies a mutation, returning `true` if the collection changed.
///
/// Adding a task whose id is already present replaces it in place rather
/// than duplicating it. Mutations that target an unknown id are no-ops.
pub fn apply(tasks: &mut Vec<Task>, mutation: &Mutation) -> bool {
    match mutation {
        Mutation::Add(task) => {
            if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
                if existing == task {
                    return false;
                }
                existing.clone_from(task);
            } else {
                tasks.push(task.clone());
            }
            true
        }
        Mutation::SetStatus { id, status } => match tasks.iter_mut().find(|t| &t.id == id) {
            Some(task) if task.status != *status => {
                task.status = *status;
                true
            }
            _ => false,
        },
        Mutation::Details(edited) => {
            let Some(task) = tasks.iter_mut().find(|t| t.id == edited.id) else {
                return false;
            };
            let before = task.clone();
            TaskPatch::details_of(edited).apply_to(task);
            *task != before
        }
        Mutation::Delete(id) => {
            let before = tasks.len();
            tasks.retain(|t| &t.id != id);
            tasks.len() != before
        }
    }
}
