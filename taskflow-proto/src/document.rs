//! Remote task documents.
//!
//! The relay stores one [`TaskDocument`] per task under each user. Documents
//! are looser than [`Task`]: any field but the id may be missing (written by
//! an older client, or created through a partial update), so readers go
//! through [`TaskDocument::into_task`] which fills in safe defaults.

use serde::{Deserialize, Serialize};

use crate::task::{Priority, Task, TaskId, TaskPatch, TaskStatus};

/// A task as stored in a user's remote collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    /// Document key, equal to the task id.
    pub id: TaskId,
    /// Task title, if present.
    pub title: Option<String>,
    /// Task description, if present.
    pub description: Option<String>,
    /// Task status, if present.
    pub status: Option<TaskStatus>,
    /// Due date, if set.
    pub due_date: Option<String>,
    /// Priority, if set.
    pub priority: Option<Priority>,
    /// Reminder, if set.
    pub reminder: Option<String>,
    /// Creation time, if known.
    pub created_at: Option<u64>,
    /// Server-stamped time of the last create/update.
    pub updated_at: u64,
}

impl TaskDocument {
    /// Builds a document from a full task, stamping `updated_at`.
    #[must_use]
    pub fn from_task(task: &Task, updated_at: u64) -> Self {
        Self {
            id: task.id.clone(),
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            status: Some(task.status),
            due_date: task.due_date.clone(),
            priority: task.priority,
            reminder: task.reminder.clone(),
            created_at: task.created_at,
            updated_at,
        }
    }

    /// Converts to a [`Task`], defaulting a missing title/description to `""`
    /// and a missing status to [`TaskStatus::Todo`].
    #[must_use]
    pub fn into_task(self) -> Task {
        Task {
            id: self.id,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            due_date: self.due_date,
            priority: self.priority,
            reminder: self.reminder,
            created_at: self.created_at,
            updated_at: Some(self.updated_at),
        }
    }

    /// Applies a partial update and restamps the document.
    pub fn apply_patch(&mut self, patch: &TaskPatch, updated_at: u64) {
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(due_date) = &patch.due_date {
            self.due_date.clone_from(due_date);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(reminder) = &patch.reminder {
            self.reminder.clone_from(reminder);
        }
        self.updated_at = updated_at;
    }
}

/// Orders documents most-recently-updated first, ties broken by id.
pub fn sort_by_recency(documents: &mut [TaskDocument]) {
    documents.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Converts an ordered document list into the tasks a feed delivers.
#[must_use]
pub fn into_tasks(documents: Vec<TaskDocument>) -> Vec<Task> {
    documents.into_iter().map(TaskDocument::into_task).collect()
}
