//! Task model shared by the board client and the relay.
//!
//! A [`Task`] is the unit of work shown on the board. Its JSON form
//! (camelCase field names, lowercase statuses) is the persisted local record
//! format, and its postcard form travels inside relay frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Returns the current time in milliseconds since the UNIX epoch.
#[must_use]
pub fn now_millis() -> u64 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Identifier of a task, unique within one user's collection.
///
/// Seed tasks use fixed ids (`task-1` ... `task-5`); tasks created on the
/// board get `task-<uuid v7>` so ids sort roughly by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh, time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("task-{}", Uuid::now_v7()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Board column a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// All statuses in board column order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "inprogress",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status or priority name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseNameError {
    /// What was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "inprogress" | "in-progress" | "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ParseNameError {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// Task priority set from the task details view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default when none is chosen.
    #[default]
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Urgent,
}

impl Priority {
    /// Returns the display name of the priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(ParseNameError {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// A task on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identifier, assigned once at creation.
    pub id: TaskId,
    /// Short title, non-empty at creation.
    pub title: String,
    /// Free-form description; empty when absent.
    #[serde(default)]
    pub description: String,
    /// Column the task is in.
    #[serde(default)]
    pub status: TaskStatus,
    /// Due date as a local `YYYY-MM-DDTHH:MM` datetime.
    #[serde(default)]
    pub due_date: Option<String>,
    /// Priority, unset until edited.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Reminder as a local `YYYY-MM-DDTHH:MM` datetime.
    #[serde(default)]
    pub reminder: Option<String>,
    /// Creation time (milliseconds since epoch).
    #[serde(default)]
    pub created_at: Option<u64>,
    /// Last remote write time (milliseconds since epoch), stamped by the server.
    #[serde(default)]
    pub updated_at: Option<u64>,
}

impl Task {
    /// Creates a task with only the core fields set.
    pub fn new(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        description: impl Into<String>,
        status: TaskStatus,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status,
            due_date: None,
            priority: None,
            reminder: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Payload of an "add task" intent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    /// Title entered by the user.
    pub title: String,
    /// Optional description entered by the user.
    pub description: String,
}

impl NewTask {
    /// Creates an add-task payload.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// A partial update to a task. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New due date; `Some(None)` clears it.
    pub due_date: Option<Option<String>>,
    /// New priority; `Some(None)` clears it.
    pub priority: Option<Option<Priority>>,
    /// New reminder; `Some(None)` clears it.
    pub reminder: Option<Option<String>>,
}

impl TaskPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// A patch replacing every user-editable detail of `task` (everything
    /// except id and status). Optional details unset on `task` are cleared.
    #[must_use]
    pub fn details_of(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            status: None,
            due_date: Some(task.due_date.clone()),
            priority: Some(task.priority),
            reminder: Some(task.reminder.clone()),
        }
    }

    /// Applies the patch to a task in place.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = &self.due_date {
            task.due_date.clone_from(due_date);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(reminder) = &self.reminder {
            task.reminder.clone_from(reminder);
        }
    }
}

/// The default tasks a brand-new collection starts with.
#[must_use]
pub fn seed_tasks() -> Vec<Task> {
    vec![
        Task::new(
            "task-1",
            "Brainstorm new feature ideas",
            "Think about what users might want next.",
            TaskStatus::Todo,
        ),
        Task::new(
            "task-2",
            "Design UI mockups",
            "Create wireframes and high-fidelity mockups in Figma.",
            TaskStatus::Todo,
        ),
        Task::new(
            "task-3",
            "Develop the new React components",
            "Build out the front-end components based on the designs.",
            TaskStatus::InProgress,
        ),
        Task::new(
            "task-4",
            "Set up API endpoints",
            "Create the necessary backend routes for the new feature.",
            TaskStatus::InProgress,
        ),
        Task::new(
            "task-5",
            "Review and refactor old code",
            "Clean up the existing codebase to improve maintainability.",
            TaskStatus::Done,
        ),
    ]
}
