//! Kanban board presentation.
//!
//! Groups the working collection into the three fixed columns and renders
//! it as plain text for the shell.

use std::fmt;

use taskflow_proto::task::{Priority, Task, TaskStatus};

/// Column heading for a status.
#[must_use]
pub const fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "To Do",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Done => "Done",
    }
}

/// Badge text for a priority.
#[must_use]
pub const fn priority_label(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "Low",
        Priority::Medium => "Medium",
        Priority::High => "High",
        Priority::Urgent => "Urgent",
    }
}

/// Deterministic `#RRGGBB` colour tag for a card title.
///
/// Classic 31-multiplier string hash over UTF-16 code units with 32-bit
/// wrap-around, keeping the low 24 bits.
#[must_use]
pub fn title_color(title: &str) -> String {
    let hash = title.encode_utf16().fold(0_i32, |hash, unit| {
        i32::from(unit).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash))
    });
    format!("#{:06X}", hash & 0x00FF_FFFF)
}

/// One column of the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Status shared by every task in the column.
    pub status: TaskStatus,
    /// Tasks in arrival order.
    pub tasks: Vec<Task>,
}

impl Column {
    /// Column heading.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        status_label(self.status)
    }

    /// Number of tasks in the column.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tasks.len()
    }
}

/// The three columns, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// To Do, In Progress, Done.
    pub columns: [Column; 3],
}

impl Board {
    /// Group tasks by status, preserving their relative order.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let columns = TaskStatus::ALL.map(|status| Column {
            status,
            tasks: tasks.iter().filter(|t| t.status == status).cloned().collect(),
        });
        Self { columns }
    }

    /// Total number of tasks on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.iter().map(Column::count).sum()
    }

    /// Whether the board has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for column in &self.columns {
            writeln!(f, "== {} ({}) ==", column.title(), column.count())?;
            if column.tasks.is_empty() {
                writeln!(f, "   (no tasks)")?;
            }
            for task in &column.tasks {
                write!(f, " - [{}] {} {}", task.id, title_color(&task.title), task.title)?;
                if let Some(priority) = task.priority {
                    write!(f, " <{}>", priority_label(priority))?;
                }
                if let Some(due) = &task.due_date {
                    write!(f, " due {due}")?;
                }
                if let Some(reminder) = &task.reminder {
                    write!(f, " remind {reminder}")?;
                }
                writeln!(f)?;
                if !task.description.is_empty() {
                    writeln!(f, "     {}", task.description)?;
                }
            }
        }
        Ok(())
    }
}
