//! Line commands of the board shell.

use chrono::NaiveDateTime;
use taskflow_proto::task::{NewTask, ParseNameError, Priority, Task, TaskId, TaskStatus};

/// Help text printed by the `help` command.
pub const HELP: &str = "\
Commands:
  guest                          use the board on this device only
  login <email> <password>       sign in
  signup <email> <password>      create an account and sign in
  provider                       sign in with a third-party provider
  logout                         sign out
  add <title> [| description]    add a task to To Do
  mv <id> <todo|inprogress|done> move a task
  rm <id>                        delete a task
  edit <id> title <text>         rename a task
  edit <id> desc <text>          change the description
  edit <id> priority <level>     low, medium, high or urgent
  edit <id> due <when>           YYYY-MM-DD or YYYY-MM-DDTHH:MM
  edit <id> reminder <when>      YYYY-MM-DD or YYYY-MM-DDTHH:MM
  edit <id> <priority|due|reminder> -
                                 clear the field
  show                           print the board
  help                           print this help
  quit                           exit
Task ids may be abbreviated to any unique prefix.";

/// Format of due dates and reminders.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Errors from parsing a command line.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The first word is not a command.
    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),

    /// Arguments are missing or malformed.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// A status or priority name was not recognized.
    #[error(transparent)]
    InvalidName(#[from] ParseNameError),

    /// A date could not be parsed.
    #[error("invalid date {0:?}, expected YYYY-MM-DD or YYYY-MM-DDTHH:MM")]
    InvalidDate(String),
}

/// One edit of a task's details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailEdit {
    /// New title.
    Title(String),
    /// New description.
    Description(String),
    /// New priority, `None` to clear.
    Priority(Option<Priority>),
    /// New due date as `YYYY-MM-DDTHH:MM`, `None` to clear.
    Due(Option<String>),
    /// New reminder as `YYYY-MM-DDTHH:MM`, `None` to clear.
    Reminder(Option<String>),
}

impl DetailEdit {
    /// Apply the edit to a copy of the task.
    pub fn apply(self, task: &mut Task) {
        match self {
            Self::Title(title) => task.title = title,
            Self::Description(description) => task.description = description,
            Self::Priority(priority) => task.priority = priority,
            Self::Due(due) => task.due_date = due,
            Self::Reminder(reminder) => task.reminder = reminder,
        }
    }
}

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Continue as guest.
    Guest,
    /// Sign in with email and password.
    Login {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Create an account.
    Signup {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Third-party provider sign-in.
    Provider,
    /// Sign out.
    Logout,
    /// Add a task.
    Add(NewTask),
    /// Move a task.
    Move {
        /// Task id or unique prefix.
        id: String,
        /// Destination column.
        status: TaskStatus,
    },
    /// Delete a task.
    Remove {
        /// Task id or unique prefix.
        id: String,
    },
    /// Edit a task's details.
    Edit {
        /// Task id or unique prefix.
        id: String,
        /// The change.
        edit: DetailEdit,
    },
    /// Print the board.
    Show,
    /// Print the help text.
    Help,
    /// Exit.
    Quit,
}

impl Command {
    /// Parse one input line.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] describing what is wrong with the line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));

        match word.to_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "guest" => Ok(Self::Guest),
            "login" | "signin" => {
                let (email, password) = credentials(rest, "login <email> <password>")?;
                Ok(Self::Login { email, password })
            }
            "signup" | "register" => {
                let (email, password) = credentials(rest, "signup <email> <password>")?;
                Ok(Self::Signup { email, password })
            }
            "provider" => Ok(Self::Provider),
            "logout" | "signout" => Ok(Self::Logout),
            "add" => {
                let (title, description) = rest.split_once('|').unwrap_or((rest, ""));
                if title.trim().is_empty() {
                    return Err(ParseError::Usage("add <title> [| description]"));
                }
                Ok(Self::Add(NewTask::new(title.trim(), description.trim())))
            }
            "mv" | "move" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next(), args.next()) {
                    (Some(id), Some(status), None) => Ok(Self::Move {
                        id: id.to_string(),
                        status: status.parse()?,
                    }),
                    _ => Err(ParseError::Usage("mv <id> <todo|inprogress|done>")),
                }
            }
            "rm" | "delete" => {
                let mut args = rest.split_whitespace();
                match (args.next(), args.next()) {
                    (Some(id), None) => Ok(Self::Remove { id: id.to_string() }),
                    _ => Err(ParseError::Usage("rm <id>")),
                }
            }
            "edit" => parse_edit(rest),
            "show" | "ls" => Ok(Self::Show),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

fn credentials(rest: &str, usage: &'static str) -> Result<(String, String), ParseError> {
    let mut args = rest.split_whitespace();
    match (args.next(), args.next(), args.next()) {
        (Some(email), Some(password), None) => Ok((email.to_string(), password.to_string())),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn parse_edit(rest: &str) -> Result<Command, ParseError> {
    const USAGE: &str = "edit <id> <title|desc|priority|due|reminder> <value>";
    let mut parts = rest.splitn(3, char::is_whitespace);
    let (Some(id), Some(field), Some(value)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ParseError::Usage(USAGE));
    };
    let value = value.trim();
    if value.is_empty() {
        return Err(ParseError::Usage(USAGE));
    }

    // `-` clears an optional field.
    let set = (value != "-").then_some(value);
    let edit = match field.to_lowercase().as_str() {
        "title" => DetailEdit::Title(value.to_string()),
        "desc" | "description" => DetailEdit::Description(value.to_string()),
        "priority" => DetailEdit::Priority(set.map(str::parse::<Priority>).transpose()?),
        "due" => DetailEdit::Due(set.map(parse_date_time).transpose()?),
        "reminder" | "remind" => DetailEdit::Reminder(set.map(parse_date_time).transpose()?),
        _ => return Err(ParseError::Usage(USAGE)),
    };
    Ok(Command::Edit {
        id: id.to_string(),
        edit,
    })
}

/// Normalize a date or date-time to `YYYY-MM-DDTHH:MM`.
///
/// # Errors
///
/// Returns [`ParseError::InvalidDate`] if the value is neither form.
pub fn parse_date_time(value: &str) -> Result<String, ParseError> {
    let with_time = if value.contains('T') {
        value.to_string()
    } else {
        format!("{value}T00:00")
    };
    NaiveDateTime::parse_from_str(&with_time, DATE_TIME_FORMAT)
        .map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
        .map_err(|_| ParseError::InvalidDate(value.to_string()))
}

/// Find the task an abbreviated id refers to.
///
/// An exact match wins; otherwise the prefix must match exactly one task.
///
/// # Errors
///
/// Returns a message suitable for the shell if no task or several tasks
/// match.
pub fn resolve_id(tasks: &[Task], input: &str) -> Result<TaskId, String> {
    if let Some(task) = tasks.iter().find(|t| t.id.as_str() == input) {
        return Ok(task.id.clone());
    }
    let mut matches = tasks.iter().filter(|t| t.id.as_str().starts_with(input));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task.id.clone()),
        (None, _) => Err(format!("no task matches {input:?}")),
        (Some(_), Some(_)) => Err(format!("{input:?} matches several tasks, type more of the id")),
    }
}
