//! The board's sync controller.
//!
//! `TaskSyncController` holds the task collection the board shows and a
//! small state machine driven by identity changes:
//!
//! ```text
//! Idle --guest--> Live
//! Idle --sign in--> LoadingRemote --first delivery--> Live
//! ```
//!
//! Guest intents mutate the collection and save it locally. Signed-in
//! intents only issue remote writes; the collection follows the remote feed.
//! Background work (feed forwarding, remote writes) runs on spawned tasks
//! that report back through an event channel, drained by
//! [`TaskSyncController::next_update`] or
//! [`TaskSyncController::process_pending`]. Every event is tagged with the
//! identity session that produced it, and events from an earlier session
//! are dropped.
//!
//! Intents spawn Tokio tasks and must be called from within a runtime.

use std::sync::Arc;
use std::time::Duration;

use taskflow_proto::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus, seed_tasks};
use tokio::sync::mpsc;

use super::Celebrate;
use crate::identity::Identity;
use crate::remote::{RemoteError, RemoteStore, Subscription, SubscriptionHandle, WriteKind};
use crate::store::LocalStore;
use crate::tasks::{self, Mutation, TaskError, build_task, validate_title};

/// Default time a remote write may take before it is treated as failed.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Loading state of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Signed out; nothing to show.
    Idle,
    /// Waiting for the first remote delivery.
    LoadingRemote,
    /// The collection is current.
    Live,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::LoadingRemote => write!(f, "loading"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// What processing one controller event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// The first delivery of a session filled the board.
    Loaded {
        /// Tasks delivered.
        count: usize,
    },
    /// The first delivery of a session was empty; the seed set was shown
    /// and written to the remote store.
    Seeded {
        /// Seed tasks created.
        count: usize,
    },
    /// A later delivery replaced the board.
    Replaced {
        /// Tasks delivered.
        count: usize,
    },
    /// A remote write failed and the same edit was applied locally.
    FellBack {
        /// Which write failed.
        kind: WriteKind,
        /// The task it targeted.
        task_id: TaskId,
        /// Why it failed.
        error: RemoteError,
    },
    /// The event belonged to an earlier identity session and was dropped.
    Stale,
}

enum SyncEvent {
    Delivery {
        epoch: u64,
        tasks: Vec<Task>,
    },
    WriteFailed {
        epoch: u64,
        kind: WriteKind,
        fallback: Mutation,
        error: RemoteError,
    },
}

/// A remote write waiting to be issued.
enum RemoteWrite {
    Create(Task),
    Update(TaskId, TaskPatch),
    Delete(TaskId),
}

impl RemoteWrite {
    const fn kind(&self) -> WriteKind {
        match self {
            Self::Create(_) => WriteKind::Create,
            Self::Update(..) => WriteKind::Update,
            Self::Delete(_) => WriteKind::Delete,
        }
    }

    fn task_id(&self) -> &TaskId {
        match self {
            Self::Create(task) => &task.id,
            Self::Update(id, _) | Self::Delete(id) => id,
        }
    }

    async fn run<R: RemoteStore>(&self, remote: &R, user: &str) -> Result<(), RemoteError> {
        match self {
            Self::Create(task) => remote.create(user, task).await,
            Self::Update(id, patch) => remote.update(user, id, patch).await,
            Self::Delete(id) => remote.delete(user, id).await,
        }
    }
}

/// One subscribe call and everything scoped to it.
struct FeedSession {
    epoch: u64,
    user: String,
    handle: SubscriptionHandle,
    forwarder: tokio::task::JoinHandle<()>,
    has_initialized: bool,
}

impl FeedSession {
    fn close(self) {
        self.handle.cancel();
        self.forwarder.abort();
        tracing::debug!(user = %self.user, epoch = self.epoch, "closed remote feed");
    }
}

/// Owns the board collection and keeps it in sync with the active backend.
pub struct TaskSyncController<L: LocalStore, R: RemoteStore, C: Celebrate> {
    local: L,
    remote: Arc<R>,
    celebrate: C,
    identity: Identity,
    tasks: Vec<Task>,
    state: SyncState,
    feed: Option<FeedSession>,
    epoch: u64,
    write_timeout: Duration,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl<L: LocalStore, R: RemoteStore, C: Celebrate> TaskSyncController<L, R, C> {
    /// Create a signed-out controller.
    pub fn new(local: L, remote: Arc<R>, celebrate: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            local,
            remote,
            celebrate,
            identity: Identity::Unauthenticated,
            tasks: Vec::new(),
            state: SyncState::Idle,
            feed: None,
            epoch: 0,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            events_tx,
            events_rx,
        }
    }

    /// Set how long a remote write may take before falling back.
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// The current identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The current collection, in arrival order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up a task by id.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// The loading state.
    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// Switch to a new identity.
    ///
    /// The previous remote feed, if any, is cancelled before the new backend
    /// is engaged. Re-entering the same identity reloads it from scratch.
    pub async fn set_identity(&mut self, identity: Identity) {
        if let Some(session) = self.feed.take() {
            session.close();
        }
        self.epoch += 1;
        tracing::info!(identity = %identity, epoch = self.epoch, "identity changed");
        self.identity = identity.clone();

        match identity {
            Identity::Unauthenticated => {
                self.tasks.clear();
                self.state = SyncState::Idle;
            }
            Identity::Guest => {
                self.tasks = self.local.load();
                self.state = SyncState::Live;
            }
            Identity::Authenticated(user) => {
                self.tasks.clear();
                self.state = SyncState::LoadingRemote;
                let epoch = self.epoch;
                let Subscription { mut feed, handle } = self.remote.subscribe(&user).await;
                let events = self.events_tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(tasks) = feed.recv().await {
                        if events.send(SyncEvent::Delivery { epoch, tasks }).is_err() {
                            break;
                        }
                    }
                });
                self.feed = Some(FeedSession {
                    epoch,
                    user,
                    handle,
                    forwarder,
                    has_initialized: false,
                });
            }
        }
    }

    /// Add a task to the todo column.
    ///
    /// Returns the new task id, or `None` if signed out.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] if the title is empty or too long.
    pub fn add_task(&mut self, draft: NewTask) -> Result<Option<TaskId>, TaskError> {
        let task = build_task(draft)?;
        let id = task.id.clone();
        let accepted = self.dispatch(Mutation::Add(task.clone()), RemoteWrite::Create(task));
        Ok(accepted.then_some(id))
    }

    /// Move a task to another column.
    ///
    /// Unknown ids and moves to the current column are ignored. Moving a task
    /// into `done` from any other column fires the celebrate hook. Returns
    /// whether the move was issued.
    pub fn move_task(&mut self, id: &TaskId, status: TaskStatus) -> bool {
        let Some(current) = self.task(id).map(|t| t.status) else {
            tracing::debug!(task_id = %id, "ignoring move of unknown task");
            return false;
        };
        if current == status {
            return false;
        }
        if status == TaskStatus::Done {
            self.celebrate.celebrate();
        }
        self.dispatch(
            Mutation::SetStatus {
                id: id.clone(),
                status,
            },
            RemoteWrite::Update(id.clone(), TaskPatch::status(status)),
        )
    }

    /// Delete a task. Unknown ids leave the board unchanged.
    ///
    /// Returns whether the delete was issued: for a guest, whether a task
    /// was removed.
    pub fn delete_task(&mut self, id: &TaskId) -> bool {
        self.dispatch(Mutation::Delete(id.clone()), RemoteWrite::Delete(id.clone()))
    }

    /// Replace the editable details of the task with the same id.
    ///
    /// Status is not changed; optional details unset on `task` are cleared.
    /// Returns whether the edit was issued. Unknown ids are ignored, and a
    /// guest edit that changes nothing is not saved and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] if the new title is empty or too long.
    pub fn update_task_details(&mut self, task: Task) -> Result<bool, TaskError> {
        validate_title(&task.title)?;
        if self.task(&task.id).is_none() {
            tracing::debug!(task_id = %task.id, "ignoring edit of unknown task");
            return Ok(false);
        }
        let write = RemoteWrite::Update(task.id.clone(), TaskPatch::details_of(&task));
        Ok(self.dispatch(Mutation::Details(task), write))
    }

    /// Wait for the next background event and apply it.
    ///
    /// Cancel-safe: dropping the future before it completes loses no event.
    pub async fn next_update(&mut self) -> Option<SyncUpdate> {
        let event = self.events_rx.recv().await?;
        Some(self.handle_event(event))
    }

    /// Apply every background event that is already queued, without waiting.
    pub fn process_pending(&mut self) -> Vec<SyncUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            updates.push(self.handle_event(event));
        }
        updates
    }

    /// Route a mutation to the backend of the current identity. Returns
    /// `false` when signed out or when a guest mutation changed nothing.
    fn dispatch(&mut self, mutation: Mutation, write: RemoteWrite) -> bool {
        match &self.identity {
            Identity::Unauthenticated => {
                tracing::debug!(task_id = %mutation.task_id(), "ignoring board intent while signed out");
                false
            }
            Identity::Guest => {
                let changed = tasks::apply(&mut self.tasks, &mutation);
                if changed {
                    self.local.save(&self.tasks);
                }
                changed
            }
            Identity::Authenticated(user) => {
                let user = user.clone();
                self.spawn_write(user, write, Some(mutation));
                true
            }
        }
    }

    /// Issue a remote write on a background task. On failure or timeout the
    /// `fallback`, if any, comes back as an event.
    fn spawn_write(&self, user: String, write: RemoteWrite, fallback: Option<Mutation>) {
        let remote = Arc::clone(&self.remote);
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let timeout = self.write_timeout;

        tokio::spawn(async move {
            let kind = write.kind();
            let error = match tokio::time::timeout(timeout, write.run(remote.as_ref(), &user)).await
            {
                Ok(Ok(())) => {
                    tracing::trace!(user = %user, kind = %kind, task_id = %write.task_id(), "remote write done");
                    return;
                }
                Ok(Err(e)) => e,
                Err(_) => RemoteError::Timeout,
            };
            tracing::warn!(
                user = %user,
                kind = %kind,
                task_id = %write.task_id(),
                error = %error,
                "remote write failed"
            );
            if let Some(fallback) = fallback {
                let _ = events.send(SyncEvent::WriteFailed {
                    epoch,
                    kind,
                    fallback,
                    error,
                });
            }
        });
    }

    fn handle_event(&mut self, event: SyncEvent) -> SyncUpdate {
        match event {
            SyncEvent::Delivery { epoch, tasks } => self.apply_delivery(epoch, tasks),
            SyncEvent::WriteFailed {
                epoch,
                kind,
                fallback,
                error,
            } => {
                if epoch != self.epoch {
                    tracing::debug!(epoch, current = self.epoch, "dropping fallback from an earlier session");
                    return SyncUpdate::Stale;
                }
                let task_id = fallback.task_id().clone();
                tracing::info!(kind = %kind, task_id = %task_id, "applying local fallback for failed write");
                tasks::apply(&mut self.tasks, &fallback);
                SyncUpdate::FellBack {
                    kind,
                    task_id,
                    error,
                }
            }
        }
    }

    fn apply_delivery(&mut self, epoch: u64, delivered: Vec<Task>) -> SyncUpdate {
        let Some(session) = self.feed.as_mut().filter(|s| s.epoch == epoch) else {
            tracing::debug!(epoch, current = self.epoch, "dropping delivery from an earlier session");
            return SyncUpdate::Stale;
        };

        let count = delivered.len();
        if session.has_initialized {
            self.tasks = delivered;
            return SyncUpdate::Replaced { count };
        }

        session.has_initialized = true;
        let user = session.user.clone();
        self.state = SyncState::Live;

        if !delivered.is_empty() {
            tracing::info!(user = %user, count, "remote board loaded");
            self.tasks = delivered;
            return SyncUpdate::Loaded { count };
        }

        self.tasks = seed_tasks();
        tracing::info!(user = %user, count = self.tasks.len(), "remote board empty, seeding");
        for task in &self.tasks {
            self.spawn_write(user.clone(), RemoteWrite::Create(task.clone()), None);
        }
        SyncUpdate::Seeded {
            count: self.tasks.len(),
        }
    }
}

impl<L: LocalStore, R: RemoteStore, C: Celebrate> Drop for TaskSyncController<L, R, C> {
    fn drop(&mut self) {
        if let Some(session) = self.feed.take() {
            session.close();
        }
    }
}

impl<L: LocalStore, R: RemoteStore, C: Celebrate> std::fmt::Debug for TaskSyncController<L, R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSyncController")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("tasks", &self.tasks.len())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
