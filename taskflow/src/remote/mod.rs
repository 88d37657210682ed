//! Remote document store abstraction for signed-in boards.
//!
//! Defines the [`RemoteStore`] trait that all remote backends must satisfy.
//! Concrete implementations include:
//! - [`memory::MemoryRemoteStore`]: in-process store with fault injection
//! - [`relay::RelayClient`]: documents held by a `taskflow-relay` server
//!
//! A store keeps one collection per user key. Writes are independent and
//! are never retried here; the live feed from [`RemoteStore::subscribe`] is
//! the only source of truth for what the board shows.

pub mod memory;
pub mod relay;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use taskflow_proto::codec::CodecError;
use taskflow_proto::task::{Task, TaskId, TaskPatch};
use taskflow_proto::wire::RejectReason;
use tokio::sync::mpsc;

/// Errors that can occur during remote store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The store refused the write.
    #[error("write rejected: {0}")]
    Rejected(String),

    /// The target document does not exist.
    #[error("document {0} not found")]
    NotFound(TaskId),

    /// The signed-in account may not touch this collection.
    #[error("permission denied")]
    PermissionDenied,

    /// The connection to the store is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation did not complete in time.
    #[error("remote operation timed out")]
    Timeout,

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl RemoteError {
    /// Map a relay rejection for a request that targeted `task_id`.
    #[must_use]
    pub fn from_reject(reason: RejectReason, task_id: Option<&TaskId>) -> Self {
        match reason {
            RejectReason::NotFound => task_id.map_or_else(
                || Self::Rejected("document not found".to_string()),
                |id| Self::NotFound(id.clone()),
            ),
            RejectReason::PermissionDenied => Self::PermissionDenied,
            RejectReason::Invalid(detail) => Self::Rejected(detail),
        }
    }
}

impl From<CodecError> for RemoteError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e.to_string())
    }
}

/// Kind of remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// [`RemoteStore::create`].
    Create,
    /// [`RemoteStore::update`].
    Update,
    /// [`RemoteStore::delete`].
    Delete,
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Stops the deliveries of one [`Subscription`].
///
/// Clones refer to the same subscription. [`SubscriptionHandle::cancel`] is
/// idempotent: the store-side teardown runs once, later calls do nothing.
#[derive(Clone)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Arc<Mutex<Option<CancelFn>>>,
}

impl SubscriptionHandle {
    /// Create a handle that runs `on_cancel` the first time it is cancelled.
    pub fn new(on_cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            on_cancel: Arc::new(Mutex::new(Some(Box::new(on_cancel)))),
        }
    }

    /// Handle with nothing to tear down.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(|| {})
    }

    /// Stop further deliveries.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let teardown = self.on_cancel.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether [`SubscriptionHandle::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A live feed over one user's collection.
///
/// Every delivery is the complete current collection, most recently updated
/// first. The first delivery is the state at subscribe time.
#[derive(Debug)]
pub struct Subscription {
    /// Collection snapshots, in delivery order.
    pub feed: mpsc::UnboundedReceiver<Vec<Task>>,
    /// Cancels the feed.
    pub handle: SubscriptionHandle,
}

impl Subscription {
    /// A feed that could not be established: it delivers one empty
    /// collection and then ends.
    #[must_use]
    pub fn failed(user: &str, error: &RemoteError) -> Self {
        tracing::warn!(user = %user, error = %error, "remote feed failed, delivering empty collection");
        let (tx, feed) = mpsc::unbounded_channel();
        let _ = tx.send(Vec::new());
        Self {
            feed,
            handle: SubscriptionHandle::detached(),
        }
    }
}

/// Async remote document store, one collection per user key.
pub trait RemoteStore: Send + Sync + 'static {
    /// Open a live feed over the collection of `user`.
    ///
    /// Never fails: a feed that cannot be established is reported as a
    /// single empty delivery (see [`Subscription::failed`]).
    fn subscribe(&self, user: &str) -> impl std::future::Future<Output = Subscription> + Send;

    /// Create a document keyed by the task id.
    fn create(
        &self,
        user: &str,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Merge `patch` into an existing document.
    ///
    /// Fails with [`RemoteError::NotFound`] if the document does not exist.
    fn update(
        &self,
        user: &str,
        task_id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Remove a document. Removing a missing document succeeds.
    fn delete(
        &self,
        user: &str,
        task_id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;
}
