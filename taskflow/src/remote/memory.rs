//! In-process remote store for tests and offline use.
//!
//! [`MemoryRemoteStore`] behaves like the relay's document store (stamped
//! documents, most-recent-first snapshots pushed to every feed after each
//! write) and additionally lets a test reject or stall individual write
//! kinds, break feeds, and count calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use taskflow_proto::document::{TaskDocument, into_tasks, sort_by_recency};
use taskflow_proto::task::{Task, TaskId, TaskPatch, now_millis};
use tokio::sync::mpsc;

use super::{RemoteError, RemoteStore, Subscription, SubscriptionHandle, WriteKind};

/// Injected misbehaviour for one write kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail immediately with [`RemoteError::Rejected`].
    Reject,
    /// Never complete.
    Hang,
}

#[derive(Debug)]
struct Feed {
    id: u64,
    tx: mpsc::UnboundedSender<Vec<Task>>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, HashMap<TaskId, TaskDocument>>,
    feeds: HashMap<String, Vec<Feed>>,
    next_feed_id: u64,
    last_stamp: u64,
    faults: HashMap<WriteKind, Fault>,
    calls: HashMap<WriteKind, usize>,
    subscribes: usize,
    unavailable: bool,
}

impl Inner {
    fn next_stamp(&mut self) -> u64 {
        self.last_stamp = now_millis().max(self.last_stamp + 1);
        self.last_stamp
    }

    fn snapshot(&self, user: &str) -> Vec<Task> {
        let mut documents: Vec<TaskDocument> = self
            .collections
            .get(user)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default();
        sort_by_recency(&mut documents);
        into_tasks(documents)
    }

    fn notify(&mut self, user: &str) {
        let snapshot = self.snapshot(user);
        if let Some(feeds) = self.feeds.get_mut(user) {
            feeds.retain(|feed| feed.tx.send(snapshot.clone()).is_ok());
        }
    }

    /// Count the call and report any fault injected for `kind`.
    fn begin_write(&mut self, kind: WriteKind) -> Option<Fault> {
        *self.calls.entry(kind).or_default() += 1;
        self.faults.get(&kind).copied()
    }
}

/// In-process [`RemoteStore`]. Clones share the same collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemoteStore {
    /// Empty store with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject `fault` for every subsequent write of `kind`.
    pub fn set_fault(&self, kind: WriteKind, fault: Fault) {
        self.inner.lock().faults.insert(kind, fault);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.inner.lock().faults.clear();
    }

    /// Make subsequent subscribes fail (the feed delivers an empty collection).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Number of write calls of `kind` received so far, faulted ones included.
    #[must_use]
    pub fn write_count(&self, kind: WriteKind) -> usize {
        self.inner.lock().calls.get(&kind).copied().unwrap_or(0)
    }

    /// Number of subscribe calls received so far.
    #[must_use]
    pub fn subscribe_count(&self) -> usize {
        self.inner.lock().subscribes
    }

    /// Number of live feeds for `user`.
    #[must_use]
    pub fn active_feeds(&self, user: &str) -> usize {
        self.inner
            .lock()
            .feeds
            .get(user)
            .map_or(0, |feeds| feeds.iter().filter(|f| !f.tx.is_closed()).count())
    }

    /// Current collection of `user`, most recently updated first.
    #[must_use]
    pub fn tasks(&self, user: &str) -> Vec<Task> {
        self.inner.lock().snapshot(user)
    }

    /// Store a raw document as another client would, bypassing faults.
    pub fn insert_document(&self, user: &str, mut document: TaskDocument) {
        let mut inner = self.inner.lock();
        document.updated_at = inner.next_stamp();
        inner
            .collections
            .entry(user.to_string())
            .or_default()
            .insert(document.id.clone(), document);
        inner.notify(user);
    }

    /// Push an extra snapshot of `user`'s collection to every feed.
    pub fn republish(&self, user: &str) {
        self.inner.lock().notify(user);
    }

    /// Fail every feed of `user`: each receives an empty collection and is
    /// then closed.
    pub fn break_feeds(&self, user: &str) {
        let feeds = self.inner.lock().feeds.remove(user).unwrap_or_default();
        tracing::warn!(user = %user, count = feeds.len(), "breaking remote feeds");
        for feed in feeds {
            let _ = feed.tx.send(Vec::new());
        }
    }

    /// Runs `write` under the lock unless a fault is injected for `kind`.
    fn checked_write(
        &self,
        kind: WriteKind,
        write: impl FnOnce(&mut Inner) -> Result<(), RemoteError>,
    ) -> Result<Result<(), RemoteError>, Fault> {
        let mut inner = self.inner.lock();
        if let Some(fault) = inner.begin_write(kind) {
            return Err(fault);
        }
        Ok(write(&mut inner))
    }
}

async fn fault_result(kind: WriteKind, fault: Fault) -> Result<(), RemoteError> {
    match fault {
        Fault::Reject => Err(RemoteError::Rejected(format!("injected {kind} failure"))),
        Fault::Hang => std::future::pending().await,
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn subscribe(&self, user: &str) -> Subscription {
        let (tx, feed) = mpsc::unbounded_channel();
        let feed_id = {
            let mut inner = self.inner.lock();
            inner.subscribes += 1;
            if inner.unavailable {
                drop(inner);
                return Subscription::failed(user, &RemoteError::ConnectionClosed);
            }
            let _ = tx.send(inner.snapshot(user));
            let id = inner.next_feed_id;
            inner.next_feed_id += 1;
            inner
                .feeds
                .entry(user.to_string())
                .or_default()
                .push(Feed { id, tx });
            id
        };

        let inner = Arc::clone(&self.inner);
        let owner = user.to_string();
        let handle = SubscriptionHandle::new(move || {
            if let Some(feeds) = inner.lock().feeds.get_mut(&owner) {
                feeds.retain(|f| f.id != feed_id);
            }
            tracing::debug!(user = %owner, feed_id, "remote feed cancelled");
        });
        Subscription { feed, handle }
    }

    async fn create(&self, user: &str, task: &Task) -> Result<(), RemoteError> {
        let outcome = self.checked_write(WriteKind::Create, |inner| {
            let stamp = inner.next_stamp();
            inner
                .collections
                .entry(user.to_string())
                .or_default()
                .insert(task.id.clone(), TaskDocument::from_task(task, stamp));
            inner.notify(user);
            Ok(())
        });
        match outcome {
            Ok(result) => result,
            Err(fault) => fault_result(WriteKind::Create, fault).await,
        }
    }

    async fn update(&self, user: &str, task_id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let outcome = self.checked_write(WriteKind::Update, |inner| {
            let stamp = inner.next_stamp();
            let document = inner
                .collections
                .get_mut(user)
                .and_then(|docs| docs.get_mut(task_id))
                .ok_or_else(|| RemoteError::NotFound(task_id.clone()))?;
            document.apply_patch(patch, stamp);
            inner.notify(user);
            Ok(())
        });
        match outcome {
            Ok(result) => result,
            Err(fault) => fault_result(WriteKind::Update, fault).await,
        }
    }

    async fn delete(&self, user: &str, task_id: &TaskId) -> Result<(), RemoteError> {
        let outcome = self.checked_write(WriteKind::Delete, |inner| {
            let removed = inner
                .collections
                .get_mut(user)
                .and_then(|docs| docs.remove(task_id))
                .is_some();
            if removed {
                inner.notify(user);
            }
            Ok(())
        });
        match outcome {
            Ok(result) => result,
            Err(fault) => fault_result(WriteKind::Delete, fault).await,
        }
    }
}
