//! In-memory per-user task document collections with live feeds.
//!
//! The [`DocumentStore`] keeps one document map per user key. Every write
//! pushes the user's complete collection, ordered newest first, to each open
//! feed for that user. Feeds are plain unbounded channels; a feed whose
//! receiver has been dropped is pruned on the next write.

use std::collections::HashMap;

use taskflow_proto::document::{TaskDocument, sort_by_recency};
use taskflow_proto::task::{TaskId, TaskPatch, now_millis};
use tokio::sync::{RwLock, mpsc};

/// Errors returned by document writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The target document does not exist.
    #[error("document {0} not found")]
    NotFound(TaskId),
}

/// Identifier of an open feed, unique within one store.
pub type FeedId = u64;

struct Feed {
    id: FeedId,
    tx: mpsc::UnboundedSender<Vec<TaskDocument>>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, HashMap<TaskId, TaskDocument>>,
    feeds: HashMap<String, Vec<Feed>>,
    next_feed_id: FeedId,
    last_stamp: u64,
}

impl Inner {
    /// Returns a write timestamp strictly greater than any issued before.
    fn next_stamp(&mut self) -> u64 {
        let stamp = now_millis().max(self.last_stamp + 1);
        self.last_stamp = stamp;
        stamp
    }

    fn snapshot(&self, user: &str) -> Vec<TaskDocument> {
        let mut documents: Vec<TaskDocument> = self
            .collections
            .get(user)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        sort_by_recency(&mut documents);
        documents
    }

    fn notify(&mut self, user: &str) {
        let snapshot = self.snapshot(user);
        if let Some(feeds) = self.feeds.get_mut(user) {
            feeds.retain(|feed| feed.tx.send(snapshot.clone()).is_ok());
            if feeds.is_empty() {
                self.feeds.remove(user);
            }
        }
    }
}

/// Per-user document collections with change fan-out.
#[derive(Default)]
pub struct DocumentStore {
    inner: RwLock<Inner>,
}

impl DocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a live feed over `user`'s collection.
    ///
    /// The current collection is queued on the returned receiver immediately,
    /// so the first delivery always reflects the state at subscribe time.
    pub async fn subscribe(&self, user: &str) -> (FeedId, mpsc::UnboundedReceiver<Vec<TaskDocument>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        inner.next_feed_id += 1;
        let id = inner.next_feed_id;
        // The receiver is still in hand, so this cannot fail.
        let _ = tx.send(inner.snapshot(user));
        inner
            .feeds
            .entry(user.to_string())
            .or_default()
            .push(Feed { id, tx });
        drop(inner);
        tracing::debug!(user = %user, feed_id = id, "feed opened");
        (id, rx)
    }

    /// Closes a feed. Closing an unknown feed is a no-op.
    pub async fn unsubscribe(&self, user: &str, feed_id: FeedId) {
        let mut inner = self.inner.write().await;
        if let Some(feeds) = inner.feeds.get_mut(user) {
            feeds.retain(|feed| feed.id != feed_id);
            if feeds.is_empty() {
                inner.feeds.remove(user);
            }
        }
    }

    /// Creates or overwrites a document, stamping `updated_at`.
    pub async fn create(&self, user: &str, mut document: TaskDocument) {
        let mut inner = self.inner.write().await;
        document.updated_at = inner.next_stamp();
        inner
            .collections
            .entry(user.to_string())
            .or_default()
            .insert(document.id.clone(), document);
        inner.notify(user);
    }

    /// Applies a partial update to an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the document does not exist.
    pub async fn update(&self, user: &str, task_id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stamp = inner.next_stamp();
        let document = inner
            .collections
            .get_mut(user)
            .and_then(|c| c.get_mut(task_id))
            .ok_or_else(|| StoreError::NotFound(task_id.clone()))?;
        document.apply_patch(patch, stamp);
        inner.notify(user);
        Ok(())
    }

    /// Deletes a document. Deleting a missing document still succeeds, and
    /// does not wake any feed.
    pub async fn delete(&self, user: &str, task_id: &TaskId) {
        let mut inner = self.inner.write().await;
        let removed = inner
            .collections
            .get_mut(user)
            .and_then(|c| c.remove(task_id))
            .is_some();
        if removed {
            inner.notify(user);
        }
    }

    /// Returns `user`'s collection, newest first.
    pub async fn snapshot(&self, user: &str) -> Vec<TaskDocument> {
        self.inner.read().await.snapshot(user)
    }

    /// Returns the number of open feeds for `user`.
    pub async fn feed_count(&self, user: &str) -> usize {
        self.inner.read().await.feeds.get(user).map_or(0, Vec::len)
    }
}
