//! Relay-backed remote store and identity provider.
//!
//! [`RelayClient`] holds one WebSocket connection to a `taskflow-relay`
//! server. Accounts and documents share the connection: signing in binds it
//! to a principal, and the relay only accepts document requests for that
//! principal's user key.
//!
//! Requests carry a `request_id` and are matched to their reply by a
//! background reader task; feed snapshots are routed by `subscription_id`.
//! When the connection drops, every pending request fails with
//! [`RemoteError::ConnectionClosed`] and every open feed receives one empty
//! collection before it is closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use taskflow_proto::account::Principal;
use taskflow_proto::codec;
use taskflow_proto::document::{TaskDocument, into_tasks};
use taskflow_proto::task::{Task, TaskId, TaskPatch, now_millis};
use taskflow_proto::wire::{ClientFrame, ServerFrame};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{RemoteError, RemoteStore, Subscription, SubscriptionHandle};
use crate::identity::{AuthError, IdentityProvider};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the relay server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single request/reply exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while connecting to the relay.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The relay URL could not be parsed.
    #[error("invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The relay URL is not a WebSocket URL.
    #[error("unsupported relay URL scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),

    /// The connection attempt did not finish in time.
    #[error("timed out connecting to relay")]
    Timeout,

    /// The WebSocket handshake failed.
    #[error("failed to connect to relay: {0}")]
    Handshake(String),
}

/// Connection state shared with the reader task and subscription handles.
struct Shared {
    sender: tokio::sync::Mutex<WsSender>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServerFrame>>>,
    feeds: Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<Task>>>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    request_timeout: Duration,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, frame: &ClientFrame) -> Result<(), RemoteError> {
        let bytes = codec::encode(frame)?;
        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "relay send failed");
                self.connected.store(false, Ordering::SeqCst);
                RemoteError::ConnectionClosed
            })
    }

    /// Send a request and wait for the reply carrying its id.
    async fn request(
        &self,
        frame_for: impl FnOnce(u64) -> ClientFrame,
    ) -> Result<ServerFrame, RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::ConnectionClosed);
        }
        let request_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        if let Err(e) = self.send(&frame_for(request_id)).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RemoteError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                tracing::warn!(request_id, "relay request timed out");
                Err(RemoteError::Timeout)
            }
        }
    }

    fn dispatch(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Snapshot {
                subscription_id,
                documents,
            } => {
                let feeds = self.feeds.lock();
                match feeds.get(&subscription_id) {
                    Some(tx) => {
                        let _ = tx.send(into_tasks(documents));
                    }
                    None => tracing::debug!(subscription_id, "snapshot for closed feed dropped"),
                }
            }
            ServerFrame::FeedError {
                subscription_id,
                reason,
            } => {
                tracing::warn!(subscription_id, reason = %reason, "relay feed failed");
                if let Some(tx) = self.feeds.lock().remove(&subscription_id) {
                    let _ = tx.send(Vec::new());
                }
            }
            ServerFrame::Error { reason } => {
                tracing::warn!(reason = %reason, "relay server error");
            }
            reply => self.complete(reply),
        }
    }

    fn complete(&self, reply: ServerFrame) {
        let request_id = match &reply {
            ServerFrame::Ack { request_id }
            | ServerFrame::Rejected { request_id, .. }
            | ServerFrame::Authenticated { request_id, .. }
            | ServerFrame::AuthFailed { request_id, .. } => *request_id,
            _ => return,
        };
        let waiter = self.pending.lock().remove(&request_id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::debug!(request_id, "reply for unknown or expired request"),
        }
    }

    fn unsubscribe(self: &Arc<Self>, subscription_id: u64) {
        self.feeds.lock().remove(&subscription_id);
        if !self.is_connected() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let shared = Arc::clone(self);
        runtime.spawn(async move {
            if let Err(e) = shared.send(&ClientFrame::Unsubscribe { subscription_id }).await {
                tracing::debug!(subscription_id, error = %e, "failed to send unsubscribe");
            }
        });
    }

    fn connection_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.pending.lock().clear();
        let feeds: Vec<_> = self.feeds.lock().drain().collect();
        for (subscription_id, tx) in feeds {
            tracing::warn!(subscription_id, "relay connection lost, feed emptied");
            let _ = tx.send(Vec::new());
        }
    }
}

/// A connection to a `taskflow-relay` server, usable both as a
/// [`RemoteStore`] and as an [`IdentityProvider`].
pub struct RelayClient {
    shared: Arc<Shared>,
    relay_url: String,
    reader: tokio::task::JoinHandle<()>,
}

impl RelayClient {
    /// Connect to a relay server with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the URL is invalid or the WebSocket
    /// connection cannot be established.
    pub async fn connect(relay_url: &str) -> Result<Self, ConnectError> {
        Self::connect_with_timeouts(relay_url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Connect to a relay server.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the URL is invalid or the WebSocket
    /// connection cannot be established within `connect_timeout`.
    pub async fn connect_with_timeouts(
        relay_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let url = url::Url::parse(relay_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConnectError::UnsupportedScheme(url.scheme().to_string()));
        }

        let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                tracing::warn!(url = relay_url, "relay WebSocket connect timed out");
                ConnectError::Timeout
            })?
            .map_err(|e| {
                tracing::warn!(url = relay_url, error = %e, "relay WebSocket connect failed");
                ConnectError::Handshake(e.to_string())
            })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let shared = Arc::new(Shared {
            sender: tokio::sync::Mutex::new(ws_sender),
            pending: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            request_timeout,
        });
        let reader = tokio::spawn(reader_loop(ws_reader, Arc::clone(&shared)));

        tracing::info!(url = relay_url, "connected to relay");
        Ok(Self {
            shared,
            relay_url: relay_url.to_string(),
            reader,
        })
    }

    /// The relay URL this client connected to.
    #[must_use]
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Whether the WebSocket connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    async fn write(
        &self,
        task_id: &TaskId,
        frame_for: impl FnOnce(u64) -> ClientFrame,
    ) -> Result<(), RemoteError> {
        match self.shared.request(frame_for).await? {
            ServerFrame::Ack { .. } => Ok(()),
            ServerFrame::Rejected { reason, .. } => {
                Err(RemoteError::from_reject(reason, Some(task_id)))
            }
            other => Err(RemoteError::Rejected(format!("unexpected reply: {other:?}"))),
        }
    }

    async fn authenticate(
        &self,
        frame_for: impl FnOnce(u64) -> ClientFrame,
    ) -> Result<Principal, AuthError> {
        match self.shared.request(frame_for).await {
            Ok(ServerFrame::Authenticated { principal, .. }) => Ok(principal),
            Ok(ServerFrame::AuthFailed { failure, .. }) => Err(failure.into()),
            Ok(other) => Err(AuthError::Unavailable(format!("unexpected reply: {other:?}"))),
            Err(e) => Err(AuthError::Unavailable(e.to_string())),
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("relay_url", &self.relay_url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl RemoteStore for RelayClient {
    async fn subscribe(&self, user: &str) -> Subscription {
        if !self.shared.is_connected() {
            return Subscription::failed(user, &RemoteError::ConnectionClosed);
        }
        let subscription_id = self.shared.next_id();
        let (tx, feed) = mpsc::unbounded_channel();
        self.shared.feeds.lock().insert(subscription_id, tx);

        let frame = ClientFrame::Subscribe {
            subscription_id,
            user: user.to_string(),
        };
        if let Err(e) = self.shared.send(&frame).await {
            self.shared.feeds.lock().remove(&subscription_id);
            return Subscription::failed(user, &e);
        }
        tracing::debug!(user = %user, subscription_id, "relay feed requested");

        let shared = Arc::clone(&self.shared);
        let handle = SubscriptionHandle::new(move || shared.unsubscribe(subscription_id));
        Subscription { feed, handle }
    }

    async fn create(&self, user: &str, task: &Task) -> Result<(), RemoteError> {
        let document = TaskDocument::from_task(task, now_millis());
        self.write(&task.id, |request_id| ClientFrame::Create {
            request_id,
            user: user.to_string(),
            document,
        })
        .await
    }

    async fn update(&self, user: &str, task_id: &TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        self.write(task_id, |request_id| ClientFrame::Update {
            request_id,
            user: user.to_string(),
            task_id: task_id.clone(),
            patch: patch.clone(),
        })
        .await
    }

    async fn delete(&self, user: &str, task_id: &TaskId) -> Result<(), RemoteError> {
        self.write(task_id, |request_id| ClientFrame::Delete {
            request_id,
            user: user.to_string(),
            task_id: task_id.clone(),
        })
        .await
    }
}

impl IdentityProvider for RelayClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        self.authenticate(|request_id| ClientFrame::SignIn {
            request_id,
            email: email.to_string(),
            password: password.to_string(),
        })
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        self.authenticate(|request_id| ClientFrame::SignUp {
            request_id,
            email: email.to_string(),
            password: password.to_string(),
        })
        .await
    }

    async fn sign_in_with_provider(&self) -> Result<Principal, AuthError> {
        self.authenticate(|request_id| ClientFrame::SignInWithProvider { request_id })
            .await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        match self
            .shared
            .request(|request_id| ClientFrame::SignOut { request_id })
            .await
        {
            Ok(ServerFrame::Ack { .. }) => Ok(()),
            Ok(other) => Err(AuthError::Unavailable(format!("unexpected reply: {other:?}"))),
            Err(e) => Err(AuthError::Unavailable(e.to_string())),
        }
    }
}

/// Background task that decodes server frames and routes them.
///
/// Malformed frames are logged and skipped. When the socket closes or
/// errors, pending requests and feeds are failed.
async fn reader_loop(mut ws_reader: WsReader, shared: Arc<Shared>) {
    while let Some(msg) = ws_reader.next().await {
        match msg {
            Ok(Message::Binary(data)) => match codec::decode::<ServerFrame>(&data) {
                Ok(frame) => shared.dispatch(frame),
                Err(e) => tracing::warn!(error = %e, "malformed relay frame, skipping"),
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    shared.connection_lost();
    tracing::info!("relay reader task exiting");
}
