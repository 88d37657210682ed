//! Relay server core: shared state, WebSocket handler, account binding,
//! document requests, and live feed forwarding.
//!
//! Each WebSocket connection starts signed out. Signing in or up binds the
//! connection to a [`Principal`]; from then on it may read and write only the
//! collection stored under that principal's user key. Feeds opened with
//! `Subscribe` forward every snapshot of the watched collection until
//! `Unsubscribe`, sign-out, a change of account, or disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use taskflow_proto::account::{AuthFailure, Principal};
use taskflow_proto::codec;
use taskflow_proto::wire::{ClientFrame, RejectReason, ServerFrame};
use tokio::sync::{RwLock, mpsc};

use crate::accounts::AccountStore;
use crate::store::{DocumentStore, FeedId, StoreError};

/// Default maximum allowed frame size in bytes (256 KB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// Default maximum number of feeds one connection may hold open.
const DEFAULT_MAX_FEEDS_PER_CONNECTION: usize = 16;

/// Shared relay server state: open connections, documents, and accounts.
pub struct RelayState {
    /// Maps connection id to a channel sender for its WebSocket writer.
    connections: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    /// Source of connection ids.
    next_connection_id: AtomicU64,
    /// Per-user task documents.
    pub store: DocumentStore,
    /// Email/password accounts.
    pub accounts: AccountStore,
    /// Maximum allowed frame size in bytes.
    max_payload_size: usize,
    /// Maximum number of feeds per connection.
    max_feeds_per_connection: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state with empty stores and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_MAX_FEEDS_PER_CONNECTION)
    }

    /// Creates a relay state with custom frame size and feed limits.
    #[must_use]
    pub fn with_limits(max_payload_size: usize, max_feeds_per_connection: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            store: DocumentStore::new(),
            accounts: AccountStore::new(),
            max_payload_size,
            max_feeds_per_connection,
        }
    }

    async fn register(&self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.connections.write().await.insert(id, sender);
        id
    }

    async fn unregister(&self, id: u64) {
        self.connections.write().await.remove(&id);
    }

    /// Send a WebSocket Close frame to every connected client.
    ///
    /// Each writer task forwards the close frame, which ends the client's
    /// reader. Useful for graceful shutdown and testing.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (id, sender) in conns.iter() {
            tracing::info!(connection = id, "sending close frame");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// A feed opened by one connection.
struct OpenFeed {
    user: String,
    feed_id: FeedId,
    forwarder: tokio::task::JoinHandle<()>,
}

/// Per-connection state, owned by the connection's reader loop.
struct Connection {
    id: u64,
    principal: Option<Principal>,
    feeds: HashMap<u64, OpenFeed>,
    out: mpsc::UnboundedSender<Message>,
}

impl Connection {
    /// Whether this connection may touch `user`'s collection.
    fn may_access(&self, user: &str) -> bool {
        self.principal
            .as_ref()
            .and_then(Principal::user_key)
            .is_some_and(|key| key == user)
    }

    fn send(&self, frame: &ServerFrame) {
        match codec::encode(frame) {
            Ok(bytes) => {
                let _ = self.out.send(Message::Binary(bytes.into()));
            }
            Err(e) => {
                tracing::error!(connection = self.id, error = %e, "failed to encode server frame");
            }
        }
    }

    async fn close_feed(&mut self, subscription_id: u64, state: &RelayState) {
        if let Some(feed) = self.feeds.remove(&subscription_id) {
            feed.forwarder.abort();
            state.store.unsubscribe(&feed.user, feed.feed_id).await;
            tracing::debug!(connection = self.id, subscription_id, "feed closed");
        }
    }

    async fn close_all_feeds(&mut self, state: &RelayState) {
        let ids: Vec<u64> = self.feeds.keys().copied().collect();
        for id in ids {
            self.close_feed(id, state).await;
        }
    }

    /// Binds the connection to a new principal, dropping feeds opened under
    /// the previous one.
    async fn bind(&mut self, principal: Option<Principal>, state: &RelayState) {
        if self.principal != principal {
            self.close_all_feeds(state).await;
        }
        self.principal = principal;
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Register the connection and spawn its writer task.
/// 2. Process client frames until close, error, or writer failure.
/// 3. Close every feed the connection opened and unregister it.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let id = state.register(tx.clone()).await;
    tracing::info!(connection = id, "client connected");

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection = id, "WebSocket write failed");
                break;
            }
        }
    });

    let mut conn = Connection {
        id,
        principal: None,
        feeds: HashMap::new(),
        out: tx,
    };

    loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    handle_binary_message(&mut conn, &data, &state).await;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!(connection = id, "received close frame");
                    break;
                }
                Some(Ok(_)) => {
                    // Ignore text, ping, pong frames.
                }
                Some(Err(e)) => {
                    tracing::warn!(connection = id, error = %e, "WebSocket read error");
                    break;
                }
                None => break,
            },
            _ = &mut write_task => break,
        }
    }

    write_task.abort();
    conn.close_all_feeds(&state).await;
    state.unregister(id).await;
    tracing::info!(connection = id, "client disconnected");
}

/// Handles a binary WebSocket message from a client.
async fn handle_binary_message(conn: &mut Connection, data: &[u8], state: &Arc<RelayState>) {
    if data.len() > state.max_payload_size {
        tracing::warn!(
            connection = conn.id,
            size = data.len(),
            max = state.max_payload_size,
            "frame exceeds size limit"
        );
        conn.send(&ServerFrame::Error {
            reason: format!(
                "frame too large: {} bytes (max {})",
                data.len(),
                state.max_payload_size
            ),
        });
        return;
    }

    let frame: ClientFrame = match codec::decode(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(connection = conn.id, error = %e, "failed to decode frame");
            conn.send(&ServerFrame::Error {
                reason: format!("malformed frame: {e}"),
            });
            return;
        }
    };

    match frame {
        ClientFrame::SignUp {
            request_id,
            email,
            password,
        } => {
            let result = state.accounts.sign_up(&email, &password).await;
            finish_auth(conn, request_id, result, state).await;
        }
        ClientFrame::SignIn {
            request_id,
            email,
            password,
        } => {
            let result = state.accounts.sign_in(&email, &password).await;
            finish_auth(conn, request_id, result, state).await;
        }
        ClientFrame::SignInWithProvider { request_id } => {
            finish_auth(conn, request_id, Err(AuthFailure::ProviderUnavailable), state).await;
        }
        ClientFrame::SignOut { request_id } => {
            conn.bind(None, state).await;
            conn.send(&ServerFrame::Ack { request_id });
        }
        ClientFrame::Subscribe {
            subscription_id,
            user,
        } => open_feed(conn, subscription_id, user, state).await,
        ClientFrame::Unsubscribe { subscription_id } => {
            conn.close_feed(subscription_id, state).await;
        }
        ClientFrame::Create {
            request_id,
            user,
            document,
        } => {
            if !conn.may_access(&user) {
                reject(conn, request_id, RejectReason::PermissionDenied);
                return;
            }
            tracing::debug!(connection = conn.id, user = %user, task_id = %document.id, "create");
            state.store.create(&user, document).await;
            conn.send(&ServerFrame::Ack { request_id });
        }
        ClientFrame::Update {
            request_id,
            user,
            task_id,
            patch,
        } => {
            if !conn.may_access(&user) {
                reject(conn, request_id, RejectReason::PermissionDenied);
                return;
            }
            tracing::debug!(connection = conn.id, user = %user, task_id = %task_id, "update");
            match state.store.update(&user, &task_id, &patch).await {
                Ok(()) => conn.send(&ServerFrame::Ack { request_id }),
                Err(StoreError::NotFound(_)) => reject(conn, request_id, RejectReason::NotFound),
            }
        }
        ClientFrame::Delete {
            request_id,
            user,
            task_id,
        } => {
            if !conn.may_access(&user) {
                reject(conn, request_id, RejectReason::PermissionDenied);
                return;
            }
            tracing::debug!(connection = conn.id, user = %user, task_id = %task_id, "delete");
            state.store.delete(&user, &task_id).await;
            conn.send(&ServerFrame::Ack { request_id });
        }
    }
}

fn reject(conn: &Connection, request_id: u64, reason: RejectReason) {
    tracing::warn!(connection = conn.id, request_id, reason = %reason, "request rejected");
    conn.send(&ServerFrame::Rejected { request_id, reason });
}

async fn finish_auth(
    conn: &mut Connection,
    request_id: u64,
    result: Result<Principal, AuthFailure>,
    state: &RelayState,
) {
    match result {
        Ok(principal) => {
            tracing::info!(connection = conn.id, uid = %principal.uid, "connection authenticated");
            conn.bind(Some(principal.clone()), state).await;
            conn.send(&ServerFrame::Authenticated {
                request_id,
                principal,
            });
        }
        Err(failure) => {
            tracing::info!(connection = conn.id, ?failure, "authentication failed");
            conn.send(&ServerFrame::AuthFailed {
                request_id,
                failure,
            });
        }
    }
}

async fn open_feed(conn: &mut Connection, subscription_id: u64, user: String, state: &RelayState) {
    if !conn.may_access(&user) {
        tracing::warn!(connection = conn.id, user = %user, "feed refused: permission denied");
        conn.send(&ServerFrame::FeedError {
            subscription_id,
            reason: RejectReason::PermissionDenied.to_string(),
        });
        return;
    }
    // Reusing an id replaces the old feed.
    conn.close_feed(subscription_id, state).await;
    if conn.feeds.len() >= state.max_feeds_per_connection {
        conn.send(&ServerFrame::FeedError {
            subscription_id,
            reason: format!(
                "too many open feeds (max {})",
                state.max_feeds_per_connection
            ),
        });
        return;
    }

    let (feed_id, mut rx) = state.store.subscribe(&user).await;
    let out = conn.out.clone();
    let connection = conn.id;
    let forwarder = tokio::spawn(async move {
        while let Some(documents) = rx.recv().await {
            let frame = ServerFrame::Snapshot {
                subscription_id,
                documents,
            };
            match codec::encode(&frame) {
                Ok(bytes) => {
                    if out.send(Message::Binary(bytes.into())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(connection, subscription_id, error = %e, "failed to encode snapshot");
                    let _ = codec::encode(&ServerFrame::FeedError {
                        subscription_id,
                        reason: e.to_string(),
                    })
                    .map(|bytes| out.send(Message::Binary(bytes.into())));
                    break;
                }
            }
        }
    });

    tracing::debug!(connection = conn.id, subscription_id, user = %user, "feed opened");
    conn.feeds.insert(
        subscription_id,
        OpenFeed {
            user,
            feed_id,
            forwarder,
        },
    );
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}
