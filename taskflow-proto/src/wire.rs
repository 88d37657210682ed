//! Relay wire protocol.
//!
//! Clients send [`ClientFrame`]s and the relay answers with [`ServerFrame`]s,
//! each postcard-encoded into one WebSocket binary message (see
//! [`crate::codec`]). Requests carry a client-chosen `request_id` that the
//! matching `Ack`/`Rejected`/auth reply echoes; feeds are keyed by a
//! client-chosen `subscription_id`.

use serde::{Deserialize, Serialize};

use crate::account::{AuthFailure, Principal};
use crate::document::TaskDocument;
use crate::task::{TaskId, TaskPatch};

/// Messages sent from a board client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Create an account and bind the connection to it.
    SignUp {
        /// Correlation id echoed in the reply.
        request_id: u64,
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Sign in to an existing account and bind the connection to it.
    SignIn {
        /// Correlation id echoed in the reply.
        request_id: u64,
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
    /// Sign in through a third-party provider.
    SignInWithProvider {
        /// Correlation id echoed in the reply.
        request_id: u64,
    },
    /// Unbind the connection from its account. Live feeds are cancelled.
    SignOut {
        /// Correlation id echoed in the reply.
        request_id: u64,
    },
    /// Start a live feed over one user's collection.
    Subscribe {
        /// Client-chosen feed id.
        subscription_id: u64,
        /// User key whose collection to watch.
        user: String,
    },
    /// Stop a live feed. Unknown ids are ignored.
    Unsubscribe {
        /// Feed id given in `Subscribe`.
        subscription_id: u64,
    },
    /// Create (or overwrite) a document.
    Create {
        /// Correlation id echoed in the reply.
        request_id: u64,
        /// Owner of the collection.
        user: String,
        /// Document to store; the relay restamps `updated_at`.
        document: TaskDocument,
    },
    /// Partially update an existing document.
    Update {
        /// Correlation id echoed in the reply.
        request_id: u64,
        /// Owner of the collection.
        user: String,
        /// Document to update.
        task_id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Delete a document. Deleting a missing document succeeds.
    Delete {
        /// Correlation id echoed in the reply.
        request_id: u64,
        /// Owner of the collection.
        user: String,
        /// Document to delete.
        task_id: TaskId,
    },
}

/// Why the relay refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The target document does not exist.
    NotFound,
    /// The connection is not signed in as the collection owner.
    PermissionDenied,
    /// The request was malformed or exceeded a limit.
    Invalid(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("document not found"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Invalid(reason) => write!(f, "invalid request: {reason}"),
        }
    }
}

/// Messages sent from the relay to a board client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Sign-in or sign-up succeeded.
    Authenticated {
        /// Correlation id of the request.
        request_id: u64,
        /// The account the connection is now bound to.
        principal: Principal,
    },
    /// Sign-in or sign-up failed.
    AuthFailed {
        /// Correlation id of the request.
        request_id: u64,
        /// What went wrong.
        failure: AuthFailure,
    },
    /// The request succeeded.
    Ack {
        /// Correlation id of the request.
        request_id: u64,
    },
    /// The request was refused.
    Rejected {
        /// Correlation id of the request.
        request_id: u64,
        /// Why it was refused.
        reason: RejectReason,
    },
    /// The complete current collection of a watched user, newest first.
    Snapshot {
        /// Feed id given in `Subscribe`.
        subscription_id: u64,
        /// Every document in the collection.
        documents: Vec<TaskDocument>,
    },
    /// A feed failed and will deliver nothing more.
    FeedError {
        /// Feed id given in `Subscribe`.
        subscription_id: u64,
        /// Human-readable description.
        reason: String,
    },
    /// A frame could not be processed at all.
    Error {
        /// Human-readable description.
        reason: String,
    },
}
