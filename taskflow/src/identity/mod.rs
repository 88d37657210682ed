//! Who the board belongs to.
//!
//! [`Identity`] selects the persistence backend: nothing while signed out,
//! the device-local record for a guest, and the remote collection keyed by
//! the user key once authenticated. An [`IdentityProvider`] turns sign-in
//! attempts into a [`Principal`].
//!
//! Implementations:
//! - [`memory::MemoryIdentityProvider`]: in-process accounts
//! - [`crate::remote::relay::RelayClient`]: accounts held by the relay

pub mod memory;

use std::sync::Arc;

use taskflow_proto::account::{AuthFailure, Principal};

/// The current session identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    /// Nobody is signed in; the board is empty.
    #[default]
    Unauthenticated,
    /// Anonymous use backed by the device-local record.
    Guest,
    /// Signed in; the board is the remote collection under this user key.
    Authenticated(String),
}

impl Identity {
    /// Identity for a successfully authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingUserKey`] if the principal has neither a
    /// uid nor an email.
    pub fn from_principal(principal: &Principal) -> Result<Self, AuthError> {
        principal
            .user_key()
            .map(|key| Self::Authenticated(key.to_string()))
            .ok_or(AuthError::MissingUserKey)
    }

    /// The remote collection key, if authenticated.
    #[must_use]
    pub fn user_key(&self) -> Option<&str> {
        match self {
            Self::Authenticated(key) => Some(key),
            Self::Unauthenticated | Self::Guest => None,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "signed out"),
            Self::Guest => write!(f, "guest"),
            Self::Authenticated(key) => write!(f, "user {key}"),
        }
    }
}

/// Errors surfaced by sign-in, sign-up and sign-out.
///
/// The display strings are shown verbatim under the sign-in form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password.
    #[error("{}", AuthFailure::InvalidCredentials.message())]
    InvalidCredentials,

    /// The email already has an account.
    #[error("{}", AuthFailure::EmailInUse.message())]
    EmailInUse,

    /// The password is too short.
    #[error("{}", AuthFailure::WeakPassword.message())]
    WeakPassword,

    /// The email address is malformed.
    #[error("{}", AuthFailure::InvalidEmail.message())]
    InvalidEmail,

    /// Provider sign-in is not configured.
    #[error("{}", AuthFailure::ProviderUnavailable.message())]
    ProviderUnavailable,

    /// The account has no usable identifier.
    #[error("This account cannot be used: it has no identifier.")]
    MissingUserKey,

    /// The identity service could not be reached.
    #[error("Sign-in service unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthFailure> for AuthError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidCredentials => Self::InvalidCredentials,
            AuthFailure::EmailInUse => Self::EmailInUse,
            AuthFailure::WeakPassword => Self::WeakPassword,
            AuthFailure::InvalidEmail => Self::InvalidEmail,
            AuthFailure::ProviderUnavailable => Self::ProviderUnavailable,
        }
    }
}

/// Async identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Sign in with email and password.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send;

    /// Create an account and sign in to it.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send;

    /// Sign in through a third-party provider.
    fn sign_in_with_provider(
        &self,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send;

    /// End the provider-side session.
    fn sign_out(&self) -> impl std::future::Future<Output = Result<(), AuthError>> + Send;
}

impl<T: IdentityProvider> IdentityProvider for Arc<T> {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send {
        (**self).sign_in(email, password)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send {
        (**self).sign_up(email, password)
    }

    fn sign_in_with_provider(
        &self,
    ) -> impl std::future::Future<Output = Result<Principal, AuthError>> + Send {
        (**self).sign_in_with_provider()
    }

    fn sign_out(&self) -> impl std::future::Future<Output = Result<(), AuthError>> + Send {
        (**self).sign_out()
    }
}
