//! Sign-in flow on top of the sync controller.
//!
//! A [`Session`] pairs an [`IdentityProvider`] with the
//! [`TaskSyncController`]: successful authentication switches the board to
//! the user's remote collection, "continue as guest" switches it to the
//! local record, and signing out empties it. Failed attempts leave the
//! current identity untouched and return an [`AuthError`] whose message can
//! be shown as is.

use crate::identity::{AuthError, Identity, IdentityProvider};
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use crate::sync::{Celebrate, TaskSyncController};

/// Owns the identity provider and the board controller.
#[derive(Debug)]
pub struct Session<P, L, R, C>
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    provider: P,
    controller: TaskSyncController<L, R, C>,
}

impl<P, L, R, C> Session<P, L, R, C>
where
    P: IdentityProvider,
    L: LocalStore,
    R: RemoteStore,
    C: Celebrate,
{
    /// Create a signed-out session.
    pub const fn new(provider: P, controller: TaskSyncController<L, R, C>) -> Self {
        Self {
            provider,
            controller,
        }
    }

    /// The board controller.
    pub const fn controller(&self) -> &TaskSyncController<L, R, C> {
        &self.controller
    }

    /// The board controller, for intents and event processing.
    pub const fn controller_mut(&mut self) -> &mut TaskSyncController<L, R, C> {
        &mut self.controller
    }

    /// The current identity.
    pub const fn identity(&self) -> &Identity {
        self.controller.identity()
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the identity is unchanged.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        let result = self.provider.sign_in(email, password).await;
        self.finish_auth("sign-in", result).await
    }

    /// Create an account and sign in to it.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the identity is unchanged.
    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        let result = self.provider.sign_up(email, password).await;
        self.finish_auth("sign-up", result).await
    }

    /// Sign in through a third-party provider.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; the identity is unchanged.
    pub async fn sign_in_with_provider(&mut self) -> Result<(), AuthError> {
        let result = self.provider.sign_in_with_provider().await;
        self.finish_auth("provider sign-in", result).await
    }

    /// Use the board anonymously on this device.
    pub async fn continue_as_guest(&mut self) {
        self.controller.set_identity(Identity::Guest).await;
    }

    /// Sign out and empty the board.
    ///
    /// A provider-side failure is logged; the board signs out regardless.
    pub async fn sign_out(&mut self) {
        if matches!(self.identity(), Identity::Authenticated(_)) {
            if let Err(e) = self.provider.sign_out().await {
                tracing::warn!(error = %e, "provider sign-out failed");
            }
        }
        self.controller.set_identity(Identity::Unauthenticated).await;
    }

    async fn finish_auth(
        &mut self,
        flow: &str,
        result: Result<taskflow_proto::account::Principal, AuthError>,
    ) -> Result<(), AuthError> {
        let identity = result.and_then(|principal| Identity::from_principal(&principal));
        match identity {
            Ok(identity) => {
                tracing::info!(flow, identity = %identity, "authenticated");
                self.controller.set_identity(identity).await;
                Ok(())
            }
            Err(e) => {
                tracing::info!(flow, error = %e, "authentication failed");
                Err(e)
            }
        }
    }
}
