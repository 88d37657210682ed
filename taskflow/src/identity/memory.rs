//! In-process identity provider.

use std::collections::HashMap;

use parking_lot::Mutex;
use taskflow_proto::account::{AuthFailure, Principal, validate_sign_up};

use super::{AuthError, IdentityProvider};

#[derive(Debug)]
struct LocalAccount {
    principal: Principal,
    password: String,
}

/// Accounts kept in memory for the lifetime of the process.
///
/// Used when no relay is configured and in tests. Provider sign-in succeeds
/// only if a provider principal was configured with
/// [`MemoryIdentityProvider::with_provider_principal`].
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, LocalAccount>>,
    provider_principal: Option<Principal>,
}

impl MemoryIdentityProvider {
    /// Provider with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer provider sign-in with `principal`.
    #[must_use]
    pub fn with_provider_principal(mut self, principal: Principal) -> Self {
        self.provider_principal = Some(principal);
        self
    }

    /// Number of registered accounts.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let accounts = self.accounts.lock();
        match accounts.get(&normalize(email)) {
            Some(account) if account.password == password => Ok(account.principal.clone()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        validate_sign_up(email, password)?;
        let key = normalize(email);
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }
        let principal = Principal::new(uuid::Uuid::now_v7().simple().to_string(), Some(key.clone()));
        accounts.insert(
            key,
            LocalAccount {
                principal: principal.clone(),
                password: password.to_string(),
            },
        );
        tracing::info!(uid = %principal.uid, "created local account");
        Ok(principal)
    }

    async fn sign_in_with_provider(&self) -> Result<Principal, AuthError> {
        self.provider_principal
            .clone()
            .ok_or_else(|| AuthFailure::ProviderUnavailable.into())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
