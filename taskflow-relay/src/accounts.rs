//! Email/password accounts.
//!
//! Accounts live in memory for the lifetime of the relay. Passwords are
//! never stored; each account keeps a random salt and the SHA-256 digest of
//! `salt || password`.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use taskflow_proto::account::{AuthFailure, Principal, validate_sign_up};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Account {
    uid: String,
    email: String,
    salt: String,
    digest: [u8; 32],
}

fn digest(salt: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

/// Normalizes an email for lookup.
fn account_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registry of accounts keyed by normalized email.
#[derive(Default)]
pub struct AccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl AccountStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFailure::InvalidEmail`] or [`AuthFailure::WeakPassword`]
    /// for bad input, and [`AuthFailure::EmailInUse`] if the email is taken.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Principal, AuthFailure> {
        validate_sign_up(email, password)?;
        let key = account_key(email);
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(AuthFailure::EmailInUse);
        }
        let salt = Uuid::new_v4().simple().to_string();
        let account = Account {
            uid: Uuid::now_v7().simple().to_string(),
            email: email.trim().to_string(),
            digest: digest(&salt, password),
            salt,
        };
        let principal = Principal::new(account.uid.clone(), Some(account.email.clone()));
        accounts.insert(key, account);
        drop(accounts);
        tracing::info!(uid = %principal.uid, "account created");
        Ok(principal)
    }

    /// Verifies credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFailure::InvalidCredentials`] for an unknown email or a
    /// wrong password.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthFailure> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(&account_key(email))
            .ok_or(AuthFailure::InvalidCredentials)?;
        if digest(&account.salt, password) != account.digest {
            return Err(AuthFailure::InvalidCredentials);
        }
        Ok(Principal::new(account.uid.clone(), Some(account.email.clone())))
    }
}
