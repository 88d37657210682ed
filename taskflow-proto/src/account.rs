//! Account types exchanged during sign-in.

use serde::{Deserialize, Serialize};

/// An authenticated user as reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-assigned unique identifier.
    pub uid: String,
    /// Email address, when the provider knows one.
    pub email: Option<String>,
}

impl Principal {
    /// Creates a principal.
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }

    /// The key a user's remote collection is stored under: the uid, falling
    /// back to the email address when the uid is empty.
    ///
    /// Returns `None` if neither is usable.
    #[must_use]
    pub fn user_key(&self) -> Option<&str> {
        if !self.uid.is_empty() {
            return Some(&self.uid);
        }
        self.email.as_deref().filter(|e| !e.is_empty())
    }
}

/// Why an authentication attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFailure {
    /// Unknown email or wrong password.
    InvalidCredentials,
    /// Sign-up with an email that already has an account.
    EmailInUse,
    /// Sign-up password below the minimum length.
    WeakPassword,
    /// Malformed or empty email address.
    InvalidEmail,
    /// Third-party provider sign-in is not configured.
    ProviderUnavailable,
}

impl AuthFailure {
    /// Human-readable message suitable for showing under the sign-in form.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid email or password.",
            Self::EmailInUse => "An account with this email already exists.",
            Self::WeakPassword => "Password should be at least 6 characters.",
            Self::InvalidEmail => "Please enter a valid email address.",
            Self::ProviderUnavailable => "Provider sign-in is not available.",
        }
    }
}

/// Minimum accepted password length for new accounts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Checks sign-up input, returning the first problem found.
///
/// # Errors
///
/// Returns [`AuthFailure::InvalidEmail`] for an email without a single `@`
/// separating non-empty parts, or [`AuthFailure::WeakPassword`] for a
/// password shorter than [`MIN_PASSWORD_LENGTH`] characters.
pub fn validate_sign_up(email: &str, password: &str) -> Result<(), AuthFailure> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
        _ => return Err(AuthFailure::InvalidEmail),
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthFailure::WeakPassword);
    }
    Ok(())
}
