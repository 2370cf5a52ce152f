#![warn(missing_docs)]
//! # session-guard-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `session-guard` workspace.
//!
//! ## Responsibilities
//! - Represent users, token sets, sessions, and the combined auth identity.
//! - Define the [`AuthError`] taxonomy surfaced to every caller.
//! - Provide an injectable [`Clock`] so expiry math is deterministic in tests.
//!
//! ## Data flow
//! Provider payloads decode into [`User`] and [`TokenSet`]. The gateway pairs
//! them into a [`UserSession`], which is the only way an authenticated identity
//! enters the shared auth state.
//!
//! ## Ownership and lifetimes
//! All model values own their strings so they can be cloned into subscriber
//! snapshots without borrowing from transient network buffers.
//!
//! ## Error model
//! [`AuthError`] is `Clone` because the current error is cached in the shared
//! auth state while also being returned to the failing caller.
//!
//! ## Security and privacy notes
//! `Debug` for [`TokenSet`] prints fingerprints instead of token values. Use
//! [`token_fingerprint`] whenever a token needs to appear in logs.
//!
//! ## Example
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use session_guard_core::TokenSet;
//!
//! let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
//! let tokens = TokenSet::new("access", "refresh", expires_at);
//! assert!(!tokens.is_expired(expires_at - Duration::milliseconds(1)));
//! assert!(tokens.is_expired(expires_at));
//! ```

mod clock;
mod error;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthErrorCode, ErrorPresentation, FieldError};

/// Number of hex characters kept by [`token_fingerprint`].
pub const FINGERPRINT_LEN: usize = 12;

/// Account role reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrative account.
    Admin,
    /// Regular account.
    User,
    /// Role string this client does not know about.
    #[serde(other)]
    Other,
}

/// Identity record for the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable opaque identifier.
    pub id: String,
    /// Account email address.
    pub email: String,
    /// Human-readable name shown in the UI.
    #[serde(default)]
    pub display_name: String,
    /// Account role.
    pub role: Role,
    /// Whether the email address has been confirmed.
    #[serde(default)]
    pub email_verified: bool,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
    /// Previous successful sign-in, if any.
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Returns `true` for administrative accounts.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Bearer credential, refresh credential, and absolute access expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// Bearer token for protected calls.
    pub access_token: String,
    /// Credential exchanged for a new token set.
    pub refresh_token: String,
    /// Absolute UTC instant at which the access token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Creates a token set.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Returns `true` when `now` is at or past the expiry instant.
    ///
    /// No leeway is applied; callers wanting a buffer subtract it from `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Fingerprint of the access token, safe for logs.
    pub fn fingerprint(&self) -> String {
        token_fingerprint(&self.access_token)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &token_fingerprint(&self.access_token))
            .field("refresh_token", &token_fingerprint(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session metadata reported by the provider next to a token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Server-side session identifier.
    pub id: String,
    /// Absolute session expiry; defaults to the token expiry when absent.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Server-tracked login continuity wrapping the current token set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server-side session identifier.
    pub id: String,
    /// Token set currently backing the session.
    pub tokens: TokenSet,
    /// Absolute session expiry.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Builds a session from provider metadata, falling back to the token
    /// expiry and an access-token-derived id.
    pub fn from_parts(tokens: TokenSet, info: Option<SessionInfo>) -> Self {
        match info {
            Some(info) => Self {
                expires_at: info.expires_at.unwrap_or(tokens.expires_at),
                id: info.id,
                tokens,
            },
            None => Self {
                id: format!("session-{}", tokens.fingerprint()),
                expires_at: tokens.expires_at,
                tokens,
            },
        }
    }

    /// Milliseconds until the session expires, clamped at zero.
    pub fn time_until_expiry_ms(&self, now: DateTime<Utc>) -> u64 {
        let remaining = (self.expires_at - now).num_milliseconds();
        u64::try_from(remaining).unwrap_or(0)
    }
}

/// Authenticated identity: a user and the session that proves it.
///
/// This pairing is the only way a user enters shared auth state, which keeps
/// "user present iff session present" structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    /// Signed-in user.
    pub user: User,
    /// Session backing the user.
    pub session: Session,
}

impl UserSession {
    /// Pairs a user with a session.
    pub fn new(user: User, session: Session) -> Self {
        Self { user, session }
    }
}

/// Returns a short, non-reversible fingerprint of a token for log correlation.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    encoded
}
