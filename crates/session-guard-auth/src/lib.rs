#![warn(missing_docs)]
//! # session-guard-auth
//!
//! ## Purpose
//! Implements sign-in, sign-out, registration and token refresh against a
//! remote identity provider, keeping persisted tokens and shared auth state
//! consistent.
//!
//! ## Responsibilities
//! - Validate provider endpoint policy (HTTPS, no query or fragment).
//! - Execute provider calls through the injectable [`IdentityProvider`] trait.
//! - Map the provider error envelope onto [`AuthError`].
//! - Persist token sets before publishing identities, one ticketed step per
//!   request, discarding stale completions.
//! - With the `test-support` feature, provide `ScriptedIdentityProvider`, an
//!   in-memory provider for other crates' tests.
//!
//! ## Data flow
//! UI collects credentials -> [`AuthGateway::login`] sends a request through
//! [`IdentityProvider`] -> receives a token set -> [`TokenStore::save`] ->
//! [`AuthStateBroadcaster::set_user`] notifies subscribers.
//!
//! ## Ownership and lifetimes
//! The gateway holds `Arc`s to its collaborators so the runtime, the session
//! monitor and the warning controller can share one instance.
//!
//! ## Error model
//! Every operation returns [`AuthError`]. Identity-changing failures are also
//! recorded in auth state. Remote logout failure is the only error logged and
//! dropped.
//!
//! ## Security and privacy notes
//! Request types redact passwords and tokens in `Debug`. Logs carry user ids,
//! session ids and token fingerprints, never token values.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use session_guard_auth::{AuthGateway, HttpIdentityProvider};
//! use session_guard_core::SystemClock;
//! use session_guard_state::AuthStateBroadcaster;
//! use session_guard_store::{MemoryStorage, TokenStore};
//!
//! let provider = HttpIdentityProvider::new("https://auth.example.test/api").expect("valid endpoint");
//! let gateway = AuthGateway::new(
//!     Arc::new(provider),
//!     Arc::new(TokenStore::new(Arc::new(MemoryStorage::new()))),
//!     Arc::new(AuthStateBroadcaster::new()),
//!     Arc::new(SystemClock),
//! );
//! assert_eq!(gateway.sequencer().latest(), 0);
//! ```
//!
//! [`TokenStore::save`]: session_guard_store::TokenStore::save
//! [`AuthStateBroadcaster::set_user`]: session_guard_state::AuthStateBroadcaster::set_user
//! [`AuthError`]: session_guard_core::AuthError

mod gateway;
mod provider;
#[cfg(any(test, feature = "test-support"))]
mod scripted;
mod wire;

pub use gateway::{AuthGateway, LogoutReason, RegisterOutcome, RequestSequencer, validate_credentials};
pub use provider::{
    DEFAULT_REQUEST_TIMEOUT, HttpIdentityProvider, IdentityProvider, validate_provider_endpoint,
};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{ProviderOp, SCRIPTED_MIN_PASSWORD_LEN, ScriptedIdentityProvider};
pub use wire::{
    AuthPayload, CurrentUserPayload, ErrorEnvelope, LoginRequest, ProfileFields, ProfileUpdate,
    RefreshPayload, RefreshRequest, RegisterPayload, RegisterRequest, ResetPasswordRequest,
    UpdatePasswordRequest, UserPayload,
};
