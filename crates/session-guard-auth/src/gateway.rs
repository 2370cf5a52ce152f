//! Auth operations that keep the token store and shared auth state in step.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use session_guard_core::{
    AuthError, Clock, FieldError, Session, SessionInfo, TokenSet, User, UserSession,
};
use session_guard_state::AuthStateBroadcaster;
use session_guard_store::{StoreError, TokenStore};
use tracing::{debug, error, info, warn};

use crate::provider::IdentityProvider;
use crate::wire::{
    LoginRequest, ProfileFields, ProfileUpdate, RefreshRequest, RegisterRequest,
    ResetPasswordRequest, UpdatePasswordRequest,
};

/// Orders concurrent auth requests so only the newest may apply its result.
///
/// Every request takes a ticket before its first suspension point. The check
/// "is this ticket still the newest" and the side effects it guards run under
/// the same lock, so a stale completion can never interleave with a newer one.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: Mutex<u64>,
}

impl RequestSequencer {
    /// Creates a sequencer with no tickets issued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new ticket, superseding every earlier one.
    pub fn issue(&self) -> u64 {
        let mut latest = self.lock();
        *latest += 1;
        *latest
    }

    /// Most recently issued ticket.
    pub fn latest(&self) -> u64 {
        *self.lock()
    }

    /// Returns `true` when `ticket` is still the newest.
    pub fn is_current(&self, ticket: u64) -> bool {
        *self.lock() == ticket
    }

    /// Runs `apply` only while `ticket` is the newest ticket.
    ///
    /// # Errors
    /// Returns [`AuthError::Superseded`] without running `apply` when a newer
    /// ticket exists.
    pub fn apply_if_current<T>(&self, ticket: u64, apply: impl FnOnce() -> T) -> Result<T, AuthError> {
        let latest = self.lock();
        if *latest != ticket {
            debug!(ticket, latest = *latest, "discarding superseded auth completion");
            return Err(AuthError::Superseded);
        }
        Ok(apply())
    }

    /// Issues a ticket and runs `apply` before any other ticket can be issued.
    pub fn issue_and_apply<T>(&self, apply: impl FnOnce() -> T) -> (u64, T) {
        let mut latest = self.lock();
        *latest += 1;
        (*latest, apply())
    }

    /// Runs `apply` serialized with ticketed side effects without taking a
    /// ticket.
    pub fn exclusive<T>(&self, apply: impl FnOnce() -> T) -> T {
        let _latest = self.lock();
        apply()
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Why the session is being ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to sign out.
    UserInitiated,
    /// The session ran out and was ended automatically.
    SessionExpired,
}

impl LogoutReason {
    /// Stable label used in logs and redirects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInitiated => "user",
            Self::SessionExpired => "expired",
        }
    }
}

/// Result of [`AuthGateway::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Newly created account.
    pub user: User,
    /// `true` when the provider issued a session and the user is signed in.
    pub session_issued: bool,
    /// `true` when the provider sent a confirmation email instead.
    pub confirmation_sent: bool,
}

/// Checks that an email/password pair is worth sending to the provider.
///
/// Only structural checks run locally; password policy belongs to the
/// provider.
///
/// # Errors
/// Returns [`AuthError::ValidationError`] listing every failing field.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    let mut fields = Vec::new();
    let email = email.trim();
    if email.is_empty() {
        fields.push(FieldError::new("email", "must not be blank"));
    } else if !email.contains('@') {
        fields.push(FieldError::new("email", "must be a valid email address"));
    }
    if password.trim().is_empty() {
        fields.push(FieldError::new("password", "must not be blank"));
    }

    if fields.is_empty() {
        return Ok(());
    }
    let message = fields
        .iter()
        .map(|field| format!("{}: {}", field.field, field.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AuthError::ValidationError { message, fields })
}

fn storage_error(error: StoreError) -> AuthError {
    AuthError::Storage {
        message: error.to_string(),
    }
}

/// Coordinates the identity provider, [`TokenStore`] and
/// [`AuthStateBroadcaster`].
///
/// The gateway is the only writer of the token store. A successful sign-in
/// persists the token set first and then publishes the identity, as one
/// ticketed step.
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<TokenStore>,
    broadcaster: Arc<AuthStateBroadcaster>,
    clock: Arc<dyn Clock>,
    sequencer: RequestSequencer,
}

impl AuthGateway {
    /// Creates a gateway over shared collaborators.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<TokenStore>,
        broadcaster: Arc<AuthStateBroadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            store,
            broadcaster,
            clock,
            sequencer: RequestSequencer::new(),
        }
    }

    /// Shared auth state this gateway publishes to.
    pub fn broadcaster(&self) -> &Arc<AuthStateBroadcaster> {
        &self.broadcaster
    }

    /// Token store this gateway writes.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Clock used for expiry decisions.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Request sequencer guarding state changes.
    pub fn sequencer(&self) -> &RequestSequencer {
        &self.sequencer
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    /// Returns the provider's [`AuthError`] (also recorded in auth state), a
    /// local [`AuthError::ValidationError`] for blank input,
    /// [`AuthError::Storage`] when the token set cannot be persisted, or
    /// [`AuthError::Superseded`] when a newer request started meanwhile and
    /// this one succeeded. A stale failure returns its own error.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let ticket = self.sequencer.issue();
        if let Err(error) = validate_credentials(email, password) {
            return self.fail(ticket, error);
        }

        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let payload = match self.provider.login(&request).await {
            Ok(payload) => payload,
            Err(error) => {
                debug!(code = %error.code(), "login rejected");
                return self.fail(ticket, error);
            }
        };

        let user = payload.user.clone();
        let session = Session::from_parts(payload.token_set, payload.session);
        let token = session.tokens.fingerprint();
        self.establish(ticket, UserSession::new(payload.user, session))?;
        info!(user = %user.id, token = %token, "login succeeded");
        Ok(user)
    }

    /// Creates an account.
    ///
    /// When the provider returns a token set the user is signed in exactly as
    /// after [`Self::login`]. When it only sends a confirmation email, nothing
    /// is persisted and no notification is published.
    ///
    /// # Errors
    /// Same as [`Self::login`].
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        profile_fields: ProfileFields,
    ) -> Result<RegisterOutcome, AuthError> {
        let ticket = self.sequencer.issue();
        if let Err(error) = validate_credentials(email, password) {
            return self.fail(ticket, error);
        }

        let request = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            profile_fields,
        };
        let payload = match self.provider.register(&request).await {
            Ok(payload) => payload,
            Err(error) => {
                debug!(code = %error.code(), "registration rejected");
                return self.fail(ticket, error);
            }
        };

        let Some(token_set) = payload.token_set else {
            info!(
                user = %payload.user.id,
                confirmation_sent = payload.confirmation_sent,
                "registration pending confirmation"
            );
            return Ok(RegisterOutcome {
                user: payload.user,
                session_issued: false,
                confirmation_sent: payload.confirmation_sent,
            });
        };

        let user = payload.user.clone();
        let session = Session::from_parts(token_set, payload.session);
        self.establish(ticket, UserSession::new(payload.user, session))?;
        info!(user = %user.id, "registration signed in");
        Ok(RegisterOutcome {
            user,
            session_issued: true,
            confirmation_sent: payload.confirmation_sent,
        })
    }

    /// Signs out at the user's request.
    ///
    /// # Errors
    /// See [`Self::logout_with_reason`].
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.logout_with_reason(LogoutReason::UserInitiated).await
    }

    /// Ends the session locally, then tells the provider.
    ///
    /// Local state is cleared before the remote call and supersedes every
    /// request still in flight. A failed remote call is logged, not returned.
    /// An expiry logout leaves [`AuthError::SessionExpired`] in auth state; a
    /// user logout clears any earlier error. Either way subscribers see one
    /// notification.
    ///
    /// # Errors
    /// Returns [`AuthError::Storage`] when the token store could not be
    /// cleared. Auth state is cleared regardless.
    pub async fn logout_with_reason(&self, reason: LogoutReason) -> Result<(), AuthError> {
        let reported = match reason {
            LogoutReason::UserInitiated => None,
            LogoutReason::SessionExpired => {
                Some(AuthError::session_expired("session ended after expiry"))
            }
        };
        let (_ticket, (stored, cleared, pending)) = self.sequencer.issue_and_apply(|| {
            let stored = self.store.load();
            let cleared = self.store.clear();
            (stored, cleared, self.broadcaster.stage_signed_out(reported))
        });
        pending.deliver();

        let access_token = match stored {
            Ok(stored) => stored.map(|tokens| tokens.access_token),
            Err(error) => {
                warn!(%error, "stored token set unreadable during logout");
                None
            }
        };

        if let Some(access_token) = access_token {
            match self.provider.logout(&access_token).await {
                Ok(()) => debug!("remote logout acknowledged"),
                Err(error) => warn!(
                    code = %error.code(),
                    reason = reason.as_str(),
                    "remote logout failed; local session already cleared"
                ),
            }
        }

        info!(reason = reason.as_str(), "logged out");
        cleared.map_err(|error| {
            error!(%error, "token store clear failed during logout");
            storage_error(error)
        })
    }

    /// Exchanges `refresh_token` for a new token set, keeping the session.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionExpired`] or [`AuthError::NetworkError`]
    /// from the provider, recorded in auth state while the current session
    /// stays in place.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        self.refresh_identity(refresh_token)
            .await
            .map(|identity| identity.session.tokens)
    }

    /// Refreshes the current session with the stored refresh token.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionExpired`] when nothing is stored, otherwise
    /// the errors of [`Self::refresh`].
    pub async fn extend_session(&self) -> Result<Session, AuthError> {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(error) => {
                let ticket = self.sequencer.issue();
                return self.fail(ticket, storage_error(error));
            }
        };
        let Some(tokens) = stored else {
            let ticket = self.sequencer.issue();
            return self.fail(ticket, AuthError::session_expired("no stored session to extend"));
        };

        let identity = self.refresh_identity(&tokens.refresh_token).await?;
        info!(
            session = %identity.session.id,
            expires_at = %identity.session.expires_at,
            "session extended"
        );
        Ok(identity.session)
    }

    /// Requests a password reset email.
    ///
    /// # Errors
    /// Returns a local [`AuthError::ValidationError`] for a malformed email,
    /// otherwise the provider's error.
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::invalid_field("email", "must be a valid email address"));
        }
        self.provider
            .reset_password(&ResetPasswordRequest {
                email: email.to_string(),
            })
            .await?;
        info!("password reset requested");
        Ok(())
    }

    /// Changes the signed-in user's password.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionExpired`] when nobody is signed in, a local
    /// validation error for a blank password, or the provider's error.
    pub async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        if new_password.trim().is_empty() {
            return Err(AuthError::invalid_field("password", "must not be blank"));
        }
        let identity = self.signed_in()?;
        self.provider
            .update_password(
                &identity.session.tokens.access_token,
                &UpdatePasswordRequest {
                    password: new_password.to_string(),
                },
            )
            .await?;
        info!(user = %identity.user.id, "password updated");
        Ok(())
    }

    /// Updates profile fields and replaces the cached user in place.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionExpired`] when nobody is signed in, the
    /// provider's error, or [`AuthError::Superseded`] when the session changed
    /// while the request was in flight.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User, AuthError> {
        let identity = self.signed_in()?;
        let user = self
            .provider
            .update_profile(&identity.session.tokens.access_token, &update)
            .await?;

        let pending = self.sequencer.exclusive(|| {
            let state = self.broadcaster.current();
            let Some(current) = state.identity() else {
                return None;
            };
            if current.session.id != identity.session.id {
                return None;
            }
            Some(
                self.broadcaster
                    .stage_user(Some(UserSession::new(user.clone(), current.session.clone()))),
            )
        });
        match pending {
            Some(pending) => {
                pending.deliver();
                info!(user = %user.id, "profile updated");
                Ok(user)
            }
            None => Err(AuthError::Superseded),
        }
    }

    /// Resolves the initial auth state from the token store.
    ///
    /// A live token set is confirmed with the provider, an expired one is
    /// refreshed, and anything that fails clears the store. The loading flag
    /// is turned off exactly once, whatever the outcome.
    ///
    /// # Errors
    /// Returns the failure that stopped the restore, or
    /// [`AuthError::Superseded`] when it succeeded after another auth request
    /// won the race. A stale failure leaves the store and auth state alone.
    pub async fn restore_session(&self) -> Result<Option<User>, AuthError> {
        let ticket = self.sequencer.issue();
        let restored = self.restore(ticket).await;
        self.finish_loading();
        restored
    }

    async fn restore(&self, ticket: u64) -> Result<Option<User>, AuthError> {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(error) => return self.discard(ticket, storage_error(error)),
        };
        let Some(tokens) = stored else {
            debug!("no stored session to restore");
            return Ok(None);
        };

        let identity = match self.confirm(tokens).await {
            Ok(identity) => identity,
            Err(error) => return self.discard(ticket, error),
        };
        let user = identity.user.clone();
        self.establish(ticket, identity)?;
        info!(user = %user.id, "session restored");
        Ok(Some(user))
    }

    async fn confirm(&self, tokens: TokenSet) -> Result<UserSession, AuthError> {
        if !TokenStore::is_expired(&tokens, self.clock.now()) {
            let current = self.provider.current_user(&tokens.access_token).await?;
            return Ok(UserSession::new(
                current.user,
                Session::from_parts(tokens, current.session),
            ));
        }

        debug!(token = %tokens.fingerprint(), "stored token set expired; refreshing");
        let payload = self
            .provider
            .refresh(&RefreshRequest {
                refresh_token: tokens.refresh_token,
            })
            .await?;
        let user = match payload.user {
            Some(user) => user,
            None => {
                self.provider
                    .current_user(&payload.token_set.access_token)
                    .await?
                    .user
            }
        };
        Ok(UserSession::new(
            user,
            Session::from_parts(payload.token_set, payload.session),
        ))
    }

    /// Drops a stored session that could not be restored.
    fn discard<T>(&self, ticket: u64, failure: AuthError) -> Result<T, AuthError> {
        warn!(code = %failure.code(), "stored session discarded");
        let discarded = self.sequencer.apply_if_current(ticket, || {
            if let Err(error) = self.store.clear() {
                error!(%error, "token store clear failed");
            }
            self.broadcaster.stage_error(Some(failure.clone()))
        });
        if let Ok(pending) = discarded {
            pending.deliver();
        }
        Err(failure)
    }

    fn finish_loading(&self) {
        let pending = self.sequencer.exclusive(|| {
            self.broadcaster
                .current()
                .is_loading()
                .then(|| self.broadcaster.stage_loading(false))
        });
        if let Some(pending) = pending {
            pending.deliver();
        }
    }

    async fn refresh_identity(&self, refresh_token: &str) -> Result<UserSession, AuthError> {
        let ticket = self.sequencer.issue();
        let payload = match self
            .provider
            .refresh(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })
            .await
        {
            Ok(payload) => payload,
            Err(error) => {
                warn!(code = %error.code(), "token refresh failed; keeping current session");
                return self.fail(ticket, error);
            }
        };

        let previous = self.broadcaster.current().identity().cloned();
        let user = match (payload.user, &previous) {
            (Some(user), _) => user,
            (None, Some(previous)) => previous.user.clone(),
            (None, None) => {
                return self.fail(
                    ticket,
                    AuthError::session_expired("no signed-in user for refreshed tokens"),
                );
            }
        };
        let info = payload.session.or_else(|| {
            previous.map(|previous| SessionInfo {
                id: previous.session.id,
                expires_at: None,
            })
        });

        let identity = UserSession::new(user, Session::from_parts(payload.token_set, info));
        self.establish(ticket, identity.clone())?;
        info!(
            session = %identity.session.id,
            token = %identity.session.tokens.fingerprint(),
            "tokens refreshed"
        );
        Ok(identity)
    }

    /// Persists the token set, then publishes the identity, if `ticket` is
    /// still current.
    fn establish(&self, ticket: u64, identity: UserSession) -> Result<(), AuthError> {
        let staged = self.sequencer.apply_if_current(ticket, || {
            self.store
                .save(&identity.session.tokens)
                .map(|()| self.broadcaster.stage_user(Some(identity)))
        })?;
        match staged {
            Ok(pending) => {
                pending.deliver();
                Ok(())
            }
            Err(error) => {
                error!(%error, "token store write failed");
                self.fail(ticket, storage_error(error))
            }
        }
    }

    /// Records `failure` in auth state if `ticket` is still current.
    ///
    /// The caller always gets `failure` back; a stale ticket only skips the
    /// auth state write.
    fn fail<T>(&self, ticket: u64, failure: AuthError) -> Result<T, AuthError> {
        let recorded = self
            .sequencer
            .apply_if_current(ticket, || self.broadcaster.stage_error(Some(failure.clone())));
        if let Ok(pending) = recorded {
            pending.deliver();
        }
        Err(failure)
    }

    fn signed_in(&self) -> Result<UserSession, AuthError> {
        self.broadcaster
            .current()
            .identity()
            .cloned()
            .ok_or_else(|| AuthError::session_expired("no signed-in user"))
    }
}

impl fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGateway")
            .field("storage_key", &self.store.key(session_guard_store::ACCESS_TOKEN_KEY))
            .field("latest_ticket", &self.sequencer.latest())
            .finish_non_exhaustive()
    }
}
