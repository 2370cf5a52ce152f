//! Deterministic in-memory identity provider, built with the `test-support`
//! feature.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use session_guard_core::{AuthError, Clock, Role, SessionInfo, TokenSet, User};

use crate::provider::IdentityProvider;
use crate::wire::{
    AuthPayload, CurrentUserPayload, LoginRequest, ProfileUpdate, RefreshPayload, RefreshRequest,
    RegisterPayload, RegisterRequest, ResetPasswordRequest, UpdatePasswordRequest,
};

/// Minimum password length enforced by the scripted provider.
pub const SCRIPTED_MIN_PASSWORD_LEN: usize = 8;

/// Provider operation, used to script failures and inspect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderOp {
    /// [`IdentityProvider::login`].
    Login,
    /// [`IdentityProvider::register`].
    Register,
    /// [`IdentityProvider::logout`].
    Logout,
    /// [`IdentityProvider::refresh`].
    Refresh,
    /// [`IdentityProvider::reset_password`].
    ResetPassword,
    /// [`IdentityProvider::update_password`].
    UpdatePassword,
    /// [`IdentityProvider::current_user`].
    CurrentUser,
    /// [`IdentityProvider::update_profile`].
    UpdateProfile,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: User,
}

#[derive(Debug, Clone)]
struct Grant {
    email: String,
    session_id: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
struct ScriptState {
    accounts: BTreeMap<String, Account>,
    access_tokens: BTreeMap<String, Grant>,
    refresh_tokens: BTreeMap<String, Grant>,
    failures: BTreeMap<ProviderOp, VecDeque<AuthError>>,
    calls: Vec<ProviderOp>,
    token_ttl: Duration,
    require_confirmation: bool,
    issued: u64,
}

/// In-memory [`IdentityProvider`] with scriptable failures.
///
/// Tokens are `access-N` / `refresh-N` and expire `token_ttl` after issue
/// according to the injected clock. Refresh rotates both tokens and keeps the
/// session id.
pub struct ScriptedIdentityProvider {
    clock: Arc<dyn Clock>,
    state: Mutex<ScriptState>,
}

impl ScriptedIdentityProvider {
    /// Creates a provider with no accounts and a one-hour token lifetime.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ScriptState {
                accounts: BTreeMap::new(),
                access_tokens: BTreeMap::new(),
                refresh_tokens: BTreeMap::new(),
                failures: BTreeMap::new(),
                calls: Vec::new(),
                token_ttl: Duration::hours(1),
                require_confirmation: false,
                issued: 0,
            }),
        }
    }

    /// Adds a regular account.
    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.insert_account(email, password, Role::User);
        self
    }

    /// Adds an administrative account.
    pub fn with_admin(self, email: &str, password: &str) -> Self {
        self.insert_account(email, password, Role::Admin);
        self
    }

    /// Sets the lifetime of subsequently issued tokens.
    pub fn with_token_ttl(self, ttl: Duration) -> Self {
        self.lock().token_ttl = ttl;
        self
    }

    /// Makes registrations return no session until email confirmation.
    pub fn with_email_confirmation(self) -> Self {
        self.lock().require_confirmation = true;
        self
    }

    /// Changes the lifetime of subsequently issued tokens.
    pub fn set_token_ttl(&self, ttl: Duration) {
        self.lock().token_ttl = ttl;
    }

    /// Queues `error` as the next result of `op`.
    pub fn fail_next(&self, op: ProviderOp, error: AuthError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ProviderOp> {
        self.lock().calls.clone()
    }

    /// Number of calls received for `op`.
    pub fn call_count(&self, op: ProviderOp) -> usize {
        self.lock().calls.iter().filter(|call| **call == op).count()
    }

    /// Invalidates every issued access and refresh token.
    pub fn revoke_all(&self) {
        let mut state = self.lock();
        state.access_tokens.clear();
        state.refresh_tokens.clear();
    }

    /// Account record for `email`.
    pub fn user(&self, email: &str) -> Option<User> {
        self.lock()
            .accounts
            .get(&email.to_ascii_lowercase())
            .map(|account| account.user.clone())
    }

    fn insert_account(&self, email: &str, password: &str, role: Role) {
        let now = self.clock.now();
        let mut state = self.lock();
        let id = format!("user-{}", state.accounts.len() + 1);
        let email = email.to_ascii_lowercase();
        let display_name = email.split('@').next().unwrap_or_default().to_string();
        state.accounts.insert(
            email.clone(),
            Account {
                password: password.to_string(),
                user: User {
                    id,
                    email,
                    display_name,
                    role,
                    email_verified: true,
                    created_at: now,
                    last_login_at: None,
                },
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and pops a scripted failure, if any.
    fn begin(&self, op: ProviderOp) -> Result<MutexGuard<'_, ScriptState>, AuthError> {
        let mut state = self.lock();
        state.calls.push(op);
        if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(state)
    }

    fn issue(&self, state: &mut ScriptState, email: &str, session_id: Option<String>) -> (TokenSet, SessionInfo) {
        state.issued += 1;
        let serial = state.issued;
        let expires_at = self.clock.now() + state.token_ttl;
        let session_id = session_id.unwrap_or_else(|| format!("session-{serial}"));
        let grant = Grant {
            email: email.to_string(),
            session_id: session_id.clone(),
            expires_at,
        };
        let tokens = TokenSet::new(format!("access-{serial}"), format!("refresh-{serial}"), expires_at);
        state.access_tokens.insert(tokens.access_token.clone(), grant.clone());
        state.refresh_tokens.insert(tokens.refresh_token.clone(), grant);
        (
            tokens,
            SessionInfo {
                id: session_id,
                expires_at: None,
            },
        )
    }

    fn authorize<'a>(&self, state: &'a mut ScriptState, access_token: &str) -> Result<&'a mut Account, AuthError> {
        let now = self.clock.now();
        let grant = state
            .access_tokens
            .get(access_token)
            .filter(|grant| now < grant.expires_at)
            .cloned()
            .ok_or_else(|| AuthError::session_expired("access token is not valid"))?;
        state
            .accounts
            .get_mut(&grant.email)
            .ok_or_else(|| AuthError::session_expired("account no longer exists"))
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentityProvider {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AuthError> {
        let mut state = self.begin(ProviderOp::Login)?;
        let email = request.email.to_ascii_lowercase();
        let now = self.clock.now();
        let user = match state.accounts.get_mut(&email) {
            Some(account) if account.password == request.password => {
                let user = account.user.clone();
                account.user.last_login_at = Some(now);
                user
            }
            _ => {
                return Err(AuthError::InvalidCredentials {
                    message: "invalid email or password".to_string(),
                });
            }
        };
        let (token_set, session) = self.issue(&mut state, &email, None);
        Ok(AuthPayload {
            user,
            token_set,
            session: Some(session),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterPayload, AuthError> {
        let mut state = self.begin(ProviderOp::Register)?;
        let email = request.email.to_ascii_lowercase();
        if request.password.chars().count() < SCRIPTED_MIN_PASSWORD_LEN {
            return Err(AuthError::invalid_field("password", "too short"));
        }
        if state.accounts.contains_key(&email) {
            return Err(AuthError::invalid_field("email", "already registered"));
        }

        let user = User {
            id: format!("user-{}", state.accounts.len() + 1),
            email: email.clone(),
            display_name: request
                .profile_fields
                .display_name
                .clone()
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string()),
            role: Role::User,
            email_verified: !state.require_confirmation,
            created_at: self.clock.now(),
            last_login_at: None,
        };
        state.accounts.insert(
            email.clone(),
            Account {
                password: request.password.clone(),
                user: user.clone(),
            },
        );

        if state.require_confirmation {
            return Ok(RegisterPayload {
                user,
                token_set: None,
                session: None,
                confirmation_sent: true,
            });
        }

        let (token_set, session) = self.issue(&mut state, &email, None);
        Ok(RegisterPayload {
            user,
            token_set: Some(token_set),
            session: Some(session),
            confirmation_sent: false,
        })
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let mut state = self.begin(ProviderOp::Logout)?;
        if let Some(grant) = state.access_tokens.remove(access_token) {
            state
                .refresh_tokens
                .retain(|_, candidate| candidate.session_id != grant.session_id);
        }
        Ok(())
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshPayload, AuthError> {
        let mut state = self.begin(ProviderOp::Refresh)?;
        let grant = state
            .refresh_tokens
            .remove(&request.refresh_token)
            .ok_or_else(|| AuthError::session_expired("refresh token rejected"))?;
        state
            .access_tokens
            .retain(|_, candidate| candidate.session_id != grant.session_id);
        let user = state
            .accounts
            .get(&grant.email)
            .map(|account| account.user.clone());
        let (token_set, session) = self.issue(&mut state, &grant.email, Some(grant.session_id));
        Ok(RefreshPayload {
            token_set,
            session: Some(session),
            user,
        })
    }

    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), AuthError> {
        let _state = self.begin(ProviderOp::ResetPassword)?;
        if !request.email.contains('@') {
            return Err(AuthError::invalid_field("email", "must be a valid email address"));
        }
        Ok(())
    }

    async fn update_password(
        &self,
        access_token: &str,
        request: &UpdatePasswordRequest,
    ) -> Result<(), AuthError> {
        let mut state = self.begin(ProviderOp::UpdatePassword)?;
        if request.password.chars().count() < SCRIPTED_MIN_PASSWORD_LEN {
            return Err(AuthError::invalid_field("password", "too short"));
        }
        let account = self.authorize(&mut state, access_token)?;
        account.password = request.password.clone();
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<CurrentUserPayload, AuthError> {
        let mut state = self.begin(ProviderOp::CurrentUser)?;
        let session_id = state
            .access_tokens
            .get(access_token)
            .map(|grant| grant.session_id.clone());
        let user = self.authorize(&mut state, access_token)?.user.clone();
        Ok(CurrentUserPayload {
            user,
            session: session_id.map(|id| SessionInfo {
                id,
                expires_at: None,
            }),
        })
    }

    async fn update_profile(
        &self,
        access_token: &str,
        request: &ProfileUpdate,
    ) -> Result<User, AuthError> {
        let mut state = self.begin(ProviderOp::UpdateProfile)?;
        let account = self.authorize(&mut state, access_token)?;
        if let Some(display_name) = &request.display_name {
            if display_name.trim().is_empty() {
                return Err(AuthError::invalid_field("displayName", "must not be blank"));
            }
            account.user.display_name = display_name.trim().to_string();
        }
        Ok(account.user.clone())
    }
}
