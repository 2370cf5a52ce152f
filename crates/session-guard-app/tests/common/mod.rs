//! Shared fixtures for app integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use session_guard_app::{AuthRuntime, SessionGuardConfig};
use session_guard_auth::{
    AuthPayload, CurrentUserPayload, IdentityProvider, LoginRequest, ProfileUpdate, RefreshPayload,
    RefreshRequest, RegisterPayload, RegisterRequest, ResetPasswordRequest,
    ScriptedIdentityProvider, UpdatePasswordRequest,
};
use session_guard_core::{AuthError, Clock, User};
use session_guard_store::{KeyValueStorage, MemoryStorage, StorageWrite, StoreError};
use tokio::sync::oneshot;

/// Account every fixture provider knows.
#[allow(dead_code)]
pub const EMAIL: &str = "ada@example.test";
/// Password of [`EMAIL`].
#[allow(dead_code)]
pub const PASSWORD: &str = "correct horse";

/// Wall clock driven by tokio time, so paused tests control both.
#[allow(dead_code)]
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Clock reading 2030-01-01T00:00:00Z at creation.
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            origin: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed())
            .expect("test elapsed time fits chrono");
        self.origin + elapsed
    }
}

/// Storage that records every batch into a shared event log.
#[allow(dead_code)]
pub struct RecordingStorage {
    inner: MemoryStorage,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingStorage {
    /// Wraps fresh in-memory storage.
    #[allow(dead_code)]
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            inner: MemoryStorage::new(),
            events,
        }
    }
}

impl KeyValueStorage for RecordingStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn write_batch(&self, batch: &[StorageWrite]) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(format!("write:{}", batch.len()));
        self.inner.write_batch(batch)
    }
}

type Gate = (oneshot::Sender<()>, oneshot::Receiver<()>);

/// Provider whose next logins can be held until released.
#[allow(dead_code)]
pub struct GatedProvider {
    inner: Arc<ScriptedIdentityProvider>,
    gates: Mutex<VecDeque<Gate>>,
}

/// Test-side ends of one login gate.
#[allow(dead_code)]
pub struct LoginGate {
    /// Resolves once the gated login reached the provider.
    pub entered: oneshot::Receiver<()>,
    /// Lets the gated login continue.
    pub release: oneshot::Sender<()>,
}

impl GatedProvider {
    /// Wraps `inner`.
    #[allow(dead_code)]
    pub fn new(inner: Arc<ScriptedIdentityProvider>) -> Self {
        Self {
            inner,
            gates: Mutex::new(VecDeque::new()),
        }
    }

    /// Holds the next login until the returned gate is released.
    #[allow(dead_code)]
    pub fn gate_next_login(&self) -> LoginGate {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back((entered_tx, release_rx));
        LoginGate {
            entered: entered_rx,
            release: release_tx,
        }
    }
}

#[async_trait]
impl IdentityProvider for GatedProvider {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AuthError> {
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.await;
        }
        self.inner.login(request).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterPayload, AuthError> {
        self.inner.register(request).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        self.inner.logout(access_token).await
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshPayload, AuthError> {
        self.inner.refresh(request).await
    }

    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), AuthError> {
        self.inner.reset_password(request).await
    }

    async fn update_password(
        &self,
        access_token: &str,
        request: &UpdatePasswordRequest,
    ) -> Result<(), AuthError> {
        self.inner.update_password(access_token, request).await
    }

    async fn current_user(&self, access_token: &str) -> Result<CurrentUserPayload, AuthError> {
        self.inner.current_user(access_token).await
    }

    async fn update_profile(
        &self,
        access_token: &str,
        request: &ProfileUpdate,
    ) -> Result<User, AuthError> {
        self.inner.update_profile(access_token, request).await
    }
}

/// Scripted provider with the fixture account, on `clock`.
#[allow(dead_code)]
pub fn scripted_provider(clock: Arc<dyn Clock>) -> Arc<ScriptedIdentityProvider> {
    Arc::new(
        ScriptedIdentityProvider::new(clock)
            .with_account(EMAIL, PASSWORD)
            .with_account("grace@example.test", "another horse")
            .with_admin("root@example.test", "hunter2hunter2"),
    )
}

/// Runtime over `provider` and `storage` with default timing.
#[allow(dead_code)]
pub fn runtime(
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
) -> AuthRuntime {
    AuthRuntime::start(provider, storage, clock, &SessionGuardConfig::default())
}
