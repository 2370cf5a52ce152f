//! Wiring of store, broadcaster, gateway, monitor and warning controller.

use std::sync::Arc;

use session_guard_auth::{AuthGateway, HttpIdentityProvider, IdentityProvider};
use session_guard_core::{AuthError, Clock, User};
use session_guard_monitor::{
    ControllerHandle, MonitorHandle, SessionStatus, SessionWarningController, WarningView,
    spawn_session_monitor, spawn_warning_controller,
};
use session_guard_state::{AuthState, AuthStateBroadcaster};
use session_guard_store::{JsonFileStorage, KeyValueStorage, MemoryStorage, TokenStore};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{AppError, SessionGuardConfig};

/// Running auth core: shared collaborators plus the background monitor.
///
/// Background tasks stop when the runtime is dropped or shut down.
pub struct AuthRuntime {
    gateway: Arc<AuthGateway>,
    broadcaster: Arc<AuthStateBroadcaster>,
    controller: Arc<SessionWarningController>,
    monitor: MonitorHandle,
    controller_task: ControllerHandle,
}

impl AuthRuntime {
    /// Builds every component over the given provider and storage.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        config: &SessionGuardConfig,
    ) -> Self {
        let store = Arc::new(match &config.storage_namespace {
            Some(namespace) => TokenStore::with_namespace(storage, namespace.clone()),
            None => TokenStore::new(storage),
        });
        let broadcaster = Arc::new(AuthStateBroadcaster::new());
        let gateway = Arc::new(AuthGateway::new(
            provider,
            store,
            broadcaster.clone(),
            clock.clone(),
        ));

        let monitor = spawn_session_monitor(broadcaster.clone(), clock, config.monitor);
        let controller = Arc::new(SessionWarningController::new(gateway.clone(), config.warning));
        let controller_task = spawn_warning_controller(controller.clone(), monitor.subscribe());
        debug!("auth runtime started");

        Self {
            gateway,
            broadcaster,
            controller,
            monitor,
            controller_task,
        }
    }

    /// Builds the runtime from configuration alone, using the HTTP provider.
    ///
    /// # Errors
    /// Returns [`AppError::MissingProvider`] when no provider URL is
    /// configured, or [`AppError::Auth`] when the HTTP client cannot be built.
    pub fn from_config(config: &SessionGuardConfig, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let url = config.provider_url.as_ref().ok_or(AppError::MissingProvider)?;
        let provider = Arc::new(HttpIdentityProvider::new(url.as_str())?);
        let storage: Arc<dyn KeyValueStorage> = match &config.storage_path {
            Some(path) => Arc::new(JsonFileStorage::new(path.clone())),
            None => Arc::new(MemoryStorage::new()),
        };
        Ok(Self::start(provider, storage, clock, config))
    }

    /// Resolves the initial auth state from persisted tokens.
    ///
    /// # Errors
    /// Returns the failure that discarded the persisted session; auth state
    /// already reflects it and is no longer loading.
    pub async fn initialize(&self) -> Result<Option<User>, AuthError> {
        let restored = self.gateway.restore_session().await;
        match &restored {
            Ok(Some(user)) => info!(user = %user.id, "auth runtime initialized with session"),
            Ok(None) => info!("auth runtime initialized without session"),
            Err(error) => info!(code = %error.code(), "auth runtime initialized after discarding session"),
        }
        restored
    }

    /// Auth gateway for sign-in flows.
    pub fn gateway(&self) -> &Arc<AuthGateway> {
        &self.gateway
    }

    /// Shared auth state.
    pub fn broadcaster(&self) -> &Arc<AuthStateBroadcaster> {
        &self.broadcaster
    }

    /// Snapshot of the auth state.
    pub fn auth_state(&self) -> AuthState {
        self.broadcaster.current()
    }

    /// Latest session monitor status.
    pub fn session_status(&self) -> SessionStatus {
        self.monitor.status()
    }

    /// Receiver for session monitor updates.
    pub fn status_updates(&self) -> watch::Receiver<SessionStatus> {
        self.monitor.subscribe()
    }

    /// Current warning view model.
    pub fn warning(&self) -> WarningView {
        self.controller.view()
    }

    /// Warning controller for extend/logout actions.
    pub fn warning_controller(&self) -> &Arc<SessionWarningController> {
        &self.controller
    }

    /// Stops background tasks and waits for them to finish.
    pub async fn shutdown(self) {
        self.controller_task.stop().await;
        self.monitor.stop().await;
        debug!("auth runtime stopped");
    }
}
