//! Expiry warning visibility and the actions behind it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use session_guard_auth::{AuthGateway, LogoutReason};
use session_guard_core::{AuthError, Session};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{DEFAULT_REARM_THRESHOLD, MonitorError, SessionKey, SessionPhase, SessionStatus};

/// Warning controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningConfig {
    rearm_threshold: Duration,
}

impl WarningConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    /// Returns [`MonitorError::InvalidConfig`] when the threshold is zero.
    pub fn new(rearm_threshold: Duration) -> Result<Self, MonitorError> {
        if rearm_threshold.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "re-arm threshold must be positive".to_string(),
            ));
        }
        Ok(Self { rearm_threshold })
    }

    /// Remaining time above which a dismissed warning may show again.
    pub fn rearm_threshold(&self) -> Duration {
        self.rearm_threshold
    }
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            rearm_threshold: DEFAULT_REARM_THRESHOLD,
        }
    }
}

/// What the UI should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningView {
    /// Whether the warning dialog is shown.
    pub visible: bool,
    /// Countdown value in milliseconds.
    pub time_until_expiry_ms: u64,
    /// Monitor phase the view was derived from.
    pub phase: SessionPhase,
}

/// Follow-up required after observing a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningAction {
    /// Nothing to do.
    None,
    /// The session expired and must be logged out now.
    ForceLogout,
}

#[derive(Debug, Default)]
struct ControllerState {
    status: SessionStatus,
    dismissed_for: Option<SessionKey>,
    logged_out_for: Option<SessionKey>,
}

/// Decides warning visibility and runs extend/logout for the UI.
///
/// The warning is visible while the monitor reports `show_warning` and the
/// current cycle has not been dismissed by a successful extension.
pub struct SessionWarningController {
    gateway: Arc<AuthGateway>,
    config: WarningConfig,
    state: Mutex<ControllerState>,
}

impl SessionWarningController {
    /// Creates a controller acting through `gateway`.
    pub fn new(gateway: Arc<AuthGateway>, config: WarningConfig) -> Self {
        Self {
            gateway,
            config,
            state: Mutex::new(ControllerState::default()),
        }
    }

    /// Records a monitor status and reports whether a forced logout is due.
    ///
    /// A dismissal is dropped only when time-until-expiry crosses from at or
    /// below the re-arm threshold to above it. A countdown that merely sits
    /// above the threshold never re-arms, whatever the warning threshold is.
    ///
    /// [`WarningAction::ForceLogout`] is returned at most once per session.
    pub fn observe(&self, status: &SessionStatus) -> WarningAction {
        let mut state = self.lock();
        let rearm_ms = u64::try_from(self.config.rearm_threshold.as_millis()).unwrap_or(u64::MAX);
        let rose_above = state.status.time_until_expiry_ms <= rearm_ms
            && status.time_until_expiry_ms > rearm_ms;
        if rose_above && state.dismissed_for.take().is_some() {
            debug!("warning dismissal re-armed");
        }
        state.status = status.clone();

        if status.phase != SessionPhase::Expired || status.session.is_none() {
            return WarningAction::None;
        }
        if state.logged_out_for == status.session {
            return WarningAction::None;
        }
        state.logged_out_for = status.session.clone();
        WarningAction::ForceLogout
    }

    /// Current view model.
    pub fn view(&self) -> WarningView {
        let state = self.lock();
        let dismissed = state.dismissed_for.is_some() && state.dismissed_for == state.status.session;
        WarningView {
            visible: state.status.show_warning && !dismissed,
            time_until_expiry_ms: state.status.time_until_expiry_ms,
            phase: state.status.phase,
        }
    }

    /// Extends the session; success hides the current warning.
    ///
    /// # Errors
    /// Returns the gateway's error; the session and warning stay as they are.
    pub async fn extend(&self) -> Result<Session, AuthError> {
        let session = self.gateway.extend_session().await?;
        let mut state = self.lock();
        state.dismissed_for = state.status.session.clone();
        info!(session = %session.id, "session extended from warning");
        Ok(session)
    }

    /// Logs out at the user's request.
    ///
    /// # Errors
    /// See [`AuthGateway::logout`].
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.gateway.logout().await
    }

    /// Observes `status` and performs a due forced logout.
    ///
    /// # Errors
    /// Returns the logout error, if a logout ran and failed.
    pub async fn handle(&self, status: &SessionStatus) -> Result<WarningAction, AuthError> {
        let action = self.observe(status);
        if action == WarningAction::ForceLogout {
            info!(
                session = status.session.as_ref().map(|key| key.id.as_str()),
                "session expired; logging out"
            );
            self.gateway
                .logout_with_reason(LogoutReason::SessionExpired)
                .await?;
        }
        Ok(action)
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Owns the controller task; dropping it stops the controller.
pub struct ControllerHandle {
    task: JoinHandle<()>,
}

impl ControllerHandle {
    /// Stops the task and waits for it to finish.
    pub async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Feeds every status published on `statuses` into `controller`.
///
/// The task ends when the monitor's sender is dropped.
pub fn spawn_warning_controller(
    controller: Arc<SessionWarningController>,
    mut statuses: watch::Receiver<SessionStatus>,
) -> ControllerHandle {
    let task = tokio::spawn(async move {
        loop {
            let status = statuses.borrow_and_update().clone();
            if let Err(error) = controller.handle(&status).await {
                warn!(code = %error.code(), "forced logout did not complete cleanly");
            }
            if statuses.changed().await.is_err() {
                debug!("session status channel closed; controller stopping");
                break;
            }
        }
    });
    ControllerHandle { task }
}
