#![warn(missing_docs)]
//! # session-guard-monitor
//!
//! ## Purpose
//! Tracks how long the current session has left, raises the expiry warning,
//! and ends the session when it runs out.
//!
//! ## Responsibilities
//! - Evaluate the [`SessionMonitor`] state machine for `(session, now)`.
//! - Re-evaluate on a fixed tick and whenever auth state changes.
//! - Decide warning visibility and drive extend/logout through
//!   [`SessionWarningController`].
//!
//! ## Data flow
//! [`spawn_session_monitor`] reads the broadcaster, publishes
//! [`SessionStatus`] on a watch channel -> [`spawn_warning_controller`]
//! observes it and calls the auth gateway on expiry.
//!
//! ## Ownership and lifetimes
//! Background tasks are owned by [`MonitorHandle`] and [`ControllerHandle`]
//! and are aborted when the handle drops.
//!
//! ## Error model
//! Invalid thresholds are rejected as [`MonitorError`] at construction. The
//! running monitor raises nothing; a failed extension is returned to the
//! caller of [`SessionWarningController::extend`].
//!
//! ## Security and privacy notes
//! Logs mention session ids and remaining time only.
//!
//! ## Example
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use session_guard_core::{Session, TokenSet};
//! use session_guard_monitor::{MonitorConfig, SessionMonitor, SessionPhase};
//!
//! let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
//! let session = Session::from_parts(TokenSet::new("a", "r", now + Duration::seconds(30)), None);
//! let mut monitor = SessionMonitor::new(MonitorConfig::default());
//! let status = monitor.evaluate(Some(&session), now);
//! assert_eq!(status.phase, SessionPhase::Warning);
//! assert_eq!(status.time_until_expiry_ms, 30_000);
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use session_guard_core::Session;
use thiserror::Error;
use tracing::{debug, info};

mod runtime;
mod warning;

pub use runtime::{MonitorHandle, spawn_session_monitor};
pub use warning::{
    ControllerHandle, SessionWarningController, WarningAction, WarningConfig, WarningView,
    spawn_warning_controller,
};

/// Default re-evaluation period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Default time-before-expiry at which the warning appears.
pub const DEFAULT_WARNING_THRESHOLD: Duration = Duration::from_millis(300_000);
/// Default time-before-expiry above which a dismissed warning may show again.
pub const DEFAULT_REARM_THRESHOLD: Duration = Duration::from_millis(240_000);

/// Timing configuration for the session monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    tick_interval: Duration,
    warning_threshold: Duration,
}

impl MonitorConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    /// Returns [`MonitorError::InvalidConfig`] when either value is zero.
    pub fn new(tick_interval: Duration, warning_threshold: Duration) -> Result<Self, MonitorError> {
        if tick_interval.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        if warning_threshold.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "warning threshold must be positive".to_string(),
            ));
        }
        Ok(Self {
            tick_interval,
            warning_threshold,
        })
    }

    /// Period between re-evaluations.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Remaining time below which the warning is raised.
    pub fn warning_threshold(&self) -> Duration {
        self.warning_threshold
    }

    fn warning_threshold_ms(&self) -> u64 {
        u64::try_from(self.warning_threshold.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

/// Identity of a monitored session; a new id or expiry restarts monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    /// Session id.
    pub id: String,
    /// Session expiry.
    pub expires_at: DateTime<Utc>,
}

impl SessionKey {
    /// Key of `session`.
    pub fn of(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            expires_at: session.expires_at,
        }
    }
}

/// Monitor phase for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nobody is signed in.
    Idle,
    /// Plenty of time left.
    Normal,
    /// Remaining time dropped below the warning threshold.
    Warning,
    /// The session has run out.
    Expired,
}

/// One evaluation of the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Current phase.
    pub phase: SessionPhase,
    /// Milliseconds until expiry, clamped at zero.
    pub time_until_expiry_ms: u64,
    /// `true` once the warning has fired for this session.
    pub show_warning: bool,
    /// Session being monitored, if any.
    pub session: Option<SessionKey>,
}

impl SessionStatus {
    /// Status with no session.
    pub fn idle() -> Self {
        Self {
            phase: SessionPhase::Idle,
            time_until_expiry_ms: 0,
            show_warning: false,
            session: None,
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// Pure expiry state machine.
///
/// NORMAL moves to WARNING the first time remaining time drops below the
/// threshold and only a different session moves it back. Zero remaining moves
/// to EXPIRED, which is final for that session.
#[derive(Debug, Clone)]
pub struct SessionMonitor {
    config: MonitorConfig,
    tracked: Option<SessionKey>,
    phase: SessionPhase,
}

impl SessionMonitor {
    /// Creates an idle monitor.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            tracked: None,
            phase: SessionPhase::Idle,
        }
    }

    /// Monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Advances the machine and returns the resulting status.
    pub fn evaluate(&mut self, session: Option<&Session>, now: DateTime<Utc>) -> SessionStatus {
        let Some(session) = session else {
            if self.tracked.take().is_some() {
                debug!("session monitor idle");
            }
            self.phase = SessionPhase::Idle;
            return SessionStatus::idle();
        };

        let key = SessionKey::of(session);
        if self.tracked.as_ref() != Some(&key) {
            debug!(session = %key.id, expires_at = %key.expires_at, "monitoring new session");
            self.tracked = Some(key.clone());
            self.phase = SessionPhase::Normal;
        }

        let remaining = session.time_until_expiry_ms(now);
        let next = match self.phase {
            SessionPhase::Expired => SessionPhase::Expired,
            _ if remaining == 0 => SessionPhase::Expired,
            SessionPhase::Normal if remaining < self.config.warning_threshold_ms() => {
                SessionPhase::Warning
            }
            SessionPhase::Idle => SessionPhase::Normal,
            phase => phase,
        };
        if next != self.phase {
            info!(session = %key.id, remaining_ms = remaining, phase = ?next, "session phase changed");
            self.phase = next;
        }

        SessionStatus {
            phase: self.phase,
            time_until_expiry_ms: remaining,
            show_warning: matches!(self.phase, SessionPhase::Warning | SessionPhase::Expired),
            session: Some(key),
        }
    }
}

/// Monitor configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// A threshold or interval is out of range.
    #[error("invalid monitor config: {0}")]
    InvalidConfig(String),
}
