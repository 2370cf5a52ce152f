//! Background task that keeps a [`SessionStatus`] channel current.

use std::sync::Arc;

use session_guard_core::Clock;
use session_guard_state::{AuthStateBroadcaster, Subscription};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::{MonitorConfig, SessionMonitor, SessionStatus};

/// Owns the monitor task; dropping it stops monitoring.
pub struct MonitorHandle {
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
    _subscription: Subscription,
}

impl MonitorHandle {
    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// New receiver for status updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Stops the task and waits for it to finish.
    pub async fn stop(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts evaluating the current session on every tick and on every auth
/// state change.
///
/// Evaluation is skipped while the initial auth resolution is loading. Must be
/// called inside a tokio runtime.
pub fn spawn_session_monitor(
    broadcaster: Arc<AuthStateBroadcaster>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
) -> MonitorHandle {
    let (sender, receiver) = watch::channel(SessionStatus::idle());
    let changed = Arc::new(Notify::new());

    let wake = changed.clone();
    let subscription = broadcaster.subscribe(move |_| wake.notify_one());

    debug!(
        tick_ms = config.tick_interval().as_millis() as u64,
        warning_ms = config.warning_threshold().as_millis() as u64,
        "session monitor started"
    );
    let task = tokio::spawn(async move {
        let mut monitor = SessionMonitor::new(config);
        let mut ticker = tokio::time::interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = changed.notified() => {}
            }

            if sender.is_closed() {
                debug!("session monitor has no receivers; stopping");
                break;
            }

            let state = broadcaster.current();
            if state.is_loading() {
                continue;
            }

            let status = monitor.evaluate(state.session(), clock.now());
            sender.send_if_modified(|current| {
                if *current == status {
                    return false;
                }
                *current = status;
                true
            });
        }
    });

    MonitorHandle {
        status: receiver,
        task,
        _subscription: subscription,
    }
}
