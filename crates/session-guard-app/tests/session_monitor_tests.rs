//! Integration tests for the expiry warning and automatic logout.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{EMAIL, PASSWORD, TokioClock, scripted_provider};
use session_guard_app::login_redirect;
use session_guard_auth::{LogoutReason, ProviderOp};
use session_guard_core::{AuthError, AuthErrorCode, Clock};
use session_guard_monitor::SessionPhase;
use session_guard_store::MemoryStorage;

#[tokio::test(start_paused = true)]
async fn session_monitor_tests_logs_out_once_when_session_runs_out() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    provider.set_token_ttl(chrono::Duration::seconds(30));
    let runtime = common::runtime(provider.clone(), Arc::new(MemoryStorage::new()), clock.clone());
    runtime.initialize().await.expect("nothing to restore");

    let mut updates = runtime.status_updates();
    runtime.gateway().login(EMAIL, PASSWORD).await.expect("login");
    let expires_at = runtime.auth_state().session().map(|session| session.expires_at).expect("signed in");

    let mut seen = Vec::new();
    let finished = tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            updates.changed().await.expect("monitor should keep running");
            let status = updates.borrow_and_update().clone();
            let done = status.phase == SessionPhase::Idle && !seen.is_empty();
            seen.push(status);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(finished.is_ok(), "session never returned to idle: {seen:?}");

    let first = &seen[0];
    assert_eq!(first.phase, SessionPhase::Warning);
    assert!(first.show_warning);
    assert!((29_000..=30_000).contains(&first.time_until_expiry_ms));

    let active: Vec<_> = seen.iter().filter(|status| status.phase != SessionPhase::Idle).collect();
    assert!(active.windows(2).all(|pair| pair[0].time_until_expiry_ms >= pair[1].time_until_expiry_ms));
    let last = active.last().expect("at least one active status");
    assert!(last.time_until_expiry_ms <= 1_000, "last active status: {last:?}");
    assert!(clock.now() >= expires_at);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(provider.call_count(ProviderOp::Logout), 1);
    let state = runtime.auth_state();
    assert!(state.user().is_none());
    assert_eq!(state.error().map(AuthError::code), Some(AuthErrorCode::SessionExpired));
    assert_eq!(
        login_redirect(LogoutReason::SessionExpired, Some("/reports")),
        "/login?reason=expired&redirect=%2Freports"
    );
    assert!(runtime.gateway().store().load().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn session_monitor_tests_user_logout_leaves_no_error_behind() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    let runtime = common::runtime(provider.clone(), Arc::new(MemoryStorage::new()), clock);
    runtime.initialize().await.expect("nothing to restore");
    runtime.gateway().login(EMAIL, PASSWORD).await.expect("login");

    provider.fail_next(ProviderOp::Refresh, AuthError::network("offline"));
    runtime.warning_controller().extend().await.expect_err("refresh should fail");
    assert_eq!(runtime.auth_state().error().map(AuthError::code), Some(AuthErrorCode::NetworkError));

    runtime.warning_controller().logout().await.expect("logout should work");
    let state = runtime.auth_state();
    assert!(state.user().is_none());
    assert!(state.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn session_monitor_tests_extend_hides_warning_until_next_crossing() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    provider.set_token_ttl(chrono::Duration::minutes(10));
    let runtime = common::runtime(provider.clone(), Arc::new(MemoryStorage::new()), clock);
    runtime.initialize().await.expect("nothing to restore");
    runtime.gateway().login(EMAIL, PASSWORD).await.expect("login");

    tokio::time::sleep(Duration::from_secs(4 * 60)).await;
    assert!(!runtime.warning().visible);

    tokio::time::sleep(Duration::from_secs(2 * 60 + 1)).await;
    assert!(runtime.session_status().show_warning);
    assert!(runtime.warning().visible);

    let before = runtime.auth_state().session().cloned().expect("signed in");
    let extended = runtime.warning_controller().extend().await.expect("extend should work");
    assert_eq!(extended.id, before.id);
    assert!(extended.expires_at > before.expires_at);
    assert!(!runtime.warning().visible);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = runtime.session_status();
    assert_eq!(status.phase, SessionPhase::Normal);
    assert!(!status.show_warning);
    assert!(!runtime.warning().visible);

    tokio::time::sleep(Duration::from_secs(5 * 60)).await;
    assert!(runtime.warning().visible);
    assert_eq!(provider.call_count(ProviderOp::Logout), 0);
}
