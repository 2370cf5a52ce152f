//! Integration tests for logout and the post-logout route.

mod common;

use std::sync::Arc;

use common::{EMAIL, PASSWORD, TokioClock, scripted_provider};
use session_guard_app::login_redirect;
use session_guard_auth::{LogoutReason, ProviderOp};
use session_guard_core::{AuthError, Clock};
use session_guard_store::MemoryStorage;

#[tokio::test]
async fn logout_tests_clears_tokens_when_remote_call_fails() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    let runtime = common::runtime(provider.clone(), Arc::new(MemoryStorage::new()), clock);
    runtime.initialize().await.expect("nothing to restore");
    runtime.gateway().login(EMAIL, PASSWORD).await.expect("login");

    provider.fail_next(ProviderOp::Logout, AuthError::network("provider unreachable"));
    runtime.gateway().logout().await.expect("remote failure is not surfaced");

    assert!(runtime.gateway().store().load().unwrap().is_none());
    assert!(runtime.auth_state().user().is_none());
    assert!(runtime.auth_state().error().is_none());
}

#[tokio::test]
async fn logout_tests_clears_tokens_when_remote_call_succeeds() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    let runtime = common::runtime(provider.clone(), Arc::new(MemoryStorage::new()), clock);
    runtime.initialize().await.expect("nothing to restore");
    runtime.gateway().login(EMAIL, PASSWORD).await.expect("login");

    runtime.gateway().logout().await.expect("logout");
    assert!(runtime.gateway().store().load().unwrap().is_none());
    assert_eq!(provider.call_count(ProviderOp::Logout), 1);
}

#[test]
fn logout_tests_expired_session_redirects_with_reason() {
    assert_eq!(
        login_redirect(LogoutReason::SessionExpired, Some("/settings")),
        "/login?reason=expired&redirect=%2Fsettings"
    );
}
