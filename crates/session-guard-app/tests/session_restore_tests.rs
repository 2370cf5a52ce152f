//! Integration tests for restoring persisted sessions at startup.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{EMAIL, PASSWORD, TokioClock, scripted_provider};
use session_guard_app::AuthRuntime;
use session_guard_auth::ProviderOp;
use session_guard_core::{AuthErrorCode, Clock, TokenSet};
use session_guard_state::Subscription;
use session_guard_store::{KeyValueStorage, MemoryStorage, TokenStore};

fn record_loading(runtime: &AuthRuntime) -> (Subscription, Arc<Mutex<Vec<bool>>>) {
    let flags = Arc::new(Mutex::new(Vec::new()));
    let sink = flags.clone();
    let subscription = runtime
        .broadcaster()
        .subscribe(move |state| sink.lock().unwrap().push(state.is_loading()));
    (subscription, flags)
}

#[tokio::test]
async fn session_restore_tests_without_tokens_finishes_loading_once() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let runtime = common::runtime(scripted_provider(clock.clone()), Arc::new(MemoryStorage::new()), clock);
    let (_subscription, flags) = record_loading(&runtime);

    assert_eq!(runtime.initialize().await, Ok(None));
    assert_eq!(*flags.lock().unwrap(), vec![false]);
    assert!(!runtime.auth_state().is_authenticated());
}

#[tokio::test]
async fn session_restore_tests_confirms_live_tokens_with_provider() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

    let first = common::runtime(provider.clone(), storage.clone(), clock.clone());
    first.initialize().await.expect("nothing to restore");
    let user = first.gateway().login(EMAIL, PASSWORD).await.expect("login");
    first.shutdown().await;

    let second = common::runtime(provider.clone(), storage, clock);
    let (_subscription, flags) = record_loading(&second);
    let restored = second.initialize().await.expect("session should restore");

    assert_eq!(restored.map(|restored| restored.id), Some(user.id));
    assert_eq!(*flags.lock().unwrap(), vec![true, false]);
    assert!(second.auth_state().is_authenticated());
    assert_eq!(provider.call_count(ProviderOp::CurrentUser), 1);
    assert_eq!(provider.call_count(ProviderOp::Refresh), 0);
}

#[tokio::test(start_paused = true)]
async fn session_restore_tests_refreshes_expired_tokens() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let provider = scripted_provider(clock.clone());
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

    let first = common::runtime(provider.clone(), storage.clone(), clock.clone());
    first.initialize().await.expect("nothing to restore");
    first.gateway().login(EMAIL, PASSWORD).await.expect("login");
    let stale = first.gateway().store().load().unwrap().expect("tokens stored");
    first.shutdown().await;

    tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;

    let second = common::runtime(provider.clone(), storage, clock.clone());
    second.initialize().await.expect("expired tokens should refresh");

    let fresh = second.gateway().store().load().unwrap().expect("tokens stored");
    assert_ne!(fresh.access_token, stale.access_token);
    assert!(fresh.expires_at > clock.now());
    assert_eq!(provider.call_count(ProviderOp::Refresh), 1);
    assert!(second.auth_state().is_authenticated());
}

#[tokio::test]
async fn session_restore_tests_discards_rejected_tokens() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(storage.clone());
    store
        .save(&TokenSet::new(
            "forged-access",
            "forged-refresh",
            clock.now() + chrono::Duration::hours(1),
        ))
        .expect("seed tokens");

    let runtime = common::runtime(scripted_provider(clock.clone()), storage, clock);
    let (_subscription, flags) = record_loading(&runtime);
    let error = runtime.initialize().await.expect_err("provider rejects forged tokens");

    assert_eq!(error.code(), AuthErrorCode::SessionExpired);
    assert!(store.load().unwrap().is_none());
    assert_eq!(*flags.lock().unwrap(), vec![true, false]);

    let state = runtime.auth_state();
    assert!(!state.is_authenticated());
    assert_eq!(state.error(), Some(&error));
}
