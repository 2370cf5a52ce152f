//! Command-line shell: restores the persisted session, optionally signs in,
//! and prints the resulting auth and monitor state.
//!
//! Usage: `session-guard-app [email password]`

use std::process::ExitCode;
use std::sync::Arc;

use session_guard_app::{AuthRuntime, SessionGuardConfig, init_tracing, landing_route, redact_sensitive};
use session_guard_core::SystemClock;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match SessionGuardConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "configuration rejected");
            return ExitCode::FAILURE;
        }
    };
    let runtime = match AuthRuntime::from_config(&config, Arc::new(SystemClock)) {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "runtime could not start");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = runtime.initialize().await {
        info!(code = %error.code(), "persisted session discarded");
    }

    let mut args = std::env::args().skip(1);
    if let (Some(email), Some(password)) = (args.next(), args.next()) {
        match runtime.gateway().login(&email, &password).await {
            Ok(user) => info!(user = %user.id, route = %landing_route(&user, None), "signed in"),
            Err(error) => {
                error!(code = %error.code(), message = %redact_sensitive(error.message()), "sign-in failed");
                runtime.shutdown().await;
                return ExitCode::FAILURE;
            }
        }
    }

    let state = runtime.auth_state();
    match state.user() {
        Some(user) => println!("signed in as {} ({})", user.email, user.id),
        None => println!("not signed in"),
    }
    let mut updates = runtime.status_updates();
    if state.session().is_some() {
        let _ = updates.changed().await;
    }
    let status = updates.borrow().clone();
    println!(
        "session phase {:?}, {} ms remaining",
        status.phase, status.time_until_expiry_ms
    );

    runtime.shutdown().await;
    ExitCode::SUCCESS
}
