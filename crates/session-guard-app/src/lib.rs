#![warn(missing_docs)]
//! # session-guard-app
//!
//! ## Purpose
//! Assembles the session-guard components into one runtime and provides the
//! navigation and logging helpers a client shell needs.
//!
//! ## Responsibilities
//! - Load and validate configuration from the environment.
//! - Construct store, broadcaster, gateway, monitor and warning controller.
//! - Choose post-login and post-logout routes.
//! - Install tracing and redact secrets from free text.
//!
//! ## Data flow
//! [`SessionGuardConfig::from_env`] -> [`AuthRuntime::start`] ->
//! [`AuthRuntime::initialize`] restores persisted tokens -> the monitor and
//! warning controller run until [`AuthRuntime::shutdown`].
//!
//! ## Ownership and lifetimes
//! The runtime owns every `Arc` it creates and the background task handles.
//!
//! ## Error model
//! Failures are wrapped in [`AppError`]; configuration problems are
//! [`ConfigError`].
//!
//! ## Security and privacy notes
//! - Redirect hints are honoured only when they stay on the same origin.
//! - [`redact_sensitive`] strips password, token and authorization values.

use session_guard_auth::LogoutReason;
use session_guard_core::{AuthError, User};
use session_guard_monitor::MonitorError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;
use url::form_urlencoded;

mod config;
mod runtime;

pub use config::{
    ConfigError, ENV_PROVIDER_URL, ENV_REARM_THRESHOLD_MS, ENV_STORAGE_NAMESPACE,
    ENV_STORAGE_PATH, ENV_TICK_INTERVAL_MS, ENV_WARNING_THRESHOLD_MS, SessionGuardConfig,
};
pub use runtime::AuthRuntime;

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "session_guard=info";
/// Entry route for signing in.
pub const LOGIN_ROUTE: &str = "/login";
/// Landing route for administrators.
pub const ADMIN_ROUTE: &str = "/admin";
/// Landing route for everyone else.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

const REDACTED: &str = "<redacted>";
const ROUTE_ORIGIN: &str = "https://session-guard.invalid/";

/// Installs the global fmt subscriber.
///
/// Honours `RUST_LOG` and falls back to [`DEFAULT_LOG_FILTER`]. Calling it
/// again is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Route to open after a successful sign-in.
///
/// A same-origin relative `redirect_hint` wins; otherwise administrators go
/// to [`ADMIN_ROUTE`] and everyone else to [`DASHBOARD_ROUTE`].
pub fn landing_route(user: &User, redirect_hint: Option<&str>) -> String {
    if let Some(hint) = redirect_hint.and_then(safe_relative_route) {
        return hint;
    }
    if user.is_admin() {
        ADMIN_ROUTE.to_string()
    } else {
        DASHBOARD_ROUTE.to_string()
    }
}

/// Login route shown after a logout.
///
/// Expired sessions carry `reason=expired`; a safe `return_to` path is kept as
/// the `redirect` hint.
pub fn login_redirect(reason: LogoutReason, return_to: Option<&str>) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    if reason == LogoutReason::SessionExpired {
        query.append_pair("reason", reason.as_str());
    }
    if let Some(path) = return_to.and_then(safe_relative_route) {
        query.append_pair("redirect", &path);
    }
    let query = query.finish();
    if query.is_empty() {
        LOGIN_ROUTE.to_string()
    } else {
        format!("{LOGIN_ROUTE}?{query}")
    }
}

/// Normalizes `hint` when it is a path on this origin, other than the login
/// route itself.
fn safe_relative_route(hint: &str) -> Option<String> {
    let hint = hint.trim();
    if !hint.starts_with('/') || hint.starts_with("//") || hint.contains('\\') {
        return None;
    }
    let origin = Url::parse(ROUTE_ORIGIN).ok()?;
    let resolved = origin.join(hint).ok()?;
    if resolved.origin() != origin.origin() || resolved.path() == LOGIN_ROUTE {
        return None;
    }

    let mut route = resolved.path().to_string();
    if let Some(query) = resolved.query() {
        route.push('?');
        route.push_str(query);
    }
    if let Some(fragment) = resolved.fragment() {
        route.push('#');
        route.push_str(fragment);
    }
    Some(route)
}

/// Replaces values following secret markers with `<redacted>`.
///
/// Handles `key=value`, `key: value`, JSON `"key":"value"` and
/// `Bearer value` shapes, case-insensitively.
pub fn redact_sensitive(input: &str) -> String {
    ["bearer", "password", "token", "authorization"]
        .iter()
        .fold(input.to_string(), |text, marker| redact_marker(&text, marker))
}

fn redact_marker(input: &str, marker: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let bytes = input.as_bytes();
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while let Some(offset) = lower[cursor..].find(marker) {
        let mut index = cursor + offset + marker.len();
        while index < bytes.len() && (bytes[index].is_ascii_alphanumeric() || bytes[index] == b'_') {
            index += 1;
        }
        let separator = index;
        while index < bytes.len() && matches!(bytes[index], b'=' | b':' | b' ' | b'"' | b'\'') {
            index += 1;
        }
        let value_start = index;
        while index < bytes.len()
            && !bytes[index].is_ascii_whitespace()
            && !matches!(bytes[index], b'"' | b'\'' | b'&' | b',' | b';' | b'{' | b'}' | b'[' | b']')
        {
            index += 1;
        }

        output.push_str(&input[cursor..value_start]);
        if separator < value_start && value_start < index && &input[value_start..index] != REDACTED {
            output.push_str(REDACTED);
        } else {
            output.push_str(&input[value_start..index]);
        }
        cursor = index;
    }

    output.push_str(&input[cursor..]);
    output
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Auth subsystem error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Monitor setup error.
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    /// No identity provider URL was configured.
    #[error("no identity provider configured; set {ENV_PROVIDER_URL}")]
    MissingProvider,
}

#[cfg(test)]
mod tests {
    //! Unit tests for routing and redaction helpers.

    use chrono::{TimeZone, Utc};
    use session_guard_core::Role;

    use super::*;

    fn user(role: Role) -> User {
        User {
            id: "user-1".to_string(),
            email: "ada@example.test".to_string(),
            display_name: "ada".to_string(),
            role,
            email_verified: true,
            created_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            last_login_at: None,
        }
    }

    #[test]
    fn landing_route_prefers_safe_hint_then_role() {
        assert_eq!(landing_route(&user(Role::Admin), None), "/admin");
        assert_eq!(landing_route(&user(Role::User), None), "/dashboard");
        assert_eq!(
            landing_route(&user(Role::User), Some("/settings?tab=profile")),
            "/settings?tab=profile"
        );
    }

    #[test]
    fn landing_route_ignores_unsafe_hints() {
        let member = user(Role::User);
        for hint in ["https://evil.test/", "//evil.test", "/\\evil.test", "settings", "/login"] {
            assert_eq!(landing_route(&member, Some(hint)), "/dashboard", "hint {hint}");
        }
    }

    #[test]
    fn expired_logout_redirect_carries_reason_and_path() {
        assert_eq!(
            login_redirect(LogoutReason::SessionExpired, Some("/reports/q1 final")),
            "/login?reason=expired&redirect=%2Freports%2Fq1%2520final"
        );
        assert_eq!(login_redirect(LogoutReason::UserInitiated, None), "/login");
        assert_eq!(
            login_redirect(LogoutReason::SessionExpired, Some("https://evil.test")),
            "/login?reason=expired"
        );
    }

    #[test]
    fn redaction_keeps_surrounding_text() {
        assert_eq!(
            redact_sensitive("login failed password=hunter2 user=ada"),
            "login failed password=<redacted> user=ada"
        );
        assert_eq!(
            redact_sensitive(r#"{"refreshToken":"abc","email":"a@b.com"}"#),
            r#"{"refreshToken":"<redacted>","email":"a@b.com"}"#
        );
    }
}
