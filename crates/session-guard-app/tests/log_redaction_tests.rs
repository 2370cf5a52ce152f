//! Integration tests for scrubbing credentials out of log text.

use session_guard_app::redact_sensitive;

#[test]
fn log_redaction_tests_scrubs_authorization_header() {
    let redacted = redact_sensitive("GET /auth/user Authorization: Bearer access-17 -> 401");

    assert!(!redacted.contains("access-17"));
    assert!(redacted.starts_with("GET /auth/user Authorization: "));
    assert!(redacted.ends_with(" -> 401"));
}

#[test]
fn log_redaction_tests_scrubs_token_fields_in_provider_json() {
    let body = r#"{"tokenSet":{"accessToken":"a-1","refreshToken":"r-1","expiresAt":"2030-01-01T00:00:00Z"}}"#;
    let redacted = redact_sensitive(body);

    assert!(!redacted.contains("a-1"));
    assert!(!redacted.contains("r-1"));
    assert!(redacted.contains(r#""expiresAt":"2030-01-01T00:00:00Z""#));
}

#[test]
fn log_redaction_tests_leaves_identifiers_alone() {
    let raw = "session s-1 restored for user-7";
    assert_eq!(redact_sensitive(raw), raw);
}
