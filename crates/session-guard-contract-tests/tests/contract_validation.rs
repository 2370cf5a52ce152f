//! Validates provider fixtures against frozen JSON schemas and checks the
//! client decodes them.

use jsonschema::JSONSchema;
use serde_json::{Value, json};
use session_guard_auth::{AuthPayload, ErrorEnvelope, RegisterPayload};
use session_guard_core::{AuthErrorCode, Role};

fn load_json(path: &str) -> Value {
    let raw = std::fs::read_to_string(path).expect("json file should be readable");
    serde_json::from_str(&raw).expect("json file should be valid")
}

fn compile_validator(schema_path: &str) -> JSONSchema {
    let schema = load_json(schema_path);
    JSONSchema::compile(&schema).expect("schema should compile")
}

#[test]
fn login_fixture_matches_schema_and_decodes() {
    let validator = compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/login-response.schema.json"
    ));
    let fixture = load_json(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/login-response.valid.json"
    ));
    assert!(
        validator.is_valid(&fixture),
        "login fixture should validate against schema"
    );

    let payload: AuthPayload = serde_json::from_value(fixture).expect("login payload decodes");
    assert_eq!(payload.user.role, Role::Admin);
    assert_eq!(payload.token_set.refresh_token, "rt-0f9c2a");
    assert_eq!(payload.session.expect("session present").id, "session-7");
}

#[test]
fn pending_registration_fixture_matches_schema_and_decodes() {
    let validator = compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/register-response.schema.json"
    ));
    let fixture = load_json(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/register-response.pending.json"
    ));
    assert!(validator.is_valid(&fixture));

    let payload: RegisterPayload =
        serde_json::from_value(fixture).expect("register payload decodes");
    assert!(payload.token_set.is_none());
    assert!(payload.confirmation_sent);
    assert_eq!(payload.user.display_name, "");
}

#[test]
fn error_envelope_fixtures_map_to_local_codes() {
    let validator = compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/error-envelope.schema.json"
    ));
    let validation = load_json(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/error-envelope.validation.json"
    ));
    let rate_limit = load_json(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/fixtures/error-envelope.rate-limit.json"
    ));
    assert!(validator.is_valid(&validation));
    assert!(validator.is_valid(&rate_limit));

    let error = serde_json::from_value::<ErrorEnvelope>(validation)
        .expect("envelope decodes")
        .into_auth_error(None);
    assert_eq!(error.code(), AuthErrorCode::ValidationError);
    assert_eq!(error.field_errors()[0].field, "password");

    let error = serde_json::from_value::<ErrorEnvelope>(rate_limit)
        .expect("envelope decodes")
        .into_auth_error(Some(5));
    assert_eq!(error.code(), AuthErrorCode::RateLimitExceeded);
}

#[test]
fn login_schema_rejects_missing_tokens() {
    let validator = compile_validator(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../contracts/login-response.schema.json"
    ));
    let invalid = json!({
        "user": {
            "id": "user-1",
            "email": "ada@example.test",
            "role": "user",
            "createdAt": "2030-01-01T00:00:00Z"
        }
    });
    assert!(
        !validator.is_valid(&invalid),
        "login response without tokenSet should fail schema validation"
    );
}
