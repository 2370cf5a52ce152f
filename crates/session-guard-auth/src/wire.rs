//! Request/response payloads exchanged with the identity provider, and the
//! mapping from the provider error envelope to [`AuthError`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use session_guard_core::{AuthError, FieldError, SessionInfo, TokenSet, User};

/// `POST /auth/login` body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Optional profile data submitted with a registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    /// Name shown in the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Additional provider-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `POST /auth/register` body.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Account email.
    pub email: String,
    /// Chosen password.
    pub password: String,
    /// Profile fields.
    #[serde(default)]
    pub profile_fields: ProfileFields,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("profile_fields", &self.profile_fields)
            .finish()
    }
}

/// `POST /auth/refresh` body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh credential from the current token set.
    pub refresh_token: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// `POST /auth/reset-password` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    /// Account email receiving the reset link.
    pub email: String,
}

/// `POST /auth/update-password` body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePasswordRequest {
    /// New password.
    pub password: String,
}

impl fmt::Debug for UpdatePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatePasswordRequest")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST /auth/update-profile` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Successful login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// Signed-in user.
    pub user: User,
    /// Issued tokens.
    pub token_set: TokenSet,
    /// Session metadata, when the provider tracks sessions separately.
    #[serde(default)]
    pub session: Option<SessionInfo>,
}

/// Successful registration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    /// Created user.
    pub user: User,
    /// Issued tokens; absent while email confirmation is pending.
    #[serde(default)]
    pub token_set: Option<TokenSet>,
    /// Session metadata.
    #[serde(default)]
    pub session: Option<SessionInfo>,
    /// Whether a confirmation email was sent.
    #[serde(default)]
    pub confirmation_sent: bool,
}

/// Successful refresh response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    /// Replacement tokens.
    pub token_set: TokenSet,
    /// Session metadata.
    #[serde(default)]
    pub session: Option<SessionInfo>,
    /// Fresh user record, when the provider includes one.
    #[serde(default)]
    pub user: Option<User>,
}

/// `GET /auth/user` response used to confirm a restored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserPayload {
    /// User owning the access token.
    pub user: User,
    /// Session metadata.
    #[serde(default)]
    pub session: Option<SessionInfo>,
}

/// `POST /auth/update-profile` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    /// Updated user.
    pub user: User,
}

/// Error body returned by the provider for any failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Provider error code.
    pub code: String,
    /// Provider message.
    #[serde(default)]
    pub message: String,
    /// Optional structured details (object or field-error array).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    /// Maps the envelope onto the local taxonomy.
    ///
    /// `retry_after_hint` is the transport-level hint (for example an HTTP
    /// `Retry-After` header); a `retryAfter` detail takes precedence.
    pub fn into_auth_error(self, retry_after_hint: Option<u64>) -> AuthError {
        let message = if self.message.trim().is_empty() {
            self.code.clone()
        } else {
            self.message
        };

        let normalized = normalize_code(&self.code);
        match normalized.as_str() {
            "invalidcredentials" | "invalidlogin" | "invalidgrant" => {
                AuthError::InvalidCredentials { message }
            }
            "accountlocked" | "accountdisabled" | "userbanned" => AuthError::AccountLocked { message },
            "ratelimitexceeded" | "ratelimited" | "toomanyrequests" => {
                AuthError::RateLimitExceeded {
                    retry_after_secs: self
                        .details
                        .as_ref()
                        .and_then(retry_after_detail)
                        .or(retry_after_hint),
                    message,
                }
            }
            "validationerror" | "validationfailed" | "invalidinput" | "weakpassword" => {
                let mut fields = self.details.as_ref().map(field_errors).unwrap_or_default();
                if fields.is_empty() && normalized == "weakpassword" {
                    fields.push(FieldError::new("password", message.clone()));
                }
                AuthError::ValidationError { message, fields }
            }
            "sessionexpired" | "tokenexpired" | "refreshtokenexpired" | "invalidrefreshtoken"
            | "refreshtokennotfound" => AuthError::SessionExpired { message },
            "networkerror" => AuthError::NetworkError { message },
            _ => AuthError::ProviderError {
                code: self.code,
                message,
                details: self.details,
            },
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|character| !matches!(character, '_' | '-' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn retry_after_detail(details: &Value) -> Option<u64> {
    let value = details.get("retryAfter").or_else(|| details.get("retry_after"))?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
}

/// Extracts field errors from an array of `{field, message}` objects, an
/// object with a `fields` array, or a flat `{field: message}` object.
fn field_errors(details: &Value) -> Vec<FieldError> {
    match details {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let field = item.get("field")?.as_str()?;
                let message = item.get("message").and_then(Value::as_str).unwrap_or("invalid");
                Some(FieldError::new(field, message))
            })
            .collect(),
        Value::Object(map) => {
            if let Some(nested) = map.get("fields") {
                return field_errors(nested);
            }
            map.iter()
                .filter_map(|(field, value)| match value {
                    Value::String(message) => Some(FieldError::new(field.clone(), message.clone())),
                    Value::Array(messages) => messages
                        .first()
                        .and_then(Value::as_str)
                        .map(|message| FieldError::new(field.clone(), message)),
                    _ => None,
                })
                .collect()
        }
        _ => Vec::new(),
    }
}
