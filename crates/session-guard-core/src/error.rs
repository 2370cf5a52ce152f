//! Auth error taxonomy shared by the gateway, auth state, and UI layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Field-level validation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Form field name (for example `password`).
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors produced by authentication operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    /// Email/password pair was rejected.
    #[error("invalid credentials: {message}")]
    InvalidCredentials {
        /// Provider message.
        message: String,
    },
    /// Account is locked and cannot sign in.
    #[error("account locked: {message}")]
    AccountLocked {
        /// Provider message.
        message: String,
    },
    /// Too many attempts; retry later.
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Provider message.
        message: String,
        /// Suggested wait before retrying, in seconds.
        retry_after_secs: Option<u64>,
    },
    /// Input failed validation.
    #[error("validation failed: {message}")]
    ValidationError {
        /// Summary message.
        message: String,
        /// Per-field details.
        fields: Vec<FieldError>,
    },
    /// Session or refresh token is no longer accepted.
    #[error("session expired: {message}")]
    SessionExpired {
        /// Provider or local message.
        message: String,
    },
    /// Transport failure or malformed response.
    #[error("network error: {message}")]
    NetworkError {
        /// Transport detail.
        message: String,
    },
    /// Provider reported a failure code this client does not map.
    #[error("provider error ({code}): {message}")]
    ProviderError {
        /// Raw provider code.
        code: String,
        /// Provider message.
        message: String,
        /// Raw provider details, if any.
        details: Option<Value>,
    },
    /// Token persistence failed.
    #[error("token storage failure: {message}")]
    Storage {
        /// Backend detail.
        message: String,
    },
    /// A newer request was issued before this one completed.
    #[error("request superseded by a newer auth request")]
    Superseded,
}

impl AuthError {
    /// Builds a [`AuthError::NetworkError`].
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Builds a [`AuthError::SessionExpired`].
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Builds a single-field [`AuthError::ValidationError`].
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = FieldError::new(field, message);
        Self::ValidationError {
            message: format!("{}: {}", field.field, field.message),
            fields: vec![field],
        }
    }

    /// Returns the enumerated kind.
    pub fn code(&self) -> AuthErrorCode {
        match self {
            Self::InvalidCredentials { .. } => AuthErrorCode::InvalidCredentials,
            Self::AccountLocked { .. } => AuthErrorCode::AccountLocked,
            Self::RateLimitExceeded { .. } => AuthErrorCode::RateLimitExceeded,
            Self::ValidationError { .. } => AuthErrorCode::ValidationError,
            Self::SessionExpired { .. } => AuthErrorCode::SessionExpired,
            Self::NetworkError { .. } => AuthErrorCode::NetworkError,
            Self::ProviderError { .. } => AuthErrorCode::ProviderError,
            Self::Storage { .. } => AuthErrorCode::Storage,
            Self::Superseded => AuthErrorCode::Superseded,
        }
    }

    /// Returns the human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidCredentials { message }
            | Self::AccountLocked { message }
            | Self::RateLimitExceeded { message, .. }
            | Self::ValidationError { message, .. }
            | Self::SessionExpired { message }
            | Self::NetworkError { message }
            | Self::ProviderError { message, .. }
            | Self::Storage { message } => message,
            Self::Superseded => "request superseded",
        }
    }

    /// Field-level details for validation failures; empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::ValidationError { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Classifies how the presentation layer should render this error.
    pub fn presentation(&self) -> ErrorPresentation {
        match self {
            Self::InvalidCredentials { .. }
            | Self::AccountLocked { .. }
            | Self::RateLimitExceeded { .. }
            | Self::ValidationError { .. } => ErrorPresentation::FormLevel,
            Self::SessionExpired { .. } => ErrorPresentation::ForcedLogout,
            Self::NetworkError { .. }
            | Self::ProviderError { .. }
            | Self::Storage { .. }
            | Self::Superseded => ErrorPresentation::Retryable,
        }
    }
}

/// Enumerated error kind, stable across wire and UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthErrorCode {
    /// See [`AuthError::InvalidCredentials`].
    InvalidCredentials,
    /// See [`AuthError::AccountLocked`].
    AccountLocked,
    /// See [`AuthError::RateLimitExceeded`].
    RateLimitExceeded,
    /// See [`AuthError::ValidationError`].
    ValidationError,
    /// See [`AuthError::SessionExpired`].
    SessionExpired,
    /// See [`AuthError::NetworkError`].
    NetworkError,
    /// See [`AuthError::ProviderError`].
    ProviderError,
    /// See [`AuthError::Storage`].
    Storage,
    /// See [`AuthError::Superseded`].
    Superseded,
}

impl AuthErrorCode {
    /// Canonical code string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "InvalidCredentials",
            Self::AccountLocked => "AccountLocked",
            Self::RateLimitExceeded => "RateLimitExceeded",
            Self::ValidationError => "ValidationError",
            Self::SessionExpired => "SessionExpired",
            Self::NetworkError => "NetworkError",
            Self::ProviderError => "ProviderError",
            Self::Storage => "Storage",
            Self::Superseded => "Superseded",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an error surfaces to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPresentation {
    /// Render next to the form that triggered it.
    FormLevel,
    /// Render a generic "try again" message.
    Retryable,
    /// Sign the user out and return to the login entry point.
    ForcedLogout,
}

#[cfg(test)]
mod tests {
    //! Unit tests for error classification.

    use super::*;

    #[test]
    fn codes_render_canonical_names() {
        let error = AuthError::invalid_field("password", "too short");
        assert_eq!(error.code().to_string(), "ValidationError");
        assert_eq!(error.field_errors()[0].field, "password");
        assert_eq!(error.presentation(), ErrorPresentation::FormLevel);
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert_eq!(
            AuthError::network("connection reset").presentation(),
            ErrorPresentation::Retryable
        );
        assert_eq!(
            AuthError::session_expired("refresh rejected").presentation(),
            ErrorPresentation::ForcedLogout
        );
    }
}
