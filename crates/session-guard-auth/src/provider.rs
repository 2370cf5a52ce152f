//! Identity provider boundary and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_guard_core::{AuthError, User};
use tracing::debug;
use url::Url;

use crate::wire::{
    AuthPayload, CurrentUserPayload, ErrorEnvelope, LoginRequest, ProfileUpdate, RefreshPayload,
    RefreshRequest, RegisterPayload, RegisterRequest, ResetPasswordRequest, UpdatePasswordRequest,
    UserPayload,
};

/// Default per-request timeout for [`HttpIdentityProvider`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote service that authenticates credentials and issues tokens.
///
/// Every method is one independent request/response exchange. Implementations
/// map provider failures onto [`AuthError`] and never touch local state.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `POST /auth/login`.
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AuthError>;

    /// `POST /auth/register`.
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterPayload, AuthError>;

    /// `POST /auth/logout` for the session owning `access_token`.
    async fn logout(&self, access_token: &str) -> Result<(), AuthError>;

    /// `POST /auth/refresh`.
    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshPayload, AuthError>;

    /// `POST /auth/reset-password`.
    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), AuthError>;

    /// `POST /auth/update-password` for the session owning `access_token`.
    async fn update_password(
        &self,
        access_token: &str,
        request: &UpdatePasswordRequest,
    ) -> Result<(), AuthError>;

    /// `GET /auth/user`: confirms which user owns `access_token`.
    async fn current_user(&self, access_token: &str) -> Result<CurrentUserPayload, AuthError>;

    /// `POST /auth/update-profile`.
    async fn update_profile(
        &self,
        access_token: &str,
        request: &ProfileUpdate,
    ) -> Result<User, AuthError>;
}

/// Validates the provider base URL.
///
/// # Errors
/// Returns [`AuthError::ProviderError`] with code `invalid_endpoint` when the
/// URL does not parse, is not HTTPS, or carries a query or fragment.
pub fn validate_provider_endpoint(endpoint: &str) -> Result<Url, AuthError> {
    let invalid = |message: String| AuthError::ProviderError {
        code: "invalid_endpoint".to_string(),
        message,
        details: None,
    };

    let mut parsed =
        Url::parse(endpoint).map_err(|error| invalid(format!("invalid provider url: {error}")))?;

    if parsed.scheme() != "https" {
        return Err(invalid("provider endpoint must use https".to_string()));
    }

    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid(
            "provider endpoint must not carry a query or fragment".to_string(),
        ));
    }

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }

    Ok(parsed)
}

/// [`IdentityProvider`] speaking JSON over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    base: Url,
    client: Client,
}

impl HttpIdentityProvider {
    /// Creates a provider rooted at `endpoint` with the default timeout.
    ///
    /// # Errors
    /// Returns an error when the endpoint fails
    /// [`validate_provider_endpoint`] or the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, AuthError> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a provider with a custom per-request timeout.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, AuthError> {
        let base = validate_provider_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("session-guard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| AuthError::network(format!("http client setup failed: {error}")))?;
        Ok(Self { base, client })
    }

    /// Provider base URL.
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, AuthError> {
        self.base
            .join(path)
            .map_err(|error| AuthError::network(format!("invalid provider path {path}: {error}")))
    }

    fn post<B>(&self, path: &str, bearer: Option<&str>, body: &B) -> Result<RequestBuilder, AuthError>
    where
        B: Serialize + ?Sized,
    {
        let builder = self.client.post(self.url(path)?).json(body);
        Ok(match bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<R>(&self, path: &str, request: RequestBuilder) -> Result<R, AuthError>
    where
        R: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|error| AuthError::network(format!("{path}: {error}")))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response
            .bytes()
            .await
            .map_err(|error| AuthError::network(format!("{path}: {error}")))?;
        debug!(path, status = status.as_u16(), "provider responded");

        if status.is_success() {
            let raw: &[u8] = if body.is_empty() { b"{}" } else { &body };
            return serde_json::from_slice(raw).map_err(|error| {
                AuthError::network(format!("{path}: malformed provider response: {error}"))
            });
        }

        match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(envelope) => Err(envelope.into_auth_error(retry_after)),
            Err(_) => Err(status_error(status, retry_after)),
        }
    }
}

/// Maps a failed status without a decodable envelope.
fn status_error(status: StatusCode, retry_after: Option<u64>) -> AuthError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::RateLimitExceeded {
            message: "too many requests".to_string(),
            retry_after_secs: retry_after,
        };
    }

    if status.is_server_error() {
        return AuthError::network(format!("provider unavailable ({status})"));
    }

    AuthError::ProviderError {
        code: format!("http_{}", status.as_u16()),
        message: status
            .canonical_reason()
            .unwrap_or("unexpected provider status")
            .to_string(),
        details: None,
    }
}

/// Body for calls that return nothing useful.
#[derive(serde::Deserialize)]
struct Empty {}

#[derive(Serialize)]
struct NoBody {}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AuthError> {
        let builder = self.post("auth/login", None, request)?;
        self.send("auth/login", builder).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterPayload, AuthError> {
        let builder = self.post("auth/register", None, request)?;
        self.send("auth/register", builder).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), AuthError> {
        let builder = self.post("auth/logout", Some(access_token), &NoBody {})?;
        self.send::<Empty>("auth/logout", builder).await.map(|_| ())
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshPayload, AuthError> {
        let builder = self.post("auth/refresh", None, request)?;
        self.send("auth/refresh", builder).await
    }

    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<(), AuthError> {
        let builder = self.post("auth/reset-password", None, request)?;
        self.send::<Empty>("auth/reset-password", builder)
            .await
            .map(|_| ())
    }

    async fn update_password(
        &self,
        access_token: &str,
        request: &UpdatePasswordRequest,
    ) -> Result<(), AuthError> {
        let builder = self.post("auth/update-password", Some(access_token), request)?;
        self.send::<Empty>("auth/update-password", builder)
            .await
            .map(|_| ())
    }

    async fn current_user(&self, access_token: &str) -> Result<CurrentUserPayload, AuthError> {
        let builder = self
            .client
            .get(self.url("auth/user")?)
            .bearer_auth(access_token);
        self.send("auth/user", builder).await
    }

    async fn update_profile(
        &self,
        access_token: &str,
        request: &ProfileUpdate,
    ) -> Result<User, AuthError> {
        let builder = self.post("auth/update-profile", Some(access_token), request)?;
        self.send::<UserPayload>("auth/update-profile", builder)
            .await
            .map(|payload| payload.user)
    }
}
