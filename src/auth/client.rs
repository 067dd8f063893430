/// Authenticated API client
///
/// Owns the session lifecycle against the portal's auth service (login,
/// refresh, logout) and sends requests to protected endpoints with the
/// current bearer token, recovering once from an expired access token.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::claims::peek_claims;
use crate::auth::request::{resolve_url, AuthRequest};
use crate::configuration::ApiSettings;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::session::{is_admin_role, Session, TokenPair, UserInfo};
use crate::store::{SessionStore, TokenStore};
use crate::validators::{is_valid_email, is_valid_password};

pub const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";

/// Login request body
#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Login response envelope
#[derive(Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    access_token: String,
    refresh_token: String,
    user: UserInfo,
}

/// Token refresh request body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Why a refresh did not produce a new pair. Every variant ends the session.
#[derive(Debug)]
enum RefreshFailure {
    MissingToken,
    Rejected(StatusCode),
    Unreachable(String),
    Malformed(String),
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshFailure::MissingToken => write!(f, "no refresh token stored"),
            RefreshFailure::Rejected(status) => {
                write!(f, "refresh rejected with status {}", status.as_u16())
            }
            RefreshFailure::Unreachable(msg) => write!(f, "refresh endpoint unreachable: {}", msg),
            RefreshFailure::Malformed(msg) => write!(f, "malformed refresh response: {}", msg),
        }
    }
}

#[derive(Clone)]
pub struct AuthClient {
    http_client: reqwest::Client,
    base_url: String,
    login_path: String,
    refresh_path: String,
    store: Arc<dyn TokenStore>,
}

impl AuthClient {
    pub fn new(
        base_url: String,
        store: Arc<dyn TokenStore>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            http_client,
            base_url,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            store,
        }
    }

    /// Build a client from the `api` settings section
    pub fn from_settings(settings: &ApiSettings, store: Arc<dyn TokenStore>) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder();
        if let Some(seconds) = settings.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let http_client = builder.build()?;

        Ok(Self::new(settings.base_url.clone(), store, http_client)
            .with_login_path(settings.login_path.clone())
            .with_refresh_path(settings.refresh_path.clone()))
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// POST {login_path}
    ///
    /// Validates the form locally, then exchanges the credentials for a
    /// session and persists it.
    ///
    /// # Errors
    /// - `Validation`: malformed email or empty password (nothing is sent)
    /// - `Auth(InvalidCredentials)`: the service answered 4xx or `success: false`
    /// - `Http`: transport failure, 5xx, or an unreadable success body
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let context = ErrorContext::new("user_login");

        let email = is_valid_email(email)?;
        is_valid_password(password)?;

        let url = resolve_url(&self.base_url, &self.login_path);
        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest {
                email: &email,
                password,
            })
            .send()
            .await
            .map_err(|e| {
                let err = AppError::from(e);
                context.log_error(&err);
                err
            })?;

        let status = response.status();
        if status.is_server_error() {
            let err = AppError::http_status(status, "Auth service error");
            context.log_error(&err);
            return Err(err);
        }

        let body = match response.json::<LoginResponse>().await {
            Ok(body) => body,
            Err(e) if status.is_success() => {
                return Err(AppError::http_status(
                    status,
                    format!("Malformed login response: {}", e),
                ));
            }
            Err(_) => LoginResponse::default(),
        };

        if !status.is_success() || !body.success {
            let message = body
                .message
                .unwrap_or_else(|| "Invalid email or password".to_string());
            tracing::warn!(
                request_id = %context.request_id,
                status = status.as_u16(),
                "Login rejected"
            );
            return Err(AuthError::InvalidCredentials(message).into());
        }

        let data = body
            .data
            .ok_or_else(|| AppError::http_status(status, "Login response is missing data"))?;

        let session = Session::new(
            TokenPair {
                access_token: data.access_token,
                refresh_token: data.refresh_token,
            },
            data.user,
        );
        self.store.save_session(&session)?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %session.user.id,
            role = %session.user.role,
            "User logged in successfully"
        );

        Ok(session)
    }

    /// Drop the local session. The auth service is not contacted.
    pub fn logout(&self) -> Result<(), AppError> {
        self.store.clear_session()?;
        tracing::info!("Session cleared on logout");
        Ok(())
    }

    /// POST {refresh_path}
    ///
    /// Exchanges the stored refresh token for a new pair. Queues on the
    /// store's refresh gate, like the refresh inside [`AuthClient::fetch`].
    ///
    /// # Errors
    /// - `Auth(NotAuthenticated)`: no refresh token stored
    /// - `Auth(SessionExpired)`: refresh failed; the session was cleared
    pub async fn refresh(&self) -> Result<TokenPair, AppError> {
        let context = ErrorContext::new("token_refresh");
        let _guard = self.store.refresh_gate().lock().await;

        if self.store.refresh_token()?.is_none() {
            return Err(AuthError::NotAuthenticated.into());
        }
        self.refresh_locked(&context).await
    }

    // ------------------------------------------------------------------
    // Session queries
    // ------------------------------------------------------------------

    pub fn is_authenticated(&self) -> Result<bool, AppError> {
        Ok(self.store.access_token()?.is_some())
    }

    pub fn current_user(&self) -> Result<Option<UserInfo>, AppError> {
        Ok(self.store.user_info()?)
    }

    pub fn user_role(&self) -> Result<Option<String>, AppError> {
        Ok(self.store.user_role()?)
    }

    pub fn is_admin(&self) -> Result<bool, AppError> {
        Ok(self.user_role()?.as_deref().map(is_admin_role).unwrap_or(false))
    }

    /// Expiry read from the access token's `exp` claim, if it is a JWT
    pub fn access_token_expires_at(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>, AppError> {
        Ok(self
            .store
            .access_token()?
            .and_then(|token| peek_claims(&token))
            .and_then(|claims| claims.expires_at()))
    }

    // ------------------------------------------------------------------
    // Authenticated requests
    // ------------------------------------------------------------------

    /// Send `request` with the stored bearer token.
    ///
    /// On a 401 the token pair is refreshed once and the request is sent a
    /// second and last time. Any other status, and the retry's status
    /// whatever it is, is returned to the caller untouched.
    ///
    /// # Errors
    /// - `Auth(NotAuthenticated)`: no access token; nothing was sent
    /// - `Auth(SessionExpired)`: 401 and the refresh failed; session cleared
    /// - `Http`: the request itself could not be sent
    pub async fn fetch(&self, request: &AuthRequest) -> Result<Response, AppError> {
        let context = ErrorContext::new("authenticated_fetch");

        let access_token = match self.store.access_token()? {
            Some(token) => token,
            None => {
                tracing::warn!(
                    request_id = %context.request_id,
                    url = %request.url(),
                    "No access token stored, request not sent"
                );
                return Err(AuthError::NotAuthenticated.into());
            }
        };

        let response = self.send(request, &access_token, 1, &context).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!(
            request_id = %context.request_id,
            url = %request.url(),
            "Access token rejected, refreshing"
        );

        let fresh_token = self
            .refresh_after_unauthorized(&access_token, &context)
            .await?;
        let retried = self.send(request, &fresh_token, 2, &context).await?;

        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                request_id = %context.request_id,
                url = %request.url(),
                "Request still unauthorized after refresh"
            );
        }

        Ok(retried)
    }

    pub async fn get(&self, url: &str) -> Result<Response, AppError> {
        self.fetch(&AuthRequest::get(url)).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<Response, AppError> {
        self.fetch(&AuthRequest::new(method, url).json(body)?).await
    }

    /// [`AuthClient::fetch`], then decode a 2xx JSON body.
    /// A non-2xx final status becomes `Http` carrying that status.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &AuthRequest) -> Result<T, AppError> {
        let response = self.fetch(request).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::http_status(status, message));
        }
        Ok(response.json::<T>().await?)
    }

    async fn send(
        &self,
        request: &AuthRequest,
        access_token: &str,
        attempt: u8,
        context: &ErrorContext,
    ) -> Result<Response, AppError> {
        let url = resolve_url(&self.base_url, request.url());

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|_| AppError::Internal("Stored access token is not a valid header value".to_string()))?;
        bearer.set_sensitive(true);

        let mut headers = request.headers().clone();
        headers.insert(AUTHORIZATION, bearer);

        let mut builder = self
            .http_client
            .request(request.method().clone(), &url)
            .headers(headers);
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(|e| {
            let err = AppError::from(e);
            context.log_error(&err);
            err
        })?;

        tracing::info!(
            request_id = %context.request_id,
            method = %request.method(),
            url = %url,
            attempt = attempt,
            status = response.status().as_u16(),
            "Request completed"
        );

        Ok(response)
    }

    /// Obtain a usable access token after `stale` was answered with 401.
    ///
    /// Callers queue on the store's refresh gate, so every client sharing
    /// the store takes part. Whoever gets it first refreshes;
    /// the rest find a different token in the store and reuse it, or find
    /// the store empty because that refresh failed.
    async fn refresh_after_unauthorized(
        &self,
        stale: &str,
        context: &ErrorContext,
    ) -> Result<String, AppError> {
        let _guard = self.store.refresh_gate().lock().await;

        match self.store.access_token()? {
            Some(current) if current != stale => {
                tracing::debug!(
                    request_id = %context.request_id,
                    "Token already refreshed by a concurrent request"
                );
                return Ok(current);
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    request_id = %context.request_id,
                    "Session was cleared by a concurrent request"
                );
                return Err(AuthError::SessionExpired.into());
            }
        }

        self.refresh_locked(context)
            .await
            .map(|tokens| tokens.access_token)
    }

    /// Refresh with the gate held. On any failure the session is cleared.
    async fn refresh_locked(&self, context: &ErrorContext) -> Result<TokenPair, AppError> {
        let outcome = match self.store.refresh_token()? {
            Some(refresh_token) => self.request_refresh(&refresh_token).await,
            None => Err(RefreshFailure::MissingToken),
        };

        match outcome {
            Ok(tokens) => {
                self.store.save_tokens(&tokens)?;
                tracing::info!(
                    request_id = %context.request_id,
                    "Token refreshed successfully"
                );
                Ok(tokens)
            }
            Err(failure) => {
                tracing::warn!(
                    request_id = %context.request_id,
                    reason = %failure,
                    "Token refresh failed, clearing session"
                );
                self.store.clear_session()?;
                Err(AuthError::SessionExpired.into())
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenPair, RefreshFailure> {
        let url = resolve_url(&self.base_url, &self.refresh_path);

        let response = self
            .http_client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshFailure::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected(status));
        }

        let tokens = response
            .json::<TokenPair>()
            .await
            .map_err(|e| RefreshFailure::Malformed(e.to_string()))?;

        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(RefreshFailure::Malformed("empty token".to_string()));
        }

        Ok(tokens)
    }
}
