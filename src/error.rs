/// Error Handling Module
///
/// One error system for the whole client:
/// 1. Domain-specific error types (validation, storage, auth, config)
/// 2. A unified `AppError` returned by every public operation
/// 3. Conversions from the libraries we call into
/// 4. Error context for structured logging

use reqwest::StatusCode;
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for caller-supplied input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Token store errors
#[derive(Debug)]
pub enum StorageError {
    Io(String),
    Serialization(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "Token store I/O error: {}", msg),
            StorageError::Serialization(msg) => {
                write!(f, "Token store serialization error: {}", msg)
            }
        }
    }
}

impl StdError for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Authentication outcomes the caller has to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No access token in the store. Nothing was sent.
    NotAuthenticated,
    /// A 401 could not be recovered by a refresh. The session was cleared.
    SessionExpired,
    /// Login was rejected by the auth service.
    InvalidCredentials(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NotAuthenticated => write!(f, "Not authenticated"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
            AuthError::InvalidCredentials(msg) => write!(f, "Invalid credentials: {}", msg),
        }
    }
}

impl StdError for AuthError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type returned by the client
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Storage(StorageError),
    Auth(AuthError),
    Config(ConfigError),
    /// Transport failure, or a non-success status where a body was expected
    Http {
        status: Option<StatusCode>,
        message: String,
    },
    Internal(String),
}

impl AppError {
    pub fn http_status(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Http {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, AppError::Auth(AuthError::NotAuthenticated))
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, AppError::Auth(AuthError::SessionExpired))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Http {
                status: Some(status),
                message,
            } => write!(f, "HTTP {}: {}", status.as_u16(), message),
            AppError::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {}", message),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Http {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(ConfigError::InvalidValue(err.to_string()))
    }
}

// ============================================================================
// 3. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-operation context attached to log events
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) => {
                tracing::warn!(error = %error, context = ?context, "Validation error");
            }
            AppError::Auth(_) => {
                tracing::warn!(error = %error, context = ?context, "Authentication error");
            }
            AppError::Http { .. } => {
                tracing::error!(error = %error, context = ?context, "HTTP error");
            }
            AppError::Storage(_) => {
                tracing::error!(error = %error, context = ?context, "Token store error");
            }
            AppError::Config(_) => {
                tracing::error!(error = %error, context = ?context, "Configuration error");
            }
            AppError::Internal(_) => {
                tracing::error!(error = %error, context = ?context, "Internal error");
            }
        }
    }
}
