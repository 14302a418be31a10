//! Error types for the dispatch layer
//!
//! All errors implement `IntoResponse` for Axum handlers. Retryability is a
//! property of the typed error kind, never of message text.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Closed error taxonomy shared by every component
///
/// Only `AuthenticationFailure` and `AuthorizationFailure` ever reach a caller
/// of the orchestrator as errors. Every other kind is logged and converted into
/// a degraded response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationFailure,
    AuthorizationFailure,
    RateLimited,
    BackendUnavailable,
    RequestTimeout,
    BudgetExceeded,
    ComplianceRoutingBlocked,
    InvalidRequest,
    Configuration,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "authentication_failure",
            Self::AuthorizationFailure => "authorization_failure",
            Self::RateLimited => "rate_limited",
            Self::BackendUnavailable => "backend_unavailable",
            Self::RequestTimeout => "request_timeout",
            Self::BudgetExceeded => "budget_exceeded",
            Self::ComplianceRoutingBlocked => "compliance_routing_blocked",
            Self::InvalidRequest => "invalid_request",
            Self::Configuration => "configuration",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a backend client should retry a failure of this kind
    ///
    /// Rate limits, timeouts and transient unavailability (502/503, refused
    /// connections) are retried. Credential failures, compliance blocks and
    /// malformed input are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::RequestTimeout | Self::BackendUnavailable
        )
    }

    /// Access-control failures propagate to the caller instead of degrading
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure | Self::AuthorizationFailure
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a backend client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{backend} rejected the credentials (HTTP {status})")]
    Authentication { backend: String, status: u16 },

    #[error("{backend} rate limited the request")]
    RateLimited { backend: String },

    #[error("{backend} is unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Request to {backend} timed out after {timeout_seconds} seconds")]
    Timeout {
        backend: String,
        timeout_seconds: u64,
    },

    #[error("{backend} is not configured (missing API key)")]
    NotConfigured { backend: String },

    #[error("{backend} returned an unusable response: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("{backend} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        backend: String,
        status: u16,
        body: String,
    },
}

impl BackendError {
    /// Map a non-success HTTP status to a typed failure
    pub fn from_status(backend: &str, status: u16, body: String) -> Self {
        let backend = backend.to_string();
        match status {
            401 | 403 => Self::Authentication { backend, status },
            429 => Self::RateLimited { backend },
            408 | 504 => Self::Timeout {
                backend,
                timeout_seconds: 0,
            },
            502 | 503 => Self::Unavailable {
                backend,
                reason: format!("HTTP {}: {}", status, body),
            },
            s if s >= 500 => Self::Unavailable {
                backend,
                reason: format!("HTTP {}: {}", status, body),
            },
            _ => Self::UnexpectedStatus {
                backend,
                status,
                body,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } | Self::NotConfigured { .. } => {
                ErrorKind::AuthenticationFailure
            }
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Unavailable { .. } => ErrorKind::BackendUnavailable,
            Self::Timeout { .. } => ErrorKind::RequestTimeout,
            Self::InvalidResponse { .. } | Self::UnexpectedStatus { .. } => ErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Name of the backend that produced this failure
    pub fn backend(&self) -> &str {
        match self {
            Self::Authentication { backend, .. }
            | Self::RateLimited { backend }
            | Self::Unavailable { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::NotConfigured { backend }
            | Self::InvalidResponse { backend, .. }
            | Self::UnexpectedStatus { backend, .. } => backend,
        }
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Role '{role}' is not permitted to use the '{task}' agent")]
    Forbidden { role: String, task: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(
        "{level} request requires a compliance-authorized backend but none is configured"
    )]
    ComplianceRoutingBlocked { level: String },

    #[error("No backends configured. Set at least one provider API key.")]
    NoBackendsConfigured,

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Dispatch deadline of {timeout_seconds} seconds exceeded")]
    DeadlineExceeded { timeout_seconds: u64 },

    #[error("Request was cancelled by the caller")]
    Cancelled,

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classify this error into the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::NoBackendsConfigured => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::InvalidRequest,
            Self::Unauthenticated(_) => ErrorKind::AuthenticationFailure,
            Self::Forbidden { .. } => ErrorKind::AuthorizationFailure,
            Self::Backend(e) => e.kind(),
            Self::ComplianceRoutingBlocked { .. } => ErrorKind::ComplianceRoutingBlocked,
            Self::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            Self::DeadlineExceeded { .. } => ErrorKind::RequestTimeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Store(_) | Self::Internal(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::AuthenticationFailure => StatusCode::UNAUTHORIZED,
            ErrorKind::AuthorizationFailure => StatusCode::FORBIDDEN,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ComplianceRoutingBlocked => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::BackendUnavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::BudgetExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::Configuration | ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // A backend's credential failure is a server-side problem, not the caller's
        let status = match &self {
            Self::Backend(_) if status == StatusCode::UNAUTHORIZED => StatusCode::BAD_GATEWAY,
            Self::Backend(_) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                StatusCode::BAD_GATEWAY
            }
            _ => status,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
