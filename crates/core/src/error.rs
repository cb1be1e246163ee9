//! Error types for the MailMate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Caller mistakes, upstream provider failures and the relay-level outcome
//! are separate types so the HTTP boundary can translate each one without
//! ever seeing provider internals.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// --- Caller errors ---

/// Malformed or incomplete caller input. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("history[{index}] has unrecognized role '{role}' (expected 'user' or 'assistant')")]
    UnknownRole { index: usize, role: String },

    #[error("history[{index}] is missing its content")]
    MissingContent { index: usize },

    #[error("history has {len} entries, the maximum is {max}")]
    HistoryTooLong { len: usize, max: usize },

    #[error("unknown task mode '{0}'")]
    UnknownMode(String),

    #[error("mode '{mode}' requires parameter '{field}'")]
    MissingParameter {
        mode: &'static str,
        field: &'static str,
    },

    #[error("parameter '{field}' is invalid: {reason}")]
    InvalidParameter { field: String, reason: String },
}

impl ValidationError {
    /// The request field this error points at, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingParameter { field, .. } => Some(*field),
            Self::InvalidParameter { field, .. } => Some(field.as_str()),
            Self::UnknownRole { .. } | Self::MissingContent { .. } | Self::HistoryTooLong { .. } => {
                Some("history")
            }
            Self::UnknownMode(_) => Some("mode"),
        }
    }
}

// --- Provider errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Content rejected by provider policy: {0}")]
    ContentRejected(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Exchange cancelled by caller")]
    Cancelled,
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, transport failures, interrupted streams, rate limiting and
    /// 408/429/5xx responses are transient. Everything else (auth, unknown
    /// model, malformed request, content policy, cancellation) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::StreamInterrupted(_) => true,
            Self::ApiError { status_code, .. } => {
                matches!(status_code, 408 | 429 | 500..=599)
            }
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::ContentRejected(_)
            | Self::NotConfigured(_)
            | Self::Cancelled => false,
        }
    }

    /// Provider-requested delay before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }
}

// --- Relay outcome errors ---

/// Stable, caller-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transient,
    FatalProvider,
    RetriesExhausted,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::FatalProvider => "fatal_provider",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The error returned by the relay for one request.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// A transient failure that could not be retried (the stream had already
    /// delivered output).
    #[error("transient provider failure: {0}")]
    Transient(#[source] ProviderError),

    #[error("provider rejected the request: {0}")]
    Fatal(#[source] ProviderError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl RelayError {
    /// Sort a provider failure into the relay taxonomy without retrying.
    pub fn from_provider(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => Self::Cancelled,
            e if e.is_transient() => Self::Transient(e),
            e => Self::Fatal(e),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Fatal(_) => ErrorKind::FatalProvider,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// HTTP status for the non-streaming response.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Fatal(_) => 502,
            Self::Transient(_) | Self::RetriesExhausted { .. } => 503,
            Self::Cancelled => 499,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Validation messages are the caller's own mistake and are returned
    /// verbatim. Provider failures collapse to a generic sentence per kind.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Transient(_) => {
                "The model provider failed while responding; the output is incomplete".into()
            }
            Self::Fatal(_) => "The model provider rejected the request".into(),
            Self::RetriesExhausted { .. } => {
                "The model provider is temporarily unavailable, please try again later".into()
            }
            Self::Cancelled => "The request was cancelled".into(),
        }
    }
}
