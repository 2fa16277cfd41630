//! Transport error types

use reqwest::StatusCode;
use thiserror::Error;

/// Transport failure with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ServerError, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        match status.as_u16() {
            401 | 403 => Self::auth(message),
            404 => Self::not_found(message),
            500..=599 => Self::server_error(message),
            _ => Self::unknown(message),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, "");
        }
        if err.is_decode() {
            return Self::decode(err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return Self::network(err.to_string());
        }
        Self::unknown(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, reset, timed out, or cut mid-body
    Network,
    /// Rejected credentials (401, 403)
    Auth,
    /// Missing resource (404, or the history endpoint's error body)
    NotFound,
    /// Server error (5xx)
    ServerError,
    /// Malformed frame or payload
    Decode,
    Unknown,
}
