//! Error types for the Zabbix JSON-RPC client.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// The two classes of failure a caller has to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// The request did not succeed: network, timeout, HTTP status, or an
    /// error reported by the API (including a rejected or expired session).
    Request,
    /// The exchange broke the API contract: the request could not be
    /// encoded or the response could not be understood.
    Unexpected,
}

/// Errors raised by [`crate::JsonRpcClient`].
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("unexpected status code = {0}")]
    Status(u16),

    #[error("zabbix api error {code}: {message} {data}")]
    Api {
        code: i64,
        message: String,
        data: String,
    },

    #[error("invalid zabbix url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    /// Classify this error for the caller's recovery decision.
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            RpcError::Transport { .. }
            | RpcError::Timeout { .. }
            | RpcError::Status(_)
            | RpcError::Api { .. } => RpcErrorKind::Request,
            RpcError::InvalidUrl { .. }
            | RpcError::Encode(_)
            | RpcError::Body(_)
            | RpcError::Decode(_) => RpcErrorKind::Unexpected,
        }
    }
}
