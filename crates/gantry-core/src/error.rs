// ── Core error types ──
//
// Caller-facing errors from gantry-core. Consumers never see WebSocket
// handshake details or raw frame parse failures directly. The
// `From<gantry_api::Error>` impl translates transport-layer errors into
// domain-appropriate variants.

use std::time::Duration;

use gantry_api::Operation;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Channel errors ───────────────────────────────────────────────
    #[error("Not connected to the daemon")]
    NotConnected,

    #[error("{operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },

    #[error("Daemon rejected {operation}: {message}")]
    Remote {
        operation: Operation,
        message: String,
    },

    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    #[error("Unexpected reply to {operation}: {reason}")]
    UnexpectedReply { operation: Operation, reason: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Session has been closed")]
    SessionClosed,

    #[error("Cannot connect to daemon: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` if retrying once connectivity is restored may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Timeout { .. } | Self::ConnectionFailed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<gantry_api::Error> for CoreError {
    fn from(err: gantry_api::Error) -> Self {
        match err {
            gantry_api::Error::Unauthorized { reason } => {
                CoreError::AuthenticationFailed { message: reason }
            }
            gantry_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            gantry_api::Error::MalformedFrame { event, reason } => CoreError::MalformedMessage {
                reason: format!("{event}: {reason}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation_and_budget() {
        let err = CoreError::Timeout {
            operation: Operation::ListDirectory,
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "files:list timed out after 1500ms");
        assert!(err.is_retryable());
    }

    #[test]
    fn transport_errors_translate() {
        let err: CoreError = gantry_api::Error::Unauthorized {
            reason: "HTTP 403".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));

        let err: CoreError = gantry_api::Error::MalformedFrame {
            event: "server:bogus".into(),
            reason: "unknown channel".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Malformed message: server:bogus: unknown channel");
        assert!(!err.is_retryable());
    }
}
