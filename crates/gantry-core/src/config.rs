// ── Runtime session configuration ──
//
// These types describe *how* to reach a host daemon. They carry the
// credential and connection tuning, but never touch disk.
// The CLI (or any other composer) builds a `SessionConfig` and hands it in.

use std::time::Duration;

use gantry_api::{Operation, ReconnectConfig};
use secrecy::SecretString;
use url::Url;

/// Per-operation reply budgets.
///
/// Directory listings and metadata mutations are cheap; binary uploads can
/// move megabytes through the same socket, so one global value does not fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Directory listing.
    pub listing: Duration,
    /// Create directory, rename, delete.
    pub mutation: Duration,
    /// Read file contents.
    pub read: Duration,
    /// Write text file contents.
    pub write: Duration,
    /// Write binary file contents.
    pub binary_write: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            listing: Duration::from_secs(15),
            mutation: Duration::from_secs(15),
            read: Duration::from_secs(30),
            write: Duration::from_secs(60),
            binary_write: Duration::from_secs(300),
        }
    }
}

impl OperationTimeouts {
    /// Budget for a request/response operation.
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::ListDirectory => self.listing,
            Operation::ReadFile => self.read,
            Operation::WriteFile => self.write,
            Operation::WriteBinaryFile => self.binary_write,
            Operation::CreateDirectory
            | Operation::Rename
            | Operation::Delete
            | Operation::ConsoleCommand => self.mutation,
        }
    }
}

/// Configuration for a session with a single host daemon.
///
/// Built by the CLI or another composer, passed to `Session` -- core never
/// reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Daemon WebSocket endpoint (e.g., `wss://node1.example.com:8080/api/ws`).
    pub daemon_url: Url,
    /// Bearer token presented on every (re)connect.
    pub credential: SecretString,
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Reply budgets per operation.
    pub timeouts: OperationTimeouts,
}

impl SessionConfig {
    pub fn new(daemon_url: Url, credential: SecretString) -> Self {
        Self {
            daemon_url,
            credential,
            reconnect: ReconnectConfig::default(),
            timeouts: OperationTimeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_writes_get_the_longest_budget() {
        let t = OperationTimeouts::default();
        assert_eq!(t.for_operation(Operation::ListDirectory), Duration::from_secs(15));
        assert_eq!(t.for_operation(Operation::Rename), Duration::from_secs(15));
        assert_eq!(t.for_operation(Operation::ReadFile), Duration::from_secs(30));
        assert!(t.for_operation(Operation::WriteBinaryFile) > t.for_operation(Operation::WriteFile));
    }
}
