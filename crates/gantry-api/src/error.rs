use thiserror::Error;

/// Top-level error type for the `gantry-api` crate.
///
/// Covers the failure modes of the transport and the wire protocol.
/// `gantry-core` maps these into caller-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The daemon refused the bearer credential during the handshake.
    #[error("Daemon rejected credential: {reason}")]
    Unauthorized { reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Protocol ────────────────────────────────────────────────────
    /// An inbound frame could not be mapped to a reply or a push channel.
    #[error("Malformed frame on '{event}': {reason}")]
    MalformedFrame { event: String, reason: String },
}

impl Error {
    /// Returns `true` if the daemon refused the credential.
    ///
    /// A refreshed token may fix this on the next attempt, so callers
    /// keep retrying rather than giving up.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
