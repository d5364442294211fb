// Transport seam shared by every session implementation.
//
// A transport turns a credential into a live `Link`: two unbounded frame
// channels. The session never sees sockets, so tests can drive it with an
// in-memory transport and the WebSocket adapter stays a thin pump.

use std::time::Duration;

use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::protocol::Frame;

/// Outbound half of a link.
pub type FrameSender = mpsc::UnboundedSender<Frame>;

/// Inbound half of a link.
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// One established connection to a daemon.
///
/// The inbound receiver yielding `None` means the connection is gone.
/// Dropping `outbound` asks the transport to close the connection; frames
/// already queued are still delivered first.
#[derive(Debug)]
pub struct Link {
    pub outbound: FrameSender,
    pub inbound: FrameReceiver,
    /// Task moving frames for this link, if the transport runs one. It
    /// finishes once the connection is fully closed.
    pub driver: Option<JoinHandle<()>>,
}

/// Opens authenticated links to a daemon.
pub trait Transport: Send + Sync + 'static {
    /// Open a fresh connection presenting `credential`.
    ///
    /// Called once per (re)connect attempt with the same credential.
    fn open(&self, credential: &SecretString) -> BoxFuture<'static, Result<Link, Error>>;
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
///
/// There is no retry ceiling: a session keeps retrying until it is
/// explicitly disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectConfig {
    /// Exponential backoff with jitter.
    ///
    /// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
    ///
    /// The jitter is a pure function of `seed` and `attempt`. Clients
    /// passing distinct seeds retry on distinct schedules.
    pub fn delay_for(&self, attempt: u32, seed: u64) -> Duration {
        let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let unit = f64::from(jitter_bits(seed, attempt)) / f64::from(u32::MAX);
        let jitter_factor = 1.0 + 0.25 * (2.0 * unit - 1.0);
        let with_jitter = (capped * jitter_factor).max(0.0);

        Duration::from_secs_f64(with_jitter)
    }
}

/// splitmix64 finalizer over `seed` and `attempt`, high 32 bits.
fn jitter_bits(seed: u64, attempt: u32) -> u32 {
    let mut z = seed ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    u32::try_from(z >> 32).unwrap_or(u32::MAX)
}

// ── Tests ────────────────────────────────────────────────────────────
