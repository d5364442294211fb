// ── Correlation registry ──
//
// Turns tagged request/reply traffic on the shared channel into plain
// `async fn` calls. Each request owns a oneshot sender parked in the
// registry under its correlation id; whichever of reply, error, or timeout
// comes first removes it. Removal is the Pending -> Settled transition, so
// anything arriving later for the same id finds nothing and is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use gantry_api::transport::FrameSender;
use gantry_api::{CorrelationId, Frame, Operation};

use crate::error::CoreError;

type Reply = Result<Value, CoreError>;

/// What happened to an inbound reply or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// A waiting caller received the outcome.
    Settled,
    /// No request is waiting under that id: already settled, timed out,
    /// or never issued here.
    Ignored,
}

struct PendingRequest {
    operation: Operation,
    created_at: Instant,
    reply: oneshot::Sender<Reply>,
}

impl PendingRequest {
    /// Deliver the outcome. Consumes the request, so it can only happen once.
    fn settle(self, id: &CorrelationId, outcome: Reply) {
        let elapsed_ms = u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            correlation_id = %id,
            operation = %self.operation,
            elapsed_ms,
            ok = outcome.is_ok(),
            "request settled"
        );
        if self.reply.send(outcome).is_err() {
            debug!(correlation_id = %id, "caller stopped waiting before settlement");
        }
    }
}

/// Outstanding request/response pairs keyed by correlation id.
pub struct CorrelationRegistry {
    sequence: AtomicU64,
    pending: DashMap<CorrelationId, PendingRequest>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            pending: DashMap::new(),
        }
    }

    /// Number of requests still waiting for an outcome.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Issue time in hex plus a process-wide sequence number.
    fn next_id(&self) -> CorrelationId {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let issued_ms = chrono::Utc::now().timestamp_millis();
        CorrelationId::new(format!("{issued_ms:x}-{seq}"))
    }

    /// Send a tagged request and wait for its outcome.
    ///
    /// Resolves with the reply payload, [`CoreError::Remote`] when the
    /// daemon reports failure, or [`CoreError::Timeout`] when `timeout`
    /// elapses first. Timeouts are local only; nothing is sent to the
    /// daemon and a late reply is dropped.
    pub async fn issue(
        &self,
        outbound: &FrameSender,
        operation: Operation,
        payload: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        let id = self.next_id();
        let (reply, outcome) = oneshot::channel();

        self.pending.insert(
            id.clone(),
            PendingRequest {
                operation,
                created_at: Instant::now(),
                reply,
            },
        );
        let _registration = Registration {
            pending: &self.pending,
            id: &id,
        };

        outbound
            .send(Frame::request(operation, &id, payload))
            .map_err(|_| CoreError::NotConnected)?;
        debug!(correlation_id = %id, %operation, timeout_ms = timeout.as_millis(), "request issued");

        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::Internal(format!(
                "reply slot for {id} dropped without settlement"
            ))),
            Err(_) => {
                debug!(correlation_id = %id, %operation, "request timed out");
                Err(CoreError::Timeout { operation, timeout })
            }
        }
    }

    /// Settle a request with a success payload.
    ///
    /// The reply must arrive on the operation's own result channel. A reply
    /// for a live id on some other channel is malformed and leaves the
    /// request waiting.
    pub fn resolve(
        &self,
        id: &CorrelationId,
        channel: &str,
        payload: Value,
    ) -> Result<Settlement, CoreError> {
        if let Some((id, pending)) = self
            .pending
            .remove_if(id, |_, p| p.operation.result_channel() == channel)
        {
            pending.settle(&id, Ok(payload));
            return Ok(Settlement::Settled);
        }

        if let Some(pending) = self.pending.get(id) {
            return Err(CoreError::MalformedMessage {
                reason: format!(
                    "reply for {id} arrived on '{channel}', expected '{}'",
                    pending.operation.result_channel()
                ),
            });
        }

        debug!(correlation_id = %id, channel, "dropping reply with no waiting request");
        Ok(Settlement::Ignored)
    }

    /// Settle a request with the daemon's error description.
    pub fn reject(&self, id: &CorrelationId, message: String) -> Settlement {
        match self.pending.remove(id) {
            Some((id, pending)) => {
                let operation = pending.operation;
                pending.settle(&id, Err(CoreError::Remote { operation, message }));
                Settlement::Settled
            }
            None => {
                debug!(correlation_id = %id, "dropping error with no waiting request");
                Settlement::Ignored
            }
        }
    }
}

/// Removes the registry entry when the caller's future finishes or is
/// dropped. After a normal settlement the entry is already gone.
struct Registration<'a> {
    pending: &'a DashMap<CorrelationId, PendingRequest>,
    id: &'a CorrelationId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
