// Shared fixtures: an in-memory transport and the daemon side of each link.
#![allow(clippy::unwrap_used, dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use gantry_api::Frame;
use gantry_api::transport::{FrameReceiver, FrameSender};
use gantry_core::{Link, Session, SessionConfig, Transport};

pub const TOKEN: &str = "panel-token";

// ── Daemon side ─────────────────────────────────────────────────────

/// The daemon's half of one accepted connection.
pub struct DaemonEnd {
    pub token: String,
    to_client: FrameSender,
    from_client: FrameReceiver,
}

impl DaemonEnd {
    /// Next frame the client sent.
    pub async fn recv(&mut self) -> Frame {
        self.from_client.recv().await.unwrap()
    }

    /// Next frame, or `None` once the client has closed the link.
    pub async fn recv_or_closed(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Frames already sent by the client, without waiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub fn send(&self, event: &str, data: Value) {
        self.to_client.send(Frame::new(event, data)).unwrap();
    }

    /// Answer `request` on its success channel.
    pub fn reply(&self, request: &Frame, result: Value) {
        self.reply_on(&format!("{}:result", request.event), request, result);
    }

    /// Answer `request` on an arbitrary channel.
    pub fn reply_on(&self, channel: &str, request: &Frame, result: Value) {
        let mut data = result;
        data["correlationId"] = json!(request.correlation_id().unwrap().as_str());
        self.send(channel, data);
    }

    /// Report that `request` failed.
    pub fn fail(&self, request: &Frame, message: &str) {
        self.send(
            "operation:error",
            json!({
                "correlationId": request.correlation_id().unwrap().as_str(),
                "error": message,
            }),
        );
    }

    /// Push an event for `entity`.
    pub fn push(&self, event: &str, entity: &str, mut data: Value) {
        data["entityId"] = json!(entity);
        self.send(event, data);
    }
}

// ── Transport ───────────────────────────────────────────────────────

/// In-memory transport. Every successful `open` hands a [`DaemonEnd`] to
/// the test through the connections channel.
pub struct MockTransport {
    connections: mpsc::UnboundedSender<DaemonEnd>,
    rejections: AtomicU32,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DaemonEnd>) {
        let (connections, accepted) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connections,
            rejections: AtomicU32::new(0),
        });
        (transport, accepted)
    }

    /// Refuse the next `n` opens as unauthorized.
    pub fn reject_next(&self, n: u32) {
        self.rejections.store(n, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn open(&self, credential: &SecretString) -> BoxFuture<'static, Result<Link, gantry_api::Error>> {
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return future::ready(Err(gantry_api::Error::Unauthorized {
                reason: "HTTP 401".into(),
            }))
            .boxed();
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let _ = self.connections.send(DaemonEnd {
            token: credential.expose_secret().to_owned(),
            to_client,
            from_client,
        });
        future::ready(Ok(Link {
            outbound,
            inbound,
            driver: None,
        }))
        .boxed()
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub fn config() -> SessionConfig {
    SessionConfig::new(
        Url::parse("ws://daemon.test/api/ws").unwrap(),
        SecretString::from(TOKEN.to_owned()),
    )
}

pub struct Harness {
    pub session: Session,
    pub transport: Arc<MockTransport>,
    pub connections: mpsc::UnboundedReceiver<DaemonEnd>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let (transport, connections) = MockTransport::new();
        let session = Session::new(config, transport.clone());
        Self {
            session,
            transport,
            connections,
        }
    }

    /// Start the session and wait for the daemon to accept.
    pub async fn connect(&mut self) -> DaemonEnd {
        self.session.connect().unwrap();
        self.next_connection().await
    }

    /// Wait for the next accepted connection and for `Connected`.
    pub async fn next_connection(&mut self) -> DaemonEnd {
        let daemon = self.connections.recv().await.unwrap();
        self.session
            .wait_until_connected(Duration::from_secs(60))
            .await
            .unwrap();
        daemon
    }
}
