//! WebSocket transport for the daemon channel.
//!
//! Each [`open`](Transport::open) performs a fresh WebSocket handshake that
//! presents the bearer credential, then spawns a pump task bridging the
//! socket to the [`Link`] channels. Frames travel as JSON text messages.
//! Reconnection is not handled here: the session decides when to call
//! `open` again.
//!
//! # Example
//!
//! ```rust,ignore
//! use gantry_api::{Transport, WebSocketTransport};
//! use secrecy::SecretString;
//! use url::Url;
//!
//! let transport = WebSocketTransport::new(Url::parse("wss://node1.example.com:8080/ws")?);
//! let mut link = transport.open(&SecretString::from("token".to_owned())).await?;
//!
//! while let Some(frame) = link.inbound.recv().await {
//!     println!("{}: {}", frame.event, frame.data);
//! }
//! ```

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use url::Url;

use crate::error::Error;
use crate::protocol::Frame;
use crate::transport::{FrameReceiver, FrameSender, Link, Transport};

/// Opens WebSocket links to a single daemon endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, credential: &SecretString) -> BoxFuture<'static, Result<Link, Error>> {
        let url = self.url.clone();
        let credential = credential.clone();
        async move { connect(&url, &credential).await }.boxed()
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Perform the handshake and spawn the pump for one connection.
///
/// The credential is injected as an `Authorization: Bearer` header on the
/// upgrade request. A 401/403 answer becomes [`Error::Unauthorized`].
async fn connect(url: &Url, credential: &SecretString) -> Result<Link, Error> {
    tracing::info!(url = %url, "Connecting to daemon");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri).with_header(
        "Authorization",
        format!("Bearer {}", credential.expose_secret()),
    );

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(map_handshake_error)?;

    tracing::info!("WebSocket connected");

    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound) = mpsc::unbounded_channel();

    let driver = tokio::spawn(pump(ws_stream, outbound_rx, inbound_tx));

    Ok(Link {
        outbound,
        inbound,
        driver: Some(driver),
    })
}

fn map_handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status == tungstenite::http::StatusCode::UNAUTHORIZED
                || status == tungstenite::http::StatusCode::FORBIDDEN
            {
                Error::Unauthorized {
                    reason: format!("HTTP {}", status.as_u16()),
                }
            } else {
                Error::WebSocketConnect(format!("HTTP {status} during handshake"))
            }
        }
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Pump ─────────────────────────────────────────────────────────────

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Move frames between the socket and the link channels until either side
/// goes away. Returning drops `inbound_tx`, which the session observes as
/// connection loss.
async fn pump(ws_stream: WsStream, mut outbound_rx: FrameReceiver, inbound_tx: FrameSender) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(frame) = outgoing else {
                    // Session dropped the link: close politely.
                    tracing::debug!("Outbound link dropped, closing WebSocket");
                    let _ = write.close().await;
                    break;
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, event = %frame.event, "Failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = write.send(tungstenite::Message::text(text)).await {
                    tracing::warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let Some(frame) = decode_frame(&text) else { continue };
                        if inbound_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break;
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }

    tracing::debug!("WebSocket pump exiting");
}

/// Decode a text message into a [`Frame`], logging and skipping garbage.
fn decode_frame(text: &str) -> Option<Frame> {
    match serde_json::from_str::<Frame>(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable WebSocket message");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
