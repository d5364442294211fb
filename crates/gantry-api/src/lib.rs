// gantry-api: Wire protocol and transports for the host daemon channel

pub mod error;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use protocol::{
    CorrelationId, EntityId, EventKind, Frame, Inbound, Operation, SubscriptionAction, Topic,
    TopicKind,
};
pub use transport::{Link, ReconnectConfig, Transport};
pub use websocket::WebSocketTransport;
