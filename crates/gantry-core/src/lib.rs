// gantry-core: session layer between gantry-api and consumers (CLI, panels).
//
// A `Session` owns one daemon connection and multiplexes over it:
// correlated request/response operations, fire-and-forget console input,
// and push-event topics that survive reconnects.

pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod model;
pub mod operations;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{OperationTimeouts, SessionConfig};
pub use correlation::{CorrelationRegistry, Settlement};
pub use dispatch::{Dispatcher, ListenerHandle};
pub use error::CoreError;
pub use ledger::SubscriptionLedger;
pub use session::{ConnectionState, ConnectivityEvent, Session};

pub use model::{DirectoryEntry, EntityId, EventKind, PushEvent, Topic, TopicKind};

// Transport seam, for callers that bring their own.
pub use gantry_api::{Link, Operation, ReconnectConfig, Transport};
