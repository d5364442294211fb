// ── Daemon wire protocol ──
//
// Every message on the channel is a named frame: `{"event": ..., "data": {...}}`.
// Requests carry a `correlationId` that the daemon echoes on the operation's
// `:result` channel or on the shared error channel. Push events arrive on a
// fixed set of channels and always name the entity they belong to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::Error;

/// Channel carrying subscribe/unsubscribe requests.
pub const SUBSCRIPTION_CHANNEL: &str = "subscription";

/// Shared channel on which the daemon reports failed requests.
pub const ERROR_CHANNEL: &str = "operation:error";

/// Suffix appended to an operation channel for its success reply.
pub const RESULT_SUFFIX: &str = ":result";

const CORRELATION_FIELD: &str = "correlationId";
const ENTITY_FIELD: &str = "entityId";

// ── EntityId ────────────────────────────────────────────────────────

/// Identifier of a server or host known to the daemon.
///
/// Opaque: the text is kept exactly as given and compared byte for byte,
/// whether it looks like a UUID or a plain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

// ── Topics ──────────────────────────────────────────────────────────

/// The two independent families of push streams.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TopicKind {
    Server,
    Host,
}

/// A stream of push events the client wants delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    pub kind: TopicKind,
    pub entity_id: EntityId,
}

impl Topic {
    pub fn new(kind: TopicKind, entity_id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }

    pub fn server(entity_id: impl Into<EntityId>) -> Self {
        Self::new(TopicKind::Server, entity_id)
    }

    pub fn host(entity_id: impl Into<EntityId>) -> Self {
        Self::new(TopicKind::Host, entity_id)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.entity_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

// ── Operations ──────────────────────────────────────────────────────

/// Every operation the client can send to the daemon.
///
/// The string form is the outbound channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter)]
pub enum Operation {
    #[strum(serialize = "files:list")]
    ListDirectory,
    #[strum(serialize = "files:read")]
    ReadFile,
    #[strum(serialize = "files:write")]
    WriteFile,
    #[strum(serialize = "files:write-binary")]
    WriteBinaryFile,
    #[strum(serialize = "files:mkdir")]
    CreateDirectory,
    #[strum(serialize = "files:rename")]
    Rename,
    #[strum(serialize = "files:delete")]
    Delete,
    #[strum(serialize = "console:command")]
    ConsoleCommand,
}

impl Operation {
    /// Outbound channel name.
    pub fn channel(self) -> &'static str {
        self.into()
    }

    /// Channel the daemon answers on when the operation succeeds.
    pub fn result_channel(self) -> String {
        format!("{}{RESULT_SUFFIX}", self.channel())
    }
}

// ── Push event kinds ────────────────────────────────────────────────

/// Unsolicited event channels pushed by the daemon.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr,
    EnumIter,
)]
pub enum EventKind {
    #[strum(serialize = "server:status")]
    Status,
    #[strum(serialize = "server:console")]
    ConsoleLine,
    #[strum(serialize = "server:stats")]
    Stats,
    #[strum(serialize = "server:install:progress")]
    InstallProgress,
    #[strum(serialize = "server:install:complete")]
    InstallComplete,
    #[strum(serialize = "server:install:error")]
    InstallError,
}

// ── CorrelationId ───────────────────────────────────────────────────

/// Identifier echoed by the daemon to match a reply to its request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Frame ───────────────────────────────────────────────────────────

/// A single named message on the channel, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Tagged request: `{correlationId, ...fields}` on the operation channel.
    pub fn request(operation: Operation, id: &CorrelationId, mut fields: Map<String, Value>) -> Self {
        fields.insert(CORRELATION_FIELD.into(), Value::String(id.to_string()));
        Self::new(operation.channel(), Value::Object(fields))
    }

    /// Fire-and-forget message with no correlation id.
    pub fn command(operation: Operation, fields: Map<String, Value>) -> Self {
        Self::new(operation.channel(), Value::Object(fields))
    }

    /// Subscribe or unsubscribe a topic.
    pub fn subscription(topic: &Topic, action: SubscriptionAction) -> Self {
        Self::new(
            SUBSCRIPTION_CHANNEL,
            serde_json::json!({
                "kind": topic.kind,
                "entityId": topic.entity_id,
                "action": action,
            }),
        )
    }

    /// Correlation id carried in `data`, if any.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.data
            .get(CORRELATION_FIELD)
            .and_then(Value::as_str)
            .map(CorrelationId::new)
    }
}

// ── Inbound classification ──────────────────────────────────────────

/// An inbound frame mapped onto one of the three things the daemon sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Success reply to a tagged request.
    Reply {
        correlation_id: CorrelationId,
        channel: String,
        payload: Value,
    },
    /// The daemon reports that a tagged request failed.
    Failure {
        correlation_id: CorrelationId,
        message: String,
    },
    /// Unsolicited event for a topic.
    Push {
        kind: EventKind,
        entity_id: EntityId,
        payload: Value,
    },
}

impl Inbound {
    /// Map a frame to a reply, a failure, or a push event.
    ///
    /// Anything else is [`Error::MalformedFrame`]; the caller logs and
    /// drops it.
    pub fn classify(frame: Frame) -> Result<Self, Error> {
        let Frame { event, data } = frame;

        if event == ERROR_CHANNEL {
            let correlation_id = require_correlation(&event, &data)?;
            let message = match data.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "daemon reported an error without a message".to_owned(),
            };
            return Ok(Self::Failure {
                correlation_id,
                message,
            });
        }

        if event.ends_with(RESULT_SUFFIX) {
            let correlation_id = require_correlation(&event, &data)?;
            return Ok(Self::Reply {
                correlation_id,
                channel: event,
                payload: data,
            });
        }

        if let Ok(kind) = event.parse::<EventKind>() {
            let entity_id = data
                .get(ENTITY_FIELD)
                .and_then(Value::as_str)
                .map(EntityId::from)
                .ok_or_else(|| Error::MalformedFrame {
                    event: event.clone(),
                    reason: format!("missing {ENTITY_FIELD}"),
                })?;
            return Ok(Self::Push {
                kind,
                entity_id,
                payload: data,
            });
        }

        Err(Error::MalformedFrame {
            event,
            reason: "unknown channel".into(),
        })
    }
}

fn require_correlation(event: &str, data: &Value) -> Result<CorrelationId, Error> {
    data.get(CORRELATION_FIELD)
        .and_then(Value::as_str)
        .map(CorrelationId::new)
        .ok_or_else(|| Error::MalformedFrame {
            event: event.to_owned(),
            reason: format!("missing {CORRELATION_FIELD}"),
        })
}

// ── Tests ────────────────────────────────────────────────────────────
