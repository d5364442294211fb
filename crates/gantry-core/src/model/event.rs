use serde_json::Value;

use gantry_api::{EntityId, EventKind};

/// An unsolicited event pushed by the daemon.
///
/// `payload` is the frame's data exactly as received; helpers below only
/// read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub kind: EventKind,
    pub entity_id: EntityId,
    pub payload: Value,
}

impl PushEvent {
    /// Console output line, for [`EventKind::ConsoleLine`] events.
    pub fn console_line(&self) -> Option<&str> {
        self.payload.get("line").and_then(Value::as_str)
    }

    /// Reported server state, for [`EventKind::Status`] events.
    pub fn status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Installation progress in percent, for [`EventKind::InstallProgress`].
    pub fn progress(&self) -> Option<f64> {
        self.payload.get("progress").and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn helpers_read_payload_fields() {
        let event = PushEvent {
            kind: EventKind::ConsoleLine,
            entity_id: EntityId::from("S1"),
            payload: json!({"entityId": "S1", "line": "Done (2.1s)!"}),
        };
        assert_eq!(event.console_line(), Some("Done (2.1s)!"));
        assert_eq!(event.status(), None);

        let progress = PushEvent {
            kind: EventKind::InstallProgress,
            entity_id: EntityId::from("S1"),
            payload: json!({"entityId": "S1", "progress": 42.5}),
        };
        assert_eq!(progress.progress(), Some(42.5));
    }
}
