// ── Domain model ──
//
// Types handed to consumers. Identity and topic types live in gantry-api
// because they appear on the wire; they are re-exported here so callers
// only need gantry-core.

mod event;
mod files;

pub use event::PushEvent;
pub use files::DirectoryEntry;

pub use gantry_api::{EntityId, EventKind, Topic, TopicKind};
