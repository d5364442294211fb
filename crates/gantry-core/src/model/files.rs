use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a server's file tree as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, alias = "directory")]
    pub is_directory: bool,
    #[serde(default, alias = "file")]
    pub is_file: bool,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_daemon_entry() {
        let entry: DirectoryEntry = serde_json::from_value(json!({
            "name": "server.properties",
            "size": 1187,
            "directory": false,
            "file": true,
            "mime": "text/plain",
            "modified": "2026-03-01T10:15:00Z",
            "symlink": false
        }))
        .unwrap();

        assert_eq!(entry.name, "server.properties");
        assert_eq!(entry.size, 1187);
        assert!(entry.is_file);
        assert!(!entry.is_directory);
        assert_eq!(entry.modified.unwrap().to_rfc3339(), "2026-03-01T10:15:00+00:00");
    }

    #[test]
    fn minimal_entry_uses_defaults() {
        let entry: DirectoryEntry =
            serde_json::from_value(json!({"name": "world", "isDirectory": true})).unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.size, 0);
        assert!(entry.mime.is_none());
    }
}
