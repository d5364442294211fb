// ── Operation façade ──
//
// One method per daemon operation. Each builds the request fields, issues a
// single correlated request with the operation's own timeout, and decodes
// the reply. Console input is the one fire-and-forget exception.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use gantry_api::Operation;

use crate::error::CoreError;
use crate::model::{DirectoryEntry, EntityId};
use crate::session::Session;

/// Request fields, in insertion order.
fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

/// Pull one field out of a reply and decode it.
fn reply_field<T: DeserializeOwned>(
    operation: Operation,
    reply: &mut Value,
    name: &str,
) -> Result<T, CoreError> {
    let value = reply
        .get_mut(name)
        .map(Value::take)
        .ok_or_else(|| CoreError::UnexpectedReply {
            operation,
            reason: format!("missing '{name}'"),
        })?;
    serde_json::from_value(value).map_err(|e| CoreError::UnexpectedReply {
        operation,
        reason: format!("'{name}': {e}"),
    })
}

impl Session {
    /// List the entries of `path` on a server.
    pub async fn list_directory(
        &self,
        server: &EntityId,
        path: &str,
    ) -> Result<Vec<DirectoryEntry>, CoreError> {
        let operation = Operation::ListDirectory;
        let mut reply = self
            .call(operation, fields([("serverId", json!(server)), ("path", json!(path))]))
            .await?;
        let entries: Vec<DirectoryEntry> = reply_field(operation, &mut reply, "entries")?;
        debug!(%server, path, count = entries.len(), "directory listed");
        Ok(entries)
    }

    /// Read a text file.
    pub async fn read_file(&self, server: &EntityId, path: &str) -> Result<String, CoreError> {
        let operation = Operation::ReadFile;
        let mut reply = self
            .call(operation, fields([("serverId", json!(server)), ("path", json!(path))]))
            .await?;
        reply_field(operation, &mut reply, "content")
    }

    /// Replace a text file's contents, creating it if needed.
    pub async fn write_file(
        &self,
        server: &EntityId,
        path: &str,
        content: &str,
    ) -> Result<(), CoreError> {
        self.call(
            Operation::WriteFile,
            fields([
                ("serverId", json!(server)),
                ("path", json!(path)),
                ("content", json!(content)),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Upload raw bytes. The body travels base64-encoded.
    pub async fn write_binary_file(
        &self,
        server: &EntityId,
        path: &str,
        data: &[u8],
    ) -> Result<(), CoreError> {
        debug!(%server, path, bytes = data.len(), "uploading binary file");
        self.call(
            Operation::WriteBinaryFile,
            fields([
                ("serverId", json!(server)),
                ("path", json!(path)),
                ("data", json!(BASE64.encode(data))),
                ("encoding", json!("base64")),
            ]),
        )
        .await?;
        Ok(())
    }

    pub async fn create_directory(&self, server: &EntityId, path: &str) -> Result<(), CoreError> {
        self.call(
            Operation::CreateDirectory,
            fields([("serverId", json!(server)), ("path", json!(path))]),
        )
        .await?;
        Ok(())
    }

    /// Rename or move an entry within the server's file tree.
    pub async fn rename(&self, server: &EntityId, from: &str, to: &str) -> Result<(), CoreError> {
        self.call(
            Operation::Rename,
            fields([
                ("serverId", json!(server)),
                ("from", json!(from)),
                ("to", json!(to)),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Delete one or more entries in a single request. An empty `paths`
    /// sends nothing but still fails while disconnected.
    pub async fn delete<S: AsRef<str>>(&self, server: &EntityId, paths: &[S]) -> Result<(), CoreError> {
        let paths: Vec<&str> = paths.iter().map(AsRef::as_ref).collect();
        if paths.is_empty() {
            self.outbound()?;
            return Ok(());
        }
        self.call(
            Operation::Delete,
            fields([("serverId", json!(server)), ("paths", json!(paths))]),
        )
        .await?;
        Ok(())
    }

    /// Send a line of console input. No reply is expected; output arrives
    /// as console push events.
    pub fn send_console_command(&self, server: &EntityId, command: &str) -> Result<(), CoreError> {
        self.cast(
            Operation::ConsoleCommand,
            fields([("serverId", json!(server)), ("command", json!(command))]),
        )?;
        debug!(%server, "console command sent");
        Ok(())
    }
}
