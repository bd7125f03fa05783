// SPDX-License-Identifier: Apache-2.0

//! MCP client configuration files.
//!
//! Each supported client (editor or desktop app) gets one JSON file,
//! either global (under the user's home) or inside a workspace:
//!
//! ```json
//! {
//!   "mcp.servers": [
//!     { "name": "condamcp", "path": "/home/u/.anaconda/mcp/condamcp",
//!       "command": "/home/u/.anaconda/mcp/condamcp/bin/python -m condamcp",
//!       "workspace_path": null }
//!   ]
//! }
//! ```
//!
//! Files are rewritten whole. Keys other than the server list are kept as
//! they were, and so are list items this module does not understand.

use crate::error::{ManagerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SERVERS_KEY: &str = "mcp.servers";
const LEGACY_SERVERS_KEY: &str = "servers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    ClaudeDesktop,
    Cursor,
    Vscode,
    Custom,
}

impl ClientType {
    pub const ALL: [ClientType; 4] = [
        ClientType::ClaudeDesktop,
        ClientType::Cursor,
        ClientType::Vscode,
        ClientType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeDesktop => "claude-desktop",
            Self::Cursor => "cursor",
            Self::Vscode => "vscode",
            Self::Custom => "custom",
        }
    }

    /// Config file for this client, global or relative to `workspace`.
    pub fn config_path(&self, home: &Path, workspace: Option<&Path>) -> PathBuf {
        match (self, workspace) {
            (Self::Vscode, Some(ws)) => ws.join(".vscode").join("mcp-config.json"),
            (Self::Cursor, Some(ws)) => ws.join(".cursor").join("mcp-servers.json"),
            (_, Some(ws)) => ws.join(".mcp").join("config.json"),
            (Self::ClaudeDesktop, None) => {
                home.join(".config").join("claude-desktop").join("mcp.json")
            }
            (Self::Cursor, None) => home.join(".cursor").join("mcp-servers.json"),
            (Self::Vscode, None) => home.join(".vscode").join("mcp-config.json"),
            (Self::Custom, None) => home.join(".mcp").join("config.json"),
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = ManagerError;
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ManagerError::ClientNotSupported(s.to_string()))
    }
}

/// One server registered in a client's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub workspace_path: Option<PathBuf>,
}

impl ServerEntry {
    fn same_key(&self, name: &str, workspace: Option<&Path>) -> bool {
        self.name == name && self.workspace_path.as_deref() == workspace
    }
}

// =============================================================================
// File document
// =============================================================================

struct ConfigDocument {
    root: Map<String, Value>,
    key: &'static str,
}

impl ConfigDocument {
    /// Strict load used before writing: an unreadable file is an error so
    /// that it is never overwritten.
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                root: Map::new(),
                key: SERVERS_KEY,
            });
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self {
                root: Map::new(),
                key: SERVERS_KEY,
            });
        }
        let root = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(ManagerError::Configuration(format!(
                    "{} does not contain a JSON object",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(ManagerError::Configuration(format!(
                    "{} is not valid JSON ({}); fix or remove it first",
                    path.display(),
                    e
                )));
            }
        };
        let key = if !root.get(SERVERS_KEY).is_some_and(Value::is_array)
            && root.get(LEGACY_SERVERS_KEY).is_some_and(Value::is_array)
        {
            LEGACY_SERVERS_KEY
        } else {
            SERVERS_KEY
        };
        Ok(Self { root, key })
    }

    fn entries(&self) -> Vec<ServerEntry> {
        self.root
            .get(self.key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    fn take_entries(&mut self) -> Vec<Value> {
        match self.root.remove(self.key) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                tracing::warn!(key = self.key, "server list is not an array, replacing it");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn put_entries(&mut self, items: Vec<Value>) {
        self.root.insert(self.key.to_string(), Value::Array(items));
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string_pretty(&Value::Object(self.root.clone()))?;
        std::fs::write(path, rendered + "\n")?;
        Ok(())
    }
}

fn value_has_key(value: &Value, name: &str, workspace: Option<&Path>) -> bool {
    serde_json::from_value::<ServerEntry>(value.clone())
        .map(|entry| entry.same_key(name, workspace))
        .unwrap_or(false)
}

// =============================================================================
// Store
// =============================================================================

/// Reads and writes client config files relative to a home directory.
#[derive(Debug, Clone)]
pub struct ClientConfigStore {
    home: PathBuf,
}

impl ClientConfigStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Store rooted at the current user's home directory.
    pub fn for_current_user() -> Self {
        Self::new(home::home_dir().unwrap_or_default())
    }

    pub fn config_path(&self, client: ClientType, workspace: Option<&Path>) -> PathBuf {
        client.config_path(&self.home, workspace)
    }

    /// Entries in the client's file. Unreadable files read as empty.
    pub fn list(&self, client: ClientType, workspace: Option<&Path>) -> Vec<ServerEntry> {
        let path = self.config_path(client, workspace);
        match ConfigDocument::load(&path) {
            Ok(doc) => doc.entries(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable client config"
                );
                Vec::new()
            }
        }
    }

    pub fn find(
        &self,
        client: ClientType,
        workspace: Option<&Path>,
        name: &str,
    ) -> Option<ServerEntry> {
        self.list(client, workspace)
            .into_iter()
            .find(|entry| entry.same_key(name, workspace))
    }

    /// Adds `entry` or replaces the one with the same name and workspace.
    /// Returns the file that was written.
    pub fn upsert(&self, client: ClientType, entry: &ServerEntry) -> Result<PathBuf> {
        let workspace = entry.workspace_path.as_deref();
        let path = self.config_path(client, workspace);
        let mut doc = ConfigDocument::load(&path)?;
        let value = serde_json::to_value(entry)?;

        let mut items = doc.take_entries();
        match items
            .iter_mut()
            .find(|v| value_has_key(v, &entry.name, workspace))
        {
            Some(existing) => *existing = value,
            None => items.push(value),
        }
        doc.put_entries(items);
        doc.save(&path)?;
        tracing::info!(
            client = %client,
            server = %entry.name,
            path = %path.display(),
            "client config updated"
        );
        Ok(path)
    }

    /// Removes the entry for `name`; `Ok(false)` when there was none.
    pub fn remove(&self, client: ClientType, workspace: Option<&Path>, name: &str) -> Result<bool> {
        let path = self.config_path(client, workspace);
        if !path.exists() {
            return Ok(false);
        }
        let mut doc = ConfigDocument::load(&path)?;
        let mut items = doc.take_entries();
        let before = items.len();
        items.retain(|v| !value_has_key(v, name, workspace));
        if items.len() == before {
            return Ok(false);
        }
        doc.put_entries(items);
        doc.save(&path)?;
        tracing::info!(
            client = %client,
            server = name,
            path = %path.display(),
            "removed from client config"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, ws: Option<&Path>) -> ServerEntry {
        ServerEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("/envs/{}", name)),
            command: format!("/envs/{}/bin/python -m {}", name, name),
            workspace_path: ws.map(Path::to_path_buf),
        }
    }

    #[test]
    fn test_client_parsing() {
        assert_eq!("cursor".parse::<ClientType>().unwrap(), ClientType::Cursor);
        assert_eq!("Claude-Desktop".parse::<ClientType>().unwrap(), ClientType::ClaudeDesktop);
        assert!(matches!(
            "emacs".parse::<ClientType>(),
            Err(ManagerError::ClientNotSupported(_))
        ));
    }

    #[test]
    fn test_config_paths() {
        let home = Path::new("/home/u");
        let ws = Path::new("/work/proj");
        assert_eq!(
            ClientType::ClaudeDesktop.config_path(home, None),
            PathBuf::from("/home/u/.config/claude-desktop/mcp.json")
        );
        assert_eq!(
            ClientType::Cursor.config_path(home, None),
            PathBuf::from("/home/u/.cursor/mcp-servers.json")
        );
        assert_eq!(
            ClientType::Vscode.config_path(home, Some(ws)),
            PathBuf::from("/work/proj/.vscode/mcp-config.json")
        );
        assert_eq!(
            ClientType::ClaudeDesktop.config_path(home, Some(ws)),
            PathBuf::from("/work/proj/.mcp/config.json")
        );
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClientConfigStore::new(tmp.path());

        store.upsert(ClientType::Cursor, &entry("condamcp", None)).unwrap();
        let mut updated = entry("condamcp", None);
        updated.command = "new-command".into();
        store.upsert(ClientType::Cursor, &updated).unwrap();

        let entries = store.list(ClientType::Cursor, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "new-command");
    }

    #[test]
    fn test_workspace_entries_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClientConfigStore::new(tmp.path().join("home"));
        let ws_a = tmp.path().join("a");
        let ws_b = tmp.path().join("b");

        store.upsert(ClientType::Vscode, &entry("condamcp", None)).unwrap();
        store.upsert(ClientType::Vscode, &entry("condamcp", Some(&ws_a))).unwrap();
        store.upsert(ClientType::Vscode, &entry("condamcp", Some(&ws_b))).unwrap();

        assert!(store.remove(ClientType::Vscode, Some(&ws_a), "condamcp").unwrap());
        assert!(store.find(ClientType::Vscode, Some(&ws_a), "condamcp").is_none());
        assert!(store.find(ClientType::Vscode, Some(&ws_b), "condamcp").is_some());
        assert!(store.find(ClientType::Vscode, None, "condamcp").is_some());
        assert!(!store.remove(ClientType::Vscode, Some(&ws_a), "condamcp").unwrap());
    }

    #[test]
    fn test_preserves_unrelated_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClientConfigStore::new(tmp.path());
        let path = store.config_path(ClientType::Custom, None);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"theme": "dark", "mcp.servers": [{"opaque": 1}]}"#,
        )
        .unwrap();

        store.upsert(ClientType::Custom, &entry("condamcp", None)).unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["mcp.servers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_legacy_servers_key_is_read_and_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClientConfigStore::new(tmp.path());
        let path = store.config_path(ClientType::Custom, None);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"servers": [{"name": "old", "path": "/envs/old"}]}"#).unwrap();

        assert_eq!(store.list(ClientType::Custom, None)[0].name, "old");
        store.upsert(ClientType::Custom, &entry("condamcp", None)).unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["servers"].as_array().unwrap().len(), 2);
        assert!(raw.get("mcp.servers").is_none());
    }

    #[test]
    fn test_invalid_json_reads_empty_but_refuses_write() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ClientConfigStore::new(tmp.path());
        let path = store.config_path(ClientType::Cursor, None);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(store.list(ClientType::Cursor, None).is_empty());
        assert!(matches!(
            store.upsert(ClientType::Cursor, &entry("condamcp", None)),
            Err(ManagerError::Configuration(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
