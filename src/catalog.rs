// SPDX-License-Identifier: Apache-2.0

//! Registry of installable MCP servers.
//!
//! Two servers ship built in. A `catalog_url` setting can point at an
//! HTTP(S) URL or a local JSON file whose entries extend or override them.

use crate::error::{ManagerError, Result};
use crate::types::{ServerInfo, ServerName};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Catalog {
    servers: BTreeMap<String, ServerInfo>,
}

/// Remote catalogs come either as a bare list or wrapped in `{"servers": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<ServerInfo>),
    Wrapped { servers: Vec<ServerInfo> },
}

impl CatalogDocument {
    fn into_entries(self) -> Vec<ServerInfo> {
        match self {
            Self::List(entries) | Self::Wrapped { servers: entries } => entries,
        }
    }
}

fn builtin(
    name: &str,
    package: &str,
    version: &str,
    description: &str,
    source: &str,
) -> Option<ServerInfo> {
    Some(ServerInfo {
        name: ServerName::new(name).ok()?,
        package_name: package.to_string(),
        version: version.to_string(),
        description: description.to_string(),
        source: source.to_string(),
        channel: None,
    })
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// The servers that ship with conda-assist.
    pub fn builtin() -> Self {
        let entries = [
            builtin(
                "condamcp",
                "condamcp",
                "0.1.0",
                "An open-source Model Context Protocol (MCP) server for Conda.",
                "https://github.com/jnoller/condamcp",
            ),
            builtin(
                "packaging-tools",
                "tqdm",
                "N/A",
                "MCP server providing package building and analysis tools (tqdm package)",
                "conda-forge",
            ),
        ];
        Self::from_entries(entries.into_iter().flatten())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ServerInfo>) -> Self {
        let servers = entries
            .into_iter()
            .map(|info| (info.name.to_string(), info))
            .collect();
        Self { servers }
    }

    /// Built-in entries merged with those from `source`, if any.
    ///
    /// A source that cannot be fetched or parsed is logged and skipped.
    pub fn load(source: Option<&str>) -> Self {
        let mut catalog = Self::builtin();
        let Some(source) = source else {
            return catalog;
        };
        match fetch_entries(source) {
            Ok(entries) => {
                tracing::debug!(source, count = entries.len(), "loaded external catalog");
                for info in entries {
                    catalog.servers.insert(info.name.to_string(), info);
                }
            }
            Err(e) => tracing::warn!(source, error = %e, "ignoring external catalog"),
        }
        catalog
    }

    /// All servers, sorted by name.
    pub fn list_servers(&self) -> Vec<ServerInfo> {
        self.servers.values().cloned().collect()
    }

    pub fn get_server_details(&self, name: &str) -> Result<ServerInfo> {
        self.servers
            .get(name)
            .cloned()
            .ok_or_else(|| ManagerError::ServerNotFound(name.to_string()))
    }

    pub fn get_package_name(&self, name: &str) -> Result<String> {
        self.get_server_details(name).map(|info| info.package_name)
    }
}

fn fetch_entries(source: &str) -> std::result::Result<Vec<ServerInfo>, String> {
    let body = if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| e.to_string())?;
        client
            .get(source)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| e.to_string())?
    } else {
        let path = source.strip_prefix("file://").unwrap_or(source);
        std::fs::read_to_string(crate::settings::expand_tilde(path)).map_err(|e| e.to_string())?
    };
    serde_json::from_str::<CatalogDocument>(&body)
        .map(CatalogDocument::into_entries)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_entries() {
        let catalog = Catalog::builtin();
        let names: Vec<String> = catalog
            .list_servers()
            .iter()
            .map(|s| s.name.to_string())
            .collect();
        assert_eq!(names, vec!["condamcp", "packaging-tools"]);
        assert_eq!(catalog.get_package_name("packaging-tools").unwrap(), "tqdm");
        let info = catalog.get_server_details("condamcp").unwrap();
        assert_eq!(info.version, "0.1.0");
        assert_eq!(info.source, "https://github.com/jnoller/condamcp");
    }

    #[test]
    fn test_unknown_server() {
        let err = Catalog::builtin().get_server_details("nope").unwrap_err();
        assert!(matches!(err, ManagerError::ServerNotFound(ref n) if n == "nope"));
    }

    #[test]
    fn test_local_catalog_extends_and_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"servers": [
                {"name": "condamcp", "package_name": "condamcp", "version": "0.2.0"},
                {"name": "weather", "package_name": "weather-mcp", "channel": "conda-forge"}
            ]}"#,
        )
        .unwrap();

        let catalog = Catalog::load(Some(path.to_str().unwrap()));
        assert_eq!(catalog.get_server_details("condamcp").unwrap().version, "0.2.0");
        let weather = catalog.get_server_details("weather").unwrap();
        assert_eq!(weather.channel.as_deref(), Some("conda-forge"));
        assert!(catalog.get_server_details("packaging-tools").is_ok());
    }

    #[test]
    fn test_broken_catalog_falls_back_to_builtin() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(&path, "not json").unwrap();
        let catalog = Catalog::load(Some(path.to_str().unwrap()));
        assert_eq!(catalog.list_servers().len(), 2);
    }
}
