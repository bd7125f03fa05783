// SPDX-License-Identifier: Apache-2.0

//! Core value types for the MCP server manager.
//!
//! `ServerName` is parsed once at the boundary (CLI args, catalog files) and
//! is safe to use as a directory name under the environment base directory.
//! The remaining types are plain records handed from the service layer to
//! the CLI formatters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// ServerName — validated MCP server name
// =============================================================================

/// A validated MCP server name.
///
/// Server names double as environment directory names, so they are limited
/// to ASCII letters, digits, `-`, `_` and `.`, must not start with `.` or
/// `-`, and are at most 64 characters long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerName(String);

#[derive(Debug, Clone, Error)]
#[error("Invalid server name '{input}': {reason}")]
pub struct ServerNameError {
    input: String,
    reason: &'static str,
}

impl ServerName {
    pub const MAX_LEN: usize = 64;

    pub fn new(name: impl Into<String>) -> Result<Self, ServerNameError> {
        let raw = name.into();
        let name = raw.trim();
        let reject = |reason| {
            Err(ServerNameError {
                input: name.to_string(),
                reason,
            })
        };

        if name.is_empty() {
            return reject("cannot be empty");
        }
        if name.len() > Self::MAX_LEN {
            return reject("too long (max 64 characters)");
        }
        if name.starts_with('.') || name.starts_with('-') {
            return reject("cannot start with '.' or '-'");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return reject("only letters, digits, '-', '_' and '.' are allowed");
        }
        if name.contains("..") {
            return reject("cannot contain '..'");
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ServerName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ServerName {
    type Err = ServerNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for ServerName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ServerName::new(s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for ServerName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

// =============================================================================
// Catalog and outcome records
// =============================================================================

fn not_available() -> String {
    "N/A".to_string()
}

/// One installable server as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: ServerName,
    pub package_name: String,
    #[serde(default = "not_available")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "not_available")]
    pub source: String,
    /// Conda channel to install from; the user's default channels otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Outcome of an install or update.
///
/// `success` with an `error_message` means the environment is usable but a
/// secondary step (client configuration) did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationResult {
    pub success: bool,
    pub server_name: String,
    pub environment_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

/// Where a server stands on disk and in client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Installed,
    InstalledUnknown,
    ConfiguredMissing,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "Installed"),
            Self::InstalledUnknown => write!(f, "Installed (Unknown in Catalog)"),
            Self::ConfiguredMissing => write!(f, "Configured (Environment Missing)"),
        }
    }
}

/// Whether a client's configuration points at the managed environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfiguredState {
    Yes,
    No,
    Mismatch { expected: PathBuf },
}

impl fmt::Display for ConfiguredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yes => write!(f, "Yes"),
            Self::No => write!(f, "No"),
            Self::Mismatch { expected } => write!(f, "Mismatch (expected {})", expected.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledServer {
    pub name: String,
    pub prefix: PathBuf,
    pub status: ServerStatus,
    pub version: Option<String>,
    pub description: Option<String>,
    /// Only filled in when a client was given.
    pub configured: Option<ConfiguredState>,
}
