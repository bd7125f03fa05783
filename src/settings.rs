// SPDX-License-Identifier: Apache-2.0

//! User settings stored in `~/.conda-assist/config.toml`.
//!
//! ```toml
//! [mcp]
//! environment_path = "~/.anaconda/mcp"
//! default_client = "cursor"
//!
//! [assistant]
//! debug_error_mode = "ask"
//! accepted_terms = true
//! ```
//!
//! Every field has a default, so a missing file (or a missing table) is
//! the same as an empty one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_ERROR_SYSTEM_MESSAGE: &str = "\
You are the Conda Assistant from Anaconda.
Your job is to help the user understand the error message and suggest ways to correct it.
You will be given the command COMMAND and the error message MESSAGE
You will respond first with a concise explanation of the error message.
You will then suggest up to three ways the user may correct the error by changing the command
or by altering their environment and running the command again.
";

pub const DEFAULT_SEARCH_SYSTEM_MESSAGE: &str = "\
You are the Conda Assistant from Anaconda.
Your job is to help the user find conda packages that provide the capabilities they describe.
Recommend up to three packages available on conda-forge or the defaults channel.
For each package give its name, a one-sentence summary, and the conda install command.
";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),
    #[error("Invalid value '{value}' for '{key}': expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

// =============================================================================
// Settings model
// =============================================================================

/// How eagerly failed conda commands get an AI explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugErrorMode {
    Automatic,
    #[default]
    Ask,
    Off,
}

impl fmt::Display for DebugErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Ask => write!(f, "ask"),
            Self::Off => write!(f, "off"),
        }
    }
}

impl FromStr for DebugErrorMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "automatic" | "auto" => Ok(Self::Automatic),
            "ask" => Ok(Self::Ask),
            "off" | "disable" | "disabled" => Ok(Self::Off),
            other => Err(format!("unknown debug mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mcp: McpSettings,
    pub assistant: AssistantSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    pub environment_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conda_executable: Option<PathBuf>,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            environment_path: "~/.anaconda/mcp".to_string(),
            default_client: None,
            catalog_url: None,
            conda_executable: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub domain: String,
    pub client_source: String,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_terms: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_collection: Option<bool>,
    pub suggest_correction_on_error: bool,
    pub debug_error_mode: DebugErrorMode,
    /// Send the system prompt inside the user message for models that
    /// ignore system messages.
    pub combine_messages: bool,
    pub system_messages: SystemMessages,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            domain: "assistant.anaconda.cloud".to_string(),
            client_source: "anaconda-cli-prod".to_string(),
            api_version: "v3".to_string(),
            model: None,
            api_key: None,
            accepted_terms: None,
            data_collection: None,
            suggest_correction_on_error: true,
            debug_error_mode: DebugErrorMode::default(),
            combine_messages: false,
            system_messages: SystemMessages::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMessages {
    pub search: String,
    pub error: String,
}

impl Default for SystemMessages {
    fn default() -> Self {
        Self {
            search: DEFAULT_SEARCH_SYSTEM_MESSAGE.to_string(),
            error: DEFAULT_ERROR_SYSTEM_MESSAGE.to_string(),
        }
    }
}

impl Settings {
    /// `~/.conda-assist/config.toml`
    pub fn default_path() -> PathBuf {
        home::home_dir()
            .unwrap_or_default()
            .join(".conda-assist")
            .join("config.toml")
    }

    /// Loads settings from `path`, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Base directory holding one conda environment per installed server.
    pub fn environment_base(&self) -> PathBuf {
        expand_tilde(&self.mcp.environment_path)
    }
}

/// Expands a leading `~` using the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), home::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(path),
    }
}

// =============================================================================
// Key/value access for `conda-assist config`
// =============================================================================

#[derive(Clone, Copy)]
enum ValueKind {
    Text,
    Bool,
    Mode,
}

const KNOWN_KEYS: &[(&str, ValueKind)] = &[
    ("mcp.environment_path", ValueKind::Text),
    ("mcp.default_client", ValueKind::Text),
    ("mcp.catalog_url", ValueKind::Text),
    ("mcp.conda_executable", ValueKind::Text),
    ("assistant.domain", ValueKind::Text),
    ("assistant.client_source", ValueKind::Text),
    ("assistant.api_version", ValueKind::Text),
    ("assistant.model", ValueKind::Text),
    ("assistant.api_key", ValueKind::Text),
    ("assistant.accepted_terms", ValueKind::Bool),
    ("assistant.data_collection", ValueKind::Bool),
    ("assistant.suggest_correction_on_error", ValueKind::Bool),
    ("assistant.debug_error_mode", ValueKind::Mode),
    ("assistant.combine_messages", ValueKind::Bool),
    ("assistant.system_messages.search", ValueKind::Text),
    ("assistant.system_messages.error", ValueKind::Text),
];

fn parse_value(key: &str, value: &str) -> Result<toml::Value, SettingsError> {
    let kind = KNOWN_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;

    let invalid = |expected| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    };

    match kind {
        ValueKind::Text => Ok(toml::Value::String(value.to_string())),
        ValueKind::Bool => match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(toml::Value::Boolean(true)),
            "false" | "no" | "0" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(invalid("true or false")),
        },
        ValueKind::Mode => value
            .parse::<DebugErrorMode>()
            .map(|mode| toml::Value::String(mode.to_string()))
            .map_err(|_| invalid("automatic, ask or off")),
    }
}

/// Writes a single dotted key into the settings file.
///
/// The previous file is copied to `config.backup.toml` first. Missing
/// tables are created; unrelated content is preserved.
pub fn set_value(path: &Path, key: &str, value: &str) -> Result<(), SettingsError> {
    let parsed = parse_value(key, value)?;

    let mut doc = if path.exists() {
        let backup = path.with_extension("backup.toml");
        std::fs::copy(path, &backup).map_err(|source| SettingsError::Write {
            path: backup,
            source,
        })?;
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse::<toml::Table>()?
    } else {
        toml::Table::new()
    };

    let mut parts: Vec<&str> = key.split('.').collect();
    let leaf = parts.pop().unwrap_or(key);
    let mut table = &mut doc;
    for part in parts {
        let entry = table
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        table = entry
            .as_table_mut()
            .ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
    }
    table.insert(leaf.to_string(), parsed);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let rendered = toml::to_string_pretty(&doc)?;
    std::fs::write(path, rendered).map_err(|source| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(key, "setting updated");
    Ok(())
}

/// Every effective setting as `(dotted key, display value)`, defaults included.
///
/// The API key is masked.
pub fn list_values(settings: &Settings) -> Result<Vec<(String, String)>, SettingsError> {
    let value = toml::Value::try_from(settings)?;
    let mut out = Vec::new();
    flatten("", &value, &mut out);
    for (key, val) in out.iter_mut() {
        if key == "assistant.api_key" {
            *val = "****".to_string();
        }
    }
    Ok(out)
}

pub fn get_value(settings: &Settings, key: &str) -> Result<Option<String>, SettingsError> {
    if !KNOWN_KEYS.iter().any(|(k, _)| *k == key) {
        return Err(SettingsError::UnknownKey(key.to_string()));
    }
    Ok(list_values(settings)?
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v))
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(settings.mcp.environment_path, "~/.anaconda/mcp");
        assert_eq!(settings.assistant.domain, "assistant.anaconda.cloud");
        assert_eq!(settings.assistant.api_version, "v3");
        assert!(settings.assistant.suggest_correction_on_error);
        assert_eq!(settings.assistant.debug_error_mode, DebugErrorMode::Ask);
        assert!(settings.assistant.accepted_terms.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[mcp]\ndefault_client = \"cursor\"\n[assistant]\ndebug_error_mode = \"off\"\n",
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.mcp.default_client.as_deref(), Some("cursor"));
        assert_eq!(settings.mcp.environment_path, "~/.anaconda/mcp");
        assert_eq!(settings.assistant.debug_error_mode, DebugErrorMode::Off);
    }

    #[test]
    fn test_set_value_creates_tables_and_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[other]\nkeep = 1\n").unwrap();

        set_value(&path, "assistant.accepted_terms", "yes").unwrap();
        set_value(&path, "assistant.system_messages.search", "be brief").unwrap();

        assert!(tmp.path().join("config.backup.toml").exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("keep = 1"));

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.assistant.accepted_terms, Some(true));
        assert_eq!(settings.assistant.system_messages.search, "be brief");
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        assert!(matches!(
            set_value(&path, "assistant.colour", "red"),
            Err(SettingsError::UnknownKey(_))
        ));
        assert!(matches!(
            set_value(&path, "assistant.debug_error_mode", "sometimes"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(matches!(
            set_value(&path, "assistant.data_collection", "maybe"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_get_and_list_mask_api_key() {
        let mut settings = Settings::default();
        settings.assistant.api_key = Some("secret".into());
        let all = list_values(&settings).unwrap();
        assert!(all.iter().any(|(k, v)| k == "assistant.api_key" && v == "****"));
        assert_eq!(
            get_value(&settings, "assistant.debug_error_mode").unwrap().as_deref(),
            Some("ask")
        );
        assert_eq!(get_value(&settings, "mcp.default_client").unwrap(), None);
    }

    #[test]
    fn test_debug_mode_parsing() {
        assert_eq!("AUTOMATIC".parse::<DebugErrorMode>(), Ok(DebugErrorMode::Automatic));
        assert_eq!("disable".parse::<DebugErrorMode>(), Ok(DebugErrorMode::Off));
        assert!("never".parse::<DebugErrorMode>().is_err());
    }
}
