// SPDX-License-Identifier: Apache-2.0

//! Error types for the MCP server manager and the assistant.
//!
//! `ManagerError` is the root of everything the install/update/uninstall
//! machinery can fail with. The CLI catches it (and anything else) at the
//! top level and exits with code 1.

use thiserror::Error;

/// Convenience alias used throughout the manager modules.
pub type Result<T, E = ManagerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Failed to create environment: {0}")]
    EnvironmentCreation(String),

    #[error("Failed to remove environment: {0}")]
    EnvironmentRemoval(String),

    #[error("Failed to install package: {0}")]
    PackageInstallation(String),

    #[error("Failed to update package: {0}")]
    PackageUpdate(String),

    #[error("Server '{0}' not found in catalog")]
    ServerNotFound(String),

    #[error("Server '{0}' is already installed")]
    ServerAlreadyInstalled(String),

    #[error("Server '{0}' is not installed")]
    ServerNotInstalled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Client '{0}' is not supported (expected one of: claude-desktop, cursor, vscode, custom)"
    )]
    ClientNotSupported(String),

    #[error("Command '{command}' failed with code {return_code}. Stderr: {stderr}")]
    CondaCommand {
        command: String,
        return_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Removed configuration for '{server}', but failed to remove environment: {reason}")]
    PartialUninstall { server: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ManagerError {
    /// Short category label used in history entries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnvironmentCreation(_) => "environment_creation",
            Self::EnvironmentRemoval(_) => "environment_removal",
            Self::PackageInstallation(_) => "package_installation",
            Self::PackageUpdate(_) => "package_update",
            Self::ServerNotFound(_) => "server_not_found",
            Self::ServerAlreadyInstalled(_) => "server_already_installed",
            Self::ServerNotInstalled(_) => "server_not_installed",
            Self::Configuration(_) => "configuration",
            Self::ClientNotSupported(_) => "client_not_supported",
            Self::CondaCommand { .. } => "conda_command",
            Self::PartialUninstall { .. } => "partial_uninstall",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

/// Failures from the hosted assistant.
#[derive(Debug, Error)]
pub enum AssistError {
    #[error(
        "You have not accepted the terms of service. \
         Run `conda-assist config assistant.accepted_terms true` to accept them."
    )]
    NotAcceptedTerms,

    #[error(
        "You have not accepted the terms of service. Set `assistant.accepted_terms` to continue."
    )]
    UnspecifiedAcceptedTerms,

    #[error(
        "You have not chosen to opt-in or opt-out of data collection. \
         Set `assistant.data_collection` to continue."
    )]
    UnspecifiedDataCollection,

    #[error("No API key configured. Set ANACONDA_ASSISTANT_API_KEY or `assistant.api_key`.")]
    MissingApiKey,

    #[error("Assistant request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Assistant returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Assistant returned an empty response")]
    EmptyResponse,

    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conda_command_message_format() {
        let err = ManagerError::CondaCommand {
            command: "conda create --prefix /x --yes --json".into(),
            return_code: 1,
            stdout: String::new(),
            stderr: "PackagesNotFoundError".into(),
        };
        assert_eq!(
            err.to_string(),
            "Command 'conda create --prefix /x --yes --json' failed with code 1. \
             Stderr: PackagesNotFoundError"
        );
        assert_eq!(err.kind(), "conda_command");
    }

    #[test]
    fn test_not_installed_mentions_server() {
        let err = ManagerError::ServerNotInstalled("condamcp".into());
        assert!(err.to_string().contains("not installed"));
        assert!(err.to_string().contains("condamcp"));
    }
}
