// SPDX-License-Identifier: Apache-2.0

//! The collaborators a workflow talks to, bundled together.
//!
//! Flows never call conda or touch config files directly; they go through
//! the environment, installation and configuration facades below.

use crate::catalog::Catalog;
use crate::client_config::{ClientConfigStore, ClientType, ServerEntry};
use crate::conda::Conda;
use crate::environment::EnvironmentManager;
use crate::error::{ManagerError, Result};
use crate::installer::{self, Installer};
use crate::types::{ConfiguredState, InstalledServer, ServerInfo, ServerName, ServerStatus};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct Services {
    pub catalog: Catalog,
    pub environments: EnvironmentManager,
    pub installer: Installer,
    pub configs: ClientConfigStore,
    pub conda: Conda,
}

impl Services {
    pub fn new(
        catalog: Catalog,
        base_dir: impl Into<PathBuf>,
        conda: Conda,
        configs: ClientConfigStore,
    ) -> Self {
        Self {
            catalog,
            environments: EnvironmentManager::new(base_dir, conda.clone()),
            installer: Installer::new(conda.clone()),
            configs,
            conda,
        }
    }

    // =========================================================================
    // Environment
    // =========================================================================

    pub fn server_prefix(&self, server: &ServerName) -> PathBuf {
        self.environments.prefix(server)
    }

    pub fn environment_exists(&self, server: &ServerName) -> bool {
        self.environments.exists(server)
    }

    pub fn create_environment(
        &self,
        server: &ServerName,
        channel: Option<&str>,
    ) -> Result<PathBuf> {
        self.environments.create(server, &[], channel)
    }

    pub fn remove_environment(&self, server: &ServerName) -> Result<()> {
        self.environments.remove(server)
    }

    // =========================================================================
    // Installation
    // =========================================================================

    pub fn install_package(&self, prefix: &Path, info: &ServerInfo) -> Result<()> {
        self.installer
            .install(prefix, &info.package_name, info.channel.as_deref())
    }

    /// Removes a half-built environment after a failed install.
    pub fn rollback_environment(&self, server: &ServerName) {
        self.environments.discard(server);
    }

    pub fn update_package(&self, prefix: &Path, package: &str) -> Result<()> {
        self.installer.update(prefix, &[package.to_string()])
    }

    pub fn verify_installation(&self, prefix: &Path, package: &str) -> bool {
        self.installer.verify(prefix, package)
    }

    pub fn generate_server_command(&self, prefix: &Path, package: &str) -> String {
        installer::server_command(prefix, package)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Parses a client name and resolves the file it keeps its servers in.
    pub fn resolve_client(
        &self,
        client: &str,
        workspace: Option<&Path>,
    ) -> Result<(ClientType, PathBuf)> {
        let client: ClientType = client.parse()?;
        let path = self.configs.config_path(client, workspace);
        Ok((client, path))
    }

    pub fn update_client_configuration(
        &self,
        client: ClientType,
        server: &str,
        prefix: &Path,
        command: String,
        workspace: Option<&Path>,
    ) -> Result<PathBuf> {
        let entry = ServerEntry {
            name: server.to_string(),
            path: prefix.to_path_buf(),
            command,
            workspace_path: workspace.map(Path::to_path_buf),
        };
        self.configs.upsert(client, &entry)
    }

    pub fn configured_entry(
        &self,
        client: ClientType,
        workspace: Option<&Path>,
        server: &str,
    ) -> Option<ServerEntry> {
        self.configs.find(client, workspace, server)
    }

    pub fn remove_from_configuration(
        &self,
        client: ClientType,
        workspace: Option<&Path>,
        server: &str,
    ) -> Result<bool> {
        self.configs.remove(client, workspace, server)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Managed environments plus, for a given client, how its config refers
    /// to them.
    pub fn installed_servers(
        &self,
        client: Option<ClientType>,
        workspace: Option<&Path>,
    ) -> Vec<InstalledServer> {
        let envs = self.environments.list_installed();
        let configured: Vec<ServerEntry> = client
            .map(|c| self.configs.list(c, workspace))
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.workspace_path.as_deref() == workspace)
            .collect();

        let mut servers: Vec<InstalledServer> = envs
            .iter()
            .map(|(name, prefix)| {
                let (status, version, description) = match self.catalog.get_server_details(name) {
                    Ok(info) => (
                        ServerStatus::Installed,
                        Some(info.version),
                        Some(info.description),
                    ),
                    Err(_) => (ServerStatus::InstalledUnknown, None, None),
                };
                let entry = configured.iter().find(|e| &e.name == name);
                let configured = client.map(|_| match entry {
                    None => ConfiguredState::No,
                    Some(entry) if entry.path == *prefix => ConfiguredState::Yes,
                    Some(_) => ConfiguredState::Mismatch {
                        expected: prefix.clone(),
                    },
                });
                InstalledServer {
                    name: name.clone(),
                    prefix: prefix.clone(),
                    status,
                    version,
                    description,
                    configured,
                }
            })
            .collect();

        for entry in configured.iter().filter(|e| !envs.contains_key(&e.name)) {
            let info = self.catalog.get_server_details(&entry.name).ok();
            servers.push(InstalledServer {
                name: entry.name.clone(),
                prefix: entry.path.clone(),
                status: ServerStatus::ConfiguredMissing,
                version: info.as_ref().map(|i| i.version.clone()),
                description: info.map(|i| i.description),
                configured: Some(ConfiguredState::Yes),
            });
        }

        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// Argument vector for `conda run` that launches an installed server.
    pub fn start_arguments(
        &self,
        server: &ServerName,
        host: &str,
        port: Option<u16>,
    ) -> Result<(PathBuf, Vec<String>)> {
        let prefix = self.server_prefix(server);
        if !self.environment_exists(server) {
            return Err(ManagerError::ServerNotInstalled(server.to_string()));
        }
        let package = self.catalog.get_package_name(server)?;
        let mut args = vec![
            "run".to_string(),
            "--prefix".to_string(),
            prefix.to_string_lossy().to_string(),
            "python".to_string(),
            "-m".to_string(),
            package,
            "--host".to_string(),
            host.to_string(),
        ];
        if let Some(port) = port {
            args.extend(["--port".to_string(), port.to_string()]);
        }
        Ok((prefix, args))
    }
}
