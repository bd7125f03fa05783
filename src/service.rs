// SPDX-License-Identifier: Apache-2.0

//! Public entry point of the MCP server manager.
//!
//! Each call runs one workflow through the [`CommandRouter`] and turns the
//! finished [`ExecutionContext`] into a typed result. Callers never see the
//! context itself.

use crate::catalog::Catalog;
use crate::client_config::ClientConfigStore;
use crate::conda::{Conda, CondaCli};
use crate::context::ExecutionContext;
use crate::error::{ManagerError, Result};
use crate::router::CommandRouter;
use crate::services::Services;
use crate::settings::Settings;
use crate::types::{InstallationResult, InstalledServer, ServerInfo, ServerName};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// A fully resolved `conda run` invocation for `mcp server start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub prefix: PathBuf,
}

pub struct ManagerService {
    services: Services,
}

impl ManagerService {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Wires the real conda, the configured catalog and the user's client
    /// config files. `mcp_home` overrides `mcp.environment_path`.
    pub fn from_settings(settings: &Settings, mcp_home: Option<PathBuf>) -> Self {
        let base = mcp_home.unwrap_or_else(|| settings.environment_base());
        let conda = Conda::new(CondaCli::locate(settings.mcp.conda_executable.as_deref()));
        let catalog = Catalog::load(settings.mcp.catalog_url.as_deref());
        Self::new(Services::new(
            catalog,
            base,
            conda,
            ClientConfigStore::for_current_user(),
        ))
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    fn run(
        &self,
        mut ctx: ExecutionContext,
        route: impl FnOnce(&CommandRouter<'_>, &mut ExecutionContext),
    ) -> Result<ExecutionContext> {
        route(&CommandRouter::new(&self.services), &mut ctx);
        if let Some(failure) = ctx.take_failure() {
            return Err(failure);
        }
        if !ctx.is_complete() {
            let message = ctx
                .error_message()
                .unwrap_or("workflow did not complete")
                .to_string();
            return Err(ManagerError::Configuration(message));
        }
        tracing::debug!(run = %ctx.run_id, workflow = %ctx.workflow_name, "workflow complete");
        Ok(ctx)
    }

    pub fn list_available_servers(&self) -> Result<Vec<ServerInfo>> {
        let ctx = ExecutionContext::new("discovery", None, None, None);
        let ctx = self.run(ctx, |r, c| r.route_list(c))?;
        state(&ctx, "available_servers")
    }

    pub fn get_server_info(&self, server: &str) -> Result<ServerInfo> {
        let server = server_name(server)?;
        let ctx = ExecutionContext::new("info", Some(server.as_str()), None, None);
        let ctx = self.run(ctx, |r, c| r.route_info(c))?;
        state(&ctx, "server_info")
    }

    pub fn install(
        &self,
        server: &str,
        client: &str,
        workspace: Option<&Path>,
    ) -> Result<InstallationResult> {
        let server = server_name(server)?;
        let ctx = ExecutionContext::new(
            "install",
            Some(server.as_str()),
            Some(client),
            workspace.map(Path::to_path_buf),
        );
        let ctx = self.run(ctx, |r, c| r.route_install(c))?;
        Ok(installation_result(&ctx, &server))
    }

    /// Updates the server package; with a client the config entry is
    /// refreshed as well.
    pub fn update(
        &self,
        server: &str,
        client: Option<&str>,
        workspace: Option<&Path>,
    ) -> Result<InstallationResult> {
        let server = server_name(server)?;
        let ctx = ExecutionContext::new(
            "update",
            Some(server.as_str()),
            client,
            workspace.map(Path::to_path_buf),
        );
        let ctx = self.run(ctx, |r, c| r.route_update(c))?;
        Ok(installation_result(&ctx, &server))
    }

    pub fn uninstall(&self, server: &str, client: &str, workspace: Option<&Path>) -> Result<bool> {
        let server = server_name(server)?;
        let ctx = ExecutionContext::new(
            "uninstall",
            Some(server.as_str()),
            Some(client),
            workspace.map(Path::to_path_buf),
        );
        self.run(ctx, |r, c| r.route_uninstall(c))?;
        Ok(true)
    }

    pub fn list_installed_servers(
        &self,
        client: Option<&str>,
        workspace: Option<&Path>,
    ) -> Result<Vec<InstalledServer>> {
        let ctx = ExecutionContext::new("status", None, client, workspace.map(Path::to_path_buf));
        let ctx = self.run(ctx, |r, c| r.route_status(c))?;
        state(&ctx, "installed_servers")
    }

    pub fn start_command(
        &self,
        server: &str,
        host: &str,
        port: Option<u16>,
    ) -> Result<StartCommand> {
        let server = server_name(server)?;
        let (prefix, args) = self.services.start_arguments(&server, host, port)?;
        let program = self
            .services
            .conda
            .executable()
            .map(Path::to_path_buf)
            .ok_or_else(|| ManagerError::CondaCommand {
                command: format!("conda {}", args.join(" ")),
                return_code: -1,
                stdout: String::new(),
                stderr: "conda executable not found. Is conda installed and on PATH?".into(),
            })?;
        Ok(StartCommand { program, args, prefix })
    }
}

/// Server names become directory names under the MCP base, so they are
/// checked before anything touches the filesystem.
fn server_name(server: &str) -> Result<ServerName> {
    ServerName::new(server).map_err(|e| ManagerError::Configuration(e.to_string()))
}

fn state<T: DeserializeOwned>(ctx: &ExecutionContext, key: &str) -> Result<T> {
    let value = ctx.get_state(key).cloned().ok_or_else(|| {
        ManagerError::Configuration(format!(
            "{} workflow produced no '{}'",
            ctx.workflow_name, key
        ))
    })?;
    Ok(serde_json::from_value(value)?)
}

fn installation_result(ctx: &ExecutionContext, server: &ServerName) -> InstallationResult {
    let path = |key: &str| {
        ctx.get_state(key)
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
    };
    InstallationResult {
        success: true,
        server_name: server.to_string(),
        environment_path: path("environment_path"),
        config_path: path("config_path"),
        error_message: ctx
            .get_state("config_warning")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}
