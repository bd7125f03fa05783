// SPDX-License-Identifier: Apache-2.0

//! Model Context Protocol (MCP) server exposing conda to AI clients.
//!
//! Built on the rmcp SDK over stdio. Every tool returns text: JSON for data,
//! a sentence for mutations, and `Error: ...` when conda or validation
//! fails. Mutations are written to the activity log.

use crate::activity_log::log_activity;
use crate::catalog::Catalog;
use crate::conda::{Conda, PackageRecord};
use crate::nl_parser;
use crate::validation::{validate_env_name, validate_package_spec, validate_python_version};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_router,
    transport::stdio,
};
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct CreateEnvironmentParams {
    #[schemars(description = "Name of the environment")]
    pub env_name: String,
    #[schemars(description = "Python version (e.g., 3.12)")]
    pub python_version: Option<String>,
    #[schemars(description = "Packages to install (e.g., numpy, pandas>=2)")]
    pub packages: Option<Vec<String>>,
    #[schemars(description = "Create at this path instead of the default envs directory")]
    pub prefix: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct UpdateEnvironmentParams {
    #[schemars(description = "Packages to install or update")]
    pub packages: Vec<String>,
    #[schemars(description = "Name of the environment")]
    pub env_name: Option<String>,
    #[schemars(description = "Path of the environment; takes precedence over env_name")]
    pub prefix: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct EnvironmentDetailsParams {
    #[schemars(description = "Name of the environment ('base' for the root environment)")]
    pub env_name: Option<String>,
    #[schemars(description = "Path of the environment; takes precedence over env_name")]
    pub prefix: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct RemoveEnvironmentParams {
    #[schemars(description = "Name of the environment to remove")]
    pub name: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct SearchPackagesParams {
    #[schemars(description = "Package name or partial name to search for")]
    pub package_name: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct InterpretRequestParams {
    #[schemars(
        description = "Plain-English request, e.g. 'create an environment named ml with numpy'"
    )]
    pub prompt: String,
}

fn error(e: impl std::fmt::Display) -> String {
    format!("Error: {}", e)
}

fn check_packages(packages: &[String]) -> Result<(), String> {
    packages.iter().try_for_each(|p| validate_package_spec(p))
}

#[derive(Clone)]
pub struct CondaMcpServer {
    conda: Conda,
    catalog: Catalog,
    tool_router: ToolRouter<Self>,
}

impl CondaMcpServer {
    pub fn new(conda: Conda, catalog: Catalog) -> Self {
        Self {
            conda,
            catalog,
            tool_router: Self::tool_router(),
        }
    }

    fn details(&self, env_name: Option<&str>, prefix: Option<&str>) -> Result<String, String> {
        let packages: Vec<PackageRecord> = match (prefix, env_name) {
            (Some(prefix), _) => self.conda.list_prefix(&PathBuf::from(prefix)),
            (None, Some(name)) => {
                validate_env_name(name)?;
                self.conda.list_named(name)
            }
            (None, None) => return Err("Either env_name or prefix must be provided.".to_string()),
        }
        .map_err(|e| e.to_string())?;

        let python_version = packages
            .iter()
            .find(|p| p.name == "python")
            .map(|p| p.version.clone())
            .unwrap_or_default();
        let channels = self.conda.channels().unwrap_or_default();
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        let doc = json!({
            "packages": names,
            "python_version": python_version,
            "channels": channels,
        });
        serde_json::to_string_pretty(&doc).map_err(|e| e.to_string())
    }
}

#[tool_router]
impl CondaMcpServer {
    #[tool(description = "List all known conda environments with their names and paths")]
    fn list_environment(&self) -> String {
        match self.conda.environments() {
            Ok(envs) => {
                let rows: Vec<_> = envs
                    .iter()
                    .map(|(name, path)| json!({ "name": name, "path": path }))
                    .collect();
                serde_json::to_string_pretty(&rows).unwrap_or_else(error)
            }
            Err(e) => error(e),
        }
    }

    #[tool(
        description = "Create a conda environment, optionally with a Python version and packages"
    )]
    fn create_environment(
        &self,
        Parameters(params): Parameters<CreateEnvironmentParams>,
    ) -> String {
        let packages = params.packages.unwrap_or_default();
        let checked = validate_env_name(&params.env_name)
            .and_then(|_| check_packages(&packages))
            .and_then(|_| params.python_version.as_deref().map_or(Ok(()), validate_python_version));
        if let Err(e) = checked {
            return error(e);
        }

        let result = match &params.prefix {
            Some(prefix) => {
                let mut specs: Vec<String> = params
                    .python_version
                    .iter()
                    .map(|v| format!("python={}", v))
                    .collect();
                specs.extend(packages.iter().cloned());
                self.conda
                    .create_prefix(&PathBuf::from(prefix), &specs, None)
                    .map(|_| prefix.clone())
            }
            None => self
                .conda
                .create_named(&params.env_name, params.python_version.as_deref(), &packages)
                .map(|value| {
                    value
                        .get("prefix")
                        .and_then(|p| p.as_str())
                        .unwrap_or(&params.env_name)
                        .to_string()
                }),
        };
        match result {
            Ok(location) => {
                let detail = format!("{} {}", params.env_name, packages.join(" "));
                log_activity("mcp", "create_environment", &detail);
                format!("Created environment '{}' at {}", params.env_name, location)
            }
            Err(e) => error(e),
        }
    }

    #[tool(description = "Install or update packages in an existing conda environment")]
    fn update_environment(
        &self,
        Parameters(params): Parameters<UpdateEnvironmentParams>,
    ) -> String {
        if params.packages.is_empty() {
            return error("No packages given");
        }
        if let Err(e) = check_packages(&params.packages) {
            return error(e);
        }
        let (target, result) = match (&params.prefix, &params.env_name) {
            (Some(prefix), _) => {
                let path = PathBuf::from(prefix);
                if !path.exists() {
                    return error(format!("Environment does not exist: {}", prefix));
                }
                (prefix.clone(), self.conda.install_prefix(&path, &params.packages, None))
            }
            (None, Some(name)) => {
                if let Err(e) = validate_env_name(name) {
                    return error(e);
                }
                (name.clone(), self.conda.install_named(name, &params.packages))
            }
            (None, None) => return error("Either env_name or prefix must be provided."),
        };
        match result {
            Ok(_) => {
                let detail = format!("{} {}", target, params.packages.join(" "));
                log_activity("mcp", "update_environment", &detail);
                format!("Updated environment '{}' with {}", target, params.packages.join(", "))
            }
            Err(e) => error(e),
        }
    }

    #[tool(
        description = "Show installed packages, Python version and channels of a conda environment"
    )]
    fn show_environment_details(
        &self,
        Parameters(params): Parameters<EnvironmentDetailsParams>,
    ) -> String {
        self.details(params.env_name.as_deref(), params.prefix.as_deref())
            .unwrap_or_else(error)
    }

    #[tool(description = "Remove a conda environment and everything installed in it")]
    fn remove_environment(
        &self,
        Parameters(params): Parameters<RemoveEnvironmentParams>,
    ) -> String {
        if let Err(e) = validate_env_name(&params.name) {
            return error(e);
        }
        if params.name == "base" {
            return error("The base environment cannot be removed");
        }
        match self.conda.remove_named(&params.name) {
            Ok(_) => {
                log_activity("mcp", "remove_environment", &params.name);
                format!("Removed environment '{}'", params.name)
            }
            Err(e) => error(e),
        }
    }

    #[tool(description = "Search the configured conda channels for a package")]
    fn search_packages(&self, Parameters(params): Parameters<SearchPackagesParams>) -> String {
        match self.conda.search(params.package_name.trim()) {
            Ok(found) => serde_json::to_string_pretty(&found).unwrap_or_else(error),
            Err(e) => error(e),
        }
    }

    #[tool(description = "Translate a plain-English request into a tool call without running it")]
    fn interpret_request(&self, Parameters(params): Parameters<InterpretRequestParams>) -> String {
        match nl_parser::parse_prompt(&params.prompt) {
            Some(call) => {
                let doc = json!({
                    "tool_name": call.tool_name,
                    "parameters": call.parameters,
                    "conda_command": call.command_line(),
                });
                serde_json::to_string_pretty(&doc).unwrap_or_else(error)
            }
            None => "No matching tool for this request.".to_string(),
        }
    }

    #[tool(description = "List MCP servers that conda-assist can install")]
    fn list_mcp_servers(&self) -> String {
        serde_json::to_string_pretty(&self.catalog.list_servers()).unwrap_or_else(error)
    }
}

#[rmcp::tool_handler]
impl ServerHandler for CondaMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "conda-assist - create, inspect, update and remove conda environments \
                 and search packages"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serves the conda tools on stdin/stdout until the client disconnects.
pub async fn run_server(conda: Conda, catalog: Catalog) -> Result<(), Box<dyn std::error::Error>> {
    use rmcp::serve_server;

    tracing::info!(version = env!("CONDA_ASSIST_VERSION"), "MCP server starting");

    let server = CondaMcpServer::new(conda, catalog);
    let service = serve_server(server, stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server failed to start"))?;

    service.waiting().await?;
    Ok(())
}
