// SPDX-License-Identifier: Apache-2.0

use super::{Flow, complete, enter, require, require_server, start, step};
use crate::context::{ExecutionContext, WorkflowPhase};
use crate::error::ManagerError;
use crate::services::Services;
use serde_json::json;

/// Installs a catalog server into its own environment and registers it
/// with a client.
///
/// DISCOVERY → ENVIRONMENT → INSTALLATION → CONFIGURATION → COMPLETION.
/// A failed package install removes the fresh environment again. A failed
/// config write is recorded as `config_warning` and does not fail the run.
pub struct InstallFlow<'a> {
    services: &'a Services,
}

impl<'a> InstallFlow<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }
}

impl Flow for InstallFlow<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) {
        let Some(server) = require_server(ctx) else {
            return;
        };
        let client = ctx.client_name.clone();
        let Some(client) = require(ctx, client, "A client name") else {
            return;
        };
        let workspace = ctx.workspace_path.clone();
        start(ctx);

        // Discovery
        if !enter(ctx, WorkflowPhase::Discovery) {
            return;
        }
        let Some((client_type, config_path)) =
            step(ctx, self.services.resolve_client(&client, workspace.as_deref()))
        else {
            return;
        };
        let Some(info) = step(ctx, self.services.catalog.get_server_details(&server)) else {
            return;
        };
        if self.services.environment_exists(&server) {
            step::<()>(ctx, Err(ManagerError::ServerAlreadyInstalled(server.to_string())));
            return;
        }
        ctx.set_state("server_info", &info);
        ctx.set_state("client_config_path", &config_path);

        // Environment
        if !enter(ctx, WorkflowPhase::Environment) {
            return;
        }
        let Some(prefix) = step(
            ctx,
            self.services.create_environment(&server, info.channel.as_deref()),
        ) else {
            return;
        };
        ctx.set_state("environment_path", &prefix);

        // Installation
        if !enter(ctx, WorkflowPhase::Installation) {
            return;
        }
        if let Err(e) = self.services.install_package(&prefix, &info) {
            self.services.rollback_environment(&server);
            ctx.add_to_history("rollback", json!({ "removed_environment": prefix }));
            step::<()>(ctx, Err(e));
            return;
        }
        let verified = self.services.verify_installation(&prefix, &info.package_name);
        if !verified {
            tracing::warn!(
                server = %server,
                package = %info.package_name,
                "package not found in conda-meta after install"
            );
        }
        ctx.set_state("package_verified", verified);

        // Configuration
        if !enter(ctx, WorkflowPhase::Configuration) {
            return;
        }
        let command = self.services.generate_server_command(&prefix, &info.package_name);
        ctx.set_state("server_command", &command);
        match self.services.update_client_configuration(
            client_type,
            &server,
            &prefix,
            command,
            workspace.as_deref(),
        ) {
            Ok(path) => ctx.set_state("config_path", &path),
            Err(e) => {
                tracing::warn!(
                    server = %server,
                    client = %client_type,
                    error = %e,
                    "client configuration not updated"
                );
                ctx.add_to_history("config_update_failed", json!({ "error": e.to_string() }));
                let warning = format!("Client configuration was not updated: {}", e);
                ctx.set_state("config_warning", warning);
            }
        }

        complete(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::fake::FakeConda;
    use crate::flows::testing::{name, services};
    use std::sync::Arc;

    fn run(services: &Services, server: &str, client: &str) -> ExecutionContext {
        let mut ctx = ExecutionContext::new("install", Some(server), Some(client), None);
        InstallFlow::new(services).execute(&mut ctx);
        ctx
    }

    #[test]
    fn test_install_runs_all_phases() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeConda::default());
        let services = services(tmp.path(), fake.clone());

        let ctx = run(&services, "packaging-tools", "cursor");
        assert!(ctx.is_complete(), "{:?}", ctx.error_message());
        assert_eq!(ctx.get_state("package_verified").unwrap(), true);

        let phases: Vec<_> = ctx
            .history()
            .iter()
            .filter(|h| h.action == "phase_change")
            .map(|h| h.phase)
            .collect();
        assert_eq!(
            phases,
            vec![
                WorkflowPhase::Discovery,
                WorkflowPhase::Environment,
                WorkflowPhase::Installation,
                WorkflowPhase::Configuration,
                WorkflowPhase::Completion,
            ]
        );

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0][0], "create");
        assert_eq!(calls[1][0], "install");
        assert!(calls[1].contains(&"tqdm".to_string()));

        let config = tmp.path().join("home/.cursor/mcp-servers.json");
        assert!(config.exists());
    }

    #[test]
    fn test_unknown_server_fails_in_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let mut ctx = run(&services, "nope", "cursor");
        assert!(ctx.has_failed());
        assert!(ctx.error_message().unwrap().starts_with("Failed during discovery phase"));
        assert!(matches!(ctx.take_failure(), Some(ManagerError::ServerNotFound(_))));
    }

    #[test]
    fn test_unsupported_client() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let mut ctx = run(&services, "condamcp", "notepad");
        assert!(matches!(ctx.take_failure(), Some(ManagerError::ClientNotSupported(_))));
    }

    #[test]
    fn test_second_install_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        assert!(run(&services, "condamcp", "cursor").is_complete());
        let mut again = run(&services, "condamcp", "cursor");
        assert!(matches!(
            again.take_failure(),
            Some(ManagerError::ServerAlreadyInstalled(_))
        ));
    }

    #[test]
    fn test_package_failure_rolls_back_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::failing("install")));
        let mut ctx = run(&services, "condamcp", "cursor");

        assert!(ctx.error_message().unwrap().starts_with("Failed during installation phase"));
        assert!(ctx.history().iter().any(|h| h.action == "rollback"));
        assert!(!services.environment_exists(&name("condamcp")));
        assert!(matches!(
            ctx.take_failure(),
            Some(ManagerError::PackageInstallation(_))
        ));
    }

    #[test]
    fn test_config_failure_is_only_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let config = tmp.path().join("home/.cursor/mcp-servers.json");
        std::fs::create_dir_all(config.parent().unwrap()).unwrap();
        std::fs::write(&config, "{ broken").unwrap();

        let ctx = run(&services, "condamcp", "cursor");
        assert!(ctx.is_complete());
        assert!(ctx.get_state("config_warning").is_some());
        assert!(ctx.get_state("config_path").is_none());
    }

    #[test]
    fn test_missing_client_name() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let mut ctx = ExecutionContext::new("install", Some("condamcp"), None, None);
        InstallFlow::new(&services).execute(&mut ctx);
        assert!(matches!(ctx.take_failure(), Some(ManagerError::Configuration(_))));
        assert!(ctx.history().iter().all(|h| h.action != "workflow_start"));
    }
}
