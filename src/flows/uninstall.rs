// SPDX-License-Identifier: Apache-2.0

use super::{Flow, complete, enter, require, require_server, start, step};
use crate::context::{ExecutionContext, WorkflowPhase};
use crate::error::ManagerError;
use crate::services::Services;
use serde_json::json;

/// Removes a server's client entry and then its environment.
///
/// DISCOVERY → INSTALLATION → COMPLETION. Teardown runs in the installation
/// phase because phases never move backwards. The config entry goes first
/// so a client is never left pointing at a deleted environment.
pub struct UninstallFlow<'a> {
    services: &'a Services,
}

impl<'a> UninstallFlow<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }
}

impl Flow for UninstallFlow<'_> {
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

        if !enter(ctx, WorkflowPhase::Discovery) {
            return;
        }
        let Some((client_type, _)) =
            step(ctx, self.services.resolve_client(&client, workspace.as_deref()))
        else {
            return;
        };
        let environment_found = self.services.environment_exists(&server);
        let config_found = self
            .services
            .configured_entry(client_type, workspace.as_deref(), &server)
            .is_some();
        if !environment_found && !config_found {
            step::<()>(ctx, Err(ManagerError::ServerNotInstalled(server.to_string())));
            return;
        }
        ctx.set_state("environment_found", environment_found);
        ctx.set_state("config_found", config_found);

        if !enter(ctx, WorkflowPhase::Installation) {
            return;
        }
        let mut config_removed = false;
        if config_found {
            match self
                .services
                .remove_from_configuration(client_type, workspace.as_deref(), &server)
            {
                Ok(removed) => config_removed = removed,
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "client entry not removed");
                    ctx.add_to_history("config_remove_failed", json!({ "error": e.to_string() }));
                    let warning = format!("Client configuration was not updated: {}", e);
                    ctx.set_state("config_warning", warning);
                }
            }
        }
        ctx.set_state("config_removed", config_removed);

        let mut environment_removed = false;
        if environment_found {
            match self.services.remove_environment(&server) {
                Ok(()) => environment_removed = true,
                Err(e) if config_removed => {
                    let partial = ManagerError::PartialUninstall {
                        server: server.to_string(),
                        reason: e.to_string(),
                    };
                    step::<()>(ctx, Err(partial));
                    return;
                }
                Err(e) => {
                    step::<()>(ctx, Err(e));
                    return;
                }
            }
        }
        ctx.set_state("environment_removed", environment_removed);

        if !config_removed && !environment_removed {
            step::<()>(ctx, Err(ManagerError::ServerNotInstalled(server.to_string())));
            return;
        }

        complete(ctx);
    }
}
