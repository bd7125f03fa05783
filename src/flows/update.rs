// SPDX-License-Identifier: Apache-2.0

use super::{Flow, complete, enter, require_server, start, step};
use crate::context::{ExecutionContext, WorkflowPhase};
use crate::error::ManagerError;
use crate::services::Services;
use serde_json::json;

/// Updates the server package inside an existing environment.
///
/// DISCOVERY → INSTALLATION → (CONFIGURATION when a client was given) →
/// COMPLETION. Refreshing the client entry is best effort.
pub struct UpdateFlow<'a> {
    services: &'a Services,
}

impl<'a> UpdateFlow<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }
}

impl Flow for UpdateFlow<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) {
        let Some(server) = require_server(ctx) else {
            return;
        };
        let client = ctx.client_name.clone();
        let workspace = ctx.workspace_path.clone();
        start(ctx);

        if !enter(ctx, WorkflowPhase::Discovery) {
            return;
        }
        if !self.services.environment_exists(&server) {
            step::<()>(ctx, Err(ManagerError::ServerNotInstalled(server.to_string())));
            return;
        }
        let prefix = self.services.server_prefix(&server);
        ctx.set_state("environment_path", &prefix);
        let Some(package) = step(ctx, self.services.catalog.get_package_name(&server)) else {
            return;
        };
        let client_type = match client {
            Some(name) => {
                let Some((client_type, _)) =
                    step(ctx, self.services.resolve_client(&name, workspace.as_deref()))
                else {
                    return;
                };
                Some(client_type)
            }
            None => None,
        };

        if !enter(ctx, WorkflowPhase::Installation) {
            return;
        }
        if step(ctx, self.services.update_package(&prefix, &package)).is_none() {
            return;
        }
        ctx.set_state("updated_package", &package);

        if let Some(client_type) = client_type {
            if !enter(ctx, WorkflowPhase::Configuration) {
                return;
            }
            let command = self.services.generate_server_command(&prefix, &package);
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
                        error = %e,
                        "client configuration not refreshed"
                    );
                    ctx.add_to_history("config_update_failed", json!({ "error": e.to_string() }));
                    let warning = format!("Client configuration was not updated: {}", e);
                    ctx.set_state("config_warning", warning);
                }
            }
        }

        complete(ctx);
    }
}
