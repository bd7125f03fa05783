// SPDX-License-Identifier: Apache-2.0

use super::{Flow, complete, enter, start, step};
use crate::client_config::ClientType;
use crate::context::{ExecutionContext, WorkflowPhase};
use crate::error::ManagerError;
use crate::services::Services;

/// Reports installed servers, and their client configuration when a
/// client was named, under `installed_servers`.
pub struct ManagementFlow<'a> {
    services: &'a Services,
}

impl<'a> ManagementFlow<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }
}

impl Flow for ManagementFlow<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) {
        let client = ctx.client_name.clone();
        let workspace = ctx.workspace_path.clone();
        start(ctx);
        if !enter(ctx, WorkflowPhase::Discovery) {
            return;
        }

        if workspace.is_some() && client.is_none() {
            let e = ManagerError::Configuration("--workspace requires --client".to_string());
            step::<()>(ctx, Err(e));
            return;
        }
        let client_type = match client {
            Some(name) => match step(ctx, name.parse::<ClientType>()) {
                Some(c) => Some(c),
                None => return,
            },
            None => None,
        };

        let servers = self.services.installed_servers(client_type, workspace.as_deref());
        ctx.set_state("installed_servers", &servers);
        complete(ctx);
    }
}
