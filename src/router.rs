// SPDX-License-Identifier: Apache-2.0

//! Dispatches a command to its flow after putting the context in the
//! phase that command starts from.

use crate::context::{ExecutionContext, WorkflowPhase};
use crate::flows::{
    DiscoveryFlow, Flow, InfoFlow, InstallFlow, ManagementFlow, UninstallFlow, UpdateFlow,
};
use crate::services::Services;

pub struct CommandRouter<'a> {
    services: &'a Services,
}

impl<'a> CommandRouter<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }

    fn dispatch(&self, ctx: &mut ExecutionContext, phase: WorkflowPhase, flow: &dyn Flow) {
        tracing::debug!(run = %ctx.run_id, workflow = %ctx.workflow_name, "routing");
        if !ctx.set_phase(phase) {
            ctx.set_error(format!(
                "Cannot start {} from the {} phase",
                ctx.workflow_name,
                ctx.current_phase()
            ));
            return;
        }
        flow.execute(ctx);
    }

    pub fn route_list(&self, ctx: &mut ExecutionContext) {
        self.dispatch(ctx, WorkflowPhase::Discovery, &DiscoveryFlow::new(self.services));
    }

    pub fn route_info(&self, ctx: &mut ExecutionContext) {
        self.dispatch(ctx, WorkflowPhase::Discovery, &InfoFlow::new(self.services));
    }

    pub fn route_install(&self, ctx: &mut ExecutionContext) {
        self.dispatch(ctx, WorkflowPhase::Init, &InstallFlow::new(self.services));
    }

    pub fn route_update(&self, ctx: &mut ExecutionContext) {
        self.dispatch(ctx, WorkflowPhase::Init, &UpdateFlow::new(self.services));
    }

    pub fn route_uninstall(&self, ctx: &mut ExecutionContext) {
        self.dispatch(ctx, WorkflowPhase::Init, &UninstallFlow::new(self.services));
    }

    pub fn route_status(&self, ctx: &mut ExecutionContext) {
        self.dispatch(ctx, WorkflowPhase::Discovery, &ManagementFlow::new(self.services));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::fake::FakeConda;
    use crate::flows::testing::services;
    use std::sync::Arc;

    #[test]
    fn test_routes_reach_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let router = CommandRouter::new(&services);

        let mut ctx = ExecutionContext::new("list", None, None, None);
        router.route_list(&mut ctx);
        assert!(ctx.is_complete());

        let mut ctx = ExecutionContext::new("install", Some("condamcp"), Some("vscode"), None);
        router.route_install(&mut ctx);
        assert!(ctx.is_complete(), "{:?}", ctx.error_message());

        let mut ctx = ExecutionContext::new("status", None, None, None);
        router.route_status(&mut ctx);
        assert_eq!(ctx.get_state("installed_servers").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_finished_context_is_not_rerouted() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let router = CommandRouter::new(&services);

        let mut ctx = ExecutionContext::new("list", None, None, None);
        router.route_list(&mut ctx);
        router.route_install(&mut ctx);
        assert!(ctx.has_failed());
        assert!(ctx.error_message().unwrap().starts_with("Cannot start list"));
    }
}
