// SPDX-License-Identifier: Apache-2.0

use super::{Flow, complete, enter, require_server, start, step};
use crate::context::{ExecutionContext, WorkflowPhase};
use crate::services::Services;

/// Looks up one catalog entry and stores it as `server_info`.
pub struct InfoFlow<'a> {
    services: &'a Services,
}

impl<'a> InfoFlow<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }
}

impl Flow for InfoFlow<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) {
        let Some(server) = require_server(ctx) else {
            return;
        };
        start(ctx);
        if !enter(ctx, WorkflowPhase::Discovery) {
            return;
        }
        let Some(info) = step(ctx, self.services.catalog.get_server_details(&server)) else {
            return;
        };
        ctx.set_state("server_info", &info);
        complete(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::fake::FakeConda;
    use crate::error::ManagerError;
    use crate::flows::testing::services;
    use std::sync::Arc;

    #[test]
    fn test_info_known_and_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));

        let mut ctx = ExecutionContext::new("info", Some("packaging-tools"), None, None);
        InfoFlow::new(&services).execute(&mut ctx);
        assert_eq!(ctx.get_state("server_info").unwrap()["package_name"], "tqdm");

        let mut ctx = ExecutionContext::new("info", Some("ghost"), None, None);
        InfoFlow::new(&services).execute(&mut ctx);
        assert!(matches!(ctx.take_failure(), Some(ManagerError::ServerNotFound(_))));
    }
}
