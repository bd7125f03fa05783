// SPDX-License-Identifier: Apache-2.0

use super::{Flow, complete, enter, start};
use crate::context::{ExecutionContext, WorkflowPhase};
use crate::services::Services;

/// Lists every server in the catalog under `available_servers`.
pub struct DiscoveryFlow<'a> {
    services: &'a Services,
}

impl<'a> DiscoveryFlow<'a> {
    pub fn new(services: &'a Services) -> Self {
        Self { services }
    }
}

impl Flow for DiscoveryFlow<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) {
        start(ctx);
        if !enter(ctx, WorkflowPhase::Discovery) {
            return;
        }
        let servers = self.services.catalog.list_servers();
        ctx.set_state("available_servers", &servers);
        complete(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::fake::FakeConda;
    use crate::flows::testing::services;
    use crate::types::ServerInfo;
    use std::sync::Arc;

    #[test]
    fn test_lists_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let services = services(tmp.path(), Arc::new(FakeConda::default()));
        let mut ctx = ExecutionContext::new("list", None, None, None);
        DiscoveryFlow::new(&services).execute(&mut ctx);

        assert!(ctx.is_complete());
        let servers: Vec<ServerInfo> =
            serde_json::from_value(ctx.get_state("available_servers").unwrap().clone()).unwrap();
        assert!(servers.iter().any(|s| s.name.as_str() == "condamcp"));
    }
}
