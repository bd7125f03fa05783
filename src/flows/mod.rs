// SPDX-License-Identifier: Apache-2.0

//! Phase-sequenced workflows.
//!
//! A flow reads its inputs from the [`ExecutionContext`], calls the
//! [`Services`](crate::services::Services) facades, and records results in
//! the context state. Failures are recorded with [`ExecutionContext::fail`]
//! and end the flow; nothing is propagated as an `Err`.

mod discovery;
mod info;
mod install;
mod management;
mod uninstall;
mod update;

pub use discovery::DiscoveryFlow;
pub use info::InfoFlow;
pub use install::InstallFlow;
pub use management::ManagementFlow;
pub use uninstall::UninstallFlow;
pub use update::UpdateFlow;

use crate::context::{ExecutionContext, WorkflowPhase};
use crate::error::{ManagerError, Result};
use crate::types::ServerName;
use serde_json::json;

pub trait Flow {
    fn execute(&self, ctx: &mut ExecutionContext);
}

/// Moves the context into `phase`, failing the workflow if the move is not allowed.
fn enter(ctx: &mut ExecutionContext, phase: WorkflowPhase) -> bool {
    if ctx.set_phase(phase) {
        return true;
    }
    if !ctx.has_failed() {
        ctx.set_error(format!("Invalid transition into {} phase", phase));
    }
    false
}

/// Unwraps a step result, failing the workflow in the current phase on error.
fn step<T>(ctx: &mut ExecutionContext, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            let context = format!("Failed during {} phase", ctx.current_phase());
            ctx.fail(&context, e);
            None
        }
    }
}

fn start(ctx: &mut ExecutionContext) {
    let details = json!({
        "workflow": ctx.workflow_name,
        "server": ctx.server_name,
        "client": ctx.client_name,
        "workspace": ctx.workspace_path,
    });
    ctx.add_to_history("workflow_start", details);
}

fn complete(ctx: &mut ExecutionContext) {
    if enter(ctx, WorkflowPhase::Completion) {
        let details = json!({ "workflow": ctx.workflow_name });
        ctx.add_to_history("workflow_complete", details);
    }
}

/// Pulls a required name out of the context or fails the workflow.
fn require(ctx: &mut ExecutionContext, value: Option<String>, what: &str) -> Option<String> {
    if value.is_none() {
        let message = format!("{} is required for the {} workflow", what, ctx.workflow_name);
        ctx.fail("Invalid request", ManagerError::Configuration(message));
    }
    value
}

/// The workflow's server name, validated before it is used as a path.
fn require_server(ctx: &mut ExecutionContext) -> Option<ServerName> {
    let value = ctx.server_name.clone();
    let name = require(ctx, value, "A server name")?;
    match ServerName::new(name) {
        Ok(server) => Some(server),
        Err(e) => {
            ctx.fail("Invalid request", ManagerError::Configuration(e.to_string()));
            None
        }
    }
}
