// SPDX-License-Identifier: Apache-2.0

//! Per-invocation workflow state.
//!
//! An [`ExecutionContext`] is created for one install/update/uninstall/...
//! request, threaded through the router and a flow, and dropped once the
//! caller has read the summary. Phases only move forward; `Error` can be
//! entered from anywhere and is terminal.

use crate::error::ManagerError;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowPhase {
    Init,
    Discovery,
    Environment,
    Installation,
    Configuration,
    Completion,
    Error,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Discovery => "discovery",
            Self::Environment => "environment",
            Self::Installation => "installation",
            Self::Configuration => "configuration",
            Self::Completion => "completion",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub action: String,
    pub phase: WorkflowPhase,
    pub details: Value,
}

/// What a caller gets back from a finished workflow.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub workflow: String,
    pub server: Option<String>,
    pub client: Option<String>,
    pub workspace: Option<PathBuf>,
    pub success: bool,
    pub error: Option<String>,
    pub state: BTreeMap<String, Value>,
}

#[derive(Debug)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub workflow_name: String,
    pub server_name: Option<String>,
    pub client_name: Option<String>,
    pub workspace_path: Option<PathBuf>,
    current_phase: WorkflowPhase,
    error_message: Option<String>,
    failure: Option<ManagerError>,
    state: BTreeMap<String, Value>,
    history: Vec<HistoryEntry>,
}

impl ExecutionContext {
    pub fn new(
        workflow_name: impl Into<String>,
        server_name: Option<&str>,
        client_name: Option<&str>,
        workspace_path: Option<PathBuf>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            server_name: server_name.map(str::to_string),
            client_name: client_name.map(str::to_string),
            workspace_path,
            current_phase: WorkflowPhase::Init,
            error_message: None,
            failure: None,
            state: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn current_phase(&self) -> WorkflowPhase {
        self.current_phase
    }

    /// Advances to `phase`.
    ///
    /// Returns `false` (and records a `phase_rejected` entry) when the move
    /// would go backwards or leave the terminal `Error` phase. Re-entering the
    /// current phase is allowed and recorded.
    pub fn set_phase(&mut self, phase: WorkflowPhase) -> bool {
        let from = self.current_phase;
        if from == WorkflowPhase::Error || phase < from {
            tracing::warn!(run = %self.run_id, %from, to = %phase, "rejected phase transition");
            self.add_to_history("phase_rejected", json!({ "from": from, "to": phase }));
            return false;
        }
        self.current_phase = phase;
        tracing::debug!(run = %self.run_id, workflow = %self.workflow_name, %phase, "phase");
        self.add_to_history("phase_change", json!({ "new_phase": phase }));
        true
    }

    /// Records a failure message and moves to the terminal `Error` phase.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(run = %self.run_id, error = %message, "workflow error");
        self.add_to_history("error", json!({ "message": message, "phase": self.current_phase }));
        self.current_phase = WorkflowPhase::Error;
        self.error_message = Some(message);
    }

    /// Like [`set_error`](Self::set_error), keeping the typed error for the caller.
    pub fn fail(&mut self, context: &str, error: ManagerError) {
        self.set_error(format!("{}: {}", context, error));
        self.failure = Some(error);
    }

    /// The typed error recorded by [`fail`](Self::fail), if any.
    pub fn take_failure(&mut self) -> Option<ManagerError> {
        self.failure.take()
    }

    pub fn add_to_history(&mut self, action: &str, details: Value) {
        self.history.push(HistoryEntry {
            action: action.to_string(),
            phase: self.current_phase,
            details,
        });
    }

    pub fn set_state(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.add_to_history("state_change", json!({ "key": key, "value": value }));
        self.state.insert(key.to_string(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.current_phase == WorkflowPhase::Completion
    }

    pub fn has_failed(&self) -> bool {
        self.current_phase == WorkflowPhase::Error
    }

    pub fn get_result_summary(&self) -> ResultSummary {
        ResultSummary {
            workflow: self.workflow_name.clone(),
            server: self.server_name.clone(),
            client: self.client_name.clone(),
            workspace: self.workspace_path.clone(),
            success: self.is_complete(),
            error: self.error_message.clone(),
            state: self.state.clone(),
        }
    }
}
