// SPDX-License-Identifier: Apache-2.0

//! conda-assist: Anaconda Assistant for conda.
//!
//! Installs third-party MCP servers into dedicated conda environments and
//! registers them with MCP clients, serves conda itself over MCP, and
//! explains failed conda commands.

pub mod activity_log;
pub mod assistant;
pub mod catalog;
pub mod client_config;
pub mod conda;
pub mod context;
pub mod environment;
pub mod error;
pub mod flows;
pub mod hooks;
pub mod installer;
pub mod mcp;
pub mod nl_parser;
pub mod printer;
pub mod router;
pub mod service;
pub mod services;
pub mod settings;
pub mod table;
pub mod types;
pub mod validation;
