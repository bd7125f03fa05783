// SPDX-License-Identifier: Apache-2.0

//! Turns short English requests into conda tool calls.
//!
//! Rules are tried in table order and the first pattern that matches wins,
//! so "show all environments" lists rather than describes. Matching is
//! case-insensitive; extracted names are lowercase.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// A tool name plus its JSON arguments, as the MCP tools expect them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool_name: &'static str,
    pub parameters: Map<String, Value>,
}

impl ToolCall {
    fn new(tool_name: &'static str) -> Self {
        Self {
            tool_name,
            parameters: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn packages(&self) -> Vec<String> {
        self.parameters
            .get("packages")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    /// The conda command line that does the same thing.
    pub fn to_conda_args(&self) -> Vec<String> {
        let name = |key| self.str_param(key).unwrap_or_default().to_string();
        let mut args: Vec<String> = match self.tool_name {
            "list_environment" => vec!["env".into(), "list".into()],
            "show_environment_details" => vec!["list".into(), "-n".into(), name("env_name")],
            "remove_environment" => vec!["env".into(), "remove".into(), "-n".into(), name("name")],
            "create_environment" => {
                let mut args = vec!["create".into(), "-n".into(), name("env_name")];
                if let Some(version) = self.str_param("python_version") {
                    args.push(format!("python={}", version));
                }
                args
            }
            "update_environment" => vec!["install".into(), "-n".into(), name("env_name")],
            "search_packages" => vec!["search".into(), name("package_name")],
            _ => Vec::new(),
        };
        args.extend(self.packages());
        args
    }

    pub fn command_line(&self) -> String {
        format!("conda {}", self.to_conda_args().join(" "))
    }
}

struct Rule {
    pattern: Regex,
    extract: fn(&Captures<'_>, &str) -> ToolCall,
}

fn rule(pattern: &str, extract: fn(&Captures<'_>, &str) -> ToolCall) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("prompt pattern should compile"),
        extract,
    }
}

static SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*,\s*(?:and\s+)?|\s+and\s+").expect("separator regex should compile")
});
static PACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.\-=<>!]*$").expect("package regex should compile"));
static NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:named|called)\s+([a-z0-9][a-z0-9_.-]*)").expect("name regex should compile")
});
static PYTHON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bpython\s*(?:version\s+|=+\s*)?(\d+(?:\.\d+)*)")
        .expect("python regex should compile")
});
static WITH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bwith\s+(.+)$").expect("with regex should compile"));

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            r"^(?:list|show|display|what are)\b.*\b(?:environments|envs)\b",
            |_, _| ToolCall::new("list_environment"),
        ),
        rule(
            r"(?x)^(?:show|display|get)\b.*?\b(?:details|info|information)
              \s+(?:for|of|about)\s+(?:the\s+)?(?:conda\s+)?(?:environment\s+|env\s+)?
              ([a-z0-9][a-z0-9_.-]*)",
            details,
        ),
        rule(
            r"^describe\s+(?:the\s+)?(?:conda\s+)?(?:environment\s+|env\s+)?([a-z0-9][a-z0-9_.-]*)",
            details,
        ),
        rule(
            r"(?x)^(?:remove|delete|destroy)\s+(?:the\s+)?(?:conda\s+)?(?:environment|env)
              \s+(?:named\s+|called\s+)?([a-z0-9][a-z0-9_.-]*)",
            |caps, _| ToolCall::new("remove_environment").with("name", json!(&caps[1])),
        ),
        rule(r"^(?:please\s+)?(?:create|make)\b.*\b(?:environment|env)\b", create),
        rule(
            r"(?x)^(?:add|install)\s+(.+?)\s+(?:to|in|into)\s+(?:the\s+)?(?:conda\s+)?
              (?:environment\s+|env\s+)?([a-z0-9][a-z0-9_.-]*)$",
            |caps, _| {
                ToolCall::new("update_environment")
                    .with("env_name", json!(&caps[2]))
                    .with("packages", json!(split_packages(&caps[1])))
            },
        ),
        rule(
            r"(?x)^(?:search|find|look)\s+(?:for\s+)?(?:the\s+|a\s+)?(?:package\s+)?
              ([a-z0-9][a-z0-9_.-]*)",
            |caps, _| ToolCall::new("search_packages").with("package_name", json!(&caps[1])),
        ),
    ]
});

fn details(caps: &Captures<'_>, _: &str) -> ToolCall {
    ToolCall::new("show_environment_details").with("env_name", json!(&caps[1]))
}

fn create(_: &Captures<'_>, prompt: &str) -> ToolCall {
    let name = NAMED
        .captures(prompt)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "myenv".to_string());
    let mut call = ToolCall::new("create_environment").with("env_name", json!(name));
    if let Some(version) = PYTHON.captures(prompt) {
        call = call.with("python_version", json!(&version[1]));
    }
    let packages = WITH
        .captures(prompt)
        .map(|c| split_packages(&c[1]))
        .unwrap_or_default();
    if !packages.is_empty() {
        call = call.with("packages", json!(packages));
    }
    call
}

/// "numpy, pandas, and matplotlib" → three names. Python itself is
/// handled through `python_version`, and words that are not package specs
/// are skipped.
fn split_packages(list: &str) -> Vec<String> {
    SEPARATOR
        .split(list.trim())
        .map(|item| item.trim().trim_start_matches("and ").trim())
        .filter(|item| !item.is_empty() && !item.starts_with("python"))
        .filter(|item| PACKAGE.is_match(item))
        .map(str::to_string)
        .collect()
}

/// Infers a tool call from `prompt`, or `None` when no rule applies.
pub fn parse_prompt(prompt: &str) -> Option<ToolCall> {
    let prompt = prompt.trim().to_lowercase();
    RULES.iter().find_map(|rule| {
        rule.pattern
            .captures(&prompt)
            .map(|caps| (rule.extract)(&caps, &prompt))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(prompt: &str) -> ToolCall {
        parse_prompt(prompt).unwrap_or_else(|| panic!("{prompt:?} should parse"))
    }

    #[test]
    fn test_create_environment_basic() {
        let call = parse("create a conda environment with python 3.8 and numpy");
        assert_eq!(call.tool_name, "create_environment");
        assert_eq!(call.str_param("env_name"), Some("myenv"));
        assert_eq!(call.str_param("python_version"), Some("3.8"));
        assert_eq!(call.packages(), vec!["numpy"]);
        assert_eq!(call.command_line(), "conda create -n myenv python=3.8 numpy");
    }

    #[test]
    fn test_create_environment_named() {
        let call = parse("create a conda environment named myproject with pandas");
        assert_eq!(call.str_param("env_name"), Some("myproject"));
        assert!(call.packages().contains(&"pandas".to_string()));
    }

    #[test]
    fn test_list_environments() {
        for prompt in [
            "list all my conda environments",
            "show all conda environments",
            "what are my conda environments",
        ] {
            let call = parse(prompt);
            assert_eq!(call.tool_name, "list_environment", "{prompt}");
            assert!(call.parameters.is_empty());
        }
    }

    #[test]
    fn test_show_environment_details() {
        let call = parse("show details for environment myenv");
        assert_eq!(call.tool_name, "show_environment_details");
        assert_eq!(call.str_param("env_name"), Some("myenv"));
        assert_eq!(parse("describe env data-2").str_param("env_name"), Some("data-2"));
    }

    #[test]
    fn test_update_environment() {
        let call = parse("add pandas to myenv");
        assert_eq!(call.tool_name, "update_environment");
        assert_eq!(call.str_param("env_name"), Some("myenv"));
        assert_eq!(call.packages(), vec!["pandas"]);
        assert_eq!(call.command_line(), "conda install -n myenv pandas");
    }

    #[test]
    fn test_remove_environment() {
        let call = parse("remove environment oldenv");
        assert_eq!(call.tool_name, "remove_environment");
        assert_eq!(call.str_param("name"), Some("oldenv"));
    }

    #[test]
    fn test_search_packages() {
        let call = parse("search for scikit-learn");
        assert_eq!(call.tool_name, "search_packages");
        assert_eq!(call.str_param("package_name"), Some("scikit-learn"));
    }

    #[test]
    fn test_unsupported_prompt() {
        assert!(parse_prompt("do something completely unrelated").is_none());
        assert!(parse_prompt("").is_none());
    }

    #[test]
    fn test_case_insensitive() {
        let call = parse("CREATE A CONDA ENVIRONMENT WITH PYTHON 3.9");
        assert_eq!(call.tool_name, "create_environment");
        assert_eq!(call.str_param("python_version"), Some("3.9"));
        assert!(call.packages().is_empty());
    }

    #[test]
    fn test_multiple_packages() {
        let call = parse("create environment with numpy, pandas, and matplotlib");
        assert_eq!(call.packages(), vec!["numpy", "pandas", "matplotlib"]);
    }
}
