// SPDX-License-Identifier: Apache-2.0

//! Thin wrapper around the `conda` executable.
//!
//! Everything goes through [`CondaRunner`], so the manager can be exercised
//! without a real conda installation. Calls made for the manager always
//! pass `--json` and parse stdout starting at the first `{` or `[`, which
//! skips any banner text conda prints first.

use crate::error::{ManagerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Captured result of one conda invocation.
#[derive(Debug, Clone, Default)]
pub struct CondaOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Executes conda with a full argument list and waits for it to finish.
///
/// Implementations return `Err` only when conda could not be launched at
/// all; a non-zero exit is reported through [`CondaOutput::status`].
pub trait CondaRunner: Send + Sync {
    fn execute(&self, args: &[String]) -> Result<CondaOutput>;

    /// Runs conda for a user at a terminal: stdin and stdout stay attached
    /// and only stderr is captured.
    fn passthrough(&self, args: &[String]) -> Result<CondaOutput> {
        self.execute(args)
    }

    /// Path of the executable, when there is one.
    fn executable(&self) -> Option<&Path> {
        None
    }
}

/// The real conda, found through settings, `CONDA_EXE` or `PATH`.
#[derive(Debug, Clone)]
pub struct CondaCli {
    exe: Option<PathBuf>,
}

impl CondaCli {
    pub fn locate(configured: Option<&Path>) -> Self {
        let exe = configured
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("CONDA_EXE").map(PathBuf::from))
            .or_else(|| which::which("conda").ok());
        tracing::debug!(exe = ?exe, "resolved conda executable");
        Self { exe }
    }

    fn run(&self, args: &[String], attached: bool) -> Result<CondaOutput> {
        let command_line = format!("conda {}", args.join(" "));
        let launch_error = |stderr: String| ManagerError::CondaCommand {
            command: command_line.clone(),
            return_code: -1,
            stdout: String::new(),
            stderr,
        };
        let Some(exe) = &self.exe else {
            return Err(launch_error(
                "conda executable not found. Is conda installed and on PATH?".into(),
            ));
        };

        tracing::debug!(command = %command_line, attached, "running conda");
        let mut command = Command::new(exe);
        command.args(args);
        if attached {
            command.stdin(Stdio::inherit()).stdout(Stdio::inherit());
        }
        let output = command.output().map_err(|e| launch_error(e.to_string()))?;

        Ok(CondaOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl CondaRunner for CondaCli {
    fn execute(&self, args: &[String]) -> Result<CondaOutput> {
        self.run(args, false)
    }

    fn passthrough(&self, args: &[String]) -> Result<CondaOutput> {
        self.run(args, true)
    }

    fn executable(&self) -> Option<&Path> {
        self.exe.as_deref()
    }
}

/// One installed package as reported by `conda list --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub channel: String,
}

/// Typed conda operations on top of a runner.
#[derive(Clone)]
pub struct Conda {
    runner: Arc<dyn CondaRunner>,
}

impl Conda {
    pub fn new(runner: impl CondaRunner + 'static) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    pub fn executable(&self) -> Option<&Path> {
        self.runner.executable()
    }

    /// Runs conda in JSON mode and returns the parsed document.
    pub fn run_json(&self, args: &[&str]) -> Result<Value> {
        let mut args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if !args.iter().any(|a| a == "--json") {
            args.push("--json".to_string());
        }
        let command = format!("conda {}", args.join(" "));
        let output = self.runner.execute(&args)?;

        if output.status != 0 {
            return Err(ManagerError::CondaCommand {
                command,
                return_code: output.status,
                stderr: failure_detail(&output),
                stdout: output.stdout,
            });
        }
        parse_json_output(&output.stdout).ok_or_else(|| ManagerError::CondaCommand {
            command,
            return_code: output.status,
            stderr: "could not parse JSON output".to_string(),
            stdout: output.stdout,
        })
    }

    // -------------------------------------------------------------------------
    // Prefix-based operations (managed MCP server environments)
    // -------------------------------------------------------------------------

    pub fn create_prefix(
        &self,
        prefix: &Path,
        packages: &[String],
        channel: Option<&str>,
    ) -> Result<Value> {
        let prefix = prefix.to_string_lossy();
        let mut args = vec!["create", "--prefix", &*prefix, "--yes", "--json"];
        if let Some(channel) = channel {
            args.extend(["-c", channel]);
        }
        if packages.is_empty() {
            args.push("python");
        } else {
            args.extend(packages.iter().map(String::as_str));
        }
        self.run_json(&args)
    }

    pub fn remove_prefix(&self, prefix: &Path) -> Result<Value> {
        let prefix = prefix.to_string_lossy();
        self.run_json(&["remove", "--prefix", &*prefix, "--all", "--yes", "--json"])
    }

    pub fn install_prefix(
        &self,
        prefix: &Path,
        packages: &[String],
        channel: Option<&str>,
    ) -> Result<Value> {
        let prefix = prefix.to_string_lossy();
        let mut args = vec!["install", "--prefix", &*prefix, "--yes", "--json"];
        if let Some(channel) = channel {
            args.extend(["-c", channel]);
        }
        args.extend(packages.iter().map(String::as_str));
        self.run_json(&args)
    }

    /// Updates `packages`, or everything in the prefix when the list is empty.
    pub fn update_prefix(&self, prefix: &Path, packages: &[String]) -> Result<Value> {
        let prefix = prefix.to_string_lossy();
        let mut args = vec!["update", "--prefix", &*prefix, "--yes", "--json"];
        if packages.is_empty() {
            args.push("--all");
        } else {
            args.extend(packages.iter().map(String::as_str));
        }
        self.run_json(&args)
    }

    pub fn list_prefix(&self, prefix: &Path) -> Result<Vec<PackageRecord>> {
        let prefix = prefix.to_string_lossy();
        let value = self.run_json(&["list", "--prefix", &*prefix, "--json"])?;
        Ok(serde_json::from_value(value)?)
    }

    // -------------------------------------------------------------------------
    // Name-based operations (user environments, exposed over MCP)
    // -------------------------------------------------------------------------

    pub fn info(&self) -> Result<Value> {
        self.run_json(&["info", "--json"])
    }

    /// Every environment conda knows about, as `(name, prefix)`.
    pub fn environments(&self) -> Result<Vec<(String, PathBuf)>> {
        let info = self.info()?;
        let root = info.get("root_prefix").and_then(Value::as_str).map(PathBuf::from);
        let mut envs: Vec<(String, PathBuf)> = info
            .get("envs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|p| {
                let path = PathBuf::from(p);
                let name = if root.as_deref() == Some(path.as_path()) {
                    "base".to_string()
                } else {
                    path.file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| p.to_string())
                };
                (name, path)
            })
            .collect();
        envs.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(envs)
    }

    pub fn create_named(
        &self,
        name: &str,
        python_version: Option<&str>,
        packages: &[String],
    ) -> Result<Value> {
        let python = python_version.map(|v| format!("python={}", v));
        let mut args = vec!["create", "-n", name, "--yes", "--json"];
        args.extend(python.as_deref());
        args.extend(packages.iter().map(String::as_str));
        if python.is_none() && packages.is_empty() {
            args.push("python");
        }
        self.run_json(&args)
    }

    pub fn install_named(&self, name: &str, packages: &[String]) -> Result<Value> {
        let mut args = vec!["install", "-n", name, "--yes", "--json"];
        args.extend(packages.iter().map(String::as_str));
        self.run_json(&args)
    }

    pub fn remove_named(&self, name: &str) -> Result<Value> {
        self.run_json(&["remove", "-n", name, "--all", "--yes", "--json"])
    }

    pub fn list_named(&self, name: &str) -> Result<Vec<PackageRecord>> {
        let value = self.run_json(&["list", "-n", name, "--json"])?;
        Ok(serde_json::from_value(value)?)
    }

    /// `conda search` results keyed by package name.
    pub fn search(&self, query: &str) -> Result<Value> {
        self.run_json(&["search", query, "--json"])
    }

    /// Channels from the user's conda configuration.
    pub fn channels(&self) -> Result<Vec<String>> {
        let value = self.run_json(&["config", "--show", "channels", "--json"])?;
        Ok(value
            .get("channels")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect())
    }
}

/// Parses JSON from conda's stdout, skipping anything before the document.
pub fn parse_json_output(stdout: &str) -> Option<Value> {
    let start = stdout.find(['{', '['])?;
    serde_json::from_str(&stdout[start..]).ok()
}

/// Conda reports `--json` failures on stdout; prefer its message over an empty stderr.
fn failure_detail(output: &CondaOutput) -> String {
    if !output.stderr.trim().is_empty() {
        return output.stderr.trim().to_string();
    }
    parse_json_output(&output.stdout)
        .and_then(|v| v.get("message").or_else(|| v.get("error")).cloned())
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

// =============================================================================
// Test double
// =============================================================================


#[cfg(test)]
mod tests {
    use super::fake::FakeConda;
    use super::*;

    #[test]
    fn test_parse_json_skips_banner() {
        let value = parse_json_output("Collecting package metadata\n{\"success\": true}").unwrap();
        assert_eq!(value["success"], true);
        assert!(parse_json_output("no json here").is_none());
        assert!(parse_json_output("[1, 2]").unwrap().is_array());
    }

    #[test]
    fn test_run_json_appends_flag() {
        let fake = Arc::new(FakeConda::default());
        let conda = Conda::new(fake.clone());
        conda.run_json(&["info"]).unwrap();
        assert_eq!(fake.calls.lock().unwrap()[0], vec!["info", "--json"]);
    }

    #[test]
    fn test_failure_becomes_conda_command_error() {
        let conda = Conda::new(FakeConda::failing("install"));
        let err = conda
            .install_prefix(Path::new("/tmp/x"), &["numpy".into()], None)
            .unwrap_err();
        match err {
            ManagerError::CondaCommand { command, return_code, stderr, .. } => {
                assert!(command.starts_with("conda install --prefix /tmp/x --yes --json"));
                assert_eq!(return_code, 1);
                assert!(stderr.contains("simulated install failure"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_create_defaults_to_python_and_adds_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeConda::default());
        let conda = Conda::new(fake.clone());
        let prefix = tmp.path().join("srv");
        conda.create_prefix(&prefix, &[], Some("conda-forge")).unwrap();

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls[0][..2], ["create".to_string(), "--prefix".to_string()]);
        assert!(calls[0].ends_with(&["-c".into(), "conda-forge".into(), "python".into()]));
        assert!(prefix.join("conda-meta").is_dir());
    }

    #[test]
    fn test_update_without_packages_updates_all() {
        let fake = Arc::new(FakeConda::default());
        let conda = Conda::new(fake.clone());
        conda.update_prefix(Path::new("/tmp/x"), &[]).unwrap();
        assert!(fake.calls.lock().unwrap()[0].contains(&"--all".to_string()));
    }

    #[test]
    fn test_environments_names_base() {
        let conda = Conda::new(FakeConda::default());
        let envs = conda.environments().unwrap();
        assert_eq!(envs[0].0, "base");
        assert_eq!(envs[1].0, "demo");
        assert_eq!(conda.channels().unwrap(), vec!["conda-forge", "defaults"]);
    }

    #[test]
    fn test_missing_executable() {
        let cli = CondaCli { exe: None };
        let err = cli.execute(&["info".into()]).unwrap_err();
        assert!(matches!(err, ManagerError::CondaCommand { return_code: -1, .. }));
    }
}
