// SPDX-License-Identifier: Apache-2.0

//! Per-server conda environments under the MCP base directory.
//!
//! Layout: `<base>/<server>/` is a conda prefix. A directory only counts as
//! a managed environment once it has a `conda-meta` subdirectory.

use crate::conda::Conda;
use crate::error::{ManagerError, Result};
use crate::types::ServerName;
use std::collections::BTreeMap;
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Clone)]
pub struct EnvironmentManager {
    base: PathBuf,
    conda: Conda,
}

impl EnvironmentManager {
    pub fn new(base: impl Into<PathBuf>, conda: Conda) -> Self {
        Self {
            base: base.into(),
            conda,
        }
    }

    /// Always a direct child of the base directory: a [`ServerName`] has no
    /// separators and no `..`.
    pub fn prefix(&self, server: &ServerName) -> PathBuf {
        self.base.join(server.as_str())
    }

    pub fn exists(&self, server: &ServerName) -> bool {
        self.prefix(server).is_dir()
    }

    /// Creates the environment for `server` with the given initial packages
    /// (plain `python` when empty).
    pub fn create(
        &self,
        server: &ServerName,
        packages: &[String],
        channel: Option<&str>,
    ) -> Result<PathBuf> {
        let prefix = self.prefix(server);
        if prefix.exists() {
            return Err(ManagerError::EnvironmentCreation(format!(
                "environment for '{}' already exists at {}",
                server,
                prefix.display()
            )));
        }
        std::fs::create_dir_all(&self.base).map_err(|e| {
            let message = format!("cannot create {}: {}", self.base.display(), e);
            ManagerError::EnvironmentCreation(message)
        })?;

        tracing::info!(server = %server, prefix = %prefix.display(), "creating environment");
        self.conda
            .create_prefix(&prefix, packages, channel)
            .map_err(|e| ManagerError::EnvironmentCreation(format!("'{}': {}", server, e)))?;
        Ok(prefix)
    }

    pub fn remove(&self, server: &ServerName) -> Result<()> {
        let prefix = self.prefix(server);
        if !prefix.exists() {
            return Err(ManagerError::EnvironmentRemoval(format!(
                "no environment for '{}' at {}",
                server,
                prefix.display()
            )));
        }

        tracing::info!(server = %server, prefix = %prefix.display(), "removing environment");
        self.conda
            .remove_prefix(&prefix)
            .map_err(|e| ManagerError::EnvironmentRemoval(format!("'{}': {}", server, e)))?;

        // conda leaves the (now empty) prefix directory behind on some platforms
        if prefix.exists() {
            std::fs::remove_dir_all(&prefix).map_err(|e| {
                ManagerError::EnvironmentRemoval(format!("'{}': {}", server, e))
            })?;
        }
        Ok(())
    }

    /// Best-effort removal used for rollback; never fails.
    pub fn discard(&self, server: &ServerName) {
        if let Err(e) = self.remove(server) {
            tracing::warn!(server = %server, error = %e, "rollback could not remove environment");
        }
    }

    /// Managed environments keyed by server name.
    pub fn list_installed(&self) -> BTreeMap<String, PathBuf> {
        if !self.base.is_dir() {
            return BTreeMap::new();
        }
        WalkDir::new(&self.base)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_dir() && entry.path().join("conda-meta").is_dir()
            })
            .map(|entry| {
                (
                    entry.file_name().to_string_lossy().to_string(),
                    entry.path().to_path_buf(),
                )
            })
            .collect()
    }
}
