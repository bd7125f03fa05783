// SPDX-License-Identifier: Apache-2.0

//! Installs and updates server packages inside their environments.

use crate::conda::Conda;
use crate::error::{ManagerError, Result};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct Installer {
    conda: Conda,
}

impl Installer {
    pub fn new(conda: Conda) -> Self {
        Self { conda }
    }

    pub fn install(&self, prefix: &Path, package: &str, channel: Option<&str>) -> Result<()> {
        tracing::info!(package, prefix = %prefix.display(), "installing package");
        self.conda
            .install_prefix(prefix, &[package.to_string()], channel)
            .map_err(|e| ManagerError::PackageInstallation(format!("'{}': {}", package, e)))?;
        Ok(())
    }

    /// Updates `packages` in place; an empty list updates everything.
    pub fn update(&self, prefix: &Path, packages: &[String]) -> Result<()> {
        tracing::info!(packages = ?packages, prefix = %prefix.display(), "updating packages");
        self.conda.update_prefix(prefix, packages).map_err(|e| {
            let what = if packages.is_empty() {
                "all packages".to_string()
            } else {
                packages.join(", ")
            };
            ManagerError::PackageUpdate(format!("{}: {}", what, e))
        })?;
        Ok(())
    }

    /// True when conda recorded `package` as installed in `prefix`.
    pub fn verify(&self, prefix: &Path, package: &str) -> bool {
        let wanted = format!("{}-", package);
        std::fs::read_dir(prefix.join("conda-meta"))
            .map(|entries| {
                entries.flatten().any(|entry| {
                    let name = entry.file_name().to_string_lossy().to_string();
                    name.ends_with(".json")
                        && name.strip_prefix(&wanted).is_some_and(|rest| {
                            // `tqdm-4.66.json` matches tqdm but `tqdm-extra-1.0.json` does not
                            rest.chars().next().is_some_and(|c| c.is_ascii_digit())
                        })
                })
            })
            .unwrap_or(false)
    }
}

/// Python interpreter inside a conda prefix.
pub fn python_path(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.join("python.exe")
    } else {
        prefix.join("bin").join("python")
    }
}

/// Command line a client uses to launch the server.
pub fn server_command(prefix: &Path, package: &str) -> String {
    format!("{} -m {}", python_path(prefix).display(), package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conda::fake::FakeConda;
    use std::sync::Arc;

    #[test]
    fn test_install_and_verify() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(Conda::new(Arc::new(FakeConda::default())));
        let prefix = tmp.path().join("srv");

        assert!(!installer.verify(&prefix, "tqdm"));
        installer.install(&prefix, "tqdm", Some("conda-forge")).unwrap();
        assert!(installer.verify(&prefix, "tqdm"));
        assert!(!installer.verify(&prefix, "tq"));
    }

    #[test]
    fn test_failures_are_typed() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(Conda::new(FakeConda::failing("install")));
        assert!(matches!(
            installer.install(tmp.path(), "tqdm", None),
            Err(ManagerError::PackageInstallation(_))
        ));

        let installer = Installer::new(Conda::new(FakeConda::failing("update")));
        let err = installer.update(tmp.path(), &[]).unwrap_err();
        assert!(matches!(err, ManagerError::PackageUpdate(ref m) if m.starts_with("all packages")));
    }

    #[test]
    #[cfg(unix)]
    fn test_server_command() {
        assert_eq!(
            server_command(Path::new("/envs/condamcp"), "condamcp"),
            "/envs/condamcp/bin/python -m condamcp"
        );
    }
}
