// SPDX-License-Identifier: Apache-2.0

//! Validation for values that end up on a conda command line or in a path.
//!
//! Arguments are passed to conda as separate argv entries, never through a
//! shell, but a value starting with `-` would still be read as a flag.

use std::path::{Path, PathBuf};

const SHELL_META: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '"', '\'', '\n', '\r', '\0',
];

/// Validates a conda environment name (as used with `-n`).
pub fn validate_env_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Environment name cannot be empty".to_string());
    }
    if name.starts_with('-') {
        return Err(format!("Environment name '{}' cannot start with '-'", name));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c == ':' || c == '#' || c.is_whitespace()) {
        return Err(format!(
            "Environment name '{}' cannot contain '/', '\\', ':', '#' or spaces",
            name
        ));
    }
    if name.chars().any(|c| SHELL_META.contains(&c)) {
        return Err(format!("Environment name '{}' contains invalid characters", name));
    }
    Ok(())
}

/// Validates a package spec such as `numpy`, `numpy>=2.0` or `conda-forge::tqdm`.
pub fn validate_package_spec(spec: &str) -> Result<(), String> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err("Package spec cannot be empty".to_string());
    }
    if spec.starts_with('-') {
        return Err(format!("Package spec '{}' cannot start with '-'", spec));
    }
    if spec.chars().any(|c| SHELL_META.contains(&c)) {
        return Err(format!("Package spec '{}' contains invalid characters", spec));
    }
    Ok(())
}

/// Validates a Python version string such as `3`, `3.12` or `3.11.4`.
pub fn validate_python_version(version: &str) -> Result<(), String> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.parse::<u32>().is_err()) {
        return Err(format!(
            "Invalid Python version '{}' (use X, X.Y or X.Y.Z)",
            version
        ));
    }
    Ok(())
}

/// Turns a user-supplied workspace path into an absolute path.
///
/// The directory does not have to exist yet; the client config file and
/// its parents are created on first write.
pub fn resolve_workspace(path: &Path) -> Result<PathBuf, String> {
    if path.as_os_str().is_empty() {
        return Err("Workspace path cannot be empty".to_string());
    }
    if path.to_string_lossy().contains('\0') {
        return Err("Workspace path contains null bytes".to_string());
    }
    if path.is_file() {
        return Err(format!("Workspace path {} is a file", path.display()));
    }
    std::path::absolute(path)
        .map_err(|e| format!("Invalid workspace path {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_names() {
        assert!(validate_env_name("myenv").is_ok());
        assert!(validate_env_name("data-science_3.12").is_ok());
        assert!(validate_env_name("").is_err());
        assert!(validate_env_name("--all").is_err());
        assert!(validate_env_name("a/b").is_err());
        assert!(validate_env_name("my env").is_err());
        assert!(validate_env_name("x;rm").is_err());
    }

    #[test]
    fn test_package_specs() {
        assert!(validate_package_spec("numpy").is_ok());
        assert!(validate_package_spec("numpy>=2.0,<3").is_ok());
        assert!(validate_package_spec("conda-forge::tqdm").is_ok());
        assert!(validate_package_spec("--override-channels").is_err());
        assert!(validate_package_spec("pkg`id`").is_err());
    }

    #[test]
    fn test_python_versions() {
        assert!(validate_python_version("3").is_ok());
        assert!(validate_python_version("3.12").is_ok());
        assert!(validate_python_version("3.11.4").is_ok());
        assert!(validate_python_version("3.x").is_err());
        assert!(validate_python_version("3.1.2.3").is_err());
        assert!(validate_python_version("").is_err());
    }

    #[test]
    fn test_resolve_workspace_is_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        let resolved = resolve_workspace(tmp.path()).unwrap();
        assert!(resolved.is_absolute());

        let relative = resolve_workspace(Path::new("some/project")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("some/project"));

        let file = tmp.path().join("f.txt");
        std::fs::write(&file, "").unwrap();
        assert!(resolve_workspace(&file).is_err());
    }
}
