// SPDX-License-Identifier: Apache-2.0

use std::process::Command;

fn main() {
    // Tagged builds report the plain package version, anything else gets
    // the short commit hash appended: "0.3.0" or "0.3.0-1a2b3c4".
    let pkg_version = env!("CARGO_PKG_VERSION");

    let describe = Command::new("git")
        .args(["describe", "--tags", "--exact-match", "HEAD"])
        .output();

    let is_tagged = describe
        .as_ref()
        .map(|o| o.status.success())
        .unwrap_or(false);

    let full_version = if is_tagged {
        pkg_version.to_string()
    } else {
        let output = Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output();
        let hash = output
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
            .unwrap_or_default();
        if hash.is_empty() {
            pkg_version.to_string()
        } else {
            format!("{}-{}", pkg_version, hash)
        }
    };

    println!("cargo:rustc-env=CONDA_ASSIST_VERSION={}", full_version);

    // New commits and tags change the version
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
    println!("cargo:rerun-if-changed=.git/refs/tags/");
}
