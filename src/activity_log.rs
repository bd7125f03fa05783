// SPDX-License-Identifier: Apache-2.0

//! Append-only record of what conda-assist changed.
//!
//! One line per mutating operation, `YYYY-MM-DD HH:MM:SS [source] action details`,
//! where `source` is `cli` or `mcp`. The file lives next to the settings
//! file unless [`set_location`] points it elsewhere.

use once_cell::sync::OnceCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lines kept after rotation.
const MAX_LINES: usize = 1000;
/// Size at which the file gets rotated.
const ROTATE_BYTES: u64 = 100_000;

static LOCATION: OnceCell<PathBuf> = OnceCell::new();

/// Sets the log file for this process. Only the first call has an effect.
pub fn set_location(path: PathBuf) {
    let _ = LOCATION.set(path);
}

fn default_location() -> PathBuf {
    home::home_dir()
        .unwrap_or_default()
        .join(".conda-assist")
        .join("activity.log")
}

pub fn current() -> ActivityLog {
    ActivityLog::at(LOCATION.get().cloned().unwrap_or_else(default_location))
}

pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry. Logging never fails the operation being logged.
    pub fn append(&self, source: &str, action: &str, details: &str) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{} [{}] {} {}\n", now, source, action, details.trim());

        if let Some(dir) = self.path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = written {
            tracing::debug!(path = %self.path.display(), error = %e, "activity log not written");
            return;
        }

        if std::fs::metadata(&self.path).is_ok_and(|m| m.len() > ROTATE_BYTES) {
            self.rotate();
        }
    }

    fn rotate(&self) {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return;
        };
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() > MAX_LINES {
            let keep = &lines[lines.len() - MAX_LINES..];
            let _ = std::fs::write(&self.path, keep.join("\n") + "\n");
        }
    }

    /// The last `n` entries, optionally only those containing `filter`
    /// (case-insensitive).
    pub fn read(&self, n: usize, filter: Option<&str>) -> Vec<String> {
        let content = std::fs::read_to_string(&self.path).unwrap_or_default();
        let keyword = filter.map(str::to_lowercase);
        let matching: Vec<&str> = content
            .lines()
            .filter(|line| {
                keyword
                    .as_deref()
                    .is_none_or(|kw| line.to_lowercase().contains(kw))
            })
            .collect();
        let skip = matching.len().saturating_sub(n);
        matching[skip..].iter().map(|l| l.to_string()).collect()
    }

    pub fn clear(&self) -> std::io::Result<()> {
        if self.path.exists() {
            std::fs::write(&self.path, "")?;
        }
        Ok(())
    }
}

/// Appends to the process-wide log.
pub fn log_activity(source: &str, action: &str, details: &str) {
    current().append(source, action, details);
}
