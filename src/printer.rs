// SPDX-License-Identifier: Apache-2.0

//! Terminal output for the CLI.
//!
//! `Silent` is used for `--json` runs, where stdout must carry nothing but
//! the machine-readable payload.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Printer {
    Default,
    Silent,
}

impl Printer {
    /// `Silent` when the caller asked for machine-readable output.
    pub fn for_json(json: bool) -> Self {
        if json { Self::Silent } else { Self::Default }
    }

    pub fn println(&self, msg: &str) {
        if *self == Self::Default {
            println!("{msg}");
        }
    }

    pub fn success(&self, msg: &str) {
        if *self == Self::Default {
            println!("  {} {}", "✓".green(), msg);
        }
    }

    pub fn info(&self, msg: &str) {
        if *self == Self::Default {
            println!("  {} {}", "ℹ".cyan(), msg);
        }
    }

    pub fn warning(&self, msg: &str) {
        if *self == Self::Default {
            eprintln!("  {} {}", "⚠".yellow(), msg);
        }
    }

    /// A bold heading such as "Conda Assistant:".
    pub fn heading(&self, msg: &str) {
        if *self == Self::Default {
            println!("{}", msg.bold().green());
        }
    }

    pub fn table(&self, table: &comfy_table::Table) {
        if *self == Self::Default {
            println!("{table}");
        }
    }
}
