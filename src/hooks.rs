// SPDX-License-Identifier: Apache-2.0

//! Shell integration.
//!
//! `eval "$(conda-assist hook zsh)"` wraps the `conda` shell function so
//! that package-changing commands run through `conda-assist exec`, which
//! passes failures to the error explainer. Everything else, `activate`
//! included, still reaches the original `conda` function unchanged.

/// Subcommands routed through `conda-assist exec`.
pub const WRAPPED_SUBCOMMANDS: &[&str] =
    &["create", "install", "remove", "uninstall", "update", "env", "search"];

pub const SUPPORTED_SHELLS: &[&str] = &["bash", "zsh", "fish"];

fn posix_hook() -> String {
    format!(
        r#"
# conda-assist shell integration
# Failing conda commands get an explanation from Anaconda Assistant.

__CONDA_ASSIST_BIN="$(command -v conda-assist 2>/dev/null)"

# Keep the original conda (usually the function from `conda init`) reachable
if ! typeset -f __conda_assist_orig_conda >/dev/null 2>&1; then
    if typeset -f conda >/dev/null 2>&1; then
        eval "__conda_assist_orig_$(typeset -f conda)"
    else
        __conda_assist_orig_conda() {{ command conda "$@"; }}
    fi
fi

conda() {{
    case "${{1:-}}" in
        {cases})
            if [ -n "$__CONDA_ASSIST_BIN" ]; then
                "$__CONDA_ASSIST_BIN" exec -- "$@"
                return $?
            fi
            ;;
    esac
    __conda_assist_orig_conda "$@"
}}
"#,
        cases = WRAPPED_SUBCOMMANDS.join("|")
    )
}

fn fish_hook() -> String {
    format!(
        r#"
# conda-assist shell integration for fish

set -g __CONDA_ASSIST_BIN (command -v conda-assist 2>/dev/null)

if functions -q conda; and not functions -q __conda_assist_orig_conda
    functions -c conda __conda_assist_orig_conda
end

function conda --wraps conda
    switch "$argv[1]"
        case {cases}
            if test -n "$__CONDA_ASSIST_BIN"
                $__CONDA_ASSIST_BIN exec -- $argv
                return $status
            end
    end
    if functions -q __conda_assist_orig_conda
        __conda_assist_orig_conda $argv
    else
        command conda $argv
    end
end
"#,
        cases = WRAPPED_SUBCOMMANDS.join(" ")
    )
}

/// Script for `shell`, or an `echo` explaining that the shell is not supported.
pub fn generate_hook(shell: &str) -> String {
    match shell {
        "zsh" | "bash" => posix_hook(),
        "fish" => fish_hook(),
        _ => format!("echo \"conda-assist: unsupported shell '{}'\"", shell),
    }
}
