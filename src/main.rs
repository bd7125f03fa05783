// SPDX-License-Identifier: Apache-2.0

use clap::{Args, Parser, Subcommand};
use colored::*;
use conda_assist::activity_log::{self, log_activity};
use conda_assist::assistant::{
    self, AnacondaClient, CondaWrapper, ErrorReport, ExplainDecision,
};
use conda_assist::catalog::Catalog;
use conda_assist::conda::{Conda, CondaCli};
use conda_assist::error::AssistError;
use conda_assist::printer::Printer;
use conda_assist::service::ManagerService;
use conda_assist::settings::{self, DebugErrorMode, Settings};
use conda_assist::types::{ConfiguredState, ServerName};
use conda_assist::{hooks, nl_parser, table, validation};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "conda-assist")]
#[command(version = env!("CONDA_ASSIST_VERSION"))]
#[command(
    about = "Anaconda Assistant for conda: package search, error help and MCP servers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (for development/testing)
    #[arg(long, env = "CONDA_ASSIST_CONFIG", hide = true, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one environment per MCP server (for development/testing)
    #[arg(long, env = "CONDA_ASSIST_MCP_HOME", hide = true, global = true)]
    mcp_home: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
enum Commands {
    /// Manage MCP servers and serve conda over MCP
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
    /// Ask Anaconda Assistant for packages that do what you describe
    ///
    /// Examples:
    ///   conda-assist search "A package that can read parquet files"
    ///   conda-assist search "create an environment named ml with numpy" --offline
    Search {
        query: String,
        /// Only translate the request into a conda command; no AI request
        #[arg(long)]
        offline: bool,
    },
    /// Explain a conda error and suggest fixes
    Explain {
        /// The conda command that failed
        #[arg(long)]
        command: String,
        /// The error message it printed
        #[arg(long)]
        message: String,
    },
    /// Run conda and explain the error if it fails (used by `hook`)
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Choose how eagerly failed conda commands are explained
    Configure {
        /// automatic, ask or off
        #[arg(long)]
        mode: Option<DebugErrorMode>,
    },
    /// Show or change settings (e.g. `config mcp.default_client cursor`)
    Config {
        key: Option<String>,
        value: Option<String>,
    },
    /// Print shell integration code: eval "$(conda-assist hook zsh)"
    Hook {
        #[arg(value_parser = ["bash", "zsh", "fish"])]
        shell: String,
    },
    /// Show the activity log
    Log {
        /// Only entries containing this text
        filter: Option<String>,
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
        /// Empty the log
        #[arg(long)]
        clear: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Clone, Debug)]
enum McpCommands {
    /// Same as `mcp server list`
    List,
    /// Install and manage third-party MCP servers
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
    /// Serve conda tools over MCP on stdio
    Serve,
}

/// Which client configuration a command applies to.
#[derive(Args, Clone, Debug)]
struct Target {
    /// claude-desktop, cursor, vscode or custom (default: mcp.default_client)
    #[arg(long)]
    client: Option<String>,
    /// Use the workspace configuration under this directory
    #[arg(long)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
enum ServerCommands {
    /// List servers available for installation
    List,
    /// Show catalog details for a server
    Info { server: String },
    /// Install a server into its own environment and register it with a client
    Install {
        server: String,
        #[command(flatten)]
        target: Target,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update an installed server
    Update {
        server: String,
        #[command(flatten)]
        target: Target,
    },
    /// Remove a server's client entry and its environment
    Uninstall {
        server: String,
        #[command(flatten)]
        target: Target,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show installed servers and how clients are configured
    Status {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        json: bool,
    },
    /// Run an installed server
    Start {
        server: String,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        port: Option<u16>,
        /// Detach and print the PID
        #[arg(long)]
        background: bool,
    },
}

/// Logs go to stderr; stdout belongs to command output and the MCP transport.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

fn parse_server(name: &str) -> Result<ServerName, Box<dyn Error>> {
    Ok(ServerName::new(name)?)
}

/// Client and absolute workspace for a command. `--client` falls back to
/// `mcp.default_client`.
fn resolve_target(
    target: Target,
    settings: &Settings,
    client_required: bool,
) -> Result<(Option<String>, Option<PathBuf>), Box<dyn Error>> {
    let client = target.client.or_else(|| settings.mcp.default_client.clone());
    if client_required && client.is_none() {
        return Err("No client given. Pass --client or set mcp.default_client.".into());
    }
    let workspace = target
        .workspace
        .map(|w| validation::resolve_workspace(&w))
        .transpose()?;
    Ok((client, workspace))
}

/// Runs an assistant request, asking for terms and data-collection consent
/// on a terminal when the settings lack them.
fn with_assistant<T>(
    config_path: &Path,
    action: impl FnMut(&Settings) -> Result<T, AssistError>,
) -> Result<T, AssistError> {
    let can_ask = interactive();
    assistant::with_consent(
        config_path,
        |consent| {
            if !can_ask {
                return None;
            }
            dialoguer::Confirm::new()
                .with_prompt(consent.prompt())
                .default(false)
                .interact()
                .ok()
        },
        action,
    )
}

fn explain(config_path: &Path, report: &ErrorReport) -> Result<String, AssistError> {
    with_assistant(config_path, |settings| {
        let client = AnacondaClient::from_settings(&settings.assistant)?;
        let pb = spinner("Asking Anaconda Assistant...".to_string());
        let answer = assistant::explain_error(&client, &settings.assistant, report);
        pb.finish_and_clear();
        answer
    })
}

/// Asks before calling the assistant; never on a non-interactive run.
fn wants_help() -> bool {
    interactive()
        && dialoguer::Confirm::new()
            .with_prompt("Would you like Anaconda Assistant to help resolve this error?")
            .default(true)
            .interact()
            .unwrap_or(false)
}

fn print_explanation(printer: Printer, config_path: &Path, report: &ErrorReport) {
    printer.heading("Hello from Anaconda Assistant!");
    printer.println("I'm going to help you diagnose and correct this error.");
    match explain(config_path, report) {
        Ok(answer) => printer.println(&format!("\n{}\n", answer)),
        Err(e) => printer.warning(&e.to_string()),
    }
}

fn mcp_command(
    command: McpCommands,
    settings: &Settings,
    mcp_home: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let printer = Printer::Default;
    let command = match command {
        McpCommands::List => ServerCommands::List,
        McpCommands::Server { command } => command,
        McpCommands::Serve => {
            let conda = Conda::new(CondaCli::locate(settings.mcp.conda_executable.as_deref()));
            let catalog = Catalog::load(settings.mcp.catalog_url.as_deref());
            tokio::runtime::Runtime::new()?
                .block_on(conda_assist::mcp::run_server(conda, catalog))?;
            return Ok(());
        }
    };
    let manager = ManagerService::from_settings(settings, mcp_home);

    match command {
        ServerCommands::List => {
            let servers = manager.list_available_servers()?;
            if servers.is_empty() {
                printer.info("No MCP servers available in the catalog.");
                return Ok(());
            }
            let mut t = table::new_table(&["Name", "Version", "Description", "Source"]);
            for s in &servers {
                t.add_row(vec![
                    s.name.to_string(),
                    s.version.clone(),
                    s.description.clone(),
                    s.source.clone(),
                ]);
            }
            printer.table(&t);
        }
        ServerCommands::Info { server } => {
            let server = parse_server(&server)?;
            let info = manager.get_server_info(&server)?;
            printer.println(&format!("{} {}", "Name:".bold(), info.name));
            printer.println(&format!("{} {}", "Package:".bold(), info.package_name));
            printer.println(&format!("{} {}", "Version:".bold(), info.version));
            printer.println(&format!("{} {}", "Description:".bold(), info.description));
            printer.println(&format!("{} {}", "Source:".bold(), info.source));
            if let Some(channel) = &info.channel {
                printer.println(&format!("{} {}", "Channel:".bold(), channel));
            }
            let installed = manager.services().environment_exists(&server);
            printer.println(&format!(
                "{} {}",
                "Installed:".bold(),
                if installed { "yes".green().to_string() } else { "no".dimmed().to_string() }
            ));
        }
        ServerCommands::Install { server, target, json } => {
            let server = parse_server(&server)?;
            let (client, workspace) = resolve_target(target, settings, true)?;
            let client = client.unwrap_or_default();
            let printer = Printer::for_json(json);

            let pb = (!json).then(|| spinner(format!("Installing {} for {}...", server, client)));
            let result = manager.install(&server, &client, workspace.as_deref());
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            let result = result.inspect_err(|e| {
                log_activity("cli", "install:error", &format!("{} ({}) - {}", server, client, e));
            })?;
            log_activity("cli", "install", &format!("{} ({})", server, client));

            printer.success(&format!("Installed '{}'", server));
            if let Some(env) = &result.environment_path {
                printer.println(&format!("  Environment: {}", env.display()));
            }
            if let Some(config) = &result.config_path {
                printer.println(&format!("  Client config: {}", config.display()));
            }
            if let Some(warning) = &result.error_message {
                printer.warning(warning);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        ServerCommands::Update { server, target } => {
            let server = parse_server(&server)?;
            let (client, workspace) = resolve_target(target, settings, false)?;
            let pb = spinner(format!("Updating {}...", server));
            let result = manager.update(&server, client.as_deref(), workspace.as_deref());
            pb.finish_and_clear();
            let result = result?;
            log_activity("cli", "update", &server);

            printer.success(&format!("Updated '{}'", server));
            if let Some(config) = &result.config_path {
                printer.println(&format!("  Client config: {}", config.display()));
            }
            if let Some(warning) = &result.error_message {
                printer.warning(warning);
            }
        }
        ServerCommands::Uninstall { server, target, yes } => {
            let server = parse_server(&server)?;
            let (client, workspace) = resolve_target(target, settings, true)?;
            let client = client.unwrap_or_default();

            if !yes {
                if !interactive() {
                    return Err("Refusing to uninstall without confirmation; pass --yes.".into());
                }
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt(format!("Uninstall '{}' and remove it from {}?", server, client))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    printer.info("Uninstall cancelled.");
                    return Ok(());
                }
            }

            manager.uninstall(&server, &client, workspace.as_deref())?;
            log_activity("cli", "uninstall", &format!("{} ({})", server, client));
            printer.success(&format!("Uninstalled '{}'", server));
        }
        ServerCommands::Status { target, json } => {
            let (client, workspace) = resolve_target(target, settings, false)?;
            let servers = manager.list_installed_servers(client.as_deref(), workspace.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&servers)?);
                return Ok(());
            }
            if servers.is_empty() {
                printer.info("No MCP servers installed.");
                return Ok(());
            }

            let mut headers = vec!["Name", "Status", "Version", "Path"];
            if client.is_some() {
                headers.insert(3, "Configured");
            }
            let mut t = table::new_table(&headers);
            for s in &servers {
                let mut row = vec![
                    s.name.clone(),
                    s.status.to_string(),
                    s.version.clone().unwrap_or_else(|| "-".to_string()),
                    s.prefix.display().to_string(),
                ];
                if let Some(configured) = &s.configured {
                    let cell = match configured {
                        ConfiguredState::Yes => configured.to_string().green().to_string(),
                        ConfiguredState::No => configured.to_string().dimmed().to_string(),
                        ConfiguredState::Mismatch { .. } => {
                            configured.to_string().yellow().to_string()
                        }
                    };
                    row.insert(3, cell);
                }
                t.add_row(row);
            }
            printer.table(&t);
        }
        ServerCommands::Start {
            server,
            host,
            port,
            background,
        } => {
            let server = parse_server(&server)?;
            let start = manager.start_command(&server, &host, port)?;
            let mut command = std::process::Command::new(&start.program);
            command.args(&start.args);

            if background {
                use std::process::Stdio;
                let child = command
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()?;
                log_activity("cli", "start", &format!("{} pid={}", server, child.id()));
                printer.success(&format!(
                    "Started '{}' in the background (PID {})",
                    server,
                    child.id()
                ));
                return Ok(());
            }

            log_activity("cli", "start", &server);
            let address = match port {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            };
            printer.info(&format!("Starting '{}' on {}", server, address));
            let status = command.status()?;
            if !status.success() {
                return Err(format!(
                    "Server '{}' exited with code {}",
                    server,
                    status.code().unwrap_or(-1)
                )
                .into());
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // dialoguer and indicatif hide the cursor; put it back on Ctrl+C
    ctrlc::set_handler(move || {
        eprint!("\x1B[?25h");
        std::process::exit(130);
    })
    .ok();

    init_tracing();

    let result = (|| -> Result<(), Box<dyn std::error::Error>> {
        let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
        if let Some(dir) = config_path.parent() {
            activity_log::set_location(dir.join("activity.log"));
        }
        let settings = Settings::load(&config_path)?;
        let mcp_home = cli.mcp_home.clone().map(|p| settings::expand_tilde(&p.to_string_lossy()));
        let printer = Printer::Default;

        match cli.command {
            Commands::Mcp { command } => mcp_command(command, &settings, mcp_home)?,
            Commands::Search { query, offline } => {
                if let Some(call) = nl_parser::parse_prompt(&query) {
                    printer.info("This request maps to a conda command:");
                    printer.println(&format!("    {}", call.command_line().bold()));
                } else if offline {
                    printer.info(
                        "No matching conda command. Drop --offline to ask Anaconda Assistant.",
                    );
                }
                if !offline {
                    let answer = with_assistant(&config_path, |settings| {
                        let client = AnacondaClient::from_settings(&settings.assistant)?;
                        let pb = spinner("Searching...".to_string());
                        let answer = assistant::search(&client, &settings.assistant, &query);
                        pb.finish_and_clear();
                        answer
                    })?;
                    printer.println(&answer);
                }
            }
            Commands::Explain { command, message } => {
                let report = ErrorReport {
                    command: assistant::clean_command(&command),
                    message,
                    return_code: 1,
                };
                let answer = explain(&config_path, &report)?;
                printer.println(&answer);
            }
            Commands::Exec { args } => {
                let runner = CondaCli::locate(settings.mcp.conda_executable.as_deref());
                let code = CondaWrapper::new(&runner)
                    .on_error(|report| {
                        match assistant::explain_decision(&settings.assistant, report) {
                            ExplainDecision::Skip => {}
                            ExplainDecision::Explain => {
                                print_explanation(printer, &config_path, report)
                            }
                            ExplainDecision::Ask => {
                                if wants_help() {
                                    print_explanation(printer, &config_path, report);
                                }
                            }
                        }
                    })
                    .after_search(|| {
                        eprintln!("{}", "Conda Assistant:".bold().green());
                        eprintln!("If you're not finding what you're looking for try");
                        eprintln!("  conda-assist search \"A package that can ...\"");
                    })
                    .run(&args)?;
                if code != 0 {
                    std::process::exit(code);
                }
            }
            Commands::Configure { mode } => {
                let mode = match mode {
                    Some(mode) => mode,
                    None => {
                        use dialoguer::{Select, theme::ColorfulTheme};
                        printer.println(
                            "Would you like Anaconda Assistant to help resolve your conda errors?",
                        );
                        printer.println("");
                        let choices = [
                            "Automated - solutions are shown as errors occur",
                            "Ask first - you are asked whether you want help",
                            "Disable - no help with conda errors",
                        ];
                        let default = match settings.assistant.debug_error_mode {
                            DebugErrorMode::Automatic => 0,
                            DebugErrorMode::Ask => 1,
                            DebugErrorMode::Off => 2,
                        };
                        let picked = Select::with_theme(&ColorfulTheme::default())
                            .with_prompt("Choose how you want the Assistant to help you")
                            .items(&choices)
                            .default(default)
                            .interact()?;
                        [
                            DebugErrorMode::Automatic,
                            DebugErrorMode::Ask,
                            DebugErrorMode::Off,
                        ][picked]
                    }
                };
                settings::set_value(&config_path, "assistant.debug_error_mode", &mode.to_string())?;
                log_activity("cli", "configure", &mode.to_string());
                printer.success(&assistant::mode_message(mode));
            }
            Commands::Config { key, value } => match (key, value) {
                (None, _) => {
                    for (key, value) in settings::list_values(&settings)? {
                        printer.println(&format!("{} = {}", key, value));
                    }
                }
                (Some(key), None) => match settings::get_value(&settings, &key)? {
                    Some(value) => printer.println(&value),
                    None => printer.info(&format!("{} is not set", key)),
                },
                (Some(key), Some(value)) => {
                    settings::set_value(&config_path, &key, &value)?;
                    let shown = if key.ends_with("api_key") { "****" } else { value.as_str() };
                    log_activity("cli", "config", &format!("{}={}", key, shown));
                    printer.success(&format!("Set {} = {}", key, shown));
                }
            },
            Commands::Hook { shell } => {
                print!("{}", hooks::generate_hook(&shell));
            }
            Commands::Log { filter, lines, clear } => {
                let log = activity_log::current();
                if clear {
                    log.clear()?;
                    printer.println("Log cleared.");
                    return Ok(());
                }
                let entries = log.read(lines, filter.as_deref());
                if entries.is_empty() {
                    printer.println("No log entries found.");
                } else {
                    for entry in &entries {
                        printer.println(entry);
                    }
                    printer.println(&format!("({} entries)", entries.len()).dimmed().to_string());
                }
            }
            Commands::Completions { shell } => {
                use clap::CommandFactory;
                use clap_complete::generate;

                let mut cmd = Cli::command();
                let bin_name = cmd.get_name().to_string();
                generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            }
        }
        Ok(())
    })();

    if let Err(ref e) = result {
        eprintln!("Error: {}", e);
    }

    result
}
