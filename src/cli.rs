use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::Value;

/// Top-level CLI definition for the `kbox` tool.
#[derive(Debug, Parser)]
#[command(
    name = "kbox",
    version,
    about = "Lifecycle orchestrator for multi-container development apps.",
    long_about = "kbox installs, starts, stops and removes the containers that make up an app.\n\
                  Apps are described by a kbox.toml file at the app root."
)]
pub struct Cli {
    /// Path to an explicit configuration file. Defaults to searching for `kbox.toml`.
    #[arg(
        global = true,
        short,
        long = "config",
        value_name = "PATH",
        conflicts_with = "app",
        help = "Load the app from PATH instead of searching parent directories for kbox.toml."
    )]
    pub config: Option<PathBuf>,

    /// Act on a registered app instead of the one in the current directory.
    #[arg(
        global = true,
        short,
        long = "app",
        value_name = "NAME",
        help = "Operate on the registered app NAME (see `kbox apps`)."
    )]
    pub app: Option<String>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(global = true, short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build images where needed and create every component's container.
    Install(InstallArgs),
    /// Start installed containers.
    Start(StartArgs),
    /// Stop running containers.
    Stop(ComponentArgs),
    /// Stop, then start.
    Restart(StartArgs),
    /// Remove containers and forget their identities.
    Uninstall(ComponentArgs),
    /// Stop, uninstall and install again.
    Rebuild(InstallArgs),
    /// List every registered app.
    Apps,
    /// Show the components and containers of an app.
    Info,
    /// Record an app directory so it can be addressed with --app.
    Register(RegisterArgs),
}

#[derive(Debug, Args, Default)]
pub struct ComponentArgs {
    /// Restrict the operation to these components.
    #[arg(
        short = 'C',
        long = "component",
        value_name = "NAME",
        help = "Only act on component NAME (repeatable). Defaults to every component."
    )]
    pub components: Vec<String>,
}

#[derive(Debug, Args, Default)]
pub struct InstallArgs {
    #[command(flatten)]
    pub target: ComponentArgs,

    /// Extra create options, merged over everything kbox computes.
    #[arg(
        short = 'o',
        long = "option",
        value_name = "KEY=VALUE",
        value_parser = parse_option,
        help = "Override a container create option; VALUE is parsed as JSON when possible."
    )]
    pub options: Vec<(String, Value)>,
}

#[derive(Debug, Args, Default)]
pub struct StartArgs {
    #[command(flatten)]
    pub target: ComponentArgs,

    /// Extra start options, merged over everything kbox computes.
    #[arg(
        short = 'o',
        long = "option",
        value_name = "KEY=VALUE",
        value_parser = parse_option,
        help = "Override a container start option; VALUE is parsed as JSON when possible."
    )]
    pub options: Vec<(String, Value)>,
}

#[derive(Debug, Args, Default)]
pub struct RegisterArgs {
    /// App directory to register; defaults to the directory holding the discovered kbox.toml.
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("option key must not be empty in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
