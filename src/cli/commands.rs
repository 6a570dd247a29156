//! CLI command definitions

use clap::{Args, Subcommand};

/// Run the long-lived service
#[derive(Debug, Args, Clone, Default)]
pub struct ServeCommand {
    /// Override the webhook listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the webhook listen address
    #[arg(long)]
    pub host: Option<String>,

    /// Do not start the webhook server even if the trigger mode enables it
    #[arg(long)]
    pub no_webhook: bool,

    /// Do not start the poll loop even if the trigger mode enables it
    #[arg(long)]
    pub no_poll: bool,
}

/// Deploy one repository
#[derive(Debug, Args, Clone)]
pub struct DeployCommand {
    /// Repository name as configured
    pub repository: String,

    /// Branch, when the repository is configured for several
    #[arg(short, long)]
    pub branch: Option<String>,
}

/// Check for upstream commits
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    /// Only check this repository
    #[arg(short, long)]
    pub repo: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate the configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Dump the parsed configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// List configured repositories
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Process-manager scripts
#[derive(Debug, Args, Clone)]
pub struct ScriptsCommand {
    /// Use this repository's process-manager endpoint instead of the default
    #[arg(short, long)]
    pub repo: Option<String>,

    #[command(subcommand)]
    pub action: Option<ScriptAction>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ScriptAction {
    /// List registered scripts (default)
    List,
    /// Start a script
    Start { name: String },
    /// Stop a script
    Stop { name: String },
    /// Restart a script
    Restart { name: String },
}
