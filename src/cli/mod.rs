//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    CheckCommand, DeployCommand, ListCommand, ScriptsCommand, ServeCommand, ValidateCommand,
};
use std::ffi::OsString;
use std::path::PathBuf;

/// Continuous-deployment orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "autodeploy")]
#[command(version)]
#[command(about = "Deploys git repositories on push or when polling finds new commits", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "AUTODEPLOY_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the webhook server and/or poll loop (default)
    Serve(ServeCommand),

    /// Deploy one repository now, in the foreground
    Deploy(DeployCommand),

    /// Check every repository for upstream commits
    Check(CheckCommand),

    /// Validate the configuration file
    Validate(ValidateCommand),

    /// List configured repositories
    List(ListCommand),

    /// Inspect or control scripts in the process manager
    Scripts(ScriptsCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// The subcommand, defaulting to `serve`
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Serve(ServeCommand::default()))
    }
}
