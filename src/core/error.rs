//! Error types shared across the deployment core

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No repositories configured")]
    NoRepositories,

    #[error("Repository #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Repository '{name}' on branch '{branch}' is configured more than once")]
    DuplicateRepository { name: String, branch: String },

    #[error("Repository '{name}' has an empty build command")]
    EmptyBuildCommand { name: String },

    #[error("Polling interval must be greater than zero")]
    InvalidPollInterval,
}

/// Errors raised while turning a webhook delivery into a trigger
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Unknown webhook provider: {0}")]
    UnknownProvider(String),

    #[error("Unable to detect webhook provider from request headers")]
    UndetectedProvider,
}

/// Failure of a single pipeline step.
///
/// `Clone`, `Pull`, `Install` and `Build` are fatal to the pipeline;
/// `Lifecycle` failures are recorded per entry and never flip the
/// pipeline's overall success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeployError {
    #[error("Clone failed: {0}")]
    Clone(String),

    #[error("Pull failed: {0}")]
    Pull(String),

    #[error("Dependency install failed: {0}")]
    Install(String),

    #[error("Build command `{command}` failed: {message}")]
    Build { command: String, message: String },

    #[error("Failed to {action} script '{script}': {message}")]
    Lifecycle {
        action: &'static str,
        script: String,
        message: String,
    },
}

/// Errors from running an external command (git, package managers, build steps)
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// Errors from the process-manager HTTP collaborator
#[derive(Debug, Error)]
pub enum ProcessManagerError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid process manager URL '{0}'")]
    InvalidUrl(String),

    #[error("Process manager returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Process manager rejected request: {0}")]
    Rejected(String),
}
