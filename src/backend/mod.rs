//! External collaborators used by the deployment pipeline
//!
//! Each collaborator sits behind a trait so the engine can be driven by
//! test doubles; the real implementations shell out to `git`, package
//! managers and the platform shell, or talk HTTP to the process manager.

pub mod command;
pub mod git;
pub mod installer;
pub mod process_manager;
pub mod shell;

use crate::core::{
    CommandError, CommandOutput, DependencyConfig, ProcessManagerConfig, ProcessManagerError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub use git::GitCli;
pub use installer::PackageManagerInstaller;
pub use process_manager::{AddScriptRequest, ProcessManagerClient, ScriptInfo};
pub use shell::ShellCommandRunner;

/// Outcome of pulling the tracked branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    pub changed: bool,
    pub files: Vec<String>,
}

/// Divergence between the working copy and its upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub behind: usize,
    pub ahead: usize,
}

impl UpdateStatus {
    pub fn has_updates(&self) -> bool {
        self.behind > 0
    }
}

/// Outcome of a dependency install
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallResult {
    /// The manager's manifest was missing, nothing was run
    pub skipped: bool,
    pub output: String,
}

/// Version-control plumbing
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Whether `path` is a git working copy
    async fn is_repository(&self, path: &Path) -> bool;

    /// Clone `url` into `path` unless it is already a working copy.
    ///
    /// Returns `true` when a fresh clone was made.
    async fn ensure_cloned(&self, path: &Path, url: &str, branch: &str) -> Result<bool, CommandError>;

    /// Fetch and fast-forward `branch`, checking it out first if needed
    async fn pull(&self, path: &Path, branch: &str) -> Result<PullResult, CommandError>;

    /// Count commits behind/ahead of the upstream branch
    async fn check_for_updates(&self, path: &Path, branch: &str) -> Result<UpdateStatus, CommandError>;
}

/// Language package managers
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn install(&self, path: &Path, dependencies: &DependencyConfig) -> Result<InstallResult, CommandError>;
}

/// Runs a build command line
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in `cwd`. A non-zero exit is reported through
    /// `CommandOutput::success`, not as an error.
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, CommandError>;
}

/// The external process manager that owns the long-running scripts
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn restart_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError>;

    async fn stop_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError>;

    async fn start_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError>;

    async fn add_script(
        &self,
        endpoint: &ProcessManagerConfig,
        script: &AddScriptRequest,
    ) -> Result<String, ProcessManagerError>;

    async fn list_scripts(&self, endpoint: &ProcessManagerConfig) -> Result<Vec<ScriptInfo>, ProcessManagerError>;
}

/// The set of collaborators a deployment engine needs
#[derive(Clone)]
pub struct Collaborators {
    pub vcs: Arc<dyn VersionControl>,
    pub installer: Arc<dyn DependencyInstaller>,
    pub commands: Arc<dyn CommandRunner>,
    pub process_manager: Arc<dyn ProcessManager>,
}

impl Collaborators {
    /// Real implementations backed by the local toolchain and HTTP
    pub fn system() -> Self {
        Self {
            vcs: Arc::new(GitCli::default()),
            installer: Arc::new(PackageManagerInstaller::new()),
            commands: Arc::new(ShellCommandRunner::new()),
            process_manager: Arc::new(ProcessManagerClient::new()),
        }
    }
}
