//! Platform shell implementation of [`CommandRunner`]

use super::command::exec;
use super::CommandRunner;
use crate::core::{CommandError, CommandOutput};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

/// Runs build commands through `sh -c` (or `cmd /C` on Windows)
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn shell() -> (&'static str, &'static str) {
        if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, CommandError> {
        let (shell, flag) = Self::shell();
        let output = exec(shell, &[flag, command], cwd).await?;

        let result = CommandOutput {
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.success {
            debug!("`{}` finished in {}", command, cwd.display());
        } else {
            warn!("`{}` exited with {:?}", command, result.exit_code);
        }
        Ok(result)
    }
}
