//! `git` command-line implementation of [`VersionControl`]

use super::command::exec_checked;
use super::{PullResult, UpdateStatus, VersionControl};
use crate::core::CommandError;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Drives the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    git_path: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(git_path: impl Into<String>) -> Self {
        Self {
            git_path: git_path.into(),
        }
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, CommandError> {
        exec_checked(&self.git_path, args, cwd).await
    }

    async fn head(&self, path: &Path) -> Result<String, CommandError> {
        self.git(path, &["rev-parse", "HEAD"]).await
    }

    async fn checkout(&self, path: &Path, branch: &str) -> Result<(), CommandError> {
        let current = self.git(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if current != branch {
            info!("Switching {} from {} to {}", path.display(), current, branch);
            self.git(path, &["checkout", branch]).await?;
        }
        Ok(())
    }
}

/// Parse `git rev-list --left-right --count HEAD...upstream` output
fn parse_left_right(command: &str, output: &str) -> Result<UpdateStatus, CommandError> {
    let unexpected = || CommandError::UnexpectedOutput {
        command: command.to_string(),
        output: output.to_string(),
    };

    let mut counts = output.split_whitespace().map(str::parse::<usize>);
    match (counts.next(), counts.next(), counts.next()) {
        (Some(Ok(ahead)), Some(Ok(behind)), None) => Ok(UpdateStatus { behind, ahead }),
        _ => Err(unexpected()),
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn is_repository(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path.join(".git")).await.unwrap_or(false)
    }

    async fn ensure_cloned(&self, path: &Path, url: &str, branch: &str) -> Result<bool, CommandError> {
        if self.is_repository(path).await {
            return Ok(false);
        }

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| CommandError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;

        let target = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CommandError::UnexpectedOutput {
                command: "git clone".to_string(),
                output: format!("invalid clone target {}", path.display()),
            })?;
        info!("Cloning {} ({}) into {}", url, branch, path.display());
        self.git(parent, &["clone", "--branch", branch, url, target.as_str()]).await?;
        Ok(true)
    }

    async fn pull(&self, path: &Path, branch: &str) -> Result<PullResult, CommandError> {
        self.git(path, &["fetch", "origin", branch]).await?;
        self.checkout(path, branch).await?;

        let before = self.head(path).await?;
        self.git(path, &["pull", "--ff-only", "origin", branch]).await?;
        let after = self.head(path).await?;

        if before == after {
            debug!("{} already at {}", path.display(), after);
            return Ok(PullResult::default());
        }

        let range = format!("{}..{}", before, after);
        let files = self
            .git(path, &["diff", "--name-only", &range])
            .await?
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        Ok(PullResult {
            changed: true,
            files,
        })
    }

    async fn check_for_updates(&self, path: &Path, branch: &str) -> Result<UpdateStatus, CommandError> {
        self.git(path, &["fetch", "origin", branch]).await?;

        let range = format!("HEAD...origin/{}", branch);
        let args = ["rev-list", "--left-right", "--count", range.as_str()];
        let output = self.git(path, &args).await?;
        parse_left_right(&super::command::render(&self.git_path, &args), &output)
    }
}
