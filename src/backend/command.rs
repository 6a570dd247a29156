//! Subprocess plumbing shared by the command-line collaborators

use crate::core::CommandError;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};

/// Spawn `program` with `args` in `cwd` and wait for it.
///
/// Only a spawn failure is an error; the exit status is left to the caller.
pub async fn exec(program: &str, args: &[&str], cwd: &Path) -> Result<Output, CommandError> {
    debug!(program, ?args, cwd = %cwd.display(), "Spawning subprocess");

    Command::new(program)
        .args(args)
        .current_dir(cwd)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })
}

/// Like [`exec`], but a non-zero exit becomes [`CommandError::Failed`].
///
/// Returns trimmed stdout.
pub async fn exec_checked(program: &str, args: &[&str], cwd: &Path) -> Result<String, CommandError> {
    let output = exec(program, args, cwd).await?;

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let command = render(program, args);
        warn!("`{}` exited with code {}: {}", command, code, stderr);
        return Err(CommandError::Failed {
            command,
            code,
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Human-readable command line for error messages
pub fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(render("git", &["pull", "--ff-only"]), "git pull --ff-only");
        assert_eq!(render("npm", &[]), "npm");
    }

    #[tokio::test]
    async fn test_spawn_failure_names_program() {
        let dir = std::env::temp_dir();
        let err = exec("definitely-not-a-real-binary-xyz", &[], &dir).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { ref program, .. } if program == "definitely-not-a-real-binary-xyz"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_checked_reports_exit_code() {
        let dir = std::env::temp_dir();
        let err = exec_checked("sh", &["-c", "echo boom >&2; exit 3"], &dir).await.unwrap_err();
        match err {
            CommandError::Failed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
