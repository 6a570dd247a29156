//! Package-manager implementation of [`DependencyInstaller`]

use super::command::exec_checked;
use super::{DependencyInstaller, InstallResult};
use crate::core::{CommandError, DependencyConfig, DependencyType};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Runs `npm`, `bun`, `yarn` or `pip` in the repository root
#[derive(Debug, Clone, Default)]
pub struct PackageManagerInstaller;

impl PackageManagerInstaller {
    pub fn new() -> Self {
        Self
    }
}

/// Program and arguments for an install, or `None` when there is nothing to run
fn install_command(path: &Path, dependencies: &DependencyConfig) -> Option<(String, Vec<String>)> {
    let simple = |program: &str| Some((program.to_string(), vec!["install".to_string()]));

    match dependencies.kind {
        DependencyType::Npm => simple("npm"),
        DependencyType::Bun => simple("bun"),
        DependencyType::Yarn => simple("yarn"),
        DependencyType::Pip => {
            let pip = dependencies
                .venv
                .as_deref()
                .map(|venv| venv_pip(path, venv).to_string_lossy().into_owned())
                .unwrap_or_else(|| "pip".to_string());
            Some((
                pip,
                vec!["install".to_string(), "-r".to_string(), "requirements.txt".to_string()],
            ))
        }
        DependencyType::None => None,
    }
}

/// `pip` inside a virtualenv, relative venvs resolved against the repository
fn venv_pip(repo_root: &Path, venv: &str) -> PathBuf {
    let venv = Path::new(venv);
    let root = if venv.is_absolute() {
        venv.to_path_buf()
    } else {
        repo_root.join(venv)
    };

    if cfg!(windows) {
        root.join("Scripts").join("pip.exe")
    } else {
        root.join("bin").join("pip")
    }
}

#[async_trait]
impl DependencyInstaller for PackageManagerInstaller {
    async fn install(&self, path: &Path, dependencies: &DependencyConfig) -> Result<InstallResult, CommandError> {
        let skipped = InstallResult {
            skipped: true,
            output: String::new(),
        };

        let Some(manifest) = dependencies.kind.manifest() else {
            return Ok(skipped);
        };
        if !tokio::fs::try_exists(path.join(manifest)).await.unwrap_or(false) {
            info!("No {} in {}, skipping {} install", manifest, path.display(), dependencies.kind);
            return Ok(skipped);
        }

        let Some((program, args)) = install_command(path, dependencies) else {
            return Ok(skipped);
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        info!("Installing dependencies with {} in {}", dependencies.kind, path.display());
        let output = exec_checked(&program, &args, path).await?;

        Ok(InstallResult {
            skipped: false,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(kind: DependencyType, venv: Option<&str>) -> DependencyConfig {
        DependencyConfig {
            kind,
            venv: venv.map(str::to_string),
        }
    }

    #[test]
    fn test_node_managers_run_install() {
        let root = Path::new("/srv/app");
        for (kind, program) in [
            (DependencyType::Npm, "npm"),
            (DependencyType::Bun, "bun"),
            (DependencyType::Yarn, "yarn"),
        ] {
            let (p, args) = install_command(root, &deps(kind, None)).unwrap();
            assert_eq!(p, program);
            assert_eq!(args, vec!["install"]);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_pip_uses_venv() {
        let root = Path::new("/srv/app");
        let (p, args) = install_command(root, &deps(DependencyType::Pip, Some(".venv"))).unwrap();
        assert_eq!(p, "/srv/app/.venv/bin/pip");
        assert_eq!(args, vec!["install", "-r", "requirements.txt"]);

        let (p, _) = install_command(root, &deps(DependencyType::Pip, Some("/opt/venv"))).unwrap();
        assert_eq!(p, "/opt/venv/bin/pip");

        let (p, _) = install_command(root, &deps(DependencyType::Pip, None)).unwrap();
        assert_eq!(p, "pip");
    }

    #[tokio::test]
    async fn test_missing_manifest_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let result = PackageManagerInstaller::new()
            .install(dir.path(), &deps(DependencyType::Npm, None))
            .await
            .unwrap();
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_none_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let result = PackageManagerInstaller::new()
            .install(dir.path(), &deps(DependencyType::None, None))
            .await
            .unwrap();
        assert!(result.skipped);
    }
}
