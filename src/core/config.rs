//! Deployment configuration from YAML

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "autodeploy.yaml";

/// Which trigger producers are started by `serve`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Webhook,
    Polling,
    Both,
}

impl TriggerMode {
    pub fn webhook_enabled(&self) -> bool {
        matches!(self, TriggerMode::Webhook | TriggerMode::Both)
    }

    pub fn polling_enabled(&self) -> bool {
        matches!(self, TriggerMode::Polling | TriggerMode::Both)
    }
}

/// Top-level configuration, loaded once at startup and never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub trigger_mode: TriggerMode,

    /// Submit a startup trigger for every repository when the service boots
    #[serde(default)]
    pub deploy_on_startup: bool,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Default process-manager endpoint, overridable per repository
    #[serde(default)]
    pub process_manager: ProcessManagerConfig,

    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// Webhook listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret; when absent, signatures are not checked
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
        }
    }
}

fn default_interval_seconds() -> u64 {
    60
}

/// Where the process manager lives and how to authenticate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessManagerConfig {
    #[serde(default = "default_process_manager_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            url: default_process_manager_url(),
            api_key: None,
        }
    }
}

fn default_process_manager_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

/// Package manager used to install a repository's dependencies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Npm,
    Bun,
    Yarn,
    Pip,
    #[default]
    None,
}

impl DependencyType {
    /// Manifest file whose absence turns the install step into a skip
    pub fn manifest(&self) -> Option<&'static str> {
        match self {
            DependencyType::Npm | DependencyType::Bun | DependencyType::Yarn => {
                Some("package.json")
            }
            DependencyType::Pip => Some("requirements.txt"),
            DependencyType::None => None,
        }
    }
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DependencyType::Npm => "npm",
            DependencyType::Bun => "bun",
            DependencyType::Yarn => "yarn",
            DependencyType::Pip => "pip",
            DependencyType::None => "none",
        };
        f.write_str(name)
    }
}

/// Dependency install settings for one repository
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyConfig {
    #[serde(rename = "type", default)]
    pub kind: DependencyType,

    /// Python virtualenv directory (pip only)
    #[serde(default)]
    pub venv: Option<String>,
}

/// A build command - either a bare string or a command with a working directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BuildCommand {
    Simple(String),
    Detailed {
        command: String,
        #[serde(default)]
        cwd: Option<String>,
    },
}

impl BuildCommand {
    pub fn command(&self) -> &str {
        match self {
            BuildCommand::Simple(command) => command,
            BuildCommand::Detailed { command, .. } => command,
        }
    }

    /// Resolve the working directory against the repository root.
    ///
    /// Absolute directories are used as-is.
    pub fn working_dir(&self, repo_root: &Path) -> PathBuf {
        match self {
            BuildCommand::Detailed { cwd: Some(cwd), .. } => {
                let cwd = Path::new(cwd);
                if cwd.is_absolute() {
                    cwd.to_path_buf()
                } else {
                    repo_root.join(cwd)
                }
            }
            _ => repo_root.to_path_buf(),
        }
    }
}

/// A script to register with the process manager after a fresh clone
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRegistration {
    pub name: String,

    /// Script path, relative to the repository root unless absolute
    #[serde(default)]
    pub path: Option<String>,

    /// Command line, for scripts that are not a single file
    #[serde(default)]
    pub command: Option<String>,

    #[serde(rename = "type", default)]
    pub script_type: Option<String>,

    /// Cron expression for scheduled scripts
    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// One deployable repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub name: String,

    /// Local working copy
    pub path: PathBuf,

    /// Remote to clone from when the working copy is missing
    #[serde(default)]
    pub repo_url: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub dependencies: DependencyConfig,

    #[serde(default)]
    pub build: Option<Vec<BuildCommand>>,

    /// Scripts stopped before the build and restarted at the end
    #[serde(default)]
    pub restart_scripts: Vec<String>,

    /// Scripts registered with the process manager after a fresh clone
    #[serde(default)]
    pub register_scripts: Vec<ScriptRegistration>,

    #[serde(default)]
    pub process_manager: Option<ProcessManagerConfig>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepositoryConfig {
    /// Build commands that will actually run
    pub fn build_commands(&self) -> &[BuildCommand] {
        self.build.as_deref().unwrap_or(&[])
    }

    /// The process manager this repository talks to
    pub fn process_manager<'a>(&'a self, default: &'a ProcessManagerConfig) -> &'a ProcessManagerConfig {
        self.process_manager.as_ref().unwrap_or(default)
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Pick the config file: explicit path, then `./autodeploy.yaml`,
    /// then the per-user config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }

        dirs::config_dir()
            .map(|dir| dir.join("autodeploy").join("config.yaml"))
            .unwrap_or(local)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repositories.is_empty() {
            return Err(ConfigError::NoRepositories);
        }

        if self.polling.interval_seconds == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        let mut seen = HashSet::new();
        for (index, repo) in self.repositories.iter().enumerate() {
            if repo.name.trim().is_empty() {
                return Err(ConfigError::MissingField { index, field: "name" });
            }
            if repo.path.as_os_str().is_empty() {
                return Err(ConfigError::MissingField { index, field: "path" });
            }
            if repo.branch.trim().is_empty() {
                return Err(ConfigError::MissingField { index, field: "branch" });
            }

            // Dispatch relies on (name, branch) being unambiguous
            if !seen.insert((repo.name.as_str(), repo.branch.as_str())) {
                return Err(ConfigError::DuplicateRepository {
                    name: repo.name.clone(),
                    branch: repo.branch.clone(),
                });
            }

            if repo.build_commands().iter().any(|c| c.command().trim().is_empty()) {
                return Err(ConfigError::EmptyBuildCommand {
                    name: repo.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Find a repository by name, optionally narrowed to a branch
    pub fn repository(&self, name: &str, branch: Option<&str>) -> Option<&RepositoryConfig> {
        self.repositories
            .iter()
            .find(|r| r.name == name && branch.map_or(true, |b| r.branch == b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
triggerMode: both
deployOnStartup: true
webhook:
  port: 8080
  secret: "s3cret"
polling:
  intervalSeconds: 30
processManager:
  url: "http://pm.local:3000"
  apiKey: "key"
repositories:
  - name: api
    path: /srv/api
    repoUrl: https://example.com/org/api.git
    branch: main
    dependencies:
      type: pip
      venv: .venv
    build:
      - make
      - command: npm run build
        cwd: web
    restartScripts: [api-server, worker]
    registerScripts:
      - name: api-server
        path: server.py
        type: python
        args: ["--port", "8000"]
        env:
          MODE: production
    processManager:
      url: "http://other:4000"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_yaml(FULL).unwrap();
        assert_eq!(config.trigger_mode, TriggerMode::Both);
        assert!(config.deploy_on_startup);
        assert_eq!(config.webhook.port, 8080);
        assert_eq!(config.webhook.host, "0.0.0.0");
        assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.polling.interval_seconds, 30);

        let repo = &config.repositories[0];
        assert_eq!(repo.name, "api");
        assert_eq!(repo.dependencies.kind, DependencyType::Pip);
        assert_eq!(repo.dependencies.venv.as_deref(), Some(".venv"));
        assert_eq!(repo.build_commands().len(), 2);
        assert_eq!(repo.build_commands()[0], BuildCommand::Simple("make".to_string()));
        assert_eq!(repo.build_commands()[1].command(), "npm run build");
        assert_eq!(repo.restart_scripts, vec!["api-server", "worker"]);
        assert_eq!(repo.register_scripts[0].script_type.as_deref(), Some("python"));
        assert_eq!(repo.register_scripts[0].env.get("MODE").map(String::as_str), Some("production"));
        assert_eq!(repo.process_manager(&config.process_manager).url, "http://other:4000");
    }

    #[test]
    fn test_defaults() {
        let yaml = r#"
repositories:
  - name: site
    path: /srv/site
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.trigger_mode, TriggerMode::Webhook);
        assert_eq!(config.polling.interval_seconds, 60);
        assert_eq!(config.webhook.port, 9000);
        assert!(config.webhook.secret.is_none());

        let repo = &config.repositories[0];
        assert_eq!(repo.branch, "main");
        assert_eq!(repo.dependencies.kind, DependencyType::None);
        assert!(repo.build_commands().is_empty());
        assert!(repo.repo_url.is_none());
        assert_eq!(repo.process_manager(&config.process_manager), &config.process_manager);
    }

    #[test]
    fn test_empty_repository_list_fails() {
        let err = AppConfig::from_yaml("repositories: []").unwrap_err();
        assert!(matches!(err, ConfigError::NoRepositories));
    }

    #[test]
    fn test_duplicate_name_and_branch_fails() {
        let yaml = r#"
repositories:
  - name: api
    path: /srv/a
  - name: api
    path: /srv/b
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRepository { .. }));
    }

    #[test]
    fn test_same_name_on_different_branches_is_allowed() {
        let yaml = r#"
repositories:
  - name: api
    path: /srv/api
  - name: api
    path: /srv/api-dev
    branch: dev
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.repository("api", Some("dev")).unwrap().path, PathBuf::from("/srv/api-dev"));
        assert_eq!(config.repository("api", None).unwrap().branch, "main");
    }

    #[test]
    fn test_missing_name_fails() {
        let yaml = r#"
repositories:
  - name: ""
    path: /srv/a
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { index: 0, field: "name" }));
    }

    #[test]
    fn test_zero_interval_fails() {
        let yaml = r#"
polling:
  intervalSeconds: 0
repositories:
  - name: a
    path: /srv/a
"#;
        assert!(matches!(
            AppConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::InvalidPollInterval
        ));
    }

    #[test]
    fn test_build_working_dir_resolution() {
        let root = Path::new("/srv/app");
        assert_eq!(BuildCommand::Simple("make".into()).working_dir(root), root);

        let relative = BuildCommand::Detailed {
            command: "make".into(),
            cwd: Some("web".into()),
        };
        assert_eq!(relative.working_dir(root), PathBuf::from("/srv/app/web"));

        let absolute = BuildCommand::Detailed {
            command: "make".into(),
            cwd: Some("/opt/build".into()),
        };
        assert_eq!(absolute.working_dir(root), PathBuf::from("/opt/build"));
    }

    #[test]
    fn test_from_file_missing_path() {
        let err = AppConfig::from_file("/tmp/autodeploy_missing_12345.yaml").unwrap_err();
        assert!(err.to_string().contains("autodeploy_missing_12345.yaml"));
    }

    #[test]
    fn test_manifest_per_dependency_type() {
        assert_eq!(DependencyType::Npm.manifest(), Some("package.json"));
        assert_eq!(DependencyType::Pip.manifest(), Some("requirements.txt"));
        assert_eq!(DependencyType::None.manifest(), None);
    }
}
