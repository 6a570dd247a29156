//! Test doubles for the deployment collaborators
//!
//! Every mock writes to a shared call log so tests can assert the exact
//! order in which the engine talked to git, the installer, the build
//! shell and the process manager.

#![allow(dead_code)]

use async_trait::async_trait;
use autodeploy::backend::{
    AddScriptRequest, Collaborators, CommandRunner, DependencyInstaller, InstallResult, ProcessManager, PullResult,
    ScriptInfo, UpdateStatus, VersionControl,
};
use autodeploy::core::{
    CommandError, CommandOutput, DependencyConfig, DeploymentTrigger, PipelineState, ProcessManagerConfig,
    ProcessManagerError, RepositoryConfig,
};
use autodeploy::execution::{DeploymentEngine, PipelineRunner};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.0.lock().unwrap().iter().any(|c| c == call)
    }
}

/// How the mock version control behaves
#[derive(Debug, Clone, Default)]
pub struct VcsBehavior {
    /// A working copy already exists at the repository path
    pub is_repository: bool,
    pub clone_fails: bool,
    pub pull_fails: bool,
    pub pull_changed: bool,
    pub changed_files: Vec<String>,
    pub behind: usize,
    pub check_fails: bool,
}

pub struct MockVcs {
    behavior: Mutex<VcsBehavior>,
    log: CallLog,
}

impl MockVcs {
    pub fn new(behavior: VcsBehavior, log: CallLog) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            log,
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut VcsBehavior)) {
        f(&mut self.behavior.lock().unwrap());
    }

    fn behavior(&self) -> VcsBehavior {
        self.behavior.lock().unwrap().clone()
    }
}

fn failed(command: &str, stderr: &str) -> CommandError {
    CommandError::Failed {
        command: command.to_string(),
        code: 1,
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl VersionControl for MockVcs {
    async fn is_repository(&self, _path: &Path) -> bool {
        self.behavior().is_repository
    }

    async fn ensure_cloned(&self, _path: &Path, _url: &str, _branch: &str) -> Result<bool, CommandError> {
        self.log.push("ensure_cloned");
        let behavior = self.behavior();
        if behavior.is_repository {
            return Ok(false);
        }
        if behavior.clone_fails {
            return Err(failed("git clone", "repository not found"));
        }
        self.update(|b| b.is_repository = true);
        Ok(true)
    }

    async fn pull(&self, _path: &Path, _branch: &str) -> Result<PullResult, CommandError> {
        self.log.push("pull");
        let behavior = self.behavior();
        if behavior.pull_fails {
            return Err(failed("git pull --ff-only", "Not possible to fast-forward"));
        }
        Ok(PullResult {
            changed: behavior.pull_changed,
            files: behavior.changed_files,
        })
    }

    async fn check_for_updates(&self, path: &Path, _branch: &str) -> Result<UpdateStatus, CommandError> {
        self.log.push(format!("check:{}", path.display()));
        let behavior = self.behavior();
        if behavior.check_fails {
            return Err(failed("git fetch", "could not resolve host"));
        }
        Ok(UpdateStatus {
            behind: behavior.behind,
            ahead: 0,
        })
    }
}

pub struct MockInstaller {
    pub skipped: bool,
    pub fails: bool,
    log: CallLog,
}

#[async_trait]
impl DependencyInstaller for MockInstaller {
    async fn install(&self, _path: &Path, dependencies: &DependencyConfig) -> Result<InstallResult, CommandError> {
        self.log.push(format!("install:{}", dependencies.kind));
        if self.fails {
            return Err(failed("npm install", "ERESOLVE"));
        }
        Ok(InstallResult {
            skipped: self.skipped,
            output: String::new(),
        })
    }
}

pub struct MockRunner {
    /// Commands that exit non-zero
    pub failing: HashSet<String>,
    log: CallLog,
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, CommandError> {
        self.log.push(format!("run:{}", command));
        let success = !self.failing.contains(command);
        Ok(CommandOutput {
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: if success { String::new() } else { format!("{} blew up", command) },
        })
    }
}

pub struct MockProcessManager {
    /// Scripts the process manager does not know about
    pub failing: HashSet<String>,
    /// Endpoints that were called, in order
    pub endpoints: Mutex<Vec<String>>,
    pub registered: Mutex<Vec<AddScriptRequest>>,
    log: CallLog,
}

impl MockProcessManager {
    fn call(&self, endpoint: &ProcessManagerConfig, action: &str, name: &str) -> Result<String, ProcessManagerError> {
        self.log.push(format!("{}:{}", action, name));
        self.endpoints.lock().unwrap().push(endpoint.url.clone());
        if self.failing.contains(name) {
            Err(ProcessManagerError::Rejected(format!("Script {} not found", name)))
        } else {
            Ok(format!("{} {}", action, name))
        }
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn restart_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError> {
        self.call(endpoint, "restart", name)
    }

    async fn stop_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError> {
        self.call(endpoint, "stop", name)
    }

    async fn start_script(&self, endpoint: &ProcessManagerConfig, name: &str) -> Result<String, ProcessManagerError> {
        self.call(endpoint, "start", name)
    }

    async fn add_script(
        &self,
        endpoint: &ProcessManagerConfig,
        script: &AddScriptRequest,
    ) -> Result<String, ProcessManagerError> {
        self.registered.lock().unwrap().push(script.clone());
        self.call(endpoint, "add", &script.name)
    }

    async fn list_scripts(&self, _endpoint: &ProcessManagerConfig) -> Result<Vec<ScriptInfo>, ProcessManagerError> {
        Ok(Vec::new())
    }
}

/// All four mocks wired to one call log
pub struct Harness {
    pub log: CallLog,
    pub vcs: Arc<MockVcs>,
    pub installer: Arc<MockInstaller>,
    pub runner: Arc<MockRunner>,
    pub process_manager: Arc<MockProcessManager>,
}

#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub vcs: VcsBehavior,
    pub install_skipped: bool,
    pub install_fails: bool,
    pub failing_commands: Vec<&'static str>,
    pub failing_scripts: Vec<&'static str>,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        let log = CallLog::default();
        Self {
            vcs: Arc::new(MockVcs::new(config.vcs, log.clone())),
            installer: Arc::new(MockInstaller {
                skipped: config.install_skipped,
                fails: config.install_fails,
                log: log.clone(),
            }),
            runner: Arc::new(MockRunner {
                failing: config.failing_commands.iter().map(|c| c.to_string()).collect(),
                log: log.clone(),
            }),
            process_manager: Arc::new(MockProcessManager {
                failing: config.failing_scripts.iter().map(|s| s.to_string()).collect(),
                endpoints: Mutex::new(Vec::new()),
                registered: Mutex::new(Vec::new()),
                log: log.clone(),
            }),
            log,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            vcs: self.vcs.clone(),
            installer: self.installer.clone(),
            commands: self.runner.clone(),
            process_manager: self.process_manager.clone(),
        }
    }

    pub fn engine(&self) -> DeploymentEngine {
        DeploymentEngine::new(self.collaborators(), default_process_manager())
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.calls()
    }
}

pub fn default_process_manager() -> ProcessManagerConfig {
    ProcessManagerConfig {
        url: "http://pm.default:3000".to_string(),
        api_key: None,
    }
}

/// Parse a single repository entry from YAML
pub fn repo_from_yaml(yaml: &str) -> Arc<RepositoryConfig> {
    Arc::new(serde_yaml::from_str(yaml).expect("valid repository yaml"))
}

/// Minimal repository: no remote, no dependencies, no build, no scripts
pub fn bare_repo(name: &str) -> Arc<RepositoryConfig> {
    repo_from_yaml(&format!("name: {name}\npath: /srv/{name}\n"))
}

/// A runner that records triggers and blocks until released
pub struct GatedRunner {
    gate: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
    runs: Mutex<Vec<(String, DeploymentTrigger)>>,
}

impl GatedRunner {
    /// Closed gate: every run waits for [`release`](Self::release)
    pub fn closed() -> Self {
        Self::with_permits(0)
    }

    /// Open gate: runs complete after a short pause
    pub fn open() -> Self {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    fn with_permits(permits: usize) -> Self {
        Self {
            gate: Semaphore::new(permits),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }

    /// Repository names and triggers in start order
    pub fn runs(&self) -> Vec<(String, DeploymentTrigger)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Poll until `count` runs have started
    pub async fn wait_for_runs(&self, count: usize) {
        for _ in 0..200 {
            if self.runs.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} runs, saw {}", count, self.runs.lock().unwrap().len());
    }
}

#[async_trait]
impl PipelineRunner for GatedRunner {
    async fn run(&self, repository: Arc<RepositoryConfig>, trigger: DeploymentTrigger) -> PipelineState {
        self.runs.lock().unwrap().push((repository.name.clone(), trigger.clone()));
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        let mut state = PipelineState::new(repository, trigger);
        state.finish();
        state
    }
}
