//! Deployment engine - runs the ordered pipeline for one repository

use crate::{
    backend::{AddScriptRequest, Collaborators},
    core::{
        CommandOutput, DependencyType, DeployError, DeploymentStatus, DeploymentTrigger,
        LifecycleFailure, LifecycleOutcome, PipelineState, ProcessManagerConfig,
        ProcessManagerError, RepositoryConfig, StepKind, StepPayload, StepResult, TriggerSource,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events emitted while a pipeline runs
#[derive(Debug, Clone)]
pub enum DeployEvent {
    PipelineStarted {
        execution_id: Uuid,
        repository: String,
        trigger: TriggerSource,
    },
    StepStarted {
        execution_id: Uuid,
        step: StepKind,
    },
    StepCompleted {
        execution_id: Uuid,
        result: StepResult,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: DeploymentStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(DeployEvent) + Send + Sync>;

/// Anything that can run a pipeline to completion.
///
/// The scheduler only depends on this, so it can be exercised without
/// touching git or the process manager.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(&self, repository: Arc<RepositoryConfig>, trigger: DeploymentTrigger) -> PipelineState;
}

/// Runs the EnsureRepo → Pull → Install → Stop → Build → Register → Restart
/// sequence against the configured collaborators
pub struct DeploymentEngine {
    collaborators: Collaborators,
    process_manager: ProcessManagerConfig,
    event_handlers: Vec<EventHandler>,
}

impl DeploymentEngine {
    /// `process_manager` is the default endpoint, used unless a repository overrides it
    pub fn new(collaborators: Collaborators, process_manager: ProcessManagerConfig) -> Self {
        Self {
            collaborators,
            process_manager,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(DeployEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    fn emit(&self, event: DeployEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute the full pipeline. Always returns a terminal state.
    pub async fn execute(&self, repository: Arc<RepositoryConfig>, trigger: DeploymentTrigger) -> PipelineState {
        let mut state = PipelineState::new(repository, trigger);
        let execution_id = state.execution_id;

        info!(
            repo = %state.repository.name,
            branch = %state.repository.branch,
            trigger = %state.trigger.source,
            "Starting deployment ({})",
            execution_id
        );
        self.emit(DeployEvent::PipelineStarted {
            execution_id,
            repository: state.repository.name.clone(),
            trigger: state.trigger.source,
        });

        self.run_steps(&mut state).await;
        state.finish();

        self.emit(DeployEvent::PipelineCompleted {
            execution_id,
            status: state.status(),
        });
        state
    }

    async fn run_steps(&self, state: &mut PipelineState) {
        let repo = state.repository.clone();

        let mut cloned = false;
        if let Some(url) = repo.repo_url.as_deref() {
            match self.ensure_repo(state, &repo, url).await {
                Some(fresh) => cloned = fresh,
                None => return,
            }
        }

        let Some(changed) = self.pull(state, &repo).await else {
            return;
        };
        if !changed && !cloned {
            info!(repo = %repo.name, "Already up to date, skipping deployment");
            state.skip();
            return;
        }

        if repo.dependencies.kind != DependencyType::None && !self.install(state, &repo).await {
            return;
        }

        let endpoint = repo.process_manager(&self.process_manager).clone();
        let build_commands = repo.build_commands();

        if !build_commands.is_empty() && !repo.restart_scripts.is_empty() {
            self.stop_scripts(state, &repo, &endpoint).await;
        }

        if !build_commands.is_empty() && !self.build(state, &repo).await {
            return;
        }

        if cloned && !repo.register_scripts.is_empty() {
            self.register_scripts(state, &repo, &endpoint).await;
        }

        if !repo.restart_scripts.is_empty() {
            self.restart_scripts(state, &repo, &endpoint).await;
        }
    }

    fn begin(&self, state: &PipelineState, step: StepKind) -> DateTime<Utc> {
        debug!(repo = %state.repository.name, step = %step, "Step started");
        self.emit(DeployEvent::StepStarted {
            execution_id: state.execution_id,
            step,
        });
        Utc::now()
    }

    fn complete(&self, state: &mut PipelineState, result: StepResult) {
        self.emit(DeployEvent::StepCompleted {
            execution_id: state.execution_id,
            result: result.clone(),
        });
        state.record(result);
    }

    fn abort(&self, state: &mut PipelineState, payload: StepPayload, error: DeployError, started_at: DateTime<Utc>) {
        error!(repo = %state.repository.name, step = %payload.kind(), "{}", error);
        let result = StepResult::failed(payload, &error, started_at);
        self.emit(DeployEvent::StepCompleted {
            execution_id: state.execution_id,
            result: result.clone(),
        });
        state.fail(result, error);
    }

    /// Returns whether a fresh clone was made, `None` if the step failed
    async fn ensure_repo(&self, state: &mut PipelineState, repo: &RepositoryConfig, url: &str) -> Option<bool> {
        let started_at = self.begin(state, StepKind::EnsureRepo);

        match self.collaborators.vcs.ensure_cloned(&repo.path, url, &repo.branch).await {
            Ok(cloned) => {
                if cloned {
                    info!(repo = %repo.name, "Cloned {} into {}", url, repo.path.display());
                }
                self.complete(state, StepResult::succeeded(StepPayload::EnsureRepo { cloned }, started_at));
                Some(cloned)
            }
            Err(e) => {
                let payload = StepPayload::EnsureRepo { cloned: false };
                self.abort(state, payload, DeployError::Clone(e.to_string()), started_at);
                None
            }
        }
    }

    /// Returns whether the pull changed anything, `None` if the step failed
    async fn pull(&self, state: &mut PipelineState, repo: &RepositoryConfig) -> Option<bool> {
        let started_at = self.begin(state, StepKind::Pull);

        match self.collaborators.vcs.pull(&repo.path, &repo.branch).await {
            Ok(pulled) => {
                if pulled.changed {
                    info!(repo = %repo.name, "Pulled {} changed file(s)", pulled.files.len());
                }
                let changed = pulled.changed;
                let payload = StepPayload::Pull {
                    changed,
                    files: pulled.files,
                };
                self.complete(state, StepResult::succeeded(payload, started_at));
                Some(changed)
            }
            Err(e) => {
                let payload = StepPayload::Pull {
                    changed: false,
                    files: Vec::new(),
                };
                self.abort(state, payload, DeployError::Pull(e.to_string()), started_at);
                None
            }
        }
    }

    async fn install(&self, state: &mut PipelineState, repo: &RepositoryConfig) -> bool {
        let started_at = self.begin(state, StepKind::InstallDependencies);
        let manager = repo.dependencies.kind;

        match self.collaborators.installer.install(&repo.path, &repo.dependencies).await {
            Ok(installed) => {
                if installed.skipped {
                    info!(repo = %repo.name, "No {} manifest, dependency install skipped", manager);
                }
                let payload = StepPayload::InstallDependencies {
                    manager,
                    skipped: installed.skipped,
                    output: installed.output,
                };
                self.complete(state, StepResult::succeeded(payload, started_at));
                true
            }
            Err(e) => {
                let payload = StepPayload::InstallDependencies {
                    manager,
                    skipped: false,
                    output: String::new(),
                };
                self.abort(state, payload, DeployError::Install(e.to_string()), started_at);
                false
            }
        }
    }

    async fn build(&self, state: &mut PipelineState, repo: &RepositoryConfig) -> bool {
        let started_at = self.begin(state, StepKind::Build);
        let mut outputs = Vec::new();

        for build in repo.build_commands() {
            let command = build.command();
            let cwd = build.working_dir(&repo.path);
            info!(repo = %repo.name, "Running `{}` in {}", command, cwd.display());

            let (output, failure) = match self.collaborators.commands.run(command, &cwd).await {
                Ok(output) if output.success => (output, None),
                Ok(output) => {
                    let message = failure_message(&output);
                    (output, Some(message))
                }
                Err(e) => {
                    let message = e.to_string();
                    let output = CommandOutput {
                        command: command.to_string(),
                        cwd,
                        success: false,
                        exit_code: None,
                        stdout: String::new(),
                        stderr: message.clone(),
                    };
                    (output, Some(message))
                }
            };
            outputs.push(output);

            if let Some(message) = failure {
                let error = DeployError::Build {
                    command: command.to_string(),
                    message,
                };
                self.abort(state, StepPayload::Build { commands: outputs }, error, started_at);
                return false;
            }
        }

        self.complete(state, StepResult::succeeded(StepPayload::Build { commands: outputs }, started_at));
        true
    }

    async fn stop_scripts(&self, state: &mut PipelineState, repo: &RepositoryConfig, endpoint: &ProcessManagerConfig) {
        let started_at = self.begin(state, StepKind::StopScripts);
        let mut outcome = LifecycleOutcome::default();

        for script in &repo.restart_scripts {
            let result = self.collaborators.process_manager.stop_script(endpoint, script).await;
            tally(&mut outcome, &repo.name, "stop", script, result);
        }

        self.complete_lifecycle(state, StepPayload::StopScripts, outcome, started_at);
    }

    async fn register_scripts(&self, state: &mut PipelineState, repo: &RepositoryConfig, endpoint: &ProcessManagerConfig) {
        let started_at = self.begin(state, StepKind::RegisterScripts);
        let mut outcome = LifecycleOutcome::default();

        for script in &repo.register_scripts {
            let request = AddScriptRequest::from_registration(script, &repo.path);
            let result = self.collaborators.process_manager.add_script(endpoint, &request).await;
            tally(&mut outcome, &repo.name, "register", &script.name, result);
        }

        self.complete_lifecycle(state, StepPayload::RegisterScripts, outcome, started_at);
    }

    async fn restart_scripts(&self, state: &mut PipelineState, repo: &RepositoryConfig, endpoint: &ProcessManagerConfig) {
        let started_at = self.begin(state, StepKind::RestartScripts);
        let mut outcome = LifecycleOutcome::default();

        for script in &repo.restart_scripts {
            let result = self.collaborators.process_manager.restart_script(endpoint, script).await;
            tally(&mut outcome, &repo.name, "restart", script, result);
        }

        self.complete_lifecycle(state, StepPayload::RestartScripts, outcome, started_at);
    }

    fn complete_lifecycle(
        &self,
        state: &mut PipelineState,
        payload: fn(LifecycleOutcome) -> StepPayload,
        outcome: LifecycleOutcome,
        started_at: DateTime<Utc>,
    ) {
        if !outcome.is_clean() {
            warn!(
                repo = %state.repository.name,
                "{} of {} script(s) failed, continuing",
                outcome.failed.len(),
                outcome.failed.len() + outcome.succeeded.len()
            );
        }
        let errors = outcome.failed.iter().map(|f| f.error.clone()).collect();
        self.complete(state, StepResult::lifecycle(payload(outcome), errors, started_at));
    }
}

#[async_trait]
impl PipelineRunner for DeploymentEngine {
    async fn run(&self, repository: Arc<RepositoryConfig>, trigger: DeploymentTrigger) -> PipelineState {
        self.execute(repository, trigger).await
    }
}

/// Record one process-manager call into a lifecycle outcome
fn tally(
    outcome: &mut LifecycleOutcome,
    repo: &str,
    action: &'static str,
    script: &str,
    result: Result<String, ProcessManagerError>,
) {
    match result {
        Ok(_) => {
            info!(repo, "{} script '{}'", capitalize(action), script);
            outcome.succeeded.push(script.to_string());
        }
        Err(e) => {
            let error = DeployError::Lifecycle {
                action,
                script: script.to_string(),
                message: e.to_string(),
            };
            warn!(repo, "{}", error);
            outcome.failed.push(LifecycleFailure {
                script: script.to_string(),
                error: error.to_string(),
            });
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Most useful description of a failed command
fn failure_message(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match output.exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn output(stderr: &str, exit_code: Option<i32>) -> CommandOutput {
        CommandOutput {
            command: "make".to_string(),
            cwd: PathBuf::from("/srv"),
            success: false,
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_failure_message_prefers_stderr() {
        assert_eq!(failure_message(&output("  missing target\n", Some(2))), "missing target");
        assert_eq!(failure_message(&output("", Some(2))), "exited with code 2");
        assert_eq!(failure_message(&output("", None)), "terminated by signal");
    }

    #[test]
    fn test_tally_splits_outcomes() {
        let mut outcome = LifecycleOutcome::default();
        tally(&mut outcome, "api", "restart", "web", Ok("ok".to_string()));
        tally(
            &mut outcome,
            "api",
            "restart",
            "worker",
            Err(ProcessManagerError::Rejected("not found".to_string())),
        );

        assert_eq!(outcome.succeeded, vec!["web"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].script, "worker");
        assert!(outcome.failed[0].error.contains("Failed to restart script 'worker'"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("stop"), "Stop");
        assert_eq!(capitalize(""), "");
    }
}
