//! Execution state models

use crate::core::{
    config::{DependencyType, RepositoryConfig},
    error::DeployError,
    trigger::DeploymentTrigger,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Terminal (or current) status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Pipeline is still executing steps
    Running,
    /// All fatal steps succeeded
    Succeeded,
    /// Nothing changed upstream; stopped after pull
    Skipped,
    /// A fatal step failed
    Failed,
}

/// The ordered pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    EnsureRepo,
    Pull,
    InstallDependencies,
    StopScripts,
    Build,
    RegisterScripts,
    RestartScripts,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::EnsureRepo => "ensure-repo",
            StepKind::Pull => "pull",
            StepKind::InstallDependencies => "install-dependencies",
            StepKind::StopScripts => "stop-scripts",
            StepKind::Build => "build",
            StepKind::RegisterScripts => "register-scripts",
            StepKind::RestartScripts => "restart-scripts",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured result of one external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub command: String,
    pub cwd: PathBuf,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A per-script lifecycle failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleFailure {
    pub script: String,
    pub error: String,
}

/// Outcome of a best-effort step applied to several scripts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<LifecycleFailure>,
}

impl LifecycleOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Step-specific data, one variant per [`StepKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum StepPayload {
    EnsureRepo {
        cloned: bool,
    },
    Pull {
        changed: bool,
        files: Vec<String>,
    },
    InstallDependencies {
        manager: DependencyType,
        skipped: bool,
        output: String,
    },
    StopScripts(LifecycleOutcome),
    Build {
        commands: Vec<CommandOutput>,
    },
    RegisterScripts(LifecycleOutcome),
    RestartScripts(LifecycleOutcome),
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            StepPayload::EnsureRepo { .. } => StepKind::EnsureRepo,
            StepPayload::Pull { .. } => StepKind::Pull,
            StepPayload::InstallDependencies { .. } => StepKind::InstallDependencies,
            StepPayload::StopScripts(_) => StepKind::StopScripts,
            StepPayload::Build { .. } => StepKind::Build,
            StepPayload::RegisterScripts(_) => StepKind::RegisterScripts,
            StepPayload::RestartScripts(_) => StepKind::RestartScripts,
        }
    }
}

/// Result of one executed step. Append-only within a [`PipelineState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub error: Option<String>,
    pub payload: StepPayload,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn succeeded(payload: StepPayload, started_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            error: None,
            payload,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(payload: StepPayload, error: &DeployError, started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            payload,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// A lifecycle step: successful only if every script went through
    pub fn lifecycle(
        payload: StepPayload,
        outcome_errors: Vec<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let error = (!outcome_errors.is_empty()).then(|| outcome_errors.join("; "));
        Self {
            success: error.is_none(),
            error,
            payload,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> StepKind {
        self.payload.kind()
    }
}

/// State of one in-flight deployment.
///
/// Owned by the engine that runs it; handed to the reporter when terminal.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub execution_id: Uuid,
    pub repository: Arc<RepositoryConfig>,
    pub trigger: DeploymentTrigger,
    pub steps: Vec<StepResult>,
    pub success: bool,
    pub skipped: bool,
    /// The fatal error that ended the pipeline, if any
    pub error: Option<DeployError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    clock: Instant,
}

impl PipelineState {
    pub fn new(repository: Arc<RepositoryConfig>, trigger: DeploymentTrigger) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            repository,
            trigger,
            steps: Vec::new(),
            success: true,
            skipped: false,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            clock: Instant::now(),
        }
    }

    /// Append a step result
    pub fn record(&mut self, step: StepResult) {
        self.steps.push(step);
    }

    /// Record a fatal step failure and end the pipeline
    pub fn fail(&mut self, step: StepResult, error: DeployError) {
        self.steps.push(step);
        self.success = false;
        self.error = Some(error);
        self.finish();
    }

    /// End the pipeline early because nothing changed
    pub fn skip(&mut self) {
        self.skipped = true;
        self.finish();
    }

    /// Stamp the terminal time and elapsed duration
    pub fn finish(&mut self) {
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
            self.duration = Some(self.clock.elapsed());
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn status(&self) -> DeploymentStatus {
        if !self.is_terminal() {
            DeploymentStatus::Running
        } else if !self.success {
            DeploymentStatus::Failed
        } else if self.skipped {
            DeploymentStatus::Skipped
        } else {
            DeploymentStatus::Succeeded
        }
    }

    /// Step kinds in execution order
    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(StepResult::kind).collect()
    }

    pub fn step(&self, kind: StepKind) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.kind() == kind)
    }

    /// Serializable summary for history and completion events
    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            execution_id: self.execution_id,
            repository: self.repository.name.clone(),
            branch: self.repository.branch.clone(),
            trigger: self.trigger.source.to_string(),
            head_commit: self.trigger.head_commit.clone(),
            status: self.status(),
            success: self.success,
            skipped: self.skipped,
            error: self.error.as_ref().map(ToString::to_string),
            steps: self.steps.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
        }
    }
}

/// Summary of a finished deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub execution_id: Uuid,
    pub repository: String,
    pub branch: String,
    pub trigger: String,
    pub head_commit: Option<String>,
    pub status: DeploymentStatus,
    pub success: bool,
    pub skipped: bool,
    pub error: Option<String>,
    pub steps: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}
