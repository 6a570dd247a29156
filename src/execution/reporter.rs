//! Result reporter - logs terminal pipelines and keeps recent history

use crate::core::{DeploymentStatus, PipelineReport, PipelineState};
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Default number of reports kept in memory
pub const DEFAULT_HISTORY: usize = 100;

const CHANNEL_CAPACITY: usize = 64;

/// In-memory sink for finished deployments.
///
/// History is bounded and lost on restart.
pub struct ResultReporter {
    history: RwLock<VecDeque<PipelineReport>>,
    capacity: usize,
    completions: broadcast::Sender<PipelineReport>,
}

impl ResultReporter {
    pub fn new(capacity: usize) -> Self {
        let (completions, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY))),
            capacity,
            completions,
        }
    }

    /// Log, store and broadcast a terminal pipeline
    pub async fn report(&self, state: &PipelineState) -> PipelineReport {
        let report = state.report();
        log_report(&report);

        {
            let mut history = self.history.write().await;
            if self.capacity > 0 {
                while history.len() >= self.capacity {
                    history.pop_front();
                }
                history.push_back(report.clone());
            }
        }

        // No subscribers is fine
        let _ = self.completions.send(report.clone());
        report
    }

    /// Most recent reports, newest first
    pub async fn recent(&self, limit: Option<usize>) -> Vec<PipelineReport> {
        let history = self.history.read().await;
        history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Latest report for a repository
    pub async fn last_for(&self, repository: &str) -> Option<PipelineReport> {
        let history = self.history.read().await;
        history.iter().rev().find(|r| r.repository == repository).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineReport> {
        self.completions.subscribe()
    }
}

impl Default for ResultReporter {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

fn log_report(report: &PipelineReport) {
    for step in &report.steps {
        match &step.error {
            None => info!(repo = %report.repository, step = %step.kind(), "Step succeeded"),
            Some(e) => warn!(repo = %report.repository, step = %step.kind(), "Step failed: {}", e),
        }
    }

    let duration = report.duration_ms.unwrap_or_default();
    match report.status {
        DeploymentStatus::Succeeded => info!(
            repo = %report.repository,
            trigger = %report.trigger,
            "Deployment succeeded in {}ms",
            duration
        ),
        DeploymentStatus::Skipped => info!(
            repo = %report.repository,
            trigger = %report.trigger,
            "Deployment skipped, no changes"
        ),
        DeploymentStatus::Failed => error!(
            repo = %report.repository,
            trigger = %report.trigger,
            "Deployment failed after {}ms: {}",
            duration,
            report.error.as_deref().unwrap_or("unknown error")
        ),
        DeploymentStatus::Running => warn!(
            repo = %report.repository,
            "Reported a deployment that has not finished"
        ),
    }
}
