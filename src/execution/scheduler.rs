//! Deployment scheduler - serializes pipelines per repository

use crate::{
    core::{DeploymentTrigger, PipelineReport, RepositoryConfig},
    execution::{PipelineRunner, ResultReporter},
};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info};

/// What `submit` did with a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitOutcome {
    /// No pipeline was running; one started immediately
    Started,
    /// A pipeline is running; this trigger runs after it
    Queued,
    /// A pipeline is running and an earlier queued trigger for the same
    /// branch was replaced
    Superseded,
}

impl fmt::Display for SubmitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmitOutcome::Started => "started",
            SubmitOutcome::Queued => "queued",
            SubmitOutcome::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

type Pending = (Arc<RepositoryConfig>, DeploymentTrigger);

/// A held repository lock, plus at most one waiting trigger per branch
#[derive(Default)]
struct RepoLock {
    queued: VecDeque<Pending>,
}

impl RepoLock {
    /// Queue `pending`, replacing a trigger already waiting for the same branch
    fn enqueue(&mut self, pending: Pending) -> SubmitOutcome {
        let branch = pending.0.branch.clone();
        match self.queued.iter_mut().find(|(repo, _)| repo.branch == branch) {
            Some(slot) => {
                *slot = pending;
                SubmitOutcome::Superseded
            }
            None => {
                self.queued.push_back(pending);
                SubmitOutcome::Queued
            }
        }
    }
}

struct Inner {
    runner: Arc<dyn PipelineRunner>,
    reporter: Arc<ResultReporter>,
    locks: Mutex<HashMap<String, RepoLock>>,
    held: watch::Sender<usize>,
}

/// Hands triggers to pipeline runs, never running two pipelines for
/// the same repository at once.
///
/// Pipelines are serialized on the repository name. Queue policy is
/// latest-wins with depth one per branch: a trigger arriving while a
/// pipeline runs replaces a trigger already waiting for the same branch,
/// and waiting branches run in arrival order.
#[derive(Clone)]
pub struct DeploymentScheduler {
    inner: Arc<Inner>,
}

impl DeploymentScheduler {
    pub fn new(runner: Arc<dyn PipelineRunner>, reporter: Arc<ResultReporter>) -> Self {
        let (held, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                runner,
                reporter,
                locks: Mutex::new(HashMap::new()),
                held,
            }),
        }
    }

    /// Submit a trigger. Returns as soon as the trigger is started or queued.
    pub async fn submit(&self, repository: Arc<RepositoryConfig>, trigger: DeploymentTrigger) -> SubmitOutcome {
        let mut locks = self.inner.locks.lock().await;

        match locks.entry(repository.name.clone()) {
            Entry::Occupied(mut held) => {
                let name = repository.name.clone();
                let branch = repository.branch.clone();
                let source = trigger.source;
                let outcome = held.get_mut().enqueue((repository, trigger));
                info!(
                    repo = %name,
                    branch = %branch,
                    trigger = %source,
                    "Deployment already running, trigger {}",
                    outcome
                );
                outcome
            }
            Entry::Vacant(slot) => {
                slot.insert(RepoLock::default());
                self.inner.held.send_modify(|n| *n += 1);
                tokio::spawn(drive(self.inner.clone(), repository, trigger));
                SubmitOutcome::Started
            }
        }
    }

    /// Whether a pipeline for `repository` is running or queued
    pub async fn is_busy(&self, repository: &str) -> bool {
        self.inner.locks.lock().await.contains_key(repository)
    }

    /// Completion events for every finished pipeline
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineReport> {
        self.inner.reporter.subscribe()
    }

    pub fn reporter(&self) -> &Arc<ResultReporter> {
        &self.inner.reporter
    }

    /// Resolve once nothing is running or queued
    pub async fn wait_idle(&self) {
        let mut held = self.inner.held.subscribe();
        // The sender lives in `self`, so this cannot fail
        let _ = held.wait_for(|n| *n == 0).await;
    }
}

/// Run pipelines for one repository until its queue is empty, then
/// release the lock
async fn drive(inner: Arc<Inner>, mut repository: Arc<RepositoryConfig>, mut trigger: DeploymentTrigger) {
    let name = repository.name.clone();

    loop {
        let runner = inner.runner.clone();
        let run = tokio::spawn(async move { runner.run(repository, trigger).await });

        match run.await {
            Ok(state) => {
                inner.reporter.report(&state).await;
            }
            Err(e) => error!(repo = %name, "Deployment task aborted: {}", e),
        }

        let next = {
            let mut locks = inner.locks.lock().await;
            let queued = locks.get_mut(&name).and_then(|held| held.queued.pop_front());
            if queued.is_none() {
                locks.remove(&name);
                inner.held.send_modify(|n| *n = n.saturating_sub(1));
            }
            queued
        };

        match next {
            Some((next_repository, next_trigger)) => {
                info!(repo = %name, trigger = %next_trigger.source, "Starting queued deployment");
                repository = next_repository;
                trigger = next_trigger;
            }
            None => break,
        }
    }
}
