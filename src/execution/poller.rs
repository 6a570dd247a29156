//! Poll scheduler - periodically checks repositories for upstream changes

use crate::{
    backend::VersionControl,
    core::{CommandError, DeploymentTrigger, RepositoryConfig},
    execution::DeploymentScheduler,
    trigger::RepoDispatch,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Single sequential poll loop over every configured repository
pub struct PollScheduler {
    repositories: RepoDispatch,
    vcs: Arc<dyn VersionControl>,
    scheduler: DeploymentScheduler,
    interval: Duration,
    stop: watch::Sender<bool>,
}

impl PollScheduler {
    pub fn new(
        repositories: RepoDispatch,
        vcs: Arc<dyn VersionControl>,
        scheduler: DeploymentScheduler,
        interval: Duration,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            repositories,
            vcs,
            scheduler,
            interval,
            stop,
        }
    }

    /// Run ticks until [`stop`](Self::stop) is called.
    ///
    /// The first tick runs immediately; the next one is scheduled only
    /// after the current scan has finished.
    pub async fn run(&self) {
        info!(
            "Starting poll loop over {} repositories (interval: {:?})",
            self.repositories.len(),
            self.interval
        );
        let mut stopped = self.stop.subscribe();

        loop {
            if *stopped.borrow_and_update() {
                break;
            }

            let submitted = self.run_once().await;
            if submitted > 0 {
                info!("Poll tick submitted {} deployment(s)", submitted);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stopped.wait_for(|stop| *stop) => break,
            }
        }

        info!("Poll loop stopped");
    }

    /// Prevent further ticks and cancel a pending timer. A scan already in
    /// progress finishes.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// One sequential scan. Returns the number of submitted triggers.
    pub async fn run_once(&self) -> usize {
        let mut submitted = 0;

        for repo in self.repositories.iter() {
            match self.check(repo).await {
                Ok(Some(trigger)) => {
                    let outcome = self.scheduler.submit(repo.clone(), trigger).await;
                    debug!(repo = %repo.name, "Poll trigger {}", outcome);
                    submitted += 1;
                }
                Ok(None) => {}
                Err(e) => error!(repo = %repo.name, "Update check failed: {}", e),
            }
        }

        submitted
    }

    /// Decide whether `repo` needs a deployment
    async fn check(&self, repo: &Arc<RepositoryConfig>) -> Result<Option<DeploymentTrigger>, CommandError> {
        if !self.vcs.is_repository(&repo.path).await {
            if repo.repo_url.is_none() {
                warn!(repo = %repo.name, "{} is not a git repository and has no repoUrl", repo.path.display());
                return Ok(None);
            }
            if self.scheduler.is_busy(&repo.name).await {
                return Ok(None);
            }
            info!(repo = %repo.name, "No working copy yet, scheduling initial clone");
            return Ok(Some(DeploymentTrigger::poll(&repo.name, &repo.branch, 0)));
        }

        let status = self.vcs.check_for_updates(&repo.path, &repo.branch).await?;
        debug!(
            repo = %repo.name,
            behind = status.behind,
            ahead = status.ahead,
            "Checked for updates"
        );

        if status.has_updates() {
            info!(repo = %repo.name, "{} new commit(s) on {}", status.behind, repo.branch);
            Ok(Some(DeploymentTrigger::poll(&repo.name, &repo.branch, status.behind)))
        } else {
            Ok(None)
        }
    }
}
