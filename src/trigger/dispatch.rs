//! Map a trigger onto the repository it targets

use crate::core::{AppConfig, DeploymentTrigger, RepositoryConfig};
use std::borrow::Borrow;
use std::sync::Arc;

/// Whether `trigger` targets `repo`: exact branch match and the repo name
/// equals either the short or the fully-qualified repository name.
pub fn is_match(trigger: &DeploymentTrigger, repo: &RepositoryConfig) -> bool {
    if trigger.branch != repo.branch {
        return false;
    }

    let name = repo.name.as_str();
    trigger.repository.as_deref() == Some(name)
        || trigger.repository_full_name.as_deref() == Some(name)
}

/// First repository matching `trigger`.
///
/// Config validation guarantees there is at most one.
pub fn match_repository<'a, R>(trigger: &DeploymentTrigger, repos: &'a [R]) -> Option<&'a R>
where
    R: Borrow<RepositoryConfig>,
{
    repos.iter().find(|repo| is_match(trigger, (*repo).borrow()))
}

/// Immutable table of configured repositories shared by the trigger producers
#[derive(Debug, Clone)]
pub struct RepoDispatch {
    repositories: Arc<[Arc<RepositoryConfig>]>,
}

impl RepoDispatch {
    pub fn new(repositories: Vec<RepositoryConfig>) -> Self {
        Self {
            repositories: repositories.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.repositories.clone())
    }

    /// Resolve a trigger to its repository
    pub fn resolve(&self, trigger: &DeploymentTrigger) -> Option<Arc<RepositoryConfig>> {
        match_repository(trigger, &self.repositories[..]).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RepositoryConfig>> {
        self.repositories.iter()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }
}
