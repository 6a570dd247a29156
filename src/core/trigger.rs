//! Canonical deployment trigger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::TriggerError;

/// Source-control host that delivered a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
    Gitea,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Gitea => "gitea",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Provider::GitHub),
            "gitlab" => Ok(Provider::GitLab),
            "gitea" => Ok(Provider::Gitea),
            other => Err(TriggerError::UnknownProvider(other.to_string())),
        }
    }
}

/// What produced a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String")]
pub enum TriggerSource {
    Webhook(Provider),
    Poll,
    Startup,
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Webhook(provider) => write!(f, "webhook-{}", provider),
            TriggerSource::Poll => f.write_str("poll"),
            TriggerSource::Startup => f.write_str("startup"),
            TriggerSource::Manual => f.write_str("manual"),
        }
    }
}

impl From<TriggerSource> for String {
    fn from(source: TriggerSource) -> Self {
        source.to_string()
    }
}

/// A normalized request to deploy one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentTrigger {
    pub source: TriggerSource,

    /// Branch derived from the pushed ref
    pub branch: String,

    /// Short repository name
    pub repository: Option<String>,

    /// Fully-qualified name (`owner/name`)
    pub repository_full_name: Option<String>,

    pub pusher: Option<String>,

    pub commit_count: usize,

    pub head_commit: Option<String>,

    pub received_at: DateTime<Utc>,
}

impl DeploymentTrigger {
    /// Trigger for a repository that was not announced by a webhook
    pub fn internal(source: TriggerSource, repository: &str, branch: &str) -> Self {
        Self {
            source,
            branch: branch.to_string(),
            repository: Some(repository.to_string()),
            repository_full_name: None,
            pusher: None,
            commit_count: 0,
            head_commit: None,
            received_at: Utc::now(),
        }
    }

    pub fn poll(repository: &str, branch: &str, behind: usize) -> Self {
        Self {
            commit_count: behind,
            ..Self::internal(TriggerSource::Poll, repository, branch)
        }
    }

    pub fn startup(repository: &str, branch: &str) -> Self {
        Self::internal(TriggerSource::Startup, repository, branch)
    }

    pub fn manual(repository: &str, branch: &str) -> Self {
        Self::internal(TriggerSource::Manual, repository, branch)
    }

    /// Short commit id for log lines
    pub fn short_commit(&self) -> Option<&str> {
        self.head_commit
            .as_deref()
            .map(|c| c.get(..8).unwrap_or(c))
    }
}
