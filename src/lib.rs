//! autodeploy - continuous deployment driven by git webhooks and polling

pub mod backend;
pub mod cli;
pub mod core;
pub mod execution;
pub mod server;
pub mod trigger;

// Re-export commonly used types
pub use backend::{Collaborators, CommandRunner, DependencyInstaller, ProcessManager, VersionControl};
pub use core::{AppConfig, DeployError, DeploymentTrigger, PipelineReport, PipelineState, RepositoryConfig};
pub use execution::{DeploymentEngine, DeploymentScheduler, PollScheduler, ResultReporter, SubmitOutcome};
pub use server::{create_router, AppState};
pub use trigger::RepoDispatch;
