//! Deployment execution: pipeline engine, per-repo scheduling, polling and reporting

pub mod engine;
pub mod poller;
pub mod reporter;
pub mod scheduler;

pub use engine::{DeployEvent, DeploymentEngine, EventHandler, PipelineRunner};
pub use poller::PollScheduler;
pub use reporter::{ResultReporter, DEFAULT_HISTORY};
pub use scheduler::{DeploymentScheduler, SubmitOutcome};
