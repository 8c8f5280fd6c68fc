//! Pipeline trigger orchestration for Tollgate.
//!
//! Resolves branch policy, decides whether a pipeline should run, submits
//! runs to the remote engine and watches merge-request runs to completion.

pub mod config;
pub mod dispatcher;
pub mod orchestrator;
pub mod queue;
pub mod resolver;
mod shutdown;
pub mod triggers;
pub mod watcher;

pub use config::{QueueConfig, TollgateConfig, WatcherConfig};
pub use dispatcher::PipelineDispatcher;
pub use orchestrator::{Collaborators, Orchestrator, TriggerOutcome};
pub use queue::{EventHandler, EventQueue, QueueError, WorkerPool};
pub use resolver::BranchPolicyResolver;
pub use triggers::{DecisionSource, TriggerDecision, TriggerEvaluator};
pub use watcher::{Backoff, CompletionWatcher, WatchOutcome, WatchTarget};
