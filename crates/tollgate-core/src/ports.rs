//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the trigger core and the
//! services it coordinates: the remote pipeline engine, the branch rule
//! store, the code-review system and the repository hosting definitions.

use crate::Result;
use crate::branch::{BranchRule, Scope};
use crate::checkrun::CheckRunReport;
use crate::ids::{AppId, ReviewRequestId, RunHandle};
use crate::run::{Application, RunRequest, RunSummary};
use async_trait::async_trait;

/// Remote pipeline execution engine.
#[async_trait]
pub trait PipelineEngine: Send + Sync {
    /// Submit a run.
    ///
    /// When a live run already occupies the request's (application, branch,
    /// pipeline name) slot and `force_run` is unset, fails with
    /// `Error::Engine` whose context names the running pipeline.
    async fn create_run(&self, request: &RunRequest) -> Result<RunHandle>;

    /// Current status of a run.
    async fn get_run_status(&self, run: RunHandle) -> Result<RunSummary>;

    /// Stop a run.
    async fn cancel_run(&self, run: RunHandle, user_id: &str) -> Result<()>;
}

/// Store of scoped branch rules. Read fresh before every decision.
#[async_trait]
pub trait BranchRuleStore: Send + Sync {
    async fn query(&self, scope: Scope) -> Result<Vec<BranchRule>>;
}

/// Code-review system that receives check-run results.
#[async_trait]
pub trait ReviewSystem: Send + Sync {
    /// Create the check-run, or update it if one with the same key exists.
    async fn create_or_update_check_run(
        &self,
        app_id: AppId,
        report: &CheckRunReport,
        user_id: &str,
    ) -> Result<()>;

    async fn close_review_request(
        &self,
        app_id: AppId,
        review_request_id: ReviewRequestId,
        user_id: &str,
    ) -> Result<()>;
}

/// Repository access to pipeline definition files.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Paths of all pipeline definition files on `branch`.
    async fn list_definitions(
        &self,
        app: &Application,
        branch: &str,
        user_id: &str,
    ) -> Result<Vec<String>>;

    /// Raw YAML of one definition file.
    async fn fetch_definition(
        &self,
        app: &Application,
        branch: &str,
        path: &str,
        user_id: &str,
    ) -> Result<String>;
}

/// Lookup of application metadata.
#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    async fn get_app(&self, app_id: AppId) -> Result<Application>;
}
