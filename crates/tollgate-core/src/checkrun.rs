//! Check-run reports attached to review requests.

use crate::ids::{AppId, ReviewRequestId, RunHandle};
use crate::run::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckRunStatus {
    #[serde(rename = "progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckRunResult {
    Success,
    Failure,
    Timeout,
    Cancelled,
}

impl CheckRunResult {
    /// Result for a terminal run status; `None` while the run is still live.
    pub fn from_run_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Success => Some(CheckRunResult::Success),
            RunStatus::Failed => Some(CheckRunResult::Failure),
            RunStatus::Timeout => Some(CheckRunResult::Timeout),
            RunStatus::StopByUser => Some(CheckRunResult::Cancelled),
            RunStatus::Queue | RunStatus::Running | RunStatus::Unknown => None,
        }
    }
}

/// Key a check-run is stored under in the review system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckRunKey {
    pub app_id: AppId,
    pub review_request_id: ReviewRequestId,
    pub name: String,
}

/// Externally visible outcome of a run, attached to a review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRunReport {
    #[serde(rename = "mrId")]
    pub review_request_id: ReviewRequestId,
    pub name: String,
    #[serde(rename = "pipelineId")]
    pub run: RunHandle,
    pub commit: String,
    pub status: CheckRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckRunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CheckRunReport {
    pub fn in_progress(
        review_request_id: ReviewRequestId,
        name: impl Into<String>,
        run: RunHandle,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            review_request_id,
            name: name.into(),
            run,
            commit: commit.into(),
            status: CheckRunStatus::InProgress,
            result: None,
            completed_at: None,
        }
    }

    /// The completed form of this report.
    pub fn completed(&self, result: CheckRunResult) -> Self {
        Self {
            status: CheckRunStatus::Completed,
            result: Some(result),
            completed_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn key(&self, app_id: AppId) -> CheckRunKey {
        CheckRunKey {
            app_id,
            review_request_id: self.review_request_id,
            name: self.name.clone(),
        }
    }
}
