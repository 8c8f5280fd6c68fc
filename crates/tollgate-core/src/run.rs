//! Run request and run status types.

use crate::ids::{AppId, OrgId, ProjectId, RunHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of a run as reported by the remote engine.
///
/// `Queue → Running → {Success | Failed | Timeout | StopByUser}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(alias = "Queued")]
    Queue,
    Running,
    Success,
    Failed,
    Timeout,
    StopByUser,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// The one predicate separating terminal from non-terminal statuses.
    pub fn is_end_status(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Timeout | RunStatus::StopByUser
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queue => "Queue",
            RunStatus::Running => "Running",
            RunStatus::Success => "Success",
            RunStatus::Failed => "Failed",
            RunStatus::Timeout => "Timeout",
            RunStatus::StopByUser => "StopByUser",
            RunStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Manual,
    Push,
    Merge,
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerMode::Manual => "manual",
            TriggerMode::Push => "push",
            TriggerMode::Merge => "merge",
        };
        f.write_str(s)
    }
}

/// Where an application lives; used for rule scoping and for links back
/// into the platform UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: AppId,
    pub name: String,
    #[serde(alias = "projectID")]
    pub project_id: ProjectId,
    #[serde(alias = "orgID")]
    pub org_id: OrgId,
    pub org_name: String,
    #[serde(default)]
    pub git_repo: String,
}

/// Everything needed to start one run. Built once per trigger decision and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_id: AppId,
    pub project_id: ProjectId,
    pub org_name: String,
    pub branch: String,
    /// Logical pipeline name; the engine allows one live run per
    /// (application, branch, name).
    pub pipeline_yml_name: String,
    pub pipeline_yml_content: String,
    pub pipeline_source: String,
    pub user_id: String,
    pub force_run: bool,
    /// Deployments on the target branch wait for approval, so deploy
    /// actions must not time out while waiting.
    pub need_approval: bool,
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl RunRequest {
    pub fn builder(app: &Application, branch: impl Into<String>) -> RunRequestBuilder {
        RunRequestBuilder {
            request: RunRequest {
                app_id: app.id,
                project_id: app.project_id,
                org_name: app.org_name.clone(),
                branch: branch.into(),
                pipeline_yml_name: String::new(),
                pipeline_yml_content: String::new(),
                pipeline_source: DEFAULT_PIPELINE_SOURCE.to_string(),
                user_id: String::new(),
                force_run: false,
                need_approval: false,
                trigger_mode: TriggerMode::Manual,
                labels: BTreeMap::new(),
            },
        }
    }
}

pub const DEFAULT_PIPELINE_SOURCE: &str = "dice";

pub struct RunRequestBuilder {
    request: RunRequest,
}

impl RunRequestBuilder {
    pub fn yml(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.request.pipeline_yml_name = name.into();
        self.request.pipeline_yml_content = content.into();
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.request.user_id = user_id.into();
        self
    }

    pub fn force_run(mut self, force: bool) -> Self {
        self.request.force_run = force;
        self
    }

    pub fn need_approval(mut self, need: bool) -> Self {
        self.request.need_approval = need;
        self
    }

    pub fn trigger_mode(mut self, mode: TriggerMode) -> Self {
        self.request.trigger_mode = mode;
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> RunRequest {
        self.request
    }
}

/// What the engine says about a run when polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: RunHandle,
    pub status: RunStatus,
}
