//! Test fixtures for creating sample data.

use tollgate_core::branch::{BranchRule, Workspace};
use tollgate_core::events::{ManualEvent, MergeRequestEvent, PushEvent, TriggerEvent};
use tollgate_core::ids::{AppId, OrgId, ProjectId, ReviewRequestId};
use tollgate_core::run::Application;

pub const APP_ID: u64 = 123123;
pub const PROJECT_ID: u64 = 123;
pub const ORG_NAME: &str = "terminus";

/// Runs on pushes to master only.
pub const PUSH_MASTER_PIPELINE: &str = r#"
version: "1.1"
on:
  push:
    branches: [master]
stages:
  - stage:
      - git-checkout:
          alias: repo
"#;

/// No trigger policy; the branch rule decides.
pub const NO_POLICY_PIPELINE: &str = r#"
version: "1.1"
stages:
  - stage:
      - git-checkout:
          alias: repo
  - stage:
      - dice:
          params:
            release_id: ${release:OUTPUT:releaseID}
          timeout: 3600
"#;

/// Runs for merge requests into master and deploys.
pub const MERGE_MASTER_PIPELINE: &str = r#"
version: "1.1"
on:
  merge:
    branches: [master]
stages:
  - stage:
      - git-checkout:
          alias: repo
  - stage:
      - dice:
          params:
            release_id: ${release:OUTPUT:releaseID}
          timeout: 3600
"#;

/// Runs on release tags.
pub const TAG_PIPELINE: &str = r#"
version: "1.1"
on:
  tag:
    branches: ["v*"]
stages:
  - stage:
      - git-checkout:
          alias: repo
"#;

pub fn app() -> Application {
    Application {
        id: AppId::new(APP_ID),
        name: "web".into(),
        project_id: ProjectId::new(PROJECT_ID),
        org_id: OrgId::new(1),
        org_name: ORG_NAME.into(),
        git_repo: String::new(),
    }
}

pub fn rule(pattern: &str, workspace: Workspace, trigger: bool, approval: bool) -> BranchRule {
    BranchRule {
        rule: pattern.into(),
        workspace: Some(workspace),
        is_trigger_pipeline: trigger,
        need_approval: approval,
        ..Default::default()
    }
}

/// A gitflow rule set. Only master needs approval.
pub fn gitflow_rules() -> Vec<BranchRule> {
    vec![
        rule("feature/*", Workspace::Dev, false, false),
        rule("develop", Workspace::Test, true, false),
        rule("release/*,hotfix/*", Workspace::Staging, true, false),
        rule("master", Workspace::Prod, true, true),
        rule("v*", Workspace::Prod, true, false),
    ]
}

pub fn push(reference: &str) -> TriggerEvent {
    TriggerEvent::Push(PushEvent {
        app_id: AppId::new(APP_ID),
        reference: reference.into(),
        commit: "c0ffee".into(),
        pusher_id: "pusher".into(),
    })
}

pub fn merge_request(id: u64, source: &str, target: &str) -> TriggerEvent {
    TriggerEvent::MergeRequest(MergeRequestEvent {
        app_id: AppId::new(APP_ID),
        review_request_id: ReviewRequestId::new(id),
        source_branch: source.into(),
        target_branch: target.into(),
        source_sha: "abc123".into(),
        author_id: "author".into(),
        merge_user_id: "merger".into(),
    })
}

pub fn manual(branch: &str, pipeline: &str, force_run: bool) -> TriggerEvent {
    TriggerEvent::Manual(ManualEvent {
        app_id: AppId::new(APP_ID),
        branch: branch.into(),
        pipeline_yml_name: pipeline.into(),
        user_id: "operator".into(),
        force_run,
    })
}
