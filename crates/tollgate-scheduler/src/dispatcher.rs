//! Run submission and conflict reporting.

use std::sync::Arc;
use tollgate_core::ids::{AppId, ProjectId, RunHandle};
use tollgate_core::pipeline::PipelineDefinition;
use tollgate_core::ports::PipelineEngine;
use tollgate_core::run::RunRequest;
use tollgate_core::{EngineError, Error, Result};
use tracing::{info, warn};

/// Submits runs to the remote engine.
///
/// Returns as soon as the engine accepted the run; completion is tracked
/// separately by a [`CompletionWatcher`](crate::watcher::CompletionWatcher).
pub struct PipelineDispatcher {
    engine: Arc<dyn PipelineEngine>,
    ui_public_url: String,
    deploy_action_types: Vec<String>,
}

impl PipelineDispatcher {
    pub fn new(
        engine: Arc<dyn PipelineEngine>,
        ui_public_url: impl Into<String>,
        deploy_action_types: Vec<String>,
    ) -> Self {
        Self {
            engine,
            ui_public_url: ui_public_url.into(),
            deploy_action_types,
        }
    }

    /// The request as it is sent to the engine.
    ///
    /// When approval is required the whole definition is parsed, every deploy
    /// action gets an unbounded timeout and the result is serialized again.
    pub fn prepare(&self, request: &RunRequest, force_run: bool) -> Result<RunRequest> {
        let mut prepared = request.clone();
        prepared.force_run = force_run;
        if request.need_approval {
            let definition = PipelineDefinition::parse(&request.pipeline_yml_content)
                .map_err(|e| e.context(format!("parse {}", request.pipeline_yml_name)))?;
            prepared.pipeline_yml_content = definition
                .with_unbounded_timeouts(&self.deploy_action_types)
                .to_yaml()?;
        }
        Ok(prepared)
    }

    /// Submit a run.
    ///
    /// A parallel-run rejection naming the running pipeline becomes
    /// [`Error::PipelineAlreadyRunning`]; one that does not name it becomes
    /// [`Error::Internal`]. Other errors are returned unchanged.
    pub async fn dispatch(&self, request: &RunRequest, force_run: bool) -> Result<RunHandle> {
        let prepared = self.prepare(request, force_run)?;

        match self.engine.create_run(&prepared).await {
            Ok(handle) => {
                info!(
                    app_id = %prepared.app_id,
                    branch = %prepared.branch,
                    pipeline = %prepared.pipeline_yml_name,
                    run = %handle,
                    force_run,
                    "Pipeline run created"
                );
                Ok(handle)
            }
            Err(e) => {
                let err = try_add_running_pipeline_link(&self.ui_public_url, &prepared, e);
                warn!(
                    app_id = %prepared.app_id,
                    pipeline = %prepared.pipeline_yml_name,
                    error = %err,
                    "Failed to create pipeline run"
                );
                Err(err)
            }
        }
    }

    pub async fn cancel(&self, run: RunHandle, user_id: &str) -> Result<()> {
        self.engine
            .cancel_run(run, user_id)
            .await
            .map_err(|e| e.context(format!("cancel run {run}")))?;
        info!(run = %run, user_id, "Pipeline run cancelled");
        Ok(())
    }
}

/// Link to the run named in a parallel-run rejection.
///
/// `None` when the error does not carry the running pipeline's id as a
/// string.
pub fn running_pipeline_link(
    ui_public_url: &str,
    org_name: &str,
    project_id: ProjectId,
    app_id: AppId,
    err: &EngineError,
) -> Option<String> {
    let run_id = err.conflicting_run_id()?;
    Some(format!(
        "{}/{org_name}/dop/projects/{project_id}/apps/{app_id}/pipeline?pipelineID={run_id}",
        ui_public_url.trim_end_matches('/'),
    ))
}

/// Turn a parallel-run rejection of `request` into an actionable error.
pub fn try_add_running_pipeline_link(ui_public_url: &str, request: &RunRequest, err: Error) -> Error {
    let Error::Engine(engine_err) = err else {
        return err;
    };
    if let Some(link) = running_pipeline_link(
        ui_public_url,
        &request.org_name,
        request.project_id,
        request.app_id,
        &engine_err,
    ) {
        return Error::PipelineAlreadyRunning { link };
    }
    if engine_err.is_parallel_run_conflict() {
        return Error::Internal(format!(
            "pipeline already running, but the engine did not name it: {engine_err}"
        ));
    }
    Error::Engine(engine_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tollgate_core::ErrorKind;
    use tollgate_core::error::PARALLEL_RUN_CONTEXT_KEY;
    use tollgate_core::ids::OrgId;
    use tollgate_core::run::{Application, RunSummary};

    const UI: &str = "https://erda.example.com";

    struct ScriptedEngine {
        reply: Mutex<Option<Result<RunHandle>>>,
        submitted: Mutex<Vec<RunRequest>>,
    }

    impl ScriptedEngine {
        fn replying(reply: Result<RunHandle>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                submitted: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PipelineEngine for ScriptedEngine {
        async fn create_run(&self, request: &RunRequest) -> Result<RunHandle> {
            self.submitted.lock().unwrap().push(request.clone());
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(Error::Internal("no reply scripted".into())))
        }

        async fn get_run_status(&self, run: RunHandle) -> Result<RunSummary> {
            Err(Error::NotFound(run.to_string()))
        }

        async fn cancel_run(&self, _run: RunHandle, _user_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn app() -> Application {
        Application {
            id: AppId::new(123123),
            name: "web".into(),
            project_id: ProjectId::new(123),
            org_id: OrgId::new(1),
            org_name: "terminus".into(),
            git_repo: String::new(),
        }
    }

    const YAML: &str = "version: \"1.1\"\nstages:\n  - stage:\n      - git-checkout:\n          timeout: 60\n  - stage:\n      - dice:\n          timeout: 3600\n";

    fn request(need_approval: bool) -> RunRequest {
        RunRequest::builder(&app(), "master")
            .yml("pipeline.yml", YAML)
            .user("u1")
            .need_approval(need_approval)
            .build()
    }

    fn conflict(value: serde_json::Value) -> Error {
        Error::Engine(
            EngineError::new("ErrCreatePipeline", "already running")
                .with_context(json!({ PARALLEL_RUN_CONTEXT_KEY: value })),
        )
    }

    fn dispatcher(engine: Arc<ScriptedEngine>) -> PipelineDispatcher {
        PipelineDispatcher::new(engine, UI, vec!["dice".into()])
    }

    #[test]
    fn test_running_pipeline_link() {
        let err = EngineError::new("ErrCreatePipeline", "")
            .with_context(json!({ PARALLEL_RUN_CONTEXT_KEY: "777777" }));
        let link = running_pipeline_link(
            "https://erda.example.com/",
            "terminus",
            ProjectId::new(123),
            AppId::new(123123),
            &err,
        )
        .unwrap();
        assert_eq!(
            link,
            "https://erda.example.com/terminus/dop/projects/123/apps/123123/pipeline?pipelineID=777777"
        );
    }

    #[test]
    fn test_running_pipeline_link_rejects_non_string_id() {
        let err = EngineError::new("ErrCreatePipeline", "")
            .with_context(json!({ PARALLEL_RUN_CONTEXT_KEY: 777777 }));
        assert!(running_pipeline_link(UI, "terminus", ProjectId::new(123), AppId::new(1), &err).is_none());

        let err = EngineError::new("ErrCreatePipeline", "").with_context(json!("777777"));
        assert!(running_pipeline_link(UI, "terminus", ProjectId::new(123), AppId::new(1), &err).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_success_is_unchanged_without_approval() {
        let engine = ScriptedEngine::replying(Ok(RunHandle::new(42)));
        let handle = dispatcher(engine.clone()).dispatch(&request(false), false).await.unwrap();
        assert_eq!(handle, RunHandle::new(42));

        let submitted = engine.submitted.lock().unwrap();
        assert_eq!(submitted[0].pipeline_yml_content, YAML);
        assert!(!submitted[0].force_run);
    }

    #[tokio::test]
    async fn test_dispatch_rewrites_deploy_timeouts_under_approval() {
        let engine = ScriptedEngine::replying(Ok(RunHandle::new(1)));
        dispatcher(engine.clone()).dispatch(&request(true), true).await.unwrap();

        let submitted = engine.submitted.lock().unwrap();
        assert!(submitted[0].force_run);
        let sent = PipelineDefinition::parse(&submitted[0].pipeline_yml_content).unwrap();
        let original = PipelineDefinition::parse(YAML).unwrap();
        assert_eq!(sent, original.with_unbounded_timeouts(&["dice".to_string()]));
        assert!(submitted[0].pipeline_yml_content.contains("timeout: 60"));
    }

    #[tokio::test]
    async fn test_dispatch_conflict_becomes_link() {
        let engine = ScriptedEngine::replying(Err(conflict(json!("777777"))));
        let err = dispatcher(engine).dispatch(&request(false), false).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            err.to_string(),
            "failed to run pipeline, already running link: \
             https://erda.example.com/terminus/dop/projects/123/apps/123123/pipeline?pipelineID=777777"
        );
    }

    #[tokio::test]
    async fn test_dispatch_conflict_without_id_is_internal() {
        let engine = ScriptedEngine::replying(Err(conflict(json!(777777))));
        let err = dispatcher(engine).dispatch(&request(false), false).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_dispatch_other_errors_pass_through() {
        let engine = ScriptedEngine::replying(Err(Error::Engine(EngineError::new("ErrQuota", "full"))));
        let err = dispatcher(engine).dispatch(&request(false), false).await.unwrap_err();
        assert!(matches!(err, Error::Engine(ref e) if e.code == "ErrQuota"));

        let engine = ScriptedEngine::replying(Err(Error::Network("reset".into())));
        let err = dispatcher(engine).dispatch(&request(false), false).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_invalid_definition_is_rejected_before_submission() {
        let engine = ScriptedEngine::replying(Ok(RunHandle::new(1)));
        let mut bad = request(true);
        bad.pipeline_yml_content = "stages: [".into();
        let err = dispatcher(engine.clone()).dispatch(&bad, false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(engine.submitted.lock().unwrap().is_empty());
    }
}
