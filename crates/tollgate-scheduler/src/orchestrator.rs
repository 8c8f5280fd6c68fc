//! Event orchestration.
//!
//! Wires one inbound event through branch resolution, trigger evaluation and
//! dispatch, and hands merge-request runs to completion watchers.

use crate::config::TollgateConfig;
use crate::dispatcher::PipelineDispatcher;
use crate::queue::EventHandler;
use crate::resolver::BranchPolicyResolver;
use crate::triggers::TriggerEvaluator;
use crate::watcher::{CompletionWatcher, WatchOutcome, WatchTarget};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tollgate_core::branch::strip_ref_prefix;
use tollgate_core::checkrun::CheckRunReport;
use tollgate_core::events::{
    EventEnvelope, EventKind, ManualEvent, MergeRequestEvent, PushEvent, TriggerEvent,
};
use tollgate_core::ids::RunHandle;
use tollgate_core::pipeline::PipelineDefinition;
use tollgate_core::ports::{
    ApplicationDirectory, BranchRuleStore, DefinitionSource, PipelineEngine, ReviewSystem,
};
use tollgate_core::run::{Application, RunRequest, TriggerMode};
use tollgate_core::{Error, Result};
use tracing::{debug, error, info, warn};

/// Label carrying how a run was triggered.
pub const TRIGGER_MODE_LABEL: &str = "trigger_mode";

/// The external services the orchestrator coordinates.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn PipelineEngine>,
    pub rules: Arc<dyn BranchRuleStore>,
    pub reviews: Arc<dyn ReviewSystem>,
    pub definitions: Arc<dyn DefinitionSource>,
    pub apps: Arc<dyn ApplicationDirectory>,
}

/// What happened to one pipeline definition for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Dispatched {
        pipeline: String,
        run: RunHandle,
        /// A completion watcher reports this run's result.
        watched: bool,
    },
    Skipped {
        pipeline: String,
        reason: String,
    },
    Failed {
        pipeline: String,
        error: String,
    },
}

impl TriggerOutcome {
    pub fn pipeline(&self) -> &str {
        match self {
            TriggerOutcome::Dispatched { pipeline, .. }
            | TriggerOutcome::Skipped { pipeline, .. }
            | TriggerOutcome::Failed { pipeline, .. } => pipeline,
        }
    }

    pub fn run(&self) -> Option<RunHandle> {
        match self {
            TriggerOutcome::Dispatched { run, .. } => Some(*run),
            _ => None,
        }
    }
}

/// Turns events into pipeline runs.
pub struct Orchestrator {
    apps: Arc<dyn ApplicationDirectory>,
    definitions: Arc<dyn DefinitionSource>,
    reviews: Arc<dyn ReviewSystem>,
    resolver: BranchPolicyResolver,
    evaluator: TriggerEvaluator,
    dispatcher: PipelineDispatcher,
    watcher: CompletionWatcher,
    shutdown_tx: watch::Sender<bool>,
    watches: Mutex<JoinSet<WatchOutcome>>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: &TollgateConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            resolver: BranchPolicyResolver::new(collaborators.rules, config.rule_scope),
            evaluator: TriggerEvaluator::new(),
            dispatcher: PipelineDispatcher::new(
                collaborators.engine.clone(),
                config.ui_public_url.clone(),
                config.deploy_action_types.clone(),
            ),
            watcher: CompletionWatcher::new(
                collaborators.engine,
                collaborators.reviews.clone(),
                config.watcher.backoff(),
            ),
            apps: collaborators.apps,
            definitions: collaborators.definitions,
            reviews: collaborators.reviews,
            shutdown_tx,
            watches: Mutex::new(JoinSet::new()),
        }
    }

    pub fn resolver(&self) -> &BranchPolicyResolver {
        &self.resolver
    }

    pub fn dispatcher(&self) -> &PipelineDispatcher {
        &self.dispatcher
    }

    /// Handle one event.
    ///
    /// Returns one outcome per pipeline definition considered. Failures that
    /// concern a single definition are reported in its outcome; failures that
    /// prevent any decision (invalid event, unknown app, rule store errors)
    /// are returned as errors. Manual runs propagate dispatch errors.
    pub async fn handle_event(&self, event: &TriggerEvent) -> Result<Vec<TriggerOutcome>> {
        event.validate()?;
        let app = self
            .apps
            .get_app(event.app_id())
            .await
            .map_err(|e| e.context(format!("get app {}", event.app_id())))?;

        debug!(app_id = %app.id, kind = %event.kind(), reference = event.trigger_reference(), "Handling event");

        match event {
            TriggerEvent::Push(push) => self.handle_push(&app, push, event.kind()).await,
            TriggerEvent::MergeRequest(mr) => self.handle_merge_request(&app, mr).await,
            TriggerEvent::Manual(manual) => self.handle_manual(&app, manual).await.map(|o| vec![o]),
        }
    }

    async fn handle_push(
        &self,
        app: &Application,
        push: &PushEvent,
        kind: EventKind,
    ) -> Result<Vec<TriggerOutcome>> {
        let branch = strip_ref_prefix(&push.reference);
        let rule = self.resolver.resolve(app, &push.reference).await?;
        let paths = self
            .definitions
            .list_definitions(app, branch, &push.pusher_id)
            .await
            .map_err(|e| e.context(format!("list pipelines on {branch}")))?;

        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = match self.load(app, branch, &path, &push.pusher_id).await {
                Ok((content, definition)) => {
                    let decision = self.evaluator.evaluate(&definition, &push.reference, kind, &rule);
                    if decision.trigger {
                        let request = RunRequest::builder(app, branch)
                            .yml(path.clone(), content)
                            .user(push.pusher_id.clone())
                            .need_approval(decision.extend_deploy_timeout)
                            .trigger_mode(TriggerMode::Push)
                            .label(TRIGGER_MODE_LABEL, TriggerMode::Push.to_string())
                            .build();
                        match self.dispatcher.dispatch(&request, false).await {
                            Ok(run) => TriggerOutcome::Dispatched {
                                pipeline: path,
                                run,
                                watched: false,
                            },
                            Err(e) => TriggerOutcome::Failed {
                                pipeline: path,
                                error: e.to_string(),
                            },
                        }
                    } else {
                        TriggerOutcome::Skipped {
                            pipeline: path,
                            reason: format!("not triggered on {kind} to {branch}"),
                        }
                    }
                }
                Err(e) => {
                    warn!(app_id = %app.id, pipeline = %path, error = %e, "Skipping pipeline");
                    TriggerOutcome::Failed {
                        pipeline: path,
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        info!(
            app_id = %app.id,
            branch,
            dispatched = outcomes.iter().filter(|o| o.run().is_some()).count(),
            considered = outcomes.len(),
            "Push handled"
        );
        Ok(outcomes)
    }

    /// Runs every definition on the source branch whose merge policy covers
    /// the target branch, each under a check-run on the review request.
    async fn handle_merge_request(
        &self,
        app: &Application,
        mr: &MergeRequestEvent,
    ) -> Result<Vec<TriggerOutcome>> {
        let user = if mr.merge_user_id.is_empty() {
            mr.author_id.as_str()
        } else {
            mr.merge_user_id.as_str()
        };
        let rule = self.resolver.resolve(app, &mr.source_branch).await?;
        let workspace = rule.workspace.map(|w| w.to_string()).unwrap_or_default();
        let paths = self
            .definitions
            .list_definitions(app, &mr.source_branch, user)
            .await
            .map_err(|e| e.context(format!("list pipelines on {}", mr.source_branch)))?;

        let mut outcomes = Vec::new();
        for path in paths {
            let (content, definition) = match self.load(app, &mr.source_branch, &path, user).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(app_id = %app.id, pipeline = %path, error = %e, "Skipping pipeline");
                    continue;
                }
            };
            if definition.trigger_filter(EventKind::MergeRequest).is_none() {
                continue;
            }
            let decision =
                self.evaluator
                    .evaluate(&definition, &mr.target_branch, EventKind::MergeRequest, &rule);
            if !decision.trigger {
                continue;
            }

            let trimmed = path.trim_start_matches('/');
            let request = RunRequest::builder(app, mr.source_branch.clone())
                .yml(
                    format!("{}/{workspace}/{}/{trimmed}", app.id, mr.source_branch),
                    content,
                )
                .user(user)
                .need_approval(decision.extend_deploy_timeout)
                .trigger_mode(TriggerMode::Merge)
                .label(TRIGGER_MODE_LABEL, TriggerMode::Merge.to_string())
                .build();

            let outcome = match self
                .start_checked_run(app, mr, &request, format!("{}/{path}", mr.source_branch), user)
                .await
            {
                Ok((run, watched)) => TriggerOutcome::Dispatched {
                    pipeline: path,
                    run,
                    watched,
                },
                Err(e) => {
                    warn!(app_id = %app.id, pipeline = %path, error = %e, "Failed to start merge request pipeline");
                    TriggerOutcome::Failed {
                        pipeline: path,
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        if outcomes.is_empty() {
            return Err(Error::NotFound(format!(
                "pipeline triggered by merge request {} into {}",
                mr.review_request_id, mr.target_branch
            )));
        }
        Ok(outcomes)
    }

    async fn start_checked_run(
        &self,
        app: &Application,
        mr: &MergeRequestEvent,
        request: &RunRequest,
        check_name: String,
        user: &str,
    ) -> Result<(RunHandle, bool)> {
        let run = self.dispatcher.dispatch(request, true).await?;

        let report = CheckRunReport::in_progress(mr.review_request_id, check_name, run, mr.source_sha.clone());
        if let Err(e) = self.reviews.create_or_update_check_run(app.id, &report, user).await {
            // the run exists; only its reporting is lost
            error!(run = %run, check = %report.name, error = %e, "Failed to create check run");
            return Ok((run, false));
        }

        self.spawn_watch(WatchTarget {
            app_id: app.id,
            report,
            reporter_id: user.to_string(),
            closer_id: user.to_string(),
        })
        .await;
        Ok((run, true))
    }

    async fn handle_manual(&self, app: &Application, manual: &ManualEvent) -> Result<TriggerOutcome> {
        let rule = self.resolver.resolve(app, &manual.branch).await?;
        let (content, definition) = self
            .load(app, &manual.branch, &manual.pipeline_yml_name, &manual.user_id)
            .await?;
        let decision = self
            .evaluator
            .evaluate(&definition, &manual.branch, EventKind::Manual, &rule);

        let request = RunRequest::builder(app, manual.branch.clone())
            .yml(manual.pipeline_yml_name.clone(), content)
            .user(manual.user_id.clone())
            .need_approval(decision.extend_deploy_timeout)
            .trigger_mode(TriggerMode::Manual)
            .label(TRIGGER_MODE_LABEL, TriggerMode::Manual.to_string())
            .build();
        let run = self.dispatcher.dispatch(&request, manual.force_run).await?;

        Ok(TriggerOutcome::Dispatched {
            pipeline: manual.pipeline_yml_name.clone(),
            run,
            watched: false,
        })
    }

    async fn load(
        &self,
        app: &Application,
        branch: &str,
        path: &str,
        user: &str,
    ) -> Result<(String, PipelineDefinition)> {
        let content = self
            .definitions
            .fetch_definition(app, branch, path, user)
            .await
            .map_err(|e| e.context(format!("fetch {path}")))?;
        let definition =
            PipelineDefinition::parse(&content).map_err(|e| e.context(format!("parse {path}")))?;
        Ok((content, definition))
    }

    async fn spawn_watch(&self, target: WatchTarget) {
        let watcher = self.watcher.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let mut watches = self.watches.lock().await;
        while watches.try_join_next().is_some() {}
        watches.spawn(async move { watcher.watch(target, shutdown).await });
    }

    /// Watches not yet reaped.
    pub async fn active_watches(&self) -> usize {
        let mut watches = self.watches.lock().await;
        while watches.try_join_next().is_some() {}
        watches.len()
    }

    /// Signal every outstanding watcher to stop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        info!("Orchestrator shutting down");
    }

    /// Wait for every outstanding watch and collect how they ended.
    pub async fn wait_for_watches(&self) -> Vec<WatchOutcome> {
        let mut watches = std::mem::take(&mut *self.watches.lock().await);
        let mut outcomes = Vec::with_capacity(watches.len());
        while let Some(result) = watches.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "Watch task panicked"),
            }
        }
        outcomes
    }
}

#[async_trait]
impl EventHandler for Orchestrator {
    async fn handle(&self, envelope: EventEnvelope) {
        match self.handle_event(&envelope.event).await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    debug!(event_id = %envelope.id, outcome = ?outcome, "Trigger outcome");
                }
            }
            Err(e) => {
                warn!(event_id = %envelope.id, kind = ?e.kind(), error = %e, "Failed to handle event");
            }
        }
    }
}
