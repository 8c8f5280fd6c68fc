//! Merge-request runs: check-run reporting and review closure.

use pretty_assertions::assert_eq;
use std::time::Duration;
use tollgate_core::ErrorKind;
use tollgate_core::checkrun::{CheckRunResult, CheckRunStatus};
use tollgate_core::ids::{AppId, ReviewRequestId, RunHandle};
use tollgate_core::run::{RunStatus, TriggerMode};
use tollgate_scheduler::{TriggerOutcome, WatchOutcome};
use tollgate_tests::*;

const SOURCE: &str = "feature/login";

fn context(script: Vec<RunStatus>) -> TestContext {
    let ctx = TestContext::new().with_engine(FakeEngine::new().with_status_script(script));
    ctx.repo.put(SOURCE, "pipeline.yml", MERGE_MASTER_PIPELINE);
    // no merge policy, never a merge-request candidate
    ctx.repo.put(SOURCE, ".dice/pipelines/build.yml", NO_POLICY_PIPELINE);
    ctx
}

#[tokio::test(start_paused = true)]
async fn test_successful_run_is_reported_once() {
    let ctx = context(vec![RunStatus::Running, RunStatus::Running, RunStatus::Success]);
    let orchestrator = ctx.orchestrator();

    let outcomes = orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();
    assert_eq!(
        outcomes,
        vec![TriggerOutcome::Dispatched {
            pipeline: "pipeline.yml".into(),
            run: RunHandle::new(1000),
            watched: true,
        }]
    );

    let watched = assert_completes_within(orchestrator.wait_for_watches(), Duration::from_secs(60)).await;
    assert_eq!(watched, vec![WatchOutcome::Completed(CheckRunResult::Success)]);

    let reports = ctx.reviews.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, CheckRunStatus::InProgress);
    assert_eq!(reports[0].result, None);
    assert_eq!(reports[1].status, CheckRunStatus::Completed);
    assert_eq!(reports[1].result, Some(CheckRunResult::Success));
    for report in &reports {
        assert_eq!(report.name, "feature/login/pipeline.yml");
        assert_eq!(report.review_request_id, ReviewRequestId::new(5));
        assert_eq!(report.run, RunHandle::new(1000));
        assert_eq!(report.commit, "abc123");
    }
    assert_eq!(ctx.engine.polls().len(), 3);
    assert!(ctx.reviews.closed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_request_is_forced_and_named_per_workspace() {
    let ctx = context(vec![RunStatus::Success]);
    let orchestrator = ctx.orchestrator();

    orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();
    orchestrator.wait_for_watches().await;

    let submitted = ctx.engine.submitted();
    assert_eq!(submitted.len(), 1);
    let request = &submitted[0];
    assert_eq!(request.pipeline_yml_name, "123123/DEV/feature/login/pipeline.yml");
    assert_eq!(request.branch, SOURCE);
    assert_eq!(request.user_id, "merger");
    assert!(request.force_run);
    assert_eq!(request.trigger_mode, TriggerMode::Merge);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_closes_review_request_once() {
    let ctx = context(vec![RunStatus::Running, RunStatus::Failed]);
    let orchestrator = ctx.orchestrator();

    orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();
    let watched = orchestrator.wait_for_watches().await;

    assert_eq!(watched, vec![WatchOutcome::Completed(CheckRunResult::Failure)]);
    assert_eq!(
        ctx.reviews.reports().last().and_then(|r| r.result),
        Some(CheckRunResult::Failure)
    );
    assert_eq!(
        ctx.reviews.closed(),
        vec![(AppId::new(APP_ID), ReviewRequestId::new(5), "merger".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_closes_review_request() {
    let ctx = context(vec![RunStatus::StopByUser]);
    let orchestrator = ctx.orchestrator();

    orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();

    assert_eq!(
        orchestrator.wait_for_watches().await,
        vec![WatchOutcome::Completed(CheckRunResult::Cancelled)]
    );
    assert_eq!(ctx.reviews.closed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_errors_are_retried() {
    let ctx = context(vec![RunStatus::Success]);
    ctx.engine.fail_next_polls(3);
    let orchestrator = ctx.orchestrator();

    orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();

    assert_eq!(
        orchestrator.wait_for_watches().await,
        vec![WatchOutcome::Completed(CheckRunResult::Success)]
    );
    assert_eq!(ctx.engine.polls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_report_failure_does_not_close() {
    let ctx = context(vec![RunStatus::Failed]);
    ctx.reviews.fail_completed_reports();
    let orchestrator = ctx.orchestrator();

    orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();

    assert_eq!(
        orchestrator.wait_for_watches().await,
        vec![WatchOutcome::ReportFailed]
    );
    assert_eq!(ctx.reviews.reports().len(), 1);
    assert!(ctx.reviews.closed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_matching_definition_is_not_found() {
    let ctx = context(vec![RunStatus::Success]);

    let err = ctx
        .orchestrator()
        .handle_event(&merge_request(5, SOURCE, "develop"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(ctx.engine.submitted().is_empty());
    assert!(ctx.reviews.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_outstanding_watches() {
    let ctx = context(vec![RunStatus::Running]);
    let orchestrator = ctx.orchestrator();

    orchestrator
        .handle_event(&merge_request(5, SOURCE, "master"))
        .await
        .unwrap();
    orchestrator
        .handle_event(&merge_request(6, SOURCE, "master"))
        .await
        .unwrap();
    assert_eq!(orchestrator.active_watches().await, 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    orchestrator.shutdown();

    let watched = orchestrator.wait_for_watches().await;
    assert_eq!(watched, vec![WatchOutcome::Shutdown, WatchOutcome::Shutdown]);
    assert_eq!(ctx.reviews.reports().len(), 2);
    assert!(ctx.reviews.closed().is_empty());
}
