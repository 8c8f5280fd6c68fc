//! In-memory implementations of the port traits.
//!
//! Every fake records the calls it receives and can be scripted to fail, so
//! tests can assert on side effects without any network.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tollgate_core::branch::{BranchRule, Scope};
use tollgate_core::checkrun::CheckRunReport;
use tollgate_core::error::PARALLEL_RUN_CONTEXT_KEY;
use tollgate_core::ids::{AppId, ReviewRequestId, RunHandle};
use tollgate_core::ports::{
    ApplicationDirectory, BranchRuleStore, DefinitionSource, PipelineEngine, ReviewSystem,
};
use tollgate_core::run::{Application, RunRequest, RunStatus, RunSummary};
use tollgate_core::{EngineError, Error, Result};

type Slot = (AppId, String, String);

/// Pipeline engine that enforces one live run per (app, branch, name) and
/// plays back a scripted status sequence for every run.
pub struct FakeEngine {
    next_id: AtomicU64,
    script: Mutex<Vec<RunStatus>>,
    statuses: Mutex<HashMap<RunHandle, VecDeque<RunStatus>>>,
    slots: Mutex<HashMap<Slot, RunHandle>>,
    create_errors: Mutex<VecDeque<Error>>,
    poll_errors: AtomicUsize,
    submitted: Mutex<Vec<RunRequest>>,
    polls: Mutex<Vec<RunHandle>>,
    cancelled: Mutex<Vec<(RunHandle, String)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            script: Mutex::new(vec![RunStatus::Running]),
            statuses: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
            create_errors: Mutex::new(VecDeque::new()),
            poll_errors: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Statuses every new run reports, one per poll. The last one repeats.
    pub fn with_status_script(self, script: Vec<RunStatus>) -> Self {
        *self.script.lock().unwrap() = script;
        self
    }

    /// Fail the next `create_run` with `err`.
    pub fn fail_next_create(&self, err: Error) {
        self.create_errors.lock().unwrap().push_back(err);
    }

    /// Fail the next `count` status polls.
    pub fn fail_next_polls(&self, count: usize) {
        self.poll_errors.store(count, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<RunRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn polls(&self) -> Vec<RunHandle> {
        self.polls.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<(RunHandle, String)> {
        self.cancelled.lock().unwrap().clone()
    }

    fn release(&self, run: RunHandle) {
        self.slots.lock().unwrap().retain(|_, live| *live != run);
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineEngine for FakeEngine {
    async fn create_run(&self, request: &RunRequest) -> Result<RunHandle> {
        self.submitted.lock().unwrap().push(request.clone());
        if let Some(err) = self.create_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let slot = (
            request.app_id,
            request.branch.clone(),
            request.pipeline_yml_name.clone(),
        );
        let mut slots = self.slots.lock().unwrap();
        if let Some(live) = slots.get(&slot)
            && !request.force_run
        {
            return Err(Error::Engine(
                EngineError::new("ErrCreatePipeline", "pipeline already running")
                    .with_context(json!({ PARALLEL_RUN_CONTEXT_KEY: live.to_string() })),
            ));
        }

        let run = RunHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        slots.insert(slot, run);
        let script = self.script.lock().unwrap().clone();
        self.statuses.lock().unwrap().insert(run, script.into());
        Ok(run)
    }

    async fn get_run_status(&self, run: RunHandle) -> Result<RunSummary> {
        self.polls.lock().unwrap().push(run);
        if self
            .poll_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Network("engine unavailable".into()));
        }

        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            let queue = statuses
                .get_mut(&run)
                .ok_or_else(|| Error::NotFound(format!("run {run}")))?;
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().copied()
            };
            next.unwrap_or(RunStatus::Unknown)
        };
        if status.is_end_status() {
            self.release(run);
        }
        Ok(RunSummary { id: run, status })
    }

    async fn cancel_run(&self, run: RunHandle, user_id: &str) -> Result<()> {
        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses
            .get_mut(&run)
            .ok_or_else(|| Error::NotFound(format!("run {run}")))?;
        *queue = VecDeque::from([RunStatus::StopByUser]);
        drop(statuses);

        self.release(run);
        self.cancelled.lock().unwrap().push((run, user_id.to_string()));
        Ok(())
    }
}

/// Branch rule store with scriptable transient failures.
#[derive(Default)]
pub struct FakeRuleStore {
    rules: Mutex<Vec<BranchRule>>,
    failures: AtomicUsize,
    queries: Mutex<Vec<Scope>>,
}

impl FakeRuleStore {
    pub fn new(rules: Vec<BranchRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Default::default()
        }
    }

    pub fn set_rules(&self, rules: Vec<BranchRule>) {
        *self.rules.lock().unwrap() = rules;
    }

    /// Fail the next `count` queries.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<Scope> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl BranchRuleStore for FakeRuleStore {
    async fn query(&self, scope: Scope) -> Result<Vec<BranchRule>> {
        self.queries.lock().unwrap().push(scope);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Network("rule store unavailable".into()));
        }
        Ok(self.rules.lock().unwrap().clone())
    }
}

/// Review system recording check-run updates and closures.
#[derive(Default)]
pub struct FakeReviews {
    reports: Mutex<Vec<(AppId, CheckRunReport)>>,
    closed: Mutex<Vec<(AppId, ReviewRequestId, String)>>,
    fail_completed_reports: AtomicBool,
}

impl FakeReviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every completed report; in-progress reports still succeed.
    pub fn fail_completed_reports(&self) {
        self.fail_completed_reports.store(true, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<CheckRunReport> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(_, report)| report.clone())
            .collect()
    }

    pub fn closed(&self) -> Vec<(AppId, ReviewRequestId, String)> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewSystem for FakeReviews {
    async fn create_or_update_check_run(
        &self,
        app_id: AppId,
        report: &CheckRunReport,
        _user_id: &str,
    ) -> Result<()> {
        if report.result.is_some() && self.fail_completed_reports.load(Ordering::SeqCst) {
            return Err(Error::Network("review system unavailable".into()));
        }
        self.reports.lock().unwrap().push((app_id, report.clone()));
        Ok(())
    }

    async fn close_review_request(
        &self,
        app_id: AppId,
        review_request_id: ReviewRequestId,
        user_id: &str,
    ) -> Result<()> {
        self.closed
            .lock()
            .unwrap()
            .push((app_id, review_request_id, user_id.to_string()));
        Ok(())
    }
}

/// Repository holding pipeline files per branch.
#[derive(Default)]
pub struct FakeRepository {
    files: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    list_failures: AtomicUsize,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        self.put(branch, path, content);
        self
    }

    pub fn put(&self, branch: &str, path: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .entry(branch.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
    }

    pub fn fail_next_list(&self, count: usize) {
        self.list_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DefinitionSource for FakeRepository {
    async fn list_definitions(
        &self,
        _app: &Application,
        branch: &str,
        _user_id: &str,
    ) -> Result<Vec<String>> {
        if self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Network("repository unavailable".into()));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(branch)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_definition(
        &self,
        _app: &Application,
        branch: &str,
        path: &str,
        _user_id: &str,
    ) -> Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(branch)
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| Error::NotFound(format!("{path} on {branch}")))
    }
}

/// Application directory backed by a map.
#[derive(Default)]
pub struct FakeApps {
    apps: Mutex<HashMap<AppId, Application>>,
}

impl FakeApps {
    pub fn with_app(app: Application) -> Self {
        let apps = Self::default();
        apps.apps.lock().unwrap().insert(app.id, app);
        apps
    }
}

#[async_trait]
impl ApplicationDirectory for FakeApps {
    async fn get_app(&self, app_id: AppId) -> Result<Application> {
        self.apps
            .lock()
            .unwrap()
            .get(&app_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("application {app_id}")))
    }
}
