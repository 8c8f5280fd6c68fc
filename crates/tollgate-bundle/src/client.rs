//! Platform API client.
//!
//! Every platform endpoint answers with the same envelope:
//! `{"success": bool, "data": ..., "err": {"code", "msg", "ctx"}}`. A failed
//! call surfaces its `err` as [`EngineError`] so callers can inspect the
//! structured context.

use crate::config::BundleConfig;
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tollgate_core::branch::{BranchRule, Scope};
use tollgate_core::checkrun::CheckRunReport;
use tollgate_core::ids::{AppId, ReviewRequestId, RunHandle};
use tollgate_core::pipeline::{DICE_PIPELINE_PATH, ERDA_PIPELINE_PATH};
use tollgate_core::ports::{
    ApplicationDirectory, BranchRuleStore, DefinitionSource, PipelineEngine, ReviewSystem,
};
use tollgate_core::run::{Application, RunRequest, RunSummary};
use tollgate_core::{EngineError, Error, Result};
use tracing::{debug, warn};
use url::Url;

pub const USER_HEADER: &str = "User-ID";
pub const ORG_HEADER: &str = "Org-ID";
pub const INTERNAL_HEADER: &str = "Internal-Client";

const ROOT_PIPELINE_FILE: &str = "pipeline.yml";

#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    err: Option<EngineError>,
}

#[derive(Deserialize)]
struct CreatedRun {
    id: RunHandle,
}

#[derive(Deserialize)]
struct TreeEntry {
    name: String,
}

#[derive(Deserialize)]
struct FileContent {
    content: String,
}

/// Client for the platform's pipeline, repository and rule services.
pub struct BundleClient {
    client: Client,
    base_url: Url,
    org_id: Option<u64>,
    user_id: String,
}

impl BundleClient {
    pub fn new(config: &BundleConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::InvalidInput(format!("bundle base_url {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidInput(format!(
                "bundle base_url {:?} cannot carry a path",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("build http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            org_id: config.org_id,
            user_id: config.user_id.clone(),
        })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url, user_id: &str) -> RequestBuilder {
        let user_id = if user_id.is_empty() { self.user_id.as_str() } else { user_id };
        let mut req = self
            .client
            .request(method, url)
            .header(USER_HEADER, user_id)
            .header(INTERNAL_HEADER, "tollgate");
        if let Some(org_id) = self.org_id {
            req = req.header(ORG_HEADER, org_id.to_string());
        }
        req
    }

    /// Send and unwrap the envelope; `data` may be absent.
    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<Option<T>> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Network(format!("{what}: {e}")))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("{what}: {e}")))?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Err(match status {
                    StatusCode::NOT_FOUND => Error::NotFound(what.to_string()),
                    s if !s.is_success() => Error::Internal(format!("{what}: {s}")),
                    _ => Error::Serialization(format!("{what}: {e}")),
                });
            }
        };

        if status.is_success() && envelope.success {
            debug!(what, status = %status, "Platform call succeeded");
            return Ok(envelope.data);
        }
        match envelope.err {
            Some(err) => Err(Error::Engine(err)),
            None if status == StatusCode::NOT_FOUND => Err(Error::NotFound(what.to_string())),
            None => Err(Error::Internal(format!("{what}: {status}"))),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        self.call(req, what)
            .await?
            .ok_or_else(|| Error::Serialization(format!("{what}: response carried no data")))
    }

    async fn search_files(
        &self,
        app: &Application,
        branch: &str,
        pattern: &str,
        base_path: &str,
        depth: u32,
        user_id: &str,
    ) -> Result<Vec<String>> {
        let app_id = app.id.to_string();
        let url = self.url(["app-repo", app_id.as_str(), "tree-search"]);
        let depth = depth.to_string();
        let req = self.request(Method::GET, url, user_id).query(&[
            ("ref", branch),
            ("pattern", pattern),
            ("basePath", base_path),
            ("depth", depth.as_str()),
        ]);
        let entries: Option<Vec<TreeEntry>> = self.call(req, "search pipeline files").await?;
        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                if base_path.is_empty() {
                    entry.name
                } else {
                    format!("{base_path}/{}", entry.name)
                }
            })
            .collect())
    }

    fn repo_segments(app: &Application) -> Result<Vec<String>> {
        if app.git_repo.is_empty() {
            return Ok(vec!["app-repo".to_string(), app.id.to_string()]);
        }
        let repo = Url::parse(&app.git_repo)
            .map_err(|e| Error::InvalidInput(format!("git repo {:?}: {e}", app.git_repo)))?;
        Ok(repo
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PipelineEngine for BundleClient {
    async fn create_run(&self, request: &RunRequest) -> Result<RunHandle> {
        let url = self.url(["api", "v2", "pipelines"]);
        let req = self.request(Method::POST, url, &request.user_id).json(request);
        let created: CreatedRun = self.fetch(req, "create pipeline").await?;
        Ok(created.id)
    }

    async fn get_run_status(&self, run: RunHandle) -> Result<RunSummary> {
        let id = run.to_string();
        let url = self.url(["api", "pipelines", id.as_str()]);
        let req = self.request(Method::GET, url, "");
        self.fetch(req, &format!("get pipeline {run}")).await
    }

    async fn cancel_run(&self, run: RunHandle, user_id: &str) -> Result<()> {
        let id = run.to_string();
        let url = self.url(["api", "pipelines", id.as_str(), "actions", "cancel"]);
        let req = self.request(Method::POST, url, user_id);
        self.call::<serde_json::Value>(req, &format!("cancel pipeline {run}"))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl BranchRuleStore for BundleClient {
    async fn query(&self, scope: Scope) -> Result<Vec<BranchRule>> {
        let url = self.url(["api", "branch-rules"]);
        let scope_type = scope.scope_type.to_string();
        let scope_id = scope.scope_id.to_string();
        let req = self
            .request(Method::GET, url, "")
            .query(&[("scopeType", scope_type.as_str()), ("scopeId", scope_id.as_str())]);
        let rules: Option<Vec<BranchRule>> = self.call(req, "query branch rules").await?;
        Ok(rules.unwrap_or_default())
    }
}

#[async_trait]
impl ReviewSystem for BundleClient {
    async fn create_or_update_check_run(
        &self,
        app_id: AppId,
        report: &CheckRunReport,
        user_id: &str,
    ) -> Result<()> {
        let app_id = app_id.to_string();
        let url = self.url(["app-repo", app_id.as_str(), "check-runs"]);
        let req = self.request(Method::POST, url, user_id).json(report);
        self.call::<serde_json::Value>(req, "create check run")
            .await
            .map(|_| ())
    }

    async fn close_review_request(
        &self,
        app_id: AppId,
        review_request_id: ReviewRequestId,
        user_id: &str,
    ) -> Result<()> {
        let app_id = app_id.to_string();
        let mr_id = review_request_id.to_string();
        let url = self.url([
            "app-repo",
            app_id.as_str(),
            "merge-request",
            mr_id.as_str(),
            "close",
        ]);
        // answers with an empty body; only the status counts
        let resp = self
            .request(Method::GET, url, user_id)
            .send()
            .await
            .map_err(|e| Error::Network(format!("close merge request {mr_id}: {e}")))?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("merge request {mr_id}"))),
            s => Err(Error::Internal(format!("close merge request {mr_id}: {s}"))),
        }
    }
}

#[async_trait]
impl DefinitionSource for BundleClient {
    /// Root `pipeline.yml` plus every `*.yml` under the pipeline folders. A
    /// failed search is skipped unless all of them fail.
    async fn list_definitions(
        &self,
        app: &Application,
        branch: &str,
        user_id: &str,
    ) -> Result<Vec<String>> {
        let searches = [
            (ROOT_PIPELINE_FILE, "", 1),
            ("*.yml", DICE_PIPELINE_PATH, 3),
            ("*.yml", ERDA_PIPELINE_PATH, 3),
        ];
        let results = join_all(searches.into_iter().map(|(pattern, base_path, depth)| {
            self.search_files(app, branch, pattern, base_path, depth, user_id)
        }))
        .await;

        let mut paths = Vec::new();
        let mut last_err = None;
        let mut succeeded = 0;
        for ((_, base_path, _), result) in searches.into_iter().zip(results) {
            match result {
                Ok(found) => {
                    succeeded += 1;
                    paths.extend(found);
                }
                Err(e) => {
                    warn!(app_id = %app.id, branch, base_path, error = %e, "Pipeline file search failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(paths),
        }
    }

    async fn fetch_definition(
        &self,
        app: &Application,
        branch: &str,
        path: &str,
        user_id: &str,
    ) -> Result<String> {
        if branch.is_empty() || path.is_empty() {
            return Err(Error::InvalidInput("fetch definition needs a branch and a path".into()));
        }
        let repo = Self::repo_segments(app)?;
        let segments = repo
            .iter()
            .map(String::as_str)
            .chain(["blob"])
            .chain(branch.split('/').filter(|s| !s.is_empty()))
            .chain(path.split('/').filter(|s| !s.is_empty()));
        let url = self.url(segments);
        let req = self.request(Method::GET, url, user_id);
        let file: FileContent = self.fetch(req, &format!("fetch {path}")).await?;
        Ok(file.content)
    }
}

#[async_trait]
impl ApplicationDirectory for BundleClient {
    async fn get_app(&self, app_id: AppId) -> Result<Application> {
        let id = app_id.to_string();
        let url = self.url(["api", "applications", id.as_str()]);
        let req = self.request(Method::GET, url, "");
        self.fetch(req, &format!("get application {app_id}")).await
    }
}
