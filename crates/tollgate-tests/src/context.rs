//! Test context wiring the fakes into an orchestrator.

use crate::fakes::{FakeApps, FakeEngine, FakeRepository, FakeReviews, FakeRuleStore};
use crate::fixtures;
use std::sync::Arc;
use tollgate_scheduler::{Collaborators, Orchestrator, TollgateConfig};

pub const UI_PUBLIC_URL: &str = "https://erda.example.com/";

/// Every fake the orchestrator talks to, plus its config.
pub struct TestContext {
    pub engine: Arc<FakeEngine>,
    pub rules: Arc<FakeRuleStore>,
    pub reviews: Arc<FakeReviews>,
    pub repo: Arc<FakeRepository>,
    pub apps: Arc<FakeApps>,
    pub config: TollgateConfig,
}

impl TestContext {
    /// The fixture app with the gitflow rule set and an empty repository.
    pub fn new() -> Self {
        crate::init_test_logging();

        Self {
            engine: Arc::new(FakeEngine::new()),
            rules: Arc::new(FakeRuleStore::new(fixtures::gitflow_rules())),
            reviews: Arc::new(FakeReviews::new()),
            repo: Arc::new(FakeRepository::new()),
            apps: Arc::new(FakeApps::with_app(fixtures::app())),
            config: TollgateConfig::default().with_ui_public_url(UI_PUBLIC_URL),
        }
    }

    /// Replace the engine, e.g. with one that plays a status script.
    pub fn with_engine(mut self, engine: FakeEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            engine: self.engine.clone(),
            rules: self.rules.clone(),
            reviews: self.reviews.clone(),
            definitions: self.repo.clone(),
            apps: self.apps.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.collaborators(), &self.config)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
