//! Branch policy resolution against the rule store.

use std::collections::BTreeMap;
use std::sync::Arc;
use tollgate_core::branch::{self, BranchRule, Scope, ScopeType, Workspace, strip_ref_prefix};
use tollgate_core::ports::BranchRuleStore;
use tollgate_core::run::Application;
use tollgate_core::{Error, Result};
use tracing::debug;

/// Maps git references to the branch rule governing them.
///
/// Rules are read fresh from the store on every call.
pub struct BranchPolicyResolver {
    store: Arc<dyn BranchRuleStore>,
    scope_type: ScopeType,
}

impl BranchPolicyResolver {
    pub fn new(store: Arc<dyn BranchRuleStore>, scope_type: ScopeType) -> Self {
        Self { store, scope_type }
    }

    pub fn scope_for(&self, app: &Application) -> Scope {
        let scope_id = match self.scope_type {
            ScopeType::Org => app.org_id.get(),
            ScopeType::Project => app.project_id.get(),
            ScopeType::App => app.id.get(),
        };
        Scope::new(self.scope_type, scope_id)
    }

    pub async fn rules_for(&self, app: &Application) -> Result<Vec<BranchRule>> {
        let scope = self.scope_for(app);
        self.store
            .query(scope)
            .await
            .map_err(|e| e.context(format!("query branch rules of {scope}")))
    }

    /// The rule governing `reference`; the default rule when none matches.
    pub async fn resolve(&self, app: &Application, reference: &str) -> Result<BranchRule> {
        let rules = self.rules_for(app).await?;
        let rule = branch::resolve(reference, &rules);
        debug!(
            app_id = %app.id,
            reference,
            rule_id = rule.id,
            workspace = ?rule.workspace,
            trigger = rule.is_trigger_pipeline,
            "Resolved branch rule"
        );
        Ok(rule)
    }

    /// Like [`resolve`](Self::resolve), but a reference no rule covers is an
    /// error.
    pub async fn rule_for(&self, app: &Application, reference: &str) -> Result<BranchRule> {
        let rule = self.resolve(app, reference).await?;
        if !rule.is_matched() {
            return Err(Error::NotFound(format!(
                "branch rule for {}",
                strip_ref_prefix(reference)
            )));
        }
        Ok(rule)
    }

    pub async fn branch_workspaces(
        &self,
        app: &Application,
        branches: &[String],
    ) -> Result<BTreeMap<String, Workspace>> {
        let rules = self.rules_for(app).await?;
        Ok(branch::valid_branch_workspaces(branches, &rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tollgate_core::ErrorKind;
    use tollgate_core::ids::{AppId, OrgId, ProjectId};

    struct StaticRules {
        rules: Vec<BranchRule>,
        queried: Mutex<Vec<Scope>>,
    }

    #[async_trait]
    impl BranchRuleStore for StaticRules {
        async fn query(&self, scope: Scope) -> Result<Vec<BranchRule>> {
            self.queried.lock().unwrap().push(scope);
            Ok(self.rules.clone())
        }
    }

    fn app() -> Application {
        Application {
            id: AppId::new(3),
            name: "web".into(),
            project_id: ProjectId::new(2),
            org_id: OrgId::new(1),
            org_name: "terminus".into(),
            git_repo: String::new(),
        }
    }

    fn store() -> Arc<StaticRules> {
        Arc::new(StaticRules {
            rules: vec![
                BranchRule {
                    id: 1,
                    rule: "master".into(),
                    workspace: Some(Workspace::Prod),
                    is_trigger_pipeline: true,
                    need_approval: true,
                    ..Default::default()
                },
                BranchRule {
                    id: 2,
                    rule: "feature/*".into(),
                    workspace: Some(Workspace::Dev),
                    ..Default::default()
                },
            ],
            queried: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_queries_configured_scope() {
        let store = store();
        for (scope_type, expected) in [(ScopeType::Org, 1), (ScopeType::Project, 2), (ScopeType::App, 3)] {
            let resolver = BranchPolicyResolver::new(store.clone(), scope_type);
            resolver.resolve(&app(), "master").await.unwrap();
            let last = *store.queried.lock().unwrap().last().unwrap();
            assert_eq!(last, Scope::new(scope_type, expected));
        }
    }

    #[tokio::test]
    async fn test_resolve_and_rule_for() {
        let resolver = BranchPolicyResolver::new(store(), ScopeType::Project);

        let rule = resolver.resolve(&app(), "refs/heads/master").await.unwrap();
        assert_eq!(rule.id, 1);
        assert!(rule.need_approval);

        let unmatched = resolver.resolve(&app(), "hotfix/x").await.unwrap();
        assert_eq!(unmatched, BranchRule::default());

        let err = resolver.rule_for(&app(), "hotfix/x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_branch_workspaces() {
        let resolver = BranchPolicyResolver::new(store(), ScopeType::Project);
        let map = resolver
            .branch_workspaces(&app(), &["master".into(), "feature/a".into(), "tmp".into()])
            .await
            .unwrap();
        assert_eq!(map.get("feature/a"), Some(&Workspace::Dev));
        assert_eq!(map.len(), 2);
    }
}
