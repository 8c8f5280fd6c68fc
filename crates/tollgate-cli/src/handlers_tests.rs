//! Tests for the offline command handlers.

#[cfg(test)]
mod tests {
    use crate::handlers::{decide, load_definition, load_event, load_rules, rewritten, watch_label};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tollgate_core::branch::Workspace;
    use tollgate_core::checkrun::CheckRunResult;
    use tollgate_core::events::{EventKind, TriggerEvent};
    use tollgate_scheduler::{DecisionSource, WatchOutcome};

    const RULES: &str = r#"
- rule: master
  workspace: PROD
  isTriggerPipeline: true
  needApproval: true
- rule: "feature/*"
  workspace: DEV
- rule: develop
  workspace: TEST
  isTriggerPipeline: true
"#;

    const DEFINITION: &str = r#"
version: "1.1"
on:
  merge:
    branches: [master]
stages:
  - stage:
      - dice:
          params:
            release_id: "1"
          timeout: 600
"#;

    fn file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_rules_file() {
        let rules = load_rules(file(RULES).path()).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].workspace, Some(Workspace::Prod));
        assert!(!rules[1].is_trigger_pipeline);
    }

    #[test]
    fn test_decide_falls_back_to_rule_without_push_policy() {
        let definition = load_definition(file(DEFINITION).path()).unwrap();
        let rules = load_rules(file(RULES).path()).unwrap();

        let (rule, decision) = decide(&definition, &rules, "refs/heads/develop", EventKind::Push);
        assert_eq!(rule.workspace, Some(Workspace::Test));
        assert!(decision.trigger);
        assert_eq!(decision.source, DecisionSource::BranchRule);
        assert!(!decision.extend_deploy_timeout);

        let (_, decision) = decide(&definition, &rules, "feature/x", EventKind::Push);
        assert!(!decision.trigger);

        let (_, decision) = decide(&definition, &rules, "feature/x", EventKind::Manual);
        assert!(decision.trigger);
    }

    #[test]
    fn test_decide_uses_merge_policy() {
        let definition = load_definition(file(DEFINITION).path()).unwrap();
        let rules = load_rules(file(RULES).path()).unwrap();

        let (_, decision) = decide(&definition, &rules, "master", EventKind::MergeRequest);
        assert!(decision.trigger);
        assert_eq!(decision.source, DecisionSource::Definition);
        assert!(decision.extend_deploy_timeout);

        let (_, decision) = decide(&definition, &rules, "develop", EventKind::MergeRequest);
        assert!(!decision.trigger);
    }

    #[test]
    fn test_rewritten_unbounds_deploy_actions() {
        let definition = load_definition(file(DEFINITION).path()).unwrap();
        let yaml = rewritten(&definition, &["dice".to_string()]).unwrap();
        assert!(yaml.contains("timeout: -1"));

        let untouched = rewritten(&definition, &["release".to_string()]).unwrap();
        assert!(untouched.contains("timeout: 600"));
    }

    #[test]
    fn test_invalid_definition_is_reported() {
        let err = load_definition(file("stages: []").path()).unwrap_err();
        assert!(err.to_string().starts_with("parse definition"));
    }

    #[test]
    fn test_load_json_event() {
        let event = load_event(
            file(r#"{"kind": "push", "app_id": 7, "reference": "refs/tags/v1", "pusher_id": "u1"}"#)
                .path(),
        )
        .unwrap();
        assert!(matches!(event, TriggerEvent::Push(_)));
        assert_eq!(event.kind(), EventKind::Tag);
    }

    #[test]
    fn test_load_event_rejects_incomplete_event() {
        let content = "kind: manual\napp_id: 7\nbranch: master\npipeline_yml_name: \"\"\nuser_id: u1\n";
        assert!(load_event(file(content).path()).is_err());
    }

    #[test]
    fn test_watch_labels() {
        assert_eq!(watch_label(&WatchOutcome::Completed(CheckRunResult::Failure)), "failure");
        assert_eq!(watch_label(&WatchOutcome::Shutdown), "interrupted");
    }
}
