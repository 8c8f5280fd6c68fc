//! Trigger evaluation.

use tollgate_core::branch::{BranchRule, is_ref_pattern_match};
use tollgate_core::events::EventKind;
use tollgate_core::pipeline::{PipelineDefinition, TriggerFilter};

/// Which policy made a trigger decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// The definition's own `on:` block for the event kind.
    Definition,
    /// The resolved branch rule's `is_trigger_pipeline` flag.
    BranchRule,
}

/// Go/no-go verdict for one definition and one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDecision {
    pub trigger: bool,
    pub source: DecisionSource,
    /// Deploy steps must not time out because the target needs approval.
    pub extend_deploy_timeout: bool,
}

/// Decides whether a pipeline run should start.
pub struct TriggerEvaluator;

impl TriggerEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// An explicit definition policy for the event kind shadows the branch
    /// rule entirely, including when its allow-list excludes `reference`.
    /// The timeout extension follows the rule's `need_approval` whichever
    /// policy decided.
    ///
    /// Manual runs always start; the rule only contributes its approval flag.
    pub fn evaluate(
        &self,
        definition: &PipelineDefinition,
        reference: &str,
        kind: EventKind,
        rule: &BranchRule,
    ) -> TriggerDecision {
        let (trigger, source) = match definition.trigger_filter(kind) {
            Some(filter) => (
                self.filter_matches(filter, reference, kind),
                DecisionSource::Definition,
            ),
            None if kind == EventKind::Manual => (true, DecisionSource::BranchRule),
            None => (rule.is_trigger_pipeline, DecisionSource::BranchRule),
        };

        TriggerDecision {
            trigger,
            source,
            extend_deploy_timeout: trigger && rule.need_approval,
        }
    }

    pub fn should_trigger(
        &self,
        definition: &PipelineDefinition,
        reference: &str,
        kind: EventKind,
        rule: &BranchRule,
    ) -> bool {
        self.evaluate(definition, reference, kind, rule).trigger
    }

    fn filter_matches(&self, filter: &TriggerFilter, reference: &str, kind: EventKind) -> bool {
        if filter.branches.is_empty() {
            // Tags only fire when explicitly listed
            return kind != EventKind::Tag;
        }
        is_ref_pattern_match(reference, &filter.branches)
    }
}

impl Default for TriggerEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::branch::Workspace;

    fn definition(yaml: &str) -> PipelineDefinition {
        PipelineDefinition::parse(yaml).unwrap()
    }

    fn rule(trigger: bool, need_approval: bool) -> BranchRule {
        BranchRule {
            rule: "*".into(),
            workspace: Some(Workspace::Dev),
            is_trigger_pipeline: trigger,
            need_approval,
            ..Default::default()
        }
    }

    const PUSH_MASTER_ONLY: &str = "version: \"1.1\"\non:\n  push:\n    branches: [master]\n";
    const NO_POLICY: &str = "version: \"1.1\"\n";

    #[test]
    fn test_explicit_policy_shadows_rule() {
        let evaluator = TriggerEvaluator::new();
        let def = definition(PUSH_MASTER_ONLY);

        let decision = evaluator.evaluate(&def, "refs/heads/develop", EventKind::Push, &rule(true, false));
        assert!(!decision.trigger);
        assert_eq!(decision.source, DecisionSource::Definition);

        assert!(evaluator.should_trigger(&def, "refs/heads/master", EventKind::Push, &rule(false, false)));
    }

    #[test]
    fn test_falls_back_to_rule_without_policy() {
        let evaluator = TriggerEvaluator::new();
        let def = definition(NO_POLICY);

        assert!(!evaluator.should_trigger(&def, "master", EventKind::Push, &rule(false, false)));
        let decision = evaluator.evaluate(&def, "master", EventKind::Push, &rule(true, false));
        assert!(decision.trigger);
        assert_eq!(decision.source, DecisionSource::BranchRule);
    }

    #[test]
    fn test_unmatched_rule_never_triggers() {
        let evaluator = TriggerEvaluator::new();
        let def = definition(NO_POLICY);
        assert!(!evaluator.should_trigger(&def, "wip", EventKind::Push, &BranchRule::default()));
    }

    #[test]
    fn test_push_policy_ignored_for_merge_requests() {
        let evaluator = TriggerEvaluator::new();
        let def = definition(PUSH_MASTER_ONLY);
        let decision = evaluator.evaluate(&def, "develop", EventKind::MergeRequest, &rule(true, false));
        assert!(decision.trigger);
        assert_eq!(decision.source, DecisionSource::BranchRule);
    }

    #[test]
    fn test_manual_runs_regardless_of_trigger_flag() {
        let evaluator = TriggerEvaluator::new();
        let def = definition(PUSH_MASTER_ONLY);
        assert!(evaluator.should_trigger(&def, "develop", EventKind::Manual, &rule(true, false)));

        let decision = evaluator.evaluate(&def, "develop", EventKind::Manual, &rule(false, true));
        assert!(decision.trigger);
        assert_eq!(decision.source, DecisionSource::BranchRule);
        assert!(decision.extend_deploy_timeout);

        let decision = evaluator.evaluate(&def, "wip", EventKind::Manual, &BranchRule::default());
        assert!(decision.trigger);
        assert!(!decision.extend_deploy_timeout);
    }

    #[test]
    fn test_empty_branch_list_matches_every_branch() {
        let evaluator = TriggerEvaluator::new();
        let def = definition("version: \"1.1\"\non:\n  push: {}\n");
        assert!(evaluator.should_trigger(&def, "anything", EventKind::Push, &rule(false, false)));
    }

    #[test]
    fn test_tag_policy() {
        let evaluator = TriggerEvaluator::new();
        let def = definition("version: \"1.1\"\non:\n  tag:\n    branches: [\"v*\"]\n");
        assert!(evaluator.should_trigger(&def, "refs/tags/v1.0", EventKind::Tag, &rule(false, false)));
        assert!(!evaluator.should_trigger(&def, "refs/tags/nightly", EventKind::Tag, &rule(true, false)));

        let def = definition("version: \"1.1\"\non:\n  tag: {}\n");
        assert!(!evaluator.should_trigger(&def, "refs/tags/v1.0", EventKind::Tag, &rule(true, false)));
    }

    #[test]
    fn test_approval_extends_timeout_only_when_triggering() {
        let evaluator = TriggerEvaluator::new();

        let decision = evaluator.evaluate(&definition(NO_POLICY), "master", EventKind::Push, &rule(true, true));
        assert!(decision.extend_deploy_timeout);

        let decision = evaluator.evaluate(&definition(NO_POLICY), "master", EventKind::Push, &rule(false, true));
        assert!(!decision.extend_deploy_timeout);

        // rule governs the extension even when the definition decided
        let decision = evaluator.evaluate(
            &definition(PUSH_MASTER_ONLY),
            "master",
            EventKind::Push,
            &rule(false, true),
        );
        assert!(decision.trigger);
        assert!(decision.extend_deploy_timeout);
    }
}
