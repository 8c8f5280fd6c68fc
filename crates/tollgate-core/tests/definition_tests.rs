//! Pipeline definition codec and approval rewrite tests.

use pretty_assertions::assert_eq;
use tollgate_core::events::EventKind;
use tollgate_core::pipeline::{ActionTimeout, PipelineDefinition};

const DEPLOY_PIPELINE: &str = r#"
version: "1.1"
envs:
  GOPROXY: https://goproxy.io
on:
  push:
    branches: [master]
stages:
  - stage:
      - git-checkout:
          alias: repo
  - stage:
      - golang:
          alias: build
          params:
            command: go build ./...
          timeout: 1200
  - stage:
      - release:
          params:
            dice_yml: ${repo}/dice.yml
      - custom-script:
          commands:
            - echo done
  - stage:
      - dice:
          params:
            release_id: ${release:OUTPUT:releaseID}
          timeout: 3600
"#;

const DEPLOY_PIPELINE_UNBOUNDED: &str = r#"
version: "1.1"
envs:
  GOPROXY: https://goproxy.io
on:
  push:
    branches: [master]
stages:
  - stage:
      - git-checkout:
          alias: repo
  - stage:
      - golang:
          alias: build
          params:
            command: go build ./...
          timeout: 1200
  - stage:
      - release:
          params:
            dice_yml: ${repo}/dice.yml
      - custom-script:
          commands:
            - echo done
  - stage:
      - dice:
          params:
            release_id: ${release:OUTPUT:releaseID}
          timeout: -1
"#;

#[test]
fn test_approval_rewrite_matches_snapshot() {
    let def = PipelineDefinition::parse(DEPLOY_PIPELINE).expect("parse");
    let expected = PipelineDefinition::parse(DEPLOY_PIPELINE_UNBOUNDED).expect("parse");

    let rewritten = def.with_unbounded_timeouts(&["dice".to_string()]);

    assert_eq!(rewritten, expected);
}

#[test]
fn test_rewrite_adds_timeout_where_none_was_set() {
    let def = PipelineDefinition::parse(DEPLOY_PIPELINE).expect("parse");
    let rewritten = def.with_unbounded_timeouts(&["release".to_string()]);

    let release = rewritten
        .actions()
        .find(|a| a.action_type == "release")
        .expect("release action");
    assert_eq!(release.spec.timeout, Some(ActionTimeout::Unbounded));
}

#[test]
fn test_rewrite_with_no_matching_type_is_identity() {
    let def = PipelineDefinition::parse(DEPLOY_PIPELINE).expect("parse");
    assert_eq!(def.with_unbounded_timeouts(&["helm".to_string()]), def);
}

#[test]
fn test_yaml_roundtrip_keeps_unmodelled_keys() {
    let def = PipelineDefinition::parse(DEPLOY_PIPELINE).expect("parse");
    let yaml = def.to_yaml().expect("serialize");
    let reparsed = PipelineDefinition::parse(&yaml).expect("reparse");

    assert_eq!(reparsed, def);
    assert!(reparsed.extra.contains_key("envs"));
    let script = reparsed
        .actions()
        .find(|a| a.action_type == "custom-script")
        .expect("custom-script action");
    assert!(script.spec.extra.contains_key("commands"));
}

#[test]
fn test_rewritten_yaml_serializes_unbounded_as_negative_one() {
    let def = PipelineDefinition::parse(DEPLOY_PIPELINE).expect("parse");
    let yaml = def
        .with_unbounded_timeouts(&["dice".to_string()])
        .to_yaml()
        .expect("serialize");
    assert!(yaml.contains("timeout: -1"), "{yaml}");
}

#[test]
fn test_definition_without_on_block_has_no_policies() {
    let def = PipelineDefinition::parse("version: '1.1'\nstages: []\n").expect("parse");
    assert!(def.trigger_filter(EventKind::Push).is_none());
    assert!(def.trigger_filter(EventKind::MergeRequest).is_none());
}
