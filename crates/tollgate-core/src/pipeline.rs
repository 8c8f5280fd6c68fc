//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML. Only the parts the
//! trigger core reasons about are modelled (`on:` policies, stages, actions
//! and their timeouts); every other key is carried through untouched so a
//! rewritten definition can be re-serialized without losing anything.

use crate::events::EventKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

pub const YML_SUFFIX: &str = ".yml";
pub const YAML_SUFFIX: &str = ".yaml";
pub const DICE_PIPELINE_PATH: &str = ".dice/pipelines";
pub const ERDA_PIPELINE_PATH: &str = ".erda/pipelines";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<TriggerPolicies>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Definition-level trigger policies (`on:` block).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerPolicies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<TriggerFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<TriggerFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TriggerFilter>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerFilter {
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One stage: actions that run in parallel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStage", into = "RawStage")]
pub struct Stage {
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub action_type: String,
    pub spec: ActionSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<ActionTimeout>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Action timeout in seconds. On the wire a negative number means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ActionTimeout {
    Seconds(u64),
    Unbounded,
}

impl From<i64> for ActionTimeout {
    fn from(value: i64) -> Self {
        u64::try_from(value)
            .map(ActionTimeout::Seconds)
            .unwrap_or(ActionTimeout::Unbounded)
    }
}

impl From<ActionTimeout> for i64 {
    fn from(value: ActionTimeout) -> Self {
        match value {
            ActionTimeout::Seconds(secs) => i64::try_from(secs).unwrap_or(i64::MAX),
            ActionTimeout::Unbounded => -1,
        }
    }
}

/// Wire shape of a stage: `stage: [ {<type>: <spec>}, ... ]`.
#[derive(Serialize, Deserialize)]
struct RawStage {
    stage: Vec<BTreeMap<String, ActionSpec>>,
}

impl TryFrom<RawStage> for Stage {
    type Error = String;

    fn try_from(raw: RawStage) -> std::result::Result<Self, Self::Error> {
        let actions = raw
            .stage
            .into_iter()
            .map(|entry| {
                if entry.len() != 1 {
                    return Err(format!(
                        "each stage entry must name exactly one action, found {}",
                        entry.len()
                    ));
                }
                entry
                    .into_iter()
                    .next()
                    .map(|(action_type, spec)| Action { action_type, spec })
                    .ok_or_else(|| "empty stage entry".to_string())
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Stage { actions })
    }
}

impl From<Stage> for RawStage {
    fn from(stage: Stage) -> Self {
        RawStage {
            stage: stage
                .actions
                .into_iter()
                .map(|action| BTreeMap::from([(action.action_type, action.spec)]))
                .collect(),
        }
    }
}

impl PipelineDefinition {
    /// Parse a pipeline definition from YAML.
    pub fn parse(yaml: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(yaml)?;
        if definition.version.trim().is_empty() {
            return Err(Error::InvalidDefinition("missing version".into()));
        }
        Ok(definition)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The definition's own trigger policy for an event kind, if declared.
    ///
    /// Manual events never have one.
    pub fn trigger_filter(&self, kind: EventKind) -> Option<&TriggerFilter> {
        let on = self.on.as_ref()?;
        match kind {
            EventKind::Push => on.push.as_ref(),
            EventKind::Tag => on.tag.as_ref(),
            EventKind::MergeRequest => on.merge.as_ref(),
            EventKind::Manual => None,
        }
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.stages.iter().flat_map(|s| s.actions.iter())
    }

    /// A copy of this definition in which every action whose type is listed
    /// in `action_types` has an unbounded timeout. `self` is left untouched.
    pub fn with_unbounded_timeouts(&self, action_types: &[String]) -> PipelineDefinition {
        let stages = self
            .stages
            .iter()
            .map(|stage| Stage {
                actions: stage
                    .actions
                    .iter()
                    .map(|action| {
                        let mut action = action.clone();
                        if action_types.iter().any(|t| *t == action.action_type) {
                            action.spec.timeout = Some(ActionTimeout::Unbounded);
                        }
                        action
                    })
                    .collect(),
            })
            .collect();

        PipelineDefinition {
            stages,
            ..self.clone()
        }
    }
}

/// Split a definition path into its file name and well-known directory.
///
/// The file name is only kept when it carries a YAML suffix.
pub fn split_yml_path(name: &str) -> (Option<&str>, Option<&'static str>) {
    let file = name.rsplit('/').next().unwrap_or(name);
    let file = (file.ends_with(YML_SUFFIX) || file.ends_with(YAML_SUFFIX)).then_some(file);

    let dir = if name.contains(ERDA_PIPELINE_PATH) {
        Some(ERDA_PIPELINE_PATH)
    } else if name.contains(DICE_PIPELINE_PATH) {
        Some(DICE_PIPELINE_PATH)
    } else {
        None
    };
    (file, dir)
}
