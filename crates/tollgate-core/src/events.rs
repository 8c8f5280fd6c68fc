//! Inbound events that may trigger pipelines.

use crate::branch::{is_tag_ref, strip_ref_prefix};
use crate::ids::{AppId, EventId, ReviewRequestId};
use crate::run::TriggerMode;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Push,
    Tag,
    MergeRequest,
    Manual,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Push => "push",
            EventKind::Tag => "tag",
            EventKind::MergeRequest => "merge_request",
            EventKind::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEvent {
    Push(PushEvent),
    MergeRequest(MergeRequestEvent),
    Manual(ManualEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub app_id: AppId,
    /// Full git reference, e.g. `refs/heads/master` or `refs/tags/v1.0`.
    pub reference: String,
    #[serde(default)]
    pub commit: String,
    pub pusher_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestEvent {
    pub app_id: AppId,
    pub review_request_id: ReviewRequestId,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub source_sha: String,
    pub author_id: String,
    #[serde(default)]
    pub merge_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualEvent {
    pub app_id: AppId,
    pub branch: String,
    pub pipeline_yml_name: String,
    pub user_id: String,
    #[serde(default)]
    pub force_run: bool,
}

impl TriggerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TriggerEvent::Push(p) if is_tag_ref(&p.reference) => EventKind::Tag,
            TriggerEvent::Push(_) => EventKind::Push,
            TriggerEvent::MergeRequest(_) => EventKind::MergeRequest,
            TriggerEvent::Manual(_) => EventKind::Manual,
        }
    }

    pub fn app_id(&self) -> AppId {
        match self {
            TriggerEvent::Push(p) => p.app_id,
            TriggerEvent::MergeRequest(m) => m.app_id,
            TriggerEvent::Manual(m) => m.app_id,
        }
    }

    /// Reference the trigger policies are checked against. For merge
    /// requests this is the branch being merged into.
    pub fn trigger_reference(&self) -> &str {
        match self {
            TriggerEvent::Push(p) => &p.reference,
            TriggerEvent::MergeRequest(m) => &m.target_branch,
            TriggerEvent::Manual(m) => &m.branch,
        }
    }

    /// Branch the run itself executes on.
    pub fn run_branch(&self) -> &str {
        match self {
            TriggerEvent::Push(p) => strip_ref_prefix(&p.reference),
            TriggerEvent::MergeRequest(m) => &m.source_branch,
            TriggerEvent::Manual(m) => &m.branch,
        }
    }

    pub fn initiator(&self) -> &str {
        match self {
            TriggerEvent::Push(p) => &p.pusher_id,
            TriggerEvent::MergeRequest(m) => &m.author_id,
            TriggerEvent::Manual(m) => &m.user_id,
        }
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        match self {
            TriggerEvent::Push(_) => TriggerMode::Push,
            TriggerEvent::MergeRequest(_) => TriggerMode::Merge,
            TriggerEvent::Manual(_) => TriggerMode::Manual,
        }
    }

    /// Reject events missing a field the trigger flow depends on.
    pub fn validate(&self) -> Result<()> {
        fn require(field: &str, value: &str) -> Result<()> {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("missing {field}")));
            }
            Ok(())
        }

        if self.app_id().get() == 0 {
            return Err(Error::InvalidInput("missing app id".into()));
        }
        match self {
            TriggerEvent::Push(p) => {
                require("reference", &p.reference)?;
                require("branch", strip_ref_prefix(&p.reference))
            }
            TriggerEvent::MergeRequest(m) => {
                require("source branch", &m.source_branch)?;
                require("target branch", &m.target_branch)?;
                if m.review_request_id.get() == 0 {
                    return Err(Error::InvalidInput("missing merge request id".into()));
                }
                Ok(())
            }
            TriggerEvent::Manual(m) => {
                require("branch", &m.branch)?;
                require("pipeline yml name", &m.pipeline_yml_name)
            }
        }
    }
}

/// An event as it travels through the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub received_at: DateTime<Utc>,
    pub event: TriggerEvent,
}

impl EventEnvelope {
    pub fn new(event: TriggerEvent) -> Self {
        Self {
            id: EventId::new(),
            received_at: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(reference: &str) -> TriggerEvent {
        TriggerEvent::Push(PushEvent {
            app_id: AppId::new(1),
            reference: reference.to_string(),
            commit: "abc".into(),
            pusher_id: "u1".into(),
        })
    }

    #[test]
    fn test_tag_push_is_tag_kind() {
        assert_eq!(push("refs/tags/v1.0").kind(), EventKind::Tag);
        assert_eq!(push("refs/heads/master").kind(), EventKind::Push);
        assert_eq!(push("refs/heads/master").run_branch(), "master");
    }

    #[test]
    fn test_merge_request_references() {
        let event = TriggerEvent::MergeRequest(MergeRequestEvent {
            app_id: AppId::new(1),
            review_request_id: ReviewRequestId::new(3),
            source_branch: "feature/a".into(),
            target_branch: "master".into(),
            source_sha: "abc".into(),
            author_id: "u1".into(),
            merge_user_id: "u2".into(),
        });
        assert_eq!(event.trigger_reference(), "master");
        assert_eq!(event.run_branch(), "feature/a");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_branch() {
        let err = push("refs/heads/").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_validate_rejects_missing_app() {
        let event = TriggerEvent::Manual(ManualEvent {
            app_id: AppId::new(0),
            branch: "master".into(),
            pipeline_yml_name: "pipeline.yml".into(),
            user_id: "u1".into(),
            force_run: false,
        });
        assert!(matches!(event.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_event_json_shape() {
        let event: TriggerEvent = serde_json::from_str(
            r#"{"kind":"manual","app_id":7,"branch":"develop","pipeline_yml_name":"pipeline.yml","user_id":"2"}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::Manual);
        assert_eq!(event.app_id(), AppId::new(7));
    }
}
