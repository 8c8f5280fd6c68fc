//! Strongly-typed identifiers.
//!
//! Identifiers issued by the surrounding platform (applications, projects,
//! review requests, pipeline runs) are numeric. Identifiers minted locally
//! (inbound events) are UUIDv7 so they sort by arrival time in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

macro_rules! define_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }
    };
}

define_numeric_id!(OrgId);
define_numeric_id!(ProjectId);
define_numeric_id!(AppId);
define_numeric_id!(
    /// Merge-request id inside the code-review system.
    ReviewRequestId
);
define_numeric_id!(
    /// Identifier the remote engine returns for a submitted run. Every poll,
    /// cancel and link refers to the run through this handle.
    RunHandle
);

define_id!(EventId, "evt");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_handle_parse() {
        let handle: RunHandle = " 777777 ".parse().unwrap();
        assert_eq!(handle, RunHandle::new(777777));
        assert_eq!(handle.to_string(), "777777");
    }

    #[test]
    fn test_run_handle_parse_rejects_garbage() {
        assert!("pipeline-1".parse::<RunHandle>().is_err());
    }

    #[test]
    fn test_event_id_display() {
        let id = EventId::new();
        assert!(id.to_string().starts_with("evt_"));
    }
}
