//! Error types for Tollgate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Context key under which the remote engine reports the id of the run that
/// already occupies the (application, branch, definition) slot.
pub const PARALLEL_RUN_CONTEXT_KEY: &str = "ErrParallelRunPipeline";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    #[error("failed to run pipeline, already running link: {link}")]
    PipelineAlreadyRunning { link: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The four outcomes a caller has to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::InvalidDefinition(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PipelineAlreadyRunning { .. } => ErrorKind::Conflict,
            Error::Engine(e) if e.conflicting_run_id().is_some() => ErrorKind::Conflict,
            Error::Engine(e) if e.is_not_found() => ErrorKind::NotFound,
            Error::Engine(_)
            | Error::Network(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Prefix the message with what was being attempted. Kind is preserved.
    ///
    /// A conflict keeps its fixed message; the link is what callers show.
    pub fn context(self, what: impl std::fmt::Display) -> Self {
        match self {
            Error::Engine(mut e) => {
                e.message = format!("{what}: {}", e.message);
                Error::Engine(e)
            }
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), format!("{what}: {e}"))),
            Error::InvalidInput(m) => Error::InvalidInput(format!("{what}: {m}")),
            Error::NotFound(m) => Error::NotFound(format!("{what}: {m}")),
            Error::InvalidDefinition(m) => Error::InvalidDefinition(format!("{what}: {m}")),
            Error::Network(m) => Error::Network(format!("{what}: {m}")),
            Error::Serialization(m) => Error::Serialization(format!("{what}: {m}")),
            Error::Internal(m) => Error::Internal(format!("{what}: {m}")),
            conflict @ Error::PipelineAlreadyRunning { .. } => conflict,
        }
    }
}

/// Structured error returned by the remote platform.
///
/// `context` is whatever the platform attached to the error; it is only
/// inspected, never trusted to have a particular shape.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct EngineError {
    pub code: String,
    #[serde(default, alias = "msg")]
    pub message: String,
    #[serde(default, alias = "ctx")]
    pub context: serde_json::Value,
}

impl EngineError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Id of the already-running pipeline, if the engine rejected the run
    /// because of a parallel run and said which one.
    ///
    /// Returns `None` when the context is not a map, lacks the key, or maps it
    /// to anything other than a non-empty string.
    pub fn conflicting_run_id(&self) -> Option<&str> {
        self.context
            .as_object()?
            .get(PARALLEL_RUN_CONTEXT_KEY)?
            .as_str()
            .filter(|id| !id.is_empty())
    }

    /// Whether the engine rejected the run because of a parallel run,
    /// whether or not it managed to say which one.
    pub fn is_parallel_run_conflict(&self) -> bool {
        self.code == PARALLEL_RUN_CONTEXT_KEY
            || self
                .context
                .as_object()
                .is_some_and(|ctx| ctx.contains_key(PARALLEL_RUN_CONTEXT_KEY))
    }

    pub fn is_not_found(&self) -> bool {
        self.code.ends_with("NotFound") || self.code == "404"
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::InvalidDefinition(err.to_string())
    }
}
