//! Tollgate Core
//!
//! Domain types, port traits and error handling for the pipeline trigger
//! core. This crate has minimal dependencies and defines the shared
//! vocabulary used across all other crates.

pub mod branch;
pub mod checkrun;
pub mod error;
pub mod events;
pub mod ids;
pub mod pipeline;
pub mod ports;
pub mod run;

pub use error::{EngineError, Error, ErrorKind, Result};
pub use ids::*;
