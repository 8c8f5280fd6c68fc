//! Tollgate Bundle
//!
//! HTTP adapter implementing the core port traits against the platform's
//! JSON API: pipeline engine, branch rules, repository access, check-runs
//! and application metadata.

pub mod client;
pub mod config;

pub use client::BundleClient;
pub use config::BundleConfig;
