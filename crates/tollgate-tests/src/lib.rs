//! Test infrastructure for Tollgate.
//!
//! In-memory fakes for every port trait, fixtures for the common rule sets,
//! definitions and events, and a [`TestContext`] wiring them into an
//! [`Orchestrator`](tollgate_scheduler::Orchestrator).
//!
//! # Usage
//!
//! ```ignore
//! use tollgate_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new();
//!     let orchestrator = ctx.orchestrator();
//!     // Drive events, then inspect ctx.engine, ctx.reviews, ...
//! }
//! ```

pub mod context;
pub mod fakes;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fakes::*;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tollgate_scheduler=debug")),
        )
        .with_test_writer()
        .try_init();
}
