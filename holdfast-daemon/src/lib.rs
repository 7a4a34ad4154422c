//! Holdfast daemon library surface.
//!
//! Exposed as a library so integration tests can drive the orchestrator
//! without spawning the binary.

pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
