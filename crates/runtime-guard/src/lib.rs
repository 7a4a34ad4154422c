#![doc = include_str!("../README.md")]

pub mod client;
pub mod detect;
pub mod error;

// --- Public API Re-exports ---

pub use client::{BollardRuntimeClient, MockRuntimeClient, RuntimeClient};
pub use detect::{DetectedRuntime, RuntimeKind, detect_runtime, discover_socket};
pub use error::RuntimeGuardError;
