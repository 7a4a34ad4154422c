#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod parser;
pub mod receiver;

// --- Public API Re-exports ---

pub use config::IntakeConfig;
pub use error::IntakeError;
pub use parser::parse_alert;
pub use receiver::{AlertReceiver, ReceiverInfo, ReceiverState, router};
