#![doc = include_str!("../README.md")]

pub mod cooldown;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod notify;
pub mod rule;

// --- Public API Re-exports ---

// Engine (main orchestrator)
pub use engine::{PolicyEngine, PolicyEngineBuilder};

// Rule evaluation
pub use rule::{ExclusionList, RuleSet, glob_match, rule_matches};

// Cooldown
pub use cooldown::{CooldownDecision, CooldownTracker};

// Dispatch
pub use dispatch::{ActionDispatcher, DispatchOutcome, ensure_action_support};

// Notification
pub use notify::{MockNotifier, Notifier, WebhookNotifier};

// Error
pub use error::PolicyEngineError;
