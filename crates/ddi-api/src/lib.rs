//! Credential orchestration over an identity agent and a presentation selector.
pub mod api;
pub mod errors;

pub use api::CredentialOrchestrator;
pub use errors::{BusinessRuleViolation, DDIAPIError};

/// Default bound on each identity agent call, in seconds.
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 30;
