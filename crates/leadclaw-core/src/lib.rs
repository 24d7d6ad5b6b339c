//! # LeadClaw Core
//!
//! Shared foundation for the LeadClaw outreach engine: error taxonomy,
//! the step/lead data model, the outbound `Transport` trait, phone
//! canonicalization, and toml configuration.

pub mod config;
pub mod error;
pub mod phone;
pub mod traits;
pub mod types;

pub use config::LeadClawConfig;
pub use error::{LeadClawError, Result};
pub use traits::Transport;
pub use types::{BatchResult, Lead, LeadStage, PlanEntry, RecipientResult, Step, StepKind};
