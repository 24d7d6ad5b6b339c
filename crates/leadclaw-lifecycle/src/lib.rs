//! # LeadClaw Lifecycle
//!
//! Translates recipient lifecycle events (form submitted, sample link sent,
//! tracking link opened) into sequence start/cancel commands against the
//! named-sequence registry, with an explicit forward-only stage machine per
//! lead.

pub mod reconciler;
pub mod stages;

pub use reconciler::{
    FormFlow, FormSubmission, LeadRef, LifecycleOutcome, LifecycleReconciler,
};
pub use stages::advance_stage;
