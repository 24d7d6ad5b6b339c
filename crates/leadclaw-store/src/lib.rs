//! # LeadClaw Store
//!
//! Document store on SQLite: leads, named sequence definitions, and the
//! persisted step schedule. Leads are upserted with merge semantics —
//! last-write-wins per field, set-union for the tag list — so concurrent
//! writers touching disjoint fields don't clobber each other.

mod db;
mod schedule;

pub use db::{LeadPatch, Store};
pub use schedule::{ScheduledStep, StepStatus};
