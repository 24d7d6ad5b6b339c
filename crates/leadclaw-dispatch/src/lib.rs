//! # LeadClaw Dispatch
//!
//! The outreach sequence engine: expands a sequence definition into a
//! time-ordered plan, arms one tokio timer per step, and pushes due steps
//! through a bounded queue into a worker pool that performs the actual
//! channel send.
//!
//! ## Architecture
//! ```text
//! run_batch / schedule_sequence
//!   ├── planner: steps + delays → (fire_at, step) plan
//!   ├── store:   plan persisted as pending rows (restart-safe)
//!   └── runner:  one timer per entry, cancellable per (phone, sequence)
//!                  └── on fire → bounded mpsc queue
//!                        └── workers → ChannelDispatcher → Transport
//!                              └── row marked sent / failed
//! ```
//!
//! Batch calls return at scheduling time; delivery outcomes live in the
//! schedule table and the logs. A step failure never aborts its siblings.

pub mod channel;
pub mod engine;
pub mod planner;
pub mod queue;
pub mod runner;

pub use channel::ChannelDispatcher;
pub use engine::{BatchSource, DispatchEngine};
pub use planner::plan;
pub use queue::DispatchJob;
pub use runner::{RunRegistry, RunState};
