//! # LeadClaw Gateway
//! HTTP API: bulk dispatch endpoints, lifecycle event webhooks, and the
//! sequence admin surface.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
