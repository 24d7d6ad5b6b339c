//! # LeadClaw Transport
//!
//! Outbound messaging transports. Currently WhatsApp Business Cloud API;
//! the engine only depends on the `Transport` trait from `leadclaw-core`.

pub mod whatsapp;

pub use whatsapp::WhatsAppTransport;
