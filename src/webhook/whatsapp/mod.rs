//! WhatsApp webhook integration module
//!
//! This module provides webhook handling for WhatsApp Business API integration.
//! It includes both the HTTP route handlers and the routing of incoming
//! messages and status updates.
//!
//! ## Submodules
//!
//! - [`routes`] - HTTP endpoint handlers for WhatsApp webhooks
//! - [`verification`] - Subscription handshake
//! - [`handler`] - Dispatcher routing webhook events by type
//! - [`recorder`] - Collaborator receiving routed events
//! - [`schemas`] - Data structures for WhatsApp webhook payloads
//! - [`dedupe`] - Redelivery guard
//! - [`security`] - Payload signature verification
//! - [`errors`] - Error types

pub mod dedupe;
pub mod errors;
pub mod handler;
pub mod recorder;
pub mod routes;
pub mod schemas;
pub mod security;
pub mod verification;

// Re-export commonly used items for convenience
pub use routes::{receive, verify};
