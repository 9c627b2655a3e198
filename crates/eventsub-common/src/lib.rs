//! Common types and verification logic for EventSub webhook deliveries.
//!
//! This crate provides:
//! - HMAC-SHA256 message signing and verification ([`crypto`])
//! - Strict parsing of the single accepted HTTP request shape ([`http`])
//! - The ordered authentication gates and typed messages ([`message`])
//! - Subscription and event payload shapes ([`event`])
//! - Protocol header names and constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod crypto;
pub mod event;
pub mod http;
pub mod message;
pub mod types;

pub use event::{Event, EventResolver, HandshakeVerification, Notification, StandardEvents, Subscription};
pub use http::{Framer, Framing, Headers};
pub use message::{DuplicateCheck, FormatError, Message, MessageError, Verifier};
