//! Core type definitions and protocol constants for EventSub webhooks.

use std::time::Duration;

/// Header names carried by every inbound webhook request.
///
/// Lookups are case-insensitive; these are the lowercase forms.
pub mod header {
    /// Unique identifier of the message, stable across redeliveries.
    pub const MESSAGE_ID: &str = "twitch-eventsub-message-id";
    /// RFC 3339 instant at which the message was sent.
    pub const MESSAGE_TIMESTAMP: &str = "twitch-eventsub-message-timestamp";
    /// `sha256=` followed by the lowercase hex HMAC of the message.
    pub const MESSAGE_SIGNATURE: &str = "twitch-eventsub-message-signature";
    /// Discriminator selecting the payload shape.
    pub const MESSAGE_TYPE: &str = "twitch-eventsub-message-type";
    /// Declared body length, used only to find the end of a request.
    pub const CONTENT_LENGTH: &str = "content-length";
}

/// Values of the message-type header.
pub mod message_type {
    /// Handshake sent when a subscription's callback is first registered.
    pub const VERIFICATION: &str = "webhook_callback_verification";
    /// An event delivery.
    pub const NOTIFICATION: &str = "notification";
}

/// Literal prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Default staleness window: messages older than ten minutes are rejected.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Maximum bytes requested from the socket per receive.
pub const MAX_CHUNK: usize = 64 * 1024;

/// Largest header section accepted before the blank line that ends it.
pub const MAX_HEAD: usize = 16 * 1024;
