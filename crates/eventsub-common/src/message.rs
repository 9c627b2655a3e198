//! Authenticated webhook messages.
//!
//! A [`Message`] only exists once a request has passed every gate of a
//! [`Verifier`], in this order, failing fast:
//!
//! 1. the signature, id, timestamp and type headers are all present;
//! 2. the timestamp is within the staleness window, if one is configured;
//! 3. the id has not been seen before, if a [`DuplicateCheck`] is configured;
//! 4. the signature matches the HMAC of id, timestamp and body;
//! 5. the body decodes as the shape named by the type header.
//!
//! The signature gate is never skipped, and the body is only decoded once the
//! request is known to be authentic.

use crate::crypto;
use crate::event::{EventResolver, HandshakeVerification, Notification, StandardEvents, Subscription};
use crate::http::{self, Headers};
use crate::types::{header, message_type};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Reasons a request is not a well-formed webhook message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The request line was not exactly `POST / HTTP/1.1`.
    #[error("unexpected request line: {0:?}")]
    RequestLine(String),
    /// Headers were not terminated by a blank line.
    #[error("headers not terminated by a blank line")]
    MissingBlankLine,
    /// A required header is absent.
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    /// The timestamp header is not an RFC 3339 instant.
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    /// The authenticated body did not decode.
    #[error("invalid body: {0}")]
    Body(String),
}

/// Failure kinds when building a [`Message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Malformed request text or a missing required header.
    #[error("malformed message: {0}")]
    Format(#[from] FormatError),
    /// The message timestamp is older than the staleness window.
    #[error("message timestamp {timestamp} is too old")]
    Stale {
        /// Timestamp as declared by the sender.
        timestamp: String,
    },
    /// The message id has already been accepted.
    #[error("duplicate message id {0}")]
    Duplicate(String),
    /// The declared signature does not match.
    #[error("invalid signature")]
    InvalidSignature,
    /// The message-type header named an unrecognized type.
    #[error("unknown message type {0:?}")]
    UnknownType(Option<String>),
}

/// Replay detection consulted before the signature check.
///
/// Implementations must check and record in one atomic step: the id is
/// remembered as a side effect of the query.
pub trait DuplicateCheck: Send + Sync {
    /// Records `id` and returns `true` if it had already been recorded.
    fn check_and_insert(&self, id: &str) -> bool;
}

/// An authenticated, fresh, decoded webhook message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Callback ownership handshake.
    Verification(HandshakeVerification),
    /// Event delivery.
    Notification(Notification),
}

impl Message {
    /// Builds a message from a raw HTTP request.
    ///
    /// # Errors
    ///
    /// See [`Verifier::verify_http`].
    pub fn from_http(raw: &str, verifier: &Verifier<'_>) -> Result<Self, MessageError> {
        verifier.verify_http(raw)
    }

    /// Builds a message from already-split headers and body.
    ///
    /// # Errors
    ///
    /// See [`Verifier::verify`].
    pub fn from_parts(
        headers: &Headers,
        body: &str,
        verifier: &Verifier<'_>,
    ) -> Result<Self, MessageError> {
        verifier.verify(headers, body)
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Verification(_) => "verification",
            Self::Notification(_) => "notification",
        }
    }
}

#[derive(Deserialize)]
struct NotificationEnvelope {
    subscription: Subscription,
    event: serde_json::Value,
}

static STANDARD_EVENTS: StandardEvents = StandardEvents;

/// The gate sequence with its configured policies.
pub struct Verifier<'a> {
    secret: &'a [u8],
    max_age: Option<Duration>,
    duplicates: Option<&'a dyn DuplicateCheck>,
    events: &'a dyn EventResolver,
    now: Option<DateTime<Utc>>,
}

impl<'a> Verifier<'a> {
    /// A verifier that only checks headers and the signature.
    #[must_use]
    pub fn new(secret: &'a [u8]) -> Self {
        Self {
            secret,
            max_age: None,
            duplicates: None,
            events: &STANDARD_EVENTS,
            now: None,
        }
    }

    /// Rejects messages whose timestamp is older than `max_age`.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Consults `duplicates` before the signature check.
    #[must_use]
    pub fn duplicates(mut self, duplicates: &'a dyn DuplicateCheck) -> Self {
        self.duplicates = Some(duplicates);
        self
    }

    /// Decodes notification events with `events` instead of [`StandardEvents`].
    #[must_use]
    pub fn events(mut self, events: &'a dyn EventResolver) -> Self {
        self.events = events;
        self
    }

    /// Pins the instant staleness is measured against.
    #[must_use]
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Parses raw request text and runs the gate sequence on it.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Format`] if the text is not a single
    /// `POST / HTTP/1.1` request, otherwise as [`Verifier::verify`].
    pub fn verify_http(&self, raw: &str) -> Result<Message, MessageError> {
        let request = http::parse_request(raw)?;
        self.verify(&request.headers, request.body)
    }

    /// Runs the gate sequence over headers and body.
    ///
    /// # Errors
    ///
    /// Returns the error of the first gate that fails.
    pub fn verify(&self, headers: &Headers, body: &str) -> Result<Message, MessageError> {
        let required = |name: &'static str| {
            headers
                .get(name)
                .ok_or(MessageError::Format(FormatError::MissingHeader(name)))
        };
        let signature = required(header::MESSAGE_SIGNATURE)?;
        let id = required(header::MESSAGE_ID)?;
        let timestamp = required(header::MESSAGE_TIMESTAMP)?;
        let kind = required(header::MESSAGE_TYPE)?;

        if let Some(max_age) = self.max_age {
            self.check_fresh(timestamp, max_age)?;
        }

        if let Some(duplicates) = self.duplicates {
            if duplicates.check_and_insert(id) {
                return Err(MessageError::Duplicate(id.to_string()));
            }
        }

        if !crypto::verify(self.secret, id, timestamp, body.as_bytes(), signature) {
            return Err(MessageError::InvalidSignature);
        }

        self.decode(kind, body)
    }

    fn check_fresh(&self, timestamp: &str, max_age: Duration) -> Result<(), MessageError> {
        let sent = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| FormatError::Timestamp(timestamp.to_string()))?
            .with_timezone(&Utc);
        let now = self.now.unwrap_or_else(Utc::now);
        // A window too large to represent cannot make anything stale.
        let Some(oldest) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return Ok(());
        };
        if sent < oldest {
            return Err(MessageError::Stale {
                timestamp: timestamp.to_string(),
            });
        }
        Ok(())
    }

    fn decode(&self, kind: &str, body: &str) -> Result<Message, MessageError> {
        let body_err = |e: &dyn std::fmt::Display| FormatError::Body(e.to_string());
        match kind {
            message_type::VERIFICATION => {
                let handshake: HandshakeVerification =
                    serde_json::from_str(body).map_err(|e| body_err(&e))?;
                if handshake.challenge.is_empty() {
                    return Err(FormatError::Body("empty challenge".to_string()).into());
                }
                Ok(Message::Verification(handshake))
            }
            message_type::NOTIFICATION => {
                let envelope: NotificationEnvelope =
                    serde_json::from_str(body).map_err(|e| body_err(&e))?;
                let event = self
                    .events
                    .resolve(
                        &envelope.subscription.kind,
                        &envelope.subscription.version,
                        envelope.event,
                    )
                    .map_err(|e| body_err(&e))?;
                Ok(Message::Notification(Notification {
                    subscription: envelope.subscription,
                    event,
                }))
            }
            other => Err(MessageError::UnknownType(
                (!other.is_empty()).then(|| other.to_string()),
            )),
        }
    }
}
