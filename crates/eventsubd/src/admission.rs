use crate::replay::ReplayCache;
use crate::response::Response;
use eventsub_common::{Event, Message, MessageError, Verifier};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The server-side policy every inbound request is checked against.
pub struct Policy<'a> {
    /// Subscription signing secret.
    pub secret: &'a [u8],
    /// Staleness window.
    pub max_age: Duration,
    /// Ids accepted within the window.
    pub replay: &'a ReplayCache,
}

/// What to do with a request once it has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Metrics label for the outcome.
    pub outcome: &'static str,
    /// Response to write, or `None` to close without answering.
    pub response: Option<Response>,
}

/// Builds a [`Message`] from raw request text under `policy`.
///
/// # Errors
///
/// Returns the first failing gate as a [`MessageError`].
pub fn admit(raw: &str, policy: &Policy<'_>) -> Result<Message, MessageError> {
    Verifier::new(policy.secret)
        .max_age(policy.max_age)
        .duplicates(policy.replay)
        .verify_http(raw)
}

/// Maps an admission result to a response.
///
/// | result               | response          |
/// |----------------------|-------------------|
/// | handshake            | `200` + challenge |
/// | notification         | `204`             |
/// | invalid signature    | `403`             |
/// | stale / duplicate / malformed / unknown type | none |
#[must_use]
pub fn decide(result: Result<Message, MessageError>) -> Decision {
    match result {
        Ok(Message::Verification(handshake)) => {
            info!(
                subscription_id = %handshake.subscription.id,
                kind = %handshake.subscription.kind,
                "callback verification"
            );
            Decision {
                outcome: "verification",
                response: Some(Response::challenge(&handshake.challenge)),
            }
        }
        Ok(Message::Notification(notification)) => {
            let kind = &notification.subscription.kind;
            match &notification.event {
                Event::Other { .. } => debug!(%kind, "notification with unmodelled event"),
                event => debug!(%kind, ?event, "notification"),
            }
            Decision {
                outcome: "notification",
                response: Some(Response::notification_received()),
            }
        }
        Err(MessageError::InvalidSignature) => {
            warn!("rejecting message with invalid signature");
            Decision {
                outcome: "forbidden",
                response: Some(Response::forbidden()),
            }
        }
        Err(MessageError::Stale { timestamp }) => {
            warn!(%timestamp, "dropping stale message");
            Decision {
                outcome: "stale",
                response: None,
            }
        }
        Err(MessageError::Duplicate(message_id)) => {
            warn!(%message_id, "dropping duplicate message");
            Decision {
                outcome: "duplicate",
                response: None,
            }
        }
        Err(e @ (MessageError::Format(_) | MessageError::UnknownType(_))) => {
            debug!(error = %e, "dropping malformed message");
            Decision {
                outcome: "malformed",
                response: None,
            }
        }
    }
}
