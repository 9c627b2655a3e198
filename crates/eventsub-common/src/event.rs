//! Payload shapes carried by authenticated webhook messages.
//!
//! A notification's event cannot be decoded on its own: its shape depends on
//! the `type` tag of the sibling `subscription` object. Decoding is therefore
//! two-pass. The subscription is decoded first and its tag is then handed to
//! an [`EventResolver`] together with the raw event JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors produced while turning raw event JSON into a typed [`Event`].
#[derive(Debug, Error)]
pub enum EventError {
    /// The event JSON did not match the shape registered for its tag.
    #[error("event does not match shape for {kind} v{version}: {source}")]
    Shape {
        /// Subscription type tag.
        kind: String,
        /// Subscription version.
        version: String,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Delivery configuration of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// Delivery method, `webhook` for this receiver.
    pub method: String,
    /// Callback URL registered for the subscription.
    #[serde(default)]
    pub callback: Option<String>,
}

/// A registered interest in one category of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: String,
    /// Lifecycle status, e.g. `enabled` or `webhook_callback_verification_pending`.
    pub status: String,
    /// Type tag selecting the event shape, e.g. `channel.follow`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Version of the event shape.
    pub version: String,
    /// Filter the subscription was created with.
    #[serde(default)]
    pub condition: Value,
    /// Where events are delivered.
    pub transport: Transport,
    /// Creation instant as sent.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Cost charged against the subscription limit.
    #[serde(default)]
    pub cost: u32,
}

/// Handshake confirming control of the callback endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeVerification {
    /// Subscription being verified.
    pub subscription: Subscription,
    /// Token to echo back verbatim.
    pub challenge: String,
}

/// An authenticated event delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Subscription the event belongs to.
    pub subscription: Subscription,
    /// Event decoded according to the subscription's type tag.
    pub event: Event,
}

/// The broadcaster an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcaster {
    /// Broadcaster user id.
    pub broadcaster_user_id: String,
    /// Broadcaster login.
    pub broadcaster_user_login: String,
    /// Broadcaster display name.
    pub broadcaster_user_name: String,
}

/// `channel.follow`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEvent {
    /// Id of the new follower.
    pub user_id: String,
    /// Follower login.
    pub user_login: String,
    /// Follower display name.
    pub user_name: String,
    /// Channel that was followed.
    #[serde(flatten)]
    pub broadcaster: Broadcaster,
    /// RFC 3339 instant of the follow, as sent.
    pub followed_at: String,
}

/// `channel.subscribe`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeEvent {
    /// Id of the subscriber.
    pub user_id: String,
    /// Subscriber login.
    pub user_login: String,
    /// Subscriber display name.
    pub user_name: String,
    /// Channel subscribed to.
    #[serde(flatten)]
    pub broadcaster: Broadcaster,
    /// Tier code: `1000`, `2000` or `3000`.
    pub tier: String,
    /// Whether the subscription was gifted.
    pub is_gift: bool,
}

/// `channel.cheer`. User fields are absent for anonymous cheers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheerEvent {
    /// Whether the cheerer chose to stay anonymous.
    pub is_anonymous: bool,
    /// Id of the cheerer.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Cheerer login.
    #[serde(default)]
    pub user_login: Option<String>,
    /// Cheerer display name.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Channel cheered in.
    #[serde(flatten)]
    pub broadcaster: Broadcaster,
    /// Chat message sent with the cheer.
    pub message: String,
    /// Bits spent.
    pub bits: u64,
}

/// `channel.raid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidEvent {
    /// Id of the raiding broadcaster.
    pub from_broadcaster_user_id: String,
    /// Raiding broadcaster login.
    pub from_broadcaster_user_login: String,
    /// Raiding broadcaster display name.
    pub from_broadcaster_user_name: String,
    /// Id of the raided broadcaster.
    pub to_broadcaster_user_id: String,
    /// Raided broadcaster login.
    pub to_broadcaster_user_login: String,
    /// Raided broadcaster display name.
    pub to_broadcaster_user_name: String,
    /// Viewers brought along.
    pub viewers: u64,
}

/// `channel.update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdateEvent {
    /// Channel that changed.
    #[serde(flatten)]
    pub broadcaster: Broadcaster,
    /// Stream title.
    pub title: String,
    /// ISO 639-1 language code.
    pub language: String,
    /// Category id.
    pub category_id: String,
    /// Category name.
    pub category_name: String,
    /// Content classification label ids.
    #[serde(default)]
    pub content_classification_labels: Vec<String>,
}

/// `stream.online`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOnlineEvent {
    /// Stream id.
    pub id: String,
    /// Channel that went live.
    #[serde(flatten)]
    pub broadcaster: Broadcaster,
    /// Stream type, e.g. `live`.
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339 instant the stream started, as sent.
    pub started_at: String,
}

/// `stream.offline`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOfflineEvent {
    /// Channel that went offline.
    #[serde(flatten)]
    pub broadcaster: Broadcaster,
}

/// A typed event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `channel.follow`
    Follow(FollowEvent),
    /// `channel.subscribe`
    Subscribe(SubscribeEvent),
    /// `channel.cheer`
    Cheer(CheerEvent),
    /// `channel.raid`
    Raid(RaidEvent),
    /// `channel.update`
    ChannelUpdate(ChannelUpdateEvent),
    /// `stream.online`
    StreamOnline(StreamOnlineEvent),
    /// `stream.offline`
    StreamOffline(StreamOfflineEvent),
    /// A tag with no modelled shape; the payload is kept as JSON.
    Other {
        /// Subscription type tag.
        kind: String,
        /// Raw event object.
        payload: Value,
    },
}

/// Maps a subscription type tag to a concrete event shape.
pub trait EventResolver: Send + Sync {
    /// Decodes `payload` as the event shape registered for `kind`/`version`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] if the payload does not fit the shape.
    fn resolve(&self, kind: &str, version: &str, payload: Value) -> Result<Event, EventError>;
}

/// Resolver for the event types this crate models.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEvents;

fn shape<T: serde::de::DeserializeOwned>(
    kind: &str,
    version: &str,
    payload: Value,
) -> Result<T, EventError> {
    serde_json::from_value(payload).map_err(|source| EventError::Shape {
        kind: kind.to_string(),
        version: version.to_string(),
        source,
    })
}

impl EventResolver for StandardEvents {
    fn resolve(&self, kind: &str, version: &str, payload: Value) -> Result<Event, EventError> {
        let event = match kind {
            "channel.follow" => Event::Follow(shape(kind, version, payload)?),
            "channel.subscribe" => Event::Subscribe(shape(kind, version, payload)?),
            "channel.cheer" => Event::Cheer(shape(kind, version, payload)?),
            "channel.raid" => Event::Raid(shape(kind, version, payload)?),
            "channel.update" => Event::ChannelUpdate(shape(kind, version, payload)?),
            "stream.online" => Event::StreamOnline(shape(kind, version, payload)?),
            "stream.offline" => Event::StreamOffline(shape(kind, version, payload)?),
            _ => Event::Other {
                kind: kind.to_string(),
                payload,
            },
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn broadcaster() -> Value {
        json!({
            "broadcaster_user_id": "1337",
            "broadcaster_user_login": "cooler_user",
            "broadcaster_user_name": "Cooler_User",
        })
    }

    fn with_broadcaster(mut extra: Value) -> Value {
        let obj = extra.as_object_mut().unwrap();
        for (k, v) in broadcaster().as_object().unwrap() {
            obj.insert(k.clone(), v.clone());
        }
        extra
    }

    #[test]
    fn subscription_decodes_type_tag() {
        let sub: Subscription = serde_json::from_value(json!({
            "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
            "status": "enabled",
            "type": "channel.follow",
            "version": "2",
            "condition": {"broadcaster_user_id": "1337"},
            "transport": {"method": "webhook", "callback": "https://example.com/webhooks/callback"},
            "created_at": "2019-11-16T10:11:12.634234626Z",
            "cost": 0
        }))
        .unwrap();
        assert_eq!(sub.kind, "channel.follow");
        assert_eq!(sub.transport.method, "webhook");
        assert_eq!(sub.condition["broadcaster_user_id"], "1337");
    }

    #[test]
    fn follow_event_resolves() {
        let payload = with_broadcaster(json!({
            "user_id": "1234",
            "user_login": "cool_user",
            "user_name": "Cool_User",
            "followed_at": "2020-07-15T18:16:11.17106713Z"
        }));
        let event = StandardEvents.resolve("channel.follow", "2", payload).unwrap();
        match event {
            Event::Follow(f) => {
                assert_eq!(f.user_login, "cool_user");
                assert_eq!(f.broadcaster.broadcaster_user_id, "1337");
            }
            other => panic!("expected follow, got {other:?}"),
        }
    }

    #[test]
    fn anonymous_cheer_has_no_user() {
        let payload = with_broadcaster(json!({
            "is_anonymous": true,
            "user_id": null,
            "user_login": null,
            "user_name": null,
            "message": "pogchamp",
            "bits": 1000
        }));
        let Event::Cheer(cheer) = StandardEvents.resolve("channel.cheer", "1", payload).unwrap() else {
            panic!("expected cheer");
        };
        assert!(cheer.user_id.is_none());
        assert_eq!(cheer.bits, 1000);
    }

    #[test]
    fn raid_event_resolves() {
        let payload = json!({
            "from_broadcaster_user_id": "1234",
            "from_broadcaster_user_login": "cool_user",
            "from_broadcaster_user_name": "Cool_User",
            "to_broadcaster_user_id": "1337",
            "to_broadcaster_user_login": "cooler_user",
            "to_broadcaster_user_name": "Cooler_User",
            "viewers": 9001
        });
        let Event::Raid(raid) = StandardEvents.resolve("channel.raid", "1", payload).unwrap() else {
            panic!("expected raid");
        };
        assert_eq!(raid.viewers, 9001);
    }

    #[test]
    fn stream_offline_resolves() {
        let event = StandardEvents
            .resolve("stream.offline", "1", broadcaster())
            .unwrap();
        assert!(matches!(event, Event::StreamOffline(_)));
    }

    #[test]
    fn unknown_tag_keeps_raw_payload() {
        let payload = json!({"anything": [1, 2, 3]});
        let event = StandardEvents
            .resolve("channel.hype_train.begin", "1", payload.clone())
            .unwrap();
        assert_eq!(
            event,
            Event::Other {
                kind: "channel.hype_train.begin".into(),
                payload
            }
        );
    }

    #[test]
    fn wrong_shape_for_known_tag_fails() {
        let err = StandardEvents
            .resolve("channel.raid", "1", json!({"viewers": "many"}))
            .unwrap_err();
        let EventError::Shape { kind, version, .. } = err;
        assert_eq!(kind, "channel.raid");
        assert_eq!(version, "1");
    }
}
