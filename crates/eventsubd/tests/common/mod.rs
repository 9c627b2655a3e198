#![allow(dead_code)]

use eventsub_common::crypto;
use eventsubd::config::ServerConfig;
use eventsubd::secret::StaticSecret;
use eventsubd::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const SECRET: &str = "s3cRe7-w3bh00k";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_age: 600,
        replay_capacity: 1000,
        max_request: 65_536,
        max_conns: 100,
        read_timeout: 5,
    }
}

pub async fn start_server_with(config: ServerConfig) -> (SocketAddr, Arc<Server>) {
    let server = Server::new(config, Arc::new(StaticSecret::new(SECRET).unwrap()));
    let addr = server.start().await.unwrap();
    (addr, server)
}

pub async fn start_server() -> (SocketAddr, Arc<Server>) {
    start_server_with(test_config()).await
}

pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn subscription(kind: &str, version: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
        "status": status,
        "type": kind,
        "version": version,
        "cost": 0,
        "condition": {"broadcaster_user_id": "12826"},
        "transport": {"method": "webhook", "callback": "https://example.com/webhooks/callback"},
        "created_at": "2019-11-16T10:11:12.634234626Z"
    })
}

pub fn handshake_body(challenge: &str) -> String {
    serde_json::json!({
        "challenge": challenge,
        "subscription": subscription(
            "channel.follow",
            "2",
            "webhook_callback_verification_pending"
        ),
    })
    .to_string()
}

pub fn follow_body() -> String {
    serde_json::json!({
        "subscription": subscription("channel.follow", "2", "enabled"),
        "event": {
            "user_id": "1234",
            "user_login": "cool_user",
            "user_name": "Cool_User",
            "broadcaster_user_id": "12826",
            "broadcaster_user_login": "twitch",
            "broadcaster_user_name": "Twitch",
            "followed_at": "2020-07-15T18:16:11.17106713Z"
        }
    })
    .to_string()
}

/// A webhook delivery under construction.
pub struct Delivery {
    pub id: String,
    pub timestamp: String,
    pub kind: String,
    pub body: String,
    pub signature: Option<String>,
}

impl Delivery {
    pub fn new(id: &str, kind: &str, body: String) -> Self {
        Self {
            id: id.to_string(),
            timestamp: now(),
            kind: kind.to_string(),
            body,
            signature: None,
        }
    }

    pub fn handshake(id: &str, challenge: &str) -> Self {
        Self::new(id, "webhook_callback_verification", handshake_body(challenge))
    }

    pub fn notification(id: &str) -> Self {
        Self::new(id, "notification", follow_body())
    }

    pub fn at(mut self, timestamp: &str) -> Self {
        self.timestamp = timestamp.to_string();
        self
    }

    pub fn signed_with(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    pub fn to_http(&self) -> String {
        let signature = self.signature.clone().unwrap_or_else(|| {
            crypto::sign(
                SECRET.as_bytes(),
                &self.id,
                &self.timestamp,
                self.body.as_bytes(),
            )
        });
        format!(
            "POST / HTTP/1.1\r\n\
             Host: example.com\r\n\
             Content-Type: application/json\r\n\
             Twitch-Eventsub-Message-Id: {}\r\n\
             Twitch-Eventsub-Message-Retry: 0\r\n\
             Twitch-Eventsub-Message-Type: {}\r\n\
             Twitch-Eventsub-Message-Signature: {}\r\n\
             Twitch-Eventsub-Message-Timestamp: {}\r\n\
             Twitch-Eventsub-Subscription-Type: channel.follow\r\n\
             Twitch-Eventsub-Subscription-Version: 2\r\n\
             Content-Length: {}\r\n\
             \r\n\
             {}",
            self.id,
            self.kind,
            signature,
            self.timestamp,
            self.body.len(),
            self.body
        )
    }
}

/// Sends `raw` on a fresh connection and returns everything the server wrote
/// before closing. An empty string means the server closed without answering.
pub async fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    read_reply(&mut stream).await
}

pub async fn read_reply(stream: &mut TcpStream) -> String {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("timeout waiting for server to close")
        .unwrap_or_default();
    String::from_utf8(out).unwrap()
}

/// Polls `condition` until it holds or a second has passed.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
