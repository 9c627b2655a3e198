//! HTTP response framing.
//!
//! Every response is a status line, `Content-Length`, `Connection: Closed`
//! and `Content-Type: text/plain`, a blank line, then the body, all joined
//! with CRLF. The connection is always closed after the response is written.

/// Status codes this receiver answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Handshake accepted; the body echoes the challenge.
    Ok,
    /// Notification accepted.
    NoContent,
    /// Signature mismatch.
    Forbidden,
}

impl Status {
    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
            Self::Forbidden => 403,
        }
    }

    /// Reason phrase.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::Forbidden => "Forbidden",
        }
    }
}

/// A complete response ready to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status line code.
    pub status: Status,
    /// Plain text body.
    pub body: String,
}

impl Response {
    /// `200 OK` echoing the handshake challenge verbatim.
    #[must_use]
    pub fn challenge(challenge: &str) -> Self {
        Self {
            status: Status::Ok,
            body: challenge.to_string(),
        }
    }

    /// `204 No Content` acknowledging a notification.
    ///
    /// Carries a short text body despite the 204 status.
    #[must_use]
    pub fn notification_received() -> Self {
        Self {
            status: Status::NoContent,
            body: "Notification received".to_string(),
        }
    }

    /// `403 Forbidden` for a bad signature.
    #[must_use]
    pub fn forbidden() -> Self {
        Self {
            status: Status::Forbidden,
            body: "Invalid signature".to_string(),
        }
    }

    /// Renders the response as wire bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: Closed\r\nContent-Type: text/plain\r\n\r\n{}",
            self.status.code(),
            self.status.reason(),
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}
