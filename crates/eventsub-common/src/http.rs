//! Minimal HTTP/1.1 request handling for webhook deliveries.
//!
//! Only one request shape is accepted: `POST / HTTP/1.1`, CRLF-delimited
//! headers, one blank line, then the body. Anything else is a format error.
//! There is no support for chunked transfer, pipelining or continuation
//! lines.

use crate::message::FormatError;
use crate::types::{header, MAX_HEAD};
use std::collections::HashMap;

const CRLF: &str = "\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Case-insensitive header map. Keys are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, trimming both name and value. Later values for the
    /// same name replace earlier ones.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.inner
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    /// Looks up a header by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k.as_ref(), v.as_ref());
        }
        headers
    }
}

/// A request split into headers and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest<'a> {
    /// Parsed headers.
    pub headers: Headers,
    /// The first line following the blank line, or empty.
    pub body: &'a str,
}

/// Splits raw request text into headers and body.
///
/// The request line must be exactly `POST / HTTP/1.1`. Header lines run until
/// the first blank line and are split at their first colon; lines without a
/// colon are skipped. Only the first line after the blank line is kept as the
/// body.
///
/// # Errors
///
/// Returns [`FormatError::RequestLine`] for any other request line and
/// [`FormatError::MissingBlankLine`] when headers are never terminated.
pub fn parse_request(raw: &str) -> Result<RawRequest<'_>, FormatError> {
    let mut lines = raw.split(CRLF);

    let request_line = lines.next().unwrap_or_default();
    let tokens: Vec<&str> = request_line.split(' ').collect();
    if tokens != ["POST", "/", "HTTP/1.1"] {
        return Err(FormatError::RequestLine(request_line.to_string()));
    }

    let mut headers = Headers::new();
    let mut terminated = false;
    for line in lines.by_ref() {
        if line.is_empty() {
            terminated = true;
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name, value);
        }
    }
    if !terminated {
        return Err(FormatError::MissingBlankLine);
    }

    let body = lines.next().unwrap_or_default();
    Ok(RawRequest { headers, body })
}

/// Progress of a [`Framer`] over a growing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The first `n` bytes hold one complete request.
    Complete(usize),
    /// More bytes are needed.
    Partial,
    /// The header section grew past [`MAX_HEAD`] without ending.
    HeadTooLarge,
}

/// Finds the end of one request in a buffer that only ever grows.
///
/// Each poll resumes the search for the blank line where the previous poll
/// stopped, so a peer trickling bytes costs linear work overall. Once the
/// headers are complete the total length is fixed and later polls only
/// compare it against the buffer length.
#[derive(Debug, Clone, Default)]
pub struct Framer {
    scanned: usize,
    total: Option<usize>,
}

impl Framer {
    /// Creates a framer for an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `buf`, which must extend the buffer given to previous polls.
    ///
    /// A request is complete once the blank line ending its headers has
    /// arrived and, if a `Content-Length` header is present, that many body
    /// bytes follow it. An unparsable length is ignored so the request is
    /// handed on and rejected later.
    pub fn poll(&mut self, buf: &[u8]) -> Framing {
        if let Some(total) = self.total {
            return if buf.len() >= total {
                Framing::Complete(total)
            } else {
                Framing::Partial
            };
        }

        let from = self.scanned.saturating_sub(HEADER_END.len() - 1).min(buf.len());
        let Some(pos) = buf[from..]
            .windows(HEADER_END.len())
            .position(|w| w == HEADER_END)
        else {
            self.scanned = buf.len();
            return if buf.len() > MAX_HEAD {
                Framing::HeadTooLarge
            } else {
                Framing::Partial
            };
        };

        let head_end = from + pos + HEADER_END.len();
        if head_end > MAX_HEAD {
            return Framing::HeadTooLarge;
        }
        let declared = std::str::from_utf8(&buf[..head_end])
            .ok()
            .and_then(content_length);
        let total = match declared {
            Some(body_len) => head_end.saturating_add(body_len),
            None => head_end,
        };
        self.scanned = head_end;
        self.total = Some(total);
        self.poll(buf)
    }
}

/// Reports the total byte length of the first complete request in `buf`.
///
/// One-shot form of [`Framer::poll`]. Returns `None` while more bytes are
/// needed or when the header section is too large.
#[must_use]
pub fn request_len(buf: &[u8]) -> Option<usize> {
    match Framer::new().poll(buf) {
        Framing::Complete(len) => Some(len),
        Framing::Partial | Framing::HeadTooLarge => None,
    }
}

fn content_length(head: &str) -> Option<usize> {
    head.split(CRLF).skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(header::CONTENT_LENGTH) {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
