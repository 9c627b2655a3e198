use thiserror::Error;

/// Errors that can occur while serving webhook deliveries.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: std::net::SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The server was started twice or after being stopped.
    #[error("server already started")]
    AlreadyStarted,
    /// A request grew past the configured size limit before completing.
    #[error("request exceeds {limit} bytes")]
    RequestTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
    /// A complete request was not valid UTF-8.
    #[error("request is not valid UTF-8")]
    NotUtf8(#[from] std::string::FromUtf8Error),
    /// The client did not deliver a complete request in time.
    #[error("timed out waiting for request")]
    ReadTimeout,
    /// The signing secret could not be loaded.
    #[error("secret error: {0}")]
    Secret(String),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
