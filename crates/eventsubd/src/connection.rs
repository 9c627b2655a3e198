use crate::error::ServerError;
use crate::response::Response;
use eventsub_common::types::{MAX_CHUNK, MAX_HEAD};
use eventsub_common::{Framer, Framing};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifier assigned to each accepted connection by its server.
pub type ConnectionId = u64;

/// What the observer wants done with a received request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Write the response, then close.
    Send(Response),
    /// Close without answering.
    Close,
}

/// Reacts to connection lifecycle events.
pub trait ConnectionObserver: Send + Sync + 'static {
    /// Called once with the complete request text.
    fn on_request(&self, id: ConnectionId, request: String) -> Reply;

    /// Called exactly once when the connection has been torn down.
    fn on_stopped(&self, id: ConnectionId);
}

#[derive(Debug, Default)]
struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cloneable, idempotent stop switch for one connection.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    inner: Arc<StopSignal>,
}

impl StopHandle {
    /// Creates a handle in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the connection to stop. Returns `true` on the first call only.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Stores a permit if the connection task is not waiting yet.
        self.inner.notify.notify_one();
        true
    }

    /// Returns `true` once [`StopHandle::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    async fn stopped(&self) {
        if self.is_stopped() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Largest request that will be buffered.
    pub max_request: usize,
    /// How long to wait for a complete request, if bounded.
    pub read_timeout: Option<Duration>,
}

/// One accepted stream carrying a single request/response exchange.
pub struct Connection<S = tokio::net::TcpStream> {
    id: ConnectionId,
    peer: SocketAddr,
    stream: S,
    buf: Vec<u8>,
    framer: Framer,
    limits: Limits,
    stop: StopHandle,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an accepted stream.
    pub fn new(id: ConnectionId, stream: S, peer: SocketAddr, limits: Limits) -> Self {
        Self {
            id,
            peer,
            stream,
            buf: Vec::new(),
            framer: Framer::new(),
            limits,
            stop: StopHandle::new(),
        }
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Handle that stops this connection once started.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Spawns the receive loop. The observer sees at most one request and is
    /// told exactly once when the connection is gone.
    pub fn start(self, observer: Arc<dyn ConnectionObserver>) -> JoinHandle<()> {
        tokio::spawn(self.run(observer))
    }

    async fn run(mut self, observer: Arc<dyn ConnectionObserver>) {
        let (id, peer) = (self.id, self.peer);
        let stop = self.stop.clone();
        let result = tokio::select! {
            result = self.serve(observer.as_ref()) => result,
            () = stop.stopped() => {
                debug!(conn_id = id, %peer, "connection stopped");
                Ok(())
            }
        };
        if let Err(e) = result {
            debug!(conn_id = id, %peer, "connection closed: {}", e);
        }
        stop.stop();
        drop(self);
        observer.on_stopped(id);
    }

    async fn serve(&mut self, observer: &dyn ConnectionObserver) -> Result<(), ServerError> {
        let request = match self.limits.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.receive())
                .await
                .map_err(|_| ServerError::ReadTimeout)??,
            None => self.receive().await?,
        };
        let Some(request) = request else {
            debug!(conn_id = self.id, "stream ended before a complete request");
            return Ok(());
        };

        match observer.on_request(self.id, request) {
            Reply::Send(response) => self.send(&response.serialize()).await,
            Reply::Close => Ok(()),
        }
    }

    /// Reads until one complete request is buffered.
    ///
    /// Returns `Ok(None)` if the peer closes the stream first.
    async fn receive(&mut self) -> Result<Option<String>, ServerError> {
        let mut chunk = vec![0u8; MAX_CHUNK];
        loop {
            match self.framer.poll(&self.buf) {
                Framing::Complete(len) => {
                    let rest = self.buf.split_off(len);
                    let request = std::mem::replace(&mut self.buf, rest);
                    self.framer = Framer::new();
                    return Ok(Some(String::from_utf8(request)?));
                }
                Framing::HeadTooLarge => {
                    return Err(ServerError::RequestTooLarge { limit: MAX_HEAD });
                }
                Framing::Partial => {}
            }
            if self.buf.len() > self.limits.max_request {
                return Err(ServerError::RequestTooLarge {
                    limit: self.limits.max_request,
                });
            }

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Writes raw bytes to the peer and half-closes the stream.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ServerError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}
