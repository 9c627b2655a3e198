use crate::admission::{admit, decide, Policy};
use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId, ConnectionObserver, Limits, Reply};
use crate::error::ServerError;
use crate::metrics::{counters, gauges, histograms, HealthState};
use crate::registry::{ConnEntry, ConnectionTable};
use crate::replay::ReplayCache;
use crate::secret::SecretSource;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of the TCP listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    /// Created, not yet bound.
    Setup,
    /// Accepting connections.
    Ready,
    /// Accepting is temporarily failing; the error is kept for display.
    Waiting(String),
    /// The listener could not be brought up. Terminal.
    Failed(String),
    /// Stopped on request. Terminal.
    Cancelled,
}

impl ListenerState {
    /// Returns `true` for states the listener never leaves.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Cancelled)
    }
}

/// Webhook receiver: owns the listener, the connection table and the replay
/// cache, and routes each request to a response.
pub struct Server {
    config: ServerConfig,
    secret: Arc<dyn SecretSource>,
    replay: ReplayCache,
    connections: ConnectionTable,
    next_id: AtomicU64,
    stopped: AtomicBool,
    state: watch::Sender<ListenerState>,
    local_addr: OnceLock<SocketAddr>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    health: HealthState,
}

impl Server {
    /// Creates a server in the [`ListenerState::Setup`] state.
    #[must_use]
    pub fn new(config: ServerConfig, secret: Arc<dyn SecretSource>) -> Arc<Self> {
        let replay = ReplayCache::new(config.max_age(), config.replay_capacity);
        let (state, _) = watch::channel(ListenerState::Setup);
        Arc::new(Self {
            config,
            secret,
            replay,
            connections: ConnectionTable::new(),
            next_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
            state,
            local_addr: OnceLock::new(),
            accept_task: Mutex::new(None),
            health: HealthState::new(),
        })
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyStarted`] unless the server is in
    /// [`ListenerState::Setup`], and [`ServerError::Bind`] if binding fails,
    /// after moving to [`ListenerState::Failed`].
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, ServerError> {
        if *self.state.borrow() != ListenerState::Setup {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = self.config.listen;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.set_state(ListenerState::Failed(source.to_string()));
                return Err(ServerError::Bind { addr, source });
            }
        };
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);

        // stop() may have run while binding.
        if self.state.borrow().is_terminal() {
            return Err(ServerError::AlreadyStarted);
        }
        self.set_state(ListenerState::Ready);

        let server = Arc::clone(self);
        let task = tokio::spawn(async move { server.accept_loop(listener).await });
        *self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
        if self.stopped.load(Ordering::Acquire) {
            if let Some(task) = self
                .accept_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                task.abort();
            }
        }
        Ok(local_addr)
    }

    /// Cancels the listener and drops every open connection immediately.
    ///
    /// In-flight responses are not waited for. A listener that already
    /// failed keeps its [`ListenerState::Failed`] state.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_state(ListenerState::Cancelled);
        self.health.set_ready(false);

        if let Some(task) = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        let stopped = self.connections.stop_all();
        info!(connections = stopped, "server stopped");
    }

    /// Current listener state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    /// Subscribes to listener state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    /// Address the listener is bound to, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of message ids remembered for replay detection.
    #[must_use]
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Readiness state for the metrics endpoint.
    #[must_use]
    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    fn set_state(&self, next: ListenerState) {
        let ready = next == ListenerState::Ready;
        let changed = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = next.clone();
            true
        });
        if changed {
            self.log_transition(&next);
            self.health.set_ready(ready);
        }
    }

    fn log_transition(&self, next: &ListenerState) {
        match next {
            ListenerState::Setup => debug!("listener setup"),
            ListenerState::Ready => info!(addr = ?self.local_addr(), "listener ready"),
            ListenerState::Waiting(e) => warn!(error = %e, "listener waiting"),
            ListenerState::Failed(e) => error!(error = %e, "listener failed"),
            ListenerState::Cancelled => info!("listener cancelled"),
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            if let Some(backoff) = self.on_accept(listener.accept().await) {
                tokio::time::sleep(backoff).await;
            }
            if self.state.borrow().is_terminal() {
                break;
            }
        }
    }

    /// Applies one accept result to the listener state. Returns how long to
    /// pause before accepting again.
    fn on_accept(
        self: &Arc<Self>,
        result: io::Result<(TcpStream, SocketAddr)>,
    ) -> Option<Duration> {
        match result {
            Ok((stream, peer)) => {
                if matches!(*self.state.borrow(), ListenerState::Waiting(_)) {
                    self.set_state(ListenerState::Ready);
                }
                self.accept(stream, peer);
                None
            }
            Err(e) => {
                self.set_state(ListenerState::Waiting(e.to_string()));
                Some(ACCEPT_BACKOFF)
            }
        }
    }

    fn accept(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if self.connections.len() >= self.config.max_conns {
            warn!(%peer, limit = self.config.max_conns, "max connections reached, refusing");
            counters::connections_refused_total();
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let limits = Limits {
            max_request: self.config.max_request,
            read_timeout: self.config.read_timeout(),
        };
        let conn = Connection::new(id, stream, peer, limits);
        let stop = conn.stop_handle();
        let _ = self.connections.insert(
            id,
            ConnEntry {
                peer,
                opened_at: Instant::now(),
                stop: stop.clone(),
            },
        );
        gauges::inc_connections_active();
        debug!(conn_id = id, %peer, "connection accepted");

        // A stop() racing this accept may have missed the new entry.
        if self.state.borrow().is_terminal() {
            stop.stop();
        }
        conn.start(Arc::clone(self) as Arc<dyn ConnectionObserver>);
    }
}

impl ConnectionObserver for Server {
    fn on_request(&self, id: ConnectionId, request: String) -> Reply {
        let started = Instant::now();
        let policy = Policy {
            secret: self.secret.signing_secret(),
            max_age: self.config.max_age(),
            replay: &self.replay,
        };
        let decision = decide(admit(&request, &policy));

        debug!(conn_id = id, outcome = decision.outcome, "request handled");
        counters::requests_total(decision.outcome);
        histograms::request_seconds(started.elapsed().as_secs_f64());
        gauges::replay_cache_size(self.replay.len());

        match decision.response {
            Some(response) => Reply::Send(response),
            None => Reply::Close,
        }
    }

    fn on_stopped(&self, id: ConnectionId) {
        if let Some(entry) = self.connections.remove(id) {
            debug!(
                conn_id = id,
                peer = %entry.peer,
                open_ms = entry.opened_at.elapsed().as_millis(),
                "connection closed"
            );
        }
        gauges::dec_connections_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecret;

    fn server() -> Arc<Server> {
        let config = ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        };
        Server::new(config, Arc::new(StaticSecret::new("0123456789").unwrap()))
    }

    #[tokio::test]
    async fn start_moves_to_ready() {
        let server = server();
        assert_eq!(server.state(), ListenerState::Setup);
        assert!(!server.health().is_ready());

        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        assert_eq!(server.state(), ListenerState::Ready);
        assert!(server.health().is_ready());
        server.stop();
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let server = server();
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyStarted)
        ));
        server.stop();
    }

    #[tokio::test]
    async fn bind_failure_is_terminal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            listen: taken.local_addr().unwrap(),
            ..ServerConfig::default()
        };
        let server = Server::new(config, Arc::new(StaticSecret::new("0123456789").unwrap()));

        assert!(matches!(
            server.start().await,
            Err(ServerError::Bind { .. })
        ));
        assert!(matches!(server.state(), ListenerState::Failed(_)));
        assert!(server.state().is_terminal());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let server = server();
        server.start().await.unwrap();
        let mut states = server.subscribe_state();

        server.stop();
        server.stop();
        assert_eq!(server.state(), ListenerState::Cancelled);
        assert!(!server.health().is_ready());
        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), ListenerState::Cancelled);
    }

    #[tokio::test]
    async fn stop_after_bind_failure_keeps_failed_state() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            listen: taken.local_addr().unwrap(),
            ..ServerConfig::default()
        };
        let server = Server::new(config, Arc::new(StaticSecret::new("0123456789").unwrap()));
        assert!(server.start().await.is_err());

        server.stop();
        let ListenerState::Failed(reason) = server.state() else {
            panic!("expected failed, got {:?}", server.state());
        };
        assert!(!reason.is_empty());
    }

    #[tokio::test]
    async fn accept_error_waits_then_recovers() {
        let server = server();
        server.start().await.unwrap();

        let backoff = server.on_accept(Err(io::Error::other("too many open files")));
        assert_eq!(backoff, Some(ACCEPT_BACKOFF));
        assert_eq!(
            server.state(),
            ListenerState::Waiting("too many open files".into())
        );
        assert!(!server.health().is_ready());

        let side = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(side.local_addr().unwrap()).await.unwrap();
        let accepted = side.accept().await;
        assert_eq!(server.on_accept(accepted), None);
        assert_eq!(server.state(), ListenerState::Ready);
        assert!(server.health().is_ready());
        assert!(server.connection_count() <= 1);

        drop(client);
        server.stop();
    }

    #[tokio::test]
    async fn stop_before_start_prevents_start() {
        let server = server();
        server.stop();
        assert!(server.start().await.is_err());
        assert_eq!(server.state(), ListenerState::Cancelled);
    }

    #[test]
    fn terminal_states() {
        assert!(!ListenerState::Setup.is_terminal());
        assert!(!ListenerState::Ready.is_terminal());
        assert!(!ListenerState::Waiting("x".into()).is_terminal());
        assert!(ListenerState::Failed("x".into()).is_terminal());
        assert!(ListenerState::Cancelled.is_terminal());
    }
}
