use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments for the webhook receiver.
#[derive(Parser, Debug, Clone)]
#[command(name = "eventsubd")]
#[command(about = "EventSub webhook receiver")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "EVENTSUB_LISTEN")]
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    #[arg(long, default_value = "127.0.0.1:9090", env = "EVENTSUB_METRICS")]
    pub metrics_addr: SocketAddr,
    /// File holding the subscription signing secret.
    #[arg(long, env = "EVENTSUB_SECRET_FILE", conflicts_with = "secret")]
    pub secret_file: Option<PathBuf>,
    /// Subscription signing secret.
    #[arg(long, env = "EVENTSUB_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
    /// Maximum message age in seconds before it is rejected as stale.
    #[arg(long, default_value = "600", env = "EVENTSUB_MAX_AGE")]
    pub max_age: u64,
    /// Maximum number of message ids remembered for replay detection.
    #[arg(long, default_value = "100000", env = "EVENTSUB_REPLAY_CAPACITY")]
    pub replay_capacity: usize,
    /// Maximum size of one buffered request in bytes.
    #[arg(long, default_value = "1048576", env = "EVENTSUB_MAX_REQUEST")]
    pub max_request: usize,
    /// Maximum concurrent connections.
    #[arg(long, default_value = "10000", env = "EVENTSUB_MAX_CONNS")]
    pub max_conns: usize,
    /// Seconds to wait for a complete request. 0 = wait indefinitely.
    #[arg(long, default_value = "0", env = "EVENTSUB_READ_TIMEOUT")]
    pub read_timeout: u64,
    /// Increase log verbosity (repeat for more detail).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Write logs to a file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: SocketAddr,
    /// Socket address for the metrics endpoint.
    pub metrics_addr: SocketAddr,
    /// Staleness window in seconds.
    pub max_age: u64,
    /// Maximum number of message ids remembered for replay detection.
    pub replay_capacity: usize,
    /// Maximum size of one buffered request in bytes.
    pub max_request: usize,
    /// Maximum concurrent connections.
    pub max_conns: usize,
    /// Seconds to wait for a complete request. 0 = wait indefinitely.
    pub read_timeout: u64,
}

impl ServerConfig {
    /// Staleness window as a [`Duration`].
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age)
    }

    /// Read timeout, or `None` when disabled.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        if self.read_timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(self.read_timeout))
        }
    }

    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_age == 0 {
            return Err("max_age must be greater than 0".to_string());
        }
        if self.max_age > 86_400 {
            return Err("max_age exceeds reasonable limit (86400 seconds / 1 day)".to_string());
        }

        if self.replay_capacity == 0 {
            return Err("replay_capacity must be greater than 0".to_string());
        }
        if self.replay_capacity > 10_000_000 {
            return Err("replay_capacity exceeds reasonable limit (10,000,000)".to_string());
        }

        // Must hold at least the request head
        const MIN_REQUEST: usize = 1024;
        const MAX_REQUEST: usize = 16 * 1024 * 1024;
        if self.max_request < MIN_REQUEST {
            return Err(format!("max_request must be at least {MIN_REQUEST} bytes"));
        }
        if self.max_request > MAX_REQUEST {
            return Err(format!(
                "max_request exceeds maximum allowed ({MAX_REQUEST} bytes)"
            ));
        }

        if self.max_conns == 0 {
            return Err("max_conns must be greater than 0".to_string());
        }
        if self.max_conns > 1_000_000 {
            return Err("max_conns exceeds reasonable limit (1,000,000)".to_string());
        }

        if self.read_timeout > 3600 {
            return Err("read_timeout exceeds reasonable limit (3600 seconds)".to_string());
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            metrics_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            max_age: 600,
            replay_capacity: 100_000,
            max_request: 1_048_576,
            max_conns: 10_000,
            read_timeout: 0,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            metrics_addr: args.metrics_addr,
            max_age: args.max_age,
            replay_capacity: args.replay_capacity,
            max_request: args.max_request,
            max_conns: args.max_conns,
            read_timeout: args.read_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn default_window_is_ten_minutes() {
        assert_eq!(
            ServerConfig::default().max_age(),
            eventsub_common::types::DEFAULT_MAX_AGE
        );
    }

    #[test]
    fn max_age_zero() {
        let mut c = ServerConfig::default();
        c.max_age = 0;
        assert!(c.validate().unwrap_err().contains("max_age"));
    }

    #[test]
    fn max_age_too_large() {
        let mut c = ServerConfig::default();
        c.max_age = 86_401;
        assert!(c.validate().unwrap_err().contains("max_age"));
    }

    #[test]
    fn replay_capacity_zero() {
        let mut c = ServerConfig::default();
        c.replay_capacity = 0;
        assert!(c.validate().unwrap_err().contains("replay_capacity"));
    }

    #[test]
    fn replay_capacity_too_large() {
        let mut c = ServerConfig::default();
        c.replay_capacity = 10_000_001;
        assert!(c.validate().unwrap_err().contains("replay_capacity"));
    }

    #[test]
    fn max_request_too_small() {
        let mut c = ServerConfig::default();
        c.max_request = 1023;
        assert!(c.validate().unwrap_err().contains("max_request"));
    }

    #[test]
    fn max_request_too_large() {
        let mut c = ServerConfig::default();
        c.max_request = 16 * 1024 * 1024 + 1;
        assert!(c.validate().unwrap_err().contains("max_request"));
    }

    #[test]
    fn max_conns_zero() {
        let mut c = ServerConfig::default();
        c.max_conns = 0;
        assert!(c.validate().unwrap_err().contains("max_conns"));
    }

    #[test]
    fn read_timeout_too_large() {
        let mut c = ServerConfig::default();
        c.read_timeout = 3601;
        assert!(c.validate().unwrap_err().contains("read_timeout"));
    }

    #[test]
    fn read_timeout_zero_disables() {
        let mut c = ServerConfig::default();
        assert_eq!(c.read_timeout(), None);
        c.read_timeout = 5;
        assert_eq!(c.read_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn boundary_values_valid() {
        let c = ServerConfig {
            max_age: 1,
            replay_capacity: 1,
            max_request: 1024,
            max_conns: 1,
            read_timeout: 0,
            ..ServerConfig::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn upper_boundary_values_valid() {
        let c = ServerConfig {
            max_age: 86_400,
            replay_capacity: 10_000_000,
            max_request: 16 * 1024 * 1024,
            max_conns: 1_000_000,
            read_timeout: 3600,
            ..ServerConfig::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::try_parse_from(["eventsubd", "--secret", "0123456789"]).unwrap();
        let config = ServerConfig::from(args.clone());
        assert_eq!(args.secret.as_deref(), Some("0123456789"));
        assert_eq!(config.max_age, 600);
        assert_eq!(config.listen.port(), 8080);
    }

    #[test]
    fn secret_and_secret_file_conflict() {
        let res = Args::try_parse_from([
            "eventsubd",
            "--secret",
            "0123456789",
            "--secret-file",
            "/tmp/secret",
        ]);
        assert!(res.is_err());
    }
}
