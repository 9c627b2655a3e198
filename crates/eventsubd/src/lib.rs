//! EventSub webhook receiver: authenticates callback requests and answers them.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Request admission and response routing.
pub mod admission;
/// CLI argument parsing and server configuration.
pub mod config;
/// Single-request connection lifecycle.
pub mod connection;
/// Error types for server operations.
pub mod error;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
/// Table of open connections.
pub mod registry;
/// Message id replay cache.
pub mod replay;
/// HTTP responses written back to the caller.
pub mod response;
/// Signing secret storage.
pub mod secret;
/// Listener state machine and shared server state.
pub mod server;

pub use server::{ListenerState, Server};
