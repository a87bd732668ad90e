//! HTTP client factory shared by the relay crates.
//!
//! All clients include a product User-Agent, `tcp_nodelay` and a bounded
//! pool idle timeout so DNS is re-resolved periodically.

use std::time::Duration;

use reqwest::Client;

use crate::error::{RelayError, Result};

/// User-Agent string for all outbound requests.
pub const USER_AGENT: &str = concat!("chat-relay/", env!("CARGO_PKG_VERSION"));

/// Default timeout for plain request/response calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection pool idle timeout.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

fn builder() -> reqwest::ClientBuilder {
    Client::builder()
        .user_agent(USER_AGENT)
        .tcp_nodelay(true)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(4)
}

/// Creates a client whose requests time out as a whole after `timeout`.
///
/// Use this for calls that return a complete body, never for streams.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client> {
    builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| RelayError::config(format!("Failed to build HTTP client: {e}")))
}

/// Creates a client for long-lived streaming responses.
///
/// Only connection establishment is bounded. A stream may stay open and
/// idle for as long as the server keeps it.
pub fn create_streaming_client(connect_timeout: Duration) -> Result<Client> {
    builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| RelayError::config(format!("Failed to build streaming HTTP client: {e}")))
}
