//! HTTP client factory with consistent timeout configuration.
//!
//! Outbound clients (Stripe, Resend) are built here rather than with
//! `reqwest::Client::new()` so no request can hang indefinitely.

use std::time::Duration;

use reqwest::Client;

use crate::infra::error::InfraError;

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a whole request. Stripe calls additionally carry their
/// own per-attempt timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn try_build_client() -> Result<Client, InfraError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(InfraError::HttpClient)
}
