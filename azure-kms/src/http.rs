//! Shared `reqwest` client for every vault. Credentials use the HTTP stack of
//! `azure_identity`.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Settings of the HTTP client built by [`KeyVault::new`](crate::KeyVault::new).
///
/// `timeout` bounds a single HTTP exchange and should stay above the connector
/// request timeout, which bounds the whole remote call.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-exchange timeout
    pub timeout: Duration,
    /// TCP and TLS connect timeout
    pub connect_timeout: Duration,
    /// How long idle vault connections are kept
    pub pool_idle_timeout: Duration,
    /// Value of the `User-Agent` header
    pub user_agent: String,
    /// Refuse plain `http://` URLs
    pub https_only: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: concat!("azure-kms-rs/", env!("CARGO_PKG_VERSION")).to_owned(),
            https_only: false,
        }
    }
}

impl HttpConfig {
    /// Sets the whole-exchange timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Refuses plain HTTP vault endpoints.
    #[must_use]
    pub const fn https_only(mut self) -> Self {
        self.https_only = true;
        self
    }
}

/// Builds the client, with rustls.
///
/// # Errors
///
/// Returns the `reqwest` error if the TLS backend cannot be initialized.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    ClientBuilder::new()
        .use_rustls_tls()
        .https_only(config.https_only)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .user_agent(config.user_agent.as_str())
        .build()
}
