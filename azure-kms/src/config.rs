//! Connector configuration.

use std::time::Duration;

use crate::error::{KmsError, KmsResult};
use crate::http::HttpConfig;

/// Deadline of a remote call when the request does not set one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Options of a [`KeyVault`](crate::KeyVault) connector.
#[derive(Debug, Clone)]
pub struct KeyVaultOptions {
    /// Connector URI, e.g. `azurekms:vault=my-vault;environment=usgov`
    pub uri: Option<String>,
    /// Deadline of remote calls
    pub request_timeout: Duration,
    /// HTTP client settings
    pub http: HttpConfig,
}

impl Default for KeyVaultOptions {
    fn default() -> Self {
        Self {
            uri: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http: HttpConfig::default(),
        }
    }
}

impl KeyVaultOptions {
    /// Set the connector URI.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the default deadline of remote calls.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the HTTP client settings.
    #[must_use]
    pub fn with_http_config(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::InvalidConfig` if a timeout is zero.
    pub fn validate(&self) -> KmsResult<()> {
        if self.request_timeout.is_zero() {
            return Err(KmsError::invalid_config("request timeout must be greater than zero"));
        }
        if self.http.timeout.is_zero() || self.http.connect_timeout.is_zero() {
            return Err(KmsError::invalid_config("http timeouts must be greater than zero"));
        }
        Ok(())
    }
}
