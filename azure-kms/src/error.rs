//! Key Vault connector error types using thiserror 2.0.
//!
//! Every variant carries the value that caused it (URI, environment name,
//! algorithm, key size) so a failure can be diagnosed from its message alone.
//! Errors are `Clone`: a failed client construction is delivered to every
//! caller that was waiting on it.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::uri::redact;

/// Shared, clonable underlying cause.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the Key Vault connector.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum KmsError {
    /// The resource URI does not follow the `azurekms:` grammar
    #[error("key uri '{uri}' is not valid: {reason}")]
    MalformedAddress {
        /// Offending URI
        uri: String,
        /// What is wrong with it
        reason: String,
    },

    /// Neither the URI nor the connector defaults name a vault
    #[error("key uri '{uri}' is not valid: vault is missing")]
    MissingVault {
        /// Offending URI
        uri: String,
    },

    /// A required name was empty
    #[error("{field} cannot be empty")]
    EmptyName {
        /// Which name was empty
        field: &'static str,
    },

    /// The environment does not match any known cloud
    #[error("unknown key vault cloud environment with name '{name}'")]
    UnknownEnvironment {
        /// Offending environment name
        name: String,
    },

    /// A credential could not be created or could not produce a token
    #[error("error creating azure credentials: {reason}")]
    Credential {
        /// What failed
        reason: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// The signature algorithm has no Key Vault key type
    #[error("key vault does not support signature algorithm '{algorithm}'")]
    UnsupportedAlgorithm {
        /// Offending algorithm
        algorithm: String,
    },

    /// RSA key size outside the supported set
    #[error("key vault does not support key size {bits}")]
    UnsupportedKeySize {
        /// Offending size in bits
        bits: u32,
    },

    /// The remote service call failed
    #[error("key vault {operation} failed: {message}")]
    Remote {
        /// Remote operation name
        operation: &'static str,
        /// HTTP status, when the service answered
        status: Option<u16>,
        /// Service or transport message
        message: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// The remote service reported that the key does not exist
    #[error("key vault {operation} failed: key '{name}' not found")]
    NotFound {
        /// Remote operation name
        operation: &'static str,
        /// Key name
        name: String,
    },

    /// The remote call did not complete before its deadline
    #[error("key vault {operation} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Remote operation name
        operation: &'static str,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// Invalid connector configuration
    #[error("invalid key vault configuration: {reason}")]
    InvalidConfig {
        /// What is wrong
        reason: String,
    },
}

/// Result type for Key Vault operations.
pub type KmsResult<T> = Result<T, KmsError>;

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`KmsError::MalformedAddress`]
    MalformedAddress,
    /// See [`KmsError::MissingVault`]
    MissingVault,
    /// See [`KmsError::EmptyName`]
    EmptyName,
    /// See [`KmsError::UnknownEnvironment`]
    UnknownEnvironment,
    /// See [`KmsError::Credential`]
    Credential,
    /// See [`KmsError::UnsupportedAlgorithm`]
    UnsupportedAlgorithm,
    /// See [`KmsError::UnsupportedKeySize`]
    UnsupportedKeySize,
    /// See [`KmsError::Remote`]
    Remote,
    /// See [`KmsError::NotFound`]
    NotFound,
    /// See [`KmsError::Timeout`]
    Timeout,
    /// See [`KmsError::InvalidConfig`]
    InvalidConfig,
}

impl KmsError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedAddress { .. } => ErrorKind::MalformedAddress,
            Self::MissingVault { .. } => ErrorKind::MissingVault,
            Self::EmptyName { .. } => ErrorKind::EmptyName,
            Self::UnknownEnvironment { .. } => ErrorKind::UnknownEnvironment,
            Self::Credential { .. } => ErrorKind::Credential,
            Self::UnsupportedAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
            Self::UnsupportedKeySize { .. } => ErrorKind::UnsupportedKeySize,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// Check if the error came from a remote service call.
    ///
    /// `NotFound` and `Timeout` are remote errors too.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::NotFound { .. } | Self::Timeout { .. }
        )
    }

    /// Check if the remote service reported the key as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Create a malformed address error. Secret URI parameters are masked.
    #[must_use]
    pub fn malformed(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            uri: redact(&uri.into()),
            reason: reason.into(),
        }
    }

    /// Create a missing vault error.
    #[must_use]
    pub fn missing_vault(uri: impl Into<String>) -> Self {
        Self::MissingVault {
            uri: redact(&uri.into()),
        }
    }

    /// Create an empty name error.
    #[must_use]
    pub const fn empty_name(field: &'static str) -> Self {
        Self::EmptyName { field }
    }

    /// Create an unknown environment error.
    #[must_use]
    pub fn unknown_environment(name: impl Into<String>) -> Self {
        Self::UnknownEnvironment { name: name.into() }
    }

    /// Create a credential error without an underlying cause.
    #[must_use]
    pub fn credential(reason: impl Into<String>) -> Self {
        Self::Credential {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a credential error wrapping its cause.
    #[must_use]
    pub fn credential_source<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Credential {
            reason: reason.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create an unsupported algorithm error.
    #[must_use]
    pub fn unsupported_algorithm(algorithm: impl ToString) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
        }
    }

    /// Create an unsupported key size error.
    #[must_use]
    pub const fn unsupported_key_size(bits: u32) -> Self {
        Self::UnsupportedKeySize { bits }
    }

    /// Create a remote error from a message.
    #[must_use]
    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            status: None,
            message: message.into(),
            source: None,
        }
    }

    /// Create a remote error from an HTTP status and the service message.
    #[must_use]
    pub fn remote_status(operation: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            operation,
            status: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Create a remote error wrapping a transport failure.
    #[must_use]
    pub fn remote_source<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Remote {
            operation,
            status: None,
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(operation: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            operation,
            name: name.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub const fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
