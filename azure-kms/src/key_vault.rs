//! Key manager backed by Azure Key Vault.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::address::{self, DefaultOptions};
use crate::algorithm::{self, ProtectionLevel, SignatureAlgorithm};
use crate::cache::ClientCache;
use crate::client::{
    ClientFactory, CreateKeyParameters, HttpClientFactory, KeyAttributes, KeyOperation, call_with_timeout,
};
use crate::config::KeyVaultOptions;
use crate::credential::{AzureCredentialFactory, CredentialFactory, CredentialOptions};
use crate::error::{KmsError, KmsResult};
use crate::http::build_http_client;
use crate::keys::PublicKey;
use crate::signer::KeyVaultSigner;
use crate::uri::redact;

/// Request to fetch a public key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetPublicKeyRequest {
    /// Key URI
    pub name: String,
    /// Deadline of the remote call, the connector default when unset
    pub timeout: Option<Duration>,
}

impl GetPublicKeyRequest {
    /// Creates a request for the key at `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: None,
        }
    }

    /// Set the deadline of the remote call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Request to create a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateKeyRequest {
    /// Key URI
    pub name: String,
    /// Algorithm the key will sign with
    pub signature_algorithm: SignatureAlgorithm,
    /// RSA key size, 0 for the default
    pub bits: u32,
    /// Protection level; `Unspecified` defers to the key URI
    pub protection_level: ProtectionLevel,
    /// Deadline of the remote call, the connector default when unset
    pub timeout: Option<Duration>,
}

impl CreateKeyRequest {
    /// Creates a request for the key at `name` with default parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the signature algorithm.
    #[must_use]
    pub const fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    /// Set the RSA key size.
    #[must_use]
    pub const fn with_bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    /// Set the protection level.
    #[must_use]
    pub const fn with_protection_level(mut self, protection_level: ProtectionLevel) -> Self {
        self.protection_level = protection_level;
        self
    }

    /// Set the deadline of the remote call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of [`KeyVault::create_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateKeyResponse {
    /// Canonical URI of the new key, versioned when the service reports one
    pub name: String,
    /// Public key
    pub public_key: PublicKey,
    /// Request that builds a signer for the new key
    pub create_signer_request: CreateSignerRequest,
}

/// Request to build a signer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSignerRequest {
    /// Key URI
    pub signing_key: String,
    /// Deadline of each remote call, the connector default when unset
    pub timeout: Option<Duration>,
}

impl CreateSignerRequest {
    /// Creates a request for the key at `signing_key`.
    #[must_use]
    pub fn new(signing_key: impl Into<String>) -> Self {
        Self {
            signing_key: signing_key.into(),
            timeout: None,
        }
    }

    /// Set the deadline of each remote call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Key manager for Azure Key Vault keys.
///
/// Cloning is cheap; clones share the credential and the client cache.
#[derive(Debug, Clone)]
pub struct KeyVault {
    clients: Arc<ClientCache>,
    defaults: Arc<DefaultOptions>,
    request_timeout: Duration,
}

impl KeyVault {
    /// Creates a connector that talks to Key Vault over HTTPS.
    ///
    /// # Errors
    ///
    /// - `KmsError::InvalidConfig` if `options` are not valid
    /// - `KmsError::MalformedAddress` or `KmsError::UnknownEnvironment` if the
    ///   connector URI is not valid
    /// - `KmsError::Credential` if no credential can be built
    #[instrument(skip_all)]
    pub async fn new(options: KeyVaultOptions) -> KmsResult<Self> {
        options.validate()?;
        let http = build_http_client(&options.http)
            .map_err(|e| KmsError::invalid_config(format!("cannot build http client: {e}")))?;
        let profile = CredentialOptions::from_uri(options.uri.as_deref())?.profile;
        let clients = Arc::new(HttpClientFactory::new(
            http,
            profile.key_vault_scope(),
            profile.dns_suffix,
        ));
        Self::with_factories(options, &AzureCredentialFactory, clients).await
    }

    /// Creates a connector with the given credential and client factories.
    ///
    /// # Errors
    ///
    /// Same as [`KeyVault::new`].
    #[instrument(skip_all)]
    pub async fn with_factories(
        options: KeyVaultOptions,
        credentials: &dyn CredentialFactory,
        clients: Arc<dyn ClientFactory>,
    ) -> KmsResult<Self> {
        options.validate()?;
        let uri = options.uri.as_deref();
        let defaults = DefaultOptions::from_uri(uri)?;
        let credential_options = CredentialOptions::from_uri(uri)?;

        let credential = credentials.create(&credential_options).await.map_err(|e| match e {
            KmsError::Credential { .. } => e,
            other => KmsError::Credential {
                reason: other.to_string(),
                source: Some(Arc::new(other)),
            },
        })?;

        info!(
            cloud = %credential_options.profile.cloud,
            vault = defaults.vault.as_deref().unwrap_or_default(),
            protection_level = ?defaults.protection_level,
            "Key vault connector ready"
        );

        Ok(Self {
            clients: Arc::new(ClientCache::new(defaults.dns_suffix.clone(), credential, clients)),
            defaults: Arc::new(defaults),
            request_timeout: options.request_timeout,
        })
    }

    /// Connector defaults read from the connector URI.
    #[must_use]
    pub fn defaults(&self) -> &DefaultOptions {
        &self.defaults
    }

    /// Fetches the public key at `req.name`.
    ///
    /// # Errors
    ///
    /// - `KmsError::EmptyName` if `req.name` is empty
    /// - address errors, see [`address::resolve`]
    /// - `KmsError::NotFound`, `KmsError::Remote` or `KmsError::Timeout` if
    ///   the remote call fails
    #[instrument(skip(self, req), fields(name = %redact(&req.name)))]
    pub async fn get_public_key(&self, req: &GetPublicKeyRequest) -> KmsResult<PublicKey> {
        if req.name.is_empty() {
            return Err(KmsError::empty_name("getPublicKeyRequest 'name'"));
        }

        let address = address::resolve(&req.name, &self.defaults)?;
        let client = self.clients.get(&address.endpoint).await?;

        let timeout = req.timeout.unwrap_or(self.request_timeout);
        let bundle = call_with_timeout(
            "GetKey",
            timeout,
            client.get_key(&address.key, &address.version),
        )
        .await?;

        debug!(key = %address.key, vault = %address.vault, "Fetched public key");
        bundle.key.to_public_key("GetKey")
    }

    /// Creates a key, or a new version of an existing one.
    ///
    /// The key URI and algorithm are validated before the service is
    /// contacted.
    ///
    /// # Errors
    ///
    /// - `KmsError::EmptyName` if `req.name` is empty
    /// - address errors, see [`address::resolve`]
    /// - algorithm errors, see [`algorithm::map`]
    /// - `KmsError::Remote` or `KmsError::Timeout` if the remote call fails
    #[instrument(skip(self, req), fields(name = %redact(&req.name), algorithm = %req.signature_algorithm))]
    pub async fn create_key(&self, req: &CreateKeyRequest) -> KmsResult<CreateKeyResponse> {
        if req.name.is_empty() {
            return Err(KmsError::empty_name("createKeyRequest 'name'"));
        }

        let address = address::resolve(&req.name, &self.defaults)?;

        // Only an unspecified level is taken from the key uri.
        let protection_level = match req.protection_level {
            ProtectionLevel::Unspecified if address.hsm => ProtectionLevel::Hsm,
            level => level,
        };
        let params = algorithm::map(req.signature_algorithm, protection_level, req.bits)?;

        let client = self.clients.get(&address.endpoint).await?;

        let parameters = CreateKeyParameters {
            kty: params.key_type,
            key_size: params.key_size,
            crv: params.curve,
            key_ops: vec![KeyOperation::Sign, KeyOperation::Verify],
            attributes: Some(KeyAttributes {
                enabled: Some(true),
                nbf: Some(Utc::now().timestamp()),
                ..KeyAttributes::default()
            }),
        };

        let timeout = req.timeout.unwrap_or(self.request_timeout);
        let bundle = call_with_timeout("CreateKey", timeout, client.create_key(&address.key, &parameters)).await?;

        let public_key = bundle.key.to_public_key("CreateKey")?;
        let version = bundle.key.key_version();
        let name = address::key_uri(&address.vault, &address.key, version.as_deref());

        info!(
            key = %address.key,
            vault = %address.vault,
            key_type = %params.key_type,
            version = version.as_deref().unwrap_or_default(),
            "Created key"
        );

        Ok(CreateKeyResponse {
            create_signer_request: CreateSignerRequest {
                signing_key: name.clone(),
                timeout: req.timeout,
            },
            name,
            public_key,
        })
    }

    /// Builds a signer for the key at `req.signing_key`.
    ///
    /// The public key is fetched once, here.
    ///
    /// # Errors
    ///
    /// - `KmsError::EmptyName` if `req.signing_key` is empty
    /// - any error of [`KeyVault::get_public_key`]
    #[instrument(skip(self, req), fields(signing_key = %redact(&req.signing_key)))]
    pub async fn create_signer(&self, req: &CreateSignerRequest) -> KmsResult<KeyVaultSigner> {
        if req.signing_key.is_empty() {
            return Err(KmsError::empty_name("createSignerRequest 'signingKey'"));
        }

        KeyVaultSigner::new(
            Arc::clone(&self.clients),
            Arc::clone(&self.defaults),
            &req.signing_key,
            req.timeout.unwrap_or(self.request_timeout),
        )
        .await
    }

    /// Checks that `name` is a key URI this connector can resolve.
    ///
    /// # Errors
    ///
    /// Returns the address errors of [`address::resolve`].
    pub fn validate_name(&self, name: &str) -> KmsResult<()> {
        address::resolve(name, &self.defaults).map(|_| ())
    }

    /// Closes the connector. Nothing to release; always succeeds.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn close(&self) -> KmsResult<()> {
        Ok(())
    }
}
