//! Credential resolution, delegated to `azure_identity`.
//!
//! A connector URI carrying `client-id`, `client-secret` and `tenant-id` gets a
//! client secret credential and nothing else is tried. Any other URI gets the
//! default credential chain of `azure_identity`, which reads the `AZURE_*`
//! environment variables, then tries managed identity and the Azure CLI.
//!
//! `aad-endpoint` replaces the authority host of the selected cloud in both
//! cases.

use async_trait::async_trait;
use azure_core::credentials::{Secret, TokenCredential as AzureTokenCredential};
use azure_identity::{
    ClientSecretCredential, ClientSecretCredentialOptions, DefaultAzureCredentialBuilder, TokenCredentialOptions,
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::address::SCHEME;
use crate::cloud::{self, CloudProfile};
use crate::error::{KmsError, KmsResult};
use crate::uri::Uri;

/// Bearer token with its expiry.
#[derive(Clone)]
pub struct AccessToken {
    /// Token value
    pub token: SecretString,
    /// Expiry time
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_on,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// A principal that can produce bearer tokens.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Returns a token valid for `scopes`.
    async fn get_token(&self, scopes: &[&str]) -> KmsResult<AccessToken>;
}

/// Which credential [`resolve`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Client secret from the connector URI
    ClientSecret,
    /// `azure_identity` default chain
    DefaultChain,
}

/// Credential parameters read from the connector URI.
#[derive(Debug, Clone)]
pub struct CredentialOptions {
    /// Cloud, with `aad-endpoint` already applied
    pub profile: CloudProfile,
    /// `tenant-id`
    pub tenant_id: Option<String>,
    /// `client-id`
    pub client_id: Option<String>,
    /// `client-secret`
    pub client_secret: Option<SecretString>,
}

impl Default for CredentialOptions {
    fn default() -> Self {
        Self {
            profile: cloud::Cloud::Public.profile(),
            tenant_id: None,
            client_id: None,
            client_secret: None,
        }
    }
}

impl CredentialOptions {
    /// Reads the credential parameters from the connector URI.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::MalformedAddress` if the URI cannot be parsed and
    /// `KmsError::UnknownEnvironment` if its `environment` is not known.
    pub fn from_uri(raw: Option<&str>) -> KmsResult<Self> {
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };

        let uri = Uri::parse_with_scheme(SCHEME, raw)?;
        let mut profile = cloud::resolve(uri.get("environment").unwrap_or_default())?;
        if let Some(aad_endpoint) = uri.get("aad-endpoint") {
            profile = profile.with_authority_host(aad_endpoint);
        }

        Ok(Self {
            profile,
            tenant_id: uri.get("tenant-id").map(ToOwned::to_owned),
            client_id: uri.get("client-id").map(ToOwned::to_owned),
            client_secret: uri.get("client-secret").map(|s| SecretString::from(s.to_owned())),
        })
    }

    /// Returns tenant id, client id and client secret when all three are set.
    #[must_use]
    pub fn client_secret_parts(&self) -> Option<(&str, &str, &SecretString)> {
        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant_id), Some(client_id), Some(secret)) => Some((tenant_id, client_id, secret)),
            _ => None,
        }
    }

    /// Returns the credential these options select.
    #[must_use]
    pub fn source(&self) -> CredentialSource {
        if self.client_secret_parts().is_some() {
            CredentialSource::ClientSecret
        } else {
            CredentialSource::DefaultChain
        }
    }
}

/// Builds the connector credential.
#[async_trait]
pub trait CredentialFactory: Send + Sync {
    /// Creates the credential shared by every vault client.
    async fn create(&self, options: &CredentialOptions) -> KmsResult<Arc<dyn TokenCredential>>;
}

/// [`CredentialFactory`] backed by Microsoft Entra ID, see [`resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureCredentialFactory;

#[async_trait]
impl CredentialFactory for AzureCredentialFactory {
    async fn create(&self, options: &CredentialOptions) -> KmsResult<Arc<dyn TokenCredential>> {
        resolve(options)
    }
}

/// Selects and builds the credential for `options`.
///
/// Explicit client secret parameters win and are never followed by the
/// default chain, even when building the client secret credential fails.
/// A `tenant-id` given alone is checked but the default chain takes its
/// tenant from `AZURE_TENANT_ID`.
///
/// # Errors
///
/// Returns `KmsError::Credential` if the tenant id is not valid or the
/// selected credential cannot be built.
pub fn resolve(options: &CredentialOptions) -> KmsResult<Arc<dyn TokenCredential>> {
    if let Some(tenant_id) = &options.tenant_id {
        validate_tenant_id(tenant_id)?;
    }

    let mut credential_options = TokenCredentialOptions::default();
    credential_options.set_authority_host(options.profile.authority_host.clone());

    if let Some((tenant_id, client_id, secret)) = options.client_secret_parts() {
        debug!(tenant_id, client_id, authority_host = %options.profile.authority_host, "Using client secret credential from uri");
        let mut secret_options = ClientSecretCredentialOptions::default();
        secret_options.credential_options = credential_options;

        let credential = ClientSecretCredential::new(
            tenant_id,
            client_id.to_owned(),
            Secret::new(secret.expose_secret().to_owned()),
            Some(secret_options),
        )
        .map_err(|e| KmsError::credential_source("cannot build client secret credential", e))?;
        return Ok(Arc::new(IdentityCredential::new("ClientSecretCredential", credential)));
    }

    debug!(cloud = %options.profile.cloud, "Using default credential chain");
    let credential = DefaultAzureCredentialBuilder::new()
        .with_options(credential_options)
        .build()
        .map_err(|e| KmsError::credential_source("cannot build default credential chain", e))?;
    Ok(Arc::new(IdentityCredential::new("DefaultAzureCredential", credential)))
}

/// Checks a tenant id before it reaches a URL or a command line.
///
/// # Errors
///
/// Returns `KmsError::Credential` unless `tenant_id` is made of ASCII letters,
/// digits, `-` and `.`.
pub fn validate_tenant_id(tenant_id: &str) -> KmsResult<()> {
    let valid = !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(KmsError::credential(format!("invalid tenant id '{tenant_id}'")))
    }
}

/// Adapts an `azure_identity` credential to [`TokenCredential`].
#[derive(Debug)]
struct IdentityCredential {
    name: &'static str,
    inner: Arc<dyn AzureTokenCredential>,
}

impl IdentityCredential {
    fn new(name: &'static str, inner: Arc<dyn AzureTokenCredential>) -> Self {
        Self { name, inner }
    }
}

#[async_trait]
impl TokenCredential for IdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> KmsResult<AccessToken> {
        let token = self
            .inner
            .get_token(scopes)
            .await
            .map_err(|e| KmsError::credential_source(format!("{} cannot get a token", self.name), e))?;

        let expires_on = DateTime::from_timestamp(token.expires_on.unix_timestamp(), 0).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Ok(AccessToken::new(token.token.secret(), expires_on))
    }
}
