//! Key addressing with `azurekms:` URIs.
//!
//! A connector is configured with a URI such as
//!
//! - `azurekms:`
//! - `azurekms:vault=vault-name`
//! - `azurekms:vault=vault-name;environment=usgov`
//! - `azurekms:vault=vault-name?hsm=true`
//!
//! and keys are addressed as
//!
//! - `azurekms:name=key-name;vault=vault-name`
//! - `azurekms:name=key-name;vault=vault-name?version=key-version`
//! - `azurekms:name=key-name?hsm=true`
//!
//! `vault` and `hsm` on a key URI override the connector defaults. A missing
//! `version` selects the latest version of the key. `environment` is only read
//! when the connector is built; on a key URI it is accepted and has no effect.

use tracing::debug;

use crate::algorithm::ProtectionLevel;
use crate::cloud;
use crate::error::{KmsError, KmsResult};
use crate::uri::Uri;

/// Scheme of Key Vault URIs.
pub const SCHEME: &str = "azurekms";

/// DNS suffix of the Azure public cloud.
pub const DEFAULT_DNS_SUFFIX: &str = "vault.azure.net";

/// Connector-level defaults, read once from the connector URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultOptions {
    /// Vault used when a key URI does not name one
    pub vault: Option<String>,
    /// DNS suffix of the connector's cloud
    pub dns_suffix: String,
    /// Protection level used when a key URI has no `hsm` option
    pub protection_level: ProtectionLevel,
}

impl Default for DefaultOptions {
    fn default() -> Self {
        Self {
            vault: None,
            dns_suffix: DEFAULT_DNS_SUFFIX.to_owned(),
            protection_level: ProtectionLevel::Unspecified,
        }
    }
}

impl DefaultOptions {
    /// Reads the defaults from the connector URI.
    ///
    /// Without a URI the public cloud and no default vault are used.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::MalformedAddress` if the URI cannot be parsed or its
    /// vault name is not valid, and `KmsError::UnknownEnvironment` if its
    /// `environment` is not known.
    pub fn from_uri(raw: Option<&str>) -> KmsResult<Self> {
        let Some(raw) = raw.filter(|s| !s.is_empty()) else {
            return Ok(Self::default());
        };

        let uri = Uri::parse_with_scheme(SCHEME, raw)?;
        let profile = cloud::resolve(uri.get("environment").unwrap_or_default())?;
        if let Some(vault) = uri.get("vault") {
            validate_vault_name(raw, vault)?;
        }

        Ok(Self {
            vault: uri.get("vault").map(ToOwned::to_owned),
            dns_suffix: profile.dns_suffix,
            protection_level: if uri.get_bool("hsm").unwrap_or(false) {
                ProtectionLevel::Hsm
            } else {
                ProtectionLevel::Unspecified
            },
        })
    }
}

/// A key URI resolved against the connector defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    /// Vault short name
    pub vault: String,
    /// Vault endpoint, `https://{vault}.{dns_suffix}`
    pub endpoint: String,
    /// Key name
    pub key: String,
    /// Key version, empty for the latest one
    pub version: String,
    /// Whether new keys should be HSM-backed
    pub hsm: bool,
    /// `environment` as written on the key URI; it never changes the cloud
    pub environment: Option<String>,
}

/// Resolves a key URI.
///
/// # Errors
///
/// - `KmsError::EmptyName` if `raw` is empty
/// - `KmsError::MalformedAddress` if `raw` is not an `azurekms:` URI, has
///   no `name` or the vault name is not valid
/// - `KmsError::MissingVault` if neither `raw` nor `defaults` name a vault
pub fn resolve(raw: &str, defaults: &DefaultOptions) -> KmsResult<ResourceAddress> {
    if raw.is_empty() {
        return Err(KmsError::empty_name("key name"));
    }

    let uri = Uri::parse_with_scheme(SCHEME, raw)?;

    let Some(key) = uri.get("name") else {
        return Err(KmsError::malformed(raw, "name is missing"));
    };

    let vault = match (uri.get("vault"), defaults.vault.as_deref()) {
        (Some(vault), _) => vault,
        (None, Some(vault)) if !vault.is_empty() => vault,
        _ => return Err(KmsError::missing_vault(raw)),
    };
    validate_vault_name(raw, vault)?;

    let hsm = uri
        .get_bool("hsm")
        .unwrap_or(defaults.protection_level == ProtectionLevel::Hsm);

    let environment = uri.get("environment").map(ToOwned::to_owned);
    if let Some(environment) = &environment {
        debug!(%environment, "environment on a key uri is ignored");
    }

    Ok(ResourceAddress {
        vault: vault.to_owned(),
        endpoint: vault_endpoint(vault, &defaults.dns_suffix),
        key: key.to_owned(),
        version: uri.get("version").unwrap_or_default().to_owned(),
        hsm,
        environment,
    })
}

/// Checks a vault name: 3 to 24 ASCII letters, digits and `-`, starting with
/// a letter.
///
/// The name becomes the first label of the vault host, so anything else could
/// point the connector, and its bearer token, at another host.
///
/// # Errors
///
/// Returns `KmsError::MalformedAddress` for `raw` if `vault` is not valid.
pub fn validate_vault_name(raw: &str, vault: &str) -> KmsResult<()> {
    let valid = (3..=24).contains(&vault.len())
        && vault.starts_with(|c: char| c.is_ascii_alphabetic())
        && vault.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(KmsError::malformed(raw, format!("vault name '{vault}' is not valid")))
    }
}

/// Returns the endpoint of a vault.
#[must_use]
pub fn vault_endpoint(vault: &str, dns_suffix: &str) -> String {
    format!("https://{vault}.{dns_suffix}")
}

/// Returns the canonical URI of a key.
#[must_use]
pub fn key_uri(vault: &str, name: &str, version: Option<&str>) -> String {
    match version.filter(|v| !v.is_empty()) {
        Some(version) => Uri::format(SCHEME, &[("vault", vault), ("name", name), ("version", version)]),
        None => Uri::format(SCHEME, &[("vault", vault), ("name", name)]),
    }
}
