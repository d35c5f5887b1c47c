//! Azure cloud environments.
//!
//! Maps the `environment` URI parameter to the authority host and Key Vault
//! DNS suffix of one of the sovereign clouds.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{KmsError, KmsResult};

/// Sovereign cloud deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cloud {
    /// Azure public cloud
    Public,
    /// Azure US Government cloud
    UsGovernment,
    /// Azure China cloud
    China,
    /// Azure Germany cloud.
    ///
    /// The Germany cloud is not part of the Azure SDK catalog; its endpoints
    /// are best-effort constants and may not work.
    Germany,
}

/// Services with per-cloud endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceName {
    /// Key Vault token audience
    KeyVault,
    /// Azure Resource Manager
    ResourceManager,
}

/// Network configuration of one cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudProfile {
    /// Cloud this profile belongs to
    pub cloud: Cloud,
    /// Microsoft Entra ID authority host, with trailing slash
    pub authority_host: String,
    /// Key Vault DNS suffix, `{vault}.{dns_suffix}`
    pub dns_suffix: String,
    /// Service endpoints known for this cloud
    pub services: HashMap<ServiceName, String>,
}

const ALIASES: &[(&str, Cloud)] = &[
    ("", Cloud::Public),
    ("public", Cloud::Public),
    ("AzureCloud", Cloud::Public),
    ("AzurePublicCloud", Cloud::Public),
    ("usgov", Cloud::UsGovernment),
    ("AzureUSGovernment", Cloud::UsGovernment),
    ("AzureUSGovernmentCloud", Cloud::UsGovernment),
    ("china", Cloud::China),
    ("AzureChinaCloud", Cloud::China),
    ("german", Cloud::Germany),
    ("germany", Cloud::Germany),
    ("AzureGermanCloud", Cloud::Germany),
];

/// Resolves an environment name to its cloud profile.
///
/// The match is case-insensitive and an empty name selects the public cloud.
///
/// # Errors
///
/// Returns `KmsError::UnknownEnvironment` carrying `name` if it matches no
/// known alias.
pub fn resolve(name: &str) -> KmsResult<CloudProfile> {
    name.parse::<Cloud>().map(Cloud::profile)
}

impl Cloud {
    /// Returns the canonical environment name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Public => "AzurePublicCloud",
            Self::UsGovernment => "AzureUSGovernmentCloud",
            Self::China => "AzureChinaCloud",
            Self::Germany => "AzureGermanCloud",
        }
    }

    /// Returns the network configuration of this cloud.
    #[must_use]
    pub fn profile(self) -> CloudProfile {
        let (authority_host, dns_suffix, services): (&str, &str, &[(ServiceName, &str)]) =
            match self {
                Self::Public => (
                    "https://login.microsoftonline.com/",
                    "vault.azure.net",
                    &[
                        (ServiceName::KeyVault, "https://vault.azure.net"),
                        (ServiceName::ResourceManager, "https://management.azure.com"),
                    ],
                ),
                Self::UsGovernment => (
                    "https://login.microsoftonline.us/",
                    "vault.usgovcloudapi.net",
                    &[
                        (ServiceName::KeyVault, "https://vault.usgovcloudapi.net"),
                        (ServiceName::ResourceManager, "https://management.usgovcloudapi.net"),
                    ],
                ),
                Self::China => (
                    "https://login.chinacloudapi.cn/",
                    "vault.azure.cn",
                    &[
                        (ServiceName::KeyVault, "https://vault.azure.cn"),
                        (ServiceName::ResourceManager, "https://management.chinacloudapi.cn"),
                    ],
                ),
                Self::Germany => ("https://login.microsoftonline.de/", "vault.microsoftazure.de", &[]),
            };

        CloudProfile {
            cloud: self,
            authority_host: authority_host.to_owned(),
            dns_suffix: dns_suffix.to_owned(),
            services: services
                .iter()
                .map(|(service, endpoint)| (*service, (*endpoint).to_owned()))
                .collect(),
        }
    }
}

impl FromStr for Cloud {
    type Err = KmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(s))
            .map(|(_, cloud)| *cloud)
            .ok_or_else(|| KmsError::unknown_environment(s))
    }
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl CloudProfile {
    /// Returns the endpoint of `service`, if this cloud defines one.
    #[must_use]
    pub fn service(&self, service: ServiceName) -> Option<&str> {
        self.services.get(&service).map(String::as_str)
    }

    /// Returns the Key Vault token audience.
    ///
    /// Clouds without a catalog entry derive it from the DNS suffix.
    #[must_use]
    pub fn key_vault_audience(&self) -> String {
        self.service(ServiceName::KeyVault)
            .map_or_else(|| format!("https://{}", self.dns_suffix), ToOwned::to_owned)
    }

    /// Returns the OAuth2 scope for Key Vault data plane tokens.
    #[must_use]
    pub fn key_vault_scope(&self) -> String {
        format!("{}/.default", self.key_vault_audience())
    }

    /// Overrides the authority host, normalizing the trailing slash.
    #[must_use]
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        let mut host = host.into();
        if !host.ends_with('/') {
            host.push('/');
        }
        self.authority_host = host;
        self
    }
}
