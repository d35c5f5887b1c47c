//! Key Vault keys API client.
//!
//! [`KeyVaultClient`] is the seam between the connector and the service:
//! [`HttpKeyVaultClient`] talks to the REST API, tests plug in their own.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::algorithm::{CurveName, KeyType};
use crate::credential::TokenCredential;
use crate::error::{KmsError, KmsResult};
use crate::keys::JsonWebKey;

/// Key Vault REST API version.
pub const API_VERSION: &str = "7.4";

/// Operations a key may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyOperation {
    /// Create signatures
    Sign,
    /// Verify signatures
    Verify,
    /// Encrypt
    Encrypt,
    /// Decrypt
    Decrypt,
    /// Wrap another key
    WrapKey,
    /// Unwrap another key
    UnwrapKey,
}

/// Key attributes, times in Unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAttributes {
    /// Whether the key can be used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Not before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    /// Last update time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
    /// Deletion recovery level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_level: Option<String>,
}

/// A key as returned by the get-key and create-key calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Public key material
    pub key: JsonWebKey,
    /// Attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<KeyAttributes>,
}

/// Body of a create-key call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateKeyParameters {
    /// Key type
    pub kty: KeyType,
    /// RSA key size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    /// Elliptic curve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<CurveName>,
    /// Allowed operations
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<KeyOperation>,
    /// Attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<KeyAttributes>,
}

/// Key Vault signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512,
    /// RSASSA-PSS with SHA-256
    PS256,
    /// RSASSA-PSS with SHA-384
    PS384,
    /// RSASSA-PSS with SHA-512
    PS512,
    /// ECDSA P-256 with SHA-256
    ES256,
    /// ECDSA P-384 with SHA-384
    ES384,
    /// ECDSA P-521 with SHA-512
    ES512,
}

/// Input of a sign call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignParameters {
    /// Algorithm
    pub algorithm: SigningAlgorithm,
    /// Digest to sign
    pub digest: Vec<u8>,
}

/// Output of a sign call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResult {
    /// Identifier of the key version that signed
    pub kid: Option<String>,
    /// Raw signature; `r || s` for elliptic curve keys
    pub signature: Vec<u8>,
}

/// Remote key operations of one vault.
#[async_trait]
pub trait KeyVaultClient: Send + Sync {
    /// Fetches a key; an empty `version` selects the latest one.
    async fn get_key(&self, name: &str, version: &str) -> KmsResult<KeyBundle>;

    /// Creates a key, or a new version of it.
    async fn create_key(&self, name: &str, params: &CreateKeyParameters) -> KmsResult<KeyBundle>;

    /// Signs a digest; an empty `version` selects the latest one.
    async fn sign(&self, name: &str, version: &str, params: &SignParameters) -> KmsResult<SignResult>;
}

/// Builds the client of one vault.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Creates a client for the vault at `endpoint`.
    async fn create(
        &self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> KmsResult<Arc<dyn KeyVaultClient>>;
}

#[derive(Serialize)]
struct SignRequest {
    alg: SigningAlgorithm,
    value: String,
}

#[derive(Deserialize)]
struct KeyOperationResult {
    #[serde(default)]
    kid: Option<String>,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: ServiceError,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// [`KeyVaultClient`] over the Key Vault REST API.
pub struct HttpKeyVaultClient {
    http: Client,
    endpoint: Url,
    credential: Arc<dyn TokenCredential>,
    scope: String,
}

impl HttpKeyVaultClient {
    /// Creates a client for the vault at `endpoint`, authorizing requests
    /// with tokens for `scope`.
    ///
    /// The endpoint host must be a single label under `dns_suffix`, so a
    /// token for the vault audience is only ever sent to a vault host.
    ///
    /// # Errors
    ///
    /// Returns `KmsError::InvalidConfig` if `endpoint` is not a bare URL of a
    /// host under `dns_suffix`.
    pub fn new(
        http: Client,
        endpoint: &str,
        dns_suffix: &str,
        credential: Arc<dyn TokenCredential>,
        scope: impl Into<String>,
    ) -> KmsResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| KmsError::invalid_config(format!("invalid vault endpoint '{endpoint}': {e}")))?;
        if endpoint.cannot_be_a_base()
            || endpoint.path() != "/"
            || endpoint.query().is_some()
            || endpoint.fragment().is_some()
            || !endpoint.username().is_empty()
            || endpoint.password().is_some()
        {
            return Err(KmsError::invalid_config(format!(
                "invalid vault endpoint '{endpoint}'"
            )));
        }
        if !is_vault_host(endpoint.host_str().unwrap_or_default(), dns_suffix) {
            return Err(KmsError::invalid_config(format!(
                "vault endpoint '{endpoint}' is not under '{dns_suffix}'"
            )));
        }

        Ok(Self {
            http,
            endpoint,
            credential,
            scope: scope.into(),
        })
    }

    /// Vault endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        name: &str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> KmsResult<T> {
        let token = self.credential.get_token(&[self.scope.as_str()]).await?;
        let request_id = Uuid::new_v4();
        debug!(operation, %url, %request_id, "Sending key vault request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token.token.expose_secret())
            .header("x-ms-client-request-id", request_id.to_string());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KmsError::remote_source(operation, e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(KmsError::not_found(operation, name));
        }
        if !status.is_success() {
            let body: ErrorResponse = response.json().await.unwrap_or_default();
            warn!(operation, status = status.as_u16(), code = %body.error.code, %request_id, "Key vault request failed");
            return Err(KmsError::remote_status(
                operation,
                status.as_u16(),
                format!("{} {}", body.error.code, body.error.message).trim().to_owned(),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| KmsError::remote_source(operation, e))
    }
}

#[async_trait]
impl KeyVaultClient for HttpKeyVaultClient {
    async fn get_key(&self, name: &str, version: &str) -> KmsResult<KeyBundle> {
        let url = if version.is_empty() {
            self.url(&["keys", name])
        } else {
            self.url(&["keys", name, version])
        };
        self.request("GetKey", name, Method::GET, url, None).await
    }

    async fn create_key(&self, name: &str, params: &CreateKeyParameters) -> KmsResult<KeyBundle> {
        let body = serde_json::to_value(params).map_err(|e| KmsError::remote_source("CreateKey", e))?;
        let url = self.url(&["keys", name, "create"]);
        self.request("CreateKey", name, Method::POST, url, Some(body)).await
    }

    async fn sign(&self, name: &str, version: &str, params: &SignParameters) -> KmsResult<SignResult> {
        let body = serde_json::to_value(SignRequest {
            alg: params.algorithm,
            value: URL_SAFE_NO_PAD.encode(&params.digest),
        })
        .map_err(|e| KmsError::remote_source("Sign", e))?;
        // An empty version segment selects the latest version.
        let url = self.url(&["keys", name, version, "sign"]);

        let result: KeyOperationResult = self.request("Sign", name, Method::POST, url, Some(body)).await?;
        let signature = URL_SAFE_NO_PAD
            .decode(result.value.trim_end_matches('='))
            .map_err(|e| KmsError::remote("Sign", format!("invalid signature encoding: {e}")))?;

        Ok(SignResult {
            kid: result.kid,
            signature,
        })
    }
}

fn is_vault_host(host: &str, dns_suffix: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let suffix = dns_suffix.trim_matches('.').to_ascii_lowercase();
    host.strip_suffix(&suffix)
        .and_then(|label| label.strip_suffix('.'))
        .is_some_and(|label| !label.is_empty() && !label.contains('.'))
}

/// [`ClientFactory`] building [`HttpKeyVaultClient`]s on a shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    http: Client,
    scope: String,
    dns_suffix: String,
}

impl HttpClientFactory {
    /// Creates a factory; `scope` is the token scope of the vault audience
    /// and `dns_suffix` the domain every vault endpoint must be under.
    #[must_use]
    pub fn new(http: Client, scope: impl Into<String>, dns_suffix: impl Into<String>) -> Self {
        Self {
            http,
            scope: scope.into(),
            dns_suffix: dns_suffix.into(),
        }
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn create(
        &self,
        endpoint: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> KmsResult<Arc<dyn KeyVaultClient>> {
        let client = HttpKeyVaultClient::new(
            self.http.clone(),
            endpoint,
            &self.dns_suffix,
            credential,
            self.scope.clone(),
        )?;
        Ok(Arc::new(client))
    }
}

/// Runs a remote call, failing with `KmsError::Timeout` once `timeout` elapses.
pub(crate) async fn call_with_timeout<T, F>(operation: &'static str, timeout: Duration, call: F) -> KmsResult<T>
where
    F: Future<Output = KmsResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| KmsError::timeout(operation, timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::AccessToken;
    use crate::error::ErrorKind;
    use chrono::Utc;

    struct NoToken;

    #[async_trait]
    impl TokenCredential for NoToken {
        async fn get_token(&self, _scopes: &[&str]) -> KmsResult<AccessToken> {
            Ok(AccessToken::new("t", Utc::now() + chrono::Duration::hours(1)))
        }
    }

    fn client(endpoint: &str) -> HttpKeyVaultClient {
        HttpKeyVaultClient::new(
            Client::new(),
            endpoint,
            "vault.azure.net",
            Arc::new(NoToken),
            "https://vault.azure.net/.default",
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client("https://my-vault.vault.azure.net");
        assert_eq!(
            client.url(&["keys", "my-key"]).as_str(),
            "https://my-vault.vault.azure.net/keys/my-key?api-version=7.4"
        );
        assert_eq!(
            client.url(&["keys", "my key", "v1", "sign"]).as_str(),
            "https://my-vault.vault.azure.net/keys/my%20key/v1/sign?api-version=7.4"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let result = HttpKeyVaultClient::new(Client::new(), "not a url", "vault.azure.net", Arc::new(NoToken), "scope");
        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn test_endpoint_must_be_a_vault_host() {
        for endpoint in [
            "https://attacker.example",
            "https://attacker.example/x#.vault.azure.net",
            "https://vault.azure.net",
            "https://a.b.vault.azure.net",
            "https://my-vault.vault.azure.net.attacker.example",
            "https://my-vault.notvault.azure.net",
            "https://my-vault.vault.azure.net/keys",
            "https://user@my-vault.vault.azure.net",
            "https://my-vault.vault.azure.net?x=1",
        ] {
            let result = HttpKeyVaultClient::new(
                Client::new(),
                endpoint,
                "vault.azure.net",
                Arc::new(NoToken),
                "scope",
            );
            assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::InvalidConfig), "{endpoint}");
        }

        for (endpoint, dns_suffix) in [
            ("https://my-vault.vault.azure.net", "vault.azure.net"),
            ("https://MY-VAULT.Vault.Azure.Net/", "vault.azure.net"),
            ("https://gov.vault.usgovcloudapi.net", "vault.usgovcloudapi.net"),
            ("http://my-vault.vault.azure.net:8080", "vault.azure.net"),
        ] {
            assert!(
                HttpKeyVaultClient::new(Client::new(), endpoint, dns_suffix, Arc::new(NoToken), "scope").is_ok(),
                "{endpoint}"
            );
        }
    }

    #[test]
    fn test_create_key_body() {
        let params = CreateKeyParameters {
            kty: KeyType::EcHsm,
            key_size: None,
            crv: Some(CurveName::P384),
            key_ops: vec![KeyOperation::Sign, KeyOperation::Verify],
            attributes: Some(KeyAttributes {
                enabled: Some(true),
                nbf: Some(1_700_000_000),
                ..KeyAttributes::default()
            }),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            serde_json::json!({
                "kty": "EC-HSM",
                "crv": "P-384",
                "key_ops": ["sign", "verify"],
                "attributes": {"enabled": true, "nbf": 1_700_000_000},
            })
        );
    }

    #[test]
    fn test_key_bundle() {
        let bundle: KeyBundle = serde_json::from_str(
            r#"{"key":{"kid":"https://v.vault.azure.net/keys/k/1","kty":"RSA","n":"AQAB","e":"AQAB"},"attributes":{"enabled":true,"created":1,"recoveryLevel":"Recoverable"}}"#,
        )
        .unwrap();
        let attributes = bundle.attributes.unwrap();
        assert_eq!(attributes.enabled, Some(true));
        assert_eq!(attributes.recovery_level.as_deref(), Some("Recoverable"));
    }

    #[tokio::test]
    async fn test_call_with_timeout() {
        let err = call_with_timeout("GetKey", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let value = call_with_timeout("GetKey", Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
