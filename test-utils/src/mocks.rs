//! Mock implementations of the connector seams.
//!
//! - [`MockKeyVaultClient`]: in-memory vault recording every call
//! - [`MockClientFactory`]: hands out one mock per endpoint, counting builds
//! - [`StaticCredential`] and [`StaticCredentialFactory`]: fixed tokens

use async_trait::async_trait;
use azure_kms::algorithm::CurveName;
use azure_kms::client::{
    ClientFactory, CreateKeyParameters, KeyBundle, KeyVaultClient, SignParameters, SignResult,
};
use azure_kms::credential::{AccessToken, CredentialFactory, CredentialOptions, TokenCredential};
use azure_kms::error::{KmsError, KmsResult};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::fixtures::{jwk_for, key_bundle, kid};

/// A recorded sign call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignCall {
    /// Key name
    pub name: String,
    /// Key version, empty for the latest
    pub version: String,
    /// Parameters
    pub params: SignParameters,
}

/// In-memory vault.
///
/// Keys are created with fixture material; signatures are fixed patterns of
/// the size the key would produce.
#[derive(Debug)]
pub struct MockKeyVaultClient {
    endpoint: String,
    keys: Mutex<HashMap<String, Vec<KeyBundle>>>,
    created: Mutex<Vec<(String, CreateKeyParameters)>>,
    fetched: Mutex<Vec<(String, String)>>,
    signed: Mutex<Vec<SignCall>>,
    delay: Mutex<Duration>,
    next_version: AtomicUsize,
}

impl MockKeyVaultClient {
    /// Create an empty vault at `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
            signed: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            next_version: AtomicUsize::new(1),
        }
    }

    /// Endpoint of this vault.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Store a key version; the version is taken from the bundle's `kid`.
    pub fn insert(&self, name: &str, bundle: KeyBundle) {
        self.keys.lock().entry(name.to_string()).or_default().push(bundle);
    }

    /// Recorded create-key calls.
    #[must_use]
    pub fn created(&self) -> Vec<(String, CreateKeyParameters)> {
        self.created.lock().clone()
    }

    /// Recorded get-key calls as (name, version).
    #[must_use]
    pub fn fetched(&self) -> Vec<(String, String)> {
        self.fetched.lock().clone()
    }

    /// Recorded sign calls.
    #[must_use]
    pub fn signed(&self) -> Vec<SignCall> {
        self.signed.lock().clone()
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn find(&self, operation: &'static str, name: &str, version: &str) -> KmsResult<KeyBundle> {
        let keys = self.keys.lock();
        let versions = keys.get(name).ok_or_else(|| KmsError::not_found(operation, name))?;
        let found = if version.is_empty() {
            versions.last()
        } else {
            versions
                .iter()
                .find(|bundle| bundle.key.key_version().as_deref() == Some(version))
        };
        found.cloned().ok_or_else(|| KmsError::not_found(operation, name))
    }
}

#[async_trait]
impl KeyVaultClient for MockKeyVaultClient {
    async fn get_key(&self, name: &str, version: &str) -> KmsResult<KeyBundle> {
        self.fetched.lock().push((name.to_string(), version.to_string()));
        self.wait().await;
        self.find("GetKey", name, version)
    }

    async fn create_key(&self, name: &str, params: &CreateKeyParameters) -> KmsResult<KeyBundle> {
        self.created.lock().push((name.to_string(), params.clone()));
        self.wait().await;

        let version = format!("{:032x}", self.next_version.fetch_add(1, Ordering::SeqCst));
        let bundle = key_bundle(jwk_for(params), kid(&self.endpoint, name, &version));
        self.insert(name, bundle.clone());
        Ok(bundle)
    }

    async fn sign(&self, name: &str, version: &str, params: &SignParameters) -> KmsResult<SignResult> {
        self.signed.lock().push(SignCall {
            name: name.to_string(),
            version: version.to_string(),
            params: params.clone(),
        });
        self.wait().await;

        let bundle = self.find("Sign", name, version)?;
        let signature = match bundle.key.crv.as_deref().and_then(CurveName::from_name) {
            Some(curve) => {
                let size = curve.coordinate_size();
                let mut r = vec![0x81; size];
                let mut s = vec![0x42; size];
                if curve == CurveName::P521 {
                    // Keep both scalars below the P-521 order.
                    r[0] = 0x01;
                    s[0] = 0x01;
                }
                r.extend(s);
                r
            }
            None => vec![0x37; 256],
        };

        Ok(SignResult {
            kid: bundle.key.kid,
            signature,
        })
    }
}

/// Client factory handing out one [`MockKeyVaultClient`] per endpoint.
#[derive(Debug, Default)]
pub struct MockClientFactory {
    clients: Mutex<HashMap<String, Arc<MockKeyVaultClient>>>,
    builds: AtomicUsize,
    failures: AtomicUsize,
    delay: Mutex<Duration>,
}

impl MockClientFactory {
    /// Create a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each build take `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    /// Fail the next `count` builds.
    #[must_use]
    pub fn with_failures(self, count: usize) -> Self {
        self.failures.store(count, Ordering::SeqCst);
        self
    }

    /// The mock served for `endpoint`, created on first use.
    #[must_use]
    pub fn client(&self, endpoint: &str) -> Arc<MockKeyVaultClient> {
        Arc::clone(
            self.clients
                .lock()
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(MockKeyVaultClient::new(endpoint))),
        )
    }

    /// Number of builds started, failed ones included.
    #[must_use]
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn create(
        &self,
        endpoint: &str,
        _credential: Arc<dyn TokenCredential>,
    ) -> KmsResult<Arc<dyn KeyVaultClient>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(KmsError::remote("NewClient", format!("cannot connect to {endpoint}")));
        }

        Ok(self.client(endpoint))
    }
}

/// Credential returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    /// Create a credential returning `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Default for StaticCredential {
    fn default() -> Self {
        Self::new("test-token")
    }
}

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, _scopes: &[&str]) -> KmsResult<AccessToken> {
        Ok(AccessToken::new(self.token.clone(), Utc::now() + chrono::Duration::hours(1)))
    }
}

/// Credential factory returning [`StaticCredential`]s and recording options.
#[derive(Debug, Default)]
pub struct StaticCredentialFactory {
    requests: Mutex<Vec<CredentialOptions>>,
    error: Option<KmsError>,
}

impl StaticCredentialFactory {
    /// Create a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory that always fails with `error`.
    #[must_use]
    pub fn failing(error: KmsError) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            error: Some(error),
        }
    }

    /// Options passed to every `create` call.
    #[must_use]
    pub fn requests(&self) -> Vec<CredentialOptions> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CredentialFactory for StaticCredentialFactory {
    async fn create(&self, options: &CredentialOptions) -> KmsResult<Arc<dyn TokenCredential>> {
        self.requests.lock().push(options.clone());
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(Arc::new(StaticCredential::default())),
        }
    }
}
