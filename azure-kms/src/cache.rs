//! Per-vault client cache with single-flight construction.
//!
//! One client is built per vault endpoint and shared by every caller. While a
//! client is being built, concurrent callers for the same endpoint await the
//! same construction; callers for other endpoints are not blocked. A failed
//! construction is reported to everyone waiting on it and is not cached, so
//! the next call tries again.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::address::vault_endpoint;
use crate::client::{ClientFactory, KeyVaultClient};
use crate::credential::TokenCredential;
use crate::error::KmsResult;

/// Type alias for an in-flight client construction.
type PendingClient = Shared<BoxFuture<'static, KmsResult<Arc<dyn KeyVaultClient>>>>;

enum Entry {
    Ready(Arc<dyn KeyVaultClient>),
    Pending(PendingClient),
}

/// Cache of vault clients keyed by endpoint.
pub struct ClientCache {
    dns_suffix: String,
    credential: Arc<dyn TokenCredential>,
    factory: Arc<dyn ClientFactory>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("dns_suffix", &self.dns_suffix)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl ClientCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(
        dns_suffix: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            dns_suffix: dns_suffix.into(),
            credential,
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// DNS suffix used by [`ClientCache::get_vault`].
    #[must_use]
    pub fn dns_suffix(&self) -> &str {
        &self.dns_suffix
    }

    /// Returns the client of the vault named `vault`.
    ///
    /// # Errors
    ///
    /// Returns the error of the client construction.
    pub async fn get_vault(&self, vault: &str) -> KmsResult<Arc<dyn KeyVaultClient>> {
        self.get(&vault_endpoint(vault, &self.dns_suffix)).await
    }

    /// Returns the client of the vault at `endpoint`, building it once.
    ///
    /// # Errors
    ///
    /// Returns the error of the client construction; every caller waiting on
    /// the same construction gets the same error.
    #[instrument(skip(self))]
    pub async fn get(&self, endpoint: &str) -> KmsResult<Arc<dyn KeyVaultClient>> {
        let pending = {
            let mut entries = self.entries.lock();
            match entries.get(endpoint) {
                Some(Entry::Ready(client)) => return Ok(Arc::clone(client)),
                Some(Entry::Pending(pending)) => {
                    debug!("Waiting for client construction in progress");
                    pending.clone()
                }
                None => {
                    debug!("Building vault client");
                    let factory = Arc::clone(&self.factory);
                    let credential = Arc::clone(&self.credential);
                    let owned_endpoint = endpoint.to_owned();
                    let build: BoxFuture<'static, KmsResult<Arc<dyn KeyVaultClient>>> =
                        Box::pin(async move { factory.create(&owned_endpoint, credential).await });
                    let pending = build.shared();
                    entries.insert(endpoint.to_owned(), Entry::Pending(pending.clone()));
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut entries = self.entries.lock();
        let is_current = matches!(
            entries.get(endpoint),
            Some(Entry::Pending(current)) if current.ptr_eq(&pending)
        );
        if is_current {
            match &result {
                Ok(client) => {
                    entries.insert(endpoint.to_owned(), Entry::Ready(Arc::clone(client)));
                }
                Err(e) => {
                    warn!(error = %e, "Vault client construction failed");
                    entries.remove(endpoint);
                }
            }
        }

        result
    }

    /// Number of vaults with a built or in-flight client.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no client has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
