//! Signer backed by the Key Vault sign operation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::address::{self, DefaultOptions};
use crate::algorithm::CurveName;
use crate::cache::ClientCache;
use crate::client::{SignParameters, SigningAlgorithm, call_with_timeout};
use crate::error::{KmsError, KmsResult};
use crate::keys::PublicKey;

/// Hash function the digest was computed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Digest size in bytes.
    #[must_use]
    pub const fn digest_size(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        })
    }
}

/// Options of a sign call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignerOptions {
    /// Hash of the digest
    pub hash: HashAlgorithm,
    /// Use RSA-PSS instead of PKCS#1 v1.5; ignored for EC keys
    pub pss: bool,
}

impl SignerOptions {
    /// PKCS#1 v1.5 or ECDSA over a digest made with `hash`.
    #[must_use]
    pub const fn new(hash: HashAlgorithm) -> Self {
        Self { hash, pss: false }
    }

    /// RSA-PSS over a digest made with `hash`.
    #[must_use]
    pub const fn pss(hash: HashAlgorithm) -> Self {
        Self { hash, pss: true }
    }
}

/// Signs digests with a Key Vault key.
///
/// The key URI is resolved and the vault client taken from the connector
/// cache on every call, so a signer never holds a client of its own.
#[derive(Debug, Clone)]
pub struct KeyVaultSigner {
    clients: Arc<ClientCache>,
    defaults: Arc<DefaultOptions>,
    name: String,
    public_key: PublicKey,
    timeout: Duration,
}

impl KeyVaultSigner {
    pub(crate) async fn new(
        clients: Arc<ClientCache>,
        defaults: Arc<DefaultOptions>,
        name: &str,
        timeout: Duration,
    ) -> KmsResult<Self> {
        let address = address::resolve(name, &defaults)?;
        let client = clients.get(&address.endpoint).await?;
        let bundle = call_with_timeout(
            "GetKey",
            timeout,
            client.get_key(&address.key, &address.version),
        )
        .await?;

        Ok(Self {
            clients,
            defaults,
            name: name.to_owned(),
            public_key: bundle.key.to_public_key("GetKey")?,
            timeout,
        })
    }

    /// Public key fetched when the signer was created.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Key URI of the signer.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signs `digest`.
    ///
    /// EC signatures are ASN.1 DER `ECDSA-Sig-Value`s, RSA signatures are
    /// returned as the service produced them.
    ///
    /// # Errors
    ///
    /// - `KmsError::UnsupportedAlgorithm` if the digest size does not match
    ///   `opts.hash`
    /// - `KmsError::Remote`, `KmsError::NotFound` or `KmsError::Timeout` if
    ///   the remote call fails
    #[instrument(skip(self, digest), fields(name = %self.name))]
    pub async fn sign(&self, digest: &[u8], opts: SignerOptions) -> KmsResult<Vec<u8>> {
        if digest.len() != opts.hash.digest_size() {
            return Err(KmsError::unsupported_algorithm(format!(
                "{} with a {}-byte digest",
                opts.hash,
                digest.len()
            )));
        }
        let algorithm = signing_algorithm(&self.public_key, opts);

        let address = address::resolve(&self.name, &self.defaults)?;
        let client = self.clients.get(&address.endpoint).await?;

        let params = SignParameters {
            algorithm,
            digest: digest.to_vec(),
        };
        let result = call_with_timeout(
            "Sign",
            self.timeout,
            client.sign(&address.key, &address.version, &params),
        )
        .await?;
        debug!(?algorithm, kid = result.kid.as_deref().unwrap_or_default(), "Signed digest");

        match &self.public_key {
            PublicKey::Ec(key) => ec_signature_to_der(key.curve, &result.signature),
            PublicKey::Rsa(_) => Ok(result.signature),
        }
    }
}

/// Picks the Key Vault algorithm: by curve for EC keys, by hash for RSA keys.
fn signing_algorithm(key: &PublicKey, opts: SignerOptions) -> SigningAlgorithm {
    match key {
        PublicKey::Ec(key) => match key.curve {
            CurveName::P256 => SigningAlgorithm::ES256,
            CurveName::P384 => SigningAlgorithm::ES384,
            CurveName::P521 => SigningAlgorithm::ES512,
        },
        PublicKey::Rsa(_) => match (opts.hash, opts.pss) {
            (HashAlgorithm::Sha256, false) => SigningAlgorithm::RS256,
            (HashAlgorithm::Sha384, false) => SigningAlgorithm::RS384,
            (HashAlgorithm::Sha512, false) => SigningAlgorithm::RS512,
            (HashAlgorithm::Sha256, true) => SigningAlgorithm::PS256,
            (HashAlgorithm::Sha384, true) => SigningAlgorithm::PS384,
            (HashAlgorithm::Sha512, true) => SigningAlgorithm::PS512,
        },
    }
}

/// Converts a raw `r || s` signature into an ASN.1 DER `ECDSA-Sig-Value`.
fn ec_signature_to_der(curve: CurveName, raw: &[u8]) -> KmsResult<Vec<u8>> {
    let size = curve.coordinate_size();
    if raw.len() != 2 * size {
        return Err(KmsError::remote(
            "Sign",
            format!("{curve} signature of {} bytes, expected {}", raw.len(), 2 * size),
        ));
    }

    let der = match curve {
        CurveName::P256 => p256::ecdsa::Signature::from_slice(raw).map(|sig| sig.to_der().as_bytes().to_vec()),
        CurveName::P384 => p384::ecdsa::Signature::from_slice(raw).map(|sig| sig.to_der().as_bytes().to_vec()),
        CurveName::P521 => p521::ecdsa::Signature::from_slice(raw).map(|sig| sig.to_der().as_bytes().to_vec()),
    };
    der.map_err(|e| KmsError::remote("Sign", format!("invalid {curve} signature: {e}")))
}
