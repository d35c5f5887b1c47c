//! Azure Key Vault key manager.
//!
//! Keys are addressed with `azurekms:` URIs such as
//! `azurekms:name=my-key;vault=my-vault?version=abc&hsm=true`. The connector
//! provides:
//! - key creation from a signature algorithm, software or HSM backed
//! - public key retrieval
//! - signers that sign digests with the remote key
//!
//! One credential is resolved per connector and one client is built per vault,
//! shared by every operation against that vault.
//!
//! ```no_run
//! # async fn example() -> azure_kms::KmsResult<()> {
//! use azure_kms::{CreateKeyRequest, KeyVault, KeyVaultOptions, SignatureAlgorithm};
//!
//! let kms = KeyVault::new(KeyVaultOptions::default().with_uri("azurekms:vault=my-vault")).await?;
//! let key = kms
//!     .create_key(
//!         &CreateKeyRequest::new("azurekms:name=my-key")
//!             .with_signature_algorithm(SignatureAlgorithm::EcdsaWithSha256),
//!     )
//!     .await?;
//! let signer = kms.create_signer(&key.create_signer_request).await?;
//! # let _ = signer;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod algorithm;
pub mod cache;
pub mod client;
pub mod cloud;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod key_vault;
pub mod keys;
pub mod signer;
pub mod uri;

pub use address::{DefaultOptions, ResourceAddress};
pub use algorithm::{KeyCreationParams, KeyType, ProtectionLevel, SignatureAlgorithm};
pub use cache::ClientCache;
pub use client::{ClientFactory, HttpClientFactory, HttpKeyVaultClient, KeyVaultClient};
pub use cloud::{Cloud, CloudProfile};
pub use config::{DEFAULT_REQUEST_TIMEOUT, KeyVaultOptions};
pub use credential::{
    AccessToken, AzureCredentialFactory, CredentialFactory, CredentialOptions, CredentialSource, TokenCredential,
};
pub use error::{ErrorKind, KmsError, KmsResult};
pub use http::{HttpConfig, build_http_client};
pub use key_vault::{CreateKeyRequest, CreateKeyResponse, CreateSignerRequest, GetPublicKeyRequest, KeyVault};
pub use keys::{EcPublicKey, JsonWebKey, PublicKey, RsaPublicKey};
pub use signer::{HashAlgorithm, KeyVaultSigner, SignerOptions};
