//! Key manager tests against mock vaults.
//!
//! Tests validate:
//! - create-key mapping and protection level precedence
//! - name validation without contacting the service
//! - signer algorithm selection and signature encoding
//! - credential resolution failures and per-call timeouts

use azure_kms::algorithm::{CurveName, KeyType, ProtectionLevel, SignatureAlgorithm};
use azure_kms::client::SigningAlgorithm;
use azure_kms::error::{ErrorKind, KmsError};
use azure_kms::keys::PublicKey;
use azure_kms::signer::{HashAlgorithm, SignerOptions};
use azure_kms::{CreateKeyRequest, CreateSignerRequest, GetPublicKeyRequest, KeyVault, KeyVaultOptions};
use std::sync::Arc;
use std::time::Duration;
use test_utils::fixtures::{TEST_ENDPOINT, TEST_VERSION, ec_jwk, key_bundle, kid, rsa_jwk};
use test_utils::init_test_tracing;
use test_utils::mocks::{MockClientFactory, StaticCredentialFactory};

async fn connector(uri: &str) -> (KeyVault, Arc<MockClientFactory>) {
    init_test_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let kms = KeyVault::with_factories(
        KeyVaultOptions::default().with_uri(uri),
        &StaticCredentialFactory::new(),
        factory.clone(),
    )
    .await
    .unwrap();
    (kms, factory)
}

#[tokio::test]
async fn test_create_key_ecdsa_sha384() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;

    let response = kms
        .create_key(
            &CreateKeyRequest::new("azurekms:name=my-key")
                .with_signature_algorithm(SignatureAlgorithm::EcdsaWithSha384),
        )
        .await
        .unwrap();

    let created = factory.client(TEST_ENDPOINT).created();
    assert_eq!(created.len(), 1);
    let (name, params) = &created[0];
    assert_eq!(name, "my-key");
    assert_eq!(params.kty, KeyType::Ec);
    assert_eq!(params.crv, Some(CurveName::P384));
    assert_eq!(params.key_size, None);

    let attributes = params.attributes.clone().unwrap();
    assert_eq!(attributes.enabled, Some(true));
    assert!(attributes.nbf.is_some());

    assert!(response.name.starts_with("azurekms:name=my-key;vault=my-vault;version="));
    assert_eq!(response.create_signer_request.signing_key, response.name);
    let PublicKey::Ec(key) = response.public_key else {
        panic!("expected an EC key");
    };
    assert_eq!(key.curve, CurveName::P384);
}

#[tokio::test]
async fn test_create_key_protection_precedence() {
    let (kms, factory) = connector("azurekms:vault=my-vault?hsm=true").await;

    // Connector default applies.
    kms.create_key(&CreateKeyRequest::new("azurekms:name=a")).await.unwrap();
    // Key uri overrides the connector default.
    kms.create_key(&CreateKeyRequest::new("azurekms:name=b?hsm=false")).await.unwrap();
    // Request overrides the key uri.
    kms.create_key(
        &CreateKeyRequest::new("azurekms:name=c;hsm=true").with_protection_level(ProtectionLevel::Software),
    )
    .await
    .unwrap();

    let kinds: Vec<KeyType> = factory
        .client(TEST_ENDPOINT)
        .created()
        .into_iter()
        .map(|(_, params)| params.kty)
        .collect();
    assert_eq!(kinds, vec![KeyType::EcHsm, KeyType::Ec, KeyType::Ec]);
}

#[tokio::test]
async fn test_create_key_rsa_sizes() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;

    let response = kms
        .create_key(
            &CreateKeyRequest::new("azurekms:name=rsa")
                .with_signature_algorithm(SignatureAlgorithm::Sha256WithRsaPss)
                .with_protection_level(ProtectionLevel::Hsm),
        )
        .await
        .unwrap();

    let (_, params) = factory.client(TEST_ENDPOINT).created().remove(0);
    assert_eq!(params.kty, KeyType::RsaHsm);
    assert_eq!(params.key_size, Some(3072));
    let PublicKey::Rsa(key) = response.public_key else {
        panic!("expected an RSA key");
    };
    assert_eq!(key.bits(), 3072);
}

#[tokio::test]
async fn test_create_key_validates_before_contacting_service() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;

    let err = kms
        .create_key(
            &CreateKeyRequest::new("azurekms:name=rsa")
                .with_signature_algorithm(SignatureAlgorithm::Sha256WithRsa)
                .with_bits(1024),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedKeySize);

    let err = kms
        .create_key(
            &CreateKeyRequest::new("azurekms:name=ed").with_signature_algorithm(SignatureAlgorithm::PureEd25519),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);

    let err = kms
        .create_key(&CreateKeyRequest::new("azurekms:vault=my-vault"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedAddress);

    assert_eq!(factory.builds(), 0);
}

#[tokio::test]
async fn test_empty_names() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;

    let err = kms.get_public_key(&GetPublicKeyRequest::new("")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyName);
    assert_eq!(err.to_string(), "getPublicKeyRequest 'name' cannot be empty");

    let err = kms.create_key(&CreateKeyRequest::new("")).await.unwrap_err();
    assert_eq!(err.to_string(), "createKeyRequest 'name' cannot be empty");

    let err = kms.create_signer(&CreateSignerRequest::new("")).await.unwrap_err();
    assert_eq!(err.to_string(), "createSignerRequest 'signingKey' cannot be empty");

    assert_eq!(kms.validate_name("").unwrap_err().kind(), ErrorKind::EmptyName);
    assert_eq!(factory.builds(), 0);
}

#[tokio::test]
async fn test_validate_name() {
    let (kms, _) = connector("azurekms:").await;

    assert!(kms.validate_name("azurekms:name=k;vault=my-vault").is_ok());
    assert_eq!(
        kms.validate_name("azurekms:name=k").unwrap_err().kind(),
        ErrorKind::MissingVault
    );
    assert_eq!(
        kms.validate_name("awskms:name=k;vault=v").unwrap_err().kind(),
        ErrorKind::MalformedAddress
    );
}

#[tokio::test]
async fn test_get_public_key_versions() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;
    let vault = factory.client(TEST_ENDPOINT);
    vault.insert("k", key_bundle(ec_jwk(CurveName::P256, false), kid(TEST_ENDPOINT, "k", TEST_VERSION)));
    vault.insert("k", key_bundle(rsa_jwk(2048, false), kid(TEST_ENDPOINT, "k", "ffff")));

    let latest = kms.get_public_key(&GetPublicKeyRequest::new("azurekms:name=k")).await.unwrap();
    assert!(matches!(latest, PublicKey::Rsa(_)));

    let pinned = kms
        .get_public_key(&GetPublicKeyRequest::new(format!("azurekms:name=k?version={TEST_VERSION}")))
        .await
        .unwrap();
    assert!(matches!(pinned, PublicKey::Ec(_)));

    assert_eq!(
        vault.fetched(),
        vec![("k".to_string(), String::new()), ("k".to_string(), TEST_VERSION.to_string())]
    );
}

#[tokio::test]
async fn test_get_public_key_not_found() {
    let (kms, _) = connector("azurekms:vault=my-vault").await;

    let err = kms
        .get_public_key(&GetPublicKeyRequest::new("azurekms:name=missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.is_remote());
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_request_timeout() {
    init_test_tracing();
    let factory = Arc::new(MockClientFactory::new());
    factory.client(TEST_ENDPOINT).set_delay(Duration::from_millis(500));
    let kms = KeyVault::with_factories(
        KeyVaultOptions::default()
            .with_uri("azurekms:vault=my-vault")
            .with_request_timeout(Duration::from_millis(20)),
        &StaticCredentialFactory::new(),
        factory.clone(),
    )
    .await
    .unwrap();

    let err = kms.get_public_key(&GetPublicKeyRequest::new("azurekms:name=k")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    // A per-request deadline replaces the connector default.
    let err = kms
        .get_public_key(&GetPublicKeyRequest::new("azurekms:name=k").with_timeout(Duration::from_secs(5)))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_ec_signer() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;
    let key = kms.create_key(&CreateKeyRequest::new("azurekms:name=ec")).await.unwrap();

    let signer = kms.create_signer(&key.create_signer_request).await.unwrap();
    assert_eq!(signer.public_key(), &key.public_key);
    assert_eq!(signer.name(), key.name);

    let digest = [7u8; 32];
    let first = signer.sign(&digest, SignerOptions::new(HashAlgorithm::Sha256)).await.unwrap();
    let second = signer.sign(&digest, SignerOptions::new(HashAlgorithm::Sha256)).await.unwrap();
    assert_eq!(first, second);

    // SEQUENCE of two INTEGERs, r padded because its high bit is set.
    assert_eq!(first[0], 0x30);
    assert_eq!(usize::from(first[1]), first.len() - 2);
    assert_eq!(&first[2..5], &[0x02, 33, 0x00]);

    let calls = factory.client(TEST_ENDPOINT).signed();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].params.algorithm, SigningAlgorithm::ES256);
    assert_eq!(calls[0].params.digest, digest.to_vec());
    assert!(!calls[0].version.is_empty());
    assert_eq!(factory.builds(), 1);
}

#[tokio::test]
async fn test_p521_signer_uses_long_form_der() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;
    let key = kms
        .create_key(&CreateKeyRequest::new("azurekms:name=p521").with_signature_algorithm(SignatureAlgorithm::EcdsaWithSha512))
        .await
        .unwrap();
    let PublicKey::Ec(public_key) = &key.public_key else {
        panic!("expected an EC key");
    };
    assert_eq!(public_key.curve, CurveName::P521);

    let signer = kms.create_signer(&key.create_signer_request).await.unwrap();
    let der = signer.sign(&[9u8; 64], SignerOptions::new(HashAlgorithm::Sha512)).await.unwrap();

    // Two 66-byte INTEGERs need a two-byte SEQUENCE length.
    assert_eq!(&der[..6], &[0x30, 0x81, 136, 0x02, 66, 0x01]);
    assert_eq!(der.len(), 3 + 136);
    assert_eq!(factory.client(TEST_ENDPOINT).signed()[0].params.algorithm, SigningAlgorithm::ES512);
}

#[tokio::test]
async fn test_off_curve_key_is_rejected() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;
    let mut jwk = ec_jwk(CurveName::P256, false);
    jwk.y = jwk.x.clone();
    factory
        .client(TEST_ENDPOINT)
        .insert("bad-point", key_bundle(jwk, kid(TEST_ENDPOINT, "bad-point", TEST_VERSION)));

    let err = kms
        .get_public_key(&GetPublicKeyRequest::new("azurekms:name=bad-point"))
        .await
        .unwrap_err();
    assert!(matches!(err, KmsError::Remote { operation: "GetKey", .. }));

    let err = kms
        .create_signer(&CreateSignerRequest::new("azurekms:name=bad-point"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
}

#[tokio::test]
async fn test_rsa_signer() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;
    let vault = factory.client(TEST_ENDPOINT);
    vault.insert("rsa", key_bundle(rsa_jwk(2048, true), kid(TEST_ENDPOINT, "rsa", TEST_VERSION)));

    let signer = kms
        .create_signer(&CreateSignerRequest::new("azurekms:name=rsa"))
        .await
        .unwrap();

    let signature = signer
        .sign(&[1u8; 48], SignerOptions::pss(HashAlgorithm::Sha384))
        .await
        .unwrap();
    assert_eq!(signature.len(), 256);

    let err = signer
        .sign(&[1u8; 32], SignerOptions::new(HashAlgorithm::Sha512))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);

    let calls = vault.signed();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].params.algorithm, SigningAlgorithm::PS384);
    assert_eq!(calls[0].version, "");
}

#[tokio::test]
async fn test_signer_for_missing_key() {
    let (kms, _) = connector("azurekms:vault=my-vault").await;
    let err = kms
        .create_signer(&CreateSignerRequest::new("azurekms:name=missing"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_environment_selects_dns_suffix() {
    let (kms, factory) = connector("azurekms:vault=gov-vault;environment=AzureUSGovernment").await;
    kms.create_key(&CreateKeyRequest::new("azurekms:name=k")).await.unwrap();

    assert_eq!(factory.client("https://gov-vault.vault.usgovcloudapi.net").created().len(), 1);
    assert_eq!(kms.defaults().dns_suffix, "vault.usgovcloudapi.net");
}

#[tokio::test]
async fn test_credential_options_from_uri() {
    let credentials = StaticCredentialFactory::new();
    KeyVault::with_factories(
        KeyVaultOptions::default().with_uri(
            "azurekms:vault=my-vault;environment=china;client-id=cid;client-secret=secret;tenant-id=tid",
        ),
        &credentials,
        Arc::new(MockClientFactory::new()),
    )
    .await
    .unwrap();

    let requests = credentials.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].client_secret_parts().is_some());
    assert_eq!(requests[0].profile.authority_host, "https://login.chinacloudapi.cn/");
}

#[tokio::test]
async fn test_connector_errors() {
    let err = KeyVault::with_factories(
        KeyVaultOptions::default().with_uri("azurekms:environment=mars"),
        &StaticCredentialFactory::new(),
        Arc::new(MockClientFactory::new()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownEnvironment);

    let err = KeyVault::with_factories(
        KeyVaultOptions::default(),
        &StaticCredentialFactory::failing(KmsError::credential("no identity")),
        Arc::new(MockClientFactory::new()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Credential);
    assert!(err.to_string().contains("no identity"));

    // Other failures are reported as credential errors with their cause.
    let err = KeyVault::with_factories(
        KeyVaultOptions::default(),
        &StaticCredentialFactory::failing(KmsError::invalid_config("bad authority")),
        Arc::new(MockClientFactory::new()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Credential);
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_clones_share_clients() {
    let (kms, factory) = connector("azurekms:vault=my-vault").await;
    let clone = kms.clone();

    kms.create_key(&CreateKeyRequest::new("azurekms:name=a")).await.unwrap();
    clone.get_public_key(&GetPublicKeyRequest::new("azurekms:name=a")).await.unwrap();

    assert_eq!(factory.builds(), 1);
    assert!(kms.close().is_ok());
}

#[tokio::test]
async fn test_concurrent_first_use_builds_once() {
    init_test_tracing();
    let factory = Arc::new(MockClientFactory::new().with_delay(Duration::from_millis(50)));
    let kms = KeyVault::with_factories(
        KeyVaultOptions::default().with_uri("azurekms:vault=my-vault"),
        &StaticCredentialFactory::new(),
        factory.clone(),
    )
    .await
    .unwrap();

    let calls = (0..8).map(|i| {
        let kms = kms.clone();
        tokio::spawn(async move {
            kms.create_key(&CreateKeyRequest::new(format!("azurekms:name=key-{i}")))
                .await
        })
    });
    for result in futures::future::join_all(calls).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(factory.builds(), 1);
    assert_eq!(factory.client(TEST_ENDPOINT).created().len(), 8);
}
