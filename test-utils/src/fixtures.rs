//! Test fixtures with sample keys.
//!
//! RSA moduli are fixed byte patterns of the right size. EC points are the
//! public keys of fixed scalars, so they pass on-curve checks.

use azure_kms::algorithm::{CurveName, KeyType};
use azure_kms::client::{CreateKeyParameters, KeyAttributes, KeyBundle};
use azure_kms::keys::JsonWebKey;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::elliptic_curve::sec1::ToEncodedPoint;

/// Vault used across tests.
pub const TEST_VAULT: &str = "my-vault";

/// Endpoint of [`TEST_VAULT`] in the public cloud.
pub const TEST_ENDPOINT: &str = "https://my-vault.vault.azure.net";

/// Key version used by the fixtures.
pub const TEST_VERSION: &str = "0123456789abcdef0123456789abcdef";

fn b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Key identifier of a key version.
#[must_use]
pub fn kid(endpoint: &str, name: &str, version: &str) -> String {
    format!("{endpoint}/keys/{name}/{version}")
}

/// RSA JSON web key with a modulus of `bits` bits.
#[must_use]
pub fn rsa_jwk(bits: u32, hsm: bool) -> JsonWebKey {
    let mut modulus = vec![0xA5; (bits / 8) as usize];
    if let Some(first) = modulus.first_mut() {
        *first = 0xC3;
    }
    JsonWebKey {
        kty: if hsm { "RSA-HSM" } else { "RSA" }.to_string(),
        key_ops: vec!["sign".to_string(), "verify".to_string()],
        n: Some(b64(&modulus)),
        e: Some(b64(&[0x01, 0x00, 0x01])),
        ..JsonWebKey::default()
    }
}

/// SEC1 uncompressed public key of a fixed scalar on `curve`.
#[must_use]
pub fn ec_point(curve: CurveName) -> Vec<u8> {
    let mut scalar = vec![0x5A; curve.coordinate_size()];
    if curve == CurveName::P521 {
        // 0x5A.. is above the P-521 order.
        scalar[0] = 0x00;
    }
    let point = match curve {
        CurveName::P256 => p256::SecretKey::from_slice(&scalar)
            .map(|key| key.public_key().to_encoded_point(false).as_bytes().to_vec()),
        CurveName::P384 => p384::SecretKey::from_slice(&scalar)
            .map(|key| key.public_key().to_encoded_point(false).as_bytes().to_vec()),
        CurveName::P521 => p521::SecretKey::from_slice(&scalar)
            .map(|key| key.public_key().to_encoded_point(false).as_bytes().to_vec()),
    };
    point.unwrap_or_default()
}

/// Elliptic curve JSON web key on `curve`.
#[must_use]
pub fn ec_jwk(curve: CurveName, hsm: bool) -> JsonWebKey {
    let point = ec_point(curve);
    let coordinates = point.get(1..).unwrap_or_default();
    let (x, y) = coordinates.split_at(coordinates.len() / 2);
    JsonWebKey {
        kty: if hsm { "EC-HSM" } else { "EC" }.to_string(),
        key_ops: vec!["sign".to_string(), "verify".to_string()],
        crv: Some(curve.as_str().to_string()),
        x: Some(b64(x)),
        y: Some(b64(y)),
        ..JsonWebKey::default()
    }
}

/// Key bundle wrapping `jwk` with identifier `kid`.
#[must_use]
pub fn key_bundle(mut jwk: JsonWebKey, kid: impl Into<String>) -> KeyBundle {
    jwk.kid = Some(kid.into());
    KeyBundle {
        key: jwk,
        attributes: Some(KeyAttributes {
            enabled: Some(true),
            created: Some(1_700_000_000),
            updated: Some(1_700_000_000),
            recovery_level: Some("Recoverable+Purgeable".to_string()),
            ..KeyAttributes::default()
        }),
    }
}

/// Key the service would return for a create-key call.
#[must_use]
pub fn jwk_for(params: &CreateKeyParameters) -> JsonWebKey {
    match params.kty {
        KeyType::Rsa | KeyType::RsaHsm => rsa_jwk(params.key_size.unwrap_or(2048), params.kty == KeyType::RsaHsm),
        KeyType::Ec | KeyType::EcHsm => ec_jwk(params.crv.unwrap_or(CurveName::P256), params.kty == KeyType::EcHsm),
    }
}

/// Key Vault error body.
#[must_use]
pub fn error_body(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}

/// Microsoft Entra ID token endpoint body.
#[must_use]
pub fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "token_type": "Bearer",
        "expires_in": expires_in,
        "ext_expires_in": expires_in,
        "access_token": token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_kms::keys::PublicKey;

    #[test]
    fn test_rsa_fixture_size() {
        let PublicKey::Rsa(key) = rsa_jwk(3072, false).to_public_key("GetKey").unwrap() else {
            panic!("expected an RSA key");
        };
        assert_eq!(key.bits(), 3072);
    }

    #[test]
    fn test_ec_fixtures_are_on_curve() {
        for curve in [CurveName::P256, CurveName::P384, CurveName::P521] {
            let PublicKey::Ec(key) = ec_jwk(curve, true).to_public_key("GetKey").unwrap() else {
                panic!("expected an EC key");
            };
            assert_eq!(key.curve, curve);
            assert_eq!(key.x.len(), curve.coordinate_size());
            assert_eq!(key.to_uncompressed_point(), ec_point(curve));
        }
    }

    #[test]
    fn test_bundle_version() {
        let bundle = key_bundle(ec_jwk(CurveName::P256, false), kid(TEST_ENDPOINT, "k", TEST_VERSION));
        assert_eq!(bundle.key.key_version().as_deref(), Some(TEST_VERSION));
    }
}
