//! Signature algorithm to Key Vault key type mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{KmsError, KmsResult};

/// Default RSA key size when a request does not set one.
pub const DEFAULT_RSA_KEY_SIZE: u32 = 3072;

/// Where the private key material lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProtectionLevel {
    /// Let the key URI or the connector defaults decide
    #[default]
    Unspecified,
    /// Software-protected key
    Software,
    /// HSM-backed key
    Hsm,
}

/// Signature algorithms a caller can ask a key for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// No preference, ECDSA P-256 is used
    #[default]
    Unspecified,
    /// RSA PKCS#1 v1.5 with SHA-256
    Sha256WithRsa,
    /// RSA PKCS#1 v1.5 with SHA-384
    Sha384WithRsa,
    /// RSA PKCS#1 v1.5 with SHA-512
    Sha512WithRsa,
    /// RSA-PSS with SHA-256
    Sha256WithRsaPss,
    /// RSA-PSS with SHA-384
    Sha384WithRsaPss,
    /// RSA-PSS with SHA-512
    Sha512WithRsaPss,
    /// ECDSA with SHA-256
    EcdsaWithSha256,
    /// ECDSA with SHA-384
    EcdsaWithSha384,
    /// ECDSA with SHA-512
    EcdsaWithSha512,
    /// Ed25519, not available in Key Vault
    PureEd25519,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "unspecified",
            Self::Sha256WithRsa => "SHA256-RSA",
            Self::Sha384WithRsa => "SHA384-RSA",
            Self::Sha512WithRsa => "SHA512-RSA",
            Self::Sha256WithRsaPss => "SHA256-RSAPSS",
            Self::Sha384WithRsaPss => "SHA384-RSAPSS",
            Self::Sha512WithRsaPss => "SHA512-RSAPSS",
            Self::EcdsaWithSha256 => "ECDSA-SHA256",
            Self::EcdsaWithSha384 => "ECDSA-SHA384",
            Self::EcdsaWithSha512 => "ECDSA-SHA512",
            Self::PureEd25519 => "Ed25519",
        })
    }
}

/// Key Vault JSON web key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Software elliptic curve key
    #[serde(rename = "EC")]
    Ec,
    /// HSM elliptic curve key
    #[serde(rename = "EC-HSM")]
    EcHsm,
    /// Software RSA key
    #[serde(rename = "RSA")]
    Rsa,
    /// HSM RSA key
    #[serde(rename = "RSA-HSM")]
    RsaHsm,
}

impl KeyType {
    /// Returns the variant matching `protection_level`.
    ///
    /// Only `Hsm` selects the HSM variant; HSM variants are kept as they are.
    #[must_use]
    pub const fn with_protection(self, protection_level: ProtectionLevel) -> Self {
        match (self, protection_level) {
            (Self::Ec, ProtectionLevel::Hsm) => Self::EcHsm,
            (Self::Rsa, ProtectionLevel::Hsm) => Self::RsaHsm,
            (kty, _) => kty,
        }
    }

    /// Check if this is an RSA key type.
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(self, Self::Rsa | Self::RsaHsm)
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ec => "EC",
            Self::EcHsm => "EC-HSM",
            Self::Rsa => "RSA",
            Self::RsaHsm => "RSA-HSM",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key Vault elliptic curve names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveName {
    /// NIST P-256
    #[serde(rename = "P-256")]
    P256,
    /// NIST P-384
    #[serde(rename = "P-384")]
    P384,
    /// NIST P-521
    #[serde(rename = "P-521")]
    P521,
}

impl CurveName {
    /// Size in bytes of one coordinate, and of each half of a raw signature.
    #[must_use]
    pub const fn coordinate_size(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "P-521" => Some(Self::P521),
            _ => None,
        }
    }
}

impl fmt::Display for CurveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key type, curve and size for a create-key call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCreationParams {
    /// Key type, HSM variant included
    pub key_type: KeyType,
    /// Curve, for elliptic curve keys
    pub curve: Option<CurveName>,
    /// Size in bits, for RSA keys
    pub key_size: Option<u32>,
}

const fn lookup(algorithm: SignatureAlgorithm) -> Option<(KeyType, Option<CurveName>)> {
    match algorithm {
        SignatureAlgorithm::Unspecified | SignatureAlgorithm::EcdsaWithSha256 => {
            Some((KeyType::Ec, Some(CurveName::P256)))
        }
        SignatureAlgorithm::EcdsaWithSha384 => Some((KeyType::Ec, Some(CurveName::P384))),
        SignatureAlgorithm::EcdsaWithSha512 => Some((KeyType::Ec, Some(CurveName::P521))),
        SignatureAlgorithm::Sha256WithRsa
        | SignatureAlgorithm::Sha384WithRsa
        | SignatureAlgorithm::Sha512WithRsa
        | SignatureAlgorithm::Sha256WithRsaPss
        | SignatureAlgorithm::Sha384WithRsaPss
        | SignatureAlgorithm::Sha512WithRsaPss => Some((KeyType::Rsa, None)),
        SignatureAlgorithm::PureEd25519 => None,
    }
}

/// Maps a signature algorithm to the parameters of a create-key call.
///
/// `bits` only applies to RSA keys, where 0 selects
/// [`DEFAULT_RSA_KEY_SIZE`].
///
/// # Errors
///
/// Returns `KmsError::UnsupportedAlgorithm` for algorithms Key Vault has no
/// key type for, and `KmsError::UnsupportedKeySize` for RSA sizes other than
/// 2048, 3072 and 4096.
pub fn map(
    algorithm: SignatureAlgorithm,
    protection_level: ProtectionLevel,
    bits: u32,
) -> KmsResult<KeyCreationParams> {
    let (kty, curve) = lookup(algorithm).ok_or_else(|| KmsError::unsupported_algorithm(algorithm))?;

    let key_size = if kty.is_rsa() {
        match bits {
            0 => Some(DEFAULT_RSA_KEY_SIZE),
            2048 | 3072 | 4096 => Some(bits),
            _ => return Err(KmsError::unsupported_key_size(bits)),
        }
    } else {
        None
    };

    Ok(KeyCreationParams {
        key_type: kty.with_protection(protection_level),
        curve,
        key_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_ec_curves_follow_hash_strength() {
        let cases = [
            (SignatureAlgorithm::Unspecified, CurveName::P256),
            (SignatureAlgorithm::EcdsaWithSha256, CurveName::P256),
            (SignatureAlgorithm::EcdsaWithSha384, CurveName::P384),
            (SignatureAlgorithm::EcdsaWithSha512, CurveName::P521),
        ];
        for (algorithm, curve) in cases {
            let params = map(algorithm, ProtectionLevel::Unspecified, 0).unwrap();
            assert_eq!(params.key_type, KeyType::Ec);
            assert_eq!(params.curve, Some(curve));
            assert_eq!(params.key_size, None);
        }
    }

    #[test]
    fn test_ec_ignores_bits() {
        let params = map(SignatureAlgorithm::EcdsaWithSha384, ProtectionLevel::Software, 1234).unwrap();
        assert_eq!(params.curve, Some(CurveName::P384));
        assert_eq!(params.key_size, None);
    }

    #[test]
    fn test_hsm_variants() {
        let params = map(SignatureAlgorithm::EcdsaWithSha256, ProtectionLevel::Hsm, 0).unwrap();
        assert_eq!(params.key_type, KeyType::EcHsm);

        let params = map(SignatureAlgorithm::Sha256WithRsaPss, ProtectionLevel::Hsm, 2048).unwrap();
        assert_eq!(params.key_type, KeyType::RsaHsm);

        let params = map(SignatureAlgorithm::Sha256WithRsa, ProtectionLevel::Software, 2048).unwrap();
        assert_eq!(params.key_type, KeyType::Rsa);
    }

    #[test]
    fn test_rsa_sizes() {
        let default = map(SignatureAlgorithm::Sha256WithRsa, ProtectionLevel::Software, 0).unwrap();
        let explicit = map(SignatureAlgorithm::Sha256WithRsa, ProtectionLevel::Software, 3072).unwrap();
        assert_eq!(default, explicit);
        assert_eq!(default.key_size, Some(3072));

        for bits in [2048, 4096] {
            let params = map(SignatureAlgorithm::Sha512WithRsa, ProtectionLevel::Software, bits).unwrap();
            assert_eq!(params.key_size, Some(bits));
            assert_eq!(params.curve, None);
        }
    }

    #[test]
    fn test_rsa_unsupported_size() {
        let err = map(SignatureAlgorithm::Sha256WithRsa, ProtectionLevel::Software, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedKeySize);
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let err = map(SignatureAlgorithm::PureEd25519, ProtectionLevel::Hsm, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
        assert!(err.to_string().contains("Ed25519"));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&KeyType::RsaHsm).unwrap(), "\"RSA-HSM\"");
        assert_eq!(serde_json::to_string(&CurveName::P521).unwrap(), "\"P-521\"");
        assert_eq!(CurveName::from_name("P-384"), Some(CurveName::P384));
        assert_eq!(CurveName::from_name("P-256K"), None);
    }
}
