//! Public keys and their JSON web key representation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::algorithm::CurveName;
use crate::error::{KmsError, KmsResult};

/// Public half of a Key Vault key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// RSA public key
    Rsa(RsaPublicKey),
    /// Elliptic curve public key
    Ec(EcPublicKey),
}

/// RSA modulus and exponent, big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    /// Modulus `n`
    pub modulus: Vec<u8>,
    /// Public exponent `e`
    pub exponent: Vec<u8>,
}

impl RsaPublicKey {
    /// Size of the modulus in bits.
    #[must_use]
    pub fn bits(&self) -> usize {
        let modulus = strip_leading_zeros(&self.modulus);
        modulus
            .first()
            .map_or(0, |b| modulus.len() * 8 - b.leading_zeros() as usize)
    }
}

/// Elliptic curve point, coordinates big-endian and padded to the curve size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPublicKey {
    /// Curve
    pub curve: CurveName,
    /// `x` coordinate
    pub x: Vec<u8>,
    /// `y` coordinate
    pub y: Vec<u8>,
}

impl EcPublicKey {
    /// SEC1 uncompressed encoding, `0x04 || x || y`.
    #[must_use]
    pub fn to_uncompressed_point(&self) -> Vec<u8> {
        let mut point = Vec::with_capacity(1 + self.x.len() + self.y.len());
        point.push(0x04);
        point.extend_from_slice(&self.x);
        point.extend_from_slice(&self.y);
        point
    }
}

/// JSON web key as returned by Key Vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key identifier, `https://{vault}/keys/{name}/{version}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Key type (EC, EC-HSM, RSA, RSA-HSM, oct)
    pub kty: String,
    /// Allowed operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC curve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC x coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC y coordinate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl JsonWebKey {
    /// Returns the version segment of `kid`, if it has one.
    #[must_use]
    pub fn key_version(&self) -> Option<String> {
        let kid = Url::parse(self.kid.as_deref()?).ok()?;
        let segments: Vec<&str> = kid.path_segments()?.collect();
        match segments.as_slice() {
            ["keys", _, version] if !version.is_empty() => Some((*version).to_owned()),
            _ => None,
        }
    }

    /// Converts the key returned by `operation` into a [`PublicKey`].
    ///
    /// # Errors
    ///
    /// Returns `KmsError::Remote` for `operation` if the key type is not RSA
    /// or EC, if the key material is missing or not valid base64url, or if an
    /// EC point is not on its curve.
    pub fn to_public_key(&self, operation: &'static str) -> KmsResult<PublicKey> {
        match self.kty.as_str() {
            "RSA" | "RSA-HSM" => Ok(PublicKey::Rsa(RsaPublicKey {
                modulus: self.decode_field(operation, "n", self.n.as_deref())?,
                exponent: self.decode_field(operation, "e", self.e.as_deref())?,
            })),
            "EC" | "EC-HSM" => {
                let crv = self
                    .crv
                    .as_deref()
                    .ok_or_else(|| KmsError::remote(operation, "EC key without curve"))?;
                let curve = CurveName::from_name(crv)
                    .ok_or_else(|| KmsError::remote(operation, format!("unsupported curve '{crv}'")))?;
                let key = EcPublicKey {
                    curve,
                    x: pad_coordinate(operation, curve, &self.decode_field(operation, "x", self.x.as_deref())?)?,
                    y: pad_coordinate(operation, curve, &self.decode_field(operation, "y", self.y.as_deref())?)?,
                };
                check_on_curve(operation, &key)?;
                Ok(PublicKey::Ec(key))
            }
            kty => Err(KmsError::remote(
                operation,
                format!("unsupported key type '{kty}'"),
            )),
        }
    }

    fn decode_field(&self, operation: &'static str, field: &str, value: Option<&str>) -> KmsResult<Vec<u8>> {
        let value = value.ok_or_else(|| {
            KmsError::remote(operation, format!("{} key without '{field}'", self.kty))
        })?;
        URL_SAFE_NO_PAD
            .decode(value.trim_end_matches('='))
            .map_err(|e| KmsError::remote(operation, format!("invalid '{field}' in {} key: {e}", self.kty)))
    }
}

/// Rejects points that are not on the curve, including the identity.
fn check_on_curve(operation: &'static str, key: &EcPublicKey) -> KmsResult<()> {
    let point = key.to_uncompressed_point();
    let result = match key.curve {
        CurveName::P256 => p256::PublicKey::from_sec1_bytes(&point).map(drop),
        CurveName::P384 => p384::PublicKey::from_sec1_bytes(&point).map(drop),
        CurveName::P521 => p521::PublicKey::from_sec1_bytes(&point).map(drop),
    };
    result.map_err(|e| KmsError::remote(operation, format!("{} point is not on the curve: {e}", key.curve)))
}

fn pad_coordinate(operation: &'static str, curve: CurveName, coordinate: &[u8]) -> KmsResult<Vec<u8>> {
    let size = curve.coordinate_size();
    let coordinate = strip_leading_zeros(coordinate);
    if coordinate.len() > size {
        return Err(KmsError::remote(
            operation,
            format!("{curve} coordinate of {} bytes", coordinate.len()),
        ));
    }
    let mut padded = vec![0; size - coordinate.len()];
    padded.extend_from_slice(coordinate);
    Ok(padded)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
