//! Public JWK representation of signing keys. Only public components are
//! ever serialized; private material stays inside the key holder.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: &'static str,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: &'static str,
    /// RSA modulus, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// EC curve name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<&'static str>,
    /// EC point x coordinate, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC point y coordinate, base64url
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    pub fn rsa(kid: &str, alg: &str, public_key: &rsa::RsaPublicKey) -> Self {
        Self {
            kty: "RSA",
            kid: kid.to_string(),
            alg: alg.to_string(),
            key_use: "sig",
            n: Some(URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be())),
            e: Some(URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be())),
            crv: None,
            x: None,
            y: None,
        }
    }

    /// Build an EC JWK from the uncompressed SEC1 point (0x04 || x || y).
    pub fn ec(kid: &str, alg: &str, crv: &'static str, sec1_point: &[u8]) -> Option<Self> {
        if sec1_point.first() != Some(&0x04) || sec1_point.len() % 2 != 1 {
            return None;
        }
        let coordinate_len = (sec1_point.len() - 1) / 2;
        let x = &sec1_point[1..1 + coordinate_len];
        let y = &sec1_point[1 + coordinate_len..];
        Some(Self {
            kty: "EC",
            kid: kid.to_string(),
            alg: alg.to_string(),
            key_use: "sig",
            n: None,
            e: None,
            crv: Some(crv),
            x: Some(URL_SAFE_NO_PAD.encode(x)),
            y: Some(URL_SAFE_NO_PAD.encode(y)),
        })
    }
}
