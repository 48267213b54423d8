//! JWT engine: compact JWS signing, JWKS verification, detached hash claims.
//!
//! Verification failures are reported as `verify_result == false`, never as
//! errors, so negative conformance tests stay assertion-only. Claim-level
//! validation (exp, aud, nonce) is deliberately left to the caller.

use std::str::FromStr;

use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Value, json};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::debug;

use crate::error::JoseError;

/// PEM-encoded private key plus the algorithm and key id to advertise.
/// The algorithm is carried explicitly: a PKCS#8 blob alone does not say
/// which JWS algorithm the fixture intends.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub pem: String,
    pub alg: Algorithm,
    pub kid: Option<String>,
}

impl SigningKey {
    pub fn new(pem: impl Into<String>, alg: Algorithm, kid: Option<String>) -> Self {
        Self {
            pem: pem.into(),
            alg,
            kid,
        }
    }

    fn encoding_key(&self) -> Result<EncodingKey, JoseError> {
        match self.alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(self.pem.as_bytes())
                .map_err(|e| JoseError::Key(e.to_string())),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(self.pem.as_bytes())
                .map_err(|e| JoseError::Key(e.to_string())),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(self.pem.as_bytes())
                .map_err(|e| JoseError::Key(e.to_string())),
            other => Err(JoseError::UnsupportedAlgorithm(format!(
                "{other:?} is not a private-key algorithm"
            ))),
        }
    }
}

/// Compact JWS signed with the HMAC family; the key is the UTF-8 bytes of
/// the shared secret. HS256 unless told otherwise.
pub fn sign(claims: &Value, secret: &str) -> Result<String, JoseError> {
    sign_with_algorithm(claims, secret, Algorithm::HS256)
}

pub fn sign_with_algorithm(
    claims: &Value,
    secret: &str,
    alg: Algorithm,
) -> Result<String, JoseError> {
    if !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(JoseError::UnsupportedAlgorithm(format!(
            "{alg:?} is not an HMAC algorithm"
        )));
    }
    jsonwebtoken::encode(
        &Header::new(alg),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JoseError::Signing(e.to_string()))
}

/// Compact JWS signed with an RSA or EC private key.
pub fn sign_with_private_key(claims: &Value, key: &SigningKey) -> Result<String, JoseError> {
    let mut header = Header::new(key.alg);
    header.kid = key.kid.clone();
    jsonwebtoken::encode(&header, claims, &key.encoding_key()?)
        .map_err(|e| JoseError::Signing(e.to_string()))
}

/// `{"alg":"none"}` with an empty signature. Exists solely so tests can
/// prove a verifier rejects it.
pub fn sign_unsigned(claims: &Value) -> Result<String, JoseError> {
    let header = serde_json::to_vec(&json!({"alg": "none", "typ": "JWT"}))
        .map_err(|e| JoseError::Signing(e.to_string()))?;
    let payload = serde_json::to_vec(claims).map_err(|e| JoseError::Signing(e.to_string()))?;
    Ok(format!(
        "{}.{}.",
        BASE64_URL_SAFE_NO_PAD.encode(header),
        BASE64_URL_SAFE_NO_PAD.encode(payload)
    ))
}

#[derive(Debug, Clone)]
pub struct DecodedJwt {
    pub header: Value,
    pub payload: Value,
    pub verify_result: bool,
}

/// Decode a compact JWS and verify it against a JWKS. The key is selected by
/// `kid` when the header carries one, otherwise by matching algorithm (or the
/// set's sole key). Header and payload are always decoded so callers can
/// assert on claims of rejected tokens; only a structurally unreadable token
/// is an error.
pub fn verify_and_decode(jwt: &str, jwks: &JwkSet) -> Result<DecodedJwt, JoseError> {
    let mut parts = jwt.split('.');
    let (Some(header_b64), Some(payload_b64), Some(_signature)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(JoseError::Malformed("expected three dot-separated parts".into()));
    };
    if parts.next().is_some() {
        return Err(JoseError::Malformed("more than three parts".into()));
    }
    let header: Value = decode_json_segment(header_b64)?;
    let payload: Value = decode_json_segment(payload_b64)?;

    let verify_result = verify_signature(jwt, &header, jwks);
    Ok(DecodedJwt {
        header,
        payload,
        verify_result,
    })
}

fn decode_json_segment(segment: &str) -> Result<Value, JoseError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JoseError::Malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| JoseError::Malformed(e.to_string()))
}

fn verify_signature(jwt: &str, header: &Value, jwks: &JwkSet) -> bool {
    let Some(alg_name) = header.get("alg").and_then(Value::as_str) else {
        return false;
    };
    let Ok(alg) = Algorithm::from_str(alg_name) else {
        // Covers "none" and anything else the server should have rejected.
        debug!("No verifiable algorithm in header: {alg_name}");
        return false;
    };
    let Some(jwk) = select_jwk(header, alg_name, jwks) else {
        debug!("No JWKS entry matches kid/alg {alg_name}");
        return false;
    };
    let Ok(decoding_key) = DecodingKey::from_jwk(jwk) else {
        return false;
    };
    let mut validation = Validation::new(alg);
    validation.required_spec_claims = Default::default();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    jsonwebtoken::decode::<Value>(jwt, &decoding_key, &validation).is_ok()
}

fn select_jwk<'a>(header: &Value, alg_name: &str, jwks: &'a JwkSet) -> Option<&'a Jwk> {
    if let Some(kid) = header.get("kid").and_then(Value::as_str) {
        return jwks.find(kid);
    }
    let by_alg = jwks.keys.iter().find(|key| {
        key.common
            .key_algorithm
            .map(|a| a.to_string() == alg_name)
            .unwrap_or(false)
    });
    by_alg.or_else(|| match jwks.keys.as_slice() {
        [only] => Some(only),
        _ => None,
    })
}

/// JWKS wrapping a shared secret as an `oct` key, for verifying HMAC-signed
/// artifacts the same way asymmetric ones are verified.
pub fn jwks_from_secret(secret: &str, kid: &str) -> Result<JwkSet, JoseError> {
    let set = json!({
        "keys": [{
            "kty": "oct",
            "kid": kid,
            "alg": "HS256",
            "k": BASE64_URL_SAFE_NO_PAD.encode(secret.as_bytes()),
        }]
    });
    serde_json::from_value(set).map_err(|e| JoseError::Key(e.to_string()))
}

/// Detached hash claim value (at_hash / c_hash / s_hash): hash the ASCII
/// bytes with the digest implied by the JWT algorithm's suffix, keep the left
/// half, base64url-encode unpadded.
pub fn left_half_hash(value: &str, alg_name: &str) -> Result<String, JoseError> {
    let digest: Vec<u8> = if alg_name.ends_with("256") {
        Sha256::digest(value.as_bytes()).to_vec()
    } else if alg_name.ends_with("384") {
        Sha384::digest(value.as_bytes()).to_vec()
    } else if alg_name.ends_with("512") {
        Sha512::digest(value.as_bytes()).to_vec()
    } else {
        return Err(JoseError::UnsupportedAlgorithm(alg_name.to_string()));
    };
    Ok(BASE64_URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}

/// Unix epoch seconds, shifted by `offset_secs`. Explicit offsets are how
/// scenarios express expired/not-yet-valid claims.
pub fn epoch_time(offset_secs: i64) -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() + offset_secs
}

pub fn generate_jti() -> String {
    uuid::Uuid::new_v4().to_string()
}
