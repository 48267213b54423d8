//! Per-method client authentication material for token-style endpoints.
//!
//! This is a pure builder: it produces exactly what was asked for, including
//! deliberately broken assertions. Rejecting bad material is the server's
//! job, and the negative variants exist so tests can prove that it does.

use serde::Deserialize;
use serde_json::json;

use crate::config::ClientProfile;
use crate::error::FlowError;
use crate::jose;
use crate::transport::{MtlsIdentity, RequestAuth};

pub const CLIENT_ASSERTION_TYPE_JWT_BEARER: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Client assertion lifetime advertised in `exp`.
const ASSERTION_LIFETIME_SECS: i64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    None,
    ClientSecretBasic,
    ClientSecretPost,
    ClientSecretJwt,
    PrivateKeyJwt,
    SelfSignedTlsClientAuth,
    TlsClientAuth,
}

/// Named negative constructors, so every broken-assertion scenario is a
/// reusable builder instead of ad hoc claim surgery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AssertionVariant {
    #[default]
    Valid,
    /// `{"alg":"none"}` with an empty signature.
    Unsigned,
    /// `iss` differs from the client id.
    WrongIssuer,
    /// `aud` points at a server that never issued this client.
    WrongAudience,
    /// `exp` in the past.
    Expired,
    /// `jti` omitted entirely.
    MissingJti,
}

/// Everything a flow needs to authenticate one request: an Authorization
/// header, extra form parameters, and/or an mTLS identity for the transport.
#[derive(Debug, Default)]
pub struct ClientAuthentication {
    pub auth: RequestAuth,
    pub body_params: Vec<(String, String)>,
    pub mtls: Option<MtlsIdentity>,
}

/// Build the authentication material for `profile` against an endpoint whose
/// assertion audience is `audience` (conventionally the issuer).
pub fn build_client_authentication(
    profile: &ClientProfile,
    audience: &str,
) -> Result<ClientAuthentication, FlowError> {
    build_client_authentication_with_variant(profile, audience, AssertionVariant::Valid)
}

pub fn build_client_authentication_with_variant(
    profile: &ClientProfile,
    audience: &str,
    variant: AssertionVariant,
) -> Result<ClientAuthentication, FlowError> {
    let client_id = profile.client_id.clone();
    match profile.auth_method {
        ClientAuthMethod::None => Ok(ClientAuthentication {
            body_params: vec![("client_id".into(), client_id)],
            ..Default::default()
        }),
        ClientAuthMethod::ClientSecretBasic => Ok(ClientAuthentication {
            auth: RequestAuth::Basic {
                username: client_id,
                secret: profile.client_secret.clone().unwrap_or_default(),
            },
            ..Default::default()
        }),
        ClientAuthMethod::ClientSecretPost => Ok(ClientAuthentication {
            body_params: vec![
                ("client_id".into(), client_id),
                (
                    "client_secret".into(),
                    profile.client_secret.clone().unwrap_or_default(),
                ),
            ],
            ..Default::default()
        }),
        ClientAuthMethod::ClientSecretJwt | ClientAuthMethod::PrivateKeyJwt => {
            let assertion = build_client_assertion(profile, audience, variant)?;
            Ok(ClientAuthentication {
                body_params: vec![
                    ("client_id".into(), client_id),
                    (
                        "client_assertion_type".into(),
                        CLIENT_ASSERTION_TYPE_JWT_BEARER.into(),
                    ),
                    ("client_assertion".into(), assertion),
                ],
                ..Default::default()
            })
        }
        ClientAuthMethod::SelfSignedTlsClientAuth | ClientAuthMethod::TlsClientAuth => {
            let mtls = profile.mtls_identity().ok_or_else(|| {
                FlowError::Config(crate::config::ConfigError::Validation(format!(
                    "client {} uses mutual TLS but has no cert/key files",
                    profile.client_id
                )))
            })?;
            Ok(ClientAuthentication {
                body_params: vec![("client_id".into(), client_id)],
                mtls: Some(mtls),
                ..Default::default()
            })
        }
    }
}

/// RFC 7523 client assertion. `client_secret_jwt` signs with the shared
/// secret (HMAC), `private_key_jwt` with the profile's private key.
pub fn build_client_assertion(
    profile: &ClientProfile,
    audience: &str,
    variant: AssertionVariant,
) -> Result<String, FlowError> {
    let issuer = match variant {
        AssertionVariant::WrongIssuer => format!("not-{}", profile.client_id),
        _ => profile.client_id.clone(),
    };
    let aud = match variant {
        AssertionVariant::WrongAudience => "https://wrong-audience.example.com".to_string(),
        _ => audience.to_string(),
    };
    let (exp, iat) = match variant {
        AssertionVariant::Expired => (jose::epoch_time(-600), jose::epoch_time(-900)),
        _ => (jose::epoch_time(ASSERTION_LIFETIME_SECS), jose::epoch_time(0)),
    };
    let mut claims = json!({
        "iss": issuer,
        "sub": profile.client_id,
        "aud": aud,
        "exp": exp,
        "iat": iat,
        "jti": jose::generate_jti(),
    });
    if variant == AssertionVariant::MissingJti
        && let Some(map) = claims.as_object_mut()
    {
        map.remove("jti");
    }

    if variant == AssertionVariant::Unsigned {
        return Ok(jose::sign_unsigned(&claims)?);
    }
    match profile.auth_method {
        ClientAuthMethod::PrivateKeyJwt => {
            let key = profile.signing_key()?;
            Ok(jose::sign_with_private_key(&claims, &key)?)
        }
        _ => {
            let secret = profile.client_secret.as_deref().unwrap_or_default();
            Ok(jose::sign(&claims, secret)?)
        }
    }
}
