#![allow(dead_code)]

use std::path::PathBuf;

use rust_oidc_tester::client_auth::ClientAuthMethod;
use rust_oidc_tester::config::{ClientProfile, ServerEndpoints};

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("fixture should be readable")
}

/// Endpoint map shaped like the original rig's tenant layout, rooted at a
/// stub server base URL.
pub fn endpoints(base: &str) -> ServerEndpoints {
    ServerEndpoints {
        issuer: format!("{base}/123"),
        authorization_endpoint: format!("{base}/123/authorizations"),
        authorization_id_endpoint: format!("{base}/123/authorizations/{{id}}"),
        authorize_endpoint: format!("{base}/123/authorizations/{{id}}/authorize"),
        deny_endpoint: format!("{base}/123/authorizations/{{id}}/deny"),
        token_endpoint: format!("{base}/123/tokens"),
        token_introspection_endpoint: format!("{base}/123/tokens/introspection"),
        token_revocation_endpoint: format!("{base}/123/tokens/revocation"),
        userinfo_endpoint: format!("{base}/123/userinfo"),
        jwks_endpoint: format!("{base}/123/jwks"),
        backchannel_authentication_endpoint: format!("{base}/123/backchannel/authentications"),
        backchannel_automated_complete_endpoint: Some(format!(
            "{base}/123/backchannel/authentications/automated-complete"
        )),
        authentication_device_endpoint: Some(format!(
            "{base}/123/authentication-devices/{{device_id}}/authentications"
        )),
        authentication_device_interaction_endpoint: Some(format!(
            "{base}/123/authentications/{{flow_type}}/{{id}}/{{interaction_type}}"
        )),
    }
}

pub fn client_secret_post_client() -> ClientProfile {
    ClientProfile {
        client_id: "clientSecretPost".into(),
        client_secret: Some("clientSecretPostPassword1234567890".into()),
        redirect_uri: "https://client.example.com/callback".into(),
        scope: "account transfers".into(),
        auth_method: ClientAuthMethod::ClientSecretPost,
        signing_key: None,
        mtls_cert_file: None,
        mtls_key_file: None,
        id_token_alg: Some("ES256".into()),
    }
}

pub fn client_secret_basic_client() -> ClientProfile {
    ClientProfile {
        client_id: "s6BhdRkqt3".into(),
        client_secret: Some("cf136dc3c1fc93f31185e5885805d".into()),
        redirect_uri: "https://client.example.com/callback".into(),
        scope: "account transfers".into(),
        auth_method: ClientAuthMethod::ClientSecretBasic,
        signing_key: None,
        mtls_cert_file: None,
        mtls_key_file: None,
        id_token_alg: Some("ES256".into()),
    }
}

pub fn client_secret_jwt_client() -> ClientProfile {
    ClientProfile {
        client_id: "clientSecretJwt".into(),
        client_secret: Some("clientSecretJwtSecret1234567890".into()),
        redirect_uri: "https://client.example.com/callback".into(),
        scope: "account transfers".into(),
        auth_method: ClientAuthMethod::ClientSecretJwt,
        signing_key: None,
        mtls_cert_file: None,
        mtls_key_file: None,
        id_token_alg: Some("ES256".into()),
    }
}
