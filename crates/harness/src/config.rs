//! Test-fixture configuration: the server under test and its client profiles.
//!
//! Everything here is immutable once loaded; flows borrow it read-only.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::Deserialize;
use thiserror::Error;

use crate::client_auth::ClientAuthMethod;
use crate::jose::SigningKey;
use crate::transport::MtlsIdentity;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error("Key material error: {0}")]
    Key(String),
}

/// Endpoints of the authorization server under test. Templated entries carry
/// `{id}`, `{device_id}`, `{flow_type}` or `{interaction_type}` placeholders
/// that are substituted per call, mirroring how the fixture files of the
/// original rig describe them.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerEndpoints {
    pub issuer: String,
    pub authorization_endpoint: String,
    /// Base for interaction calls, ends in `{id}`.
    pub authorization_id_endpoint: String,
    pub authorize_endpoint: String,
    pub deny_endpoint: String,
    pub token_endpoint: String,
    pub token_introspection_endpoint: String,
    pub token_revocation_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_endpoint: String,
    pub backchannel_authentication_endpoint: String,
    #[serde(default)]
    pub backchannel_automated_complete_endpoint: Option<String>,
    /// Device transaction listing, contains `{device_id}`.
    #[serde(default)]
    pub authentication_device_endpoint: Option<String>,
    /// Device interaction, contains `{flow_type}`, `{id}`, `{interaction_type}`.
    #[serde(default)]
    pub authentication_device_interaction_endpoint: Option<String>,
}

impl ServerEndpoints {
    pub fn interaction_url(&self, id: &str, path: &str) -> String {
        let base = self.authorization_id_endpoint.replace("{id}", id);
        format!("{}/{}", base.trim_end_matches('/'), path)
    }

    pub fn authorize_url(&self, id: &str) -> String {
        self.authorize_endpoint.replace("{id}", id)
    }

    pub fn deny_url(&self, id: &str) -> String {
        self.deny_endpoint.replace("{id}", id)
    }

    pub fn device_transactions_url(&self, device_id: &str) -> Option<String> {
        self.authentication_device_endpoint
            .as_ref()
            .map(|t| t.replace("{device_id}", device_id))
    }

    pub fn device_interaction_url(
        &self,
        flow_type: &str,
        id: &str,
        interaction_type: &str,
    ) -> Option<String> {
        self.authentication_device_interaction_endpoint.as_ref().map(|t| {
            t.replace("{flow_type}", flow_type)
                .replace("{id}", id)
                .replace("{interaction_type}", interaction_type)
        })
    }
}

/// Private-key fixture: a PEM file plus the JWS algorithm and key id to
/// advertise when signing with it.
#[derive(Clone, Debug, Deserialize)]
pub struct SigningKeyConfig {
    pub pem_file: PathBuf,
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

impl SigningKeyConfig {
    pub fn load(&self) -> Result<SigningKey, ConfigError> {
        let pem = std::fs::read_to_string(&self.pem_file)
            .map_err(|e| ConfigError::Key(format!("{}: {e}", self.pem_file.display())))?;
        let alg = Algorithm::from_str(&self.alg)
            .map_err(|_| ConfigError::Key(format!("unknown algorithm {}", self.alg)))?;
        Ok(SigningKey::new(pem, alg, self.kid.clone()))
    }
}

/// One registered client of the server under test.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientProfile {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub auth_method: ClientAuthMethod,
    #[serde(default)]
    pub signing_key: Option<SigningKeyConfig>,
    #[serde(default)]
    pub mtls_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub mtls_key_file: Option<PathBuf>,
    #[serde(default)]
    pub id_token_alg: Option<String>,
}

impl ClientProfile {
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        self.signing_key
            .as_ref()
            .ok_or_else(|| {
                ConfigError::Validation(format!("client {} has no signing key", self.client_id))
            })?
            .load()
    }

    pub fn mtls_identity(&self) -> Option<MtlsIdentity> {
        match (&self.mtls_cert_file, &self.mtls_key_file) {
            (Some(cert), Some(key)) => Some(MtlsIdentity::new(cert.clone(), key.clone())),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct HarnessConfig {
    pub server: ServerEndpoints,
    pub clients: BTreeMap<String, ClientProfile>,
    /// Off for rigs that terminate TLS with self-signed certificates.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

/// Load harness configuration from `config.yaml` + environment overrides.
///
/// Any environment variable whose name matches the key path separated by
/// double underscores (e.g. `SERVER__TOKEN_ENDPOINT`) overrides the file
/// value.
pub fn load_config() -> Result<HarnessConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;
    let harness: HarnessConfig = cfg.try_deserialize()?;
    validate(&harness)?;
    Ok(harness)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> HarnessConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

fn validate(config: &HarnessConfig) -> Result<(), ConfigError> {
    if config.server.issuer.is_empty() {
        return Err(ConfigError::Validation("server.issuer must not be empty".into()));
    }
    for (name, client) in &config.clients {
        let needs_secret = matches!(
            client.auth_method,
            ClientAuthMethod::ClientSecretBasic
                | ClientAuthMethod::ClientSecretPost
                | ClientAuthMethod::ClientSecretJwt
        );
        if needs_secret && client.client_secret.is_none() {
            return Err(ConfigError::Validation(format!(
                "client {name} uses {:?} but has no client_secret",
                client.auth_method
            )));
        }
        if client.auth_method == ClientAuthMethod::PrivateKeyJwt && client.signing_key.is_none() {
            return Err(ConfigError::Validation(format!(
                "client {name} uses private_key_jwt but has no signing_key"
            )));
        }
        let needs_cert = matches!(
            client.auth_method,
            ClientAuthMethod::SelfSignedTlsClientAuth | ClientAuthMethod::TlsClientAuth
        );
        if needs_cert && client.mtls_identity().is_none() {
            return Err(ConfigError::Validation(format!(
                "client {name} uses mutual TLS but has no cert/key files"
            )));
        }
        if client.redirect_uri.is_empty() {
            return Err(ConfigError::Validation(format!(
                "client {name} has an empty redirect_uri"
            )));
        }
    }
    Ok(())
}
