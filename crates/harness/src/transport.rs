//! HTTP transport adapter shared by every flow.
//!
//! All requests are built per call: redirects are never followed (the
//! Location header *is* the payload for front-channel flows), and an mTLS
//! client identity is read from disk for exactly the calls that ask for it.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};
use x509_parser::prelude::FromDer;

use crate::error::TransportError;

pub const NETWORK_TIMEOUT_SECS: u64 = 30;

const HARNESS_USER_AGENT: &str = "rust-oidc-tester/0.1";

/// Authentication attached to a single request.
#[derive(Debug, Clone, Default)]
pub enum RequestAuth {
    #[default]
    None,
    Basic {
        username: String,
        secret: String,
    },
    Bearer(String),
}

impl RequestAuth {
    fn header_value(&self) -> Option<String> {
        match self {
            RequestAuth::None => None,
            RequestAuth::Basic { username, secret } => Some(format!(
                "Basic {}",
                BASE64_STANDARD.encode(format!("{username}:{secret}"))
            )),
            RequestAuth::Bearer(token) => Some(format!("Bearer {token}")),
        }
    }
}

/// Client certificate identity presented during the TLS handshake.
///
/// The PEM files are re-read on every call; a conformance run issues so few
/// requests that caching would only hide fixture edits mid-run.
#[derive(Debug, Clone)]
pub struct MtlsIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl MtlsIdentity {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    pub fn load(&self) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TransportError> {
        let certs = read_pem_certs(&self.cert_path)?;
        if certs.is_empty() {
            return Err(TransportError::Certificate(format!(
                "no certificates in {}",
                self.cert_path.display()
            )));
        }
        if let Some(cn) = certificate_common_name(&certs[0]) {
            debug!("Loaded client certificate for subject {cn}");
        }
        let key_file = File::open(&self.key_path)
            .map_err(|e| TransportError::Certificate(format!("{}: {e}", self.key_path.display())))?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .map_err(|e| TransportError::Certificate(format!("{}: {e}", self.key_path.display())))?
            .ok_or_else(|| {
                TransportError::Certificate(format!("no private key in {}", self.key_path.display()))
            })?;
        Ok((certs, key))
    }
}

fn read_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = File::open(path)
        .map_err(|e| TransportError::Certificate(format!("{}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Certificate(format!("{}: {e}", path.display())))
}

fn certificate_common_name(cert: &CertificateDer<'_>) -> Option<String> {
    let (_, parsed) = x509_parser::prelude::X509Certificate::from_der(cert.as_ref()).ok()?;
    parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
}

/// `x5t#S256` confirmation thumbprint of the first certificate in a PEM file:
/// unpadded base64url of the SHA-256 digest over the DER encoding.
pub fn cert_thumbprint(path: &Path) -> Result<String, TransportError> {
    let certs = read_pem_certs(path)?;
    let cert = certs.first().ok_or_else(|| {
        TransportError::Certificate(format!("no certificates in {}", path.display()))
    })?;
    let mut hasher = Sha256::new();
    hasher.update(cert.as_ref());
    Ok(BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

/// Response shape handed back for every request, success or protocol error.
/// 4xx/5xx are ordinary responses here; only transport failures are `Err`.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }
}

enum RequestBody {
    Empty,
    Form(String),
    Json(serde_json::Value),
}

/// The transport itself. `verify_tls` is off for rigs fronted by self-signed
/// certificates; everything else about a request is decided per call.
#[derive(Debug, Clone)]
pub struct Transport {
    verify_tls: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self { verify_tls: true }
    }

    /// Accept any server certificate. Conformance rigs routinely terminate
    /// TLS with self-signed material.
    pub fn insecure() -> Self {
        Self { verify_tls: false }
    }

    pub async fn get(
        &self,
        url: &str,
        auth: &RequestAuth,
        mtls: Option<&MtlsIdentity>,
    ) -> Result<HttpResponse, TransportError> {
        self.execute(Method::GET, url, RequestBody::Empty, auth, mtls)
            .await
    }

    pub async fn post_form(
        &self,
        url: &str,
        params: &[(String, String)],
        auth: &RequestAuth,
        mtls: Option<&MtlsIdentity>,
    ) -> Result<HttpResponse, TransportError> {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in params {
            serializer.append_pair(name, value);
        }
        self.execute(
            Method::POST,
            url,
            RequestBody::Form(serializer.finish()),
            auth,
            mtls,
        )
        .await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        auth: &RequestAuth,
        mtls: Option<&MtlsIdentity>,
    ) -> Result<HttpResponse, TransportError> {
        self.execute(Method::POST, url, RequestBody::Json(body.clone()), auth, mtls)
            .await
    }

    pub async fn put_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        auth: &RequestAuth,
        mtls: Option<&MtlsIdentity>,
    ) -> Result<HttpResponse, TransportError> {
        self.execute(Method::PUT, url, RequestBody::Json(body.clone()), auth, mtls)
            .await
    }

    pub async fn delete(
        &self,
        url: &str,
        auth: &RequestAuth,
        mtls: Option<&MtlsIdentity>,
    ) -> Result<HttpResponse, TransportError> {
        self.execute(Method::DELETE, url, RequestBody::Empty, auth, mtls)
            .await
    }

    #[tracing::instrument(name = "transport_execute", level = "debug", skip(self, body, auth, mtls), fields(url = %url))]
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
        auth: &RequestAuth,
        mtls: Option<&MtlsIdentity>,
    ) -> Result<HttpResponse, TransportError> {
        let parsed = url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        let uri: hyper::Uri = parsed
            .as_str()
            .parse()
            .map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(self.tls_config(mtls)?)
            .https_or_http()
            .enable_http1()
            .build();
        let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build(connector);

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_AGENT, HARNESS_USER_AGENT);
        if let Some(value) = auth.header_value()
            && let Ok(header) = HeaderValue::from_str(&value)
        {
            builder = builder.header(AUTHORIZATION, header);
        }
        let request = match body {
            RequestBody::Empty => builder.body(Full::default()),
            RequestBody::Form(encoded) => builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Full::new(Bytes::from(encoded))),
            RequestBody::Json(value) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(value.to_string()))),
        }
        .map_err(|e| TransportError::Network(e.to_string()))?;

        let timeout_duration = Duration::from_secs(NETWORK_TIMEOUT_SECS);
        let response = timeout(timeout_duration, client.request(request))
            .await
            .map_err(|_| TransportError::Timeout(timeout_duration))?
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?
            .to_bytes();
        if status.is_server_error() {
            warn!("Server answered {status} for {url}");
        }
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn tls_config(&self, mtls: Option<&MtlsIdentity>) -> Result<ClientConfig, TransportError> {
        ensure_crypto_provider();
        // The plain config is by far the common case, so it is built once.
        if self.verify_tls && mtls.is_none() {
            return Ok(shared_tls_config().as_ref().clone());
        }
        let config = if self.verify_tls {
            let builder = ClientConfig::builder().with_root_certificates(webpki_root_store());
            match mtls {
                Some(identity) => {
                    let (certs, key) = identity.load()?;
                    builder
                        .with_client_auth_cert(certs, key)
                        .map_err(|e| TransportError::Tls(e.to_string()))?
                }
                None => builder.with_no_client_auth(),
            }
        } else {
            let builder = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::default()));
            match mtls {
                Some(identity) => {
                    let (certs, key) = identity.load()?;
                    builder
                        .with_client_auth_cert(certs, key)
                        .map_err(|e| TransportError::Tls(e.to_string()))?
                }
                None => builder.with_no_client_auth(),
            }
        };
        Ok(config)
    }
}

static SHARED_TLS_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

fn shared_tls_config() -> Arc<ClientConfig> {
    SHARED_TLS_CONFIG
        .get_or_init(|| {
            let config = ClientConfig::builder()
                .with_root_certificates(webpki_root_store())
                .with_no_client_auth();
            Arc::new(config)
        })
        .clone()
}

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

fn ensure_crypto_provider() {
    static INSTALLED: OnceCell<()> = OnceCell::new();
    INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Certificate verifier that trusts whatever the server presents. Signature
/// checks on the handshake itself still run against the ring provider.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: rustls::crypto::CryptoProvider,
}

impl Default for AcceptAnyServerCert {
    fn default() -> Self {
        Self {
            provider: rustls::crypto::ring::default_provider(),
        }
    }
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
