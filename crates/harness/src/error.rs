use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Timeout after {0:?} while waiting for the server")]
    Timeout(std::time::Duration),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Certificate material error: {0}")]
    Certificate(String),
    #[error("Failed to read response body: {0}")]
    Body(String),
}

#[derive(Debug, Error)]
pub enum JoseError {
    #[error("Malformed JWT: {0}")]
    Malformed(String),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Key material error: {0}")]
    Key(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Jose(#[from] JoseError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("Redirect response carried no Location header")]
    MissingLocation,
    #[error("No interaction id found in redirect: {0}")]
    MissingInteractionId(String),
    #[error("Malformed redirect target: {0}")]
    MalformedRedirect(String),
    #[error("Endpoint {0} is not configured")]
    MissingEndpoint(String),
    #[error("Unexpected response body: {0}")]
    UnexpectedBody(String),
}
