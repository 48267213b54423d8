//! A library for driving OAuth 2.0 / OpenID Connect / CIBA / FAPI
//! conformance flows against an authorization server.
//!
//! This crate builds wire-correct requests, performs the cryptography
//! (JWS signing and JWKS verification, PKCE, client assertions, mTLS
//! certificate binding) and decodes responses across query, fragment and
//! JARM delivery. It asserts nothing: every response is handed back for the
//! test layer to judge.

pub mod authorization;
pub mod ciba;
pub mod client_auth;
pub mod config;
pub mod error;
pub mod interaction;
pub mod jose;
pub mod pkce;
pub mod tokens;
pub mod transport;
