//! Token, introspection and revocation clients.
//!
//! Each call builds an RFC-shaped form body, attaches whatever the client
//! authentication builder produced, and hands the response back verbatim.
//! Success criteria live with the caller; nothing retries.

use std::collections::BTreeMap;

use jsonwebtoken::jwk::JwkSet;

use crate::client_auth::ClientAuthentication;
use crate::config::ServerEndpoints;
use crate::error::FlowError;
use crate::transport::{HttpResponse, RequestAuth, Transport};

pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
pub const GRANT_TYPE_PASSWORD: &str = "password";
pub const GRANT_TYPE_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_TYPE_CIBA: &str = "urn:openid:params:grant-type:ciba";

/// Sparse token request; absent fields stay off the wire.
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub scope: Option<String>,
    pub auth_req_id: Option<String>,
    pub custom_params: BTreeMap<String, String>,
}

impl TokenRequest {
    pub fn authorization_code(code: &str, redirect_uri: &str) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_AUTHORIZATION_CODE.into()),
            code: Some(code.into()),
            redirect_uri: Some(redirect_uri.into()),
            ..Default::default()
        }
    }

    pub fn refresh(refresh_token: &str) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_REFRESH_TOKEN.into()),
            refresh_token: Some(refresh_token.into()),
            ..Default::default()
        }
    }

    pub fn password(username: &str, password: &str, scope: &str) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_PASSWORD.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            scope: Some(scope.into()),
            ..Default::default()
        }
    }

    pub fn client_credentials(scope: &str) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_CLIENT_CREDENTIALS.into()),
            scope: Some(scope.into()),
            ..Default::default()
        }
    }

    pub fn ciba(auth_req_id: &str) -> Self {
        Self {
            grant_type: Some(GRANT_TYPE_CIBA.into()),
            auth_req_id: Some(auth_req_id.into()),
            ..Default::default()
        }
    }

    pub fn with_code_verifier(mut self, verifier: &str) -> Self {
        self.code_verifier = Some(verifier.into());
        self
    }

    pub fn to_form_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();
        let mut push = |name: &str, value: Option<&String>| {
            if let Some(value) = value {
                params.push((name.to_string(), value.clone()));
            }
        };
        push("grant_type", self.grant_type.as_ref());
        push("code", self.code.as_ref());
        push("redirect_uri", self.redirect_uri.as_ref());
        push("code_verifier", self.code_verifier.as_ref());
        push("refresh_token", self.refresh_token.as_ref());
        push("username", self.username.as_ref());
        push("password", self.password.as_ref());
        push("scope", self.scope.as_ref());
        push("auth_req_id", self.auth_req_id.as_ref());
        for (name, value) in &self.custom_params {
            params.push((name.clone(), value.clone()));
        }
        params
    }
}

pub struct TokenClient<'a> {
    transport: &'a Transport,
    endpoints: &'a ServerEndpoints,
}

impl<'a> TokenClient<'a> {
    pub fn new(transport: &'a Transport, endpoints: &'a ServerEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    #[tracing::instrument(name = "request_token", skip(self, request, auth))]
    pub async fn request_token(
        &self,
        request: &TokenRequest,
        auth: &ClientAuthentication,
    ) -> Result<HttpResponse, FlowError> {
        let mut params = request.to_form_params();
        params.extend(auth.body_params.iter().cloned());
        Ok(self
            .transport
            .post_form(
                &self.endpoints.token_endpoint,
                &params,
                &auth.auth,
                auth.mtls.as_ref(),
            )
            .await?)
    }

    /// RFC 7662. The caller decides whether to present a client certificate
    /// via `auth.mtls`; introspecting a certificate-bound token without one
    /// is how tests probe the binding.
    #[tracing::instrument(name = "inspect_token", skip(self, token, auth))]
    pub async fn inspect_token(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
        auth: &ClientAuthentication,
    ) -> Result<HttpResponse, FlowError> {
        let mut params = vec![("token".to_string(), token.to_string())];
        if let Some(hint) = token_type_hint {
            params.push(("token_type_hint".to_string(), hint.to_string()));
        }
        params.extend(auth.body_params.iter().cloned());
        Ok(self
            .transport
            .post_form(
                &self.endpoints.token_introspection_endpoint,
                &params,
                &auth.auth,
                auth.mtls.as_ref(),
            )
            .await?)
    }

    /// RFC 7009.
    #[tracing::instrument(name = "revoke_token", skip(self, token, auth))]
    pub async fn revoke_token(
        &self,
        token: &str,
        token_type_hint: Option<&str>,
        auth: &ClientAuthentication,
    ) -> Result<HttpResponse, FlowError> {
        let mut params = vec![("token".to_string(), token.to_string())];
        if let Some(hint) = token_type_hint {
            params.push(("token_type_hint".to_string(), hint.to_string()));
        }
        params.extend(auth.body_params.iter().cloned());
        Ok(self
            .transport
            .post_form(
                &self.endpoints.token_revocation_endpoint,
                &params,
                &auth.auth,
                auth.mtls.as_ref(),
            )
            .await?)
    }

    pub async fn get_jwks(&self) -> Result<HttpResponse, FlowError> {
        Ok(self
            .transport
            .get(&self.endpoints.jwks_endpoint, &RequestAuth::None, None)
            .await?)
    }

    /// Fetch and decode the JWKS in one step for verification chains.
    pub async fn jwks(&self) -> Result<JwkSet, FlowError> {
        let response = self.get_jwks().await?;
        response
            .json_as::<JwkSet>()
            .map_err(|e| FlowError::UnexpectedBody(format!("jwks: {e}")))
    }

    pub async fn get_userinfo(&self, access_token: &str) -> Result<HttpResponse, FlowError> {
        Ok(self
            .transport
            .get(
                &self.endpoints.userinfo_endpoint,
                &RequestAuth::Bearer(access_token.to_string()),
                None,
            )
            .await?)
    }
}
