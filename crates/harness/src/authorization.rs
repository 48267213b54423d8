//! Front-channel authorization flow: submit the request, drive any
//! authentication interaction, finalize with authorize/deny, and normalize
//! whatever came back on the redirect.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use crate::config::ServerEndpoints;
use crate::error::FlowError;
use crate::interaction::{FlowDecision, InteractionScript};
use crate::transport::{HttpResponse, RequestAuth, Transport};

/// Sparse authorization request. Fields left as `None` never appear in the
/// serialized query string, which is exactly what omission-semantics tests
/// rely on.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub prompt: Option<String>,
    pub display: Option<String>,
    pub max_age: Option<i64>,
    pub id_token_hint: Option<String>,
    pub login_hint: Option<String>,
    pub acr_values: Option<String>,
    pub response_mode: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Request object passed by value (compact JWS).
    pub request: Option<String>,
    pub request_uri: Option<String>,
    /// RFC 9396 authorization_details, serialized as its JSON text.
    pub authorization_details: Option<Value>,
    /// OIDC claims parameter, serialized as its JSON text.
    pub claims: Option<Value>,
    /// Pass-through parameters appended verbatim.
    pub custom_params: BTreeMap<String, String>,
}

impl AuthorizationRequest {
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut push = |name: &str, value: Option<&String>| {
            if let Some(value) = value {
                pairs.push((name.to_string(), value.clone()));
            }
        };
        push("response_type", self.response_type.as_ref());
        push("client_id", self.client_id.as_ref());
        push("redirect_uri", self.redirect_uri.as_ref());
        push("scope", self.scope.as_ref());
        push("state", self.state.as_ref());
        push("nonce", self.nonce.as_ref());
        push("prompt", self.prompt.as_ref());
        push("display", self.display.as_ref());
        let max_age = self.max_age.map(|v| v.to_string());
        push("max_age", max_age.as_ref());
        push("id_token_hint", self.id_token_hint.as_ref());
        push("login_hint", self.login_hint.as_ref());
        push("acr_values", self.acr_values.as_ref());
        push("response_mode", self.response_mode.as_ref());
        push("code_challenge", self.code_challenge.as_ref());
        push("code_challenge_method", self.code_challenge_method.as_ref());
        push("request", self.request.as_ref());
        push("request_uri", self.request_uri.as_ref());
        let authorization_details = self.authorization_details.as_ref().map(Value::to_string);
        push("authorization_details", authorization_details.as_ref());
        let claims = self.claims.as_ref().map(Value::to_string);
        push("claims", claims.as_ref());
        for (name, value) in &self.custom_params {
            pairs.push((name.clone(), value.clone()));
        }
        pairs
    }
}

/// Where the result actually arrived, as observed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedResponseMode {
    Query,
    Fragment,
    Jwt,
}

impl ObservedResponseMode {
    /// `"#"` for fragment delivery, `"jwt"` for JARM, nothing for query:
    /// the shorthand conformance assertions compare against this.
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            ObservedResponseMode::Query => None,
            ObservedResponseMode::Fragment => Some("#"),
            ObservedResponseMode::Jwt => Some("jwt"),
        }
    }
}

/// Normalized terminal result of an authorization flow.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// JARM payload (compact JWS), still encoded; decode with the JWT engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub response_mode: ObservedResponseMode,
    /// Every parameter seen on the redirect, for custom assertions.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl AuthorizationResponse {
    fn from_pairs(pairs: Vec<(String, String)>, mode: ObservedResponseMode) -> Self {
        let params: BTreeMap<String, String> = pairs.into_iter().collect();
        let field = |name: &str| params.get(name).cloned();
        AuthorizationResponse {
            code: field("code"),
            access_token: field("access_token"),
            token_type: field("token_type"),
            expires_in: params.get("expires_in").and_then(|v| v.parse().ok()),
            id_token: field("id_token"),
            state: field("state"),
            error: field("error"),
            error_description: field("error_description"),
            response: field("response"),
            response_mode: mode,
            params,
        }
    }
}

/// Decode the terminal redirect. A `response` query parameter means JARM;
/// otherwise the fragment is checked before the query.
pub fn parse_redirect(location: &str) -> Result<AuthorizationResponse, FlowError> {
    let url =
        Url::parse(location).map_err(|e| FlowError::MalformedRedirect(format!("{location}: {e}")))?;
    let query_pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if query_pairs.iter().any(|(k, _)| k == "response") {
        return Ok(AuthorizationResponse::from_pairs(
            query_pairs,
            ObservedResponseMode::Jwt,
        ));
    }
    if let Some(fragment) = url.fragment().filter(|f| !f.is_empty()) {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(fragment.as_bytes())
            .into_owned()
            .collect();
        return Ok(AuthorizationResponse::from_pairs(
            pairs,
            ObservedResponseMode::Fragment,
        ));
    }
    Ok(AuthorizationResponse::from_pairs(
        query_pairs,
        ObservedResponseMode::Query,
    ))
}

/// Pull the interaction id out of a non-terminal redirect (the sign-in view
/// URL carries it as an `id` query parameter).
pub fn extract_interaction_id(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
}

/// Outcome handed to the assertion layer: the submit status plus whichever
/// of (normalized response, raw error body) applies.
#[derive(Debug, Serialize)]
pub struct AuthorizationOutcome {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_response: Option<AuthorizationResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
}

pub struct AuthorizationFlow<'a> {
    transport: &'a Transport,
    endpoints: &'a ServerEndpoints,
}

impl<'a> AuthorizationFlow<'a> {
    pub fn new(transport: &'a Transport, endpoints: &'a ServerEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Submit the request and return the raw response without driving the
    /// flow any further. Useful for assertions on the redirect itself.
    pub async fn submit(&self, params: &AuthorizationRequest) -> Result<HttpResponse, FlowError> {
        let pairs = params.to_query_pairs();
        let url = if pairs.is_empty() {
            self.endpoints.authorization_endpoint.clone()
        } else {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in &pairs {
                serializer.append_pair(name, value);
            }
            format!(
                "{}?{}",
                self.endpoints.authorization_endpoint,
                serializer.finish()
            )
        };
        Ok(self.transport.get(&url, &RequestAuth::None, None).await?)
    }

    /// Drive the whole front-channel flow. A non-302 answer or a terminal
    /// redirect short-circuits; an interaction redirect runs `script` and
    /// finalizes with its decision.
    #[tracing::instrument(name = "request_authorizations", skip(self, params, script))]
    pub async fn request_authorizations(
        &self,
        params: &AuthorizationRequest,
        script: &InteractionScript,
    ) -> Result<AuthorizationOutcome, FlowError> {
        let response = self.submit(params).await?;
        let status = response.status.as_u16();
        if status != 302 {
            return Ok(AuthorizationOutcome {
                status,
                authorization_response: None,
                error: response.json(),
                interaction_id: None,
            });
        }
        let location = response
            .location()
            .map(str::to_string)
            .ok_or(FlowError::MissingLocation)?;

        if self.is_terminal(&location, params) {
            return Ok(AuthorizationOutcome {
                status,
                authorization_response: Some(parse_redirect(&location)?),
                error: None,
                interaction_id: None,
            });
        }

        let id = extract_interaction_id(&location)
            .ok_or_else(|| FlowError::MissingInteractionId(location.clone()))?;
        debug!("Authentication required, interaction id {id}");
        script.run(self.transport, self.endpoints, &id).await?;

        let finalize_url = match script.decision {
            FlowDecision::Authorize => self.endpoints.authorize_url(&id),
            FlowDecision::Deny => self.endpoints.deny_url(&id),
        };
        let finalize = self
            .transport
            .post_json(&finalize_url, &json!({}), &RequestAuth::None, None)
            .await?;
        let body = finalize.json();
        let redirect_uri = body
            .as_ref()
            .and_then(|v| v.get("redirect_uri"))
            .and_then(Value::as_str)
            .map(str::to_string);
        match redirect_uri {
            Some(redirect) => Ok(AuthorizationOutcome {
                status,
                authorization_response: Some(parse_redirect(&redirect)?),
                error: None,
                interaction_id: Some(id),
            }),
            None => Ok(AuthorizationOutcome {
                status: finalize.status.as_u16(),
                authorization_response: None,
                error: body,
                interaction_id: Some(id),
            }),
        }
    }

    /// A redirect is terminal when it lands on the registered redirect_uri,
    /// or (for request-object flows where no plain redirect_uri was sent)
    /// when it already carries result parameters.
    fn is_terminal(&self, location: &str, params: &AuthorizationRequest) -> bool {
        if let Some(redirect_uri) = &params.redirect_uri
            && location.starts_with(redirect_uri.as_str())
        {
            return true;
        }
        let Ok(url) = Url::parse(location) else {
            return false;
        };
        let in_query = url
            .query_pairs()
            .any(|(k, _)| matches!(k.as_ref(), "code" | "error" | "response" | "access_token"));
        let in_fragment = url.fragment().is_some_and(|f| {
            url::form_urlencoded::parse(f.as_bytes())
                .any(|(k, _)| matches!(k.as_ref(), "code" | "error" | "access_token" | "id_token"))
        });
        in_query || in_fragment
    }
}
