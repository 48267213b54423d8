//! Client-Initiated Backchannel Authentication (CIBA) orchestrator.
//!
//! Mirrors the front-channel flow without a redirect: submit the backchannel
//! request, find the pending transaction on the target device, drive the
//! same interaction primitives, then poll the token endpoint (poll/ping).
//! Push delivery confirmation belongs to an external mock-callback
//! collaborator and is not modelled here.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::client_auth::ClientAuthentication;
use crate::config::ServerEndpoints;
use crate::error::FlowError;
use crate::tokens::TokenRequest;
use crate::transport::{HttpResponse, RequestAuth, Transport};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Backchannel authentication request. Exactly one of `login_hint`,
/// `login_hint_token`, `id_token_hint` should be set; the builder sends
/// whatever it is given, and proving the server rejects two-hint requests is
/// a test's business.
#[derive(Debug, Clone, Default)]
pub struct BackchannelAuthenticationRequest {
    pub scope: Option<String>,
    pub login_hint: Option<String>,
    pub login_hint_token: Option<String>,
    pub id_token_hint: Option<String>,
    pub binding_message: Option<String>,
    pub user_code: Option<String>,
    pub client_notification_token: Option<String>,
    pub requested_expiry: Option<i64>,
    pub acr_values: Option<String>,
    pub authorization_details: Option<Value>,
    pub custom_params: BTreeMap<String, String>,
}

impl BackchannelAuthenticationRequest {
    pub fn to_form_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();
        let mut push = |name: &str, value: Option<&String>| {
            if let Some(value) = value {
                params.push((name.to_string(), value.clone()));
            }
        };
        push("scope", self.scope.as_ref());
        push("login_hint", self.login_hint.as_ref());
        push("login_hint_token", self.login_hint_token.as_ref());
        push("id_token_hint", self.id_token_hint.as_ref());
        push("binding_message", self.binding_message.as_ref());
        push("user_code", self.user_code.as_ref());
        push(
            "client_notification_token",
            self.client_notification_token.as_ref(),
        );
        let requested_expiry = self.requested_expiry.map(|v| v.to_string());
        push("requested_expiry", requested_expiry.as_ref());
        push("acr_values", self.acr_values.as_ref());
        let authorization_details = self.authorization_details.as_ref().map(Value::to_string);
        push("authorization_details", authorization_details.as_ref());
        for (name, value) in &self.custom_params {
            params.push((name.clone(), value.clone()));
        }
        params
    }
}

/// A successful backchannel authentication response. Consumed exactly once
/// by a successful token poll, or invalidated by expiry/denial, both of
/// which show up as token-endpoint errors, not harness state.
#[derive(Debug, Clone, Deserialize)]
pub struct CibaGrant {
    pub auth_req_id: String,
    pub expires_in: i64,
    #[serde(default)]
    pub interval: Option<u64>,
}

impl CibaGrant {
    pub fn from_response(response: &HttpResponse) -> Result<Self, FlowError> {
        response
            .json_as::<CibaGrant>()
            .map_err(|e| FlowError::UnexpectedBody(format!("backchannel response: {e}")))
    }

    /// `auth_req_id` must stay within `A-Z a-z 0-9 . - _` per the CIBA core
    /// syntax.
    pub fn auth_req_id_is_wellformed(&self) -> bool {
        !self.auth_req_id.is_empty()
            && self
                .auth_req_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }
}

pub struct BackchannelFlow<'a> {
    transport: &'a Transport,
    endpoints: &'a ServerEndpoints,
}

impl<'a> BackchannelFlow<'a> {
    pub fn new(transport: &'a Transport, endpoints: &'a ServerEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    #[tracing::instrument(name = "request_backchannel_authentications", skip(self, request, auth))]
    pub async fn request_backchannel_authentications(
        &self,
        request: &BackchannelAuthenticationRequest,
        auth: &ClientAuthentication,
    ) -> Result<HttpResponse, FlowError> {
        let mut params = request.to_form_params();
        params.extend(auth.body_params.iter().cloned());
        Ok(self
            .transport
            .post_form(
                &self.endpoints.backchannel_authentication_endpoint,
                &params,
                &auth.auth,
                auth.mtls.as_ref(),
            )
            .await?)
    }

    /// Debug shortcut of the rig under test: complete the transaction
    /// without a real device.
    pub async fn complete_automated(
        &self,
        auth_req_id: &str,
        action: &str,
    ) -> Result<HttpResponse, FlowError> {
        let endpoint = self
            .endpoints
            .backchannel_automated_complete_endpoint
            .as_ref()
            .ok_or_else(|| {
                FlowError::MissingEndpoint("backchannel_automated_complete_endpoint".into())
            })?;
        let body = json!({"auth_req_id": auth_req_id, "action": action});
        Ok(self
            .transport
            .post_json(endpoint, &body, &RequestAuth::None, None)
            .await?)
    }

    /// List the pending authentication transactions of one device. Filters
    /// such as `attributes.auth_req_id` go straight onto the query string.
    /// Which device got the request is observed here, never decided.
    pub async fn get_device_transactions(
        &self,
        device_id: &str,
        filters: &[(String, String)],
    ) -> Result<HttpResponse, FlowError> {
        let base = self
            .endpoints
            .device_transactions_url(device_id)
            .ok_or_else(|| FlowError::MissingEndpoint("authentication_device_endpoint".into()))?;
        let url = if filters.is_empty() {
            base
        } else {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in filters {
                serializer.append_pair(name, value);
            }
            format!("{base}?{}", serializer.finish())
        };
        Ok(self.transport.get(&url, &RequestAuth::None, None).await?)
    }

    pub async fn post_device_interaction(
        &self,
        flow_type: &str,
        transaction_id: &str,
        interaction_type: &str,
        body: &Value,
    ) -> Result<HttpResponse, FlowError> {
        let url = self
            .endpoints
            .device_interaction_url(flow_type, transaction_id, interaction_type)
            .ok_or_else(|| {
                FlowError::MissingEndpoint("authentication_device_interaction_endpoint".into())
            })?;
        Ok(self
            .transport
            .post_json(&url, body, &RequestAuth::None, None)
            .await?)
    }

    /// Poll the token endpoint for a CIBA grant. `authorization_pending`
    /// sleeps the advertised interval and tries again; `slow_down` backs off
    /// by another five seconds per the CIBA core rules. Any other answer
    /// (success, denial, expiry) is final and returned verbatim.
    #[tracing::instrument(name = "poll_backchannel_token", skip(self, grant, auth), fields(auth_req_id = %grant.auth_req_id))]
    pub async fn poll_token(
        &self,
        grant: &CibaGrant,
        auth: &ClientAuthentication,
        max_attempts: u32,
    ) -> Result<HttpResponse, FlowError> {
        let request = TokenRequest::ciba(&grant.auth_req_id);
        let mut interval = grant.poll_interval();
        let mut last = self.token_attempt(&request, auth).await?;
        for attempt in 1..max_attempts {
            match pending_error(&last) {
                Some("authorization_pending") => {}
                Some("slow_down") => interval += Duration::from_secs(5),
                _ => return Ok(last),
            }
            debug!("Attempt {attempt}: still pending, sleeping {interval:?}");
            sleep(interval).await;
            last = self.token_attempt(&request, auth).await?;
        }
        if pending_error(&last).is_some() {
            warn!("Token polling exhausted after {max_attempts} attempts");
        }
        Ok(last)
    }

    async fn token_attempt(
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
}

fn pending_error(response: &HttpResponse) -> Option<&'static str> {
    if response.status.as_u16() != 400 {
        return None;
    }
    match response
        .json()
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
    {
        Some("authorization_pending") => Some("authorization_pending"),
        Some("slow_down") => Some("slow_down"),
        _ => None,
    }
}
