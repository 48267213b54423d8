//! Authentication interaction scripts.
//!
//! A script is an ordered list of `{path, body}` steps posted against the
//! interaction endpoints of one authorization transaction. New second-factor
//! types are added as constructors, not as branches in the orchestrator.

use serde_json::{Value, json};
use tracing::warn;

use crate::config::ServerEndpoints;
use crate::error::FlowError;
use crate::transport::{HttpResponse, RequestAuth, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowDecision {
    #[default]
    Authorize,
    Deny,
}

/// One POST against `<authorization_id_endpoint>/{id}/<path>`.
#[derive(Debug, Clone)]
pub struct InteractionStep {
    pub path: String,
    pub body: Value,
}

impl InteractionStep {
    pub fn custom(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }

    pub fn password_authentication(username: &str, password: &str) -> Self {
        Self::custom(
            "password-authentication",
            json!({"username": username, "password": password}),
        )
    }

    pub fn email_challenge(email: &str) -> Self {
        Self::custom(
            "email-authentication-challenge",
            json!({"email": email, "email_template": "authentication"}),
        )
    }

    pub fn email_verification(code: &str) -> Self {
        Self::custom("email-authentication", json!({"verification_code": code}))
    }

    pub fn sms_challenge(phone_number: &str) -> Self {
        Self::custom(
            "sms-authentication-challenge",
            json!({"phone_number": phone_number}),
        )
    }

    pub fn sms_verification(code: &str) -> Self {
        Self::custom("sms-authentication", json!({"verification_code": code}))
    }

    pub fn webauthn_challenge() -> Self {
        Self::custom("webauthn-authentication-challenge", json!({}))
    }

    /// The assertion body is whatever the authenticator produced; the
    /// harness does not interpret FIDO material.
    pub fn webauthn_assertion(assertion: Value) -> Self {
        Self::custom("webauthn-authentication", assertion)
    }

    pub fn fido_uaf_challenge(body: Value) -> Self {
        Self::custom("fido-uaf-authentication-challenge", body)
    }

    pub fn fido_uaf_assertion(body: Value) -> Self {
        Self::custom("fido-uaf-authentication", body)
    }
}

/// Ordered steps plus the final decision posted once they have run.
#[derive(Debug, Clone, Default)]
pub struct InteractionScript {
    pub steps: Vec<InteractionStep>,
    pub decision: FlowDecision,
}

impl InteractionScript {
    /// Straight to authorize, no authentication steps. For servers that
    /// pre-authenticate the debug transaction.
    pub fn authorize() -> Self {
        Self::default()
    }

    pub fn deny() -> Self {
        Self {
            steps: Vec::new(),
            decision: FlowDecision::Deny,
        }
    }

    pub fn password(username: &str, password: &str) -> Self {
        Self {
            steps: vec![InteractionStep::password_authentication(username, password)],
            decision: FlowDecision::Authorize,
        }
    }

    pub fn with_step(mut self, step: InteractionStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_decision(mut self, decision: FlowDecision) -> Self {
        self.decision = decision;
        self
    }

    /// Run every step in order. A step answering >= 400 is logged and the
    /// script continues: multi-step negative scenarios depend on later steps
    /// still being sent. Transport failures abort as usual.
    pub(crate) async fn run(
        &self,
        transport: &Transport,
        endpoints: &ServerEndpoints,
        id: &str,
    ) -> Result<Vec<HttpResponse>, FlowError> {
        let mut responses = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let url = endpoints.interaction_url(id, &step.path);
            let response = transport
                .post_json(&url, &step.body, &RequestAuth::None, None)
                .await?;
            if response.status.as_u16() >= 400 {
                warn!(
                    "Interaction step {} answered {} ({})",
                    step.path,
                    response.status,
                    response.text()
                );
            }
            responses.push(response);
        }
        Ok(responses)
    }
}

/// Standalone interaction primitive for dynamic scripts (e.g. a challenge
/// whose verification code is fetched out-of-band between two calls).
pub async fn post_authentication(
    transport: &Transport,
    endpoints: &ServerEndpoints,
    id: &str,
    step: &InteractionStep,
) -> Result<HttpResponse, FlowError> {
    let url = endpoints.interaction_url(id, &step.path);
    Ok(transport
        .post_json(&url, &step.body, &RequestAuth::None, None)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_script_has_one_step_and_authorizes() {
        let script = InteractionScript::password("001", "successUserCode");
        assert_eq!(script.steps.len(), 1);
        assert_eq!(script.steps[0].path, "password-authentication");
        assert_eq!(script.steps[0].body["username"], "001");
        assert_eq!(script.decision, FlowDecision::Authorize);
    }

    #[test]
    fn steps_are_additive_and_ordered() {
        let script = InteractionScript::password("001", "pw")
            .with_step(InteractionStep::email_challenge("user@example.com"))
            .with_step(InteractionStep::email_verification("123456"));
        let paths: Vec<&str> = script.steps.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "password-authentication",
                "email-authentication-challenge",
                "email-authentication"
            ]
        );
    }

    #[test]
    fn deny_script_carries_the_decision() {
        assert_eq!(InteractionScript::deny().decision, FlowDecision::Deny);
    }
}
