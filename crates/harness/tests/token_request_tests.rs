mod common;

use common::{client_secret_jwt_client, client_secret_post_client, endpoints, fixture_path};
use rust_oidc_tester::client_auth::{
    AssertionVariant, build_client_authentication, build_client_authentication_with_variant,
};
use rust_oidc_tester::tokens::{TokenClient, TokenRequest};
use rust_oidc_tester::transport::{Transport, cert_thumbprint};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn authorization_code_exchange_sends_the_rfc_shaped_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens"))
        .and(header(
            "content-type",
            "application/x-www-form-urlencoded",
        ))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=xyz789"))
        .and(body_string_contains("code_verifier=aiueo12345678"))
        .and(body_string_contains("client_id=clientSecretPost"))
        .and(body_string_contains("client_secret="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-123",
            "id_token": "idt-123",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let client = client_secret_post_client();
    let auth = build_client_authentication(&client, &endpoints.issuer).unwrap();
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client
        .request_token(
            &TokenRequest::authorization_code("xyz789", &client.redirect_uri)
                .with_code_verifier("aiueo12345678"),
            &auth,
        )
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 200);
    let body = response.json().unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].is_string());
    assert!(body["id_token"].is_string());

    // Absent optional fields must stay off the wire.
    let hits = server.received_requests().await.unwrap();
    let sent = String::from_utf8_lossy(&hits[0].body).into_owned();
    assert!(!sent.contains("refresh_token"));
    assert!(!sent.contains("username"));
    assert!(!sent.contains("auth_req_id"));
}

#[tokio::test]
async fn wrong_issuer_assertion_is_sent_verbatim_and_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens"))
        .and(body_string_contains(
            "client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("client_assertion=ey"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let client = client_secret_jwt_client();
    let auth = build_client_authentication_with_variant(
        &client,
        &endpoints.issuer,
        AssertionVariant::WrongIssuer,
    )
    .unwrap();
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client
        .request_token(&TokenRequest::client_credentials("account"), &auth)
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 401);
    assert_eq!(response.json().unwrap()["error"], "invalid_client");
}

#[tokio::test]
async fn introspection_passes_certificate_binding_claims_through() {
    let thumbprint = cert_thumbprint(&fixture_path("client_cert.pem")).unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens/introspection"))
        .and(body_string_contains("token=at-bound"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "active": true,
            "scope": "account transfers",
            "auth_time": 1735689600,
            "amr": ["pwd"],
            "acr": "urn:mace:incommon:iap:silver",
            "cnf": {"x5t#S256": thumbprint},
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let client = client_secret_post_client();
    let auth = build_client_authentication(&client, &endpoints.issuer).unwrap();
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client
        .inspect_token("at-bound", None, &auth)
        .await
        .unwrap();

    let body = response.json().unwrap();
    assert_eq!(body["active"], true);
    assert_eq!(
        body["cnf"]["x5t#S256"].as_str().unwrap(),
        cert_thumbprint(&fixture_path("client_cert.pem")).unwrap()
    );
}

#[tokio::test]
async fn unbound_introspection_error_is_surfaced_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens/introspection"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "active": false,
            "error": "invalid_token",
            "error_description": "Sender-constrained access token requires client certificate"
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let client = client_secret_post_client();
    let auth = build_client_authentication(&client, &endpoints.issuer).unwrap();
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client
        .inspect_token("at-bound", Some("access_token"), &auth)
        .await
        .unwrap();

    assert_eq!(response.status.as_u16(), 401);
    let body = response.json().unwrap();
    assert_eq!(body["active"], false);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn revocation_posts_token_and_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens/revocation"))
        .and(body_string_contains("token=rt-9"))
        .and(body_string_contains("token_type_hint=refresh_token"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let client = client_secret_post_client();
    let auth = build_client_authentication(&client, &endpoints.issuer).unwrap();
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client
        .revoke_token("rt-9", Some("refresh_token"), &auth)
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn jwks_endpoint_feeds_the_jwt_engine() {
    let jwks_body: serde_json::Value =
        serde_json::from_str(&common::read_fixture("jwks.json")).unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/123/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let token_client = TokenClient::new(&transport, &endpoints);
    let jwks = token_client.jwks().await.unwrap();
    assert_eq!(jwks.keys.len(), 2);
    assert!(jwks.find("request_key").is_some());
}

#[tokio::test]
async fn userinfo_uses_the_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/123/userinfo"))
        .and(header("authorization", "Bearer at-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "001"})))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client.get_userinfo("at-123").await.unwrap();
    assert_eq!(response.json().unwrap()["sub"], "001");
}

#[tokio::test]
async fn refresh_grant_form_contains_only_its_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "refresh_token": "rt-2",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let client = client_secret_post_client();
    let auth = build_client_authentication(&client, &endpoints.issuer).unwrap();
    let token_client = TokenClient::new(&transport, &endpoints);
    let response = token_client
        .request_token(&TokenRequest::refresh("rt-1"), &auth)
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);

    let hits = server.received_requests().await.unwrap();
    let sent = String::from_utf8_lossy(&hits[0].body).into_owned();
    assert!(!sent.contains("code="));
    assert!(!sent.contains("redirect_uri"));
}
