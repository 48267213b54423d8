mod common;

use common::{client_secret_basic_client, client_secret_post_client, endpoints};
use rust_oidc_tester::ciba::{BackchannelAuthenticationRequest, BackchannelFlow, CibaGrant};
use rust_oidc_tester::client_auth::build_client_authentication;
use rust_oidc_tester::transport::Transport;
use serde_json::json;
use wiremock::matchers::{
    body_string_contains, header_exists, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backchannel_request() -> BackchannelAuthenticationRequest {
    BackchannelAuthenticationRequest {
        scope: Some("openid profile phone email account".into()),
        login_hint: Some("001".into()),
        binding_message: Some("999".into()),
        user_code: Some("successUserCode".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn ciba_poll_flow_completes_after_device_interaction() {
    let server = MockServer::start().await;
    let issuer = format!("{}/123", server.uri());

    Mock::given(method("POST"))
        .and(path("/123/backchannel/authentications"))
        .and(header_exists("authorization"))
        .and(body_string_contains("login_hint=001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth_req_id": "1c266114-a1be-4252-8ad1-04986c5b9ac1",
            "expires_in": 120,
            "interval": 0,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/123/authentication-devices/device-7/authentications"))
        .and(query_param(
            "attributes.auth_req_id",
            "1c266114-a1be-4252-8ad1-04986c5b9ac1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "list": [{"id": "txn-9", "authorization_flow": "ciba"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/123/authentications/ciba/txn-9/authentication-device-binding-message"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    // First poll is still pending, the second succeeds.
    Mock::given(method("POST"))
        .and(path("/123/tokens"))
        .and(body_string_contains(
            "grant_type=urn%3Aopenid%3Aparams%3Agrant-type%3Aciba",
        ))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending",
            "error_description": "The authorization request is still pending"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/123/tokens"))
        .and(body_string_contains(
            "auth_req_id=1c266114-a1be-4252-8ad1-04986c5b9ac1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "id_token": "idt-1",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let flow = BackchannelFlow::new(&transport, &endpoints);
    let client = client_secret_basic_client();
    let auth = build_client_authentication(&client, &issuer).unwrap();

    let response = flow
        .request_backchannel_authentications(&backchannel_request(), &auth)
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    let grant = CibaGrant::from_response(&response).unwrap();
    assert!(grant.auth_req_id_is_wellformed());
    assert_eq!(grant.expires_in, 120);

    let transactions = flow
        .get_device_transactions(
            "device-7",
            &[(
                "attributes.auth_req_id".to_string(),
                grant.auth_req_id.clone(),
            )],
        )
        .await
        .unwrap();
    let list = transactions.json().unwrap();
    let transaction = &list["list"][0];
    assert_eq!(transaction["id"], "txn-9");

    let interaction = flow
        .post_device_interaction(
            transaction["authorization_flow"].as_str().unwrap(),
            transaction["id"].as_str().unwrap(),
            "authentication-device-binding-message",
            &json!({"binding_message": "999"}),
        )
        .await
        .unwrap();
    assert_eq!(interaction.status.as_u16(), 200);

    let token_response = flow.poll_token(&grant, &auth, 5).await.unwrap();
    assert_eq!(token_response.status.as_u16(), 200);
    let body = token_response.json().unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].is_string());
    assert!(body["id_token"].is_string());
}

#[tokio::test]
async fn denial_ends_polling_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/tokens"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "access_denied",
            "error_description": "The end-user denied the authorization request"
        })))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let flow = BackchannelFlow::new(&transport, &endpoints);
    let client = client_secret_post_client();
    let auth = build_client_authentication(&client, &endpoints.issuer).unwrap();

    let grant = CibaGrant {
        auth_req_id: "denied-grant".into(),
        expires_in: 120,
        interval: Some(0),
    };
    let response = flow.poll_token(&grant, &auth, 5).await.unwrap();
    assert_eq!(response.status.as_u16(), 400);
    assert_eq!(response.json().unwrap()["error"], "access_denied");
    // Only the single terminal attempt was made.
    let hits = server.received_requests().await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn automated_complete_posts_the_grant_and_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/123/backchannel/authentications/automated-complete"))
        .and(body_string_contains("\"action\":\"allow\""))
        .and(body_string_contains("\"auth_req_id\":\"grant-5\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let flow = BackchannelFlow::new(&transport, &endpoints);
    let response = flow.complete_automated("grant-5", "allow").await.unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[tokio::test]
async fn unselected_device_has_an_empty_transaction_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/123/authentication-devices/device-low/authentications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"list": []})))
        .mount(&server)
        .await;

    let transport = Transport::new();
    let endpoints = endpoints(&server.uri());
    let flow = BackchannelFlow::new(&transport, &endpoints);
    let response = flow
        .get_device_transactions("device-low", &[])
        .await
        .unwrap();
    let list = response.json().unwrap();
    assert_eq!(list["list"].as_array().unwrap().len(), 0);
}
