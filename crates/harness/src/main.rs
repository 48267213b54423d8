use rust_oidc_tester::authorization::{AuthorizationFlow, AuthorizationRequest};
use rust_oidc_tester::client_auth::build_client_authentication;
use rust_oidc_tester::config::load_config_or_panic;
use rust_oidc_tester::interaction::InteractionScript;
use rust_oidc_tester::pkce::{CodeChallengeMethod, code_challenge, generate_code_verifier};
use rust_oidc_tester::tokens::{TokenClient, TokenRequest};
use rust_oidc_tester::transport::Transport;
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "rust_oidc_tester=info,hyper=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

/// Drive one authorization-code + PKCE flow against the configured server
/// and print the outcome. The first client profile in the config is used.
#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    initialize_standard_tracing();

    let config = load_config_or_panic();
    let ring_provider = crypto::ring::default_provider();
    let _ = CryptoProvider::install_default(ring_provider);

    let (name, client) = config
        .clients
        .iter()
        .next()
        .ok_or_else(|| color_eyre::eyre::eyre!("No client profiles configured"))?;
    tracing::info!("Running authorization-code flow with client profile {name}");

    let transport = if config.verify_tls {
        Transport::new()
    } else {
        Transport::insecure()
    };

    let verifier = generate_code_verifier();
    let request = AuthorizationRequest {
        response_type: Some("code".into()),
        client_id: Some(client.client_id.clone()),
        redirect_uri: Some(client.redirect_uri.clone()),
        scope: Some(client.scope.clone()),
        state: Some("conformance-demo".into()),
        nonce: Some(rust_oidc_tester::jose::generate_jti()),
        code_challenge: Some(code_challenge(&verifier, CodeChallengeMethod::S256)),
        code_challenge_method: Some("S256".into()),
        ..Default::default()
    };

    let flow = AuthorizationFlow::new(&transport, &config.server);
    let outcome = flow
        .request_authorizations(&request, &InteractionScript::authorize())
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    let Some(code) = outcome
        .authorization_response
        .as_ref()
        .and_then(|r| r.code.clone())
    else {
        tracing::warn!("No authorization code issued; stopping before token exchange");
        return Ok(());
    };

    let auth = build_client_authentication(client, &config.server.issuer)?;
    let token_client = TokenClient::new(&transport, &config.server);
    let token_response = token_client
        .request_token(
            &TokenRequest::authorization_code(&code, &client.redirect_uri)
                .with_code_verifier(&verifier),
            &auth,
        )
        .await?;
    tracing::info!("Token endpoint answered {}", token_response.status);
    println!("{}", token_response.text());
    Ok(())
}
