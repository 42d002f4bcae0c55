//! Integration test for the OpenID4VCI and OpenID4VP holder flows against a local mock
//! issuer and verifier.
use axum::extract::{Form, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ddi_core::agent::{IdentityAgent, PresentationSelector};
use ddi_core::credential::CredentialBinding;
use ddi_core::did::{DidCreateOptions, KeyType};
use ddi_core::presentation::PathSelector;
use ddi_core::sd_jwt;
use ddi_core::test_utils::issue_sd_jwt;
use ddi_wallet::config::WalletConfig;
use ddi_wallet::WalletAgent;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

const NONCE: &str = "c-nonce-1";
const VERIFIER_NONCE: &str = "vp-nonce-1";

struct MockState {
    base: String,
    submissions: Mutex<Vec<HashMap<String, String>>>,
}

async fn issuer_metadata(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({
        "credential_issuer": state.base,
        "credential_endpoint": format!("{}/credential", state.base),
        "credential_configurations_supported": {
            "BadgeCredential": {"format": "vc+sd-jwt", "vct": "Badge"}
        }
    }))
}

async fn oauth_metadata(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({ "token_endpoint": format!("{}/token", state.base) }))
}

async fn offer(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({
        "credential_issuer": state.base,
        "credential_configuration_ids": ["BadgeCredential"],
        "grants": {
            "urn:ietf:params:oauth:grant-type:pre-authorized_code": {
                "pre-authorized_code": "code-1"
            }
        }
    }))
}

async fn token(Form(params): Form<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(params["pre-authorized_code"], "code-1");
    Json(json!({ "access_token": "access-1", "token_type": "bearer", "c_nonce": NONCE }))
}

async fn credential(Json(request): Json<Value>) -> Json<Value> {
    let jwt = request["proof"]["jwt"].as_str().unwrap();
    let (header, payload) = ssi::jws::decode_unverified(jwt).unwrap();
    let claims: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(claims["nonce"], NONCE);
    assert_eq!(header.type_.as_deref(), Some("openid4vci-proof+jwt"));
    assert_eq!(request["vct"], "Badge");
    Json(json!({
        "credential": issue_sd_jwt(
            "Badge",
            &[("level", json!(3)), ("holder_name", json!("Ada"))],
            header.key_id.as_deref()
        )
    }))
}

async fn authorization_request(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({
        "client_id": "mock-verifier",
        "response_uri": format!("{}/post", state.base),
        "response_mode": "direct_post",
        "nonce": VERIFIER_NONCE,
        "state": "state-1",
        "presentation_definition": {
            "id": "badge-check",
            "input_descriptors": [{
                "id": "badge",
                "constraints": {
                    "limit_disclosure": "required",
                    "fields": [
                        {"path": ["$.vct"], "filter": {"const": "Badge"}},
                        {"path": ["$.level"]}
                    ]
                }
            }]
        }
    }))
}

async fn direct_post(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    state.submissions.lock().unwrap().push(form);
    Json(json!({ "redirect_uri": "https://verifier.example.com/done" }))
}

fn serve() -> Arc<MockState> {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let state = Arc::new(MockState {
        base: format!("http://{}", listener.local_addr().unwrap()),
        submissions: Mutex::new(vec![]),
    });
    let app = Router::new()
        .route("/.well-known/openid-credential-issuer", get(issuer_metadata))
        .route("/.well-known/oauth-authorization-server", get(oauth_metadata))
        .route("/offer", get(offer))
        .route("/token", post(token))
        .route("/credential", post(credential))
        .route("/request", get(authorization_request))
        .route("/post", post(direct_post))
        .with_state(state.clone());
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    state
}

#[tokio::test]
async fn issue_and_present_sd_jwt_vc() {
    let mock = serve();
    let dir = tempfile::tempdir().unwrap();
    let config = WalletConfig {
        resolver_endpoint: None,
        ..WalletConfig::default()
    };
    let agent = WalletAgent::open(config, dir.path()).unwrap();
    let holder = agent
        .create_did(DidCreateOptions::Key {
            key_type: KeyType::Ed25519,
        })
        .await
        .unwrap()
        .did
        .unwrap();
    let binding = CredentialBinding::from_key_did(&holder).unwrap();

    // Issuance
    let offer_link = format!(
        "openid-credential-offer://?credential_offer_uri={}/offer",
        mock.base
    );
    let offer = agent.resolve_credential_offer(&offer_link).await.unwrap();
    assert_eq!(offer.offered[0].credential_type.as_deref(), Some("Badge"));
    assert_eq!(
        offer.token_endpoint.as_deref(),
        Some(format!("{}/token", mock.base).as_str())
    );
    let issued = agent.accept_credential_offer(&offer, &binding).await.unwrap();
    assert_eq!(issued.len(), 1);
    let stored = agent
        .store_credential(issued[0].compact().unwrap())
        .await
        .unwrap();
    assert_eq!(stored.type_, "Badge");
    assert_eq!(
        sd_jwt::decode(&stored.compact).unwrap().holder_key_id(),
        Some(binding.verification_method.as_str())
    );

    // Presentation
    let request_link = format!("openid4vp://?request_uri={}/request", mock.base);
    let request = agent
        .resolve_authorization_request(&request_link)
        .await
        .unwrap();
    let definition = request.presentation_definition.clone().unwrap();
    let credentials = agent.credentials().await.unwrap();
    let selected = PathSelector
        .select_credentials(&definition, &credentials)
        .unwrap();
    let result = agent
        .accept_authorization_request(&request, &selected)
        .await
        .unwrap();
    assert_eq!(result.status, 200);
    assert_eq!(result.body["redirect_uri"], "https://verifier.example.com/done");
    assert_eq!(result.submitted[0].credential_id, stored.id);

    let submissions = mock.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    let form = &submissions[0];
    assert_eq!(form["state"], "state-1");
    let presented = sd_jwt::decode(&form["vp_token"]).unwrap();
    assert!(presented.key_binding_jwt.is_some());
    let claims = presented.claims().unwrap();
    assert_eq!(claims["level"], json!(3));
    assert!(claims.get("holder_name").is_none());
    let submission: Value = serde_json::from_str(&form["presentation_submission"]).unwrap();
    assert_eq!(submission["definition_id"], "badge-check");
    assert_eq!(submission["descriptor_map"][0]["path"], "$");
}
