use crate::middleware::log_request;
use crate::{handlers, state::AppState};
use axum::routing::{get, post, IntoMakeService};
use axum::{middleware, Router};
use hyper::server::conn::AddrIncoming;
use std::sync::Arc;
use tower::ServiceBuilder;

pub struct DDIRouter {
    router: Router,
}

impl From<Arc<AppState>> for DDIRouter {
    fn from(app_state: Arc<AppState>) -> Self {
        Self {
            router: Self::generate_router(app_state),
        }
    }
}

impl DDIRouter {
    fn generate_router(shared_state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(handlers::index))
            .route("/receive-credential", post(handlers::receive_credential))
            .route("/present-credential", post(handlers::present_credential))
            .route("/api", get(handlers::api))
            .route("/api/credentials", get(handlers::api_credentials))
            .layer(ServiceBuilder::new().layer(middleware::from_fn(log_request)))
            .with_state(shared_state)
    }

    /// Moves wrapped app router and consumes.
    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Binds the server to the configured address.
pub fn server(
    app_state: Arc<AppState>,
) -> Result<axum::Server<AddrIncoming, IntoMakeService<Router>>, hyper::Error> {
    let addr = app_state.config.to_socket_address();
    let app = DDIRouter::from(app_state).into_router();
    Ok(axum::Server::try_bind(&addr)?.serve(app.into_make_service()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HTTPConfig;
    use crate::handlers::API_GREETING;
    use axum_test_helper::TestClient;
    use ddi_core::credential::{CredentialView, IssuedCredential};
    use ddi_core::presentation::ResolvedAuthorizationRequest;
    use ddi_core::test_utils::{issue_sd_jwt, test_offer, InMemoryAgent};
    use hyper::StatusCode;
    use serde_json::{json, Value};

    const FORM: &str = "application/x-www-form-urlencoded";

    fn client(agent: InMemoryAgent) -> TestClient {
        let state = Arc::new(AppState::new_with_agent(
            HTTPConfig::default(),
            Arc::new(agent),
        ));
        TestClient::new(DDIRouter::from(state).into_router())
    }

    fn badge_agent() -> InMemoryAgent {
        let compact = issue_sd_jwt("Badge", &[("level", json!(3))], None);
        InMemoryAgent::new().with_offer(
            "offer-1",
            test_offer("Badge"),
            vec![IssuedCredential::SdJwtVc { compact }],
        )
    }

    #[tokio::test]
    async fn test_index() {
        let client = client(InMemoryAgent::new());
        let response = client.get("/").send().await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = response.text().await;
        assert!(html.contains("Decentralized Digital Identity Demo"));
        assert!(html.contains(r#"name="offerLink""#));
    }

    #[tokio::test]
    async fn test_api_greeting() {
        let response = client(InMemoryAgent::new()).get("/api").send().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await, API_GREETING);
    }

    #[tokio::test]
    async fn test_receive_credential_empty_offer_link() {
        let client = client(InMemoryAgent::new());
        let response = client
            .post("/receive-credential")
            .header("content-type", FORM)
            .body("offerLink=")
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("must not be empty"));
    }

    #[tokio::test]
    async fn test_receive_then_list_credentials() {
        let client = client(badge_agent());
        let response = client
            .post("/receive-credential")
            .header("content-type", FORM)
            .body("offerLink=offer-1")
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let fragment = response.text().await;
        assert!(fragment.starts_with(r#"<div id="credentials""#));
        assert!(fragment.contains(r#"<h2 class="card-title">Badge</h2>"#));

        let response = client.get("/api/credentials").send().await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await;
        let credentials = body.as_array().unwrap();
        assert_eq!(credentials.len(), 1);
        let mut keys: Vec<&str> = credentials[0]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort();
        assert_eq!(keys, ["claims", "createdAt", "id", "sdJwt", "type"]);
        assert_eq!(credentials[0]["type"], "Badge");
        assert_eq!(credentials[0]["claims"]["level"], 3);

        let views: Vec<CredentialView> = serde_json::from_value(body).unwrap();
        assert_eq!(views[0].type_, "Badge");
    }

    #[tokio::test]
    async fn test_receive_unknown_offer() {
        let response = client(InMemoryAgent::new())
            .post("/receive-credential")
            .header("content-type", FORM)
            .body("offerLink=unknown")
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_present_without_requirement_set() {
        let request = ResolvedAuthorizationRequest {
            client_id: "verifier".to_string(),
            response_uri: Some("https://verifier.example.com/post".to_string()),
            response_mode: None,
            nonce: None,
            state: None,
            presentation_definition: None,
        };
        let agent = InMemoryAgent::new().with_authorization_request("request-1", request);
        let response = client(agent)
            .post("/present-credential")
            .header("content-type", FORM)
            .body("presentationLink=request-1")
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await;
        assert_eq!(
            body["error"],
            "Rejected: Presentation request has no requirement set (presentation definition)."
        );
    }

    #[tokio::test]
    async fn test_present_empty_link() {
        let response = client(InMemoryAgent::new())
            .post("/present-credential")
            .header("content-type", FORM)
            .body("presentationLink=")
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
