use crate::state::AppState;
use crate::views;
use axum::extract::{Form, State};
use axum::response::Html;
use axum::Json;
use ddi_api::DDIAPIError;
use ddi_core::credential::CredentialView;
use log::info;
use serde::Deserialize;
use std::sync::Arc;

pub const API_GREETING: &str = "Hello from the DDI workshop agent!";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferForm {
    #[serde(default)]
    pub offer_link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationForm {
    #[serde(default)]
    pub presentation_link: String,
}

async fn refreshed_list(app_state: &AppState) -> Result<Html<String>, DDIAPIError> {
    let listing = app_state.orchestrator.list_credentials().await?;
    Ok(Html(views::credential_list(&listing)))
}

pub async fn index(State(app_state): State<Arc<AppState>>) -> Result<Html<String>, DDIAPIError> {
    let listing = app_state.orchestrator.list_credentials().await?;
    Ok(Html(views::app(&app_state.label, &listing)))
}

pub async fn receive_credential(
    State(app_state): State<Arc<AppState>>,
    Form(form): Form<OfferForm>,
) -> Result<Html<String>, DDIAPIError> {
    info!("POST receive credential: {}", form.offer_link);
    let stored = app_state.orchestrator.accept_offer(&form.offer_link).await?;
    info!("Received {} credential(s)", stored.len());
    refreshed_list(&app_state).await
}

pub async fn present_credential(
    State(app_state): State<Arc<AppState>>,
    Form(form): Form<PresentationForm>,
) -> Result<Html<String>, DDIAPIError> {
    info!("POST present credential: {}", form.presentation_link);
    let result = app_state
        .orchestrator
        .present_credentials(&form.presentation_link)
        .await?;
    info!(
        "Verifier responded with status {}: {}",
        result.status, result.body
    );
    refreshed_list(&app_state).await
}

pub async fn api() -> &'static str {
    API_GREETING
}

/// Stored credentials with decoded claims. Credentials that fail to decode are left out.
pub async fn api_credentials(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<CredentialView>>, DDIAPIError> {
    let listing = app_state.orchestrator.list_credentials().await?;
    Ok(Json(listing.views))
}
