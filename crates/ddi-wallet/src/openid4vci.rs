//! OpenID4VCI holder client for the pre-authorized code flow.
use crate::key::sign_jwt;
use chrono::Utc;
use ddi_core::agent::AgentError;
use ddi_core::credential::{
    CredentialBinding, IssuedCredential, OfferedCredential, ResolvedCredentialOffer,
};
use ddi_core::SD_JWT_VC_FORMAT;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use ssi::jwk::JWK;
use url::Url;

pub const CREDENTIAL_OFFER_PARAM: &str = "credential_offer";
pub const CREDENTIAL_OFFER_URI_PARAM: &str = "credential_offer_uri";
pub const ISSUER_METADATA_PATH: &str = "/.well-known/openid-credential-issuer";
pub const OAUTH_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";
pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";
pub const PRE_AUTHORIZED_CODE_GRANT: &str =
    "urn:ietf:params:oauth:grant-type:pre-authorized_code";
pub const PROOF_JWT_TYPE: &str = "openid4vci-proof+jwt";
/// Newer identifier for SD-JWT VCs, accepted alongside `vc+sd-jwt`.
pub const DC_SD_JWT_FORMAT: &str = "dc+sd-jwt";

pub fn is_sd_jwt_format(format: &str) -> bool {
    format == SD_JWT_VC_FORMAT || format == DC_SD_JWT_FORMAT
}

/// Credential offer object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialOffer {
    pub credential_issuer: String,
    /// Configuration ids, or credential objects in earlier drafts.
    #[serde(default, alias = "credentials")]
    pub credential_configuration_ids: Vec<Value>,
    #[serde(default)]
    pub grants: Option<Grants>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(
        rename = "urn:ietf:params:oauth:grant-type:pre-authorized_code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pre_authorized_code: Option<PreAuthorizedCodeGrant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreAuthorizedCodeGrant {
    #[serde(rename = "pre-authorized_code")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_code: Option<Value>,
    #[serde(default)]
    pub user_pin_required: bool,
}

/// Credential issuer metadata (the parts used by the holder).
#[derive(Debug, Clone, Deserialize)]
pub struct IssuerMetadata {
    pub credential_issuer: String,
    pub credential_endpoint: String,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    #[serde(default, alias = "credentials_supported")]
    pub credential_configurations_supported: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    c_nonce: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    #[serde(default)]
    credential: Option<Value>,
    #[serde(default)]
    credentials: Option<Vec<Value>>,
    #[serde(default)]
    c_nonce: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProofClaims<'a> {
    aud: &'a str,
    iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
}

/// Where a credential offer is found.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferSource {
    Inline(CredentialOffer),
    ByReference(String),
}

fn offer_error<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::OfferResolution(e.to_string())
}

/// Offers the holder cannot redeem fail resolution, before any token request is made.
fn check_redeemable(offer: &ResolvedCredentialOffer) -> Result<(), AgentError> {
    if offer.tx_code_required {
        return Err(AgentError::OfferResolution(
            "Offers requiring a transaction code are not supported.".to_string(),
        ));
    }
    if offer.pre_authorized_code.is_none() {
        return Err(AgentError::OfferResolution(
            "Only pre-authorized code offers are supported.".to_string(),
        ));
    }
    Ok(())
}

fn acceptance_error<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::OfferAcceptance(e.to_string())
}

/// Parses a credential offer reference: an `openid-credential-offer://` URI with a
/// `credential_offer` or `credential_offer_uri` parameter, an offer URL, or offer JSON.
pub fn parse_offer(offer: &str) -> Result<OfferSource, AgentError> {
    let offer = offer.trim();
    if offer.starts_with('{') {
        return Ok(OfferSource::Inline(
            serde_json::from_str(offer).map_err(offer_error)?,
        ));
    }
    let url = Url::parse(offer).map_err(offer_error)?;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            CREDENTIAL_OFFER_PARAM => {
                return Ok(OfferSource::Inline(
                    serde_json::from_str(&value).map_err(offer_error)?,
                ))
            }
            CREDENTIAL_OFFER_URI_PARAM => return Ok(OfferSource::ByReference(value.into_owned())),
            _ => (),
        }
    }
    match url.scheme() {
        "http" | "https" => Ok(OfferSource::ByReference(offer.to_string())),
        _ => Err(AgentError::OfferResolution(format!(
            "No {} or {} parameter in offer: {}",
            CREDENTIAL_OFFER_PARAM, CREDENTIAL_OFFER_URI_PARAM, offer
        ))),
    }
}

fn well_known(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Describes an offered credential from an offer entry and the issuer's supported configurations.
pub fn offered_credential(entry: &Value, supported: &Map<String, Value>) -> OfferedCredential {
    let (configuration_id, configuration) = match entry {
        Value::String(id) => (id.clone(), supported.get(id).cloned().unwrap_or(Value::Null)),
        other => (String::new(), other.clone()),
    };
    let format = configuration
        .get("format")
        .and_then(Value::as_str)
        .unwrap_or(SD_JWT_VC_FORMAT)
        .to_string();
    let credential_type = configuration
        .get("vct")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            configuration
                .pointer("/credential_definition/type")
                .or_else(|| configuration.get("types"))
                .and_then(Value::as_array)
                .and_then(|types| types.last())
                .and_then(Value::as_str)
                .map(str::to_string)
        });
    let configuration_id = if configuration_id.is_empty() {
        credential_type.clone().unwrap_or_else(|| format.clone())
    } else {
        configuration_id
    };
    OfferedCredential {
        configuration_id,
        format,
        credential_type,
    }
}

/// Credentials in a credential response: `credential` or `credentials`, each entry a
/// string or an object with a `credential` member.
fn issued_credentials(response: CredentialResponse, format: &str) -> Vec<IssuedCredential> {
    let entries = response
        .credentials
        .unwrap_or_default()
        .into_iter()
        .chain(response.credential);
    entries
        .map(|entry| match entry {
            Value::Object(mut map) if map.contains_key("credential") => {
                map.remove("credential").unwrap_or(Value::Null)
            }
            other => other,
        })
        .map(|credential| match credential {
            Value::String(compact) if is_sd_jwt_format(format) => {
                IssuedCredential::SdJwtVc { compact }
            }
            credential => IssuedCredential::Other {
                format: format.to_string(),
                credential,
            },
        })
        .collect()
}

/// OpenID4VCI holder client.
#[derive(Debug, Clone)]
pub struct Openid4VciClient {
    client: reqwest::Client,
}

impl Openid4VciClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    /// Token endpoint from the authorization server metadata, falling back to `<server>/token`.
    async fn discover_token_endpoint(&self, server: &str) -> String {
        for path in [OAUTH_METADATA_PATH, OPENID_CONFIGURATION_PATH] {
            if let Ok(metadata) = self.get_json::<Value>(&well_known(server, path)).await {
                if let Some(endpoint) = metadata.get("token_endpoint").and_then(Value::as_str) {
                    return endpoint.to_string();
                }
            }
        }
        format!("{}/token", server.trim_end_matches('/'))
    }

    /// Resolves an offer and the issuer metadata needed to accept it.
    pub async fn resolve_offer(&self, offer: &str) -> Result<ResolvedCredentialOffer, AgentError> {
        let offer: CredentialOffer = match parse_offer(offer)? {
            OfferSource::Inline(offer) => offer,
            OfferSource::ByReference(uri) => {
                debug!("Fetching credential offer from {}", uri);
                self.get_json(&uri).await.map_err(offer_error)?
            }
        };
        let metadata: IssuerMetadata = self
            .get_json(&well_known(&offer.credential_issuer, ISSUER_METADATA_PATH))
            .await
            .map_err(offer_error)?;
        let token_endpoint = match metadata.token_endpoint {
            Some(endpoint) => endpoint,
            None => {
                let server = metadata
                    .authorization_servers
                    .first()
                    .unwrap_or(&metadata.credential_issuer);
                self.discover_token_endpoint(server).await
            }
        };
        let grant = offer.grants.and_then(|g| g.pre_authorized_code);
        let offered = offer
            .credential_configuration_ids
            .iter()
            .map(|entry| offered_credential(entry, &metadata.credential_configurations_supported))
            .collect();
        let resolved = ResolvedCredentialOffer {
            credential_issuer: offer.credential_issuer,
            offered,
            tx_code_required: grant
                .as_ref()
                .map_or(false, |g| g.tx_code.is_some() || g.user_pin_required),
            pre_authorized_code: grant.map(|g| g.code),
            token_endpoint: Some(token_endpoint),
            credential_endpoint: Some(metadata.credential_endpoint),
        };
        check_redeemable(&resolved)?;
        Ok(resolved)
    }

    /// Redeems the pre-authorized code and requests every offered credential with a proof of
    /// possession of the holder key.
    pub async fn request_credentials(
        &self,
        offer: &ResolvedCredentialOffer,
        binding: &CredentialBinding,
        jwk: &JWK,
    ) -> Result<Vec<IssuedCredential>, AgentError> {
        check_redeemable(offer)?;
        let code = offer.pre_authorized_code.as_deref().unwrap_or_default();
        let (token_endpoint, credential_endpoint) =
            match (&offer.token_endpoint, &offer.credential_endpoint) {
                (Some(token), Some(credential)) => (token, credential),
                _ => {
                    return Err(AgentError::OfferAcceptance(
                        "Offer was not resolved against issuer metadata.".to_string(),
                    ))
                }
            };

        let token: TokenResponse = self
            .client
            .post(token_endpoint)
            .form(&[("grant_type", PRE_AUTHORIZED_CODE_GRANT), ("pre-authorized_code", code)])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(acceptance_error)?
            .json()
            .await
            .map_err(acceptance_error)?;
        let mut nonce = token.c_nonce;

        let mut issued = Vec::new();
        for offered in &offer.offered {
            let proof = sign_jwt(
                &ProofClaims {
                    aud: &offer.credential_issuer,
                    iat: Utc::now().timestamp(),
                    nonce: nonce.as_deref(),
                },
                jwk,
                PROOF_JWT_TYPE,
                Some(&binding.verification_method),
            )
            .map_err(acceptance_error)?;
            let mut request = json!({
                "format": offered.format,
                "proof": { "proof_type": "jwt", "jwt": proof }
            });
            if let Some(vct) = &offered.credential_type {
                request["vct"] = json!(vct);
            }
            let response: CredentialResponse = self
                .client
                .post(credential_endpoint)
                .bearer_auth(&token.access_token)
                .json(&request)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(acceptance_error)?
                .json()
                .await
                .map_err(acceptance_error)?;
            if let Some(c_nonce) = &response.c_nonce {
                nonce = Some(c_nonce.clone());
            }
            let credentials = issued_credentials(response, &offered.format);
            info!(
                "Received {} credential(s) for {}",
                credentials.len(),
                offered.configuration_id
            );
            issued.extend(credentials);
        }
        Ok(issued)
    }
}
