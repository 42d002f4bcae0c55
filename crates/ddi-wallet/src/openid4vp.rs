//! OpenID4VP holder client: authorization request resolution and `direct_post` responses
//! carrying SD-JWT presentations with key binding.
use crate::key::{sign_jwt, KeyError};
use chrono::Utc;
use ddi_core::agent::AgentError;
use ddi_core::presentation::{
    PresentationDefinition, PresentationSubmission, ResolvedAuthorizationRequest,
    SelectedCredentials, SubmissionResult,
};
use ddi_core::sd_jwt::{sha256_b64url, SEPARATOR};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ssi::jwk::JWK;
use url::Url;

pub const DIRECT_POST: &str = "direct_post";
pub const KB_JWT_TYPE: &str = "kb+jwt";

/// Authorization request parameters, from the request URI query or a request object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthorizationRequestParams {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub response_uri: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub response_mode: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Inline definition: an object, or a JSON string when passed as a query parameter.
    #[serde(default)]
    pub presentation_definition: Option<Value>,
    #[serde(default)]
    pub presentation_definition_uri: Option<String>,
    #[serde(default)]
    pub request_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct KeyBindingClaims<'a> {
    iat: i64,
    aud: &'a str,
    nonce: &'a str,
    sd_hash: String,
}

fn resolution_error<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::PresentationResolution(e.to_string())
}

fn submission_error<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::PresentationSubmission(e.to_string())
}

/// Reads the query parameters of an `openid4vp://` (or https) authorization request link.
pub fn parse_request(link: &str) -> Result<AuthorizationRequestParams, AgentError> {
    let url = Url::parse(link.trim()).map_err(resolution_error)?;
    let query: Map<String, Value> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    serde_json::from_value(Value::Object(query)).map_err(resolution_error)
}

/// Key binding JWT for an SD-JWT presentation (`compact` ends with the separator).
pub fn key_binding_jwt(compact: &str, jwk: &JWK, aud: &str, nonce: &str) -> Result<String, KeyError> {
    let claims = KeyBindingClaims {
        iat: Utc::now().timestamp(),
        aud,
        nonce,
        sd_hash: sha256_b64url(compact),
    };
    sign_jwt(&claims, jwk, KB_JWT_TYPE, None)
}

/// Appends a key binding JWT to an SD-JWT presentation.
pub fn with_key_binding(
    compact: &str,
    jwk: &JWK,
    aud: &str,
    nonce: &str,
) -> Result<String, KeyError> {
    let mut presentation = compact.to_string();
    if !presentation.ends_with(SEPARATOR) {
        presentation.push(SEPARATOR);
    }
    let kb = key_binding_jwt(&presentation, jwk, aud, nonce)?;
    presentation.push_str(&kb);
    Ok(presentation)
}

/// OpenID4VP holder client.
#[derive(Debug, Clone)]
pub struct Openid4VpClient {
    client: reqwest::Client,
}

impl Openid4VpClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// Fetches a request object by reference: a JWT (decoded, signature not verified) or JSON.
    async fn request_object(&self, uri: &str) -> Result<AuthorizationRequestParams, AgentError> {
        debug!("Fetching request object from {}", uri);
        let body = self.get_text(uri).await.map_err(resolution_error)?;
        let body = body.trim();
        let value: Value = if body.starts_with('{') {
            serde_json::from_str(body).map_err(resolution_error)?
        } else {
            ssi::jwt::decode_unverified(body).map_err(resolution_error)?
        };
        serde_json::from_value(value).map_err(resolution_error)
    }

    async fn presentation_definition(
        &self,
        params: &AuthorizationRequestParams,
    ) -> Result<Option<PresentationDefinition>, AgentError> {
        match (&params.presentation_definition, &params.presentation_definition_uri) {
            (Some(Value::String(json)), _) => {
                Ok(Some(serde_json::from_str(json).map_err(resolution_error)?))
            }
            (Some(value), _) => Ok(Some(
                serde_json::from_value(value.clone()).map_err(resolution_error)?,
            )),
            (None, Some(uri)) => {
                let json = self.get_text(uri).await.map_err(resolution_error)?;
                Ok(Some(serde_json::from_str(&json).map_err(resolution_error)?))
            }
            (None, None) => Ok(None),
        }
    }

    /// Resolves an authorization request link into a presentation request.
    pub async fn resolve(&self, link: &str) -> Result<ResolvedAuthorizationRequest, AgentError> {
        let outer = parse_request(link)?;
        let params = match outer.request_uri.clone() {
            Some(uri) => {
                let mut inner = self.request_object(&uri).await?;
                if inner.client_id.is_none() {
                    inner.client_id = outer.client_id.clone();
                }
                inner
            }
            None => outer,
        };
        let presentation_definition = self.presentation_definition(&params).await?;
        let client_id = params.client_id.ok_or_else(|| {
            AgentError::PresentationResolution("Authorization request has no client_id.".to_string())
        })?;
        Ok(ResolvedAuthorizationRequest {
            client_id,
            response_uri: params.response_uri.or(params.redirect_uri),
            response_mode: params.response_mode,
            nonce: params.nonce,
            state: params.state,
            presentation_definition,
        })
    }

    /// Posts the selected credentials, each signed over with the matching key in `keys`, and
    /// returns the verifier's response as received.
    pub async fn submit(
        &self,
        request: &ResolvedAuthorizationRequest,
        selected: &SelectedCredentials,
        keys: &[JWK],
    ) -> Result<SubmissionResult, AgentError> {
        let response_mode = request.response_mode.as_deref().unwrap_or(DIRECT_POST);
        if response_mode != DIRECT_POST {
            return Err(AgentError::PresentationSubmission(format!(
                "Unsupported response mode: {}",
                response_mode
            )));
        }
        let response_uri = request.response_uri.as_deref().ok_or_else(|| {
            AgentError::PresentationSubmission("Authorization request has no response_uri.".to_string())
        })?;
        let nonce = request.nonce.as_deref().unwrap_or_default();

        let tokens = selected
            .credentials
            .iter()
            .zip(keys)
            .map(|(credential, jwk)| {
                with_key_binding(&credential.compact, jwk, &request.client_id, nonce)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(submission_error)?;
        let vp_token = match tokens.as_slice() {
            [single] => single.clone(),
            many => serde_json::to_string(many).map_err(submission_error)?,
        };
        let submission = serde_json::to_string(&PresentationSubmission::for_selection(selected))
            .map_err(submission_error)?;
        let mut form = vec![
            ("vp_token", vp_token),
            ("presentation_submission", submission),
        ];
        if let Some(state) = &request.state {
            form.push(("state", state.clone()));
        }

        let response = self
            .client
            .post(response_uri)
            .form(&form)
            .send()
            .await
            .map_err(submission_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(submission_error)?;
        info!("Verifier responded with status {}", status);
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(SubmissionResult {
            submitted: selected.credentials.clone(),
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_core::sd_jwt;
    use ddi_core::test_utils::issue_sd_jwt;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let pd = json!({"id": "pd-1", "input_descriptors": []}).to_string();
        let link = Url::parse_with_params(
            "openid4vp://",
            &[
                ("client_id", "https://verifier.example.com"),
                ("response_uri", "https://verifier.example.com/post"),
                ("response_mode", "direct_post"),
                ("nonce", "n-0S6_WzA2Mj"),
                ("presentation_definition", pd.as_str()),
            ],
        )
        .unwrap();
        let params = parse_request(link.as_str()).unwrap();
        assert_eq!(params.client_id.as_deref(), Some("https://verifier.example.com"));
        assert_eq!(params.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert_eq!(params.presentation_definition, Some(json!(pd)));
        assert!(params.request_uri.is_none());
    }

    #[tokio::test]
    async fn test_resolve_inline_request() {
        let pd = json!({"id": "pd-1", "input_descriptors": [{"id": "badge"}]}).to_string();
        let link = Url::parse_with_params(
            "openid4vp://",
            &[
                ("client_id", "verifier"),
                ("redirect_uri", "https://verifier.example.com/post"),
                ("state", "s-1"),
                ("presentation_definition", pd.as_str()),
            ],
        )
        .unwrap();
        let client = Openid4VpClient::new(reqwest::Client::new());
        let request = client.resolve(link.as_str()).await.unwrap();
        assert_eq!(request.client_id, "verifier");
        assert_eq!(
            request.response_uri.as_deref(),
            Some("https://verifier.example.com/post")
        );
        assert_eq!(request.state.as_deref(), Some("s-1"));
        assert_eq!(request.presentation_definition.unwrap().id, "pd-1");
    }

    #[tokio::test]
    async fn test_resolve_request_without_definition() {
        let client = Openid4VpClient::new(reqwest::Client::new());
        let request = client
            .resolve("openid4vp://?client_id=verifier&response_uri=https%3A%2F%2Fv.example.com")
            .await
            .unwrap();
        assert!(request.presentation_definition.is_none());
        assert!(client.resolve("openid4vp://?nonce=1").await.is_err());
    }

    #[test]
    fn test_key_binding() -> Result<(), Box<dyn std::error::Error>> {
        let jwk = JWK::generate_ed25519()?;
        let compact = issue_sd_jwt("Badge", &[("level", json!(1))], None);
        let presentation = with_key_binding(&compact, &jwk, "verifier", "nonce-1")?;
        let decoded = sd_jwt::decode(&presentation)?;
        let kb = decoded.key_binding_jwt.unwrap();

        let (header, payload) = ssi::jws::decode_verify(&kb, &jwk.to_public())?;
        assert_eq!(header.type_.as_deref(), Some(KB_JWT_TYPE));
        let claims: Value = serde_json::from_slice(&payload)?;
        assert_eq!(claims["aud"], "verifier");
        assert_eq!(claims["nonce"], "nonce-1");
        assert_eq!(claims["sd_hash"], json!(sha256_b64url(&compact)));
        Ok(())
    }
}
