//! Utilities for tests: an in-memory identity agent and an unsigned SD-JWT issuer.
use crate::agent::{AgentError, IdentityAgent};
use crate::credential::{
    CredentialBinding, IssuedCredential, ResolvedCredentialOffer, StoredCredential,
};
use crate::did::{
    append_service, bare_document, DidCreateOptions, DidCreateResult, DidMethod, DidRecord,
    PortableDid,
};
use crate::presentation::{ResolvedAuthorizationRequest, SelectedCredentials, SubmissionResult};
use crate::sd_jwt::{b64url_encode, sha256_b64url, SD_ALG_KEY, SD_DIGESTS_KEY, SHA_256};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use ssi::did::Document;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Issuer used in the payload of test SD-JWTs.
pub const TEST_ISSUER: &str = "https://issuer.example.com";

/// Encodes a disclosure `[salt, name, value]` (or `[salt, value]` without a name).
pub fn encode_disclosure(salt: &str, name: Option<&str>, value: &Value) -> String {
    let array = match name {
        Some(name) => json!([salt, name, value]),
        None => json!([salt, value]),
    };
    b64url_encode(array.to_string())
}

/// Issues an SD-JWT VC of type `vct` with every claim selectively disclosable. The
/// signature is a placeholder: claim projection never verifies it.
pub fn issue_sd_jwt(vct: &str, claims: &[(&str, Value)], holder_kid: Option<&str>) -> String {
    let disclosures: Vec<String> = claims
        .iter()
        .enumerate()
        .map(|(i, (name, value))| encode_disclosure(&format!("salt-{i}-{name}"), Some(*name), value))
        .collect();
    let digests: Vec<String> = disclosures.iter().map(|d| sha256_b64url(d)).collect();
    let mut payload = Map::new();
    payload.insert("iss".to_string(), json!(TEST_ISSUER));
    payload.insert("iat".to_string(), json!(1_700_000_000));
    payload.insert("vct".to_string(), json!(vct));
    payload.insert(SD_DIGESTS_KEY.to_string(), json!(digests));
    payload.insert(SD_ALG_KEY.to_string(), json!(SHA_256));
    if let Some(kid) = holder_kid {
        payload.insert("cnf".to_string(), json!({ "kid": kid }));
    }
    let header = json!({"alg": "EdDSA", "typ": "vc+sd-jwt"});
    let mut compact = format!(
        "{}.{}.{}",
        b64url_encode(header.to_string()),
        b64url_encode(Value::Object(payload).to_string()),
        b64url_encode("signature")
    );
    for disclosure in disclosures {
        compact.push('~');
        compact.push_str(&disclosure);
    }
    compact.push('~');
    compact
}

#[derive(Default)]
struct State {
    dids: Vec<DidRecord>,
    credentials: Vec<StoredCredential>,
    offers: HashMap<String, (ResolvedCredentialOffer, Vec<IssuedCredential>)>,
    requests: HashMap<String, ResolvedAuthorizationRequest>,
    bindings: Vec<CredentialBinding>,
    submissions: Vec<SelectedCredentials>,
    did_creations: usize,
}

/// Identity agent keeping everything in memory, with scripted offers and presentation
/// requests. DIDs are not backed by keys.
#[derive(Default)]
pub struct InMemoryAgent {
    state: Mutex<State>,
    omit_created_did: bool,
}

impl InMemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts an offer reference resolving to `offer` and yielding `issued` when accepted.
    pub fn with_offer(
        self,
        reference: &str,
        offer: ResolvedCredentialOffer,
        issued: Vec<IssuedCredential>,
    ) -> Self {
        self.state()
            .offers
            .insert(reference.to_string(), (offer, issued));
        self
    }

    /// Scripts a presentation request reference.
    pub fn with_authorization_request(
        self,
        reference: &str,
        request: ResolvedAuthorizationRequest,
    ) -> Self {
        self.state()
            .requests
            .insert(reference.to_string(), request);
        self
    }

    /// Makes DID creation report success without an identifier.
    pub fn omitting_created_did(mut self) -> Self {
        self.omit_created_did = true;
        self
    }

    /// Number of DIDs created.
    pub fn did_creations(&self) -> usize {
        self.state().did_creations
    }

    /// Holder bindings of accepted offers, in order.
    pub fn bindings(&self) -> Vec<CredentialBinding> {
        self.state().bindings.clone()
    }

    /// Selections submitted to verifiers, in order.
    pub fn submissions(&self) -> Vec<SelectedCredentials> {
        self.state().submissions.clone()
    }

    fn state(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// SD-JWT VC offer for scripting with [`InMemoryAgent::with_offer`].
pub fn test_offer(credential_type: &str) -> ResolvedCredentialOffer {
    ResolvedCredentialOffer {
        credential_issuer: TEST_ISSUER.to_string(),
        offered: vec![crate::credential::OfferedCredential {
            configuration_id: credential_type.to_string(),
            format: crate::SD_JWT_VC_FORMAT.to_string(),
            credential_type: Some(credential_type.to_string()),
        }],
        pre_authorized_code: Some("pre-authorized-code".to_string()),
        tx_code_required: false,
        token_endpoint: None,
        credential_endpoint: None,
    }
}

#[async_trait]
impl IdentityAgent for InMemoryAgent {
    async fn created_dids(&self, method: Option<DidMethod>) -> Result<Vec<DidRecord>, AgentError> {
        let dids = self.state().dids.clone();
        // Suspend so concurrent callers interleave as they would with a real agent.
        tokio::task::yield_now().await;
        Ok(dids
            .into_iter()
            .filter(|record| method.map_or(true, |m| record.method == m))
            .collect())
    }

    async fn create_did(&self, options: DidCreateOptions) -> Result<DidCreateResult, AgentError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.did_creations += 1;
        let n = state.did_creations;
        let method = options.method();
        let did = match method {
            DidMethod::Key => format!("did:key:z6MkInMemory{n}"),
            DidMethod::Peer => format!("did:peer:4zQmInMemory{n}"),
            DidMethod::Dht => format!("did:dht:inmemory{n}"),
        };
        let document = match options {
            DidCreateOptions::Peer { mut document, .. } => {
                document.id = did.clone();
                document
            }
            DidCreateOptions::Dht { services, .. } => {
                let mut document = bare_document(&did)?;
                for service in services {
                    append_service(&mut document, service);
                }
                document
            }
            DidCreateOptions::Key { .. } => bare_document(&did)?,
        };
        state.dids.push(DidRecord {
            did: did.clone(),
            method,
            document: Some(document.clone()),
            created_at: Utc::now(),
        });
        if self.omit_created_did {
            return Ok(DidCreateResult::default());
        }
        Ok(DidCreateResult {
            did: Some(did),
            document: Some(document),
        })
    }

    async fn resolve_did(&self, did: &str) -> Result<Document, AgentError> {
        self.state()
            .dids
            .iter()
            .find(|record| record.did == did)
            .and_then(|record| record.document.clone())
            .ok_or_else(|| AgentError::DidNotFound(did.to_string()))
    }

    async fn update_did(&self, did: &str, document: Document) -> Result<(), AgentError> {
        let mut state = self.state();
        let record = state
            .dids
            .iter_mut()
            .find(|record| record.did == did)
            .ok_or_else(|| AgentError::DidNotFound(did.to_string()))?;
        match record.method {
            DidMethod::Dht => {
                record.document = Some(document);
                Ok(())
            }
            method => Err(AgentError::UnsupportedDidOperation(format!(
                "did:{method} documents are immutable and cannot be updated"
            ))),
        }
    }

    async fn export_did(&self, did: &str) -> Result<PortableDid, AgentError> {
        let record = self
            .state()
            .dids
            .iter()
            .find(|record| record.did == did)
            .cloned()
            .ok_or_else(|| AgentError::DidNotFound(did.to_string()))?;
        let document = match record.document {
            Some(document) => document,
            None => bare_document(did)?,
        };
        Ok(PortableDid {
            uri: record.did,
            document,
            private_keys: vec![],
            metadata: Map::new(),
        })
    }

    async fn import_did(&self, portable: PortableDid) -> Result<DidRecord, AgentError> {
        let method = DidMethod::from_did(&portable.uri)
            .ok_or_else(|| AgentError::DidNotFound(portable.uri.clone()))?;
        let mut state = self.state();
        if let Some(existing) = state.dids.iter().find(|r| r.did == portable.uri) {
            return Ok(existing.clone());
        }
        let record = DidRecord {
            did: portable.uri,
            method,
            document: Some(portable.document),
            created_at: Utc::now(),
        };
        state.dids.push(record.clone());
        Ok(record)
    }

    async fn store_credential(&self, compact: &str) -> Result<StoredCredential, AgentError> {
        let credential = StoredCredential::new(compact)?;
        self.state().credentials.push(credential.clone());
        Ok(credential)
    }

    async fn credentials(&self) -> Result<Vec<StoredCredential>, AgentError> {
        Ok(self.state().credentials.clone())
    }

    async fn resolve_credential_offer(
        &self,
        offer: &str,
    ) -> Result<ResolvedCredentialOffer, AgentError> {
        self.state()
            .offers
            .get(offer)
            .map(|(resolved, _)| resolved.clone())
            .ok_or_else(|| AgentError::OfferResolution(format!("Unknown credential offer: {offer}")))
    }

    async fn accept_credential_offer(
        &self,
        offer: &ResolvedCredentialOffer,
        binding: &CredentialBinding,
    ) -> Result<Vec<IssuedCredential>, AgentError> {
        let mut state = self.state();
        let issued = state
            .offers
            .values()
            .find(|(resolved, _)| resolved == offer)
            .map(|(_, issued)| issued.clone())
            .ok_or_else(|| AgentError::OfferAcceptance("Offer was never resolved".to_string()))?;
        state.bindings.push(binding.clone());
        Ok(issued)
    }

    async fn resolve_authorization_request(
        &self,
        request: &str,
    ) -> Result<ResolvedAuthorizationRequest, AgentError> {
        self.state().requests.get(request).cloned().ok_or_else(|| {
            AgentError::PresentationResolution(format!("Unknown presentation request: {request}"))
        })
    }

    async fn accept_authorization_request(
        &self,
        _request: &ResolvedAuthorizationRequest,
        selected: &SelectedCredentials,
    ) -> Result<SubmissionResult, AgentError> {
        self.state().submissions.push(selected.clone());
        Ok(SubmissionResult {
            submitted: selected.credentials.clone(),
            status: 200,
            body: json!({ "status": "accepted" }),
        })
    }
}
