//! Credential orchestrator: the use cases behind the CLI and HTTP surfaces.
use crate::errors::{BusinessRuleViolation, DDIAPIError};
use crate::DEFAULT_AGENT_TIMEOUT_SECS;
use ddi_core::agent::{AgentError, IdentityAgent, PresentationSelector};
use ddi_core::credential::{
    ClaimDecodeFailure, CredentialBinding, CredentialListing, StoredCredential,
};
use ddi_core::did::{
    append_service, peer_did_template, DidCreateOptions, DidMethod, DidRecord, KeyType,
    PeerNumAlgo, PortableDid,
};
use ddi_core::presentation::{PresentationDefinition, SubmissionResult};
use ddi_core::vc_jwt::{
    self, JwtSigner, SignedCredential, SignedPresentation, VcJwtError, VerifiedCredential,
    VerifiedPresentation,
};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use ssi::did::{Document, Service};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Sequences identity agent and presentation selector calls into the workshop use cases.
///
/// Reading-or-creating the holder DID and appending credentials are serialised by a
/// per-wallet lock, and every agent call is bounded by a timeout.
pub struct CredentialOrchestrator {
    agent: Arc<dyn IdentityAgent>,
    selector: Arc<dyn PresentationSelector>,
    wallet_lock: Mutex<()>,
    timeout: Duration,
}

fn non_empty<'a>(reference: &'a str, name: &'static str) -> Result<&'a str, DDIAPIError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(BusinessRuleViolation::EmptyReference(name).into());
    }
    Ok(reference)
}

fn created_did(did: Option<String>, method: DidMethod) -> Result<String, DDIAPIError> {
    did.ok_or_else(|| {
        DDIAPIError::DidCreationFailure(format!(
            "Agent reported no identifier for the created did:{method}."
        ))
    })
}

impl CredentialOrchestrator {
    pub fn new(agent: Arc<dyn IdentityAgent>, selector: Arc<dyn PresentationSelector>) -> Self {
        Self {
            agent,
            selector,
            wallet_lock: Mutex::new(()),
            timeout: Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS),
        }
    }

    /// Sets the bound on each agent call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, DDIAPIError>
    where
        F: Future<Output = Result<T, AgentError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(DDIAPIError::from),
            Err(_) => Err(DDIAPIError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn first_key_did(&self) -> Result<Option<String>, DDIAPIError> {
        let dids = self
            .bounded(self.agent.created_dids(Some(DidMethod::Key)))
            .await?;
        Ok(dids.into_iter().next().map(|record| record.did))
    }

    /// Returns the first did:key in the wallet, creating an Ed25519 one if there is none.
    pub async fn get_or_create_holder_did(&self) -> Result<String, DDIAPIError> {
        let _guard = self.wallet_lock.lock().await;
        if let Some(did) = self.first_key_did().await? {
            debug!("Reusing holder DID {}", did);
            return Ok(did);
        }
        let result = self
            .bounded(self.agent.create_did(DidCreateOptions::Key {
                key_type: KeyType::Ed25519,
            }))
            .await?;
        let did = created_did(result.did, DidMethod::Key)?;
        info!("Created holder DID {}", did);
        Ok(did)
    }

    /// Returns the first did:key in the wallet, never creating one.
    pub async fn reuse_existing_did_key(&self) -> Result<String, DDIAPIError> {
        self.first_key_did()
            .await?
            .ok_or_else(|| BusinessRuleViolation::NoDidKeyFound.into())
    }

    /// Registers a did:peer (numalgo 4) with a single DIDComm service keyed by `base_key`.
    pub async fn create_peer_did(&self, base_key: &str) -> Result<String, DDIAPIError> {
        let document = peer_did_template(base_key)?;
        let result = self
            .bounded(self.agent.create_did(DidCreateOptions::Peer {
                document,
                num_algo: PeerNumAlgo::ShortFormAndLongForm,
            }))
            .await?;
        let did = created_did(result.did, DidMethod::Peer)?;
        info!("Created peer DID {}", did);
        Ok(did)
    }

    /// Appends a service to the current document of `did` and requests an update.
    pub async fn add_service(&self, did: &str, service: Service) -> Result<Document, DDIAPIError> {
        let mut document = self.bounded(self.agent.resolve_did(did)).await?;
        append_service(&mut document, service);
        self.bounded(self.agent.update_did(did, document.clone()))
            .await?;
        info!("Added service to {}", did);
        Ok(document)
    }

    /// Creates a DID with the given method. A peer DID is derived from the holder did:key.
    pub async fn create_did(&self, method: DidMethod) -> Result<String, DDIAPIError> {
        match method {
            DidMethod::Key => {
                let result = self
                    .bounded(self.agent.create_did(DidCreateOptions::Key {
                        key_type: KeyType::Ed25519,
                    }))
                    .await?;
                created_did(result.did, DidMethod::Key)
            }
            DidMethod::Peer => {
                let base_key = self.get_or_create_holder_did().await?;
                self.create_peer_did(&base_key).await
            }
            DidMethod::Dht => {
                let result = self
                    .bounded(self.agent.create_did(DidCreateOptions::Dht {
                        key_type: KeyType::Ed25519,
                        services: vec![],
                    }))
                    .await?;
                created_did(result.did, DidMethod::Dht)
            }
        }
    }

    pub async fn resolve_did(&self, did: &str) -> Result<Document, DDIAPIError> {
        self.bounded(self.agent.resolve_did(did)).await
    }

    pub async fn created_dids(
        &self,
        method: Option<DidMethod>,
    ) -> Result<Vec<DidRecord>, DDIAPIError> {
        self.bounded(self.agent.created_dids(method)).await
    }

    pub async fn export_did(&self, did: &str) -> Result<PortableDid, DDIAPIError> {
        self.bounded(self.agent.export_did(did)).await
    }

    pub async fn import_did(&self, portable: PortableDid) -> Result<DidRecord, DDIAPIError> {
        self.bounded(self.agent.import_did(portable)).await
    }

    /// Receives the credentials of an offer bound to the holder did:key and stores those in
    /// SD-JWT compact form. Credentials in other formats are skipped.
    pub async fn accept_offer(
        &self,
        offer_reference: &str,
    ) -> Result<Vec<StoredCredential>, DDIAPIError> {
        let reference = non_empty(offer_reference, "Credential offer reference")?;
        let holder = self.get_or_create_holder_did().await?;
        let binding = CredentialBinding::from_key_did(&holder)?;
        let offer = self
            .bounded(self.agent.resolve_credential_offer(reference))
            .await?;
        debug!(
            "Resolved offer from {} with {} credential(s)",
            offer.credential_issuer,
            offer.offered.len()
        );
        let issued = self
            .bounded(self.agent.accept_credential_offer(&offer, &binding))
            .await?;

        let _guard = self.wallet_lock.lock().await;
        let mut stored = Vec::new();
        for credential in issued {
            match credential.compact() {
                Some(compact) => {
                    stored.push(self.bounded(self.agent.store_credential(compact)).await?)
                }
                None => debug!("Skipping credential not in SD-JWT form: {:?}", credential),
            }
        }
        info!("Stored {} credential(s)", stored.len());
        Ok(stored)
    }

    /// Lists stored credentials with their decoded claims, in storage order. A credential
    /// whose claims cannot be decoded is reported as a failure without hiding the others.
    pub async fn list_credentials(&self) -> Result<CredentialListing, DDIAPIError> {
        let credentials = self.bounded(self.agent.credentials()).await?;
        let mut listing = CredentialListing::default();
        for credential in credentials {
            match credential.view() {
                Ok(view) => listing.views.push(view),
                Err(error) => {
                    warn!("Failed to decode credential {}: {}", credential.id, error);
                    listing.failures.push(ClaimDecodeFailure {
                        id: credential.id,
                        error,
                    });
                }
            }
        }
        Ok(listing)
    }

    /// Answers a presentation request with the stored credentials chosen by the selector and
    /// returns the verifier's response unmodified.
    pub async fn present_credentials(
        &self,
        presentation_reference: &str,
    ) -> Result<SubmissionResult, DDIAPIError> {
        let reference = non_empty(presentation_reference, "Presentation request reference")?;
        let request = self
            .bounded(self.agent.resolve_authorization_request(reference))
            .await?;
        let definition = request
            .presentation_definition
            .as_ref()
            .ok_or(BusinessRuleViolation::NoRequirementSet)?;
        let credentials = self.bounded(self.agent.credentials()).await?;
        let selected = self
            .selector
            .select_credentials(definition, &credentials)?;
        debug!(
            "Selected {} credential(s) for {}",
            selected.credentials.len(),
            definition.id
        );
        let result = self
            .bounded(self.agent.accept_authorization_request(&request, &selected))
            .await?;
        info!(
            "Presented {} credential(s) to {}, status {}",
            result.submitted.len(),
            request.client_id,
            result.status
        );
        Ok(result)
    }

    /// Issues a VC-JWT about `subject`, signed with a key of the issuer DID.
    pub fn issue_credential(
        &self,
        issuer: &PortableDid,
        subject: &str,
        type_: &str,
        data: Map<String, Value>,
    ) -> Result<String, DDIAPIError> {
        let subject = non_empty(subject, "Credential subject")?;
        let signer = JwtSigner::from_portable(issuer)?;
        let jwt = vc_jwt::issue_vc_jwt(&signer, subject, type_, data)?;
        info!("Issued {} from {} to {}", type_, issuer.uri, subject);
        Ok(jwt)
    }

    /// Checks the held VC-JWTs satisfy the definition and returns them in a VP-JWT signed
    /// by the holder.
    pub fn create_presentation(
        &self,
        holder: &PortableDid,
        definition: &PresentationDefinition,
        vc_jwts: &[String],
    ) -> Result<String, DDIAPIError> {
        definition.validate().map_err(VcJwtError::from)?;
        let signer = JwtSigner::from_portable(holder)?;
        let vp_jwt = vc_jwt::create_vp_jwt(&signer, definition, vc_jwts)?;
        info!("Created presentation for {} by {}", definition.id, holder.uri);
        Ok(vp_jwt)
    }

    /// Verifies a VP-JWT: the holder signature, then each embedded VC-JWT's issuer
    /// signature, and that every credential is about the holder.
    pub async fn verify_presentation(
        &self,
        vp_jwt: &str,
    ) -> Result<VerifiedPresentation, DDIAPIError> {
        let vp_jwt = non_empty(vp_jwt, "Presentation")?;
        let presentation = SignedPresentation::decode(vp_jwt, "presentation")?;
        let holder = presentation.holder();
        if holder != presentation.issuer {
            return Err(VcJwtError::InvalidClaims(
                "presentation",
                format!("holder {} is not the signer {}", holder, presentation.issuer),
            )
            .into());
        }
        let document = self.resolve_did(&holder).await?;
        presentation.verify(&document)?;
        debug!("Verified presentation signature of {}", holder);

        let jwts = presentation.credential_jwts();
        if jwts.is_empty() {
            return Err(VcJwtError::NoCredentials.into());
        }
        let mut credentials = Vec::new();
        for jwt in jwts {
            let credential = SignedCredential::decode(jwt, "credential")?;
            let document = self.resolve_did(&credential.issuer).await?;
            credential.verify(&document)?;
            let verified = VerifiedCredential::from_signed(&credential)?;
            if verified.subject != holder {
                return Err(VcJwtError::SubjectMismatch {
                    subject: verified.subject,
                    holder,
                }
                .into());
            }
            credentials.push(verified);
        }
        info!(
            "Verified presentation of {} credential(s) held by {}",
            credentials.len(),
            holder
        );
        Ok(VerifiedPresentation {
            holder,
            definition_id: presentation.definition_id(),
            credentials,
        })
    }
}
