//! Interfaces to the identity agent and presentation selector collaborators.
use crate::credential::{
    CredentialBinding, IssuedCredential, ResolvedCredentialOffer, StoredCredential,
};
use crate::did::{DidCreateOptions, DidCreateResult, DidError, DidMethod, DidRecord, PortableDid};
use crate::presentation::{
    PresentationDefinition, ResolvedAuthorizationRequest, SelectedCredentials, SelectionError,
    SubmissionResult,
};
use crate::sd_jwt::SdJwtError;
use async_trait::async_trait;
use ssi::did::Document;
use thiserror::Error;

/// An error reported by an identity agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// The agent (or its wallet) could not be initialized.
    #[error("Agent initialization failed: {0}")]
    InitializationFailure(String),
    #[error("DID creation failed: {0}")]
    DidCreation(String),
    /// The DID method does not support the requested operation.
    #[error("{0}")]
    UnsupportedDidOperation(String),
    #[error("DID method not supported by this agent: {0}")]
    UnsupportedDidMethod(DidMethod),
    #[error("DID not found: {0}")]
    DidNotFound(String),
    #[error("Failed to resolve credential offer: {0}")]
    OfferResolution(String),
    #[error("Failed to accept credential offer: {0}")]
    OfferAcceptance(String),
    #[error("Failed to resolve presentation request: {0}")]
    PresentationResolution(String),
    #[error("Failed to submit presentation: {0}")]
    PresentationSubmission(String),
    #[error("Wallet storage error: {0}")]
    Storage(String),
    #[error("Key not found for DID: {0}")]
    KeyNotFound(String),
    /// Wrapped DID error.
    #[error("DID error: {0}")]
    Did(#[from] DidError),
    /// Wrapped SD-JWT error.
    #[error("Credential error: {0}")]
    Credential(#[from] SdJwtError),
}

/// The identity agent owning DIDs, keys, credentials and the issuance and presentation
/// protocol exchanges.
#[async_trait]
pub trait IdentityAgent: Send + Sync {
    /// DIDs created by this agent in creation order, optionally restricted to one method.
    async fn created_dids(&self, method: Option<DidMethod>) -> Result<Vec<DidRecord>, AgentError>;

    async fn create_did(&self, options: DidCreateOptions) -> Result<DidCreateResult, AgentError>;

    async fn resolve_did(&self, did: &str) -> Result<Document, AgentError>;

    /// Replaces the document of a DID controlled by this agent.
    async fn update_did(&self, did: &str, document: Document) -> Result<(), AgentError>;

    /// Exports a controlled DID with its private keys.
    async fn export_did(&self, did: &str) -> Result<PortableDid, AgentError>;

    /// Imports a portable DID so the agent can sign with it again.
    async fn import_did(&self, portable: PortableDid) -> Result<DidRecord, AgentError>;

    /// Persists an SD-JWT VC in the wallet.
    async fn store_credential(&self, compact: &str) -> Result<StoredCredential, AgentError>;

    /// Stored credentials in storage order.
    async fn credentials(&self) -> Result<Vec<StoredCredential>, AgentError>;

    async fn resolve_credential_offer(
        &self,
        offer: &str,
    ) -> Result<ResolvedCredentialOffer, AgentError>;

    /// Accepts a resolved offer with credentials bound to the given holder key.
    async fn accept_credential_offer(
        &self,
        offer: &ResolvedCredentialOffer,
        binding: &CredentialBinding,
    ) -> Result<Vec<IssuedCredential>, AgentError>;

    async fn resolve_authorization_request(
        &self,
        request: &str,
    ) -> Result<ResolvedAuthorizationRequest, AgentError>;

    /// Submits the selected credentials and returns the verifier's response.
    async fn accept_authorization_request(
        &self,
        request: &ResolvedAuthorizationRequest,
        selected: &SelectedCredentials,
    ) -> Result<SubmissionResult, AgentError>;
}

/// Chooses which stored credentials (and which of their disclosures) satisfy a
/// presentation definition.
pub trait PresentationSelector: Send + Sync {
    fn select_credentials(
        &self,
        definition: &PresentationDefinition,
        credentials: &[StoredCredential],
    ) -> Result<SelectedCredentials, SelectionError>;
}
