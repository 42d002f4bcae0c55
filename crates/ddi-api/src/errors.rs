//! Error type and conversions.
use axum::{response::IntoResponse, Json};
use ddi_core::agent::AgentError;
use ddi_core::did::DidError;
use ddi_core::presentation::SelectionError;
use ddi_core::vc_jwt::VcJwtError;
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Expected outcomes that stop an operation before (or instead of) any agent failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusinessRuleViolation {
    /// An offer or presentation reference was empty.
    #[error("{0} must not be empty.")]
    EmptyReference(&'static str),
    /// The presentation request carries no presentation definition.
    #[error("Presentation request has no requirement set (presentation definition).")]
    NoRequirementSet,
    #[error("No did:key found in the wallet.")]
    NoDidKeyFound,
    /// No held VC-JWT matches an input descriptor.
    #[error("Verifiable credentials do not satisfy presentation definition: {0}")]
    DefinitionNotSatisfied(String),
}

/// DDI API error type.
#[derive(Error, Debug)]
pub enum DDIAPIError {
    #[error("Rejected: {0}")]
    Rejected(BusinessRuleViolation),
    #[error("DID creation failed: {0}")]
    DidCreationFailure(String),
    /// Message reported by the DID method, passed through verbatim.
    #[error("{0}")]
    UnsupportedDidOperation(String),
    #[error("Credential offer resolution failed: {0}")]
    OfferResolutionFailure(String),
    #[error("Presentation request resolution failed: {0}")]
    PresentationResolutionFailure(String),
    #[error("Identity agent error: {0}")]
    Agent(AgentError),
    #[error("Credential selection failed: {0}")]
    Selection(#[from] SelectionError),
    #[error("Identity agent call timed out after {0}s.")]
    Timeout(u64),
    /// Wrapped VC-JWT or VP-JWT error.
    #[error("Credential JWT error: {0}")]
    CredentialJwt(VcJwtError),
}

impl From<VcJwtError> for DDIAPIError {
    fn from(err: VcJwtError) -> Self {
        match err {
            VcJwtError::Selection(SelectionError::UnsatisfiedDescriptor(id)) => {
                BusinessRuleViolation::DefinitionNotSatisfied(id).into()
            }
            VcJwtError::NoCredentials => {
                BusinessRuleViolation::DefinitionNotSatisfied("no credentials".to_string()).into()
            }
            err => DDIAPIError::CredentialJwt(err),
        }
    }
}

impl From<BusinessRuleViolation> for DDIAPIError {
    fn from(rule: BusinessRuleViolation) -> Self {
        DDIAPIError::Rejected(rule)
    }
}

impl From<AgentError> for DDIAPIError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::UnsupportedDidOperation(msg) => DDIAPIError::UnsupportedDidOperation(msg),
            AgentError::DidCreation(msg) => DDIAPIError::DidCreationFailure(msg),
            AgentError::OfferResolution(msg) => DDIAPIError::OfferResolutionFailure(msg),
            AgentError::PresentationResolution(msg) => {
                DDIAPIError::PresentationResolutionFailure(msg)
            }
            err => DDIAPIError::Agent(err),
        }
    }
}

impl From<DidError> for DDIAPIError {
    fn from(err: DidError) -> Self {
        DDIAPIError::Agent(AgentError::Did(err))
    }
}

impl DDIAPIError {
    /// Whether the error is an expected business rule outcome rather than a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DDIAPIError::Rejected(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DDIAPIError::Rejected(_) => StatusCode::BAD_REQUEST,
            DDIAPIError::UnsupportedDidOperation(_)
            | DDIAPIError::Agent(AgentError::UnsupportedDidMethod(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DDIAPIError::OfferResolutionFailure(_)
            | DDIAPIError::PresentationResolutionFailure(_) => StatusCode::BAD_GATEWAY,
            DDIAPIError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DDIAPIError::Agent(AgentError::DidNotFound(_)) => StatusCode::NOT_FOUND,
            DDIAPIError::CredentialJwt(VcJwtError::Signing(_))
            | DDIAPIError::CredentialJwt(VcJwtError::NoSigningKey(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DDIAPIError::CredentialJwt(_) => StatusCode::BAD_REQUEST,
            DDIAPIError::DidCreationFailure(_)
            | DDIAPIError::Agent(_)
            | DDIAPIError::Selection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Make DDIAPIError suitable for axum responses.
impl IntoResponse for DDIAPIError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
