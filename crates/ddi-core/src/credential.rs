//! Stored credentials, their display view and credential offer types.
use crate::did::{key_verification_method, DidError};
use crate::sd_jwt::{self, SdJwtError};
use crate::DEFAULT_CREDENTIAL_TYPE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Format of the human readable `createdAt` in credential views.
pub const CREATED_AT_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

/// A credential held by the wallet in SD-JWT compact form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub created_at: DateTime<Utc>,
    pub compact: String,
}

impl StoredCredential {
    /// Creates a new record for an SD-JWT compact string with a fresh id, reading the
    /// declared type from the `vct` claim.
    pub fn new(compact: &str) -> Result<Self, SdJwtError> {
        let decoded = sd_jwt::decode(compact)?;
        let type_ = decoded
            .credential_type()
            .unwrap_or(DEFAULT_CREDENTIAL_TYPE)
            .to_string();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            type_,
            created_at: Utc::now(),
            compact: compact.trim().to_string(),
        })
    }

    pub fn claims(&self) -> Result<Map<String, Value>, SdJwtError> {
        sd_jwt::claims(&self.compact)
    }

    pub fn view(&self) -> Result<CredentialView, SdJwtError> {
        Ok(CredentialView {
            id: self.id.clone(),
            type_: self.type_.clone(),
            created_at: self.created_at.format(CREATED_AT_FORMAT).to_string(),
            sd_jwt: self.compact.clone(),
            claims: self.claims()?,
        })
    }
}

/// Display projection of a stored credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialView {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub created_at: String,
    pub sd_jwt: String,
    pub claims: Map<String, Value>,
}

/// A stored credential whose claims could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDecodeFailure {
    pub id: String,
    pub error: SdJwtError,
}

/// Result of listing credentials: decodable views in storage order plus per-credential failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialListing {
    pub views: Vec<CredentialView>,
    pub failures: Vec<ClaimDecodeFailure>,
}

/// Holder binding for credential issuance: a did:key and its verification method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBinding {
    pub did: String,
    pub verification_method: String,
}

impl CredentialBinding {
    pub fn from_key_did(did: &str) -> Result<Self, DidError> {
        Ok(Self {
            did: did.to_string(),
            verification_method: key_verification_method(did)?,
        })
    }
}

/// A credential configuration offered by an issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferedCredential {
    pub configuration_id: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,
}

/// A credential offer with the issuer metadata needed to accept it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCredentialOffer {
    pub credential_issuer: String,
    pub offered: Vec<OfferedCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_authorized_code: Option<String>,
    #[serde(default)]
    pub tx_code_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_endpoint: Option<String>,
}

/// A credential yielded by an issuer.
#[derive(Debug, Clone, PartialEq)]
pub enum IssuedCredential {
    SdJwtVc { compact: String },
    Other { format: String, credential: Value },
}

impl IssuedCredential {
    /// The SD-JWT compact form, if the credential is an SD-JWT VC.
    pub fn compact(&self) -> Option<&str> {
        match self {
            IssuedCredential::SdJwtVc { compact } => Some(compact),
            IssuedCredential::Other { .. } => None,
        }
    }
}
