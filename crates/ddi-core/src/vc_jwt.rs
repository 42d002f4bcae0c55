//! VC-JWT credentials and VP-JWT presentations signed with DID keys.
use crate::did::PortableDid;
use crate::presentation::{
    Constraints, DescriptorMapEntry, Field, InputDescriptor, PathSelector,
    PresentationDefinition, PresentationSubmission, SelectionError,
};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use ssi::did::{Document, VerificationMethod};
use ssi::jwk::JWK;
use ssi::jws::Header;
use ssi::ldp::LinkedDataDocument;
use ssi::one_or_many::OneOrMany;
use ssi::vc::{Credential, CredentialOrJWT, Presentation, URI};
use thiserror::Error;

/// Format identifier of a VC-JWT in a presentation submission.
pub const VC_JWT_FORMAT: &str = "jwt_vc";
pub const JWT_TYPE: &str = "JWT";
pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";
pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";

/// Credential type issued at the workshop.
pub const WORKSHOP_CREDENTIAL_TYPE: &str = "WorkshopCompletionCredential";
pub const WORKSHOP_DEFINITION_ID: &str = "ddi-workshop-attendance";
/// Path of the claim the workshop presentation definition asks for.
pub const EXPERTISE_LEVEL_PATH: &str = "$.vc.credentialSubject.expertiseLevel";

/// An error relating to VC-JWTs and VP-JWTs.
#[derive(Error, Debug)]
pub enum VcJwtError {
    #[error("Malformed JWT: expected three dot separated parts.")]
    MalformedJwt,
    #[error("Invalid {0} claims: {1}")]
    InvalidClaims(&'static str, String),
    /// Wrapped SSI error raised while signing.
    #[error("Signing failed: {0}")]
    Signing(String),
    /// None of the DID's private keys matches a verification method of its document.
    #[error("No signing key for DID: {0}")]
    NoSigningKey(String),
    #[error("Invalid signature for key {0}: {1}")]
    InvalidSignature(String, String),
    #[error("Verification method {0} not found in the document of {1}.")]
    VerificationMethodNotFound(String, String),
    #[error("Key {kid} does not belong to {did}.")]
    ForeignKey { kid: String, did: String },
    #[error("Credential subject {subject} is not the presentation holder {holder}.")]
    SubjectMismatch { subject: String, holder: String },
    #[error("No credentials.")]
    NoCredentials,
    /// Wrapped presentation definition error.
    #[error("{0}")]
    Selection(#[from] SelectionError),
}

/// A DID together with the private key and verification method id used to sign JWTs.
#[derive(Debug, Clone)]
pub struct JwtSigner {
    pub did: String,
    pub key_id: String,
    jwk: JWK,
}

impl JwtSigner {
    pub fn new(did: &str, key_id: &str, jwk: JWK) -> Self {
        Self {
            did: did.to_string(),
            key_id: key_id.to_string(),
            jwk,
        }
    }

    /// Picks the first private key published as a `publicKeyJwk` verification method.
    pub fn from_portable(portable: &PortableDid) -> Result<Self, VcJwtError> {
        portable
            .private_keys
            .iter()
            .find_map(|jwk| {
                let public = jwk.to_public();
                verification_methods(&portable.document)
                    .find(|(_, key)| key.params == public.params)
                    .map(|(id, _)| {
                        let key_id = absolute_key_id(&portable.uri, id);
                        Self::new(&portable.uri, &key_id, jwk.clone())
                    })
            })
            .ok_or_else(|| VcJwtError::NoSigningKey(portable.uri.clone()))
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, VcJwtError> {
        let header: Header = serde_json::from_value(json!({
            "alg": "EdDSA",
            "typ": JWT_TYPE,
            "kid": self.key_id
        }))
        .map_err(|e| VcJwtError::Signing(e.to_string()))?;
        let payload =
            serde_json::to_string(claims).map_err(|e| VcJwtError::Signing(e.to_string()))?;
        ssi::jws::encode_sign_custom_header(&payload, &self.jwk, &header)
            .map_err(|e| VcJwtError::Signing(e.to_string()))
    }
}

/// Verification methods of a document carrying a `publicKeyJwk`.
fn verification_methods<'a>(
    document: &'a Document,
) -> impl Iterator<Item = (&'a str, &'a JWK)> + 'a {
    document
        .verification_method
        .iter()
        .flatten()
        .filter_map(|method| match method {
            VerificationMethod::Map(map) => map
                .public_key_jwk
                .as_ref()
                .map(|jwk| (map.id.as_str(), jwk)),
            _ => None,
        })
}

/// Resolves a fragment-only key id (`#key-1`) against the DID.
fn absolute_key_id(did: &str, key_id: &str) -> String {
    if key_id.starts_with('#') {
        format!("{did}{key_id}")
    } else {
        key_id.to_string()
    }
}

/// Public key of the verification method `kid` in the document.
pub fn verification_key(document: &Document, kid: &str) -> Result<JWK, VcJwtError> {
    verification_methods(document)
        .find(|(id, _)| absolute_key_id(&document.id, id) == kid)
        .map(|(_, jwk)| jwk.clone())
        .ok_or_else(|| {
            VcJwtError::VerificationMethodNotFound(kid.to_string(), document.id.clone())
        })
}

fn new_id() -> String {
    format!("urn:uuid:{}", uuid::Uuid::new_v4())
}

/// JWT claims of a VC-JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcJwtClaims {
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub nbf: i64,
    pub vc: Credential,
}

/// JWT claims of a VP-JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpJwtClaims {
    pub iss: String,
    pub jti: String,
    pub nbf: i64,
    pub vp: Presentation,
}

/// Issues a VC-JWT of `type_` about `subject` with `data` as the subject claims.
pub fn issue_vc_jwt(
    signer: &JwtSigner,
    subject: &str,
    type_: &str,
    data: Map<String, Value>,
) -> Result<String, VcJwtError> {
    let now = Utc::now();
    let mut credential_subject = data;
    credential_subject.insert("id".to_string(), json!(subject));
    let id = new_id();
    let credential = json!({
        "@context": [CREDENTIALS_V1_CONTEXT],
        "id": id,
        "type": [VERIFIABLE_CREDENTIAL_TYPE, type_],
        "issuer": signer.did,
        "issuanceDate": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        "credentialSubject": credential_subject
    });
    let vc = Credential::from_json_unsigned(&credential.to_string())
        .map_err(|e| VcJwtError::InvalidClaims("credential", e.to_string()))?;
    signer.sign(&VcJwtClaims {
        iss: signer.did.clone(),
        sub: subject.to_string(),
        jti: id,
        nbf: now.timestamp(),
        vc,
    })
}

/// Chooses one VC-JWT per input descriptor and describes the choice as a submission
/// whose paths index the presentation's `verifiableCredential` array.
pub fn satisfy_definition(
    definition: &PresentationDefinition,
    vc_jwts: &[String],
) -> Result<(Vec<String>, PresentationSubmission), VcJwtError> {
    if vc_jwts.is_empty() {
        return Err(VcJwtError::NoCredentials);
    }
    let payloads = vc_jwts
        .iter()
        .map(|jwt| decode_payload(jwt))
        .collect::<Result<Vec<Value>, _>>()?;
    let chosen = PathSelector.match_descriptors(definition, &payloads)?;

    let mut selected: Vec<String> = Vec::new();
    let mut descriptor_map = Vec::new();
    for (descriptor, index) in definition.input_descriptors.iter().zip(chosen) {
        let jwt = &vc_jwts[index];
        let position = match selected.iter().position(|s| s == jwt) {
            Some(position) => position,
            None => {
                selected.push(jwt.clone());
                selected.len() - 1
            }
        };
        descriptor_map.push(DescriptorMapEntry {
            id: descriptor.id.clone(),
            format: VC_JWT_FORMAT.to_string(),
            path: format!("$.verifiableCredential[{position}]"),
        });
    }
    let submission = PresentationSubmission {
        id: uuid::Uuid::new_v4().to_string(),
        definition_id: definition.id.clone(),
        descriptor_map,
    };
    Ok((selected, submission))
}

/// Builds and signs a VP-JWT holding the VC-JWTs that satisfy the definition.
pub fn create_vp_jwt(
    signer: &JwtSigner,
    definition: &PresentationDefinition,
    vc_jwts: &[String],
) -> Result<String, VcJwtError> {
    let (selected, submission) = satisfy_definition(definition, vc_jwts)?;
    let id = new_id();
    let vp: Presentation = serde_json::from_value(json!({
        "@context": [CREDENTIALS_V1_CONTEXT],
        "id": id,
        "type": [VERIFIABLE_PRESENTATION_TYPE],
        "holder": signer.did,
        "verifiableCredential": selected,
        "presentation_submission": submission
    }))
    .map_err(|e| VcJwtError::InvalidClaims("presentation", e.to_string()))?;
    signer.sign(&VpJwtClaims {
        iss: signer.did.clone(),
        jti: id,
        nbf: Utc::now().timestamp(),
        vp,
    })
}

/// The presentation definition asking for a workshop credential with an expertise level.
pub fn workshop_presentation_definition() -> PresentationDefinition {
    PresentationDefinition {
        id: WORKSHOP_DEFINITION_ID.to_string(),
        name: Some("DDI workshop attendance".to_string()),
        purpose: Some("Proving attendance at the DDI workshop".to_string()),
        input_descriptors: vec![InputDescriptor {
            id: "expertiseLevel".to_string(),
            name: None,
            purpose: None,
            constraints: Constraints {
                fields: vec![Field {
                    path: vec![EXPERTISE_LEVEL_PATH.to_string()],
                    filter: None,
                    optional: false,
                }],
                limit_disclosure: None,
            },
        }],
    }
}

fn decode_payload(jwt: &str) -> Result<Value, VcJwtError> {
    let (_, payload) =
        ssi::jws::decode_unverified(jwt).map_err(|_| VcJwtError::MalformedJwt)?;
    serde_json::from_slice(&payload).map_err(|_| VcJwtError::MalformedJwt)
}

/// A decoded, not yet verified, JWT whose claims identify the issuer's signing key.
#[derive(Debug, Clone)]
pub struct SignedJwt<T> {
    pub jwt: String,
    /// DID of the `iss` claim.
    pub issuer: String,
    /// Absolute verification method id of the header `kid`.
    pub key_id: String,
    pub claims: T,
}

pub type SignedCredential = SignedJwt<VcJwtClaims>;
pub type SignedPresentation = SignedJwt<VpJwtClaims>;

impl<T: DeserializeOwned> SignedJwt<T> {
    /// Decodes the JWT and checks its key id belongs to the issuer DID.
    pub fn decode(jwt: &str, what: &'static str) -> Result<Self, VcJwtError> {
        let (header, payload) =
            ssi::jws::decode_unverified(jwt).map_err(|_| VcJwtError::MalformedJwt)?;
        let value: Value =
            serde_json::from_slice(&payload).map_err(|_| VcJwtError::MalformedJwt)?;
        let issuer = value
            .get("iss")
            .and_then(Value::as_str)
            .ok_or_else(|| VcJwtError::InvalidClaims(what, "missing iss".to_string()))?
            .to_string();
        let kid = header
            .key_id
            .ok_or_else(|| VcJwtError::InvalidClaims(what, "missing kid".to_string()))?;
        let key_id = absolute_key_id(&issuer, &kid);
        if key_id.split('#').next() != Some(issuer.as_str()) {
            return Err(VcJwtError::ForeignKey {
                kid: key_id,
                did: issuer,
            });
        }
        let claims = serde_json::from_value(value)
            .map_err(|e| VcJwtError::InvalidClaims(what, e.to_string()))?;
        Ok(Self {
            jwt: jwt.to_string(),
            issuer,
            key_id,
            claims,
        })
    }

    /// Verifies the signature with the key the issuer's document publishes under `kid`.
    pub fn verify(&self, document: &Document) -> Result<(), VcJwtError> {
        let jwk = verification_key(document, &self.key_id)?;
        ssi::jws::decode_verify(&self.jwt, &jwk)
            .map_err(|e| VcJwtError::InvalidSignature(self.key_id.clone(), e.to_string()))?;
        Ok(())
    }
}

impl SignedPresentation {
    /// The VC-JWTs embedded in the presentation.
    pub fn credential_jwts(&self) -> Vec<&str> {
        let credentials: Vec<&CredentialOrJWT> = match &self.claims.vp.verifiable_credential {
            Some(OneOrMany::One(credential)) => vec![credential],
            Some(OneOrMany::Many(credentials)) => credentials.iter().collect(),
            None => Vec::new(),
        };
        credentials
            .into_iter()
            .filter_map(|credential| match credential {
                CredentialOrJWT::JWT(jwt) => Some(jwt.as_str()),
                CredentialOrJWT::Credential(_) => None,
            })
            .collect()
    }

    /// The presentation holder, falling back to the JWT issuer.
    pub fn holder(&self) -> String {
        match &self.claims.vp.holder {
            Some(URI::String(holder)) => holder.clone(),
            None => self.issuer.clone(),
        }
    }

    /// The `definition_id` of the embedded presentation submission, if any.
    pub fn definition_id(&self) -> Option<String> {
        self.claims
            .vp
            .property_set
            .as_ref()
            .and_then(|properties| properties.get("presentation_submission"))
            .and_then(|submission| submission.get("definition_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// A credential whose signature has been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedCredential {
    pub id: Option<String>,
    pub issuer: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub claims: Map<String, Value>,
}

impl VerifiedCredential {
    pub fn from_signed(signed: &SignedCredential) -> Result<Self, VcJwtError> {
        let vc = serde_json::to_value(&signed.claims.vc)
            .map_err(|e| VcJwtError::InvalidClaims("credential", e.to_string()))?;
        let types = match &vc["type"] {
            Value::String(type_) => vec![type_.clone()],
            Value::Array(types) => types
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let mut claims = vc["credentialSubject"]
            .as_object()
            .cloned()
            .unwrap_or_default();
        let subject = match claims.remove("id") {
            Some(Value::String(id)) => id,
            _ => signed.claims.sub.clone(),
        };
        Ok(Self {
            id: vc["id"].as_str().map(str::to_string),
            issuer: signed
                .claims
                .vc
                .get_issuer()
                .unwrap_or(signed.issuer.as_str())
                .to_string(),
            subject,
            types,
            claims,
        })
    }
}

/// A presentation whose holder signature and embedded credentials have been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedPresentation {
    pub holder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_id: Option<String>,
    pub credentials: Vec<VerifiedCredential>,
}
