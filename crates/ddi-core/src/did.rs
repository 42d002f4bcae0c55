//! DID records, creation options and document helpers shared by every agent.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use ssi::did::{Document, Service, ServiceEndpoint};
use ssi::jwk::JWK;
use ssi::one_or_many::OneOrMany;
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

/// Service id of the single service in a peer DID template.
pub const DIDCOMM_SERVICE_ID: &str = "#didcomm";
/// Service type of the single service in a peer DID template.
pub const DIDCOMM_SERVICE_TYPE: &str = "did-communication";
/// Endpoint placed in peer DID templates until a mediator is configured.
pub const PLACEHOLDER_ENDPOINT: &str = "http://localhost:3010/didcomm";
pub const DIDCOMM_MESSAGING_TYPE: &str = "DIDCommMessaging";
/// Envelope profiles accepted by a `DIDCommMessaging` endpoint.
pub const DIDCOMM_ACCEPT: [&str; 2] = ["didcomm/v2", "didcomm/aip2;env=rfc587"];
/// Verification method id of the key in a peer DID template.
pub const PEER_KEY_ID: &str = "#key-1";

const DID_V1_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
const ED25519_2020_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// An error relating to DIDs and DID documents.
#[derive(Error, Debug)]
pub enum DidError {
    /// The DID does not use the key method.
    #[error("Not a did:key identifier: {0}")]
    NotKeyDid(String),
    /// The DID method is not known.
    #[error("Unknown DID method: {0}")]
    UnknownMethod(String),
    /// Wrapped serde JSON error.
    #[error("Invalid DID document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// DID methods the agent can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    Key,
    Peer,
    Dht,
}

impl DidMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DidMethod::Key => "key",
            DidMethod::Peer => "peer",
            DidMethod::Dht => "dht",
        }
    }

    /// Returns the method of a DID URI, if it is one of the supported methods.
    pub fn from_did(did: &str) -> Option<Self> {
        let mut parts = did.splitn(3, ':');
        match (parts.next(), parts.next()) {
            (Some("did"), Some(method)) => method.parse().ok(),
            _ => None,
        }
    }
}

impl Display for DidMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DidMethod {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "key" => Ok(DidMethod::Key),
            "peer" => Ok(DidMethod::Peer),
            "dht" => Ok(DidMethod::Dht),
            other => Err(DidError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    Ed25519,
}

/// Peer DID numeric algorithm. Only numalgo 4 (short form and long form) is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PeerNumAlgo {
    ShortFormAndLongForm,
}

/// Method specific options passed to an agent when creating a DID.
#[derive(Debug, Clone)]
pub enum DidCreateOptions {
    Key {
        key_type: KeyType,
    },
    Peer {
        document: Document,
        num_algo: PeerNumAlgo,
    },
    Dht {
        key_type: KeyType,
        services: Vec<Service>,
    },
}

impl DidCreateOptions {
    pub fn method(&self) -> DidMethod {
        match self {
            DidCreateOptions::Key { .. } => DidMethod::Key,
            DidCreateOptions::Peer { .. } => DidMethod::Peer,
            DidCreateOptions::Dht { .. } => DidMethod::Dht,
        }
    }
}

/// Outcome of a DID creation request. An agent may report success without an identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DidCreateResult {
    pub did: Option<String>,
    pub document: Option<Document>,
}

/// A DID created by (and controlled through) an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidRecord {
    pub did: String,
    pub method: DidMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    pub created_at: DateTime<Utc>,
}

/// Exported DID with the private keys needed to reconstruct signing capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableDid {
    pub uri: String,
    pub document: Document,
    pub private_keys: Vec<JWK>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Returns the multibase fingerprint of a did:key (the method specific id).
pub fn key_fingerprint(did: &str) -> Result<&str, DidError> {
    match did.strip_prefix("did:key:") {
        Some(fingerprint) if !fingerprint.is_empty() => {
            Ok(fingerprint.split('#').next().unwrap_or(fingerprint))
        }
        _ => Err(DidError::NotKeyDid(did.to_string())),
    }
}

/// Returns the verification method reference `did#fingerprint` of a did:key.
pub fn key_verification_method(did: &str) -> Result<String, DidError> {
    let fingerprint = key_fingerprint(did)?;
    Ok(format!("did:key:{fingerprint}#{fingerprint}"))
}

/// Makes a service with a single type and URI endpoint.
pub fn uri_service(id: &str, type_: &str, endpoint: &str) -> Service {
    Service {
        id: id.to_string(),
        type_: OneOrMany::One(type_.to_string()),
        service_endpoint: Some(OneOrMany::One(ServiceEndpoint::URI(endpoint.to_string()))),
        property_set: None,
    }
}

/// Makes a `DIDCommMessaging` service with an object endpoint `{uri, accept, routingKeys}`.
pub fn didcomm_messaging_service(id: &str, uri: &str, routing_keys: &[String]) -> Service {
    let endpoint = json!({
        "uri": uri,
        "accept": DIDCOMM_ACCEPT,
        "routingKeys": routing_keys
    });
    Service {
        id: id.to_string(),
        type_: OneOrMany::One(DIDCOMM_MESSAGING_TYPE.to_string()),
        service_endpoint: Some(OneOrMany::One(ServiceEndpoint::Map(endpoint))),
        property_set: None,
    }
}

/// Appends a service to a document, treating an absent service array as empty.
pub fn append_service(document: &mut Document, service: Service) {
    document.service.get_or_insert_with(Vec::new).push(service);
}

/// Builds the single service peer DID template derived from a did:key.
///
/// The template has one verification method (the did:key public key) and one
/// DIDComm service whose recipient and routing keys are the given key.
pub fn peer_did_template(base_key_did: &str) -> Result<Document, DidError> {
    let key_ref = key_verification_method(base_key_did)?;
    let fingerprint = key_fingerprint(base_key_did)?;
    let template = json!({
        "@context": [DID_V1_CONTEXT, ED25519_2020_CONTEXT],
        "id": "",
        "verificationMethod": [{
            "id": PEER_KEY_ID,
            "type": "Ed25519VerificationKey2020",
            "controller": "",
            "publicKeyMultibase": fingerprint
        }],
        "authentication": [PEER_KEY_ID],
        "assertionMethod": [PEER_KEY_ID],
        "service": [{
            "id": DIDCOMM_SERVICE_ID,
            "type": DIDCOMM_SERVICE_TYPE,
            "serviceEndpoint": PLACEHOLDER_ENDPOINT,
            "recipientKeys": [key_ref],
            "routingKeys": [key_ref],
            "priority": 0,
            "accept": ["didcomm/aip2;env=rfc19"]
        }]
    });
    Ok(serde_json::from_value(template)?)
}

/// Minimal document for a DID with no verification material, used by test agents.
pub fn bare_document(did: &str) -> Result<Document, DidError> {
    Ok(serde_json::from_value(json!({
        "@context": DID_V1_CONTEXT,
        "id": did
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY_DID: &str = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK";

    #[test]
    fn test_method_from_did() {
        assert_eq!(DidMethod::from_did(TEST_KEY_DID), Some(DidMethod::Key));
        assert_eq!(
            DidMethod::from_did("did:peer:4zQmabc:z123"),
            Some(DidMethod::Peer)
        );
        assert_eq!(DidMethod::from_did("did:dht:abc"), Some(DidMethod::Dht));
        assert_eq!(DidMethod::from_did("did:ion:abc"), None);
        assert_eq!(DidMethod::from_did("not-a-did"), None);
        assert!("web".parse::<DidMethod>().is_err());
    }

    #[test]
    fn test_key_verification_method() {
        assert_eq!(
            key_verification_method(TEST_KEY_DID).unwrap(),
            "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK#z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK"
        );
        assert!(key_verification_method("did:peer:4abc").is_err());
        assert!(key_fingerprint("did:key:").is_err());
    }

    #[test]
    fn test_peer_did_template() {
        let doc = peer_did_template(TEST_KEY_DID).unwrap();
        let services = doc.service.as_ref().unwrap();
        assert_eq!(services.len(), 1);
        let service = &services[0];
        assert_eq!(service.id, DIDCOMM_SERVICE_ID);
        assert_eq!(
            service.type_,
            OneOrMany::One(DIDCOMM_SERVICE_TYPE.to_string())
        );
        let properties = service.property_set.as_ref().unwrap();
        let key_ref = key_verification_method(TEST_KEY_DID).unwrap();
        assert_eq!(properties["recipientKeys"], json!([key_ref]));
        assert_eq!(properties["routingKeys"], json!([key_ref]));
    }

    #[test]
    fn test_append_service_to_document_without_services() {
        let mut doc = bare_document(TEST_KEY_DID).unwrap();
        assert!(doc.service.is_none());
        append_service(
            &mut doc,
            uri_service("#dwn", "DecentralizedWebNode", "https://dwn.example.com"),
        );
        let services = doc.service.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "#dwn");
    }

    #[test]
    fn test_didcomm_messaging_service() {
        let routing = vec!["did:key:z6Mkmediator#z6Mkmediator".to_string()];
        let service = didcomm_messaging_service("#didcomm-1", "https://dev.aries.chat", &routing);
        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(value["type"], "DIDCommMessaging");
        assert_eq!(
            value["serviceEndpoint"],
            json!({
                "uri": "https://dev.aries.chat",
                "accept": ["didcomm/v2", "didcomm/aip2;env=rfc587"],
                "routingKeys": routing
            })
        );
    }
}
