//! did:peer numalgo 4 (short form and long form) creation and long form resolution.
use multibase::Base;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use ssi::did::Document;
use thiserror::Error;

pub const PEER_4_PREFIX: &str = "did:peer:4";
/// Multicodec prefix for JSON.
const MULTICODEC_JSON: [u8; 2] = [0x80, 0x04];
/// Multihash prefix for a 32 byte SHA-256 digest.
const MULTIHASH_SHA2_256: [u8; 2] = [0x12, 0x20];

/// An error creating or resolving a did:peer:4.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Not a did:peer:4 long form identifier: {0}")]
    NotLongForm(String),
    #[error("Hash of the encoded document does not match the identifier.")]
    HashMismatch,
    #[error("Invalid multibase encoding: {0}")]
    Multibase(#[from] multibase::Error),
    #[error("Encoded document is not multicodec JSON.")]
    NotJson,
    #[error("Invalid input document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// Both forms of a did:peer:4 identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDid {
    pub long_form: String,
    pub short_form: String,
}

fn hash_encoded(encoded: &str) -> String {
    let mut bytes = MULTIHASH_SHA2_256.to_vec();
    bytes.extend_from_slice(&Sha256::digest(encoded.as_bytes()));
    multibase::encode(Base::Base58Btc, bytes)
}

/// Creates a did:peer:4 from an input document. The document `id`, if any, is ignored.
pub fn create(document: &Document) -> Result<PeerDid, PeerError> {
    let mut input = serde_json::to_value(document)?;
    if let Value::Object(map) = &mut input {
        map.remove("id");
    }
    let mut bytes = MULTICODEC_JSON.to_vec();
    bytes.extend_from_slice(serde_json::to_string(&input)?.as_bytes());
    let encoded = multibase::encode(Base::Base58Btc, bytes);
    let hash = hash_encoded(&encoded);
    Ok(PeerDid {
        long_form: format!("{PEER_4_PREFIX}{hash}:{encoded}"),
        short_form: format!("{PEER_4_PREFIX}{hash}"),
    })
}

pub fn is_long_form(did: &str) -> bool {
    did.strip_prefix(PEER_4_PREFIX)
        .map_or(false, |rest| rest.contains(':'))
}

/// Short form of a did:peer:4 long form identifier.
pub fn short_form(did: &str) -> Result<String, PeerError> {
    let rest = did
        .strip_prefix(PEER_4_PREFIX)
        .ok_or_else(|| PeerError::NotLongForm(did.to_string()))?;
    match rest.split_once(':') {
        Some((hash, _)) => Ok(format!("{PEER_4_PREFIX}{hash}")),
        None => Err(PeerError::NotLongForm(did.to_string())),
    }
}

/// Fills in `controller` values left empty in the input document.
fn contextualize(value: &mut Value, did: &str) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(controller)) = map.get_mut("controller") {
                if controller.is_empty() {
                    *controller = did.to_string();
                }
            }
            for v in map.values_mut() {
                contextualize(v, did);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| contextualize(v, did)),
        _ => (),
    }
}

/// Resolves a long form did:peer:4 by decoding the document embedded in the identifier.
pub fn resolve_long_form(did: &str) -> Result<Document, PeerError> {
    let rest = did
        .strip_prefix(PEER_4_PREFIX)
        .ok_or_else(|| PeerError::NotLongForm(did.to_string()))?;
    let (hash, encoded) = rest
        .split_once(':')
        .ok_or_else(|| PeerError::NotLongForm(did.to_string()))?;
    if hash_encoded(encoded) != hash {
        return Err(PeerError::HashMismatch);
    }
    let (_, bytes) = multibase::decode(encoded)?;
    let json = bytes
        .strip_prefix(&MULTICODEC_JSON[..])
        .ok_or(PeerError::NotJson)?;
    let mut document: Value = serde_json::from_slice(json)?;
    contextualize(&mut document, did);
    if let Value::Object(map) = &mut document {
        map.insert("id".to_string(), json!(did));
        map.insert(
            "alsoKnownAs".to_string(),
            json!([format!("{PEER_4_PREFIX}{hash}")]),
        );
    }
    Ok(serde_json::from_value(document)?)
}
