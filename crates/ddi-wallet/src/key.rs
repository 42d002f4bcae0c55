//! Holder keys: Ed25519 generation, did:key derivation and JWT signing.
use did_method_key::DIDKey;
use serde::Serialize;
use serde_json::json;
use ssi::did::{DIDMethod, Source};
use ssi::jwk::JWK;
use ssi::jws::Header;
use thiserror::Error;

/// An error relating to holder keys.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Wrapped SSI JWK error.
    #[error("Key generation failed: {0}")]
    Generation(#[from] ssi::jwk::Error),
    #[error("Failed to derive a did:key from the public key.")]
    FailedToDeriveDid,
    /// Wrapped SSI error raised while signing.
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Failed to serialize JWT: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Generates a new Ed25519 private key.
pub fn generate_ed25519() -> Result<JWK, KeyError> {
    Ok(JWK::generate_ed25519()?)
}

/// Derives the did:key identifier of a key.
pub fn did_key(jwk: &JWK) -> Result<String, KeyError> {
    DIDKey
        .generate(&Source::Key(&jwk.to_public()))
        .ok_or(KeyError::FailedToDeriveDid)
}

/// Signs `payload` as a compact JWS with header `{"alg": "EdDSA", "typ": typ, "kid": kid}`.
pub fn sign_jwt<T: Serialize>(
    payload: &T,
    jwk: &JWK,
    typ: &str,
    kid: Option<&str>,
) -> Result<String, KeyError> {
    let mut header = json!({ "alg": "EdDSA", "typ": typ });
    if let Some(kid) = kid {
        header["kid"] = json!(kid);
    }
    let header: Header = serde_json::from_value(header)?;
    let payload = serde_json::to_string(payload)?;
    ssi::jws::encode_sign_custom_header(&payload, jwk, &header)
        .map_err(|e| KeyError::Signing(e.to_string()))
}
