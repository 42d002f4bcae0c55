//! did:dht identifiers and documents held locally by the wallet. Publishing to the
//! Mainline DHT is left to an external gateway.
use serde_json::json;
use ssi::did::{Document, Service};
use ssi::jwk::{Params, JWK};
use thiserror::Error;

pub const DHT_PREFIX: &str = "did:dht:";
/// Verification method fragment of the identity key.
pub const IDENTITY_KEY_FRAGMENT: &str = "#0";
const Z_BASE_32_ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

#[derive(Error, Debug)]
pub enum DhtError {
    #[error("did:dht identity keys must be Ed25519 (OKP) keys.")]
    UnsupportedKey,
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// z-base-32 encoding (no padding).
pub fn z_base_32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u16 = 0;
    let mut bits = 0;
    for byte in bytes {
        buffer = (buffer << 8) | *byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(Z_BASE_32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(Z_BASE_32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// The did:dht identifier of an Ed25519 identity key.
pub fn did_dht(jwk: &JWK) -> Result<String, DhtError> {
    match &jwk.params {
        Params::OKP(okp) if okp.curve == "Ed25519" => {
            Ok(format!("{}{}", DHT_PREFIX, z_base_32(&okp.public_key.0)))
        }
        _ => Err(DhtError::UnsupportedKey),
    }
}

/// Builds the document of a did:dht with the identity key as its only verification method.
pub fn document(did: &str, jwk: &JWK, services: Vec<Service>) -> Result<Document, DhtError> {
    let key_id = format!("{did}{IDENTITY_KEY_FRAGMENT}");
    let mut document = json!({
        "@context": "https://www.w3.org/ns/did/v1",
        "id": did,
        "verificationMethod": [{
            "id": key_id,
            "type": "JsonWebKey2020",
            "controller": did,
            "publicKeyJwk": jwk.to_public()
        }],
        "authentication": [key_id],
        "assertionMethod": [key_id],
        "capabilityInvocation": [key_id],
        "capabilityDelegation": [key_id]
    });
    if !services.is_empty() {
        document["service"] = serde_json::to_value(services)?;
    }
    Ok(serde_json::from_value::<Document>(document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_core::did::uri_service;

    #[test]
    fn test_z_base_32() {
        assert_eq!(z_base_32(&[0xf0]), "6y");
        assert_eq!(z_base_32(&[0xd4, 0x7a, 0x04]), "4t7ye");
        assert_eq!(z_base_32(&[]), "");
    }

    #[test]
    fn test_did_dht_document() -> Result<(), Box<dyn std::error::Error>> {
        let jwk = JWK::generate_ed25519()?;
        let did = did_dht(&jwk)?;
        assert!(did.starts_with(DHT_PREFIX));
        // 32 byte keys encode to 52 characters.
        assert_eq!(did.len(), DHT_PREFIX.len() + 52);

        let doc = document(&did, &jwk, vec![])?;
        assert_eq!(doc.id, did);
        assert!(doc.service.is_none());

        let doc = document(
            &did,
            &jwk,
            vec![uri_service("#dwn", "DecentralizedWebNode", "https://dwn.example.com")],
        )?;
        assert_eq!(doc.service.unwrap().len(), 1);
        Ok(())
    }

    #[test]
    fn test_non_ed25519_key_rejected() {
        let jwk: JWK = serde_json::from_str(
            r#"{
                "kty": "EC",
                "crv": "secp256k1",
                "x": "czAsjE4ifEsU-QO-nkz4WNWxlEWBqBIqg2Wn1hxJ7bg",
                "y": "lnBcn6tVS9_O2PHR5Lr1Qim0gDryEHyErTaRx4to8-k"
            }"#,
        )
        .unwrap();
        assert!(matches!(did_dht(&jwk), Err(DhtError::UnsupportedKey)));
    }
}
