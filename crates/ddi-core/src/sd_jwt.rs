//! SD-JWT compact form decoding and claim projection.
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

/// Separator between the issuer JWT, disclosures and key binding JWT.
pub const SEPARATOR: char = '~';
pub const SD_DIGESTS_KEY: &str = "_sd";
pub const SD_ALG_KEY: &str = "_sd_alg";
/// Key of an array element digest object (`{"...": digest}`).
pub const ARRAY_DIGEST_KEY: &str = "...";
pub const SHA_256: &str = "sha-256";

/// An error decoding an SD-JWT into claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdJwtError {
    #[error("Empty SD-JWT.")]
    Empty,
    #[error("Malformed issuer JWT: expected three dot separated parts.")]
    MalformedJwt,
    #[error("Invalid base64url encoding in {0}.")]
    InvalidBase64(String),
    #[error("Invalid JSON in {0}.")]
    InvalidJson(String),
    #[error("Invalid disclosure: {0}")]
    InvalidDisclosure(String),
    #[error("Unsupported selective disclosure hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
    #[error("SD-JWT payload is not a JSON object.")]
    PayloadNotObject,
}

pub(crate) fn b64url_encode<T: AsRef<[u8]>>(input: T) -> String {
    base64::encode_config(input, base64::URL_SAFE_NO_PAD)
}

fn b64url_json(part: &str, what: &str) -> Result<Value, SdJwtError> {
    let bytes = base64::decode_config(part, base64::URL_SAFE_NO_PAD)
        .map_err(|_| SdJwtError::InvalidBase64(what.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| SdJwtError::InvalidJson(what.to_string()))
}

/// Base64url encoded SHA-256 digest of an ASCII string.
pub fn sha256_b64url(input: &str) -> String {
    b64url_encode(Sha256::digest(input.as_bytes()))
}

/// A single selective disclosure: `[salt, name, value]` or `[salt, value]` for array elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Disclosure {
    pub encoded: String,
    pub salt: String,
    pub name: Option<String>,
    pub value: Value,
}

impl Disclosure {
    pub fn parse(encoded: &str) -> Result<Self, SdJwtError> {
        let value = b64url_json(encoded, "disclosure")?;
        let mut items = match value {
            Value::Array(items) => items,
            _ => return Err(SdJwtError::InvalidDisclosure(encoded.to_string())),
        };
        let (salt, name, value) = match items.len() {
            3 => {
                let value = items.remove(2);
                let name = match items.remove(1) {
                    Value::String(name) => name,
                    _ => return Err(SdJwtError::InvalidDisclosure(encoded.to_string())),
                };
                (items.remove(0), Some(name), value)
            }
            2 => {
                let value = items.remove(1);
                (items.remove(0), None, value)
            }
            _ => return Err(SdJwtError::InvalidDisclosure(encoded.to_string())),
        };
        let salt = match salt {
            Value::String(salt) => salt,
            _ => return Err(SdJwtError::InvalidDisclosure(encoded.to_string())),
        };
        Ok(Self {
            encoded: encoded.to_string(),
            salt,
            name,
            value,
        })
    }

    /// Digest referencing this disclosure from the payload.
    pub fn digest(&self) -> String {
        sha256_b64url(&self.encoded)
    }
}

/// An SD-JWT split into its parts. Signatures are not verified.
#[derive(Debug, Clone)]
pub struct DecodedSdJwt {
    pub issuer_jwt: String,
    pub header: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub disclosures: Vec<Disclosure>,
    pub key_binding_jwt: Option<String>,
}

/// Splits and decodes an SD-JWT compact string.
pub fn decode(compact: &str) -> Result<DecodedSdJwt, SdJwtError> {
    let compact = compact.trim();
    if compact.is_empty() {
        return Err(SdJwtError::Empty);
    }
    let mut parts: Vec<&str> = compact.split(SEPARATOR).collect();
    let issuer_jwt = parts.remove(0);
    // The last part is empty unless a key binding JWT is attached.
    let key_binding_jwt = match parts.pop() {
        Some("") | None => None,
        Some(kb) if kb.contains('.') => Some(kb.to_string()),
        Some(disclosure) => {
            parts.push(disclosure);
            None
        }
    };
    let jwt_parts: Vec<&str> = issuer_jwt.split('.').collect();
    if jwt_parts.len() != 3 {
        return Err(SdJwtError::MalformedJwt);
    }
    let header = match b64url_json(jwt_parts[0], "JWT header")? {
        Value::Object(header) => header,
        _ => return Err(SdJwtError::InvalidJson("JWT header".to_string())),
    };
    let payload = match b64url_json(jwt_parts[1], "JWT payload")? {
        Value::Object(payload) => payload,
        _ => return Err(SdJwtError::PayloadNotObject),
    };
    let disclosures = parts
        .into_iter()
        .filter(|d| !d.is_empty())
        .map(Disclosure::parse)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DecodedSdJwt {
        issuer_jwt: issuer_jwt.to_string(),
        header,
        payload,
        disclosures,
        key_binding_jwt,
    })
}

/// Decodes an SD-JWT and returns its fully disclosed claims.
pub fn claims(compact: &str) -> Result<Map<String, Value>, SdJwtError> {
    decode(compact)?.claims()
}

impl DecodedSdJwt {
    /// Payload with every disclosed claim substituted in and the selective disclosure
    /// bookkeeping (`_sd`, `_sd_alg`, undisclosed digests) removed.
    pub fn claims(&self) -> Result<Map<String, Value>, SdJwtError> {
        match self.payload.get(SD_ALG_KEY) {
            None => (),
            Some(Value::String(alg)) if alg == SHA_256 => (),
            Some(other) => return Err(SdJwtError::UnsupportedHashAlgorithm(other.to_string())),
        }
        let by_digest: HashMap<String, &Disclosure> =
            self.disclosures.iter().map(|d| (d.digest(), d)).collect();
        match reveal(Value::Object(self.payload.clone()), &by_digest) {
            Value::Object(claims) => Ok(claims),
            _ => Err(SdJwtError::PayloadNotObject),
        }
    }

    /// The declared credential type (`vct`).
    pub fn credential_type(&self) -> Option<&str> {
        self.payload.get("vct").and_then(Value::as_str)
    }

    /// Holder key id from the confirmation claim, if bound to a key id.
    pub fn holder_key_id(&self) -> Option<&str> {
        self.payload
            .get("cnf")
            .and_then(|cnf| cnf.get("kid"))
            .and_then(Value::as_str)
    }

    /// Compact presentation keeping only the disclosures accepted by `keep`,
    /// terminated by the separator and without a key binding JWT.
    pub fn present<F: Fn(&Disclosure) -> bool>(&self, keep: F) -> String {
        let mut presentation = self.issuer_jwt.clone();
        for disclosure in self.disclosures.iter().filter(|d| keep(d)) {
            presentation.push(SEPARATOR);
            presentation.push_str(&disclosure.encoded);
        }
        presentation.push(SEPARATOR);
        presentation
    }
}

fn array_digest(item: &Value) -> Option<&str> {
    match item {
        Value::Object(map) if map.len() == 1 => map.get(ARRAY_DIGEST_KEY).and_then(Value::as_str),
        _ => None,
    }
}

fn reveal(value: Value, disclosures: &HashMap<String, &Disclosure>) -> Value {
    match value {
        Value::Object(mut map) => {
            let digests = map.remove(SD_DIGESTS_KEY);
            map.remove(SD_ALG_KEY);
            let mut revealed: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, reveal(v, disclosures)))
                .collect();
            if let Some(Value::Array(digests)) = digests {
                for digest in digests.iter().filter_map(Value::as_str) {
                    let disclosure = match disclosures.get(digest) {
                        Some(disclosure) => disclosure,
                        None => continue,
                    };
                    if let Some(name) = &disclosure.name {
                        revealed.insert(name.clone(), reveal(disclosure.value.clone(), disclosures));
                    }
                }
            }
            Value::Object(revealed)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter_map(|item| match array_digest(&item).map(str::to_string) {
                    Some(digest) => disclosures
                        .get(&digest)
                        .filter(|d| d.name.is_none())
                        .map(|d| reveal(d.value.clone(), disclosures)),
                    None => Some(reveal(item, disclosures)),
                })
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{encode_disclosure, issue_sd_jwt};
    use serde_json::json;

    #[test]
    fn test_claims_from_issued_sd_jwt() {
        let compact = issue_sd_jwt(
            "IdentityCredential",
            &[("given_name", json!("Ada")), ("family_name", json!("Lovelace"))],
            Some("did:key:z6Mkholder#z6Mkholder"),
        );
        let claims = claims(&compact).unwrap();
        assert_eq!(claims["given_name"], json!("Ada"));
        assert_eq!(claims["family_name"], json!("Lovelace"));
        assert_eq!(claims["vct"], json!("IdentityCredential"));
        assert!(claims.get(SD_DIGESTS_KEY).is_none());
        assert!(claims.get(SD_ALG_KEY).is_none());
    }

    #[test]
    fn test_claims_deterministic() {
        let compact = issue_sd_jwt("Badge", &[("level", json!(3))], None);
        assert_eq!(claims(&compact).unwrap(), claims(&compact).unwrap());
    }

    #[test]
    fn test_undisclosed_digests_are_dropped() {
        let compact = issue_sd_jwt(
            "Badge",
            &[("level", json!(3)), ("secret", json!("hidden"))],
            None,
        );
        let decoded = decode(&compact).unwrap();
        let presented = decoded.present(|d| d.name.as_deref() == Some("level"));
        let claims = claims(&presented).unwrap();
        assert_eq!(claims["level"], json!(3));
        assert!(claims.get("secret").is_none());
    }

    #[test]
    fn test_array_element_disclosures() {
        let element = encode_disclosure("salt-1", None, &json!("FR"));
        let digest = sha256_b64url(&element);
        let payload = json!({
            "vct": "Nationalities",
            "nationalities": [{ "...": digest }, "DE", { "...": "unknown-digest" }],
            "_sd_alg": "sha-256"
        });
        let compact = format!(
            "{}.{}.c2ln~{}~",
            b64url_encode(json!({"alg": "EdDSA"}).to_string()),
            b64url_encode(payload.to_string()),
            element
        );
        let claims = claims(&compact).unwrap();
        assert_eq!(claims["nationalities"], json!(["FR", "DE"]));
    }

    #[test]
    fn test_key_binding_jwt_is_ignored() {
        let compact = issue_sd_jwt("Badge", &[("level", json!(3))], None);
        let with_kb = format!("{compact}eyJhbGciOiJFZERTQSJ9.e30.c2ln");
        let decoded = decode(&with_kb).unwrap();
        assert!(decoded.key_binding_jwt.is_some());
        assert_eq!(decoded.claims().unwrap(), claims(&compact).unwrap());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode("").unwrap_err(), SdJwtError::Empty);
        assert_eq!(decode("abc~").unwrap_err(), SdJwtError::MalformedJwt);
        assert!(matches!(
            decode("!!.!!.!!~").unwrap_err(),
            SdJwtError::InvalidBase64(_)
        ));
        let payload = b64url_encode(json!({"_sd_alg": "sha-512"}).to_string());
        let compact = format!("{}.{}.c2ln~", b64url_encode("{}"), payload);
        assert!(matches!(
            claims(&compact).unwrap_err(),
            SdJwtError::UnsupportedHashAlgorithm(_)
        ));
    }
}
