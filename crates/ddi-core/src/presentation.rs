//! Presentation requests, presentation definitions and path based credential selection.
use crate::agent::PresentationSelector;
use crate::credential::StoredCredential;
use crate::sd_jwt::{self, Disclosure};
use crate::SD_JWT_VC_FORMAT;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// `limit_disclosure` value asking the holder to disclose only the requested claims.
pub const LIMIT_DISCLOSURE_REQUIRED: &str = "required";

/// An error selecting credentials for a presentation definition.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    /// No stored credential satisfies the input descriptor with this id.
    #[error("No credential satisfies input descriptor: {0}")]
    UnsatisfiedDescriptor(String),
    /// A field path is outside the supported JSONPath subset.
    #[error("Unsupported JSONPath expression: {0}")]
    InvalidPath(String),
    #[error("Invalid presentation definition: {0}")]
    InvalidDefinition(String),
}

/// Presentation definition (DIF Presentation Exchange v2 subset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub input_descriptors: Vec<InputDescriptor>,
}

impl PresentationDefinition {
    /// Checks the definition has an id and at least one input descriptor, that descriptor
    /// ids are unique and that every field has a supported path.
    pub fn validate(&self) -> Result<(), SelectionError> {
        let invalid = |reason: String| Err(SelectionError::InvalidDefinition(reason));
        if self.id.trim().is_empty() {
            return invalid("missing id".to_string());
        }
        if self.input_descriptors.is_empty() {
            return invalid(format!("{} has no input descriptors", self.id));
        }
        let mut ids = HashSet::new();
        for descriptor in &self.input_descriptors {
            if !ids.insert(descriptor.id.as_str()) {
                return invalid(format!("duplicate input descriptor id {}", descriptor.id));
            }
            for field in &descriptor.constraints.fields {
                if field.path.is_empty() {
                    return invalid(format!("field without path in {}", descriptor.id));
                }
                for path in &field.path {
                    parse_path(path)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_disclosure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub optional: bool,
}

/// A presentation request resolved from a presentation request reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAuthorizationRequest {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_definition: Option<PresentationDefinition>,
}

/// The credential chosen for one input descriptor, already shaped for disclosure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCredential {
    pub input_descriptor_id: String,
    pub credential_id: String,
    pub compact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCredentials {
    pub definition_id: String,
    pub credentials: Vec<SelectedCredential>,
}

/// The submitted credentials and the verifier's response, passed through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub submitted: Vec<SelectedCredential>,
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorMapEntry {
    pub id: String,
    pub format: String,
    pub path: String,
}

/// Presentation submission describing where each descriptor's credential sits in the VP token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationSubmission {
    pub id: String,
    pub definition_id: String,
    pub descriptor_map: Vec<DescriptorMapEntry>,
}

impl PresentationSubmission {
    pub fn for_selection(selected: &SelectedCredentials) -> Self {
        let single = selected.credentials.len() == 1;
        let descriptor_map = selected
            .credentials
            .iter()
            .enumerate()
            .map(|(i, credential)| DescriptorMapEntry {
                id: credential.input_descriptor_id.clone(),
                format: SD_JWT_VC_FORMAT.to_string(),
                path: if single {
                    "$".to_string()
                } else {
                    format!("$[{i}]")
                },
            })
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            definition_id: selected.definition_id.clone(),
            descriptor_map,
        }
    }
}

/// A segment of a JSONPath expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses the supported JSONPath subset: `$` followed by `.name`, `['name']` or `[n]`.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>, SelectionError> {
    let invalid = || SelectionError::InvalidPath(path.to_string());
    let chars: Vec<char> = path.strip_prefix('$').ok_or_else(invalid)?.chars().collect();
    let mut segments = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '.' => {
                let start = i + 1;
                i = start;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                if i == start {
                    return Err(invalid());
                }
                segments.push(PathSegment::Key(chars[start..i].iter().collect()));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .map(|p| p + i)
                    .ok_or_else(invalid)?;
                let inner: String = chars[i + 1..close].iter().collect();
                let quoted = inner.len() >= 2
                    && ((inner.starts_with('\'') && inner.ends_with('\''))
                        || (inner.starts_with('"') && inner.ends_with('"')));
                if quoted {
                    segments.push(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
                } else {
                    segments.push(PathSegment::Index(inner.parse().map_err(|_| invalid())?));
                }
                i = close + 1;
            }
            _ => return Err(invalid()),
        }
    }
    Ok(segments)
}

/// Returns the value at a JSONPath, if present.
pub fn select_path<'a>(value: &'a Value, path: &str) -> Result<Option<&'a Value>, SelectionError> {
    let mut current = value;
    for segment in parse_path(path)? {
        let next = match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(index),
        };
        match next {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Evaluates the supported JSON schema filter keywords: `const`, `enum` and `type`.
pub fn filter_matches(filter: &Value, value: &Value) -> bool {
    if let Some(expected) = filter.get("const") {
        if expected != value {
            return false;
        }
    }
    if let Some(Value::Array(allowed)) = filter.get("enum") {
        if !allowed.contains(value) {
            return false;
        }
    }
    if let Some(Value::String(type_)) = filter.get("type") {
        let ok = match type_.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true,
        };
        if !ok {
            return false;
        }
    }
    true
}

fn field_value<'a>(field: &Field, claims: &'a Value) -> Result<Option<&'a Value>, SelectionError> {
    for path in &field.path {
        if let Some(value) = select_path(claims, path)? {
            if field
                .filter
                .as_ref()
                .map_or(true, |filter| filter_matches(filter, value))
            {
                return Ok(Some(value));
            }
        }
    }
    Ok(None)
}

fn satisfies(descriptor: &InputDescriptor, claims: &Value) -> Result<bool, SelectionError> {
    for field in descriptor.constraints.fields.iter().filter(|f| !f.optional) {
        if field_value(field, claims)?.is_none() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Claim names referenced by any field path of a descriptor.
fn requested_names(descriptor: &InputDescriptor) -> Result<HashSet<String>, SelectionError> {
    let mut names = HashSet::new();
    for path in descriptor.constraints.fields.iter().flat_map(|f| f.path.iter()) {
        for segment in parse_path(path)? {
            if let PathSegment::Key(key) = segment {
                names.insert(key);
            }
        }
    }
    Ok(names)
}

/// Selector matching input descriptor fields against credential claims.
///
/// For each descriptor the first credential in storage order that satisfies every
/// non-optional field wins. When the descriptor sets `limit_disclosure: required` only
/// disclosures named in the field paths are kept, otherwise all disclosures are presented.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSelector;

impl PathSelector {
    /// For each input descriptor, the index of the first payload satisfying every
    /// non-optional field.
    pub fn match_descriptors(
        &self,
        definition: &PresentationDefinition,
        payloads: &[Value],
    ) -> Result<Vec<usize>, SelectionError> {
        definition
            .input_descriptors
            .iter()
            .map(|descriptor| {
                for (index, payload) in payloads.iter().enumerate() {
                    if satisfies(descriptor, payload)? {
                        return Ok(index);
                    }
                }
                Err(SelectionError::UnsatisfiedDescriptor(descriptor.id.clone()))
            })
            .collect()
    }
}

impl PresentationSelector for PathSelector {
    fn select_credentials(
        &self,
        definition: &PresentationDefinition,
        credentials: &[StoredCredential],
    ) -> Result<SelectedCredentials, SelectionError> {
        let (candidates, payloads): (Vec<_>, Vec<Value>) = credentials
            .iter()
            .filter_map(|credential| {
                let decoded = match sd_jwt::decode(&credential.compact) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!("Skipping credential {} in selection: {}", credential.id, e);
                        return None;
                    }
                };
                match decoded.claims() {
                    Ok(claims) => Some(((credential, decoded), Value::Object(claims))),
                    Err(e) => {
                        warn!("Skipping credential {} in selection: {}", credential.id, e);
                        None
                    }
                }
            })
            .unzip();

        let chosen = self.match_descriptors(definition, &payloads)?;
        let mut selected = Vec::new();
        for (descriptor, index) in definition.input_descriptors.iter().zip(chosen) {
            let (credential, decoded_jwt) = &candidates[index];
            let compact = match descriptor.constraints.limit_disclosure.as_deref() {
                Some(LIMIT_DISCLOSURE_REQUIRED) => {
                    let names = requested_names(descriptor)?;
                    decoded_jwt.present(|d: &Disclosure| {
                        d.name.as_ref().map_or(false, |name| names.contains(name))
                    })
                }
                _ => decoded_jwt.present(|_| true),
            };
            debug!(
                "Selected credential {} for input descriptor {}",
                credential.id, descriptor.id
            );
            selected.push(SelectedCredential {
                input_descriptor_id: descriptor.id.clone(),
                credential_id: credential.id.clone(),
                compact,
            });
        }
        Ok(SelectedCredentials {
            definition_id: definition.id.clone(),
            credentials: selected,
        })
    }
}
