//! VC-JWT store: `<data_dir>/credential-jwts.json`, mapping holder aliases to their VC-JWTs.
use crate::store::{read_json, write_json_atomic, StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CREDENTIAL_JWTS_FILE: &str = "credential-jwts.json";

#[derive(Debug, Clone)]
pub struct CredentialJwtStore {
    path: PathBuf,
}

impl CredentialJwtStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CREDENTIAL_JWTS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// VC-JWTs saved for `holder`, oldest first.
    pub fn get(&self, holder: &str) -> Result<Vec<String>, StoreError> {
        let mut held: BTreeMap<String, Vec<String>> = read_json(&self.path)?;
        Ok(held.remove(holder).unwrap_or_default())
    }

    /// Appends a VC-JWT to the holder's list. Saving the same JWT twice keeps one copy.
    pub fn save(&self, holder: &str, vc_jwt: &str) -> Result<(), StoreError> {
        let mut held: BTreeMap<String, Vec<String>> = read_json(&self.path)?;
        let jwts = held.entry(holder.to_string()).or_default();
        if !jwts.iter().any(|jwt| jwt == vc_jwt) {
            jwts.push(vc_jwt.to_string());
        }
        write_json_atomic(&self.path, &held)
    }
}
