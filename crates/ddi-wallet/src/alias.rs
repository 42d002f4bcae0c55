//! Alias store: `<data_dir>/dids.json`, mapping aliases to portable DIDs.
use crate::store::{read_json, write_json_atomic, StoreError};
use ddi_core::did::PortableDid;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ALIAS_FILE: &str = "dids.json";

/// Alias to portable DID map persisted as a single JSON object.
#[derive(Debug, Clone)]
pub struct AliasStore {
    path: PathBuf,
}

impl AliasStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(ALIAS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BTreeMap<String, PortableDid>, StoreError> {
        read_json(&self.path)
    }

    pub fn get(&self, alias: &str) -> Result<Option<PortableDid>, StoreError> {
        Ok(self.load()?.remove(alias))
    }

    /// Saves (or replaces) the portable DID stored under `alias`.
    pub fn save(&self, alias: &str, portable: PortableDid) -> Result<(), StoreError> {
        let mut aliases = self.load()?;
        aliases.insert(alias.to_string(), portable);
        write_json_atomic(&self.path, &aliases)
    }
}
