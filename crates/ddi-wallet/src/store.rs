//! Wallet persistence: one JSON file per wallet, replaced atomically on every write.
use ddi_core::credential::StoredCredential;
use ddi_core::did::DidRecord;
use ddi_core::JSON_FILE_EXTENSION;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ssi::jwk::JWK;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// An error reading or writing wallet files.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create directory {0}: {1}")]
    FailedToCreateDir(String, std::io::Error),
    #[error("Failed to read {0}: {1}")]
    FailedToRead(String, std::io::Error),
    #[error("Failed to parse {0}: {1}")]
    FailedToParse(String, serde_json::Error),
    #[error("Failed to write {0}: {1}")]
    FailedToWrite(String, std::io::Error),
    #[error("Failed to serialize: {0}")]
    FailedToSerialize(#[from] serde_json::Error),
}

/// A DID held in the wallet with its private keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDid {
    #[serde(flatten)]
    pub record: DidRecord,
    #[serde(default)]
    pub private_keys: Vec<JWK>,
}

/// Contents of a wallet file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletData {
    #[serde(default)]
    pub dids: Vec<WalletDid>,
    #[serde(default)]
    pub credentials: Vec<StoredCredential>,
}

impl WalletData {
    pub fn did(&self, did: &str) -> Option<&WalletDid> {
        self.dids.iter().find(|d| d.record.did == did)
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Reads JSON from `path`, giving the default value when the file does not exist.
pub fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents =
        fs::read_to_string(path).map_err(|e| StoreError::FailedToRead(display(path), e))?;
    serde_json::from_str(&contents).map_err(|e| StoreError::FailedToParse(display(path), e))
}

/// Writes JSON to a temporary file in the target directory and renames it over `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::FailedToCreateDir(display(dir), e))?;
    let json = serde_json::to_string_pretty(value)?;
    let mut file =
        NamedTempFile::new_in(dir).map_err(|e| StoreError::FailedToWrite(display(path), e))?;
    writeln!(file, "{}", json).map_err(|e| StoreError::FailedToWrite(display(path), e))?;
    file.as_file()
        .sync_all()
        .map_err(|e| StoreError::FailedToWrite(display(path), e))?;
    file.persist(path)
        .map_err(|e| StoreError::FailedToWrite(display(path), e.error))?;
    Ok(())
}

/// Location of a wallet file: `<data_dir>/wallets/<wallet_id>.json`.
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(data_dir: &Path, wallet_id: &str) -> Self {
        Self {
            path: data_dir
                .join("wallets")
                .join(format!("{}{}", wallet_id, JSON_FILE_EXTENSION)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<WalletData, StoreError> {
        read_json(&self.path)
    }

    pub fn save(&self, data: &WalletData) -> Result<(), StoreError> {
        write_json_atomic(&self.path, data)
    }
}
