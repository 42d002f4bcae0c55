//! File-backed identity agent.
use crate::config::WalletConfig;
use crate::dht;
use crate::key::{did_key, generate_ed25519};
use crate::openid4vci::Openid4VciClient;
use crate::openid4vp::Openid4VpClient;
use crate::peer;
use crate::resolver::WalletResolver;
use crate::store::{WalletData, WalletDid, WalletStore};
use async_trait::async_trait;
use chrono::Utc;
use ddi_core::agent::{AgentError, IdentityAgent};
use ddi_core::credential::{
    CredentialBinding, IssuedCredential, ResolvedCredentialOffer, StoredCredential,
};
use ddi_core::did::{
    DidCreateOptions, DidCreateResult, DidError, DidMethod, DidRecord, PortableDid,
};
use ddi_core::presentation::{ResolvedAuthorizationRequest, SelectedCredentials, SubmissionResult};
use ddi_core::sd_jwt;
use log::{debug, info};
use serde_json::{json, Map, Value};
use ssi::did::Document;
use ssi::jwk::JWK;
use std::path::Path;
use tokio::sync::Mutex;

fn storage_error<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::Storage(e.to_string())
}

fn creation_error<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::DidCreation(e.to_string())
}

/// Identity agent keeping DIDs, private keys and credentials in a wallet file.
///
/// Every read-modify-write of the wallet happens under one lock. Changes are applied to a copy
/// and only become visible once the copy has been saved.
pub struct WalletAgent {
    config: WalletConfig,
    store: WalletStore,
    wallet: Mutex<WalletData>,
    resolver: WalletResolver,
    issuance: Openid4VciClient,
    presentation: Openid4VpClient,
}

impl WalletAgent {
    /// Opens (or creates on first write) the wallet `<data_dir>/wallets/<wallet_id>.json`.
    pub fn open(config: WalletConfig, data_dir: &Path) -> Result<Self, AgentError> {
        let store = WalletStore::new(data_dir, &config.wallet_id);
        let wallet = store
            .load()
            .map_err(|e| AgentError::InitializationFailure(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AgentError::InitializationFailure(e.to_string()))?;
        info!(
            "Opened wallet {} at {} ({} DIDs, {} credentials)",
            config.wallet_id,
            store.path().display(),
            wallet.dids.len(),
            wallet.credentials.len()
        );
        Ok(Self {
            resolver: WalletResolver::new(config.resolver_endpoint.as_deref()),
            issuance: Openid4VciClient::new(client.clone()),
            presentation: Openid4VpClient::new(client),
            wallet: Mutex::new(wallet),
            store,
            config,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn wallet_path(&self) -> &Path {
        self.store.path()
    }

    /// Applies `change` to a copy of the wallet, saves the copy and only then replaces the
    /// in-memory wallet with it.
    async fn commit<T, F>(&self, change: F) -> Result<T, AgentError>
    where
        F: FnOnce(&mut WalletData) -> Result<T, AgentError>,
    {
        let mut wallet = self.wallet.lock().await;
        let mut next = wallet.clone();
        let output = change(&mut next)?;
        self.store.save(&next).map_err(storage_error)?;
        *wallet = next;
        Ok(output)
    }

    async fn add_did(&self, entry: WalletDid) -> Result<DidRecord, AgentError> {
        let record = entry.record.clone();
        self.commit(|wallet| {
            wallet.dids.push(entry);
            Ok(())
        })
        .await?;
        info!("Created {}", record.did);
        Ok(record)
    }

    async fn create_key_did(&self) -> Result<(WalletDid, Document), AgentError> {
        let jwk = generate_ed25519().map_err(creation_error)?;
        let did = did_key(&jwk).map_err(creation_error)?;
        let document = self.resolver.resolve(&did).await.map_err(creation_error)?;
        Ok((wallet_did(&did, DidMethod::Key, &document, vec![jwk]), document))
    }

    async fn create_peer_did(&self, template: &Document) -> Result<(WalletDid, Document), AgentError> {
        let peer = peer::create(template).map_err(creation_error)?;
        let document = peer::resolve_long_form(&peer.long_form).map_err(creation_error)?;
        // The peer DID signs with the did:key whose public key the template embeds.
        let keys = {
            let wallet = self.wallet.lock().await;
            template_key_dids(template)
                .iter()
                .filter_map(|did| wallet.did(did))
                .flat_map(|d| d.private_keys.clone())
                .collect()
        };
        Ok((
            wallet_did(&peer.long_form, DidMethod::Peer, &document, keys),
            document,
        ))
    }

    fn create_dht_did(
        &self,
        services: Vec<ssi::did::Service>,
    ) -> Result<(WalletDid, Document), AgentError> {
        let jwk = generate_ed25519().map_err(creation_error)?;
        let did = dht::did_dht(&jwk).map_err(creation_error)?;
        let document = dht::document(&did, &jwk, services).map_err(creation_error)?;
        Ok((wallet_did(&did, DidMethod::Dht, &document, vec![jwk]), document))
    }

    /// Signing key of each selected credential: the key of the DID named in its `cnf.kid`,
    /// otherwise the key of the first did:key in the wallet.
    fn holder_keys(
        wallet: &WalletData,
        selected: &SelectedCredentials,
    ) -> Result<Vec<JWK>, AgentError> {
        let fallback = wallet
            .dids
            .iter()
            .find(|d| d.record.method == DidMethod::Key)
            .and_then(|d| d.private_keys.first());
        selected
            .credentials
            .iter()
            .map(|credential| {
                let decoded = sd_jwt::decode(&credential.compact)?;
                let bound = decoded
                    .holder_key_id()
                    .and_then(|kid| kid.split('#').next())
                    .and_then(|did| wallet.did(did))
                    .and_then(|d| d.private_keys.first());
                bound
                    .or(fallback)
                    .cloned()
                    .ok_or_else(|| AgentError::KeyNotFound(credential.credential_id.clone()))
            })
            .collect()
    }
}

fn wallet_did(did: &str, method: DidMethod, document: &Document, keys: Vec<JWK>) -> WalletDid {
    WalletDid {
        record: DidRecord {
            did: did.to_string(),
            method,
            document: Some(document.clone()),
            created_at: Utc::now(),
        },
        private_keys: keys,
    }
}

/// did:key identifiers of the multibase public keys in a document's verification methods.
fn template_key_dids(template: &Document) -> Vec<String> {
    let value = serde_json::to_value(template).unwrap_or(Value::Null);
    value
        .get("verificationMethod")
        .and_then(Value::as_array)
        .map(|methods| {
            methods
                .iter()
                .filter_map(|vm| vm.get("publicKeyMultibase").and_then(Value::as_str))
                .map(|fingerprint| format!("did:key:{fingerprint}"))
                .collect()
        })
        .unwrap_or_default()
}

fn matches_did(entry: &WalletDid, did: &str) -> bool {
    entry.record.did == did
        || (entry.record.method == DidMethod::Peer
            && peer::short_form(&entry.record.did).map_or(false, |short| short == did))
}

#[async_trait]
impl IdentityAgent for WalletAgent {
    async fn created_dids(&self, method: Option<DidMethod>) -> Result<Vec<DidRecord>, AgentError> {
        let wallet = self.wallet.lock().await;
        Ok(wallet
            .dids
            .iter()
            .filter(|d| method.map_or(true, |m| d.record.method == m))
            .map(|d| d.record.clone())
            .collect())
    }

    async fn create_did(&self, options: DidCreateOptions) -> Result<DidCreateResult, AgentError> {
        let (entry, document) = match options {
            DidCreateOptions::Key { .. } => self.create_key_did().await?,
            DidCreateOptions::Peer { document, .. } => self.create_peer_did(&document).await?,
            DidCreateOptions::Dht { services, .. } => self.create_dht_did(services)?,
        };
        let record = self.add_did(entry).await?;
        Ok(DidCreateResult {
            did: Some(record.did),
            document: Some(document),
        })
    }

    async fn resolve_did(&self, did: &str) -> Result<Document, AgentError> {
        {
            let wallet = self.wallet.lock().await;
            if let Some(document) = wallet
                .dids
                .iter()
                .find(|d| matches_did(d, did))
                .and_then(|d| d.record.document.clone())
            {
                debug!("Resolved {} from the wallet", did);
                return Ok(document);
            }
        }
        self.resolver
            .resolve(did)
            .await
            .map_err(|e| AgentError::DidNotFound(e.to_string()))
    }

    async fn update_did(&self, did: &str, document: Document) -> Result<(), AgentError> {
        let method = DidMethod::from_did(did)
            .ok_or_else(|| DidError::UnknownMethod(did.to_string()))?;
        if method != DidMethod::Dht {
            return Err(AgentError::UnsupportedDidOperation(format!(
                "did:{} documents are immutable and cannot be updated: {}",
                method, did
            )));
        }
        self.commit(|wallet| {
            let entry = wallet
                .dids
                .iter_mut()
                .find(|d| d.record.did == did)
                .ok_or_else(|| AgentError::DidNotFound(did.to_string()))?;
            entry.record.document = Some(document);
            Ok(())
        })
        .await?;
        info!("Updated document of {}", did);
        Ok(())
    }

    async fn export_did(&self, did: &str) -> Result<PortableDid, AgentError> {
        let entry = {
            let wallet = self.wallet.lock().await;
            wallet
                .dids
                .iter()
                .find(|d| matches_did(d, did))
                .cloned()
                .ok_or_else(|| AgentError::DidNotFound(did.to_string()))?
        };
        let document = match entry.record.document {
            Some(document) => document,
            None => self.resolve_did(did).await?,
        };
        let mut metadata = Map::new();
        metadata.insert("method".to_string(), json!(entry.record.method));
        metadata.insert("createdAt".to_string(), json!(entry.record.created_at));
        Ok(PortableDid {
            uri: entry.record.did,
            document,
            private_keys: entry.private_keys,
            metadata,
        })
    }

    async fn import_did(&self, portable: PortableDid) -> Result<DidRecord, AgentError> {
        let method = DidMethod::from_did(&portable.uri)
            .ok_or_else(|| DidError::UnknownMethod(portable.uri.clone()))?;
        if let Some(existing) = self.wallet.lock().await.did(&portable.uri) {
            return Ok(existing.record.clone());
        }
        let record = self
            .commit(|wallet| {
                // Imported concurrently since the check above.
                if let Some(existing) = wallet.did(&portable.uri) {
                    return Ok(existing.record.clone());
                }
                let record = DidRecord {
                    did: portable.uri,
                    method,
                    document: Some(portable.document),
                    created_at: Utc::now(),
                };
                wallet.dids.push(WalletDid {
                    record: record.clone(),
                    private_keys: portable.private_keys,
                });
                Ok(record)
            })
            .await?;
        info!("Imported {}", record.did);
        Ok(record)
    }

    async fn store_credential(&self, compact: &str) -> Result<StoredCredential, AgentError> {
        let credential = StoredCredential::new(compact)?;
        self.commit(|wallet| {
            wallet.credentials.push(credential.clone());
            Ok(())
        })
        .await?;
        info!("Stored credential {} ({})", credential.id, credential.type_);
        Ok(credential)
    }

    async fn credentials(&self) -> Result<Vec<StoredCredential>, AgentError> {
        Ok(self.wallet.lock().await.credentials.clone())
    }

    async fn resolve_credential_offer(
        &self,
        offer: &str,
    ) -> Result<ResolvedCredentialOffer, AgentError> {
        self.issuance.resolve_offer(offer).await
    }

    async fn accept_credential_offer(
        &self,
        offer: &ResolvedCredentialOffer,
        binding: &CredentialBinding,
    ) -> Result<Vec<IssuedCredential>, AgentError> {
        let jwk = {
            let wallet = self.wallet.lock().await;
            wallet
                .did(&binding.did)
                .and_then(|d| d.private_keys.first().cloned())
                .ok_or_else(|| AgentError::KeyNotFound(binding.did.clone()))?
        };
        self.issuance.request_credentials(offer, binding, &jwk).await
    }

    async fn resolve_authorization_request(
        &self,
        request: &str,
    ) -> Result<ResolvedAuthorizationRequest, AgentError> {
        self.presentation.resolve(request).await
    }

    async fn accept_authorization_request(
        &self,
        request: &ResolvedAuthorizationRequest,
        selected: &SelectedCredentials,
    ) -> Result<SubmissionResult, AgentError> {
        let keys = {
            let wallet = self.wallet.lock().await;
            Self::holder_keys(&wallet, selected)?
        };
        self.presentation.submit(request, selected, &keys).await
    }
}
