//! DID resolution: did:key and long form did:peer:4 locally, everything else through an
//! HTTP universal resolver.
use crate::peer;
use ddi_core::did::DidMethod;
use did_method_key::DIDKey;
use log::debug;
use ssi::did::Document;
use ssi::did_resolve::{
    DIDResolver, DocumentMetadata, HTTPDIDResolver, ResolutionInputMetadata, ResolutionMetadata,
};
use thiserror::Error;

/// An error resolving a DID.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Resolution metadata reported an error.
    #[error("Failed to resolve {0}: {1}")]
    FailedToResolve(String, String),
    #[error("DID: {0} is not found.")]
    DIDNotFound(String),
    #[error("No resolver is configured for {0}.")]
    NoResolver(String),
    /// Wrapped peer DID error.
    #[error("Failed to resolve did:peer: {0}")]
    Peer(#[from] peer::PeerError),
}

/// Converts a DID resolution tuple into a result.
pub fn resolution_to_result(
    resolution: (
        ResolutionMetadata,
        Option<Document>,
        Option<DocumentMetadata>,
    ),
    did: &str,
) -> Result<Document, ResolverError> {
    let (metadata, document, _) = resolution;
    if let Some(error) = metadata.error {
        return Err(ResolverError::FailedToResolve(did.to_string(), error));
    }
    document.ok_or_else(|| ResolverError::DIDNotFound(did.to_string()))
}

/// Resolver used by the wallet agent for DIDs it does not hold.
pub struct WalletResolver {
    universal: Option<HTTPDIDResolver>,
}

impl WalletResolver {
    pub fn new(universal_endpoint: Option<&str>) -> Self {
        Self {
            universal: universal_endpoint.map(HTTPDIDResolver::new),
        }
    }

    pub async fn resolve(&self, did: &str) -> Result<Document, ResolverError> {
        match DidMethod::from_did(did) {
            Some(DidMethod::Key) => resolution_to_result(
                DIDKey
                    .resolve(did, &ResolutionInputMetadata::default())
                    .await,
                did,
            ),
            Some(DidMethod::Peer) if peer::is_long_form(did) => Ok(peer::resolve_long_form(did)?),
            _ => {
                let universal = self
                    .universal
                    .as_ref()
                    .ok_or_else(|| ResolverError::NoResolver(did.to_string()))?;
                debug!("Resolving {} with the universal resolver", did);
                resolution_to_result(
                    universal
                        .resolve(did, &ResolutionInputMetadata::default())
                        .await,
                    did,
                )
            }
        }
    }
}
