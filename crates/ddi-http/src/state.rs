use crate::config::HTTPConfig;
use ddi_api::CredentialOrchestrator;
use ddi_core::agent::{AgentError, IdentityAgent};
use ddi_core::presentation::PathSelector;
use ddi_wallet::config::{WalletConfig, DEFAULT_LABEL};
use ddi_wallet::WalletAgent;
use std::path::Path;
use std::sync::Arc;

/// A shared app state for handlers.
pub struct AppState {
    pub config: HTTPConfig,
    pub orchestrator: CredentialOrchestrator,
    /// Agent label shown on the page.
    pub label: String,
}

impl AppState {
    /// Opens the file-backed wallet agent in `data_dir`. Fails if the wallet cannot be read.
    pub fn new(
        config: HTTPConfig,
        wallet_config: WalletConfig,
        data_dir: &Path,
    ) -> Result<Self, AgentError> {
        let timeout = wallet_config.request_timeout();
        let label = wallet_config.label.clone();
        let agent = WalletAgent::open(wallet_config, data_dir)?;
        let orchestrator =
            CredentialOrchestrator::new(Arc::new(agent), Arc::new(PathSelector)).with_timeout(timeout);
        Ok(Self::new_with_orchestrator(config, orchestrator).with_label(label))
    }

    pub fn new_with_agent(config: HTTPConfig, agent: Arc<dyn IdentityAgent>) -> Self {
        Self::new_with_orchestrator(config, CredentialOrchestrator::new(agent, Arc::new(PathSelector)))
    }

    pub fn new_with_orchestrator(config: HTTPConfig, orchestrator: CredentialOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
            label: DEFAULT_LABEL.to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}
