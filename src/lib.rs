//! DDI: a decentralized digital identity workshop agent.
//!
//! Creates DIDs, receives SD-JWT VCs over OpenID4VCI and presents them over OpenID4VP,
//! through a CLI ([`cli`]) and a minimal web UI ([`http`]).
pub use ddi_api as api;
pub use ddi_cli as cli;
pub use ddi_core as core;
pub use ddi_http as http;
pub use ddi_wallet as wallet;
