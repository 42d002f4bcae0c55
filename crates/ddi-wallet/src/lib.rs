//! File-backed identity agent for the DDI workshop: keys, DIDs, credentials and the
//! OpenID4VCI / OpenID4VP holder flows.
pub mod agent;
pub mod alias;
pub mod config;
pub mod credential_jwts;
pub mod dht;
pub mod key;
pub mod openid4vci;
pub mod openid4vp;
pub mod peer;
pub mod resolver;
pub mod store;

pub use agent::WalletAgent;
