//! Core types, traits and logic for the DDI holder agent (agent implementation independent).
pub mod agent;
pub mod credential;
pub mod did;
pub mod presentation;
pub mod sd_jwt;
pub mod test_utils;
pub mod vc_jwt;

/// Environment variable name for DDI data (wallets and the DID alias store).
pub const DDI_DATA: &str = "DDI_DATA";

/// Environment variable name for the DDI config file.
pub const DDI_CONFIG: &str = "DDI_CONFIG";

/// Data directory used when `DDI_DATA` is not set.
pub const DEFAULT_DATA_DIR: &str = ".ddi";

pub const JSON_FILE_EXTENSION: &str = ".json";

/// Credential format identifier for SD-JWT VCs.
pub const SD_JWT_VC_FORMAT: &str = "vc+sd-jwt";

/// Credential type reported when an SD-JWT VC carries no `vct` claim.
pub const DEFAULT_CREDENTIAL_TYPE: &str = "SdJwtVc";
