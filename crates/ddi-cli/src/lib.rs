//! DDI command line interface: single-shot commands and an interactive shell.
pub mod config;
pub mod shell;

use chrono::Utc;
use clap::{arg, Arg, ArgMatches, Command};
use ddi_api::{CredentialOrchestrator, DDIAPIError};
use ddi_core::agent::AgentError;
use ddi_core::did::{didcomm_messaging_service, uri_service, DidError, DidMethod, PortableDid};
use ddi_core::presentation::PathSelector;
use ddi_core::vc_jwt::{
    workshop_presentation_definition, SignedCredential, VcJwtError, WORKSHOP_CREDENTIAL_TYPE,
};
use ddi_wallet::alias::AliasStore;
use ddi_wallet::credential_jwts::CredentialJwtStore;
use ddi_wallet::config::WalletConfig;
use ddi_wallet::store::StoreError;
use ddi_wallet::WalletAgent;
use serde_json::{json, to_string_pretty};
use ssi::did::Service;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const WELCOME: &str = "Welcome to the Decentralized Digital Identity Workshop!";

/// Service id of the DIDComm messaging service added to an alias DID.
pub const DIDCOMM_MESSAGING_ID: &str = "#didcomm-1";
/// Expertise level of workshop credentials when none is given.
pub const DEFAULT_EXPERTISE_LEVEL: &str = "Beginner";

/// Welcome line naming the agent.
pub fn welcome(label: &str) -> String {
    format!("{} ({})", WELCOME, label)
}

/// How a failed command is reported to the user.
pub fn error_message(err: &dyn std::fmt::Display) -> String {
    format!("Error: {}", err)
}

/// An error running a CLI command.
#[derive(Error, Debug)]
pub enum CLIError {
    #[error("{0}")]
    Api(#[from] DDIAPIError),
    #[error("Alias store error: {0}")]
    Store(#[from] StoreError),
    #[error("No DID saved under alias: {0}")]
    AliasNotFound(String),
    #[error("{0}")]
    Did(#[from] DidError),
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    CredentialJwt(#[from] VcJwtError),
}

/// Everything a command needs: the orchestrator, the alias store and the VC-JWTs held
/// by each alias.
pub struct CliContext {
    pub orchestrator: CredentialOrchestrator,
    pub aliases: AliasStore,
    pub credential_jwts: CredentialJwtStore,
    /// DID method used when creating a DID under an alias.
    pub alias_method: DidMethod,
}

impl CliContext {
    /// Keeps the alias and VC-JWT stores in `data_dir`.
    pub fn new(
        orchestrator: CredentialOrchestrator,
        data_dir: &Path,
        alias_method: DidMethod,
    ) -> Self {
        Self {
            orchestrator,
            aliases: AliasStore::new(data_dir),
            credential_jwts: CredentialJwtStore::new(data_dir),
            alias_method,
        }
    }

    /// Opens the file-backed wallet agent and alias store in `data_dir`.
    pub fn open(wallet_config: WalletConfig, data_dir: &Path) -> Result<Self, AgentError> {
        let timeout = wallet_config.request_timeout();
        let alias_method = wallet_config.alias_method;
        let agent = WalletAgent::open(wallet_config, data_dir)?;
        let orchestrator = CredentialOrchestrator::new(Arc::new(agent), Arc::new(PathSelector))
            .with_timeout(timeout);
        Ok(Self::new(orchestrator, data_dir, alias_method))
    }

    /// Prints the stored credentials with their claims.
    pub async fn list<W: Write>(&self, out: &mut W) -> Result<(), CLIError> {
        let listing = self.orchestrator.list_credentials().await?;
        if listing.views.is_empty() && listing.failures.is_empty() {
            writeln!(out, "No credentials stored")?;
        }
        for view in &listing.views {
            writeln!(out, "{}", to_string_pretty(view)?)?;
        }
        for failure in &listing.failures {
            writeln!(
                out,
                "Credential {} could not be decoded: {}",
                failure.id, failure.error
            )?;
        }
        Ok(())
    }

    pub async fn receive<W: Write>(&self, offer: &str, out: &mut W) -> Result<(), CLIError> {
        let stored = self.orchestrator.accept_offer(offer).await?;
        writeln!(out, "Received {} credential(s)", stored.len())?;
        for credential in &stored {
            writeln!(out, "  {} ({})", credential.id, credential.type_)?;
        }
        Ok(())
    }

    pub async fn present<W: Write>(&self, link: &str, out: &mut W) -> Result<(), CLIError> {
        let result = self.orchestrator.present_credentials(link).await?;
        writeln!(
            out,
            "Presented {} credential(s), verifier responded with status {}",
            result.submitted.len(),
            result.status
        )?;
        writeln!(out, "{}", to_string_pretty(&result.body)?)?;
        Ok(())
    }

    /// Creates a DID, saving it under `alias` when one is given.
    pub async fn create_did<W: Write>(
        &self,
        method: DidMethod,
        alias: Option<&str>,
        out: &mut W,
    ) -> Result<String, CLIError> {
        let did = self.orchestrator.create_did(method).await?;
        match alias {
            Some(alias) => {
                self.save_alias(alias, &did).await?;
                writeln!(out, "Created and saved did {}", did)?;
            }
            None => writeln!(out, "Created did {}", did)?,
        }
        Ok(did)
    }

    /// Prints the DIDs created by the agent, optionally filtered by method.
    pub async fn list_dids<W: Write>(
        &self,
        method: Option<DidMethod>,
        out: &mut W,
    ) -> Result<(), CLIError> {
        let records = self.orchestrator.created_dids(method).await?;
        if records.is_empty() {
            writeln!(out, "No DIDs created")?;
        }
        for record in &records {
            writeln!(
                out,
                "{} ({}, created {})",
                record.did,
                record.method,
                record.created_at.format("%Y-%m-%d %H:%M:%S")
            )?;
        }
        Ok(())
    }

    pub async fn resolve_did<W: Write>(&self, did: &str, out: &mut W) -> Result<(), CLIError> {
        let document = self.orchestrator.resolve_did(did).await?;
        writeln!(out, "{}", to_string_pretty(&document)?)?;
        Ok(())
    }

    /// Appends a service with a URI endpoint to the document of `did`.
    pub async fn update_did<W: Write>(
        &self,
        did: &str,
        id: &str,
        type_: &str,
        endpoint: &str,
        out: &mut W,
    ) -> Result<(), CLIError> {
        let document = self
            .orchestrator
            .add_service(did, uri_service(id, type_, endpoint))
            .await?;
        writeln!(out, "Updated did {}", did)?;
        writeln!(out, "{}", to_string_pretty(&document)?)?;
        Ok(())
    }

    async fn save_alias(&self, alias: &str, did: &str) -> Result<(), CLIError> {
        let portable = self.orchestrator.export_did(did).await?;
        self.aliases.save(alias, portable)?;
        Ok(())
    }

    /// Loads the DID saved under `alias` into the agent.
    pub async fn get_did<W: Write>(&self, alias: &str, out: &mut W) -> Result<PortableDid, CLIError> {
        let portable = self
            .aliases
            .get(alias)?
            .ok_or_else(|| CLIError::AliasNotFound(alias.to_string()))?;
        self.orchestrator.import_did(portable.clone()).await?;
        writeln!(out, "Loaded {} did {}", alias, portable.uri)?;
        Ok(portable)
    }

    /// Adds a service to the DID saved under `alias` and saves the updated DID.
    pub async fn add_service<W: Write>(
        &self,
        alias: &str,
        id: &str,
        type_: &str,
        endpoint: &str,
        out: &mut W,
    ) -> Result<(), CLIError> {
        self.add_alias_service(alias, uri_service(id, type_, endpoint), out)
            .await
    }

    /// Adds a `DIDCommMessaging` service with an object endpoint to the DID saved under
    /// `alias`.
    pub async fn add_didcomm_service<W: Write>(
        &self,
        alias: &str,
        uri: &str,
        routing_keys: &[String],
        out: &mut W,
    ) -> Result<(), CLIError> {
        let service = didcomm_messaging_service(DIDCOMM_MESSAGING_ID, uri, routing_keys);
        self.add_alias_service(alias, service, out).await
    }

    async fn add_alias_service<W: Write>(
        &self,
        alias: &str,
        service: Service,
        out: &mut W,
    ) -> Result<(), CLIError> {
        let portable = self.get_did(alias, out).await?;
        let id = service.id.clone();
        self.orchestrator.add_service(&portable.uri, service).await?;
        self.save_alias(alias, &portable.uri).await?;
        writeln!(out, "Added service {} to {}", id, alias)?;
        Ok(())
    }

    /// Issues a workshop VC-JWT from the issuer alias DID to the holder alias DID and saves
    /// it for the holder.
    pub async fn issue<W: Write>(
        &self,
        issuer_alias: &str,
        holder_alias: &str,
        expertise_level: &str,
        out: &mut W,
    ) -> Result<String, CLIError> {
        let issuer = self.get_did(issuer_alias, out).await?;
        let holder = self.get_did(holder_alias, out).await?;
        let data = json!({
            "name": holder_alias,
            "completionDate": Utc::now().format("%Y-%m-%d").to_string(),
            "expertiseLevel": expertise_level
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        let vc_jwt = self.orchestrator.issue_credential(
            &issuer,
            &holder.uri,
            WORKSHOP_CREDENTIAL_TYPE,
            data,
        )?;
        self.credential_jwts.save(holder_alias, &vc_jwt)?;
        let signed = SignedCredential::decode(&vc_jwt, "credential")?;
        writeln!(out, "Issued {} to {}", WORKSHOP_CREDENTIAL_TYPE, holder_alias)?;
        writeln!(out, "{}", to_string_pretty(&signed.claims.vc)?)?;
        writeln!(out, "{}", vc_jwt)?;
        Ok(vc_jwt)
    }

    /// Presents the holder alias's VC-JWTs against the workshop presentation definition
    /// and prints the signed VP-JWT.
    pub async fn present_jwt<W: Write>(
        &self,
        holder_alias: &str,
        out: &mut W,
    ) -> Result<String, CLIError> {
        let holder = self.get_did(holder_alias, out).await?;
        let vc_jwts = self.credential_jwts.get(holder_alias)?;
        let definition = workshop_presentation_definition();
        let vp_jwt = self
            .orchestrator
            .create_presentation(&holder, &definition, &vc_jwts)?;
        writeln!(out, "Presentation definition {} is valid", definition.id)?;
        writeln!(out, "Credentials of {} satisfy {}", holder_alias, definition.id)?;
        writeln!(out, "{}", vp_jwt)?;
        Ok(vp_jwt)
    }

    /// Verifies a VP-JWT. A failed verification is reported, not returned as an error.
    pub async fn verify<W: Write>(&self, vp_jwt: &str, out: &mut W) -> Result<bool, CLIError> {
        match self.orchestrator.verify_presentation(vp_jwt).await {
            Ok(verified) => {
                writeln!(out, "Presentation verification success")?;
                writeln!(out, "{}", to_string_pretty(&verified)?)?;
                Ok(true)
            }
            Err(err) => {
                writeln!(out, "Presentation verification failure: {}", err)?;
                Ok(false)
            }
        }
    }
}

pub fn cli() -> Command {
    Command::new("DDI CLI")
        .about(format!(
            "DDI CLI v{}\n\nDecentralized digital identity workshop agent.",
            env!("CARGO_PKG_VERSION")
        ))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .allow_external_subcommands(true)
        .subcommand(Command::new("list").about("Lists stored credentials."))
        .subcommand(
            Command::new("receive")
                .about("Receives the credentials of an OpenID4VCI offer.")
                .arg(arg!(<OFFER> "Credential offer link")),
        )
        .subcommand(
            Command::new("present")
                .about("Answers an OpenID4VP presentation request.")
                .arg(arg!(<LINK> "Presentation request link")),
        )
        .subcommand(
            Command::new("createDid")
                .about("Creates a DID.")
                .arg(
                    arg!(-m --method <METHOD>)
                        .value_parser(["key", "peer", "dht"])
                        .default_value("key"),
                )
                .arg(arg!(-a --alias <ALIAS> "Save the DID under this alias").required(false)),
        )
        .subcommand(
            Command::new("listDids")
                .about("Lists the DIDs created by the agent.")
                .arg(
                    arg!(-m --method <METHOD> "Only list DIDs of this method")
                        .value_parser(["key", "peer", "dht"])
                        .required(false),
                ),
        )
        .subcommand(
            Command::new("resolveDid")
                .about("Resolves a DID.")
                .arg(arg!(<DID>)),
        )
        .subcommand(
            Command::new("updateDid")
                .about("Adds a service to a DID document.")
                .arg(arg!(<DID>))
                .arg(arg!(--id <ID> "Service id").required(true))
                .arg(Arg::new("type").long("type").required(true).help("Service type"))
                .arg(arg!(--endpoint <ENDPOINT> "Service endpoint URI").required(true)),
        )
        .subcommand(
            Command::new("issue")
                .about("Issues a workshop VC-JWT from one alias DID to another.")
                .arg(arg!(<ISSUER> "Issuer alias"))
                .arg(arg!(<HOLDER> "Holder alias"))
                .arg(
                    arg!(-l --level <LEVEL> "Expertise level")
                        .default_value(DEFAULT_EXPERTISE_LEVEL),
                ),
        )
        .subcommand(
            Command::new("presentJwt")
                .about("Presents the holder alias's VC-JWTs as a VP-JWT.")
                .arg(arg!(<HOLDER> "Holder alias")),
        )
        .subcommand(
            Command::new("verify")
                .about("Verifies a VP-JWT.")
                .arg(arg!(<VP_JWT>)),
        )
        .subcommand(Command::new("shell").about("Starts the interactive shell."))
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    // Required arguments are enforced by clap before dispatch.
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .unwrap_or_default()
}

/// Runs a parsed single-shot command. Returns `false` for `shell`, which the caller runs.
pub async fn dispatch<W: Write>(
    context: &CliContext,
    matches: &ArgMatches,
    out: &mut W,
) -> Result<bool, CLIError> {
    match matches.subcommand() {
        Some(("list", _)) => context.list(out).await?,
        Some(("receive", sub_matches)) => {
            context.receive(required(sub_matches, "OFFER"), out).await?
        }
        Some(("present", sub_matches)) => {
            context.present(required(sub_matches, "LINK"), out).await?
        }
        Some(("createDid", sub_matches)) => {
            let method: DidMethod = required(sub_matches, "method").parse()?;
            let alias = sub_matches.get_one::<String>("alias").map(String::as_str);
            context.create_did(method, alias, out).await?;
        }
        Some(("listDids", sub_matches)) => {
            let method = sub_matches
                .get_one::<String>("method")
                .map(|method| method.parse::<DidMethod>())
                .transpose()?;
            context.list_dids(method, out).await?
        }
        Some(("resolveDid", sub_matches)) => {
            context.resolve_did(required(sub_matches, "DID"), out).await?
        }
        Some(("updateDid", sub_matches)) => {
            context
                .update_did(
                    required(sub_matches, "DID"),
                    required(sub_matches, "id"),
                    required(sub_matches, "type"),
                    required(sub_matches, "endpoint"),
                    out,
                )
                .await?
        }
        Some(("issue", sub_matches)) => {
            context
                .issue(
                    required(sub_matches, "ISSUER"),
                    required(sub_matches, "HOLDER"),
                    required(sub_matches, "level"),
                    out,
                )
                .await?;
        }
        Some(("presentJwt", sub_matches)) => {
            context.present_jwt(required(sub_matches, "HOLDER"), out).await?;
        }
        Some(("verify", sub_matches)) => {
            context.verify(required(sub_matches, "VP_JWT"), out).await?;
        }
        Some(("shell", _)) => return Ok(false),
        Some((command, _)) => writeln!(out, "Unknown command {}", command)?,
        None => write!(out, "{}", cli().render_help())?,
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_core::credential::IssuedCredential;
    use ddi_core::test_utils::{issue_sd_jwt, test_offer, InMemoryAgent};
    use serde_json::json;

    fn context(agent: InMemoryAgent, data_dir: &Path) -> CliContext {
        let orchestrator = CredentialOrchestrator::new(Arc::new(agent), Arc::new(PathSelector));
        CliContext::new(orchestrator, data_dir, DidMethod::Dht)
    }

    async fn run(context: &CliContext, args: &[&str]) -> Result<String, CLIError> {
        let matches = cli().try_get_matches_from(args).unwrap();
        let mut out = Vec::new();
        dispatch(context, &matches, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_cli_definition() {
        cli().debug_assert();
    }

    #[test]
    fn test_welcome_and_error_message() {
        assert_eq!(
            welcome("Table 7"),
            "Welcome to the Decentralized Digital Identity Workshop! (Table 7)"
        );
        let err = CLIError::from(DDIAPIError::OfferResolutionFailure("gone".to_string()));
        assert_eq!(
            error_message(&err),
            "Error: Credential offer resolution failed: gone"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(InMemoryAgent::new(), dir.path());
        let output = run(&context, &["ddi-cli", "frobnicate"]).await.unwrap();
        assert_eq!(output, "Unknown command frobnicate\n");
        let output = run(&context, &["ddi-cli"]).await.unwrap();
        assert!(output.contains("Usage"));
    }

    #[tokio::test]
    async fn test_receive_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let compact = issue_sd_jwt("Badge", &[("level", json!(3))], None);
        let agent = InMemoryAgent::new().with_offer(
            "offer-1",
            test_offer("Badge"),
            vec![IssuedCredential::SdJwtVc { compact }],
        );
        let context = context(agent, dir.path());

        let output = run(&context, &["ddi-cli", "list"]).await.unwrap();
        assert_eq!(output, "No credentials stored\n");
        let output = run(&context, &["ddi-cli", "receive", "offer-1"]).await.unwrap();
        assert!(output.starts_with("Received 1 credential(s)"));
        let output = run(&context, &["ddi-cli", "list"]).await.unwrap();
        assert!(output.contains("\"type\": \"Badge\""));
        assert!(output.contains("\"level\": 3"));
    }

    #[tokio::test]
    async fn test_create_resolve_and_update_did() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(InMemoryAgent::new(), dir.path());
        let output = run(&context, &["ddi-cli", "createDid", "--method", "dht", "--alias", "alice"])
            .await
            .unwrap();
        let did = output.trim().trim_start_matches("Created and saved did ").to_string();
        assert!(did.starts_with("did:dht:"));
        assert_eq!(context.aliases.get("alice").unwrap().unwrap().uri, did);

        let output = run(&context, &["ddi-cli", "resolveDid", did.as_str()]).await.unwrap();
        assert!(output.contains(&did));

        let output = run(
            &context,
            &[
                "ddi-cli",
                "updateDid",
                did.as_str(),
                "--id",
                "#dwn",
                "--type",
                "DecentralizedWebNode",
                "--endpoint",
                "https://dwn.example.com",
            ],
        )
        .await
        .unwrap();
        assert!(output.contains("DecentralizedWebNode"));
    }

    #[tokio::test]
    async fn test_list_dids() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(InMemoryAgent::new(), dir.path());
        let output = run(&context, &["ddi-cli", "listDids"]).await.unwrap();
        assert_eq!(output, "No DIDs created\n");

        run(&context, &["ddi-cli", "createDid"]).await.unwrap();
        run(&context, &["ddi-cli", "createDid", "-m", "dht"]).await.unwrap();
        let output = run(&context, &["ddi-cli", "listDids"]).await.unwrap();
        assert_eq!(output.lines().count(), 2);
        let output = run(&context, &["ddi-cli", "listDids", "-m", "dht"]).await.unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.starts_with("did:dht:"));
        assert!(output.contains("(dht, created "));
    }

    #[tokio::test]
    async fn test_update_key_did_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(InMemoryAgent::new(), dir.path());
        let output = run(&context, &["ddi-cli", "createDid"]).await.unwrap();
        let did = output.trim().trim_start_matches("Created did ").to_string();
        assert!(did.starts_with("did:key:"));
        let err = run(
            &context,
            &[
                "ddi-cli",
                "updateDid",
                did.as_str(),
                "--id",
                "#dwn",
                "--type",
                "DecentralizedWebNode",
                "--endpoint",
                "https://dwn.example.com",
            ],
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "did:key documents are immutable and cannot be updated"
        );
    }

    #[tokio::test]
    async fn test_shell_returns_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(InMemoryAgent::new(), dir.path());
        let matches = cli().try_get_matches_from(["ddi-cli", "shell"]).unwrap();
        let mut out = Vec::new();
        assert!(!dispatch(&context, &matches, &mut out).await.unwrap());
    }
}
