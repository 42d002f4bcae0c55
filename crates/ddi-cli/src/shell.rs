//! Interactive shell: reads `<command> <args…>` lines and runs each to completion in turn.
use crate::{error_message, CLIError, CliContext, DEFAULT_EXPERTISE_LEVEL};
use log::debug;
use std::io::{BufRead, Write};

const ADD_SERVICE_ARGS: [&str; 4] = ["alias", "id", "type", "endpoint"];
const ISSUE_ARGS: [&str; 2] = ["issuerAlias", "holderAlias"];
const ADD_DIDCOMM_SERVICE_ARGS: [&str; 2] = ["alias", "uri"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellOutcome {
    Continue,
    Exit,
}

fn missing_argument<W: Write>(out: &mut W, command: &str, argument: &str) -> Result<(), CLIError> {
    writeln!(out, "Command {} requires {} argument", command, argument)?;
    Ok(())
}

/// Runs one shell line. Command failures are returned for the caller to report.
pub async fn execute_line<W: Write>(
    context: &CliContext,
    line: &str,
    out: &mut W,
) -> Result<ShellOutcome, CLIError> {
    let mut words = line.split_whitespace();
    let command = match words.next() {
        Some(command) => command,
        None => return Ok(ShellOutcome::Continue),
    };
    let args: Vec<&str> = words.collect();
    debug!("Shell command {} with {} argument(s)", command, args.len());

    match (command, args.as_slice()) {
        ("exit", _) => return Ok(ShellOutcome::Exit),
        ("createDid", [alias, ..]) => {
            context
                .create_did(context.alias_method, Some(*alias), out)
                .await?;
        }
        ("createDid", []) | ("getDid", []) => missing_argument(out, command, "alias")?,
        ("resolveDid", [did, ..]) => context.resolve_did(did, out).await?,
        ("resolveDid", []) => missing_argument(out, command, "DID")?,
        ("getDid", [alias, ..]) => {
            context.get_did(alias, out).await?;
        }
        ("addService", [alias, id, type_, endpoint, ..]) => {
            context.add_service(alias, id, type_, endpoint, out).await?
        }
        ("addService", given) => missing_argument(out, command, ADD_SERVICE_ARGS[given.len()])?,
        ("list", _) => context.list(out).await?,
        ("receive", [offer, ..]) => context.receive(offer, out).await?,
        ("receive", []) => missing_argument(out, command, "offer")?,
        ("present", [link, ..]) => context.present(link, out).await?,
        ("present", []) => missing_argument(out, command, "link")?,
        ("addDidCommService", [alias, uri, routing_keys @ ..]) => {
            let routing_keys: Vec<String> = routing_keys.iter().map(|k| k.to_string()).collect();
            context
                .add_didcomm_service(alias, uri, &routing_keys, out)
                .await?
        }
        ("addDidCommService", given) => {
            missing_argument(out, command, ADD_DIDCOMM_SERVICE_ARGS[given.len()])?
        }
        ("issue", [issuer, holder, level @ ..]) => {
            let level = level.first().copied().unwrap_or(DEFAULT_EXPERTISE_LEVEL);
            context.issue(issuer, holder, level, out).await?;
        }
        ("issue", given) => missing_argument(out, command, ISSUE_ARGS[given.len()])?,
        ("presentJwt", [holder, ..]) => {
            context.present_jwt(holder, out).await?;
        }
        ("presentJwt", []) => missing_argument(out, command, "holderAlias")?,
        ("verify", [vp_jwt, ..]) => {
            context.verify(vp_jwt, out).await?;
        }
        ("verify", []) => missing_argument(out, command, "vpJwt")?,
        _ => writeln!(out, "Unknown command {}", command)?,
    }
    Ok(ShellOutcome::Continue)
}

/// Reads lines from `input` until `exit` or end of input. Errors are printed and the shell
/// carries on.
pub async fn run<R: BufRead, W: Write>(
    context: &CliContext,
    input: R,
    out: &mut W,
    prompt: &str,
) -> Result<(), CLIError> {
    write!(out, "{}", prompt)?;
    out.flush()?;
    for line in input.lines() {
        match execute_line(context, &line?, out).await {
            Ok(ShellOutcome::Exit) => break,
            Ok(ShellOutcome::Continue) => (),
            Err(err) => writeln!(out, "{}", error_message(&err))?,
        }
        write!(out, "{}", prompt)?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddi_api::CredentialOrchestrator;
    use ddi_core::did::{DidMethod, PortableDid};
    use ddi_core::presentation::PathSelector;
    use ddi_core::test_utils::InMemoryAgent;
    use std::path::Path;
    use std::sync::Arc;

    fn context(data_dir: &Path) -> CliContext {
        let orchestrator =
            CredentialOrchestrator::new(Arc::new(InMemoryAgent::new()), Arc::new(PathSelector));
        CliContext::new(orchestrator, data_dir, DidMethod::Dht)
    }

    async fn session(context: &CliContext, input: &str) -> String {
        let mut out = Vec::new();
        run(context, input.as_bytes(), &mut out, "> ").await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_missing_arguments_and_unknown_command() {
        let dir = tempfile::tempdir().unwrap();
        let output = session(
            &context(dir.path()),
            "createDid\nresolveDid\naddService alice #dwn\nfly away\n",
        )
        .await;
        assert!(output.contains("Command createDid requires alias argument\n"));
        assert!(output.contains("Command resolveDid requires DID argument\n"));
        assert!(output.contains("Command addService requires type argument\n"));
        assert!(output.contains("Unknown command fly\n"));
    }

    #[tokio::test]
    async fn test_alias_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        let output = session(
            &context,
            "createDid alice\n\ngetDid alice\naddService alice #dwn DecentralizedWebNode https://dwn.example.com\nexit\nlist\n",
        )
        .await;
        assert!(output.contains("Created and saved did did:dht:"));
        assert!(output.contains("Loaded alice did did:dht:"));
        assert!(output.contains("Added service #dwn to alice"));
        // Nothing runs after exit.
        assert!(!output.contains("No credentials stored"));

        let saved = context.aliases.get("alice").unwrap().unwrap();
        let services = saved.document.service.unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, "#dwn");
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_the_shell() {
        let dir = tempfile::tempdir().unwrap();
        let output = session(&context(dir.path()), "getDid bob\nlist\n").await;
        assert!(output.contains("Error: No DID saved under alias: bob"));
        assert!(output.contains("No credentials stored"));
    }

    #[tokio::test]
    async fn test_exit() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        let mut out = Vec::new();
        assert_eq!(
            execute_line(&context, "exit", &mut out).await.unwrap(),
            ShellOutcome::Exit
        );
        assert_eq!(
            execute_line(&context, "   ", &mut out).await.unwrap(),
            ShellOutcome::Continue
        );
        assert!(out.is_empty());
    }

    fn keyed_did(did: &str) -> PortableDid {
        let jwk = ssi::jwk::JWK::generate_ed25519().unwrap();
        let document = serde_json::from_value(serde_json::json!({
            "@context": "https://www.w3.org/ns/did/v1",
            "id": did,
            "verificationMethod": [{
                "id": format!("{did}#0"),
                "type": "JsonWebKey2020",
                "controller": did,
                "publicKeyJwk": jwk.to_public()
            }]
        }))
        .unwrap();
        PortableDid {
            uri: did.to_string(),
            document,
            private_keys: vec![jwk],
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_issue_present_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        context.aliases.save("acme", keyed_did("did:dht:acme")).unwrap();
        context.aliases.save("ada", keyed_did("did:dht:ada")).unwrap();

        let output = session(&context, "issue acme ada Expert
presentJwt ada
").await;
        assert!(output.contains("Issued WorkshopCompletionCredential to ada"));
        assert!(output.contains("\"expertiseLevel\": \"Expert\""));
        assert!(output.contains("Presentation definition ddi-workshop-attendance is valid"));
        assert!(output.contains("Credentials of ada satisfy ddi-workshop-attendance"));
        assert_eq!(context.credential_jwts.get("ada").unwrap().len(), 1);

        let vp_jwt = output
            .lines()
            .skip_while(|line| !line.starts_with("Credentials of ada"))
            .nth(1)
            .unwrap()
            .to_string();
        let output = session(&context, &format!("verify {vp_jwt}
")).await;
        assert!(output.contains("Presentation verification success"));
        assert!(output.contains("\"holder\": \"did:dht:ada\""));

        let output = session(&context, "verify not.a.jwt
").await;
        assert!(output.contains("Presentation verification failure: "));
    }

    #[tokio::test]
    async fn test_present_without_workshop_credential() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        context.aliases.save("ada", keyed_did("did:dht:ada")).unwrap();
        let output = session(&context, "presentJwt ada
").await;
        assert!(output.contains(
            "Error: Rejected: Verifiable credentials do not satisfy presentation definition"
        ));
    }

    #[tokio::test]
    async fn test_credential_commands_require_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let output = session(
            &context(dir.path()),
            "issue
issue acme
presentJwt
verify
addDidCommService alice
",
        )
        .await;
        assert!(output.contains("Command issue requires issuerAlias argument\n"));
        assert!(output.contains("Command issue requires holderAlias argument\n"));
        assert!(output.contains("Command presentJwt requires holderAlias argument\n"));
        assert!(output.contains("Command verify requires vpJwt argument\n"));
        assert!(output.contains("Command addDidCommService requires uri argument\n"));
    }

    #[tokio::test]
    async fn test_add_didcomm_service() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());
        let output = session(
            &context,
            "createDid alice
addDidCommService alice https://dev.aries.chat did:key:z6Mkmediator
",
        )
        .await;
        assert!(output.contains("Added service #didcomm-1 to alice"));

        let saved = context.aliases.get("alice").unwrap().unwrap();
        let service = serde_json::to_value(&saved.document.service.unwrap()[0]).unwrap();
        assert_eq!(service["type"], "DIDCommMessaging");
        assert_eq!(service["serviceEndpoint"]["uri"], "https://dev.aries.chat");
        assert_eq!(
            service["serviceEndpoint"]["routingKeys"],
            serde_json::json!(["did:key:z6Mkmediator"])
        );
    }
}
