//! DDI CLI binary
use clap::ArgMatches;
use ddi_cli::config::cli_config;
use ddi_cli::{cli, dispatch, error_message, shell, welcome, CliContext};
use ddi_wallet::config::{data_dir, wallet_config};
use std::io::{stdin, stdout};
use std::process::ExitCode;

async fn run(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let wallet_config = wallet_config()?;
    println!("{}", welcome(&wallet_config.label));

    let context = CliContext::open(wallet_config, &data_dir())?;
    let mut out = stdout();
    if !dispatch(&context, matches, &mut out).await? {
        shell::run(&context, stdin().lock(), &mut out, &cli_config()?.prompt).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match run(&matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error_message(&err));
            ExitCode::FAILURE
        }
    }
}
