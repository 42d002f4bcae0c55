use ddi_http::config::http_config;
use ddi_http::server;
use ddi_http::state::AppState;
use ddi_wallet::config::{data_dir, wallet_config};
use log::info;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = http_config()?;
    let wallet_config = wallet_config()?;
    info!("{}", config);
    info!("{}", wallet_config);

    let app_state = Arc::new(AppState::new(config, wallet_config, &data_dir())?);
    let addr = app_state.config.to_address();
    let server = server::server(app_state)?;
    info!("App started at http://{}", addr);
    server.await?;

    Ok(())
}
