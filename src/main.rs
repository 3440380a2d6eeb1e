use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use blockdrop::api::{self, AppState};
use blockdrop::config::Config;
use blockdrop::init::setup_logging;
use blockdrop::store::{BlocklistStore, BLOCKLIST_FILE};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting blockdrop...");

    if !std::path::Path::new(&config_path).exists() {
        info!("Config file not found, using defaults.");
    }

    config.ensure_api_key()?;

    // 3. Init Store & Shared State
    let store = BlocklistStore::new(&config);
    info!("Blocklist file: {}", store.path().display());
    let state = Arc::new(AppState {
        store,
        config: config.clone(),
    });

    // 4. Bind
    let addr = SocketAddr::new(
        config
            .host
            .parse()
            .with_context(|| format!("Invalid host address: {}", config.host))?,
        config.port,
    );
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    print_bookmarklet(&config);

    // 5. Serve until Shutdown
    tokio::select! {
        result = api::serve(listener, state) => result?,
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    Ok(())
}

/// Prints the one-click "block this page" bookmarklet for the operator to
/// copy into their browser.
fn print_bookmarklet(config: &Config) {
    info!(
        "Bookmarklet code below. Replace <SERVER_ADDRESS> with the address \
         (including protocol and port) your browser reaches this server at:"
    );
    info!(
        "\n    javascript:(()=>{{window.open(\"<SERVER_ADDRESS>/block?key={}&url=\"+encodeURIComponent(location),\"_blank\",\"noreferrer,noopener\")}})()\n",
        config.api_key
    );
    info!("Then subscribe to <SERVER_ADDRESS>/{BLOCKLIST_FILE} from your blocker of choice.");
}
