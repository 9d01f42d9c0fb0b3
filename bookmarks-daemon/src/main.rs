use std::path::Path;

use reqwest::{redirect, ClientBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bookmarks_core::{spawn_crawler, AppConfig, SqliteStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Config path may be given as the first argument, otherwise the
    // platform config dir is used.
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from(Path::new(&path)),
        None => AppConfig::load(),
    };

    let store = SqliteStore::open(&config.database_url).await?;
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent("bookmarks-daemon/0.1")
        .build()?;

    let crawler = spawn_crawler(store, config.crawler.clone(), client);
    info!("bookmark crawler running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    crawler.stop().await?;
    info!("shut down cleanly");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
