use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use mailhouse::config::Config;
use mailhouse::server::Server;
use mailhouse::store::{MemoryStore, MessageStore};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    config.validate().context("invalid configuration")?;

    if let Some(path) = &config.db_path {
        info!(
            "persistent storage is not bundled; ignoring --db-path {} and keeping messages in memory",
            path.display()
        );
    }

    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
    store
        .create_mailbox("INBOX")
        .await
        .context("creating INBOX")?;

    let server = Server::bind(config, store)
        .await
        .context("starting server")?;
    info!("listening on {}", server.local_addr()?);

    server.run().await.context("serving")
}
