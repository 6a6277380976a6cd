mod app;
mod bot;
mod config;
mod db;
mod models;
mod store;
mod telemetry;
mod validate;

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::Bot;
use tracing::info;
use tracing::warn;

use crate::store::MemoryStore;
use crate::store::PreferenceStore;

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init()?;
  let config = config::Config::from_env()?;
  info!(default_timezone = config.default_timezone.name(), "starting bot");

  let store: Arc<dyn PreferenceStore> = match config.database_url.as_deref() {
    Some(url) => {
      let store = db::PgStore::connect(url, config.database_max_connections, config.defaults()).await?;
      info!(max_connections = config.database_max_connections, "connected to postgres");
      Arc::new(store)
    },
    None => {
      warn!("DATABASE_URL not set, preferences will not survive a restart");
      Arc::new(MemoryStore::new(config.defaults()))
    },
  };

  let bot = Bot::new(config.bot_token.clone());
  let app = app::App::new(bot, store);
  app.run().await
}
