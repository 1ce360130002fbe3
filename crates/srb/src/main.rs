use std::sync::Arc;

use srb_core::{
    config::Config,
    store::{MemoryStore, StateStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    srb_core::logging::init("srb")?;

    let cfg = Arc::new(Config::load()?);
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

    srb_telegram::runner::run_polling(cfg, store).await
}
