use hit_counter::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = StoreConfig::from_env()?;
    let store: SharedStore = Arc::new(RedisStore::new(&config)?);
    app(store).start().await
}
