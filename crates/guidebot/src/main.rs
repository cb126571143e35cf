use std::sync::Arc;

use guidebot_core::{config::Config, store::Store};

#[tokio::main]
async fn main() -> Result<(), guidebot_core::Error> {
    guidebot_core::logging::init("guidebot")?;

    let cfg = Arc::new(Config::load()?);
    let store = Store::open(&cfg.database_path)?;
    let providers = guidebot_yandex::providers_from(&cfg);

    guidebot_telegram::router::run_polling(cfg, store, providers)
        .await
        .map_err(|e| guidebot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
