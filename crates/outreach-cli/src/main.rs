use std::sync::Arc;

use outreach_core::config::OutreachConfig;
use outreach_engine::context::UnipileClientFactory;
use outreach_lm::provider::AnthropicLlmProvider;
use outreach_scheduler::SchedulerEngine;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    outreach_core::logging::init_tracing();

    let config_path = std::env::var("OUTREACH_CONFIG").ok();
    let config = OutreachConfig::load(config_path.as_deref())?;

    let conn = outreach_db::open(&config.database.path)?;
    let messaging_factory = Arc::new(UnipileClientFactory::new(&config));
    let lm: Arc<dyn outreach_lm::provider::LlmProvider> = Arc::new(AnthropicLlmProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
    ));

    let engine = SchedulerEngine::new(conn, config, messaging_factory, lm);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = engine_handle.await;

    Ok(())
}
