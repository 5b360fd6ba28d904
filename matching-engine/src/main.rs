use anyhow::Result;
use clap::Parser;
use exchange_api::{BroadcastSink, UsEquityCalendar};
use log::info;
use matching_engine::config::EngineConfig;
use matching_engine::engine::Engine;
use matching_engine::io::Args;
use matching_engine::ledger::MemoryLedger;
use quote_gateway::{BackupProvider, PrimaryProvider, QuoteResolver};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Arc::new(match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    });

    let api_key = std::env::var("PRIMARY_QUOTE_API_KEY").unwrap_or_default();
    let resolver = Arc::new(QuoteResolver::new(
        Box::new(PrimaryProvider::new(args.primary_url, api_key)?),
        Box::new(BackupProvider::new(args.backup_url)?),
        config.resolver.clone(),
    ));

    let ledger = Arc::new(MemoryLedger::new());
    let events = Arc::new(BroadcastSink::new(1024));
    let engine = Engine::new(
        ledger,
        resolver,
        events,
        Arc::new(UsEquityCalendar),
        Arc::clone(&config),
    );

    let sweep = Arc::new(engine.recovery_sweep());
    let sweep_task = sweep.spawn();
    info!(
        "matching engine up; sweep every {}s, claim timeout {}s",
        config.sweep_interval_secs, config.claim_timeout_secs
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    sweep_task.abort();
    engine.registry().shutdown().await;
    Ok(())
}
