//! # tb-runner
//!
//! Entry point for the trading bot runtime.
//!
//! Loads a JSON configuration file, seeds the configured bots into the store,
//! then runs the bot scheduler and the market-data hub (plus the optional
//! WebSocket relay) until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! tb-runner config.json --log-level info
//! tb-runner config.json --once --dry-run   # one simulated tick, then exit
//! tb-runner config.json --status 3         # what bot 3 would do right now
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tb_bot::BotScheduler;
use tb_core::config::{AppConfig, ExecutionMode};
use tb_core::gateway::ExchangeGateway;
use tb_core::store::{BotStore, JsonFileStore, MemoryStore};
use tb_md::{MarketDataHub, RelayServer};
use tb_td::{BinanceConfig, BinanceGateway, OrderExecutor, RulesCache};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Trading bot scheduler and market-data relay.
#[derive(Parser)]
#[command(name = "tb-runner", about = "Trading bot scheduler and market-data relay")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output; overrides `app.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Run a single scheduler tick, print its report and exit.
    #[arg(long)]
    once: bool,

    /// Force simulated execution regardless of the configured mode.
    #[arg(long)]
    dry_run: bool,

    /// Print the status and performance of one bot and exit.
    #[arg(long, value_name = "BOT_ID")]
    status: Option<i64>,
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn BotStore>> {
    let store: Arc<dyn BotStore> = match &config.store.path {
        Some(path) => Arc::new(
            JsonFileStore::open(path)
                .await
                .with_context(|| format!("opening store at {path}"))?,
        ),
        None => {
            warn!("no store.path configured; trades and state are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    for bot in &config.bots {
        store.upsert_bot_configuration(bot.clone()).await?;
    }
    info!("store ready, {} bot(s) seeded", config.bots.len());
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = tb_core::config::load_config(&cli.config)?;
    let log_dir = cli.log_dir.clone().or_else(|| config.app.log_path.clone());
    let _log_guard = tb_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.app.module_name);
    info!("tb-runner starting, config={}, log_level={}", cli.config.display(), cli.log_level);

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(BinanceGateway::new(BinanceConfig::from_value(&config.exchange)?)?);
    let store = open_store(&config).await?;

    let mode = if cli.dry_run { ExecutionMode::Simulated } else { config.scheduler.execution_mode };
    if mode == ExecutionMode::Live {
        warn!("LIVE execution enabled: orders will be sent to the exchange");
    }
    let executor = Arc::new(OrderExecutor::new(gateway.clone(), store.clone(), RulesCache::new(), mode));
    let scheduler = Arc::new(BotScheduler::new(gateway.clone(), store.clone(), executor, config.scheduler.clone()));

    if let Some(bot_id) = cli.status {
        let status = scheduler.bot_status(bot_id).await?;
        let performance = scheduler.performance(bot_id).await?;
        println!("{}", serde_json::to_string_pretty(&status)?);
        println!("{}", serde_json::to_string_pretty(&performance)?);
        return Ok(());
    }

    if cli.once {
        let report = scheduler.run_tick_now().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = {
        let scheduler = scheduler.clone();
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(rx).await })
    };

    let hub = MarketDataHub::new(gateway.clone(), config.fanout.clone());
    let relay_task = match &config.fanout.relay_addr {
        Some(addr) => {
            let relay = RelayServer::bind(addr, hub.clone())
                .await
                .with_context(|| format!("binding relay on {addr}"))?;
            Some(tokio::spawn(relay.run(shutdown_rx.clone())))
        }
        None => None,
    };

    info!("running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!("scheduler task failed: {e}");
    }
    if let Some(task) = relay_task {
        if let Err(e) = task.await {
            error!("relay task failed: {e}");
        }
    }
    hub.shutdown().await;

    info!("stopped, goodbye");
    Ok(())
}
