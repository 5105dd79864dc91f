//! Periodic bot evaluation.
//!
//! One tick:
//! 1. ping the exchange; skip the whole tick if it is unreachable
//! 2. load active bot configurations
//! 3. per bot: build the strategy, evaluate, execute actionable intents,
//!    fold fills into runtime state, persist state
//!
//! Step 3 is isolated per bot: every failure is logged with the bot's
//! identity, recorded in the [`TickReport`] and the loop moves on.
//!
//! Ticks are serialized by `tick_lock`, which `run_tick_now` also takes, so a
//! manual trigger can never overlap a scheduled tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tb_core::config::SchedulerConfig;
use tb_core::gateway::ExchangeGateway;
use tb_core::store::BotStore;
use tb_core::{BotConfiguration, BotId, IntentKind, TradeIntent, TradeRecord};
use tb_td::{ExecutionError, ExecutionOutcome, OrderExecutor};
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;
use crate::performance::{PerformanceMetrics, calculate_performance};
use crate::strategy::Strategy;

/// Where in a bot's iteration something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Configuration,
    StateLoad,
    Execution,
    TradePersistence,
    StatePersistence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotFailure {
    pub bot_id: BotId,
    pub stage: FailureStage,
    pub message: String,
}

/// What happened to one bot during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotOutcome {
    pub bot_id: BotId,
    pub intents: Vec<TradeIntent>,
    pub trades: Vec<TradeRecord>,
    pub diagnostic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<BotOutcome>,
    pub failures: Vec<BotFailure>,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self { started_at, outcomes: Vec::new(), failures: Vec::new() }
    }

    fn fail(&mut self, bot_id: BotId, stage: FailureStage, message: String) {
        self.failures.push(BotFailure { bot_id, stage, message });
    }

    pub fn trade_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.trades.len()).sum()
    }

    pub fn failures_at(&self, stage: FailureStage) -> impl Iterator<Item = &BotFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

/// Read-only view of what a bot would do right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotStatus {
    pub bot_id: BotId,
    pub bot_type: String,
    pub symbol: Option<String>,
    pub is_active: bool,
    pub intents: Vec<TradeIntent>,
    pub last_evaluated_price: Option<f64>,
    pub diagnostic: Option<String>,
}

pub struct BotScheduler {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn BotStore>,
    executor: Arc<OrderExecutor>,
    config: SchedulerConfig,
    tick_lock: Mutex<()>,
}

impl BotScheduler {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn BotStore>,
        executor: Arc<OrderExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self { gateway, store, executor, config, tick_lock: Mutex::new(()) }
    }

    /// Tick loop; returns once `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval();
        let grace = self.config.misfire_grace();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "[scheduler] started: every {}s, grace {}s, mode {:?}",
            period.as_secs(),
            grace.as_secs(),
            self.executor.mode()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                scheduled = interval.tick() => {
                    let late = Instant::now().saturating_duration_since(scheduled);
                    if late > grace {
                        warn!("[scheduler] tick {}ms late, past grace window; skipped", late.as_millis());
                        continue;
                    }
                    match self.run_tick_now().await {
                        Ok(report) => debug!(
                            "[scheduler] tick done: {} bots, {} trades, {} failures",
                            report.outcomes.len(),
                            report.trade_count(),
                            report.failures.len()
                        ),
                        Err(e) => warn!("[scheduler] {e}"),
                    }
                }
            }
        }
        info!("[scheduler] stopped");
    }

    /// Run one full tick now, waiting for any tick already in flight.
    pub async fn run_tick_now(&self) -> Result<TickReport, SchedulerError> {
        let _guard = self.tick_lock.lock().await;
        let now = Utc::now();

        self.gateway.ping().await.map_err(SchedulerError::ExchangeUnavailable)?;

        let bots = self.store.load_active_bot_configurations().await.inspect_err(|e| {
            error!("[scheduler] cannot load bot configurations: {e}");
        })?;

        let mut report = TickReport::new(now);
        for bot in &bots {
            self.process_bot(bot, now, &mut report).await;
        }

        if !report.failures.is_empty() {
            warn!("[scheduler] tick finished with {} failure(s) over {} bots", report.failures.len(), bots.len());
        } else {
            info!("[scheduler] tick finished: {} bots, {} trades", bots.len(), report.trade_count());
        }
        Ok(report)
    }

    async fn process_bot(&self, bot: &BotConfiguration, now: DateTime<Utc>, report: &mut TickReport) {
        let tag = format!("[bot-{}]", bot.id);
        let symbol = bot.symbol().unwrap_or_default();

        let strategy = match Strategy::from_config(bot) {
            Ok(s) => s,
            Err(e) => {
                error!("{tag} type={} symbol={symbol}: {e}", bot.bot_type);
                report.fail(bot.id, FailureStage::Configuration, e.to_string());
                return;
            }
        };

        let stored = match self.store.load_runtime_state(bot.id).await {
            Ok(s) => s,
            Err(e) => {
                error!("{tag} type={} symbol={symbol}: state load failed: {e}", bot.bot_type);
                report.fail(bot.id, FailureStage::StateLoad, e.to_string());
                return;
            }
        };

        let evaluation = strategy.evaluate(self.gateway.as_ref(), stored, now).await;
        if let Some(d) = &evaluation.diagnostic {
            info!("{tag} {} {symbol}: holding, {d}", strategy.bot_type());
        }

        let mut state = evaluation.state;
        let mut trades = Vec::new();
        for intent in evaluation.intents.iter().filter(|i| i.is_actionable()) {
            match self.executor.execute(intent, bot.id).await {
                Ok(ExecutionOutcome::Filled(record)) => {
                    strategy.apply_fill(&mut state, intent, &record);
                    trades.push(record);
                }
                Ok(ExecutionOutcome::NotFilled { order_id, status, quantity }) => {
                    info!("{tag} {} {symbol}: order {order_id} accepted, {status:?}", intent.kind.label());
                    strategy.apply_pending(&mut state, intent, &order_id, quantity);
                }
                Err(ExecutionError::TradeRecordNotPersisted { record, source }) => {
                    error!(
                        "{tag} {} {symbol}: executed but trade record NOT persisted: {source}",
                        intent.kind.label()
                    );
                    strategy.apply_fill(&mut state, intent, &record);
                    report.fail(bot.id, FailureStage::TradePersistence, source.to_string());
                    trades.push(*record);
                }
                Err(e @ (ExecutionError::ZeroQuantity { .. } | ExecutionError::BelowMinNotional { .. }))
                    if intent.kind == IntentKind::TrailingStopSell =>
                {
                    if strategy.release_dust(&mut state, intent) {
                        warn!("{tag} {} {symbol}: position too small to sell, written off: {e}", intent.kind.label());
                    } else {
                        warn!("{tag} {} {symbol}: {e}", intent.kind.label());
                        report.fail(bot.id, FailureStage::Execution, e.to_string());
                    }
                }
                Err(e) => {
                    warn!("{tag} {} {symbol}: {e}", intent.kind.label());
                    report.fail(bot.id, FailureStage::Execution, e.to_string());
                }
            }
        }

        if let Err(e) = self.store.persist_runtime_state(bot.id, &state).await {
            error!("{tag} type={} symbol={symbol}: runtime state NOT persisted: {e}", bot.bot_type);
            report.fail(bot.id, FailureStage::StatePersistence, e.to_string());
        }

        report.outcomes.push(BotOutcome {
            bot_id: bot.id,
            intents: evaluation.intents,
            trades,
            diagnostic: evaluation.diagnostic,
        });
    }

    /// Evaluate a bot without executing or persisting anything.
    pub async fn bot_status(&self, bot_id: BotId) -> Result<BotStatus, SchedulerError> {
        let bot = self
            .store
            .load_bot_configuration(bot_id)
            .await?
            .ok_or(SchedulerError::BotNotFound(bot_id))?;

        let mut status = BotStatus {
            bot_id,
            bot_type: bot.bot_type.clone(),
            symbol: bot.symbol(),
            is_active: bot.is_active,
            intents: Vec::new(),
            last_evaluated_price: None,
            diagnostic: None,
        };

        let strategy = match Strategy::from_config(&bot) {
            Ok(s) => s,
            Err(e) => {
                status.diagnostic = Some(e.to_string());
                return Ok(status);
            }
        };
        let stored = self.store.load_runtime_state(bot_id).await?;
        let evaluation = strategy.evaluate(self.gateway.as_ref(), stored, Utc::now()).await;

        status.intents = evaluation.intents;
        status.last_evaluated_price = evaluation.reference_price;
        status.diagnostic = evaluation.diagnostic;
        Ok(status)
    }

    pub async fn performance(&self, bot_id: BotId) -> Result<PerformanceMetrics, SchedulerError> {
        let history = self.store.trade_history(bot_id).await?;
        Ok(calculate_performance(&history))
    }
}
