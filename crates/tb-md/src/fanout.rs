//! Per-symbol fan-out hub.
//!
//! The first `subscribe` for a symbol spawns its upstream listener; the last
//! `unsubscribe` cancels it. The listener reconnects with a fixed backoff on
//! any stream error and only exits when cancelled or when every subscriber
//! queue has been dropped.
//!
//! Delivery uses `try_send` on bounded per-subscriber queues: a closed queue
//! is removed, a full one misses that tick, and neither holds up the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use futures_util::StreamExt;
use tb_core::PriceTick;
use tb_core::config::FanoutConfig;
use tb_core::gateway::ExchangeGateway;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifies one subscription; pass back to [`MarketDataHub::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    symbol: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::Receiver<PriceTick>,
}

struct SymbolFeed {
    generation: u64,
    subscribers: AHashMap<u64, mpsc::Sender<PriceTick>>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

type Feeds = Arc<Mutex<AHashMap<String, SymbolFeed>>>;

fn lock(feeds: &Feeds) -> MutexGuard<'_, AHashMap<String, SymbolFeed>> {
    feeds.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct MarketDataHub {
    gateway: Arc<dyn ExchangeGateway>,
    config: FanoutConfig,
    feeds: Feeds,
    next_id: AtomicU64,
}

impl MarketDataHub {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: FanoutConfig) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            config,
            feeds: Arc::new(Mutex::new(AHashMap::new())),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a subscriber, starting the symbol's listener if none is running.
    pub fn subscribe(&self, symbol: &str) -> Subscription {
        let symbol = symbol.trim().to_ascii_uppercase();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));

        let mut feeds = lock(&self.feeds);
        let needs_listener = feeds.get(&symbol).is_none_or(|f| f.task.is_finished());
        if needs_listener {
            let generation = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (cancel, cancel_rx) = watch::channel(false);
            let task = tokio::spawn(run_listener(
                self.gateway.clone(),
                self.feeds.clone(),
                symbol.clone(),
                generation,
                cancel_rx,
                self.config.reconnect_backoff(),
            ));
            let subscribers = feeds.remove(&symbol).map(|old| old.subscribers).unwrap_or_default();
            feeds.insert(symbol.clone(), SymbolFeed { generation, subscribers, cancel, task });
            info!("[fanout-{symbol}] listener started");
        }
        if let Some(feed) = feeds.get_mut(&symbol) {
            feed.subscribers.insert(id, tx);
            debug!("[fanout-{symbol}] subscriber {id} added ({} total)", feed.subscribers.len());
        }

        Subscription { handle: SubscriptionHandle { symbol, id }, receiver: rx }
    }

    /// Remove a subscriber. Removing the last one stops the listener and
    /// waits for it to release its upstream stream.
    ///
    /// The listener is cancelled before the registry lock is released, so a
    /// concurrent `subscribe` never sees the symbol free while the old
    /// listener is still live.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let stopped = {
            let mut feeds = lock(&self.feeds);
            let Some(feed) = feeds.get_mut(&handle.symbol) else {
                return;
            };
            feed.subscribers.remove(&handle.id);
            if !feed.subscribers.is_empty() {
                return;
            }
            let Some(feed) = feeds.remove(&handle.symbol) else {
                return;
            };
            let _ = feed.cancel.send(true);
            feed.task
        };
        info!("[fanout-{}] last subscriber left, stopping listener", handle.symbol);
        let _ = stopped.await;
    }

    /// Running upstream listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.feeds).values().filter(|f| !f.task.is_finished()).count()
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        lock(&self.feeds)
            .get(&symbol.trim().to_ascii_uppercase())
            .map_or(0, |f| f.subscribers.len())
    }

    /// Cancel every listener and drop every subscriber.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, SymbolFeed)> = lock(&self.feeds).drain().collect();
        for (symbol, feed) in drained {
            let _ = feed.cancel.send(true);
            let _ = feed.task.await;
            debug!("[fanout-{symbol}] listener stopped on shutdown");
        }
        info!("[fanout] hub shut down");
    }
}

/// Hand a tick to every subscriber of `symbol`. Returns `false` when this
/// listener should stop: its feed was replaced or no subscriber remains.
fn deliver(feeds: &Feeds, symbol: &str, generation: u64, tick: &PriceTick) -> bool {
    let mut feeds = lock(feeds);
    let Some(feed) = feeds.get_mut(symbol).filter(|f| f.generation == generation) else {
        return false;
    };
    feed.subscribers.retain(|id, tx| match tx.try_send(tick.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("[fanout-{symbol}] subscriber {id} is behind, tick dropped");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!("[fanout-{symbol}] subscriber {id} gone");
            false
        }
    });
    if feed.subscribers.is_empty() {
        feeds.remove(symbol);
        return false;
    }
    true
}

async fn run_listener(
    gateway: Arc<dyn ExchangeGateway>,
    feeds: Feeds,
    symbol: String,
    generation: u64,
    mut cancel: watch::Receiver<bool>,
    backoff: Duration,
) {
    let tag = format!("[fanout-{symbol}]");
    'outer: loop {
        if *cancel.borrow() {
            break;
        }
        let opened = tokio::select! {
            r = gateway.open_price_stream(&symbol) => r,
            _ = cancel.changed() => break,
        };
        match opened {
            Ok(mut stream) => {
                info!("{tag} upstream connected");
                loop {
                    tokio::select! {
                        _ = cancel.changed() => break 'outer,
                        item = stream.next() => match item {
                            Some(Ok(tick)) => {
                                if !deliver(&feeds, &symbol, generation, &tick) {
                                    info!("{tag} no subscribers left");
                                    break 'outer;
                                }
                            }
                            Some(Err(e)) => {
                                warn!("{tag} stream error: {e}");
                                break;
                            }
                            None => {
                                warn!("{tag} upstream ended");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => warn!("{tag} connect failed: {e}"),
        }

        info!("{tag} reconnecting in {}ms", backoff.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.changed() => break,
        }
    }
    info!("{tag} listener stopped");
}
