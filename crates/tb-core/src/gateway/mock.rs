//! Scripted in-process gateway for tests.
//!
//! Tickers, candles and rules are plain lookups. Orders are answered by a
//! configurable responder (default: fully filled at the ticker or limit
//! price) and logged for inspection. Price streams are backed by unbounded
//! channels so a test can push ticks and observe how many upstream
//! connections are currently open.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::{ExchangeGateway, PriceStream};
use crate::error::ExchangeError;
use crate::types::{
    Candle, Fill, OrderRequest, OrderResult, OrderStatus, OrderType, PriceTick, SymbolTradingRules,
};

type OrderResponder = Box<dyn Fn(&OrderRequest) -> Result<OrderResult, ExchangeError> + Send + Sync>;
type StreamSender = mpsc::UnboundedSender<Result<PriceTick, ExchangeError>>;

#[derive(Default)]
struct MockState {
    tickers: AHashMap<String, f64>,
    candles: AHashMap<(String, String), Vec<Candle>>,
    rules: AHashMap<String, SymbolTradingRules>,
    orders: Vec<OrderRequest>,
    streams: AHashMap<String, Vec<StreamSender>>,
    stream_opens: AHashMap<String, usize>,
    failing_streams: AHashMap<String, usize>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
    responder: Mutex<Option<OrderResponder>>,
    ping_ok: AtomicBool,
    next_order_id: AtomicU64,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            responder: Mutex::new(None),
            ping_ok: AtomicBool::new(true),
            next_order_id: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- scripting --

    pub fn set_ping_ok(&self, ok: bool) {
        self.ping_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_ticker(&self, symbol: &str, price: f64) {
        self.state().tickers.insert(symbol.to_string(), price);
    }

    pub fn set_candles(&self, symbol: &str, interval: &str, candles: Vec<Candle>) {
        self.state().candles.insert((symbol.to_string(), interval.to_string()), candles);
    }

    pub fn set_rules(&self, symbol: &str, rules: SymbolTradingRules) {
        self.state().rules.insert(symbol.to_string(), rules);
    }

    /// Replace the default fill-everything order behaviour.
    pub fn set_order_responder<F>(&self, f: F)
    where
        F: Fn(&OrderRequest) -> Result<OrderResult, ExchangeError> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(f));
    }

    /// The next `count` attempts to open a stream for `symbol` fail.
    pub fn fail_next_stream_opens(&self, symbol: &str, count: usize) {
        self.state().failing_streams.insert(symbol.to_string(), count);
    }

    // -- inspection --

    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.state().orders.clone()
    }

    /// Total successful `open_price_stream` calls for `symbol`.
    pub fn stream_open_count(&self, symbol: &str) -> usize {
        self.state().stream_opens.get(symbol).copied().unwrap_or(0)
    }

    /// Streams for `symbol` whose consumer is still alive.
    pub fn live_streams(&self, symbol: &str) -> usize {
        let mut state = self.state();
        let Some(senders) = state.streams.get_mut(symbol) else {
            return 0;
        };
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    /// Deliver a tick on every live stream for its symbol; returns how many received it.
    pub fn push_tick(&self, tick: PriceTick) -> usize {
        let mut state = self.state();
        let Some(senders) = state.streams.get_mut(&tick.symbol) else {
            return 0;
        };
        senders.retain(|tx| tx.send(Ok(tick.clone())).is_ok());
        senders.len()
    }

    /// Break every live stream for `symbol` with a `StreamClosed` error.
    pub fn break_streams(&self, symbol: &str) {
        if let Some(senders) = self.state().streams.remove(symbol) {
            for tx in senders {
                let _ = tx.send(Err(ExchangeError::StreamClosed(format!("{symbol} dropped"))));
            }
        }
    }

    fn default_fill(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst).to_string();
        let price = match (request.order_type, request.price) {
            (OrderType::Limit, Some(p)) => p,
            _ => self
                .state()
                .tickers
                .get(&request.symbol)
                .copied()
                .ok_or_else(|| ExchangeError::SymbolUnknown(request.symbol.clone()))?,
        };
        let qty = match (request.quantity, request.quote_order_qty) {
            (Some(q), _) => q,
            (None, Some(quote)) if price > 0.0 => quote / price,
            _ => 0.0,
        };
        Ok(OrderResult {
            order_id,
            client_order_id: request.client_order_id.clone(),
            status: OrderStatus::Filled,
            executed_qty: qty,
            price: request.price.unwrap_or(0.0),
            cumulative_quote_qty: qty * price,
            fills: vec![Fill { price, qty, commission: 0.0, commission_asset: String::new() }],
        })
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn ping(&self) -> Result<(), ExchangeError> {
        if self.ping_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExchangeError::Unavailable("mock ping failure".into()))
        }
    }

    async fn get_ticker(&self, symbol: &str) -> Result<f64, ExchangeError> {
        self.state()
            .tickers
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolUnknown(symbol.to_string()))
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        _start_time_ms: Option<i64>,
        _end_time_ms: Option<i64>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let state = self.state();
        let candles = state
            .candles
            .get(&(symbol.to_string(), interval.to_string()))
            .ok_or_else(|| ExchangeError::Unavailable(format!("no candles for {symbol} {interval}")))?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }

    async fn get_symbol_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError> {
        self.state()
            .rules
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::SymbolUnknown(symbol.to_string()))
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        self.state().orders.push(request.clone());
        let responder = self.responder.lock().unwrap_or_else(PoisonError::into_inner);
        match responder.as_ref() {
            Some(f) => f(request),
            None => {
                drop(responder);
                self.default_fill(request)
            }
        }
    }

    async fn open_price_stream(&self, symbol: &str) -> Result<PriceStream, ExchangeError> {
        let mut state = self.state();
        if let Some(remaining) = state.failing_streams.get_mut(symbol) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ExchangeError::Unavailable(format!("mock stream open failure for {symbol}")));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.streams.entry(symbol.to_string()).or_default().push(tx);
        *state.stream_opens.entry(symbol.to_string()).or_default() += 1;

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, price: f64) -> PriceTick {
        PriceTick {
            symbol: symbol.into(),
            price,
            price_change_pct: 0.0,
            volume: 0.0,
            event_time_ms: 0,
        }
    }

    #[tokio::test]
    async fn default_fill_uses_ticker_for_quote_orders() {
        let gw = MockGateway::new();
        gw.set_ticker("BTCUSDT", 50_000.0);
        let res = gw
            .submit_order(&OrderRequest::market_quote("BTCUSDT", crate::Side::Buy, 100.0))
            .await
            .unwrap();
        assert_eq!(res.status, OrderStatus::Filled);
        assert!((res.executed_qty - 0.002).abs() < 1e-12);
        assert_eq!(gw.submitted_orders().len(), 1);
    }

    #[tokio::test]
    async fn streams_deliver_and_track_liveness() {
        let gw = MockGateway::new();
        let mut s1 = gw.open_price_stream("ETHUSDT").await.unwrap();
        let s2 = gw.open_price_stream("ETHUSDT").await.unwrap();
        assert_eq!(gw.live_streams("ETHUSDT"), 2);

        drop(s2);
        assert_eq!(gw.push_tick(tick("ETHUSDT", 3000.0)), 1);
        let got = s1.next().await.unwrap().unwrap();
        assert_eq!(got.price, 3000.0);
        assert_eq!(gw.stream_open_count("ETHUSDT"), 2);
    }

    #[tokio::test]
    async fn scripted_stream_open_failures() {
        let gw = MockGateway::new();
        gw.fail_next_stream_opens("BTCUSDT", 1);
        assert!(gw.open_price_stream("BTCUSDT").await.is_err());
        assert!(gw.open_price_stream("BTCUSDT").await.is_ok());
    }
}
