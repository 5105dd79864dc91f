//! Order executor: trade intent → normalized order → fill → trade record.
//!
//! Steps for one intent:
//! 1. resolve the symbol's trading rules (cached)
//! 2. floor the quantity to the step size, the LIMIT price to the tick size
//! 3. reject orders whose notional is positive but under the exchange minimum
//! 4. submit (live) or fill at the reference price (simulated)
//! 5. persist a trade record when something executed
//!
//! Every rejection happens before anything reaches the exchange.

use std::sync::Arc;

use chrono::Utc;
use tb_core::config::ExecutionMode;
use tb_core::gateway::ExchangeGateway;
use tb_core::store::BotStore;
use tb_core::{
    BotId, OrderRequest, OrderStatus, OrderType, Side, Sizing, SymbolTradingRules, TradeAction,
    TradeIntent, TradeRecord,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::normalize::{normalize_price, normalize_quantity};
use crate::rules::RulesCache;

/// Result of a successful `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Something executed and the trade record was written.
    Filled(TradeRecord),
    /// Accepted by the exchange with nothing executed yet (e.g. resting LIMIT).
    /// `quantity` is the normalized base quantity left working, zero for
    /// quote-sized orders.
    NotFilled { order_id: String, status: OrderStatus, quantity: f64 },
}

impl ExecutionOutcome {
    pub fn record(&self) -> Option<&TradeRecord> {
        match self {
            Self::Filled(r) => Some(r),
            Self::NotFilled { .. } => None,
        }
    }
}

pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn BotStore>,
    rules: Arc<RulesCache>,
    mode: ExecutionMode,
}

impl OrderExecutor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn BotStore>,
        rules: Arc<RulesCache>,
        mode: ExecutionMode,
    ) -> Self {
        Self { gateway, store, rules, mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn execute(
        &self,
        intent: &TradeIntent,
        bot_id: BotId,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let side = intent
            .kind
            .side()
            .ok_or_else(|| ExecutionError::NotActionable(intent.kind.label().to_string()))?;
        let symbol = intent.symbol.as_str();

        let rules = self
            .rules
            .get_or_fetch(self.gateway.as_ref(), symbol)
            .await
            .map_err(|source| ExecutionError::RulesUnavailable { symbol: symbol.to_string(), source })?;

        let request = build_order_request(intent, side, &rules)?;
        self.check_min_notional(&request, intent, &rules).await?;

        let simulated = self.mode == ExecutionMode::Simulated;
        let (price, quantity, order_id) = if simulated {
            self.simulate_fill(&request, intent).await?
        } else {
            info!(
                "[executor] bot {bot_id}: {} {} {} qty={:?} quote={:?} price={:?}",
                request.side,
                request.order_type.as_str(),
                request.symbol,
                request.quantity,
                request.quote_order_qty,
                request.price
            );
            let result = self.gateway.submit_order(&request).await?;
            let quantity = result.filled_quantity();
            if quantity <= 0.0 {
                info!(
                    "[executor] bot {bot_id}: order {} on {symbol} accepted but not filled ({:?})",
                    result.order_id, result.status
                );
                return Ok(ExecutionOutcome::NotFilled {
                    order_id: result.order_id,
                    status: result.status,
                    quantity: request.quantity.unwrap_or_default(),
                });
            }
            let price = match request.order_type {
                // Provisional until fill reconciliation exists.
                OrderType::Limit => request.price.unwrap_or_default(),
                OrderType::Market => result.average_fill_price().unwrap_or_default(),
            };
            (price, quantity, Some(result.order_id))
        };

        let record = TradeRecord {
            id: Uuid::new_v4(),
            bot_id,
            symbol: symbol.to_string(),
            action: TradeAction::new(side, simulated),
            intent: intent.kind.label().to_string(),
            price,
            quantity,
            order_id,
            timestamp: Utc::now(),
        };

        if let Err(source) = self.store.persist_trade_record(&record).await {
            return Err(ExecutionError::TradeRecordNotPersisted { record: Box::new(record), source });
        }
        info!(
            "[executor] bot {bot_id}: recorded {:?} {symbol} {quantity} @ {price}",
            record.action
        );
        Ok(ExecutionOutcome::Filled(record))
    }

    async fn check_min_notional(
        &self,
        request: &OrderRequest,
        intent: &TradeIntent,
        rules: &SymbolTradingRules,
    ) -> Result<(), ExecutionError> {
        let notional = match (request.quote_order_qty, request.quantity) {
            (Some(quote), _) => Some(quote),
            (None, Some(qty)) => self.price_hint(request, intent).await.map(|p| p * qty),
            (None, None) => None,
        };
        match notional {
            Some(n) if n > 0.0 && n < rules.min_notional => Err(ExecutionError::BelowMinNotional {
                symbol: request.symbol.clone(),
                notional: n,
                min_notional: rules.min_notional,
            }),
            Some(_) => Ok(()),
            None => {
                warn!("[executor] no price for {}; skipping min-notional check", request.symbol);
                Ok(())
            }
        }
    }

    /// Limit price, then the strategy's reference price, then the live ticker.
    async fn price_hint(&self, request: &OrderRequest, intent: &TradeIntent) -> Option<f64> {
        if let Some(p) = request.price.or(intent.reference_price).filter(|p| *p > 0.0) {
            return Some(p);
        }
        match self.gateway.get_ticker(&request.symbol).await {
            Ok(p) => Some(p),
            Err(e) => {
                debug!("[executor] ticker for {} unavailable: {e}", request.symbol);
                None
            }
        }
    }

    async fn simulate_fill(
        &self,
        request: &OrderRequest,
        intent: &TradeIntent,
    ) -> Result<(f64, f64, Option<String>), ExecutionError> {
        let price = match self.price_hint(request, intent).await {
            Some(p) => p,
            None => self.gateway.get_ticker(&request.symbol).await?,
        };
        let quantity = match (request.quantity, request.quote_order_qty) {
            (Some(q), _) => q,
            (None, Some(quote)) if price > 0.0 => quote / price,
            _ => 0.0,
        };
        debug!("[executor] simulated {} {} {quantity} @ {price}", request.side, request.symbol);
        Ok((price, quantity, None))
    }
}

/// Turn an intent into an exchange-compliant order for `rules`.
///
/// Quote sizing is only valid for MARKET buys; everything else needs a base
/// quantity, and LIMIT orders need a price.
pub fn build_order_request(
    intent: &TradeIntent,
    side: Side,
    rules: &SymbolTradingRules,
) -> Result<OrderRequest, ExecutionError> {
    let sizing = intent.sizing.ok_or(ExecutionError::MissingRequiredField("quantity"))?;
    let symbol = intent.symbol.as_str();

    let base_quantity = |requested: f64| {
        let qty = normalize_quantity(requested, rules.step_size);
        if qty > 0.0 {
            Ok(qty)
        } else {
            Err(ExecutionError::ZeroQuantity {
                symbol: symbol.to_string(),
                requested,
                step_size: rules.step_size,
            })
        }
    };

    match intent.order_type {
        OrderType::Market => match sizing {
            Sizing::Quote(quote) if side == Side::Buy => {
                if quote > 0.0 {
                    Ok(OrderRequest::market_quote(symbol, side, quote))
                } else {
                    Err(ExecutionError::ZeroQuantity {
                        symbol: symbol.to_string(),
                        requested: quote,
                        step_size: rules.step_size,
                    })
                }
            }
            Sizing::Quote(_) => Err(ExecutionError::MissingRequiredField("quantity")),
            Sizing::Base(qty) => Ok(OrderRequest::market(symbol, side, base_quantity(qty)?)),
        },
        OrderType::Limit => {
            let price = intent.limit_price.ok_or(ExecutionError::MissingRequiredField("price"))?;
            let Sizing::Base(qty) = sizing else {
                return Err(ExecutionError::MissingRequiredField("quantity"));
            };
            let price = normalize_price(price, rules.tick_size);
            if price <= 0.0 {
                return Err(ExecutionError::MissingRequiredField("price"));
            }
            Ok(OrderRequest::limit(symbol, side, base_quantity(qty)?, price))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_core::error::ExchangeError;
    use tb_core::gateway::mock::MockGateway;
    use tb_core::store::MemoryStore;
    use tb_core::{Fill, IntentKind, OrderResult};

    const SYMBOL: &str = "BTCUSDT";

    fn setup(mode: ExecutionMode) -> (Arc<MockGateway>, Arc<MemoryStore>, OrderExecutor) {
        let gw = Arc::new(MockGateway::new());
        gw.set_rules(SYMBOL, SymbolTradingRules { step_size: 0.001, tick_size: 0.01, min_notional: 10.0 });
        gw.set_ticker(SYMBOL, 50_000.0);
        let store = Arc::new(MemoryStore::new());
        let exec = OrderExecutor::new(gw.clone(), store.clone(), RulesCache::new(), mode);
        (gw, store, exec)
    }

    fn base_intent(kind: IntentKind, qty: f64, price: Option<f64>) -> TradeIntent {
        TradeIntent::market(kind, SYMBOL, Sizing::Base(qty), price)
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected_before_submission() {
        let (gw, _, exec) = setup(ExecutionMode::Live);
        let err = exec.execute(&base_intent(IntentKind::Sell, 0.0004, Some(50_000.0)), 1).await.unwrap_err();
        assert!(matches!(err, ExecutionError::ZeroQuantity { .. }));
        assert!(gw.submitted_orders().is_empty());
    }

    #[tokio::test]
    async fn limit_without_price_is_missing_field() {
        let (gw, _, exec) = setup(ExecutionMode::Live);
        let mut intent = TradeIntent::limit(IntentKind::Buy, SYMBOL, Sizing::Base(0.01), 48_000.0);
        intent.limit_price = None;
        let err = exec.execute(&intent, 1).await.unwrap_err();
        assert!(matches!(err, ExecutionError::MissingRequiredField("price")));
        assert!(gw.submitted_orders().is_empty());
    }

    #[tokio::test]
    async fn below_min_notional_is_never_submitted() {
        let (gw, _, exec) = setup(ExecutionMode::Live);
        // 0.0001 * 50_000 = 5 < 10
        let err = exec.execute(&base_intent(IntentKind::Sell, 0.0001, Some(50_000.0)), 1).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BelowMinNotional { .. }));

        let quote = TradeIntent::market(IntentKind::Buy, SYMBOL, Sizing::Quote(9.99), None);
        let err = exec.execute(&quote, 1).await.unwrap_err();
        assert!(matches!(err, ExecutionError::BelowMinNotional { .. }));
        assert!(gw.submitted_orders().is_empty());
    }

    #[tokio::test]
    async fn market_fill_price_is_quantity_weighted() {
        let (gw, store, exec) = setup(ExecutionMode::Live);
        gw.set_order_responder(|req| {
            assert_eq!(req.quantity, Some(0.004));
            Ok(OrderResult {
                order_id: "77".into(),
                client_order_id: None,
                status: OrderStatus::Filled,
                executed_qty: 0.004,
                price: 0.0,
                cumulative_quote_qty: 0.0,
                fills: vec![
                    Fill { price: 100.0, qty: 0.001, commission: 0.0, commission_asset: String::new() },
                    Fill { price: 110.0, qty: 0.003, commission: 0.0, commission_asset: String::new() },
                ],
            })
        });

        let outcome = exec.execute(&base_intent(IntentKind::Buy, 0.0045, Some(50_000.0)), 9).await.unwrap();
        let record = outcome.record().unwrap();
        assert!((record.price - 107.5).abs() < 1e-9);
        assert_eq!(record.quantity, 0.004);
        assert_eq!(record.action, TradeAction::Buy);
        assert_eq!(record.order_id.as_deref(), Some("77"));
        assert_eq!(store.trade_history(9).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn limit_order_normalizes_price_and_records_requested_price() {
        let (gw, _, exec) = setup(ExecutionMode::Live);
        let intent = TradeIntent::limit(IntentKind::GridBuy { level: 0 }, SYMBOL, Sizing::Base(0.0021), 48_000.129);
        let outcome = exec.execute(&intent, 3).await.unwrap();

        let sent = gw.submitted_orders();
        assert_eq!(sent[0].price, Some(48_000.12));
        assert_eq!(sent[0].quantity, Some(0.002));
        assert_eq!(sent[0].time_in_force, Some(tb_core::TimeInForce::Gtc));
        assert_eq!(outcome.record().unwrap().price, 48_000.12);
    }

    #[tokio::test]
    async fn resting_limit_order_is_not_filled() {
        let (gw, store, exec) = setup(ExecutionMode::Live);
        gw.set_order_responder(|_| {
            Ok(OrderResult {
                order_id: "5".into(),
                client_order_id: None,
                status: OrderStatus::New,
                executed_qty: 0.0,
                price: 48_000.0,
                cumulative_quote_qty: 0.0,
                fills: vec![],
            })
        });
        let intent = TradeIntent::limit(IntentKind::Buy, SYMBOL, Sizing::Base(0.01), 48_000.0);
        let outcome = exec.execute(&intent, 3).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::NotFilled { order_id: "5".into(), status: OrderStatus::New, quantity: 0.01 }
        );
        assert!(store.trade_history(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn simulated_mode_records_without_submitting() {
        let (gw, store, exec) = setup(ExecutionMode::Simulated);
        let intent = TradeIntent::market(IntentKind::DcaBuy, SYMBOL, Sizing::Quote(100.0), Some(40_000.0));
        let outcome = exec.execute(&intent, 4).await.unwrap();
        let record = outcome.record().unwrap();
        assert_eq!(record.action, TradeAction::SimBuy);
        assert_eq!(record.price, 40_000.0);
        assert!((record.quantity - 0.0025).abs() < 1e-12);
        assert_eq!(record.intent, "DCA_BUY");
        assert!(gw.submitted_orders().is_empty());
        assert_eq!(store.all_trades().await.len(), 1);
    }

    #[tokio::test]
    async fn exchange_errors_are_classified() {
        let (gw, _, exec) = setup(ExecutionMode::Live);
        gw.set_order_responder(|_| Err(ExchangeError::Rejected { code: -2010, message: "insufficient balance".into() }));
        let intent = base_intent(IntentKind::Sell, 0.01, Some(50_000.0));
        assert!(matches!(exec.execute(&intent, 1).await, Err(ExecutionError::ExchangeRejected(_))));

        gw.set_order_responder(|_| Err(ExchangeError::Unavailable("timeout".into())));
        assert!(matches!(exec.execute(&intent, 1).await, Err(ExecutionError::ExchangeUnavailable(_))));
    }

    #[tokio::test]
    async fn unknown_symbol_is_rules_unavailable() {
        let (_, _, exec) = setup(ExecutionMode::Live);
        let intent = TradeIntent::market(IntentKind::Buy, "FOOBAR", Sizing::Quote(20.0), None);
        assert!(matches!(exec.execute(&intent, 1).await, Err(ExecutionError::RulesUnavailable { .. })));
    }

    #[tokio::test]
    async fn failed_trade_write_is_surfaced_with_the_record() {
        let (_, store, exec) = setup(ExecutionMode::Simulated);
        store.reject_writes(true);
        let err = exec.execute(&base_intent(IntentKind::Sell, 0.01, Some(50_000.0)), 2).await.unwrap_err();
        match err {
            ExecutionError::TradeRecordNotPersisted { record, .. } => assert_eq!(record.bot_id, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn hold_is_not_actionable() {
        let (_, _, exec) = setup(ExecutionMode::Live);
        let err = exec.execute(&TradeIntent::hold(SYMBOL, "nothing to do"), 1).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotActionable(_)));
    }

    #[test]
    fn quote_sizing_for_sells_needs_quantity() {
        let rules = SymbolTradingRules::default();
        let intent = TradeIntent::market(IntentKind::Sell, SYMBOL, Sizing::Quote(50.0), None);
        assert!(matches!(
            build_order_request(&intent, Side::Sell, &rules),
            Err(ExecutionError::MissingRequiredField("quantity"))
        ));
    }
}
