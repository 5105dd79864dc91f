//! Binance spot gateway.
//!
//! Implements [`ExchangeGateway`] over the spot REST API and the public
//! market streams:
//!
//! | Operation       | Method | Path / stream                  | Signed |
//! |-----------------|--------|--------------------------------|--------|
//! | Ping            | GET    | `/api/v3/ping`                 | no     |
//! | Ticker price    | GET    | `/api/v3/ticker/price`         | no     |
//! | Candles         | GET    | `/api/v3/klines`               | no     |
//! | Trading rules   | GET    | `/api/v3/exchangeInfo?symbol=` | no     |
//! | Place order     | POST   | `/api/v3/order`                | yes    |
//! | Price stream    | WS     | `<stream_url>/<symbol>@ticker` | no     |
//!
//! One `reqwest::Client` is shared by all callers; it pools connections and
//! is safe for concurrent use, so the gateway is handed out as an `Arc`.

pub mod auth;
pub mod config;
pub mod parser;
mod stream;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;
use tb_core::error::{ConfigError, ExchangeError};
use tb_core::gateway::{ExchangeGateway, PriceStream};
use tb_core::{Candle, OrderRequest, OrderResult, OrderType, SymbolTradingRules};
use tracing::{debug, info, warn};

use self::auth::RequestSigner;
use self::config::BinanceConfig;

pub struct BinanceGateway {
    http: reqwest::Client,
    config: BinanceConfig,
    rest_base: String,
    stream_base: String,
    signer: Option<RequestSigner>,
}

impl BinanceGateway {
    pub fn new(config: BinanceConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;

        let signer = if config.has_credentials() {
            Some(
                RequestSigner::new(&config.secret_key)
                    .ok_or_else(|| ConfigError::Invalid("unusable secret_key".into()))?,
            )
        } else {
            warn!("[binance] no API credentials configured; order submission disabled");
            None
        };

        let rest_base = config.rest_base();
        let stream_base = config.stream_base();
        info!("[binance] rest={rest_base} stream={stream_base} testnet={}", config.testnet);

        Ok(Self { http, config, rest_base, stream_base, signer })
    }

    /// Public GET returning parsed JSON, with Binance error mapping.
    async fn get_json(&self, path: &str, query: &[(&str, String)], symbol: Option<&str>) -> Result<Value, ExchangeError> {
        let url = format!("{}{}", self.rest_base, path);
        let resp = self.http.get(&url).query(query).send().await.map_err(transport_error)?;
        read_json(resp, symbol).await
    }
}

fn transport_error(e: reqwest::Error) -> ExchangeError {
    ExchangeError::Unavailable(e.to_string())
}

async fn read_json(resp: reqwest::Response, symbol: Option<&str>) -> Result<Value, ExchangeError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(parser::map_http_error(status.as_u16(), &body, symbol));
    }
    serde_json::from_str(&body).map_err(|e| ExchangeError::Malformed(e.to_string()))
}

fn current_timestamp_ms() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

/// Decimal rendering without exponent and without trailing zeros.
fn format_decimal(value: f64) -> String {
    let s = format!("{value:.8}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() { "0".to_string() } else { s.to_string() }
}

/// Order parameters in Binance wire form, before `timestamp`/`signature`.
pub fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_str().to_string()),
        ("type", request.order_type.as_str().to_string()),
    ];
    if let Some(q) = request.quantity {
        params.push(("quantity", format_decimal(q)));
    }
    if let Some(q) = request.quote_order_qty {
        params.push(("quoteOrderQty", format_decimal(q)));
    }
    if request.order_type == OrderType::Limit {
        if let Some(p) = request.price {
            params.push(("price", format_decimal(p)));
        }
        if let Some(tif) = request.time_in_force {
            params.push(("timeInForce", tif.as_str().to_string()));
        }
    }
    if let Some(id) = &request.client_order_id {
        params.push(("newClientOrderId", id.clone()));
    }
    params.push(("newOrderRespType", "FULL".to_string()));
    params
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    async fn ping(&self) -> Result<(), ExchangeError> {
        self.get_json("/api/v3/ping", &[], None).await.map(|_| ())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<f64, ExchangeError> {
        let v = self
            .get_json("/api/v3/ticker/price", &[("symbol", symbol.to_string())], Some(symbol))
            .await?;
        parser::parse_ticker_price(&v)
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
        start_time_ms: Option<i64>,
        end_time_ms: Option<i64>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(t) = start_time_ms {
            query.push(("startTime", t.to_string()));
        }
        if let Some(t) = end_time_ms {
            query.push(("endTime", t.to_string()));
        }
        let v = self.get_json("/api/v3/klines", &query, Some(symbol)).await?;
        parser::parse_klines(&v)
    }

    async fn get_symbol_rules(&self, symbol: &str) -> Result<SymbolTradingRules, ExchangeError> {
        let v = self
            .get_json("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())], Some(symbol))
            .await?;
        parser::parse_symbol_rules(&v, symbol)
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, ExchangeError> {
        let signer = self.signer.as_ref().ok_or_else(|| ExchangeError::Rejected {
            code: -2015,
            message: "no API credentials configured".into(),
        })?;

        let mut params = order_params(request);
        params.push(("recvWindow", self.config.recv_window.to_string()));
        params.push(("timestamp", current_timestamp_ms()));
        let query = signer.signed_query(&params);

        debug!("[binance] POST /api/v3/order {} {} {:?}", request.symbol, request.side, request.order_type);
        let url = format!("{}/api/v3/order?{}", self.rest_base, query);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let v = read_json(resp, Some(&request.symbol)).await?;
        parser::parse_order_response(&v)
    }

    async fn open_price_stream(&self, symbol: &str) -> Result<PriceStream, ExchangeError> {
        stream::open_ticker_stream(&self.stream_base, symbol).await
    }
}
