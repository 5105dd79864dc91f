//! Per-symbol `@ticker` market stream.

use std::collections::HashMap;

use futures_util::StreamExt;
use tb_core::PriceTick;
use tb_core::error::ExchangeError;
use tb_core::gateway::PriceStream;
use tb_core::ws::connect_ws;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::info;

use super::parser::parse_ticker_event;

pub(super) async fn open_ticker_stream(base: &str, symbol: &str) -> Result<PriceStream, ExchangeError> {
    let url = format!("{base}/{}@ticker", symbol.to_ascii_lowercase());
    let ws = connect_ws(&url, &HashMap::new())
        .await
        .map_err(|e| ExchangeError::Unavailable(format!("connect {url}: {e}")))?;
    info!("[binance-ws-{symbol}] connected to {url}");

    let stream = ws.filter_map(|frame| async move { frame_to_tick(frame) });
    Ok(stream.boxed())
}

/// `None` for frames that carry no tick (pings, acks, other events).
fn frame_to_tick(frame: Result<Message, tungstenite::Error>) -> Option<Result<PriceTick, ExchangeError>> {
    match frame {
        Ok(Message::Text(text)) => parse_ticker_event(&text).map(Ok),
        Ok(Message::Close(close)) => {
            let reason = close.map(|c| c.reason.to_string()).unwrap_or_default();
            Some(Err(ExchangeError::StreamClosed(format!("server closed: {reason}"))))
        }
        Ok(_) => None,
        Err(e) => Some(Err(ExchangeError::StreamClosed(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frames_become_ticks() {
        let text = r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT","c":"50000.1","P":"1.5","v":"12"}"#;
        let tick = frame_to_tick(Ok(Message::Text(text.into()))).unwrap().unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 50000.1);
    }

    #[test]
    fn control_frames_are_skipped_and_close_is_an_error() {
        assert!(frame_to_tick(Ok(Message::Ping(Vec::new().into()))).is_none());
        assert!(frame_to_tick(Ok(Message::Text(r#"{"result":null,"id":1}"#.into()))).is_none());
        assert!(matches!(
            frame_to_tick(Ok(Message::Close(None))),
            Some(Err(ExchangeError::StreamClosed(_)))
        ));
    }
}
