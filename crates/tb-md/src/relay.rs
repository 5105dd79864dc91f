//! WebSocket relay: `ws://<addr>/ws/market-updates/{SYMBOL}`.
//!
//! Every accepted connection subscribes to the hub for its symbol and
//! receives each tick as a JSON text frame. The subscription is released when
//! the client goes away, a send fails, or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

use crate::fanout::MarketDataHub;

const PATH_PREFIX: &str = "/ws/market-updates/";

/// Symbol from a request path, upper-cased.
pub fn symbol_from_path(path: &str) -> Option<String> {
    let symbol = path.strip_prefix(PATH_PREFIX)?.trim_end_matches('/');
    let valid = !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| symbol.to_ascii_uppercase())
}

pub struct RelayServer {
    listener: TcpListener,
    hub: Arc<MarketDataHub>,
}

impl RelayServer {
    pub async fn bind(addr: &str, hub: Arc<MarketDataHub>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("[relay] listening on {}", listener.local_addr()?);
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((tcp, peer)) => {
                        tokio::spawn(serve_connection(tcp, peer, self.hub.clone(), shutdown.clone()));
                    }
                    Err(e) => warn!("[relay] accept failed: {e}"),
                },
            }
        }
        info!("[relay] stopped");
    }
}

async fn serve_connection(tcp: TcpStream, peer: SocketAddr, hub: Arc<MarketDataHub>, mut shutdown: watch::Receiver<bool>) {
    let mut symbol = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        symbol = symbol_from_path(req.uri().path());
        if symbol.is_some() {
            Ok(resp)
        } else {
            let mut reject = ErrorResponse::new(Some(format!("expected {PATH_PREFIX}{{SYMBOL}}")));
            *reject.status_mut() = StatusCode::NOT_FOUND;
            Err(reject)
        }
    };
    let ws = match tokio_tungstenite::accept_hdr_async(tcp, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("[relay] handshake with {peer} failed: {e}");
            return;
        }
    };
    let Some(symbol) = symbol else {
        return;
    };

    let tag = format!("[relay-{symbol}]");
    let mut sub = hub.subscribe(&symbol);
    info!("{tag} client {peer} connected");
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            tick = sub.receiver.recv() => {
                let Some(tick) = tick else { break };
                let text = match serde_json::to_string(&tick) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("{tag} cannot serialize tick: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("{tag} client {peer} read error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(sub.handle).await;
    info!("{tag} client {peer} disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tb_core::PriceTick;
    use tb_core::config::FanoutConfig;
    use tb_core::gateway::mock::MockGateway;
    use tb_core::ws::connect_ws;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn path_parsing() {
        assert_eq!(symbol_from_path("/ws/market-updates/btcusdt"), Some("BTCUSDT".into()));
        assert_eq!(symbol_from_path("/ws/market-updates/ETHUSDT/"), Some("ETHUSDT".into()));
        assert_eq!(symbol_from_path("/ws/market-updates/"), None);
        assert_eq!(symbol_from_path("/ws/market-updates/a/b"), None);
        assert_eq!(symbol_from_path("/other"), None);
    }

    #[tokio::test]
    async fn forwards_ticks_and_releases_on_disconnect() {
        let gw = Arc::new(MockGateway::new());
        let hub = MarketDataHub::new(gw.clone(), FanoutConfig::default());
        let server = RelayServer::bind("127.0.0.1:0", hub.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(server.run(stop_rx));

        let url = format!("ws://{addr}/ws/market-updates/btcusdt");
        let mut client = connect_ws(&url, &Default::default()).await.unwrap();
        wait_until(|| gw.live_streams("BTCUSDT") == 1).await;

        gw.push_tick(PriceTick {
            symbol: "BTCUSDT".into(),
            price: 50_123.5,
            price_change_pct: 1.2,
            volume: 10.0,
            event_time_ms: 42,
        });
        let frame = client.next().await.unwrap().unwrap();
        let tick: PriceTick = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(tick.price, 50_123.5);

        client.close(None).await.ok();
        drop(client);
        wait_until(|| hub.subscriber_count("BTCUSDT") == 0).await;
        wait_until(|| gw.live_streams("BTCUSDT") == 0).await;

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_path_is_rejected() {
        let gw = Arc::new(MockGateway::new());
        let hub = MarketDataHub::new(gw.clone(), FanoutConfig::default());
        let server = RelayServer::bind("127.0.0.1:0", hub.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (_stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(server.run(stop_rx));

        assert!(connect_ws(&format!("ws://{addr}/prices"), &Default::default()).await.is_err());
        assert_eq!(hub.listener_count(), 0);
    }
}
