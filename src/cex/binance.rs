//! Binance diff-depth websocket and REST snapshot

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};
use crate::{
    cex::transport::{DepthConnection, DepthVenue, WireEvent},
    config::Config,
    errors::{BotError, BotResult},
    types::OrderBookSnapshot,
};

const SNAPSHOT_DEPTH_LIMIT: u32 = 5;

#[derive(Debug, Clone)]
pub struct BinanceVenue {
    symbol: String,
    ws_base: String,
    rest_base: String,
    update_speed_ms: u64,
    http: reqwest::Client,
}

impl BinanceVenue {
    pub fn new(
        symbol: &str,
        ws_base: &str,
        rest_base: &str,
        update_speed_ms: u64,
    ) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| BotError::network("Failed to build HTTP client", e))?;

        Ok(Self {
            symbol: symbol.to_lowercase(),
            ws_base: ws_base.trim_end_matches('/').to_string(),
            rest_base: rest_base.trim_end_matches('/').to_string(),
            update_speed_ms,
            http,
        })
    }

    pub fn from_config(config: &Config) -> BotResult<Self> {
        Self::new(
            &config.market_symbol,
            &config.cex_ws_url,
            &config.cex_rest_url,
            config.depth_update_speed_ms,
        )
    }

    pub fn stream_url(&self) -> String {
        format!("{}/{}@depth@{}ms", self.ws_base, self.symbol, self.update_speed_ms)
    }

    pub fn snapshot_url(&self) -> String {
        format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.rest_base,
            self.symbol.to_uppercase(),
            SNAPSHOT_DEPTH_LIMIT
        )
    }
}

#[async_trait]
impl DepthVenue for BinanceVenue {
    type Connection = TungsteniteConnection;

    fn stream_name(&self) -> String {
        format!("{}@depth", self.symbol)
    }

    async fn connect(&self) -> BotResult<TungsteniteConnection> {
        let url = self.stream_url();
        debug!(url = %url, "connecting");
        let (ws, _response) = connect_async(&url)
            .await
            .map_err(|e| BotError::network(format!("Failed to connect to {}", url), e))?;
        Ok(TungsteniteConnection { ws })
    }

    async fn order_book(&self) -> BotResult<OrderBookSnapshot> {
        let response = self
            .http
            .get(self.snapshot_url())
            .send()
            .await
            .map_err(|e| BotError::network("Depth snapshot request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("⚠️ Binance API returned error status {}: {}", status, body);
            return Err(BotError::Network {
                message: format!("Binance API error: {} - {}", status, body),
                source: None,
                retry_count: 0,
            });
        }

        response
            .json::<OrderBookSnapshot>()
            .await
            .map_err(|e| BotError::parsing("Failed to parse depth snapshot", e))
    }
}

pub struct TungsteniteConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl DepthConnection for TungsteniteConnection {
    async fn recv(&mut self) -> WireEvent {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return WireEvent::Text(text),
                Some(Ok(Message::Binary(data))) => {
                    return match String::from_utf8(data) {
                        Ok(text) => WireEvent::Text(text),
                        Err(e) => WireEvent::Error(format!("non utf-8 binary frame: {}", e)),
                    };
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = self.ws.send(Message::Pong(payload)).await {
                        return WireEvent::Error(format!("failed to answer ping: {}", e));
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    return WireEvent::Closed(frame.map(|f| u16::from(f.code)));
                }
                Some(Err(
                    tungstenite::Error::ConnectionClosed
                    | tungstenite::Error::AlreadyClosed
                    | tungstenite::Error::Io(_),
                )) => return WireEvent::Closed(None),
                Some(Err(e)) => return WireEvent::Error(e.to_string()),
                None => return WireEvent::Closed(None),
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            debug!(error = %e, "close handshake failed");
        }
    }
}
