//! Seams between the depth stream and the venue's wire protocol

use async_trait::async_trait;
use crate::{errors::BotResult, types::OrderBookSnapshot};

/// What a live connection hands back to the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Text(String),
    /// Transport error that did not end the session.
    Error(String),
    /// Session ended, with the close code if one was received.
    Closed(Option<u16>),
}

#[async_trait]
pub trait DepthConnection: Send {
    /// Must be cancel-safe: the stream races it against the watchdog.
    async fn recv(&mut self) -> WireEvent;

    async fn close(&mut self, code: u16);
}

#[async_trait]
pub trait DepthVenue: Send + Sync + 'static {
    type Connection: DepthConnection + 'static;

    /// Human readable stream identifier for logs.
    fn stream_name(&self) -> String;

    async fn connect(&self) -> BotResult<Self::Connection>;

    async fn order_book(&self) -> BotResult<OrderBookSnapshot>;
}
