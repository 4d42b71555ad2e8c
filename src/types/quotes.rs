//! Quote types produced by the two price feeds

use serde::{Deserialize, Serialize};
use super::FixedPoint;
use crate::errors::BotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteSide {
    CexBid,
    CexAsk,
    DexImplied,
}

/// A venue's current price view, ordered by `source_seq` within its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub side: QuoteSide,
    pub value: FixedPoint,
    /// CEX: final update id of the depth event. DEX: block height.
    pub source_seq: u64,
}

/// Price level as sent by the venue: `["price", "qty"]`.
pub type PriceLevel = [String; 2];

/// Diff-depth event from the streaming endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthEvent {
    #[serde(rename = "e", default)]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "s", default)]
    pub symbol: String,
    #[serde(rename = "U", default)]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<PriceLevel>,
    #[serde(rename = "a")]
    pub asks: Vec<PriceLevel>,
}

/// One-shot REST snapshot used to seed the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBookSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Parse the price of the first level, if any.
pub fn top_of_book(levels: &[PriceLevel], scale: u32) -> BotResult<Option<FixedPoint>> {
    levels
        .first()
        .map(|[price, _qty]| FixedPoint::parse(price, scale))
        .transpose()
}

impl OrderBookSnapshot {
    pub fn highest_bid(&self, scale: u32) -> BotResult<Option<FixedPoint>> {
        top_of_book(&self.bids, scale)
    }

    pub fn lowest_ask(&self, scale: u32) -> BotResult<Option<FixedPoint>> {
        top_of_book(&self.asks, scale)
    }
}

/// Both views of the pool's constant-product price, always recomputed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DexPrices {
    /// Native asset priced in token units (6 decimals).
    pub native_in_token_units: FixedPoint,
    /// Token priced in native units (wei, 18 decimals).
    pub token_in_native_units: FixedPoint,
    /// Block the reserves were read for; `None` for the seeding read.
    pub block_number: Option<u64>,
}

impl DexPrices {
    pub fn as_quote(&self) -> Quote {
        Quote {
            side: QuoteSide::DexImplied,
            value: self.native_in_token_units,
            source_seq: self.block_number.unwrap_or_default(),
        }
    }
}

/// Typed messages pushed by the feeds into the engine's update loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketEvent {
    Cex(Quote),
    Dex(DexPrices),
}
