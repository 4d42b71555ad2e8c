//! Arbitrage decision types

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use super::{DexPrices, FixedPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// CEX bid is richer than the pool: buy on the pool, sell on the exchange.
    BuyDexSellCex,
    /// CEX ask is cheaper than the pool: buy on the exchange, sell on the pool.
    BuyCexSellDex,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::BuyDexSellCex => write!(f, "buy on DEX, sell on CEX"),
            Direction::BuyCexSellDex => write!(f, "buy on CEX, sell on DEX"),
        }
    }
}

/// Transient detection signal; nothing is executed or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Percent units at `PERCENT_SCALE` decimals.
    pub percentage_diff: FixedPoint,
    pub cex_price: FixedPoint,
    pub dex_price: FixedPoint,
    pub gas_price_wei: U256,
}

/// The engine's latest view of both venues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArbitrageSnapshot {
    pub dex_price: Option<DexPrices>,
    pub cex_highest_bid: Option<FixedPoint>,
    pub cex_lowest_ask: Option<FixedPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Seeded,
    Live,
    Closed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "idle",
            EngineState::Seeded => "seeded",
            EngineState::Live => "live",
            EngineState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub cex_updates: u64,
    pub dex_updates: u64,
    pub opportunities: u64,
}
