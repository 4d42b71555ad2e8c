//! Dual-feed arbitrage monitor
//!
//! Watches a centralized exchange order book and an on-chain constant-product
//! pool for the same pair, and signals when their prices diverge past a
//! configured percentage. Detection only: nothing is traded.

pub mod config;
pub mod types;
pub mod errors;
pub mod network;
pub mod cex;
pub mod dex;
pub mod gas;
pub mod arbitrage;
pub mod utils;

// Re-export commonly used items
pub use config::{Config, CONFIG};
pub use errors::{BotError, BotResult};
pub use types::*;

// Type alias for our concrete provider
pub type ConcreteProvider = alloy::providers::RootProvider<alloy::transports::BoxTransport>;
