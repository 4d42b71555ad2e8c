//! Monitor configuration settings and environment variable handling

use alloy::primitives::Address;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use crate::errors::{BotError, BotResult};

// Configuration constants
pub const DEFAULT_MARKET_SYMBOL: &str = "ethusdt";
pub const DEFAULT_CEX_WS_URL: &str = "wss://stream.binance.com:9443/ws";
pub const DEFAULT_CEX_REST_URL: &str = "https://api.binance.com";
pub const DEFAULT_GAS_STATION_URL: &str = "https://ethgasstation.info/api/ethgasAPI.json";
pub const DEFAULT_DEPTH_UPDATE_SPEED_MS: u64 = 1000;
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_GAS_TTL_MS: u64 = 15_000;
pub const DEFAULT_LOG_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TOKEN_DECIMALS: u32 = 6;

// Stream constants
pub const WATCHDOG_TICK_MS: u64 = 500;
pub const CLOSE_CODE_END: u16 = 3000;
pub const CLOSE_CODE_RECONNECT: u16 = 3001;

#[derive(Debug, Clone)]
pub struct Config {
    // CEX feed
    pub market_symbol: String,
    pub cex_ws_url: String,
    pub cex_rest_url: String,
    pub depth_update_speed_ms: u64,
    pub watchdog_timeout_ms: u64,
    // DEX feed
    pub rpc_url: Option<String>,
    pub token_address: Option<String>,
    pub pool_address: Option<String>,
    pub token_decimals: u32,
    pub log_poll_interval_ms: u64,
    // Gas station
    pub gas_station_url: String,
    pub gas_ttl_ms: u64,
    // Decision
    pub percentage_diff_target: Decimal,
}

impl Config {
    pub fn load() -> Self {
        Self {
            market_symbol: env::var("MARKET_SYMBOL")
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|_| DEFAULT_MARKET_SYMBOL.to_string()),
            cex_ws_url: env::var("CEX_WS_URL")
                .unwrap_or_else(|_| DEFAULT_CEX_WS_URL.to_string()),
            cex_rest_url: env::var("CEX_REST_URL")
                .unwrap_or_else(|_| DEFAULT_CEX_REST_URL.to_string()),
            depth_update_speed_ms: env::var("DEPTH_UPDATE_SPEED_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DEPTH_UPDATE_SPEED_MS),
            watchdog_timeout_ms: env::var("WATCHDOG_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_WATCHDOG_TIMEOUT_MS)
                .max(WATCHDOG_TICK_MS),
            rpc_url: env::var("RPC_URL").ok(),
            token_address: env::var("TOKEN_ADDRESS").ok(),
            pool_address: env::var("POOL_ADDRESS").ok(),
            token_decimals: env::var("TOKEN_DECIMALS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TOKEN_DECIMALS),
            log_poll_interval_ms: env::var("LOG_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_LOG_POLL_INTERVAL_MS),
            gas_station_url: env::var("GAS_STATION_URL")
                .unwrap_or_else(|_| DEFAULT_GAS_STATION_URL.to_string()),
            gas_ttl_ms: env::var("GAS_TTL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_GAS_TTL_MS),
            // Not clamped: a non-positive target must reach the engine and be rejected there.
            percentage_diff_target: env::var("PERCENTAGE_DIFF_TARGET")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(1.0)),
        }
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn gas_ttl(&self) -> Duration {
        Duration::from_millis(self.gas_ttl_ms)
    }

    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    pub fn rpc_url(&self) -> BotResult<&str> {
        self.rpc_url
            .as_deref()
            .ok_or_else(|| BotError::Configuration("RPC_URL is required".to_string()))
    }

    pub fn token_address(&self) -> BotResult<Address> {
        parse_address("TOKEN_ADDRESS", self.token_address.as_deref())
    }

    pub fn pool_address(&self) -> BotResult<Address> {
        parse_address("POOL_ADDRESS", self.pool_address.as_deref())
    }
}

fn parse_address(name: &str, value: Option<&str>) -> BotResult<Address> {
    let value = value.ok_or_else(|| BotError::Configuration(format!("{} is required", name)))?;
    Address::from_str(value)
        .map_err(|e| BotError::Configuration(format!("{} '{}' is not an address: {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_addresses_are_configuration_errors() {
        let err = parse_address("POOL_ADDRESS", None).unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
        let err = parse_address("POOL_ADDRESS", Some("0x1234")).unwrap_err();
        assert!(matches!(err, BotError::Configuration(_)));
        let ok = parse_address("POOL_ADDRESS", Some("0x92b8274aba7ab667bee7eb776ec1de32438d90bf"));
        assert!(ok.is_ok());
    }
}
