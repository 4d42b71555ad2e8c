//! Fee-estimation snapshot types

use serde::{Deserialize, Serialize};

/// Fee tiers in gwei as returned by the gas station endpoint.
///
/// Only `fastest` is required; the snapshot is always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasPriceInfo {
    pub fastest: u64,
    #[serde(default)]
    pub fast: Option<u64>,
    #[serde(default)]
    pub average: Option<u64>,
    #[serde(default)]
    pub safe_low: Option<u64>,
    #[serde(default, rename = "block_time")]
    pub block_time: Option<f64>,
    #[serde(default)]
    pub block_num: Option<u64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub safe_low_wait: Option<f64>,
    #[serde(default)]
    pub avg_wait: Option<f64>,
    #[serde(default)]
    pub fast_wait: Option<f64>,
    #[serde(default)]
    pub fastest_wait: Option<f64>,
}

impl GasPriceInfo {
    pub fn with_fastest(fastest: u64) -> Self {
        Self {
            fastest,
            fast: None,
            average: None,
            safe_low: None,
            block_time: None,
            block_num: None,
            speed: None,
            safe_low_wait: None,
            avg_wait: None,
            fast_wait: None,
            fastest_wait: None,
        }
    }
}
