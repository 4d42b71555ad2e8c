//! Fee-estimation HTTP endpoint

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;
use crate::{
    errors::{BotError, BotResult},
    types::GasPriceInfo,
};

#[async_trait]
pub trait GasPriceSource: Send + Sync + 'static {
    async fn fetch(&self) -> BotResult<GasPriceInfo>;
}

pub struct GasStation {
    url: String,
    http: reqwest::Client,
}

impl GasStation {
    pub fn new(url: &str) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| {
                warn!("⚠️ Failed to initialize HTTP client: {}", e);
                BotError::network("Failed to build HTTP client", e)
            })?;
        Ok(Self { url: url.to_string(), http })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GasPriceSource for GasStation {
    async fn fetch(&self) -> BotResult<GasPriceInfo> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BotError::network("Gas station request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(BotError::Network {
                message: format!("Gas station returned {}", status),
                source: None,
                retry_count: 0,
            });
        }

        response
            .json::<GasPriceInfo>()
            .await
            .map_err(|e| BotError::parsing("Failed to parse gas station response", e))
    }
}
