//! Read interface to the pool and its token contract

use alloy::{
    primitives::{keccak256, Address, B256, U256},
    providers::Provider,
    rpc::types::eth::{Filter, Log, TransactionRequest},
    sol_types::SolValue,
};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use crate::{
    config::Config,
    errors::{BotError, BotResult},
    ConcreteProvider,
};

/// Which side of a token transfer the pool is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    FromPool,
    ToPool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

pub type TransferStream = BoxStream<'static, TransferEvent>;

#[async_trait]
pub trait PoolReader: Send + Sync + 'static {
    fn pool_address(&self) -> Address;

    /// Token balance held by the pool, in the token's smallest unit.
    async fn token_reserve(&self) -> BotResult<U256>;

    /// Native balance of the pool, in wei.
    async fn native_reserve(&self) -> BotResult<U256>;

    async fn subscribe_transfers(&self, direction: TransferDirection) -> BotResult<TransferStream>;
}

pub fn transfer_topic() -> B256 {
    keccak256("Transfer(address,address,uint256)")
}

/// Decode an ERC-20 `Transfer` log; pending or removed logs yield `None`.
pub fn decode_transfer(log: &Log) -> Option<TransferEvent> {
    if log.removed {
        return None;
    }
    let block_number = log.block_number?;
    let topics = log.topics();
    if topics.len() < 3 || topics[0] != transfer_topic() {
        return None;
    }
    Some(TransferEvent {
        block_number,
        from: Address::from_word(topics[1]),
        to: Address::from_word(topics[2]),
        value: U256::try_from_be_slice(&log.data().data).unwrap_or_default(),
    })
}

pub struct AlloyPoolReader {
    provider: Arc<ConcreteProvider>,
    token: Address,
    pool: Address,
    poll_interval: Duration,
}

impl AlloyPoolReader {
    pub fn new(
        provider: Arc<ConcreteProvider>,
        token: Address,
        pool: Address,
        poll_interval: Duration,
    ) -> Self {
        Self { provider, token, pool, poll_interval }
    }

    pub fn from_config(provider: Arc<ConcreteProvider>, config: &Config) -> BotResult<Self> {
        Ok(Self::new(
            provider,
            config.token_address()?,
            config.pool_address()?,
            config.log_poll_interval(),
        ))
    }

    fn transfer_filter(&self, direction: TransferDirection) -> Filter {
        let filter = Filter::new()
            .address(self.token)
            .event_signature(transfer_topic());
        match direction {
            TransferDirection::FromPool => filter.topic1(self.pool.into_word()),
            TransferDirection::ToPool => filter.topic2(self.pool.into_word()),
        }
    }

    fn contract_error(&self, message: &str, source: impl Into<anyhow::Error>) -> BotError {
        BotError::Contract {
            contract: self.pool,
            message: message.to_string(),
            source: source.into(),
        }
    }
}

#[async_trait]
impl PoolReader for AlloyPoolReader {
    fn pool_address(&self) -> Address {
        self.pool
    }

    async fn token_reserve(&self) -> BotResult<U256> {
        let data = keccak256("getReserve()")[..4].to_vec();
        let tx = TransactionRequest::default()
            .to(self.pool)
            .input(data.into());

        let result = self.provider.call(&tx).await
            .context("Failed to call getReserve")
            .map_err(|e| self.contract_error("getReserve failed", e))?;
        U256::abi_decode(&result, true)
            .map_err(|e| BotError::parsing("Failed to decode reserve", e))
    }

    async fn native_reserve(&self) -> BotResult<U256> {
        self.provider
            .get_balance(self.pool)
            .await
            .map_err(|e| self.contract_error("balance query failed", e))
    }

    async fn subscribe_transfers(&self, direction: TransferDirection) -> BotResult<TransferStream> {
        let filter = self.transfer_filter(direction);
        debug!(?direction, pool = %self.pool, token = %self.token, "installing transfer filter");

        let poller = self
            .provider
            .watch_logs(&filter)
            .await
            .map_err(|e| self.contract_error("failed to install transfer filter", e))?
            .with_poll_interval(self.poll_interval);

        let stream = poller
            .into_stream()
            .flat_map(futures_util::stream::iter)
            .filter_map(|log| async move { decode_transfer(&log) })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes, LogData};

    fn transfer_log(from: Address, to: Address, value: u64, block: Option<u64>) -> Log {
        let data = LogData::new_unchecked(
            vec![transfer_topic(), from.into_word(), to.into_word()],
            Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec()),
        );
        Log {
            inner: alloy::primitives::Log {
                address: address!("00000000000000000000000000000000000000aa"),
                data,
            },
            block_number: block,
            ..Default::default()
        }
    }

    #[test]
    fn decodes_transfer_logs() {
        let pool = address!("92b8274aba7ab667bee7eb776ec1de32438d90bf");
        let trader = address!("00000000000000000000000000000000000000bb");
        let event = decode_transfer(&transfer_log(pool, trader, 1_000, Some(12))).unwrap();
        assert_eq!(event.block_number, 12);
        assert_eq!(event.from, pool);
        assert_eq!(event.to, trader);
        assert_eq!(event.value, U256::from(1_000));
    }

    #[test]
    fn skips_pending_and_removed_logs() {
        let a = address!("00000000000000000000000000000000000000cc");
        assert!(decode_transfer(&transfer_log(a, a, 1, None)).is_none());

        let mut removed = transfer_log(a, a, 1, Some(3));
        removed.removed = true;
        assert!(decode_transfer(&removed).is_none());
    }
}
