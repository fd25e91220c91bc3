//! Chain client abstraction
//!
//! The orchestrator talks to each network through a [`ChainClient`]: one
//! read/write connection bound to the signing key. The production
//! implementation lives in [`crate::evm`]; tests inject in-process fakes.

use std::fmt;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Which side of the bridge a client or message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Layer {
    L1,
    L2,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::L1 => f.write_str("L1"),
            Layer::L2 => f.write_str("L2"),
        }
    }
}

/// Log emitted by a contract, with the transaction that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

/// Outcome of an included transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    /// Set for contract creations
    pub contract_address: Option<Address>,
    pub logs: Vec<ChainLog>,
}

/// Log filter: one contract, one event signature, optional first indexed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event: B256,
    pub topic1: Option<B256>,
    pub from_block: u64,
}

impl LogQuery {
    pub fn new(address: Address, event: B256, from_block: u64) -> Self {
        Self {
            address,
            event,
            topic1: None,
            from_block,
        }
    }

    pub fn with_topic1(mut self, topic: B256) -> Self {
        self.topic1 = Some(topic);
        self
    }

    /// Whether `log` satisfies this filter
    pub fn matches(&self, log: &ChainLog) -> bool {
        log.address == self.address
            && log.topics.first() == Some(&self.event)
            && self
                .topic1
                .map_or(true, |topic| log.topics.get(1) == Some(&topic))
            && log.block_number.map_or(true, |n| n >= self.from_block)
    }
}

/// Read/write access to one network as the configured signer.
///
/// `deploy` and `send` return only after the transaction is included, and
/// fail with [`crate::DeployError::Rejected`] when it reverted.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn layer(&self) -> Layer;

    fn signer_address(&self) -> Address;

    /// Submit a contract creation with `init_code` (bytecode + constructor args).
    async fn deploy(&self, init_code: Bytes) -> Result<TxReceipt>;

    /// Submit a call transaction to `to` with calldata `input`.
    async fn send(&self, to: Address, input: Bytes) -> Result<TxReceipt>;

    /// Read-only `eth_call`.
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes>;

    async fn block_number(&self) -> Result<u64>;

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>>;
}
