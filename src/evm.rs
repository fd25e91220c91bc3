//! JSON-RPC chain client
//!
//! [`EvmChainClient`] implements [`ChainClient`] on top of alloy.
//!
//! # Transaction Building
//!
//! Uses `ProviderBuilder::with_recommended_fillers()` so nonce, gas limit and
//! EIP-1559 fees are populated by the node. A call that would revert therefore
//! fails during gas estimation, before anything is broadcast, and surfaces as
//! a chain rejection.

use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::chain::{ChainClient, ChainLog, Layer, LogQuery, TxReceipt};
use crate::error::{DeployError, Result};

/// Signing JSON-RPC client for one network
pub struct EvmChainClient {
    layer: Layer,
    rpc_url: Url,
    signer: PrivateKeySigner,
    confirmation_timeout: Duration,
}

impl EvmChainClient {
    /// Create a client bound to `private_key` on the network at `rpc_url`.
    ///
    /// No request is made here; an unreachable endpoint shows up on first use.
    pub fn new(
        layer: Layer,
        rpc_url: Url,
        private_key: &B256,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let signer = PrivateKeySigner::from_bytes(private_key)
            .map_err(|e| DeployError::config(format!("Invalid private key: {}", e)))?;

        info!(
            layer = %layer,
            rpc_url = %rpc_url,
            address = %signer.address(),
            "Created chain client with signer"
        );

        Ok(Self {
            layer,
            rpc_url,
            signer,
            confirmation_timeout,
        })
    }

    fn provider(&self) -> impl Provider<Http<Client>> {
        let wallet = EthereumWallet::from(self.signer.clone());
        ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone())
    }

    /// Broadcast `tx` and wait until it is included.
    async fn submit(&self, action: &str, tx: TransactionRequest) -> Result<TxReceipt> {
        let provider = self.provider();

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| DeployError::rpc(self.layer, action, e))?;

        let tx_hash = *pending.tx_hash();
        info!(layer = %self.layer, tx_hash = %tx_hash, action, "Transaction sent");

        let receipt = tokio::time::timeout(self.confirmation_timeout, pending.get_receipt())
            .await
            .map_err(|_| DeployError::Network {
                layer: self.layer,
                message: format!(
                    "{} tx {} not confirmed within {:?}",
                    action, tx_hash, self.confirmation_timeout
                ),
            })?
            .map_err(|e| DeployError::rpc(self.layer, action, e))?;

        let receipt = convert_receipt(&receipt);
        if !receipt.success {
            return Err(DeployError::Rejected {
                layer: self.layer,
                action: action.to_string(),
                reason: format!("transaction {} reverted", tx_hash),
            });
        }

        debug!(
            layer = %self.layer,
            tx_hash = %tx_hash,
            block = ?receipt.block_number,
            "Transaction confirmed"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn layer(&self) -> Layer {
        self.layer
    }

    fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn deploy(&self, init_code: Bytes) -> Result<TxReceipt> {
        let tx = TransactionRequest::default().with_deploy_code(init_code);
        self.submit("deploy", tx).await
    }

    async fn send(&self, to: Address, input: Bytes) -> Result<TxReceipt> {
        let action = selector_label(&input);
        let tx = TransactionRequest::default().with_to(to).with_input(input);
        self.submit(&action, tx).await
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let action = selector_label(&input);
        let tx = TransactionRequest::default().with_to(to).with_input(input);
        self.provider()
            .call(&tx)
            .await
            .map_err(|e| DeployError::rpc(self.layer, &action, e))
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider()
            .get_block_number()
            .await
            .map_err(|e| DeployError::rpc(self.layer, "eth_blockNumber", e))
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        let mut filter = Filter::new()
            .address(query.address)
            .event_signature(query.event)
            .from_block(query.from_block);
        if let Some(topic) = query.topic1 {
            filter = filter.topic1(topic);
        }

        let logs = self
            .provider()
            .get_logs(&filter)
            .await
            .map_err(|e| DeployError::rpc(self.layer, "eth_getLogs", e))?;
        Ok(logs.iter().map(convert_log).collect())
    }
}

fn convert_log(log: &Log) -> ChainLog {
    ChainLog {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        tx_hash: log.transaction_hash,
        block_number: log.block_number,
    }
}

fn convert_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash,
        success: receipt.status(),
        block_number: receipt.block_number,
        contract_address: receipt.contract_address,
        logs: receipt.inner.logs().iter().map(convert_log).collect(),
    }
}

/// `0x095ea7b3`-style label for log and error messages
fn selector_label(input: &Bytes) -> String {
    match input.get(..4) {
        Some(selector) => format!("call 0x{}", alloy::primitives::hex::encode(selector)),
        None => "call".to_string(),
    }
}
