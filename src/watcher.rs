//! Cross-domain relay watcher
//!
//! A deposit or withdrawal makes the source messenger emit `SentMessage`.
//! The destination messenger later records the relay under the message hash
//! as `RelayedMessage` (or `FailedRelayedMessage`). The watcher derives the
//! hashes from the source receipt and polls the destination messenger's logs
//! until one of those events shows up, the deadline passes, or the run is
//! cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, LogData, B256};
use alloy::sol_types::{SolCall, SolEvent};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ChainLog, Layer, LogQuery, TxReceipt};
use crate::config::RelayConfig;
use crate::contracts::{relay_message_hash, ICrossDomainMessenger, IL2CrossDomainMessenger};
use crate::error::{DeployError, Result};

/// Messenger contracts on both sides of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Messengers {
    pub l1: Address,
    pub l2: Address,
}

impl Messengers {
    /// Ask the L2 messenger for its L1 counterpart.
    pub async fn resolve(l2: &dyn ChainClient, l2_messenger: Address) -> Result<Self> {
        let input = IL2CrossDomainMessenger::l1CrossDomainMessengerCall {}.abi_encode();
        let output = l2.call(l2_messenger, input.into()).await?;
        let l1 = IL2CrossDomainMessenger::l1CrossDomainMessengerCall::abi_decode_returns(
            &output, true,
        )
        .map_err(|e| {
            DeployError::decode(l2.layer(), format!("l1CrossDomainMessenger returned {}", e))
        })?
        ._0;

        if l1 == Address::ZERO {
            return Err(DeployError::decode(
                l2.layer(),
                format!("messenger {} reports no L1 counterpart", l2_messenger),
            ));
        }

        info!(l1_messenger = %l1, l2_messenger = %l2_messenger, "Resolved cross-domain messengers");
        Ok(Self { l1, l2: l2_messenger })
    }

    pub fn on(&self, layer: Layer) -> Address {
        match layer {
            Layer::L1 => self.l1,
            Layer::L2 => self.l2,
        }
    }
}

/// Successful relay of one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReceipt {
    pub msg_hash: B256,
    pub destination: Layer,
    pub relay_tx: Option<B256>,
    pub block_number: Option<u64>,
}

pub struct RelayWatcher {
    l1: Arc<dyn ChainClient>,
    l2: Arc<dyn ChainClient>,
    messengers: Messengers,
    poll_interval: Duration,
    lookback_blocks: u64,
    cancel: CancellationToken,
}

impl RelayWatcher {
    pub fn new(
        l1: Arc<dyn ChainClient>,
        l2: Arc<dyn ChainClient>,
        messengers: Messengers,
        settings: &RelayConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            l1,
            l2,
            messengers,
            poll_interval: settings.poll_interval,
            lookback_blocks: settings.lookback_blocks,
            cancel,
        }
    }

    fn client(&self, layer: Layer) -> &dyn ChainClient {
        match layer {
            Layer::L1 => self.l1.as_ref(),
            Layer::L2 => self.l2.as_ref(),
        }
    }

    /// Hashes of every message the `source` messenger sent in `receipt`.
    ///
    /// A transaction that went through the bridge always sends at least one
    /// message; an empty result is reported as unexpected chain data.
    pub fn message_hashes(&self, source: Layer, receipt: &TxReceipt) -> Result<Vec<B256>> {
        let messenger = self.messengers.on(source);
        let hashes = receipt
            .logs
            .iter()
            .filter(|log| {
                log.address == messenger
                    && log.topics.first() == Some(&ICrossDomainMessenger::SentMessage::SIGNATURE_HASH)
            })
            .map(|log| decode_sent_message(source, log).map(|event| relay_message_hash(&event)))
            .collect::<Result<Vec<_>>>()?;

        if hashes.is_empty() {
            return Err(DeployError::decode(
                source,
                format!(
                    "tx {} emitted no SentMessage from messenger {}",
                    receipt.tx_hash, messenger
                ),
            ));
        }

        for hash in &hashes {
            debug!(source = %source, tx_hash = %receipt.tx_hash, msg_hash = %hash, "Derived message hash");
        }
        Ok(hashes)
    }

    /// Wait until `msg_hash` has been relayed on `destination`.
    pub async fn wait_for_relay(
        &self,
        destination: Layer,
        msg_hash: B256,
        timeout: Duration,
    ) -> Result<RelayReceipt> {
        let started = Instant::now();
        self.wait_until(destination, msg_hash, started, started + timeout)
            .await
    }

    /// Wait for every hash in `msg_hashes`, all under one shared deadline.
    pub async fn wait_for_relays(
        &self,
        destination: Layer,
        msg_hashes: &[B256],
        timeout: Duration,
    ) -> Result<Vec<RelayReceipt>> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut receipts = Vec::with_capacity(msg_hashes.len());
        for msg_hash in msg_hashes {
            receipts.push(self.wait_until(destination, *msg_hash, started, deadline).await?);
        }
        Ok(receipts)
    }

    async fn wait_until(
        &self,
        destination: Layer,
        msg_hash: B256,
        started: Instant,
        deadline: Instant,
    ) -> Result<RelayReceipt> {
        let client = self.client(destination);
        let messenger = self.messengers.on(destination);
        let wait = RelayWait {
            destination,
            msg_hash,
            started,
            deadline,
        };

        let head = self.bounded(&wait, client.block_number()).await?;
        let from_block = head.saturating_sub(self.lookback_blocks);
        let relayed = LogQuery::new(
            messenger,
            ICrossDomainMessenger::RelayedMessage::SIGNATURE_HASH,
            from_block,
        )
        .with_topic1(msg_hash);
        let failed = LogQuery::new(
            messenger,
            ICrossDomainMessenger::FailedRelayedMessage::SIGNATURE_HASH,
            from_block,
        )
        .with_topic1(msg_hash);

        info!(
            destination = %destination,
            msg_hash = %msg_hash,
            from_block,
            "Waiting for cross-domain relay"
        );

        loop {
            // A failed relay can be retried by anyone, so success wins.
            let relays = self.bounded(&wait, client.logs(&relayed)).await?;
            if let Some(log) = relays.into_iter().next() {
                info!(
                    destination = %destination,
                    msg_hash = %msg_hash,
                    relay_tx = ?log.tx_hash,
                    elapsed = ?started.elapsed(),
                    "Message relayed"
                );
                return Ok(RelayReceipt {
                    msg_hash,
                    destination,
                    relay_tx: log.tx_hash,
                    block_number: log.block_number,
                });
            }

            let failures = self.bounded(&wait, client.logs(&failed)).await?;
            if let Some(log) = failures.into_iter().next() {
                warn!(destination = %destination, msg_hash = %msg_hash, "Relay failed");
                return Err(DeployError::RelayFailed {
                    destination,
                    msg_hash,
                    relay_tx: log.tx_hash.unwrap_or_default(),
                });
            }

            debug!(msg_hash = %msg_hash, retry_in = ?self.poll_interval, "Relay not seen yet");
            self.bounded(&wait, async {
                tokio::time::sleep(self.poll_interval).await;
                Ok(())
            })
            .await?;
        }
    }

    /// Await `request` unless the run is cancelled or the deadline passes first.
    ///
    /// Every RPC round trip goes through here, so a stalled node cannot hold
    /// the wait past its deadline.
    async fn bounded<T, F>(&self, wait: &RelayWait, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                info!(msg_hash = %wait.msg_hash, "Cancellation requested, abandoning relay wait");
                Err(DeployError::Cancelled { msg_hash: wait.msg_hash })
            }
            result = request => result,
            _ = tokio::time::sleep_until(wait.deadline) => Err(DeployError::RelayTimeout {
                destination: wait.destination,
                msg_hash: wait.msg_hash,
                waited: wait.started.elapsed(),
            }),
        }
    }
}

/// One message being waited for
struct RelayWait {
    destination: Layer,
    msg_hash: B256,
    started: Instant,
    deadline: Instant,
}

fn decode_sent_message(layer: Layer, log: &ChainLog) -> Result<ICrossDomainMessenger::SentMessage> {
    let data = LogData::new_unchecked(log.topics.clone(), log.data.clone());
    ICrossDomainMessenger::SentMessage::decode_log_data(&data, true)
        .map_err(|e| DeployError::decode(layer, format!("malformed SentMessage log: {}", e)))
}
