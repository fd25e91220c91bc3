//! Deployment orchestrator
//!
//! Runs the steps selected by the [`RunMode`] in order against the injected
//! chain clients and artifact source:
//!
//! ```text
//!  L1                                   L2
//!  1. deploy root token
//!                                       2. deploy child token (bridge, root)
//!                                       3. l1TokenBridge() -> L1 bridge
//!  4. approve(L1 bridge, amount)
//!  5. depositERC20(root, child, ...)
//!                 ---- SentMessage ---->
//!                                       6. RelayedMessage(hash)
//!                                       7. balances
//!                                       8. withdraw(child, ...)
//!                 <---- SentMessage ----
//!  9. RelayedMessage(hash)
//! 10. balances
//! ```
//!
//! The first failing step ends the run. Nothing is retried or rolled back;
//! the partial [`RunReport`] stays available through [`Orchestrator::report`].

use std::sync::Arc;
use std::time::Instant;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::artifacts::ArtifactSource;
use crate::chain::{ChainClient, Layer, TxReceipt};
use crate::config::DeployerConfig;
use crate::contracts::{IL1StandardBridge, IL2StandardBridge, IERC20};
use crate::error::{DeployError, Result};
use crate::steps::{RunMode, Step};
use crate::tokens::{balance_of, format_amount};
use crate::watcher::{Messengers, RelayReceipt, RelayWatcher};

/// Transaction sent by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRecord {
    pub step: Step,
    pub layer: Layer,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Signer balances of the root token (L1) and child token (L2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub label: String,
    pub l1: U256,
    pub l2: U256,
}

/// Everything a run produced, in the order it was produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub signer: Address,
    pub amount: U256,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completed_steps: Vec<Step>,
    pub failed_step: Option<Step>,
    pub root_token: Option<Address>,
    pub child_token: Option<Address>,
    pub l1_bridge: Option<Address>,
    pub l2_bridge: Address,
    pub messengers: Option<Messengers>,
    pub transactions: Vec<TxRecord>,
    pub deposit_messages: Vec<B256>,
    pub deposit_relays: Vec<RelayReceipt>,
    pub withdrawal_messages: Vec<B256>,
    pub withdrawal_relays: Vec<RelayReceipt>,
    pub balances: Vec<BalanceSnapshot>,
}

impl RunReport {
    fn new(config: &DeployerConfig, signer: Address) -> Self {
        Self {
            mode: config.mode,
            signer,
            amount: config.transfer.amount,
            started_at: Utc::now(),
            finished_at: None,
            completed_steps: Vec::new(),
            failed_step: None,
            root_token: None,
            child_token: None,
            l1_bridge: None,
            l2_bridge: config.contracts.l2_bridge,
            messengers: None,
            transactions: Vec::new(),
            deposit_messages: Vec::new(),
            deposit_relays: Vec::new(),
            withdrawal_messages: Vec::new(),
            withdrawal_relays: Vec::new(),
            balances: Vec::new(),
        }
    }

    pub fn balance(&self, label: &str) -> Option<&BalanceSnapshot> {
        self.balances.iter().find(|s| s.label == label)
    }
}

pub struct Orchestrator {
    l1: Arc<dyn ChainClient>,
    l2: Arc<dyn ChainClient>,
    artifacts: Arc<dyn ArtifactSource>,
    config: DeployerConfig,
    cancel: CancellationToken,
    report: RunReport,
    deposit_receipt: Option<TxReceipt>,
    withdrawal_receipt: Option<TxReceipt>,
}

impl Orchestrator {
    pub fn new(
        l1: Arc<dyn ChainClient>,
        l2: Arc<dyn ChainClient>,
        artifacts: Arc<dyn ArtifactSource>,
        config: DeployerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let report = RunReport::new(&config, l1.signer_address());
        Self {
            l1,
            l2,
            artifacts,
            config,
            cancel,
            report,
            deposit_receipt: None,
            withdrawal_receipt: None,
        }
    }

    /// State of the run so far; complete after a successful [`run`](Self::run).
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Execute every step of the configured mode.
    pub async fn run(&mut self) -> Result<RunReport> {
        let steps = self.config.mode.steps();
        info!(
            mode = %self.config.mode,
            steps = steps.len(),
            signer = %self.report.signer,
            amount = %format_amount(self.config.transfer.amount, self.config.transfer.decimals),
            "Starting bridge deployment run"
        );

        for step in steps {
            info!(step = %step, number = step.number(), total = steps.len(), "Running step");
            let started = Instant::now();

            if let Err(e) = self.execute(*step).await {
                error!(step = %step, kind = %e.kind(), error = %e, "Step failed, aborting run");
                self.report.failed_step = Some(*step);
                self.report.finished_at = Some(Utc::now());
                return Err(DeployError::Aborted {
                    step: *step,
                    source: Box::new(e),
                });
            }

            self.report.completed_steps.push(*step);
            debug!(step = %step, elapsed = ?started.elapsed(), "Step complete");
        }

        self.report.finished_at = Some(Utc::now());
        info!(mode = %self.config.mode, "Run complete");
        Ok(self.report.clone())
    }

    async fn execute(&mut self, step: Step) -> Result<()> {
        match step {
            Step::DeployRootToken => self.deploy_root_token().await,
            Step::DeployChildToken => self.deploy_child_token().await,
            Step::ResolveBridge => self.resolve_bridge().await,
            Step::Approve => self.approve().await,
            Step::Deposit => self.deposit().await,
            Step::AwaitDepositRelay => self.await_deposit_relay().await,
            Step::ReportDepositBalances => self.snapshot_balances("after-deposit").await,
            Step::Withdraw => self.withdraw().await,
            Step::AwaitWithdrawalRelay => self.await_withdrawal_relay().await,
            Step::ReportFinalBalances => self.snapshot_balances("final").await,
        }
    }

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    async fn deploy_root_token(&mut self) -> Result<()> {
        let name = self.config.contracts.root_token.clone();
        let address = self.deploy(Step::DeployRootToken, Layer::L1, &name, &[]).await?;
        self.report.root_token = Some(address);
        Ok(())
    }

    async fn deploy_child_token(&mut self) -> Result<()> {
        let root = require(self.report.root_token, "root token address")?;
        let name = self.config.contracts.child_token.clone();
        let args = [
            DynSolValue::Address(self.config.contracts.l2_bridge),
            DynSolValue::Address(root),
        ];
        let address = self.deploy(Step::DeployChildToken, Layer::L2, &name, &args).await?;
        self.report.child_token = Some(address);
        Ok(())
    }

    async fn deploy(
        &mut self,
        step: Step,
        layer: Layer,
        contract_name: &str,
        args: &[DynSolValue],
    ) -> Result<Address> {
        let artifact = self.artifacts.artifact(contract_name)?;
        let init_code = artifact.deploy_code(args)?;

        let receipt = self.client(layer).deploy(init_code).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::decode(
                layer,
                format!("deployment {} returned no contract address", receipt.tx_hash),
            )
        })?;

        info!(
            layer = %layer,
            contract = contract_name,
            address = %address,
            tx_hash = %receipt.tx_hash,
            "Contract deployed"
        );
        self.record(step, layer, &receipt);
        Ok(address)
    }

    // ------------------------------------------------------------------
    // Bridge
    // ------------------------------------------------------------------

    async fn resolve_bridge(&mut self) -> Result<()> {
        let l2_bridge = self.config.contracts.l2_bridge;
        let input = IL2StandardBridge::l1TokenBridgeCall {}.abi_encode();
        let output = self.l2.call(l2_bridge, input.into()).await?;
        let l1_bridge = IL2StandardBridge::l1TokenBridgeCall::abi_decode_returns(&output, true)
            .map_err(|e| DeployError::decode(Layer::L2, format!("l1TokenBridge returned {}", e)))?
            ._0;

        if l1_bridge == Address::ZERO {
            return Err(DeployError::decode(
                Layer::L2,
                format!("bridge {} reports no L1 counterpart", l2_bridge),
            ));
        }

        info!(l1_bridge = %l1_bridge, l2_bridge = %l2_bridge, "Resolved L1 bridge");
        self.report.l1_bridge = Some(l1_bridge);
        Ok(())
    }

    async fn approve(&mut self) -> Result<()> {
        let root = require(self.report.root_token, "root token address")?;
        let l1_bridge = require(self.report.l1_bridge, "L1 bridge address")?;
        let amount = self.config.transfer.amount;

        let input = IERC20::approveCall {
            spender: l1_bridge,
            amount,
        }
        .abi_encode();
        let receipt = self.l1.send(root, input.into()).await?;

        info!(
            token = %root,
            spender = %l1_bridge,
            amount = %format_amount(amount, self.config.transfer.decimals),
            tx_hash = %receipt.tx_hash,
            "Bridge approved to spend root token"
        );
        self.record(Step::Approve, Layer::L1, &receipt);
        Ok(())
    }

    async fn deposit(&mut self) -> Result<()> {
        let root = require(self.report.root_token, "root token address")?;
        let child = require(self.report.child_token, "child token address")?;
        let l1_bridge = require(self.report.l1_bridge, "L1 bridge address")?;
        let transfer = self.config.transfer.clone();

        let before = self.snapshot("before-deposit", root, child).await?;
        if before.l1 < transfer.amount {
            return Err(DeployError::Rejected {
                layer: Layer::L1,
                action: "depositERC20".to_string(),
                reason: format!(
                    "signer holds {} root tokens, deposit needs {}",
                    format_amount(before.l1, transfer.decimals),
                    format_amount(transfer.amount, transfer.decimals)
                ),
            });
        }
        self.report.balances.push(before);

        let input = IL1StandardBridge::depositERC20Call {
            _l1Token: root,
            _l2Token: child,
            _amount: transfer.amount,
            _l2Gas: transfer.gas_limit,
            _data: transfer.extra_data,
        }
        .abi_encode();
        let receipt = self.l1.send(l1_bridge, input.into()).await?;

        info!(
            l1_token = %root,
            l2_token = %child,
            amount = %format_amount(transfer.amount, transfer.decimals),
            l2_gas = transfer.gas_limit,
            tx_hash = %receipt.tx_hash,
            "Deposit submitted"
        );
        self.record(Step::Deposit, Layer::L1, &receipt);
        self.deposit_receipt = Some(receipt);
        Ok(())
    }

    async fn withdraw(&mut self) -> Result<()> {
        let child = require(self.report.child_token, "child token address")?;
        let transfer = self.config.transfer.clone();

        let input = IL2StandardBridge::withdrawCall {
            _l2Token: child,
            _amount: transfer.amount,
            _l1Gas: transfer.gas_limit,
            _data: transfer.extra_data,
        }
        .abi_encode();
        let receipt = self
            .l2
            .send(self.config.contracts.l2_bridge, input.into())
            .await?;

        info!(
            l2_token = %child,
            amount = %format_amount(transfer.amount, transfer.decimals),
            l1_gas = transfer.gas_limit,
            tx_hash = %receipt.tx_hash,
            "Withdrawal submitted"
        );
        self.record(Step::Withdraw, Layer::L2, &receipt);
        self.withdrawal_receipt = Some(receipt);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relays
    // ------------------------------------------------------------------

    async fn await_deposit_relay(&mut self) -> Result<()> {
        let receipt = require(self.deposit_receipt.as_ref(), "deposit receipt")?.clone();
        let watcher = self.watcher().await?;

        let hashes = watcher.message_hashes(Layer::L1, &receipt)?;
        self.report.deposit_messages = hashes.clone();

        let relays = watcher
            .wait_for_relays(Layer::L2, &hashes, self.config.relay.deposit_timeout)
            .await?;
        self.report.deposit_relays = relays;
        Ok(())
    }

    async fn await_withdrawal_relay(&mut self) -> Result<()> {
        let receipt = require(self.withdrawal_receipt.as_ref(), "withdrawal receipt")?.clone();
        let watcher = self.watcher().await?;

        let hashes = watcher.message_hashes(Layer::L2, &receipt)?;
        self.report.withdrawal_messages = hashes.clone();

        let relays = watcher
            .wait_for_relays(Layer::L1, &hashes, self.config.relay.withdrawal_timeout)
            .await?;
        self.report.withdrawal_relays = relays;
        Ok(())
    }

    /// Watcher over both messengers, resolving them on first use.
    async fn watcher(&mut self) -> Result<RelayWatcher> {
        let messengers = match self.report.messengers {
            Some(messengers) => messengers,
            None => {
                let resolved =
                    Messengers::resolve(self.l2.as_ref(), self.config.contracts.l2_messenger)
                        .await?;
                self.report.messengers = Some(resolved);
                resolved
            }
        };

        Ok(RelayWatcher::new(
            self.l1.clone(),
            self.l2.clone(),
            messengers,
            &self.config.relay,
            self.cancel.clone(),
        ))
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    async fn snapshot_balances(&mut self, label: &str) -> Result<()> {
        let root = require(self.report.root_token, "root token address")?;
        let child = require(self.report.child_token, "child token address")?;
        let snapshot = self.snapshot(label, root, child).await?;
        self.report.balances.push(snapshot);
        Ok(())
    }

    async fn snapshot(&self, label: &str, root: Address, child: Address) -> Result<BalanceSnapshot> {
        let l1 = balance_of(self.l1.as_ref(), root, self.l1.signer_address()).await?;
        let l2 = balance_of(self.l2.as_ref(), child, self.l2.signer_address()).await?;

        let decimals = self.config.transfer.decimals;
        info!(
            label,
            l1_root_balance = %format_amount(l1, decimals),
            l2_child_balance = %format_amount(l2, decimals),
            "Token balances"
        );

        Ok(BalanceSnapshot {
            label: label.to_string(),
            l1,
            l2,
        })
    }

    fn client(&self, layer: Layer) -> &dyn ChainClient {
        match layer {
            Layer::L1 => self.l1.as_ref(),
            Layer::L2 => self.l2.as_ref(),
        }
    }

    fn record(&mut self, step: Step, layer: Layer, receipt: &TxReceipt) {
        self.report.transactions.push(TxRecord {
            step,
            layer,
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
        });
    }
}

/// Value produced by an earlier step.
///
/// Steps only ever run in order, so a miss means the step list itself is
/// broken rather than anything on chain.
fn require<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| DeployError::config(format!("{} not available at this step", what)))
}
