//! In-process L1/L2 pair for orchestrator tests
//!
//! Both chains share one [`MockWorld`] so a deposit on L1 can credit the
//! child token on L2 and emit the matching relay event, the way the real
//! messengers do. Only the contract surface the deployer touches is modelled.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;

use bridge_deployer::artifacts::{ContractArtifact, InMemoryArtifacts};
use bridge_deployer::chain::{ChainClient, ChainLog, Layer, LogQuery, TxReceipt};
use bridge_deployer::contracts::{
    relay_message_hash, ICrossDomainMessenger, IL1StandardBridge, IL2CrossDomainMessenger,
    IL2StandardBridge, IERC20, L2_CROSS_DOMAIN_MESSENGER, L2_STANDARD_BRIDGE,
};
use bridge_deployer::{DeployError, DeployerConfig, Result};

pub const PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn signer() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn l1_bridge() -> Address {
    Address::repeat_byte(0xb1)
}

pub fn l1_messenger() -> Address {
    Address::repeat_byte(0xc1)
}

pub fn tokens(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
}

/// What the destination messenger does with a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayBehaviour {
    Relay,
    Fail,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Deploy,
    Send,
    Call,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub layer: Layer,
    pub kind: CallKind,
    pub to: Option<Address>,
    pub input: Bytes,
}

impl CallRecord {
    pub fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).map(|s| [s[0], s[1], s[2], s[3]])
    }

    pub fn is(&self, kind: CallKind, selector: [u8; 4]) -> bool {
        self.kind == kind && self.selector() == Some(selector)
    }
}

#[derive(Debug)]
pub struct WorldState {
    pub blocks: HashMap<Layer, u64>,
    pub next_id: u64,
    pub root_token: Option<Address>,
    pub child_token: Option<Address>,
    pub balances: HashMap<(Address, Address), U256>,
    pub allowances: HashMap<(Address, Address, Address), U256>,
    pub logs: Vec<(Layer, ChainLog)>,
    pub receipts: HashMap<B256, TxReceipt>,
    pub message_nonce: u64,
    pub calls: Vec<CallRecord>,
    pub init_codes: Vec<(Layer, Bytes)>,
    // Knobs
    pub initial_supply: U256,
    pub l1_bridge: Address,
    pub deposit_relay: RelayBehaviour,
    pub withdrawal_relay: RelayBehaviour,
    pub revert_selector: Option<(Layer, [u8; 4])>,
    pub unreachable: Option<Layer>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            blocks: HashMap::from([(Layer::L1, 100), (Layer::L2, 5000)]),
            next_id: 1,
            root_token: None,
            child_token: None,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            logs: Vec::new(),
            receipts: HashMap::new(),
            message_nonce: 0,
            calls: Vec::new(),
            init_codes: Vec::new(),
            initial_supply: tokens(1_000_000),
            l1_bridge: l1_bridge(),
            deposit_relay: RelayBehaviour::Relay,
            withdrawal_relay: RelayBehaviour::Relay,
            revert_selector: None,
            unreachable: None,
        }
    }
}

impl WorldState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn new_address(&mut self) -> Address {
        let id = self.next_id();
        let mut bytes = [0u8; 20];
        bytes[0] = 0xdd;
        bytes[12..].copy_from_slice(&id.to_be_bytes());
        Address::from(bytes)
    }

    fn new_hash(&mut self) -> B256 {
        let id = self.next_id();
        let mut bytes = [0u8; 32];
        bytes[0] = 0xee;
        bytes[24..].copy_from_slice(&id.to_be_bytes());
        B256::from(bytes)
    }

    fn mine(&mut self, layer: Layer) -> u64 {
        let block = self.blocks.entry(layer).or_insert(0);
        *block += 1;
        *block
    }

    pub fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        *self.balances.entry((token, holder)).or_default() += amount;
    }

    fn debit(&mut self, layer: Layer, token: Address, holder: Address, amount: U256) -> Result<()> {
        let balance = self.balance(token, holder);
        if balance < amount {
            return Err(reverted(layer, "ERC20: transfer amount exceeds balance"));
        }
        self.balances.insert((token, holder), balance - amount);
        Ok(())
    }

    fn sent_message(
        &mut self,
        source: Layer,
        target: Address,
        sender: Address,
        message: Bytes,
        gas_limit: u32,
    ) -> (ChainLog, B256) {
        let event = ICrossDomainMessenger::SentMessage {
            target,
            sender,
            message,
            messageNonce: U256::from(self.message_nonce),
            gasLimit: U256::from(gas_limit),
        };
        self.message_nonce += 1;

        let data = event.encode_log_data();
        let messenger = match source {
            Layer::L1 => l1_messenger(),
            Layer::L2 => L2_CROSS_DOMAIN_MESSENGER,
        };
        let log = ChainLog {
            address: messenger,
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            tx_hash: None,
            block_number: None,
        };
        (log, relay_message_hash(&event))
    }

    /// Emit the destination messenger's verdict on `msg_hash`.
    /// Returns whether the message was executed.
    fn relay(&mut self, destination: Layer, msg_hash: B256) -> bool {
        let behaviour = match destination {
            Layer::L2 => self.deposit_relay,
            Layer::L1 => self.withdrawal_relay,
        };
        let signature = match behaviour {
            RelayBehaviour::Never => return false,
            RelayBehaviour::Relay => ICrossDomainMessenger::RelayedMessage::SIGNATURE_HASH,
            RelayBehaviour::Fail => ICrossDomainMessenger::FailedRelayedMessage::SIGNATURE_HASH,
        };
        let messenger = match destination {
            Layer::L1 => l1_messenger(),
            Layer::L2 => L2_CROSS_DOMAIN_MESSENGER,
        };
        let block = self.mine(destination);
        let tx_hash = self.new_hash();
        self.logs.push((
            destination,
            ChainLog {
                address: messenger,
                topics: vec![signature, msg_hash],
                data: Bytes::new(),
                tx_hash: Some(tx_hash),
                block_number: Some(block),
            },
        ));
        behaviour == RelayBehaviour::Relay
    }

    fn include(&mut self, layer: Layer, contract_address: Option<Address>, mut logs: Vec<ChainLog>) -> TxReceipt {
        let block = self.mine(layer);
        let tx_hash = self.new_hash();
        for log in &mut logs {
            log.tx_hash = Some(tx_hash);
            log.block_number = Some(block);
            self.logs.push((layer, log.clone()));
        }
        let receipt = TxReceipt {
            tx_hash,
            success: true,
            block_number: Some(block),
            contract_address,
            logs,
        };
        self.receipts.insert(tx_hash, receipt.clone());
        receipt
    }

    fn execute(&mut self, layer: Layer, to: Address, input: &Bytes) -> Result<TxReceipt> {
        match input.get(..4) {
            Some(s) if s == IERC20::approveCall::SELECTOR => {
                let call = IERC20::approveCall::abi_decode(input, true).map_err(|e| bad_input(layer, e))?;
                self.allowances
                    .insert((to, signer(), call.spender), call.amount);
                Ok(self.include(layer, None, vec![]))
            }
            Some(s) if s == IL1StandardBridge::depositERC20Call::SELECTOR && layer == Layer::L1 => {
                if to != self.l1_bridge {
                    return Err(reverted(layer, "no bridge at target"));
                }
                let call = IL1StandardBridge::depositERC20Call::abi_decode(input, true)
                    .map_err(|e| bad_input(layer, e))?;
                let key = (call._l1Token, signer(), to);
                let allowance = self.allowances.get(&key).copied().unwrap_or_default();
                if allowance < call._amount {
                    return Err(reverted(layer, "ERC20: insufficient allowance"));
                }
                self.debit(layer, call._l1Token, signer(), call._amount)?;
                self.allowances.insert(key, allowance - call._amount);
                self.credit(call._l1Token, to, call._amount);

                let (log, msg_hash) = self.sent_message(
                    Layer::L1,
                    L2_STANDARD_BRIDGE,
                    to,
                    input.clone(),
                    call._l2Gas,
                );
                let receipt = self.include(layer, None, vec![log]);
                if self.relay(Layer::L2, msg_hash) {
                    self.credit(call._l2Token, signer(), call._amount);
                }
                Ok(receipt)
            }
            Some(s) if s == IL2StandardBridge::withdrawCall::SELECTOR && layer == Layer::L2 => {
                if to != L2_STANDARD_BRIDGE {
                    return Err(reverted(layer, "no bridge at target"));
                }
                let call = IL2StandardBridge::withdrawCall::abi_decode(input, true)
                    .map_err(|e| bad_input(layer, e))?;
                self.debit(layer, call._l2Token, signer(), call._amount)?;

                let l1_bridge = self.l1_bridge;
                let (log, msg_hash) =
                    self.sent_message(Layer::L2, l1_bridge, to, input.clone(), call._l1Gas);
                let receipt = self.include(layer, None, vec![log]);
                if self.relay(Layer::L1, msg_hash) {
                    if let Some(root) = self.root_token {
                        self.debit(Layer::L1, root, l1_bridge, call._amount)?;
                        self.credit(root, signer(), call._amount);
                    }
                }
                Ok(receipt)
            }
            _ => Err(reverted(layer, "unknown function")),
        }
    }

    fn read(&self, layer: Layer, to: Address, input: &Bytes) -> Result<Bytes> {
        let output = match input.get(..4) {
            Some(s) if s == IERC20::balanceOfCall::SELECTOR => {
                let call = IERC20::balanceOfCall::abi_decode(input, true).map_err(|e| bad_input(layer, e))?;
                self.balance(to, call.account).abi_encode()
            }
            Some(s)
                if s == IL2StandardBridge::l1TokenBridgeCall::SELECTOR
                    && layer == Layer::L2
                    && to == L2_STANDARD_BRIDGE =>
            {
                self.l1_bridge.abi_encode()
            }
            Some(s)
                if s == IL2CrossDomainMessenger::l1CrossDomainMessengerCall::SELECTOR
                    && layer == Layer::L2
                    && to == L2_CROSS_DOMAIN_MESSENGER =>
            {
                l1_messenger().abi_encode()
            }
            _ => return Err(reverted(layer, "call to non-contract")),
        };
        Ok(output.into())
    }
}

fn reverted(layer: Layer, reason: &str) -> DeployError {
    DeployError::Rejected {
        layer,
        action: "transaction".to_string(),
        reason: format!("execution reverted: {}", reason),
    }
}

fn bad_input(layer: Layer, error: impl std::fmt::Display) -> DeployError {
    reverted(layer, &format!("bad calldata: {}", error))
}

/// Shared state of both mock chains
#[derive(Debug, Default)]
pub struct MockWorld {
    state: Mutex<WorldState>,
}

impl MockWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap()
    }

    pub fn client(self: &Arc<Self>, layer: Layer) -> Arc<MockChain> {
        Arc::new(MockChain {
            layer,
            world: self.clone(),
        })
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state().calls.clone()
    }
}

pub struct MockChain {
    layer: Layer,
    world: Arc<MockWorld>,
}

impl MockChain {
    fn enter(&self, kind: CallKind, to: Option<Address>, input: &Bytes) -> Result<MutexGuard<'_, WorldState>> {
        let mut state = self.world.state();
        state.calls.push(CallRecord {
            layer: self.layer,
            kind,
            to,
            input: input.clone(),
        });
        if state.unreachable == Some(self.layer) {
            return Err(DeployError::Network {
                layer: self.layer,
                message: "error sending request: connection refused".to_string(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn layer(&self) -> Layer {
        self.layer
    }

    fn signer_address(&self) -> Address {
        signer()
    }

    async fn deploy(&self, init_code: Bytes) -> Result<TxReceipt> {
        let mut state = self.enter(CallKind::Deploy, None, &init_code)?;
        state.init_codes.push((self.layer, init_code));

        let address = state.new_address();
        match self.layer {
            Layer::L1 => {
                state.root_token = Some(address);
                let supply = state.initial_supply;
                state.credit(address, signer(), supply);
            }
            Layer::L2 => state.child_token = Some(address),
        }
        Ok(state.include(self.layer, Some(address), vec![]))
    }

    async fn send(&self, to: Address, input: Bytes) -> Result<TxReceipt> {
        let mut state = self.enter(CallKind::Send, Some(to), &input)?;
        if let Some((layer, selector)) = state.revert_selector {
            if layer == self.layer && input.get(..4) == Some(&selector[..]) {
                return Err(reverted(self.layer, "injected failure"));
            }
        }
        state.execute(self.layer, to, &input)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let state = self.enter(CallKind::Call, Some(to), &input)?;
        state.read(self.layer, to, &input)
    }

    async fn block_number(&self) -> Result<u64> {
        let state = self.enter(CallKind::Call, None, &Bytes::new())?;
        Ok(state.blocks.get(&self.layer).copied().unwrap_or_default())
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        let state = self.world.state();
        Ok(state
            .logs
            .iter()
            .filter(|(layer, log)| *layer == self.layer && query.matches(log))
            .map(|(_, log)| log.clone())
            .collect())
    }
}

const CHILD_TOKEN_ABI: &str = r#"[
    {
        "type": "constructor",
        "stateMutability": "nonpayable",
        "inputs": [
            { "name": "_l2Bridge", "type": "address", "internalType": "address" },
            { "name": "_l1Token", "type": "address", "internalType": "address" }
        ]
    }
]"#;

pub fn artifacts() -> InMemoryArtifacts {
    let child_abi: JsonAbi = serde_json::from_str(CHILD_TOKEN_ABI).unwrap();
    InMemoryArtifacts::new()
        .with(ContractArtifact::new(
            "RootToken",
            JsonAbi::default(),
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x01]),
        ))
        .with(ContractArtifact::new(
            "ChildToken",
            child_abi,
            Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x02]),
        ))
}

/// Config with fast relay polling; `overrides` replace or add variables.
pub fn config(overrides: &[(&str, &str)]) -> DeployerConfig {
    let mut vars: HashMap<String, String> = [
        ("PRIVATE_KEY", PRIVATE_KEY),
        ("L1_RPC_URL", "http://localhost:8545"),
        ("L2_RPC_URL", "http://localhost:9545"),
        ("TRANSFER_AMOUNT", "1000.0"),
        ("RELAY_POLL_INTERVAL_MS", "10"),
        ("DEPOSIT_RELAY_TIMEOUT_SECS", "5"),
        ("WITHDRAWAL_RELAY_TIMEOUT_SECS", "5"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    DeployerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub const SHORT: Duration = Duration::from_millis(50);
