//! Deployer configuration
//!
//! Everything comes from the process environment (optionally seeded from a
//! `.env` file). Loading validates every value, so a missing key or endpoint
//! fails before any network call is made.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use url::Url;

use crate::contracts::{L2_CROSS_DOMAIN_MESSENGER, L2_STANDARD_BRIDGE};
use crate::error::{DeployError, Result};
use crate::redact::Redacted;
use crate::steps::RunMode;
use crate::tokens::parse_amount;

pub const DEFAULT_TRANSFER_AMOUNT: &str = "1000.0";
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;
pub const DEFAULT_BRIDGE_GAS_LIMIT: u32 = 2_000_000;
pub const DEFAULT_ROOT_TOKEN_CONTRACT: &str = "RootToken";
pub const DEFAULT_CHILD_TOKEN_CONTRACT: &str = "ChildToken";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Root configuration
#[derive(Clone)]
pub struct DeployerConfig {
    pub private_key: Redacted<B256>,
    pub l1_rpc_url: Url,
    pub l2_rpc_url: Url,
    pub mode: RunMode,
    pub transfer: TransferConfig,
    pub contracts: ContractsConfig,
    pub relay: RelayConfig,
    /// Upper bound on waiting for a sent transaction to be included
    pub confirmation_timeout: Duration,
}

/// Custom Debug that redacts the private key and RPC credentials.
impl fmt::Debug for DeployerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployerConfig")
            .field("private_key", &self.private_key)
            .field("l1_rpc_url", &redact_url(&self.l1_rpc_url))
            .field("l2_rpc_url", &redact_url(&self.l2_rpc_url))
            .field("mode", &self.mode)
            .field("transfer", &self.transfer)
            .field("contracts", &self.contracts)
            .field("relay", &self.relay)
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish()
    }
}

/// What is bridged and how
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Raw token units
    pub amount: U256,
    pub decimals: u8,
    /// Gas limit for the message executed on the destination chain
    pub gas_limit: u32,
    /// Opaque payload forwarded with the deposit/withdrawal
    pub extra_data: Bytes,
}

/// Contract names and fixed addresses
#[derive(Debug, Clone)]
pub struct ContractsConfig {
    pub artifacts_dir: PathBuf,
    pub root_token: String,
    pub child_token: String,
    pub l2_bridge: Address,
    pub l2_messenger: Address,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            root_token: DEFAULT_ROOT_TOKEN_CONTRACT.to_string(),
            child_token: DEFAULT_CHILD_TOKEN_CONTRACT.to_string(),
            l2_bridge: L2_STANDARD_BRIDGE,
            l2_messenger: L2_CROSS_DOMAIN_MESSENGER,
        }
    }
}

/// Cross-domain relay waiting
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub deposit_timeout: Duration,
    pub withdrawal_timeout: Duration,
    pub poll_interval: Duration,
    /// How far behind the destination head to start searching for the relay
    pub lookback_blocks: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            deposit_timeout: Duration::from_secs(600),
            withdrawal_timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(5000),
            lookback_blocks: 10_000,
        }
    }
}

impl DeployerConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is applied first;
    /// variables already set in the environment win.
    pub fn from_env() -> Result<Self> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an explicit env file, then the environment.
    pub fn from_env_file(path: &std::path::Path) -> Result<Self> {
        dotenvy::from_path(path).map_err(|e| {
            DeployError::config(format!("Failed to load env file {}: {}", path.display(), e))
        })?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let private_key = get("PRIVATE_KEY")
            .ok_or_else(|| DeployError::config("PRIVATE_KEY required"))
            .and_then(|raw| parse_private_key(&raw))?;

        let l1_rpc_url = get("L1_RPC_URL")
            .or_else(|| get("KOVAN_RPC_URL"))
            .ok_or_else(|| DeployError::config("L1_RPC_URL required"))
            .and_then(|raw| parse_url("L1_RPC_URL", &raw))?;

        let l2_rpc_url = get("L2_RPC_URL")
            .or_else(|| get("OPTIMISM_RPC_URL"))
            .ok_or_else(|| DeployError::config("L2_RPC_URL required"))
            .and_then(|raw| parse_url("L2_RPC_URL", &raw))?;

        let mode = match get("DEPLOY_MODE") {
            Some(raw) => raw.parse()?,
            None => RunMode::default(),
        };

        let decimals = parse_or("TOKEN_DECIMALS", get("TOKEN_DECIMALS"), DEFAULT_TOKEN_DECIMALS)?;
        let amount = parse_amount(
            &get("TRANSFER_AMOUNT").unwrap_or_else(|| DEFAULT_TRANSFER_AMOUNT.to_string()),
            decimals,
        )?;
        if amount.is_zero() {
            return Err(DeployError::config("TRANSFER_AMOUNT must be greater than zero"));
        }

        let transfer = TransferConfig {
            amount,
            decimals,
            gas_limit: parse_or(
                "BRIDGE_GAS_LIMIT",
                get("BRIDGE_GAS_LIMIT"),
                DEFAULT_BRIDGE_GAS_LIMIT,
            )?,
            extra_data: parse_or("BRIDGE_EXTRA_DATA", get("BRIDGE_EXTRA_DATA"), Bytes::new())?,
        };

        let defaults = ContractsConfig::default();
        let contracts = ContractsConfig {
            artifacts_dir: get("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifacts_dir),
            root_token: get("ROOT_TOKEN_CONTRACT").unwrap_or(defaults.root_token),
            child_token: get("CHILD_TOKEN_CONTRACT").unwrap_or(defaults.child_token),
            l2_bridge: parse_or("L2_BRIDGE_ADDRESS", get("L2_BRIDGE_ADDRESS"), defaults.l2_bridge)?,
            l2_messenger: parse_or(
                "L2_MESSENGER_ADDRESS",
                get("L2_MESSENGER_ADDRESS"),
                defaults.l2_messenger,
            )?,
        };

        let relay_defaults = RelayConfig::default();
        let relay = RelayConfig {
            deposit_timeout: Duration::from_secs(parse_or(
                "DEPOSIT_RELAY_TIMEOUT_SECS",
                get("DEPOSIT_RELAY_TIMEOUT_SECS"),
                relay_defaults.deposit_timeout.as_secs(),
            )?),
            withdrawal_timeout: Duration::from_secs(parse_or(
                "WITHDRAWAL_RELAY_TIMEOUT_SECS",
                get("WITHDRAWAL_RELAY_TIMEOUT_SECS"),
                relay_defaults.withdrawal_timeout.as_secs(),
            )?),
            poll_interval: Duration::from_millis(parse_or(
                "RELAY_POLL_INTERVAL_MS",
                get("RELAY_POLL_INTERVAL_MS"),
                relay_defaults.poll_interval.as_millis() as u64,
            )?),
            lookback_blocks: parse_or(
                "RELAY_LOOKBACK_BLOCKS",
                get("RELAY_LOOKBACK_BLOCKS"),
                relay_defaults.lookback_blocks,
            )?,
        };
        if relay.deposit_timeout.is_zero() || relay.withdrawal_timeout.is_zero() {
            return Err(DeployError::config("Relay timeouts must be greater than zero"));
        }
        if relay.poll_interval.is_zero() {
            return Err(DeployError::config("RELAY_POLL_INTERVAL_MS must be greater than zero"));
        }

        let confirmation_timeout = Duration::from_secs(parse_or(
            "TX_CONFIRMATION_TIMEOUT_SECS",
            get("TX_CONFIRMATION_TIMEOUT_SECS"),
            300,
        )?);

        Ok(Self {
            private_key,
            l1_rpc_url,
            l2_rpc_url,
            mode,
            transfer,
            contracts,
            relay,
            confirmation_timeout,
        })
    }
}

/// An absent `.env` is fine; one that exists but cannot be read or parsed is not.
fn check_dotenv(loaded: std::result::Result<std::path::PathBuf, dotenvy::Error>) -> Result<()> {
    match loaded {
        Ok(path) => {
            tracing::debug!("Loaded .env from {:?}", path);
            Ok(())
        }
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DeployError::config(format!("Failed to load .env: {}", e))),
    }
}

fn parse_private_key(raw: &str) -> Result<Redacted<B256>> {
    let key: B256 = raw
        .trim()
        .parse()
        .map_err(|_| DeployError::config("PRIVATE_KEY must be 32 bytes of hex"))?;
    if key == B256::ZERO {
        return Err(DeployError::config("PRIVATE_KEY must not be zero"));
    }
    Ok(Redacted::new(key))
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| DeployError::config(format!("Invalid {}: {}", name, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DeployError::config(format!(
            "{} must be an http(s) endpoint, got scheme '{}'",
            name, other
        ))),
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| DeployError::config(format!("Invalid {}: {}", name, e))),
        None => Ok(default),
    }
}

/// Strip credentials and API-key paths from an RPC URL for display.
fn redact_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or("<unknown>");
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}
