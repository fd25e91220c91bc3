//! Error types for the deployer
//!
//! Every failure is propagated to the caller unchanged; nothing in the crate
//! retries or compensates. [`DeployError::kind`] collapses the variants into
//! the coarse classes the CLI reports on.

use std::fmt;
use std::time::Duration;

use alloy::primitives::B256;
use serde::Serialize;
use thiserror::Error;

use crate::chain::Layer;
use crate::steps::Step;

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum DeployError {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact '{name}' unavailable: {reason}")]
    Artifact { name: String, reason: String },

    // ========================================================================
    // Chain access
    // ========================================================================
    #[error("{layer} network error: {message}")]
    Network { layer: Layer, message: String },

    #[error("{layer} rejected {action}: {reason}")]
    Rejected {
        layer: Layer,
        action: String,
        reason: String,
    },

    #[error("Unexpected data from {layer}: {reason}")]
    Decode { layer: Layer, reason: String },

    // ========================================================================
    // Cross-domain relay
    // ========================================================================
    #[error("Message {msg_hash} was not relayed on {destination} within {waited:?}")]
    RelayTimeout {
        destination: Layer,
        msg_hash: B256,
        waited: Duration,
    },

    #[error("Message {msg_hash} failed to relay on {destination} (tx {relay_tx})")]
    RelayFailed {
        destination: Layer,
        msg_hash: B256,
        relay_tx: B256,
    },

    #[error("Cancelled while waiting for relay of {msg_hash}")]
    Cancelled { msg_hash: B256 },

    // ========================================================================
    // Orchestration
    // ========================================================================
    #[error("Aborted at step '{step}': {source}")]
    Aborted {
        step: Step,
        #[source]
        source: Box<DeployError>,
    },
}

/// Coarse failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Network,
    /// A node answered but the reply could not be interpreted
    UnexpectedData,
    Rejected,
    RelayTimeout,
    RelayFailed,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "config",
            ErrorKind::Network => "network",
            ErrorKind::UnexpectedData => "unexpected_data",
            ErrorKind::Rejected => "rejected",
            ErrorKind::RelayTimeout => "relay_timeout",
            ErrorKind::RelayFailed => "relay_failed",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Config(_) | DeployError::Artifact { .. } => ErrorKind::Config,
            DeployError::Network { .. } => ErrorKind::Network,
            DeployError::Decode { .. } => ErrorKind::UnexpectedData,
            DeployError::Rejected { .. } => ErrorKind::Rejected,
            DeployError::RelayTimeout { .. } => ErrorKind::RelayTimeout,
            DeployError::RelayFailed { .. } => ErrorKind::RelayFailed,
            DeployError::Cancelled { .. } => ErrorKind::Cancelled,
            DeployError::Aborted { source, .. } => source.kind(),
        }
    }

    /// Step the run stopped at, if this error came out of the orchestrator.
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            DeployError::Aborted { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        DeployError::Config(message.into())
    }

    pub fn artifact(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        DeployError::Artifact {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(layer: Layer, reason: impl fmt::Display) -> Self {
        DeployError::Decode {
            layer,
            reason: reason.to_string(),
        }
    }

    /// Map an RPC failure raised while performing `action` on `layer`.
    ///
    /// Node errors for reverted calls, underfunded accounts and nonce
    /// conflicts are chain rejections; everything else is a network error.
    pub fn rpc(layer: Layer, action: &str, error: impl fmt::Display) -> Self {
        let message = error.to_string();
        if is_chain_rejection(&message) {
            DeployError::Rejected {
                layer,
                action: action.to_string(),
                reason: message,
            }
        } else {
            DeployError::Network {
                layer,
                message: format!("{}: {}", action, message),
            }
        }
    }
}

fn is_chain_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("revert")
        || lower.contains("insufficient funds")
        || lower.contains("insufficient balance")
        || lower.contains("insufficient allowance")
        || lower.contains("exceeds allowance")
        || lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("replacement transaction underpriced")
        || lower.contains("already known")
        || lower.contains("out of gas")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_classification() {
        let err = DeployError::rpc(Layer::L1, "approve", "execution reverted: ERC20: denied");
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let err = DeployError::rpc(Layer::L2, "withdraw", "nonce too low");
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let err = DeployError::rpc(
            Layer::L1,
            "deploy",
            "insufficient funds for gas * price + value",
        );
        assert_eq!(err.kind(), ErrorKind::Rejected);

        let err = DeployError::rpc(Layer::L1, "deploy", "error sending request: connection refused");
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("L1 network error"));
    }

    #[test]
    fn test_aborted_delegates_kind() {
        let err = DeployError::Aborted {
            step: Step::AwaitDepositRelay,
            source: Box::new(DeployError::RelayTimeout {
                destination: Layer::L2,
                msg_hash: B256::ZERO,
                waited: Duration::from_secs(5),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::RelayTimeout);
        assert_eq!(err.failed_step(), Some(Step::AwaitDepositRelay));
        assert!(err.to_string().starts_with("Aborted at step 'await-deposit-relay'"));
    }

    #[test]
    fn test_decode_errors_are_not_network() {
        let err = DeployError::decode(Layer::L2, "l1TokenBridge returned zero address");
        assert_eq!(err.kind(), ErrorKind::UnexpectedData);
        assert_eq!(err.kind().to_string(), "unexpected_data");
        assert!(err.to_string().starts_with("Unexpected data from L2"));
    }

    #[test]
    fn test_artifact_errors_are_configuration() {
        let err = DeployError::artifact("RootToken", "not found");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.failed_step(), None);
    }
}
