//! L2 Bridge Deployer - Library interface
//!
//! Deploys a root ERC20 on L1 and its bridged child token on L2, then moves
//! tokens across the standard bridge and back, waiting for each cross-domain
//! message to be relayed.
//!
//! The binary wires [`evm::EvmChainClient`] and [`artifacts::ArtifactDirectory`]
//! into an [`orchestrator::Orchestrator`]; integration tests substitute
//! in-process chains through the [`chain::ChainClient`] trait.

pub mod artifacts;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod evm;
pub mod orchestrator;
pub mod redact;
pub mod steps;
pub mod tokens;
pub mod watcher;

pub use chain::{ChainClient, Layer};
pub use config::DeployerConfig;
pub use error::{DeployError, ErrorKind, Result};
pub use orchestrator::{Orchestrator, RunReport};
pub use steps::{RunMode, Step};
