//! Step list and run modes
//!
//! The round trip is a fixed, linear list of steps. A [`RunMode`] picks how
//! far down the list a run goes; it never reorders or skips steps.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::DeployError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    DeployRootToken,
    DeployChildToken,
    ResolveBridge,
    Approve,
    Deposit,
    AwaitDepositRelay,
    ReportDepositBalances,
    Withdraw,
    AwaitWithdrawalRelay,
    ReportFinalBalances,
}

impl Step {
    /// Every step in execution order
    pub const ALL: [Step; 10] = [
        Step::DeployRootToken,
        Step::DeployChildToken,
        Step::ResolveBridge,
        Step::Approve,
        Step::Deposit,
        Step::AwaitDepositRelay,
        Step::ReportDepositBalances,
        Step::Withdraw,
        Step::AwaitWithdrawalRelay,
        Step::ReportFinalBalances,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::DeployRootToken => "deploy-root-token",
            Step::DeployChildToken => "deploy-child-token",
            Step::ResolveBridge => "resolve-bridge",
            Step::Approve => "approve",
            Step::Deposit => "deposit",
            Step::AwaitDepositRelay => "await-deposit-relay",
            Step::ReportDepositBalances => "report-deposit-balances",
            Step::Withdraw => "withdraw",
            Step::AwaitWithdrawalRelay => "await-withdrawal-relay",
            Step::ReportFinalBalances => "report-final-balances",
        }
    }

    /// 1-based position in [`Step::ALL`]
    pub fn number(&self) -> usize {
        Step::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static STEP_ORDER: [Step; 10] = Step::ALL;

/// How far a run goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Deploy the root and child tokens only
    Tokens,
    /// Deploy, approve and deposit without waiting for the relay
    Deposit,
    /// Deposit and wait until the tokens arrive on L2
    DepositRelay,
    /// Complete L1 -> L2 -> L1 round trip
    #[default]
    Full,
}

impl RunMode {
    /// Last step executed in this mode
    pub fn stop_after(&self) -> Step {
        match self {
            RunMode::Tokens => Step::DeployChildToken,
            RunMode::Deposit => Step::Deposit,
            RunMode::DepositRelay => Step::ReportDepositBalances,
            RunMode::Full => Step::ReportFinalBalances,
        }
    }

    pub fn steps(&self) -> &'static [Step] {
        &STEP_ORDER[..self.stop_after().number()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Tokens => "tokens",
            RunMode::Deposit => "deposit",
            RunMode::DepositRelay => "deposit-relay",
            RunMode::Full => "full",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tokens" | "deploy" => Ok(RunMode::Tokens),
            "deposit" => Ok(RunMode::Deposit),
            "deposit-relay" | "deposit_relay" => Ok(RunMode::DepositRelay),
            "full" | "round-trip" => Ok(RunMode::Full),
            other => Err(DeployError::config(format!(
                "Unknown run mode '{}' (expected tokens, deposit, deposit-relay or full)",
                other
            ))),
        }
    }
}
