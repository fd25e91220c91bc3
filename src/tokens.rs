//! ERC20 token helpers
//!
//! Amount conversion between human-readable decimals and raw token units,
//! plus balance reads through a [`ChainClient`].

use alloy::primitives::utils::{format_units, parse_units, ParseUnits};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;

use crate::chain::ChainClient;
use crate::contracts::IERC20;
use crate::error::{DeployError, Result};

/// Convert a decimal string such as `"1000.0"` to raw token units.
///
/// Rejects negative amounts.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256> {
    let parsed = parse_units(amount.trim(), decimals)
        .map_err(|e| DeployError::config(format!("Invalid token amount '{}': {}", amount, e)))?;
    match parsed {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(DeployError::config(format!(
            "Token amount must not be negative: {}",
            amount
        ))),
    }
}

/// Render raw token units as a decimal string for logs.
pub fn format_amount(raw: U256, decimals: u8) -> String {
    format_units(raw, decimals).unwrap_or_else(|_| raw.to_string())
}

/// ERC20 `balanceOf(account)` on the client's network
pub async fn balance_of(client: &dyn ChainClient, token: Address, account: Address) -> Result<U256> {
    let input = IERC20::balanceOfCall { account }.abi_encode();
    let output = client.call(token, input.into()).await?;
    let balance = IERC20::balanceOfCall::abi_decode_returns(&output, true)
        .map_err(|e| DeployError::decode(client.layer(), format!("balanceOf returned {}", e)))?;
    Ok(balance._0)
}
