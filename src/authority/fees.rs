//! Deterministic fee engine
//!
//! Fees are evaluated strictly left to right with truncating integer
//! division: `amount * percentage / denominator * numerator / node_denominator`.
//! Intermediates are arbitrary precision so that the only rounding is the
//! truncation at each division step.

use super::node::Node;
use crate::types::{Address, Amount};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Withdrawal and execution fee parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FeeConfig {
    /// Fee percentage, pre-multiplied by `denominator`
    pub withdraw_fee_percentage: u128,
    /// 10^precision
    pub denominator: u128,
    pub min_native_withdraw: Amount,
    /// Floor for tokens without an explicit entry
    pub default_min_token_withdraw: Amount,
    pub min_token_withdraw: HashMap<Address, Amount>,
    /// Charged per allowance unit of a node's execution
    pub execution_base_fee: Amount,
}

impl FeeConfig {
    pub fn min_token_withdraw(&self, token: &Address) -> Amount {
        self.min_token_withdraw
            .get(token)
            .copied()
            .unwrap_or(self.default_min_token_withdraw)
    }
}

fn to_amount(value: BigUint) -> Amount {
    // Results above Amount::MAX exceed any withdrawable amount anyway
    value.to_u128().unwrap_or(Amount::MAX)
}

/// `amount * percentage / denominator * numerator / node_denominator`, or 0
/// when no fee is charged or either denominator is zero
pub fn withdraw_fee(
    amount: Amount,
    percentage: u128,
    denominator: u128,
    fee_numerator: u128,
    fee_denominator: u128,
    charge: bool,
) -> Amount {
    if !charge || denominator == 0 || fee_denominator == 0 {
        return 0;
    }

    let base = BigUint::from(amount) * BigUint::from(percentage) / BigUint::from(denominator);
    let fee = base * BigUint::from(fee_numerator) / BigUint::from(fee_denominator);
    to_amount(fee)
}

/// Withdrawal fee owed to `node` under `config`
pub fn node_withdraw_fee(config: &FeeConfig, node: Option<&Node>, amount: Amount, charge: bool) -> Amount {
    match node {
        Some(node) => withdraw_fee(
            amount,
            config.withdraw_fee_percentage,
            config.denominator,
            node.fee_numerator,
            node.fee_denominator,
            charge,
        ),
        None => 0,
    }
}

/// `gas_allowance * base_fee * numerator / node_denominator`
pub fn execute_fee(base_fee: Amount, node: &Node) -> Amount {
    if node.fee_denominator == 0 {
        return 0;
    }

    let fee = BigUint::from(node.gas_allowance) * BigUint::from(base_fee) * BigUint::from(node.fee_numerator)
        / BigUint::from(node.fee_denominator);
    to_amount(fee)
}
