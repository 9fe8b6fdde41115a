use crate::authority::fees;
use crate::config::CustodyConfig;
use crate::types::Amount;
use serde::Serialize;
use std::error::Error;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FeeQuote {
    pub amount: Amount,
    pub fee: Amount,
    pub delivered: Amount,
}

pub fn quote(config: &CustodyConfig, amount: Amount, numerator: u128, denominator: u128, charge: bool) -> FeeQuote {
    let fee = fees::withdraw_fee(
        amount,
        config.withdraw.fee.percentage as u128,
        config.fee_denominator(),
        numerator,
        denominator,
        charge,
    );
    FeeQuote {
        amount,
        fee,
        delivered: amount.saturating_sub(fee),
    }
}

pub fn handle_fee_command(
    config: &CustodyConfig,
    amount: Amount,
    numerator: u128,
    denominator: u128,
    charge: bool,
) -> Result<(), Box<dyn Error>> {
    let quote = quote(config, amount, numerator, denominator, charge);
    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}
