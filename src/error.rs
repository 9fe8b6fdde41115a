use crate::types::{Address, Amount};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("Unauthorized: {0} is not the owner")]
    Unauthorized(Address),
    #[error("Account {0} is already locked")]
    AlreadyLocked(Address),
    #[error("Insufficient stake: {offered} < {required} required")]
    InsufficientStake { offered: Amount, required: Amount },
    #[error("Account {0} is not locked")]
    NotLocked(Address),
    #[error("Account is locked by {holder}, not {caller}")]
    WrongHolder { holder: Address, caller: Address },
    #[error("Passphrase authentication failed")]
    AuthenticationFailed,
    #[error("Passphrase is {0} bytes; at most 32 fit the encoding")]
    PassphraseTooLong(usize),
    #[error("Caller {0} is not the second factor owner")]
    NotAuthorized(Address),
    #[error("Amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },
    #[error("Target {0} is excluded from proxy execution")]
    ForbiddenTarget(Address),
    #[error("Balance of token {token} changed since last reconciliation: recorded {recorded}, actual {actual}")]
    StaleBalance { token: Address, recorded: Amount, actual: Amount },
    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: Amount, required: Amount },
    #[error("Fee {fee} exceeds amount {amount}")]
    FeeExceedsAmount { fee: Amount, amount: Amount },
    #[error("Unknown account: {0}")]
    UnknownAccount(Address),
    #[error("Unknown token: {0}")]
    UnknownToken(Address),
    #[error("Unknown node: {0}")]
    UnknownNode(Address),
    #[error("Node {0} already registered")]
    NodeExists(Address),
    #[error("No expired stake to reclaim on {0}")]
    NothingToReclaim(Address),
    #[error("Proxy call to {target} failed: {reason}")]
    CallFailed { target: Address, reason: String },
    #[error("Account {0} re-entered during its own call")]
    Reentrancy(Address),
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CustodyError>;
