//! Fungible token interface consumed by dispatcher accounts

use crate::error::Result;
use crate::ledger::{Asset, Ledger};
use crate::types::{Address, Amount};
use std::sync::Arc;

/// Balance storage and transfer semantics of a token contract.
///
/// Transfers are atomic and balance reads are immediately consistent with
/// prior transfers. Tokens never push notifications; dispatcher accounts
/// reconcile their snapshots explicitly.
pub trait TokenContract: Send + Sync {
    fn address(&self) -> Address;

    fn balance_of(&self, holder: &Address) -> Amount;

    /// Move `amount` from `from` to `to`; `from` is the authenticated sender
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<()>;
}

/// Token whose balances live in the shared ledger
#[derive(Debug, Clone)]
pub struct LedgerToken {
    address: Address,
    pub symbol: String,
    pub decimals: u8,
    ledger: Arc<Ledger>,
}

impl LedgerToken {
    pub fn new(address: Address, symbol: &str, decimals: u8, ledger: Arc<Ledger>) -> Self {
        Self {
            address,
            symbol: symbol.to_string(),
            decimals,
            ledger,
        }
    }

    fn asset(&self) -> Asset {
        Asset::Token(self.address)
    }

    /// Overwrite a holder's balance (minting for genesis and tests)
    pub fn set_balance(&self, holder: &Address, amount: Amount) {
        self.ledger.set_balance(holder, self.asset(), amount);
    }

    pub fn total_supply(&self) -> Amount {
        self.ledger.total_supply(self.asset())
    }
}

impl TokenContract for LedgerToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, holder: &Address) -> Amount {
        self.ledger.balance_of(holder, self.asset())
    }

    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.ledger.transfer_asset(from, to, self.asset(), amount)
    }
}
