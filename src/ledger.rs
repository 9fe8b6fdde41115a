//! Balance tracking for native currency and in-process tokens

use crate::error::{CustodyError, Result};
use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Asset held in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// The substrate's native currency
    Native,
    /// Fungible token identified by its contract address
    Token(Address),
}

/// Balances keyed by holder and asset. Zero balances are not stored.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BalanceStore {
    balances: HashMap<(Address, Asset), Amount>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_balance(&self, holder: &Address, asset: Asset) -> Amount {
        self.balances.get(&(*holder, asset)).copied().unwrap_or(0)
    }

    fn put(&mut self, holder: &Address, asset: Asset, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&(*holder, asset));
        } else {
            self.balances.insert((*holder, asset), amount);
        }
    }

    fn raised(&self, holder: &Address, asset: Asset, amount: Amount) -> Result<Amount> {
        self.get_balance(holder, asset)
            .checked_add(amount)
            .ok_or(CustodyError::Overflow)
    }

    fn lowered(&self, holder: &Address, asset: Asset, amount: Amount) -> Result<Amount> {
        let available = self.get_balance(holder, asset);
        available.checked_sub(amount).ok_or(CustodyError::InsufficientFunds {
            available,
            required: amount,
        })
    }

    pub fn credit(&mut self, holder: &Address, asset: Asset, amount: Amount) -> Result<()> {
        let balance = self.raised(holder, asset, amount)?;
        self.put(holder, asset, balance);
        Ok(())
    }

    pub fn debit(&mut self, holder: &Address, asset: Asset, amount: Amount) -> Result<()> {
        let balance = self.lowered(holder, asset, amount)?;
        self.put(holder, asset, balance);
        Ok(())
    }

    /// Move `amount` between holders. Both sides are checked before either
    /// is written, so a failed transfer leaves the store as it was.
    pub fn transfer(&mut self, from: &Address, to: &Address, asset: Asset, amount: Amount) -> Result<()> {
        if from == to {
            return self.lowered(from, asset, amount).map(|_| ());
        }
        let sender = self.lowered(from, asset, amount)?;
        let recipient = self.raised(to, asset, amount)?;
        self.put(from, asset, sender);
        self.put(to, asset, recipient);
        Ok(())
    }

    /// Overwrite a balance (genesis funding, token minting in tests)
    pub fn set_balance(&mut self, holder: &Address, asset: Asset, amount: Amount) {
        self.put(holder, asset, amount);
    }

    pub fn total_supply(&self, asset: Asset) -> Amount {
        self.balances
            .iter()
            .filter(|((_, a), _)| *a == asset)
            .map(|(_, balance)| balance)
            .sum()
    }
}

/// Saved ledger contents, restored when a call has to be undone
#[derive(Debug, Clone)]
pub struct Checkpoint(BalanceStore);

/// Shared, serialized access to the balance store
#[derive(Debug, Default)]
pub struct Ledger {
    store: Mutex<BalanceStore>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, BalanceStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn balance(&self, holder: &Address) -> Amount {
        self.store().get_balance(holder, Asset::Native)
    }

    pub fn balance_of(&self, holder: &Address, asset: Asset) -> Amount {
        self.store().get_balance(holder, asset)
    }

    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.store().transfer(from, to, Asset::Native, amount)
    }

    pub fn transfer_asset(&self, from: &Address, to: &Address, asset: Asset, amount: Amount) -> Result<()> {
        self.store().transfer(from, to, asset, amount)
    }

    pub fn set_balance(&self, holder: &Address, asset: Asset, amount: Amount) {
        self.store().set_balance(holder, asset, amount);
    }

    /// Fund a holder with native currency
    pub fn mint(&self, holder: &Address, amount: Amount) -> Result<()> {
        self.store().credit(holder, Asset::Native, amount)
    }

    pub fn total_supply(&self, asset: Asset) -> Amount {
        self.store().total_supply(asset)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.store().clone())
    }

    pub fn rollback(&self, checkpoint: Checkpoint) {
        *self.store() = checkpoint.0;
    }
}
