//! Per-account authentication and reconciliation state

use crate::error::{CustodyError, Result};
use crate::passphrase::{EncodedPassphrase, PassphraseHash};
use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DispatcherState {
    pub passphrase_hash: PassphraseHash,
    pub two_factor_enabled: bool,
    /// Address that enabled 2FA; the only caller admitted while it is on
    pub two_factor_owner: Option<Address>,
    /// Token balances as of the last reconciliation
    pub last_known_balance: HashMap<Address, Amount>,
}

impl DispatcherState {
    pub fn new(passphrase_hash: PassphraseHash) -> Self {
        Self {
            passphrase_hash,
            two_factor_enabled: false,
            two_factor_owner: None,
            last_known_balance: HashMap::new(),
        }
    }

    pub fn verify(&self, passphrase: &EncodedPassphrase) -> Result<()> {
        if !self.passphrase_hash.verify(passphrase) {
            return Err(CustodyError::AuthenticationFailed);
        }
        Ok(())
    }

    pub fn rotate(&mut self, new_hash: PassphraseHash) {
        self.passphrase_hash = new_hash;
    }

    pub fn enable_two_factor(&mut self, owner: Address) {
        self.two_factor_enabled = true;
        self.two_factor_owner = Some(owner);
    }

    pub fn disable_two_factor(&mut self) {
        self.two_factor_enabled = false;
        self.two_factor_owner = None;
    }

    pub fn snapshot(&self, token: &Address) -> Amount {
        self.last_known_balance.get(token).copied().unwrap_or(0)
    }

    /// Record a reconciled balance, returning the previous snapshot
    pub fn record(&mut self, token: Address, balance: Amount) -> Amount {
        self.last_known_balance.insert(token, balance).unwrap_or(0)
    }
}

/// Marks an account as inside one of its own calls
#[derive(Debug, Default)]
pub(crate) struct CallFlag(AtomicBool);

impl CallFlag {
    /// Fails with `Reentrancy` when the account is already mid-call
    pub(crate) fn enter(&self, account: &Address) -> Result<CallGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| CustodyError::Reentrancy(*account))?;
        Ok(CallGuard(&self.0))
    }
}

pub(crate) struct CallGuard<'a>(&'a AtomicBool);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
