//! Dispatcher accounts
//!
//! A dispatcher holds native currency and tokens for one passphrase-holding
//! owner. Every balance-moving or proxy call is authenticated by:
//! 1. Either the 2FA owner, or the holder of the account's active lock
//! 2. The encoded passphrase matching the stored hash
//!
//! A successful call rotates the stored hash and consumes the caller's lock.
//! A failed call leaves balances, lock and hash untouched.

pub mod state;
pub mod targets;

pub use state::DispatcherState;
pub use targets::ExcludedTargets;

use crate::authority::{LockRecord, SharedAuthority};
use crate::error::{CustodyError, Result};
use crate::events::{BalanceChange, Direction, Event, ObserverHub};
use crate::host::Host;
use crate::passphrase::{EncodedPassphrase, PassphraseHash};
use crate::types::{Address, Amount, Caller};
use serde::Serialize;
use state::CallFlag;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of a successful withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub beneficiary: Address,
    pub amount: Amount,
    /// Part of `amount` paid to the mediating node
    pub fee: Amount,
}

impl Withdrawal {
    pub fn delivered(&self) -> Amount {
        self.amount - self.fee
    }
}

/// Passed authentication, not yet committed
struct Authorized {
    two_factor_enabled: bool,
    /// The caller's own active lock, if any
    lock: Option<LockRecord>,
}

pub struct DispatcherAccount {
    address: Address,
    authority: Arc<SharedAuthority>,
    host: Arc<Host>,
    hub: Arc<ObserverHub>,
    excluded: ExcludedTargets,
    state: Arc<Mutex<DispatcherState>>,
    in_call: CallFlag,
}

impl DispatcherAccount {
    pub(crate) fn new(
        address: Address,
        passphrase_hash: PassphraseHash,
        authority: Arc<SharedAuthority>,
        host: Arc<Host>,
        hub: Arc<ObserverHub>,
        excluded: ExcludedTargets,
    ) -> Self {
        Self {
            address,
            authority,
            host,
            hub,
            excluded,
            state: Arc::new(Mutex::new(DispatcherState::new(passphrase_hash))),
            in_call: CallFlag::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutable access; journaled so an enclosing failed call restores it
    fn state_mut(&self) -> MutexGuard<'_, DispatcherState> {
        let state = self.state();
        if self.host.in_transaction() {
            let cell = self.state.clone();
            let before = state.clone();
            self.host.on_revert(move || {
                *cell.lock().unwrap_or_else(PoisonError::into_inner) = before;
            });
        }
        state
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn passphrase_hash(&self) -> PassphraseHash {
        self.state().passphrase_hash
    }

    pub fn is_2fa_enabled(&self) -> bool {
        self.state().two_factor_enabled
    }

    pub fn two_factor_owner(&self) -> Option<Address> {
        self.state().two_factor_owner
    }

    pub fn last_known_balance(&self, token: &Address) -> Amount {
        self.state().snapshot(token)
    }

    pub fn excluded_targets(&self) -> &ExcludedTargets {
        &self.excluded
    }

    /// Copy of the full account state
    pub fn snapshot(&self) -> DispatcherState {
        self.state().clone()
    }

    /// Native balance
    pub fn balance(&self) -> Amount {
        self.host.ledger().balance(&self.address)
    }

    /// Accept the caller's attached value
    pub fn deposit(&self, caller: &Caller) -> Result<Amount> {
        let _call = self.in_call.enter(&self.address)?;
        self.host
            .ledger()
            .transfer(&caller.address, &self.address, caller.value)?;
        debug!(account = %self.address, from = %caller.address, value = caller.value, "native deposit");
        Ok(self.balance())
    }

    // --- Authentication ---

    fn authorize(&self, caller: &Caller, passphrase: &EncodedPassphrase) -> Result<Authorized> {
        let state = self.state();
        let lock = self.authority.get_lock(&self.address);

        if state.two_factor_enabled {
            if state.two_factor_owner != Some(caller.address) {
                return Err(CustodyError::NotAuthorized(caller.address));
            }
        } else {
            let active = lock.ok_or(CustodyError::NotLocked(self.address))?;
            if active.holder != caller.address {
                return Err(CustodyError::WrongHolder {
                    holder: active.holder,
                    caller: caller.address,
                });
            }
        }

        state.verify(passphrase)?;

        Ok(Authorized {
            two_factor_enabled: state.two_factor_enabled,
            lock: lock.filter(|l| l.holder == caller.address),
        })
    }

    /// Whether the caller mediates this call as an enabled node
    fn node_holder(&self, caller: &Caller, auth: &Authorized) -> bool {
        auth.lock.map(|l| l.is_node).unwrap_or(false) && self.authority.is_node(&caller.address)
    }

    /// Consume the caller's lock and rotate the hash
    fn commit(&self, caller: &Caller, new_hash: PassphraseHash) -> Result<()> {
        self.authority.consume_lock(&self.address, &caller.address)?;
        self.state_mut().rotate(new_hash);
        Ok(())
    }

    /// Run `f` as one host transaction. A failure undoes ledger moves and
    /// any authority or account state touched along the way, including
    /// changes made by a proxy target.
    fn atomically<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.host
            .transaction(f)
            .inspect_err(|e| warn!(account = %self.address, error = %e, "call reverted"))
    }

    // --- Native withdrawals ---

    /// Withdraw to the caller without a fee
    pub fn withdraw_ether(
        &self,
        caller: &Caller,
        amount: Amount,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<Withdrawal> {
        self.withdraw_native(caller, caller.address, amount, passphrase, new_hash, false)
    }

    /// Withdraw to `beneficiary`, paying the mediating node its fee
    pub fn withdraw_ether_to(
        &self,
        caller: &Caller,
        beneficiary: Address,
        amount: Amount,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<Withdrawal> {
        self.withdraw_native(caller, beneficiary, amount, passphrase, new_hash, true)
    }

    fn withdraw_native(
        &self,
        caller: &Caller,
        beneficiary: Address,
        amount: Amount,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
        with_fee: bool,
    ) -> Result<Withdrawal> {
        let _call = self.in_call.enter(&self.address)?;
        let auth = self.authorize(caller, passphrase)?;

        let minimum = self.authority.min_ether_withdraw_amount();
        if amount < minimum {
            return Err(CustodyError::BelowMinimum { amount, minimum });
        }

        let fee = self.withdraw_fee(caller, &auth, amount, with_fee)?;
        let ledger = self.host.ledger();

        self.atomically(|| {
            ledger.transfer(&self.address, &caller.address, fee)?;
            ledger.transfer(&self.address, &beneficiary, amount - fee)?;
            self.commit(caller, new_hash)
        })?;

        info!(account = %self.address, beneficiary = %beneficiary, amount, fee, "native withdrawal");
        Ok(Withdrawal {
            beneficiary,
            amount,
            fee,
        })
    }

    fn withdraw_fee(&self, caller: &Caller, auth: &Authorized, amount: Amount, with_fee: bool) -> Result<Amount> {
        if !with_fee || !self.node_holder(caller, auth) {
            return Ok(0);
        }

        let fee = self
            .authority
            .calculate_withdraw_fee(&caller.address, amount, !auth.two_factor_enabled);
        if fee > amount {
            return Err(CustodyError::FeeExceedsAmount { fee, amount });
        }
        Ok(fee)
    }

    // --- Token withdrawals ---

    pub fn withdraw_tokens(
        &self,
        caller: &Caller,
        token: Address,
        amount: Amount,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<Withdrawal> {
        self.withdraw_token(caller, token, caller.address, amount, passphrase, new_hash, false)
    }

    pub fn withdraw_tokens_to(
        &self,
        caller: &Caller,
        token: Address,
        beneficiary: Address,
        amount: Amount,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<Withdrawal> {
        self.withdraw_token(caller, token, beneficiary, amount, passphrase, new_hash, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn withdraw_token(
        &self,
        caller: &Caller,
        token: Address,
        beneficiary: Address,
        amount: Amount,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
        with_fee: bool,
    ) -> Result<Withdrawal> {
        let _call = self.in_call.enter(&self.address)?;
        let auth = self.authorize(caller, passphrase)?;

        let minimum = self.authority.min_token_withdraw_amount(&token);
        if amount < minimum {
            return Err(CustodyError::BelowMinimum { amount, minimum });
        }

        let contract = self.host.token(&token)?;
        let actual = contract.balance_of(&self.address);
        if self.hub.is_tracked(&token) {
            let recorded = self.state().snapshot(&token);
            if recorded != actual {
                return Err(CustodyError::StaleBalance {
                    token,
                    recorded,
                    actual,
                });
            }
        }
        if actual < amount {
            return Err(CustodyError::InsufficientFunds {
                available: actual,
                required: amount,
            });
        }

        let fee = self.withdraw_fee(caller, &auth, amount, with_fee)?;

        self.atomically(|| {
            contract.transfer(&self.address, &caller.address, fee)?;
            contract.transfer(&self.address, &beneficiary, amount - fee)?;
            self.commit(caller, new_hash)
        })?;

        info!(account = %self.address, token = %token, beneficiary = %beneficiary, amount, fee, "token withdrawal");
        self.reconcile(&token)?;

        Ok(Withdrawal {
            beneficiary,
            amount,
            fee,
        })
    }

    // --- Proxy execution ---

    /// Forward `value` and `data` to `target` on behalf of the account.
    ///
    /// The caller's attached value is credited to the account first. A node
    /// holding the lock is paid its execution fee out of the account.
    pub fn execute(
        &self,
        caller: &Caller,
        target: Address,
        value: Amount,
        data: &[u8],
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<Vec<u8>> {
        if target == self.address || self.excluded.contains(&target) {
            return Err(CustodyError::ForbiddenTarget(target));
        }

        let _call = self.in_call.enter(&self.address)?;
        let auth = self.authorize(caller, passphrase)?;

        let fee = if self.node_holder(caller, &auth) {
            self.authority.calculate_execute_fee(&caller.address)
        } else {
            0
        };
        let ledger = self.host.ledger();

        let output = self.atomically(|| {
            ledger.transfer(&caller.address, &self.address, caller.value)?;
            ledger.transfer(&self.address, &caller.address, fee)?;
            ledger.transfer(&self.address, &target, value)?;

            let output = match self.host.target(&target) {
                Some(contract) => contract
                    .call(&self.address, value, data)
                    .map_err(|reason| CustodyError::CallFailed { target, reason })?,
                None => Vec::new(),
            };

            self.commit(caller, new_hash)?;
            Ok(output)
        })?;

        if fee > 0 {
            self.host.events().emit(Event::Charged {
                account: self.address,
                node: caller.address,
                fee,
            });
        }

        info!(account = %self.address, target = %target, value, fee, "proxy execution");
        Ok(output)
    }

    // --- Second factor and passphrase ---

    pub fn enable_2fa(
        &self,
        caller: &Caller,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<()> {
        let _call = self.in_call.enter(&self.address)?;
        self.authorize(caller, passphrase)?;

        self.atomically(|| self.commit(caller, new_hash))?;
        self.state_mut().enable_two_factor(caller.address);

        info!(account = %self.address, owner = %caller.address, "2fa enabled");
        Ok(())
    }

    pub fn disable_2fa(
        &self,
        caller: &Caller,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<()> {
        let _call = self.in_call.enter(&self.address)?;
        self.authorize(caller, passphrase)?;

        self.atomically(|| self.commit(caller, new_hash))?;
        self.state_mut().disable_two_factor();

        info!(account = %self.address, "2fa disabled");
        Ok(())
    }

    pub fn reset_passphrase(
        &self,
        caller: &Caller,
        passphrase: &EncodedPassphrase,
        new_hash: PassphraseHash,
    ) -> Result<()> {
        let _call = self.in_call.enter(&self.address)?;
        self.authorize(caller, passphrase)?;

        self.atomically(|| self.commit(caller, new_hash))?;

        info!(account = %self.address, "passphrase reset");
        Ok(())
    }

    // --- Reconciliation ---

    /// Bring the recorded balance of `token` in line with the token contract.
    ///
    /// Returns the observed change, or `None` when nothing moved.
    pub fn update_account(&self, token: &Address) -> Result<Option<BalanceChange>> {
        let _call = self.in_call.enter(&self.address)?;
        self.reconcile(token)
    }

    fn reconcile(&self, token: &Address) -> Result<Option<BalanceChange>> {
        let actual = self.host.token(token)?.balance_of(&self.address);

        let previous = {
            let mut state = self.state_mut();
            if state.snapshot(token) == actual {
                return Ok(None);
            }
            state.record(*token, actual)
        };

        let (direction, delta) = if actual > previous {
            (Direction::Deposit, actual - previous)
        } else {
            (Direction::Withdraw, previous - actual)
        };
        let change = BalanceChange {
            token: *token,
            account: self.address,
            direction,
            delta,
            balance: actual,
        };

        info!(account = %self.address, token = %token, ?direction, delta, balance = actual, "balance reconciled");
        self.hub.publish(&change);
        Ok(Some(change))
    }
}
