//! Account registry
//!
//! Issues dispatcher accounts, indexes them by creator and fans reconciled
//! designated-token movements out to registered observers.

use crate::authority::SharedAuthority;
use crate::dispatcher::{DispatcherAccount, ExcludedTargets};
use crate::error::{CustodyError, Result};
use crate::events::{BalanceChange, Event, ObserverHub, TokenObserver};
use crate::host::Host;
use crate::passphrase::PassphraseHash;
use crate::types::{Address, Caller};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tracing::info;

#[derive(Default)]
struct Accounts {
    /// Creation order
    all: Vec<Arc<DispatcherAccount>>,
    by_address: HashMap<Address, usize>,
    by_creator: HashMap<Address, Vec<usize>>,
}

pub struct AccountRegistry {
    owner: Address,
    address: Address,
    authority: Arc<SharedAuthority>,
    host: Arc<Host>,
    hub: Arc<ObserverHub>,
    security_token: Address,
    utility_token: Address,
    extra_excluded: Vec<Address>,
    accounts: RwLock<Accounts>,
}

impl AccountRegistry {
    pub fn new(
        owner: Address,
        authority: Arc<SharedAuthority>,
        host: Arc<Host>,
        security_token: Address,
        utility_token: Address,
        extra_excluded: impl IntoIterator<Item = Address>,
    ) -> Self {
        let address = Address::derive("registry", &owner, 0);
        let hub = Arc::new(ObserverHub::new(
            address,
            [security_token, utility_token],
            host.events().clone(),
        ));

        Self {
            owner,
            address,
            authority,
            host,
            hub,
            security_token,
            utility_token,
            extra_excluded: extra_excluded.into_iter().collect(),
            accounts: RwLock::new(Accounts::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Accounts> {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority(&self) -> &Arc<SharedAuthority> {
        &self.authority
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn security_token(&self) -> Address {
        self.security_token
    }

    pub fn utility_token(&self) -> Address {
        self.utility_token
    }

    /// Issue a new dispatcher account owned by the holder of the passphrase
    /// behind `passphrase_hash`, recorded under the caller
    pub fn create_account(&self, caller: &Caller, passphrase_hash: PassphraseHash) -> Result<Arc<DispatcherAccount>> {
        let account = {
            let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
            let index = accounts.all.len();
            let address = Address::derive("dispatcher", &self.address, index as u64);

            let excluded = ExcludedTargets::new(
                address,
                self.security_token,
                self.utility_token,
                self.extra_excluded.iter().copied(),
            );
            let account = Arc::new(DispatcherAccount::new(
                address,
                passphrase_hash,
                self.authority.clone(),
                self.host.clone(),
                self.hub.clone(),
                excluded,
            ));

            accounts.all.push(account.clone());
            accounts.by_address.insert(address, index);
            accounts.by_creator.entry(caller.address).or_default().push(index);
            account
        };

        self.host.events().emit(Event::AccountCreated {
            account: account.address(),
        });
        info!(account = %account.address(), creator = %caller.address, "account created");
        Ok(account)
    }

    /// Reconcile `token` on `account`; observers hear about designated tokens
    pub fn update_account(&self, account: &Address, token: &Address) -> Result<Option<BalanceChange>> {
        self.get_account(account)
            .ok_or(CustodyError::UnknownAccount(*account))?
            .update_account(token)
    }

    pub fn register_observer(&self, caller: &Caller, observer: Arc<dyn TokenObserver>) -> Result<()> {
        if caller.address != self.owner {
            return Err(CustodyError::Unauthorized(caller.address));
        }
        self.hub.register(observer);
        info!(observers = self.hub.observer_count(), "observer registered");
        Ok(())
    }

    pub fn observer_count(&self) -> usize {
        self.hub.observer_count()
    }

    pub fn get_account_count(&self) -> usize {
        self.read().all.len()
    }

    pub fn get_account(&self, address: &Address) -> Option<Arc<DispatcherAccount>> {
        let accounts = self.read();
        accounts
            .by_address
            .get(address)
            .map(|&index| accounts.all[index].clone())
    }

    /// Accounts created by `creator`, oldest first
    pub fn accounts_of(&self, creator: &Address) -> Vec<Arc<DispatcherAccount>> {
        let accounts = self.read();
        accounts
            .by_creator
            .get(creator)
            .map(|indices| indices.iter().map(|&i| accounts.all[i].clone()).collect())
            .unwrap_or_default()
    }

    pub fn accounts(&self) -> Vec<Arc<DispatcherAccount>> {
        self.read().all.clone()
    }
}
