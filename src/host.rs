//! Execution substrate the custody core runs inside
//!
//! Provides what the state machine needs from its environment: a native
//! currency ledger, a monotonic clock, token contracts, proxy call targets
//! and an event sink. Calls are assumed to run serially.
//!
//! State that lives outside the ledger joins a failed call's rollback by
//! recording an undo entry with [`Host::on_revert`] before it mutates.

use crate::clock::Clock;
use crate::error::{CustodyError, Result};
use crate::events::EventLog;
use crate::ledger::Ledger;
use crate::token::TokenContract;
use crate::types::{Address, Amount, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Contract reachable through a dispatcher's proxy `execute`
pub trait ProxyTarget: Send + Sync {
    /// Handle a forwarded call. `value` has already been credited to the
    /// target's ledger address; returning `Err` undoes the whole call.
    fn call(&self, sender: &Address, value: Amount, data: &[u8]) -> std::result::Result<Vec<u8>, String>;
}

type Undo = Box<dyn FnOnce() + Send>;

/// Undo entries of the open transactions, innermost last
#[derive(Default)]
struct Journal {
    depth: usize,
    undo: Vec<Undo>,
}

pub struct Host {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
    tokens: RwLock<HashMap<Address, Arc<dyn TokenContract>>>,
    targets: RwLock<HashMap<Address, Arc<dyn ProxyTarget>>>,
    journal: Mutex<Journal>,
}

impl Host {
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            events: Arc::new(EventLog::new()),
            tokens: RwLock::new(HashMap::new()),
            targets: RwLock::new(HashMap::new()),
            journal: Mutex::new(Journal::default()),
        }
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` as one unit. On `Err` the ledger and event log are restored
    /// and undo entries recorded since `f` started run newest first.
    /// Transactions nest; an inner success is only final once the
    /// outermost transaction succeeds.
    pub fn transaction<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let checkpoint = self.ledger.checkpoint();
        let logged = self.events.len();
        let mark = {
            let mut journal = self.journal();
            journal.depth += 1;
            journal.undo.len()
        };

        let result = f();

        let undo = {
            let mut journal = self.journal();
            journal.depth -= 1;
            if result.is_err() {
                journal.undo.split_off(mark)
            } else {
                if journal.depth == 0 {
                    journal.undo.clear();
                }
                Vec::new()
            }
        };

        if result.is_err() {
            for entry in undo.into_iter().rev() {
                entry();
            }
            self.ledger.rollback(checkpoint);
            self.events.truncate(logged);
        }
        result
    }

    pub fn in_transaction(&self) -> bool {
        self.journal().depth > 0
    }

    /// Register `undo` to run if the enclosing transaction fails.
    /// Ignored outside a transaction.
    pub fn on_revert(&self, undo: impl FnOnce() + Send + 'static) {
        let mut journal = self.journal();
        if journal.depth > 0 {
            journal.undo.push(Box::new(undo));
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn register_token(&self, token: Arc<dyn TokenContract>) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.address(), token);
    }

    pub fn token(&self, address: &Address) -> Result<Arc<dyn TokenContract>> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or(CustodyError::UnknownToken(*address))
    }

    pub fn register_target(&self, address: Address, target: Arc<dyn ProxyTarget>) {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, target);
    }

    /// Registered target at `address`; `None` means a plain value recipient
    pub fn target(&self, address: &Address) -> Option<Arc<dyn ProxyTarget>> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}
