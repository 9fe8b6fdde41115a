//! Audit events and token balance observers

use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// Events emitted for audit and indexing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    AccountCreated {
        account: Address,
    },
    Charged {
        account: Address,
        node: Address,
        fee: Amount,
    },
    LoggedDeposit {
        repository: Address,
        token: Address,
        to: Address,
        value: Amount,
    },
    LoggedWithdraw {
        repository: Address,
        token: Address,
        from: Address,
        value: Amount,
    },
}

/// Append-only, in-order event sink
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        debug!(?event, "event emitted");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything logged so far
    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop everything logged after the first `len` events
    pub(crate) fn truncate(&self, len: usize) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(len);
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Deposit,
    Withdraw,
}

/// Reconciled balance change of one token on one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub token: Address,
    pub account: Address,
    pub direction: Direction,
    pub delta: Amount,
    pub balance: Amount,
}

/// Observer of designated-token movements.
///
/// Called synchronously inside the operation that reconciled the change.
/// Observers are trusted: they cannot veto the update.
pub trait TokenObserver: Send + Sync {
    fn notify(&self, repository: &Address, change: &BalanceChange);
}

/// Fan-out of reconciled changes for the designated tokens
pub struct ObserverHub {
    repository: Address,
    tracked: HashSet<Address>,
    observers: RwLock<Vec<Arc<dyn TokenObserver>>>,
    events: Arc<EventLog>,
}

impl ObserverHub {
    pub fn new(repository: Address, tracked: impl IntoIterator<Item = Address>, events: Arc<EventLog>) -> Self {
        Self {
            repository,
            tracked: tracked.into_iter().collect(),
            observers: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn repository(&self) -> Address {
        self.repository
    }

    pub fn is_tracked(&self, token: &Address) -> bool {
        self.tracked.contains(token)
    }

    pub fn register(&self, observer: Arc<dyn TokenObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Log the change and, for designated tokens, notify every observer
    pub fn publish(&self, change: &BalanceChange) {
        let event = match change.direction {
            Direction::Deposit => Event::LoggedDeposit {
                repository: self.repository,
                token: change.token,
                to: change.account,
                value: change.delta,
            },
            Direction::Withdraw => Event::LoggedWithdraw {
                repository: self.repository,
                token: change.token,
                from: change.account,
                value: change.delta,
            },
        };
        self.events.emit(event);

        if !self.is_tracked(&change.token) {
            return;
        }

        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner).clone();
        for observer in observers {
            observer.notify(&self.repository, change);
        }
    }
}
