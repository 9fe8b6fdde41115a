//! Time-bounded exclusive authorization over dispatcher accounts

use crate::types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lease over one account, held by a node or by a staking caller
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockRecord {
    pub holder: Address,
    pub is_node: bool,
    pub stake: Amount,
    pub expiry: Timestamp,
}

impl LockRecord {
    /// Active while `now <= expiry`
    pub fn is_active(&self, now: Timestamp) -> bool {
        now <= self.expiry
    }
}

/// At most one record per account. Expiry is evaluated lazily: an expired
/// record stays stored until it is replaced, reclaimed or consumed, but is
/// never reported as a lock.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LockTable {
    locks: HashMap<Address, LockRecord>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self, account: &Address, now: Timestamp) -> Option<LockRecord> {
        self.locks
            .get(account)
            .filter(|record| record.is_active(now))
            .copied()
    }

    /// Stored record, active or not
    pub fn stored(&self, account: &Address) -> Option<LockRecord> {
        self.locks.get(account).copied()
    }

    /// Store a new record, returning the replaced (expired) one.
    /// Callers check exclusivity first.
    pub fn insert(&mut self, account: Address, record: LockRecord) -> Option<LockRecord> {
        self.locks.insert(account, record)
    }

    pub fn remove(&mut self, account: &Address) -> Option<LockRecord> {
        self.locks.remove(account)
    }

    /// Number of active locks
    pub fn active_count(&self, now: Timestamp) -> usize {
        self.locks.values().filter(|r| r.is_active(now)).count()
    }
}
