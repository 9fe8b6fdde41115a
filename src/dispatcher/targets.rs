//! Addresses a dispatcher may never proxy-call

use crate::types::Address;
use std::collections::HashSet;

/// Deny-list fixed when the account is created: the account itself, the
/// designated tokens and any additional shims the registry was built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedTargets {
    targets: HashSet<Address>,
}

impl ExcludedTargets {
    pub fn new(
        account: Address,
        security_token: Address,
        utility_token: Address,
        extra: impl IntoIterator<Item = Address>,
    ) -> Self {
        let mut targets: HashSet<Address> = extra.into_iter().collect();
        targets.insert(account);
        targets.insert(security_token);
        targets.insert(utility_token);
        Self { targets }
    }

    pub fn contains(&self, target: &Address) -> bool {
        self.targets.contains(target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Sorted for stable output
    pub fn to_vec(&self) -> Vec<Address> {
        let mut targets: Vec<Address> = self.targets.iter().copied().collect();
        targets.sort();
        targets
    }
}
