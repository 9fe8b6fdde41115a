//! Shared authority consulted by every dispatcher account
//!
//! This module owns the state that spans accounts:
//! - Trusted node whitelist
//! - Lock table (one lease per account) and the stake escrow backing it
//! - Withdrawal minimums and fee parameters

pub mod fees;
pub mod lock;
pub mod node;

pub use fees::FeeConfig;
pub use lock::{LockRecord, LockTable};
pub use node::{Node, NodeRegistry};

use crate::error::{CustodyError, Result};
use crate::host::Host;
use crate::types::{Address, Amount, Caller};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Construction parameters for the shared authority
#[derive(Debug, Clone)]
pub struct AuthorityParams {
    pub lock_stake: Amount,
    /// Seconds a lock stays active
    pub lock_duration: u64,
    pub fees: FeeConfig,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
struct AuthorityState {
    nodes: NodeRegistry,
    locks: LockTable,
    fees: FeeConfig,
    lock_stake: Amount,
    lock_duration: u64,
    escrowed: Amount,
}

pub struct SharedAuthority {
    owner: Address,
    /// Ledger address holding escrowed stake
    address: Address,
    host: Arc<Host>,
    state: Arc<RwLock<AuthorityState>>,
}

impl SharedAuthority {
    pub fn new(owner: Address, params: AuthorityParams, host: Arc<Host>) -> Result<Self> {
        let mut nodes = NodeRegistry::new();
        for node in params.nodes {
            nodes.add(node)?;
        }

        Ok(Self {
            owner,
            address: Address::derive("authority", &owner, 0),
            host,
            state: Arc::new(RwLock::new(AuthorityState {
                nodes,
                locks: LockTable::new(),
                fees: params.fees,
                lock_stake: params.lock_stake,
                lock_duration: params.lock_duration,
                escrowed: 0,
            })),
        })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthorityState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access; inside a host transaction the prior state is journaled
    fn write(&self) -> RwLockWriteGuard<'_, AuthorityState> {
        let state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if self.host.in_transaction() {
            let cell = self.state.clone();
            let before = state.clone();
            self.host.on_revert(move || {
                *cell.write().unwrap_or_else(PoisonError::into_inner) = before;
            });
        }
        state
    }

    fn ensure_owner(&self, caller: &Caller) -> Result<()> {
        if caller.address != self.owner {
            return Err(CustodyError::Unauthorized(caller.address));
        }
        Ok(())
    }

    // --- Nodes ---

    pub fn add_node(&self, caller: &Caller, node: Node) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().nodes.add(node)?;
        info!(node = %node.address, enabled = node.enabled, "node added");
        Ok(())
    }

    pub fn update_node(&self, caller: &Caller, node: Node) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().nodes.update(node)?;
        info!(
            node = %node.address,
            enabled = node.enabled,
            gas_allowance = node.gas_allowance,
            numerator = node.fee_numerator,
            denominator = node.fee_denominator,
            "node updated"
        );
        Ok(())
    }

    pub fn get_node(&self, address: &Address) -> Option<Node> {
        self.read().nodes.get(address).copied()
    }

    pub fn is_node(&self, address: &Address) -> bool {
        self.read().nodes.is_node(address)
    }

    // --- Locks ---

    /// Acquire the lock on `account` for the caller.
    ///
    /// Enabled nodes lock without stake. Everyone else attaches at least
    /// `lock_stake`, which moves into escrow until the lock is consumed,
    /// replaced after expiry or reclaimed.
    pub fn lock(&self, caller: &Caller, account: &Address) -> Result<LockRecord> {
        let mut state = self.write();
        let now = self.host.now();

        if state.locks.active(account, now).is_some() {
            return Err(CustodyError::AlreadyLocked(*account));
        }

        let is_node = state.nodes.is_node(&caller.address);
        let stake = if is_node {
            0
        } else {
            if caller.value < state.lock_stake {
                return Err(CustodyError::InsufficientStake {
                    offered: caller.value,
                    required: state.lock_stake,
                });
            }
            caller.value
        };

        // Only an expired record can still be stored here
        let replaced = state.locks.stored(account);
        let refund = replaced.map(|r| r.stake).unwrap_or(0);
        let ledger = self.host.ledger();
        self.host.transaction(|| {
            if let Some(expired) = replaced {
                debug!(account = %account, holder = %expired.holder, "replacing expired lock");
                ledger.transfer(&self.address, &expired.holder, expired.stake)?;
            }
            ledger.transfer(&caller.address, &self.address, stake)
        })?;

        let record = LockRecord {
            holder: caller.address,
            is_node,
            stake,
            expiry: now.saturating_add(state.lock_duration),
        };
        state.escrowed = state.escrowed - refund + stake;
        state.locks.insert(*account, record);

        info!(account = %account, holder = %caller.address, is_node, stake, expiry = record.expiry, "lock acquired");
        Ok(record)
    }

    pub fn is_locked(&self, account: &Address) -> bool {
        self.get_lock(account).is_some()
    }

    /// Current active lock; `None` when unlocked or expired
    pub fn get_lock(&self, account: &Address) -> Option<LockRecord> {
        self.read().locks.active(account, self.host.now())
    }

    /// Consume the active lock held by `holder`, refunding its stake.
    /// Returns `None` when `holder` holds no active lock on `account`.
    pub(crate) fn consume_lock(&self, account: &Address, holder: &Address) -> Result<Option<LockRecord>> {
        let mut state = self.write();
        let now = self.host.now();

        let record = match state.locks.active(account, now) {
            Some(record) if record.holder == *holder => record,
            _ => return Ok(None),
        };

        self.release_stake(&mut state, &record)?;
        state.locks.remove(account);

        info!(account = %account, holder = %holder, "lock consumed");
        Ok(Some(record))
    }

    /// Return the stake of an expired lock to its holder
    pub fn reclaim_stake(&self, caller: &Caller, account: &Address) -> Result<Amount> {
        let mut state = self.write();
        let now = self.host.now();

        let record = state
            .locks
            .stored(account)
            .ok_or(CustodyError::NothingToReclaim(*account))?;
        if record.is_active(now) {
            return Err(CustodyError::AlreadyLocked(*account));
        }
        if record.holder != caller.address {
            return Err(CustodyError::WrongHolder {
                holder: record.holder,
                caller: caller.address,
            });
        }
        if record.stake == 0 {
            return Err(CustodyError::NothingToReclaim(*account));
        }

        self.release_stake(&mut state, &record)?;
        state.locks.remove(account);

        info!(account = %account, holder = %caller.address, stake = record.stake, "expired stake reclaimed");
        Ok(record.stake)
    }

    fn release_stake(&self, state: &mut AuthorityState, record: &LockRecord) -> Result<()> {
        if record.stake == 0 {
            return Ok(());
        }
        self.host
            .ledger()
            .transfer(&self.address, &record.holder, record.stake)?;
        state.escrowed -= record.stake;
        Ok(())
    }

    /// Total stake currently held in escrow
    pub fn escrowed_stake(&self) -> Amount {
        self.read().escrowed
    }

    pub fn active_lock_count(&self) -> usize {
        self.read().locks.active_count(self.host.now())
    }

    pub fn lock_stake(&self) -> Amount {
        self.read().lock_stake
    }

    pub fn lock_duration(&self) -> u64 {
        self.read().lock_duration
    }

    pub fn set_lock_stake(&self, caller: &Caller, stake: Amount) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().lock_stake = stake;
        info!(stake, "lock stake updated");
        Ok(())
    }

    pub fn set_lock_duration(&self, caller: &Caller, duration: u64) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().lock_duration = duration;
        info!(duration, "lock duration updated");
        Ok(())
    }

    // --- Fees ---

    pub fn calculate_withdraw_fee(&self, node: &Address, amount: Amount, charge_fee: bool) -> Amount {
        let state = self.read();
        fees::node_withdraw_fee(&state.fees, state.nodes.get(node), amount, charge_fee)
    }

    /// Flat fee a node charges per proxy execution
    pub fn calculate_execute_fee(&self, node: &Address) -> Amount {
        let state = self.read();
        state
            .nodes
            .get(node)
            .map(|n| fees::execute_fee(state.fees.execution_base_fee, n))
            .unwrap_or(0)
    }

    pub fn withdraw_fee(&self) -> (u128, u128) {
        let state = self.read();
        (state.fees.withdraw_fee_percentage, state.fees.denominator)
    }

    pub fn set_withdraw_fee(&self, caller: &Caller, percentage: u128, denominator: u128) -> Result<()> {
        self.ensure_owner(caller)?;
        let mut state = self.write();
        state.fees.withdraw_fee_percentage = percentage;
        state.fees.denominator = denominator;
        info!(percentage, denominator, "withdraw fee updated");
        Ok(())
    }

    pub fn execution_base_fee(&self) -> Amount {
        self.read().fees.execution_base_fee
    }

    pub fn set_execution_base_fee(&self, caller: &Caller, fee: Amount) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().fees.execution_base_fee = fee;
        info!(fee, "execution base fee updated");
        Ok(())
    }

    pub fn min_ether_withdraw_amount(&self) -> Amount {
        self.read().fees.min_native_withdraw
    }

    pub fn set_min_ether_withdraw_amount(&self, caller: &Caller, amount: Amount) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().fees.min_native_withdraw = amount;
        info!(amount, "min native withdraw updated");
        Ok(())
    }

    pub fn min_token_withdraw_amount(&self, token: &Address) -> Amount {
        self.read().fees.min_token_withdraw(token)
    }

    pub fn set_min_token_withdraw_amount(&self, caller: &Caller, token: Address, amount: Amount) -> Result<()> {
        self.ensure_owner(caller)?;
        self.write().fees.min_token_withdraw.insert(token, amount);
        info!(token = %token, amount, "min token withdraw updated");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::{Asset, Ledger};
    use std::collections::HashMap;

    pub(crate) const STAKE: Amount = 100_000_000_000_000_000;
    pub(crate) const DURATION: u64 = 600;

    pub(crate) fn test_params() -> AuthorityParams {
        AuthorityParams {
            lock_stake: STAKE,
            lock_duration: DURATION,
            fees: FeeConfig {
                withdraw_fee_percentage: 100,
                denominator: 10_000,
                min_native_withdraw: 1_000_000_000_000_000,
                default_min_token_withdraw: 1_000_000_000,
                min_token_withdraw: HashMap::new(),
                execution_base_fee: 1_000_000_000_000,
            },
            nodes: vec![],
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        ledger: Arc<Ledger>,
        authority: SharedAuthority,
        owner: Caller,
        node: Address,
        account: Address,
    }

    fn setup() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = Arc::new(Ledger::new());
        let host = Arc::new(Host::new(ledger.clone(), clock.clone()));
        let owner = Caller::new(Address::from_label("owner"));
        let authority = SharedAuthority::new(owner.address, test_params(), host).unwrap();
        let node = Address::from_label("node");
        authority.add_node(&owner, Node::new(node, true, 0, 1, 1)).unwrap();

        for who in ["alice", "bob"] {
            ledger.mint(&Address::from_label(who), 10 * STAKE).unwrap();
        }

        Fixture {
            clock,
            ledger,
            authority,
            owner,
            node,
            account: Address::from_label("account"),
        }
    }

    fn staker(label: &str, value: Amount) -> Caller {
        Caller::with_value(Address::from_label(label), value)
    }

    #[test]
    fn test_lock_with_stake() {
        let f = setup();
        let alice = staker("alice", STAKE);

        let record = f.authority.lock(&alice, &f.account).unwrap();

        assert!(f.authority.is_locked(&f.account));
        assert_eq!(record.holder, alice.address);
        assert!(!record.is_node);
        assert_eq!(record.stake, STAKE);
        assert_eq!(record.expiry, 1_000_000 + DURATION);
        assert_eq!(f.authority.get_lock(&f.account), Some(record));
        assert_eq!(f.authority.escrowed_stake(), STAKE);
        assert_eq!(f.ledger.balance(&alice.address), 9 * STAKE);
        assert_eq!(f.ledger.balance(&f.authority.address()), STAKE);
    }

    #[test]
    fn test_node_locks_without_stake() {
        let f = setup();
        let record = f.authority.lock(&Caller::new(f.node), &f.account).unwrap();

        assert!(record.is_node);
        assert_eq!(record.stake, 0);
        assert_eq!(f.authority.escrowed_stake(), 0);
    }

    #[test]
    fn test_insufficient_stake() {
        let f = setup();
        let result = f.authority.lock(&staker("alice", STAKE - 1), &f.account);

        assert_eq!(
            result,
            Err(CustodyError::InsufficientStake {
                offered: STAKE - 1,
                required: STAKE
            })
        );
        assert!(!f.authority.is_locked(&f.account));
        assert_eq!(f.ledger.balance(&Address::from_label("alice")), 10 * STAKE);
    }

    #[test]
    fn test_stake_must_be_funded() {
        let f = setup();
        let broke = staker("carol", STAKE);
        let result = f.authority.lock(&broke, &f.account);

        assert!(matches!(result, Err(CustodyError::InsufficientFunds { .. })));
        assert!(!f.authority.is_locked(&f.account));
    }

    #[test]
    fn test_cannot_lock_locked_account() {
        let f = setup();
        f.authority.lock(&staker("alice", STAKE), &f.account).unwrap();

        assert_eq!(
            f.authority.lock(&staker("bob", 5 * STAKE), &f.account),
            Err(CustodyError::AlreadyLocked(f.account))
        );
        assert_eq!(
            f.authority.lock(&Caller::new(f.node), &f.account),
            Err(CustodyError::AlreadyLocked(f.account))
        );
        // Bob's stake was never taken
        assert_eq!(f.ledger.balance(&Address::from_label("bob")), 10 * STAKE);
    }

    #[test]
    fn test_lock_expires() {
        let f = setup();
        f.authority.lock(&staker("alice", STAKE), &f.account).unwrap();

        f.clock.advance(DURATION);
        assert!(f.authority.is_locked(&f.account));

        f.clock.advance(1);
        assert!(!f.authority.is_locked(&f.account));
        assert_eq!(f.authority.get_lock(&f.account), None);
    }

    #[test]
    fn test_expired_lock_is_replaced_and_stake_refunded() {
        let f = setup();
        let alice = staker("alice", STAKE);
        f.authority.lock(&alice, &f.account).unwrap();
        f.clock.advance(DURATION + 1);

        let record = f.authority.lock(&Caller::new(f.node), &f.account).unwrap();

        assert_eq!(record.holder, f.node);
        assert_eq!(f.ledger.balance(&alice.address), 10 * STAKE);
        assert_eq!(f.authority.escrowed_stake(), 0);
    }

    #[test]
    fn test_failed_refund_leaves_lock_table_untouched() {
        let f = setup();
        let alice = staker("alice", STAKE);
        let bob = staker("bob", STAKE);
        f.authority.lock(&alice, &f.account).unwrap();
        f.ledger.set_balance(&f.authority.address(), Asset::Native, 0);
        f.clock.advance(DURATION + 1);

        assert!(matches!(
            f.authority.lock(&bob, &f.account),
            Err(CustodyError::InsufficientFunds { .. })
        ));
        assert_eq!(f.ledger.balance(&bob.address), 10 * STAKE);
        assert_eq!(f.ledger.balance(&alice.address), 9 * STAKE);
        assert_eq!(f.authority.escrowed_stake(), STAKE);
        assert!(!f.authority.is_locked(&f.account));
        assert!(matches!(
            f.authority.reclaim_stake(&alice, &f.account),
            Err(CustodyError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_replacing_expired_lock_keeps_escrow_balanced() {
        let f = setup();
        f.authority.lock(&staker("alice", STAKE), &f.account).unwrap();
        f.clock.advance(DURATION + 1);

        f.authority.lock(&staker("bob", 2 * STAKE), &f.account).unwrap();

        assert_eq!(f.authority.escrowed_stake(), 2 * STAKE);
        assert_eq!(f.ledger.balance(&f.authority.address()), 2 * STAKE);
        assert_eq!(f.ledger.balance(&Address::from_label("alice")), 10 * STAKE);
    }

    #[test]
    fn test_consume_lock_refunds_holder_only() {
        let f = setup();
        let alice = staker("alice", STAKE);
        f.authority.lock(&alice, &f.account).unwrap();

        let bob = Address::from_label("bob");
        assert_eq!(f.authority.consume_lock(&f.account, &bob).unwrap(), None);
        assert!(f.authority.is_locked(&f.account));

        let consumed = f.authority.consume_lock(&f.account, &alice.address).unwrap();
        assert_eq!(consumed.map(|r| r.holder), Some(alice.address));
        assert!(!f.authority.is_locked(&f.account));
        assert_eq!(f.ledger.balance(&alice.address), 10 * STAKE);
    }

    #[test]
    fn test_reclaim_stake_after_expiry() {
        let f = setup();
        let alice = staker("alice", STAKE);
        f.authority.lock(&alice, &f.account).unwrap();

        assert_eq!(
            f.authority.reclaim_stake(&alice, &f.account),
            Err(CustodyError::AlreadyLocked(f.account))
        );

        f.clock.advance(DURATION + 1);
        assert!(matches!(
            f.authority.reclaim_stake(&staker("bob", 0), &f.account),
            Err(CustodyError::WrongHolder { .. })
        ));
        assert_eq!(f.authority.reclaim_stake(&alice, &f.account), Ok(STAKE));
        assert_eq!(f.ledger.balance(&alice.address), 10 * STAKE);
        assert_eq!(
            f.authority.reclaim_stake(&alice, &f.account),
            Err(CustodyError::NothingToReclaim(f.account))
        );
    }

    #[test]
    fn test_disabled_node_needs_stake() {
        let f = setup();
        f.authority
            .update_node(&f.owner, Node::new(f.node, false, 0, 1, 1))
            .unwrap();

        assert!(matches!(
            f.authority.lock(&Caller::new(f.node), &f.account),
            Err(CustodyError::InsufficientStake { .. })
        ));
    }

    #[test]
    fn test_privileged_setters() {
        let f = setup();
        let stranger = Caller::new(Address::from_label("stranger"));
        let token = Address::from_label("token");

        assert_eq!(
            f.authority.set_min_ether_withdraw_amount(&stranger, 1),
            Err(CustodyError::Unauthorized(stranger.address))
        );
        assert!(f.authority.set_min_token_withdraw_amount(&stranger, token, 1).is_err());
        assert!(f.authority.set_withdraw_fee(&stranger, 1, 1).is_err());
        assert!(f.authority.set_lock_stake(&stranger, 1).is_err());
        assert!(f
            .authority
            .add_node(&stranger, Node::new(stranger.address, true, 0, 1, 1))
            .is_err());
        assert!(!f.authority.is_node(&stranger.address));

        f.authority.set_min_ether_withdraw_amount(&f.owner, 2).unwrap();
        f.authority.set_min_token_withdraw_amount(&f.owner, token, 3).unwrap();
        f.authority.set_withdraw_fee(&f.owner, 250, 10_000).unwrap();
        f.authority.set_lock_duration(&f.owner, 60).unwrap();

        assert_eq!(f.authority.min_ether_withdraw_amount(), 2);
        assert_eq!(f.authority.min_token_withdraw_amount(&token), 3);
        assert_eq!(f.authority.withdraw_fee(), (250, 10_000));
        assert_eq!(f.authority.lock_duration(), 60);
    }

    #[test]
    fn test_fee_calculation_uses_node_multiplier() {
        let f = setup();
        let amount = 1_000_000_000_000_000_000;

        assert_eq!(f.authority.calculate_withdraw_fee(&f.node, amount, true), amount / 100);
        assert_eq!(f.authority.calculate_withdraw_fee(&f.node, amount, false), 0);
        // Not a node: no multiplier, no fee
        assert_eq!(
            f.authority
                .calculate_withdraw_fee(&Address::from_label("alice"), amount, true),
            0
        );

        f.authority
            .update_node(&f.owner, Node::new(f.node, true, 2, 120, 100))
            .unwrap();
        assert_eq!(
            f.authority.calculate_withdraw_fee(&f.node, amount, true),
            amount / 100 * 120 / 100
        );
        assert_eq!(f.authority.calculate_execute_fee(&f.node), 2 * 1_000_000_000_000 * 120 / 100);
    }
}
