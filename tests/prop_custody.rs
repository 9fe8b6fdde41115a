// Property-based checks for the fee engine and the lock lease

mod common;

use common::setup;
use compass_custody::authority::fees::withdraw_fee;
use compass_custody::authority::Node;
use compass_custody::{Address, Amount, Caller, CustodyError};
use num_bigint::BigUint;
use proptest::prelude::*;

fn reference_fee(amount: Amount, percentage: u128, denominator: u128, numerator: u128, node_denominator: u128) -> BigUint {
    BigUint::from(amount) * percentage / denominator * numerator / node_denominator
}

proptest! {
    #[test]
    fn fee_matches_left_to_right_formula(
        amount in 0u128..=1_000_000_000_000_000_000_000_000u128,
        percentage in 0u128..=10_000,
        precision in 0u32..=8,
        numerator in 0u128..=1_000,
        node_denominator in 1u128..=1_000,
    ) {
        let denominator = 10u128.pow(precision);
        let fee = withdraw_fee(amount, percentage, denominator, numerator, node_denominator, true);

        prop_assert_eq!(
            BigUint::from(fee),
            reference_fee(amount, percentage, denominator, numerator, node_denominator)
        );
        prop_assert_eq!(withdraw_fee(amount, percentage, denominator, numerator, node_denominator, false), 0);
    }

    #[test]
    fn fee_never_exceeds_amount_without_markup(
        amount in any::<u64>(),
        percentage in 0u128..=10_000,
        numerator in 0u128..=100,
    ) {
        // At most 100% base fee and a multiplier of at most 1
        let fee = withdraw_fee(amount as Amount, percentage, 10_000, numerator, 100, true);
        prop_assert!(fee <= amount as Amount);
    }

    #[test]
    fn authority_fee_uses_configured_node(
        amount in 0u128..=1_000_000_000_000_000_000_000u128,
        numerator in 0u128..=500,
        node_denominator in 1u128..=500,
    ) {
        let env = setup();
        env.authority
            .update_node(&env.owner, Node::new(env.node.address, true, 1, numerator, node_denominator))
            .unwrap();

        let fee = env.authority.calculate_withdraw_fee(&env.node.address, amount, true);
        prop_assert_eq!(BigUint::from(fee), reference_fee(amount, 100, 10_000, numerator, node_denominator));
    }

    #[test]
    fn at_most_one_active_lock(
        steps in proptest::collection::vec((0usize..3, 0u64..400), 1..40),
    ) {
        let env = setup();
        let account = Address::from_label("account");
        let stake = env.authority.lock_stake();
        let lockers: Vec<Caller> = ["alice", "bob", "carol"]
            .iter()
            .map(|name| {
                let address = Address::from_label(name);
                env.ledger.mint(&address, 1_000 * stake).unwrap();
                Caller::with_value(address, stake)
            })
            .collect();

        let mut holder: Option<(Address, u64)> = None;
        for (who, wait) in steps {
            env.clock.advance(wait);
            let now = env.host.now();
            let caller = &lockers[who];

            let active = holder.filter(|(_, expiry)| now <= *expiry);
            match env.authority.lock(caller, &account) {
                Ok(record) => {
                    prop_assert!(active.is_none());
                    holder = Some((caller.address, record.expiry));
                }
                Err(CustodyError::AlreadyLocked(_)) => prop_assert!(active.is_some()),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }

            prop_assert!(env.authority.active_lock_count() <= 1);
            prop_assert_eq!(env.authority.get_lock(&account).map(|r| r.holder), holder.filter(|(_, e)| now <= *e).map(|(h, _)| h));
        }

        // Stake is only ever held for the last lock
        let held = holder.map(|_| stake).unwrap_or(0);
        prop_assert_eq!(env.authority.escrowed_stake(), held);
    }
}
