#![allow(dead_code)]

use compass_custody::authority::Node;
use compass_custody::clock::ManualClock;
use compass_custody::config::CustodyConfig;
use compass_custody::host::Host;
use compass_custody::ledger::Ledger;
use compass_custody::passphrase::{EncodedPassphrase, PassphraseHash};
use compass_custody::token::LedgerToken;
use compass_custody::{AccountRegistry, Address, Amount, Caller, DispatcherAccount, SharedAuthority};
use std::sync::Arc;

pub const ETHER: Amount = 1_000_000_000_000_000_000;
pub const FINNEY: Amount = 1_000_000_000_000_000;

pub struct Env {
    pub config: CustodyConfig,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<Ledger>,
    pub host: Arc<Host>,
    pub authority: Arc<SharedAuthority>,
    pub registry: AccountRegistry,
    pub security: Arc<LedgerToken>,
    pub utility: Arc<LedgerToken>,
    pub owner: Caller,
    pub node: Caller,
    pub user: Caller,
}

pub fn pass(n: u32) -> EncodedPassphrase {
    EncodedPassphrase::from_text(&format!("@@@ passphrase {} @@@", n)).unwrap()
}

pub fn hash(n: u32) -> PassphraseHash {
    pass(n).hash()
}

pub fn setup() -> Env {
    let config = CustodyConfig::default();
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let ledger = Arc::new(Ledger::new());
    let host = Arc::new(Host::new(ledger.clone(), clock.clone()));

    let security = Arc::new(LedgerToken::new(config.tokens.security, "DRPS", 8, ledger.clone()));
    let utility = Arc::new(LedgerToken::new(config.tokens.utility, "DRPU", 8, ledger.clone()));
    host.register_token(security.clone());
    host.register_token(utility.clone());

    let owner = Caller::new(Address::from_label("owner"));
    let (authority, registry) = config.build(owner.address, host.clone()).unwrap();

    let node = Caller::new(Address::from_label("node"));
    authority
        .add_node(&owner, Node::new(node.address, true, 1, 1, 1))
        .unwrap();

    let user = Caller::new(Address::from_label("user"));
    ledger.mint(&user.address, 100 * ETHER).unwrap();

    Env {
        config,
        clock,
        ledger,
        host,
        authority,
        registry,
        security,
        utility,
        owner,
        node,
        user,
    }
}

impl Env {
    /// Account created by the user with passphrase 0 and `funds` deposited
    pub fn account(&self, funds: Amount) -> Arc<DispatcherAccount> {
        let account = self.registry.create_account(&self.user, hash(0)).unwrap();
        account
            .deposit(&Caller::with_value(self.user.address, funds))
            .unwrap();
        account
    }

    pub fn staked(&self, who: &Caller) -> Caller {
        Caller::with_value(who.address, self.authority.lock_stake())
    }
}
