//! In-process deployment exercising the reference scenarios end to end

use crate::authority::{Node, SharedAuthority};
use crate::clock::ManualClock;
use crate::config::CustodyConfig;
use crate::dispatcher::DispatcherAccount;
use crate::error::Result;
use crate::events::Event;
use crate::host::Host;
use crate::ledger::Ledger;
use crate::passphrase::EncodedPassphrase;
use crate::registry::AccountRegistry;
use crate::token::LedgerToken;
use crate::types::{Address, Amount, Caller};
use clap::ValueEnum;
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use tracing::info;

const ETHER: Amount = 1_000_000_000_000_000_000;
const GENESIS_TIME: u64 = 1_700_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Node-mediated withdrawal with fee
    NodeWithdraw,
    /// 2FA owner withdraws without a lock
    TwoFactor,
    /// Withdrawal under the configured floor
    BelowMinimum,
    /// Proxy execution against excluded targets
    ForbiddenTarget,
}

impl Scenario {
    pub fn all() -> [Scenario; 4] {
        [
            Scenario::NodeWithdraw,
            Scenario::TwoFactor,
            Scenario::BelowMinimum,
            Scenario::ForbiddenTarget,
        ]
    }
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub outcome: String,
    pub events: Vec<Event>,
}

/// Fresh deployment with one funded account
pub struct Deployment {
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<Ledger>,
    pub host: Arc<Host>,
    pub authority: Arc<SharedAuthority>,
    pub registry: AccountRegistry,
    pub owner: Caller,
    pub user: Caller,
    pub node: Caller,
    pub account: Arc<DispatcherAccount>,
    pub passphrases: Vec<EncodedPassphrase>,
}

impl Deployment {
    pub fn new(config: &CustodyConfig) -> Result<Self> {
        let clock = Arc::new(ManualClock::new(GENESIS_TIME));
        let ledger = Arc::new(Ledger::new());
        let host = Arc::new(Host::new(ledger.clone(), clock.clone()));

        for (address, symbol) in [(config.tokens.security, "DRPS"), (config.tokens.utility, "DRPU")] {
            host.register_token(Arc::new(LedgerToken::new(address, symbol, 8, ledger.clone())));
        }

        let owner = Caller::new(Address::from_label("owner"));
        let (authority, registry) = config.build(owner.address, host.clone())?;

        let node = match config.lock.nodes.iter().find(|n| n.enabled) {
            Some(n) => Caller::new(n.address),
            None => {
                let node = Caller::new(Address::from_label("node"));
                authority.add_node(&owner, Node::new(node.address, true, 1, 1, 1))?;
                node
            }
        };

        let passphrases: Vec<EncodedPassphrase> = (0..4).map(|_| EncodedPassphrase::random()).collect();
        let user = Caller::new(Address::from_label("user"));
        ledger.mint(&user.address, 10 * ETHER)?;

        let account = registry.create_account(&user, passphrases[0].hash())?;
        account.deposit(&Caller::with_value(user.address, 5 * ETHER))?;

        Ok(Self {
            clock,
            ledger,
            host,
            authority,
            registry,
            owner,
            user,
            node,
            account,
            passphrases,
        })
    }

    fn pass(&self, n: usize) -> &EncodedPassphrase {
        &self.passphrases[n]
    }
}

pub fn run(config: &CustodyConfig, scenario: Scenario) -> Result<ScenarioReport> {
    let d = Deployment::new(config)?;
    let account = d.account.address();
    let beneficiary = Address::from_label("beneficiary");

    let outcome = match scenario {
        Scenario::NodeWithdraw => {
            d.authority.lock(&d.node, &account)?;
            let w = d
                .account
                .withdraw_ether_to(&d.node, beneficiary, ETHER, d.pass(0), d.pass(1).hash())?;
            format!(
                "beneficiary received {}, node {} received fee {}, locked: {}",
                d.ledger.balance(&beneficiary),
                d.node.address,
                w.fee,
                d.authority.is_locked(&account)
            )
        }
        Scenario::TwoFactor => {
            let staked = Caller::with_value(d.user.address, d.authority.lock_stake());
            d.authority.lock(&staked, &account)?;
            d.account.enable_2fa(&d.user, d.pass(0), d.pass(1).hash())?;
            let w = d.account.withdraw_ether(&d.user, ETHER, d.pass(1), d.pass(2).hash())?;
            format!(
                "2fa owner {} withdrew {} without a lock, fee {}",
                d.user.address, w.amount, w.fee
            )
        }
        Scenario::BelowMinimum => {
            d.authority.lock(&d.node, &account)?;
            let amount = d.authority.min_ether_withdraw_amount().saturating_sub(1);
            let before = d.account.balance();
            let err = d
                .account
                .withdraw_ether_to(&d.node, beneficiary, amount, d.pass(0), d.pass(1).hash())
                .err();
            format!(
                "rejected: {}, balance unchanged: {}",
                describe(err),
                d.account.balance() == before
            )
        }
        Scenario::ForbiddenTarget => {
            d.authority.lock(&d.node, &account)?;
            let before = d.account.balance();
            let rejected: Vec<String> = [account, d.registry.security_token()]
                .iter()
                .map(|target| {
                    let err = d
                        .account
                        .execute(&d.node, *target, ETHER, &[], d.pass(0), d.pass(1).hash())
                        .err();
                    describe(err)
                })
                .collect();
            format!(
                "rejected: [{}], balance unchanged: {}",
                rejected.join("; "),
                d.account.balance() == before
            )
        }
    };

    info!(?scenario, %outcome, "scenario finished");
    Ok(ScenarioReport {
        scenario,
        outcome,
        events: d.host.events().drain(),
    })
}

fn describe(err: Option<crate::error::CustodyError>) -> String {
    err.map(|e| e.to_string()).unwrap_or_else(|| "accepted".to_string())
}

pub fn handle_simulate_command(config: &CustodyConfig, scenario: Option<Scenario>) -> std::result::Result<(), Box<dyn Error>> {
    let scenarios = match scenario {
        Some(s) => vec![s],
        None => Scenario::all().to_vec(),
    };

    let reports = scenarios
        .into_iter()
        .map(|s| run(config, s))
        .collect::<Result<Vec<_>>>()?;

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
