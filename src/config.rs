use crate::authority::{AuthorityParams, FeeConfig, Node, SharedAuthority};
use crate::error::{CustodyError, Result};
use crate::host::Host;
use crate::registry::AccountRegistry;
use crate::types::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CustodyConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub lock: LockConfig,
    pub withdraw: WithdrawConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    pub tokens: TokensConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Stake in base units required from non-node lockers
    pub stake: u64,
    /// Seconds
    pub duration: u64,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub address: Address,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub gas_allowance: u64,
    #[serde(default = "default_multiplier")]
    pub fee_numerator: u64,
    #[serde(default = "default_multiplier")]
    pub fee_denominator: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_multiplier() -> u64 {
    1
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WithdrawConfig {
    pub fee: WithdrawFeeConfig,
    pub min: WithdrawMinConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WithdrawFeeConfig {
    /// Decimal places of the percentage; the denominator is 10^precision
    pub precision: u32,
    /// Pre-multiplied by 10^precision (100 at precision 4 is 1%)
    pub percentage: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WithdrawMinConfig {
    pub native: u64,
    /// Floor for tokens without an entry in `per_token`
    pub tokens: u64,
    #[serde(default)]
    pub per_token: HashMap<Address, u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Charged per unit of a node's gas allowance
    pub base_fee: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_fee: 1_000_000_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TokensConfig {
    pub security: Address,
    pub utility: Address,
    /// Additional addresses accounts may never proxy-call
    #[serde(default)]
    pub excluded: Vec<Address>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lock: LockConfig {
                stake: 100_000_000_000_000_000,
                duration: 600,
                nodes: vec![],
            },
            withdraw: WithdrawConfig {
                fee: WithdrawFeeConfig {
                    precision: 4,
                    percentage: 100,
                },
                min: WithdrawMinConfig {
                    native: 1_000_000_000_000_000,
                    tokens: 10 * 100_000_000,
                    per_token: HashMap::new(),
                },
            },
            execution: ExecutionConfig::default(),
            tokens: TokensConfig {
                security: Address::from_label("DRPS"),
                utility: Address::from_label("DRPU"),
                excluded: vec![],
            },
        }
    }
}

impl CustodyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CustodyError::Config(format!("reading {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| CustodyError::Config(format!("parsing {}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Load `path`, writing the defaults there first when it does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        warn!("Config file not found at '{}'. Creating default.", path.display());
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?)
            .map_err(|e| CustodyError::Config(format!("writing {}: {}", path.display(), e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CustodyError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.withdraw.fee.precision > 38 {
            return Err(CustodyError::Config(format!(
                "fee precision {} exceeds 38 decimals",
                self.withdraw.fee.precision
            )));
        }
        if self.tokens.security == self.tokens.utility {
            return Err(CustodyError::Config(
                "security and utility token must differ".to_string(),
            ));
        }
        for node in &self.lock.nodes {
            if node.fee_denominator == 0 {
                return Err(CustodyError::Config(format!(
                    "node {} has a zero fee denominator",
                    node.address
                )));
            }
        }
        Ok(())
    }

    pub fn fee_denominator(&self) -> u128 {
        10u128.pow(self.withdraw.fee.precision)
    }

    pub fn fee_config(&self) -> FeeConfig {
        FeeConfig {
            withdraw_fee_percentage: self.withdraw.fee.percentage as u128,
            denominator: self.fee_denominator(),
            min_native_withdraw: self.withdraw.min.native as Amount,
            default_min_token_withdraw: self.withdraw.min.tokens as Amount,
            min_token_withdraw: self
                .withdraw
                .min
                .per_token
                .iter()
                .map(|(token, amount)| (*token, *amount as Amount))
                .collect(),
            execution_base_fee: self.execution.base_fee as Amount,
        }
    }

    pub fn authority_params(&self) -> AuthorityParams {
        AuthorityParams {
            lock_stake: self.lock.stake as Amount,
            lock_duration: self.lock.duration,
            fees: self.fee_config(),
            nodes: self
                .lock
                .nodes
                .iter()
                .map(|n| {
                    Node::new(
                        n.address,
                        n.enabled,
                        n.gas_allowance as u128,
                        n.fee_numerator as u128,
                        n.fee_denominator as u128,
                    )
                })
                .collect(),
        }
    }

    /// Build the shared authority and account registry owned by `owner`
    pub fn build(&self, owner: Address, host: Arc<Host>) -> Result<(Arc<SharedAuthority>, AccountRegistry)> {
        self.validate()?;
        let authority = Arc::new(SharedAuthority::new(owner, self.authority_params(), host.clone())?);
        let registry = AccountRegistry::new(
            owner,
            authority.clone(),
            host,
            self.tokens.security,
            self.tokens.utility,
            self.tokens.excluded.iter().copied(),
        );
        info!(
            authority = %authority.address(),
            registry = %registry.address(),
            nodes = self.lock.nodes.len(),
            "custody deployed"
        );
        Ok((authority, registry))
    }
}
