pub mod config;
pub mod fee;
pub mod simulate;

use crate::config::CustodyConfig;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "custody")]
#[command(about = "Compass custodial account tooling", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "custody.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: config::ConfigCommands,
    },
    /// Compute the withdrawal fee a node would charge
    Fee {
        #[arg(long)]
        amount: u128,
        /// Node fee multiplier numerator
        #[arg(long, default_value = "1")]
        numerator: u128,
        /// Node fee multiplier denominator
        #[arg(long, default_value = "1")]
        denominator: u128,
        /// Evaluate as if 2FA were enabled (no fee)
        #[arg(long)]
        no_charge: bool,
    },
    /// Run the reference scenarios against an in-process deployment
    Simulate {
        #[arg(long, value_enum)]
        scenario: Option<simulate::Scenario>,
    },
}

/// Configuration at `path`, or the defaults when there is none yet
fn config_or_default(path: &Path) -> Result<CustodyConfig, Box<dyn Error>> {
    if path.exists() {
        Ok(CustodyConfig::load(path)?)
    } else {
        Ok(CustodyConfig::default())
    }
}

pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::Config { cmd } => config::handle_config_command(&cli.config, cmd),
        Commands::Fee {
            amount,
            numerator,
            denominator,
            no_charge,
        } => {
            let config = config_or_default(&cli.config)?;
            fee::handle_fee_command(&config, amount, numerator, denominator, !no_charge)
        }
        Commands::Simulate { scenario } => {
            let config = config_or_default(&cli.config)?;
            simulate::handle_simulate_command(&config, scenario)
        }
    }
}

/// Log level from the configuration file, if one can be read
pub fn configured_log_level(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    toml::from_str::<CustodyConfig>(&raw).ok().map(|c| c.log_level)
}
