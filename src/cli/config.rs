use crate::config::CustodyConfig;
use clap::Subcommand;
use std::error::Error;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

pub fn handle_config_command(path: &Path, cmd: ConfigCommands) -> Result<(), Box<dyn Error>> {
    match cmd {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
            }
            CustodyConfig::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigCommands::Show => {
            let config = CustodyConfig::load_or_default(path)?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
