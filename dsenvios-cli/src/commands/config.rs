//! Configuration inspection

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dsenvios_core::AppConfig;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (password redacted)
    Show,
    /// Print the config file location
    Path,
}

pub fn run_config(args: &ConfigArgs, explicit: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = explicit.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
            let note = if path.exists() { "" } else { " (not found, defaults apply)" };
            println!("{}{}", path.display(), note);
        }
        ConfigCommand::Show => {
            let config = AppConfig::load(explicit)?;
            println!("{:#?}", config);
        }
    }
    Ok(())
}
