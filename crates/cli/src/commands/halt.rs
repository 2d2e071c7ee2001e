//! Inspecting and operating the durable trading halt.
//!
//! The flag survives restarts and is never cleared automatically; `clear`
//! is the only way back to trading after a critical drawdown.

use anyhow::Result;
use autotrader_core::ConfigLoader;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum HaltCommand {
    /// Show the current halt state
    Status {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Halt trading with a reason
    Set {
        /// Why trading is being halted
        reason: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Clear the halt and allow trading again
    Clear {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

pub fn run_halt(command: HaltCommand) -> Result<()> {
    match command {
        HaltCommand::Status { config } => {
            let config = ConfigLoader::load(&config)?;
            let state = super::open_halt_flag(&config).state()?;
            if state.halted {
                let reason = state.reason.as_deref().unwrap_or("no reason recorded");
                println!("halted since {}: {}", state.changed_at, reason);
            } else {
                println!("trading enabled");
            }
        }
        HaltCommand::Set { reason, config } => {
            let config = ConfigLoader::load(&config)?;
            super::open_halt_flag(&config).set(&reason)?;
            println!("trading halted: {reason}");
        }
        HaltCommand::Clear { config } => {
            let config = ConfigLoader::load(&config)?;
            super::open_halt_flag(&config).clear()?;
            println!("halt cleared, trading enabled");
        }
    }
    Ok(())
}
