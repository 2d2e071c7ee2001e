//! Managing the approval queue from the terminal.

use anyhow::{bail, Result};
use autotrader_approvals::ActionType;
use autotrader_core::ConfigLoader;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ApprovalsCommand {
    /// Check whether an action type is permitted for an agent tier
    Check {
        /// Action type, e.g. "trade_execute" or "email_send"
        action: String,
        /// Agent permission tier (1 acts silently, 2 acts with notification)
        #[arg(long)]
        tier: Option<u8>,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// List pending approval requests
    Pending {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Approve a pending request
    Approve {
        /// Request id
        id: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Reject a pending request with a reason
    Reject {
        /// Request id
        id: String,
        /// Why the request is rejected
        #[arg(long)]
        reason: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

fn parse_action_type(action: &str) -> Result<ActionType> {
    match action {
        "email_send" => Ok(ActionType::EmailSend),
        "social_post" => Ok(ActionType::SocialPost),
        "file_delete" => Ok(ActionType::FileDelete),
        "file_overwrite" => Ok(ActionType::FileOverwrite),
        "video_pitch" => Ok(ActionType::VideoPitch),
        "external_api_call" => Ok(ActionType::ExternalApiCall),
        "config_change" => Ok(ActionType::ConfigChange),
        "trade_execute" => Ok(ActionType::TradeExecute),
        "alert_send" => Ok(ActionType::AlertSend),
        other => bail!("unknown action type {other:?}"),
    }
}

pub fn run_approvals(command: ApprovalsCommand) -> Result<()> {
    match command {
        ApprovalsCommand::Check {
            action,
            tier,
            config,
        } => {
            let config = ConfigLoader::load(&config)?;
            let gate = super::open_gate(&config)?;
            let permission = gate.check_permission(parse_action_type(&action)?, tier);
            println!("{}", serde_json::to_string_pretty(&permission)?);
        }
        ApprovalsCommand::Pending { config } => {
            let config = ConfigLoader::load(&config)?;
            let gate = super::open_gate(&config)?;
            let pending = gate.list_pending()?;
            if pending.is_empty() {
                println!("no pending approval requests");
                return Ok(());
            }
            for request in pending {
                println!(
                    "{}  {}  {}  requested {}",
                    request.id, request.action_type, request.description, request.requested_at
                );
            }
        }
        ApprovalsCommand::Approve { id, config } => {
            let config = ConfigLoader::load(&config)?;
            let gate = super::open_gate(&config)?;
            let request = gate.approve(&id)?;
            println!("approved {} ({})", request.id, request.description);
        }
        ApprovalsCommand::Reject { id, reason, config } => {
            let config = ConfigLoader::load(&config)?;
            let gate = super::open_gate(&config)?;
            let request = gate.reject(&id, &reason)?;
            println!("rejected {} ({})", request.id, request.description);
        }
    }
    Ok(())
}
