//! Static registry of gated action types.
//!
//! An action type without a policy entry is treated as auto-approved.
//! That fail-open default is deliberate and documented: the registry gates
//! what it knows about, and ungated actions pass through with a "not gated"
//! reason recorded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of action types the gate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    EmailSend,
    SocialPost,
    FileDelete,
    FileOverwrite,
    VideoPitch,
    ExternalApiCall,
    ConfigChange,
    TradeExecute,
    /// Alert delivery is never gated; carries no policy entry.
    AlertSend,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EmailSend => "email_send",
            Self::SocialPost => "social_post",
            Self::FileDelete => "file_delete",
            Self::FileOverwrite => "file_overwrite",
            Self::VideoPitch => "video_pitch",
            Self::ExternalApiCall => "external_api_call",
            Self::ConfigChange => "config_change",
            Self::TradeExecute => "trade_execute",
            Self::AlertSend => "alert_send",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Auto-approval predicates. Each reads an opaque flag from the request
/// details supplied by the caller; nothing is re-derived here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoApprove {
    /// `details.dedup_passed == true`, set by an external dedup check.
    DedupPassed,
}

impl AutoApprove {
    #[must_use]
    pub fn holds(&self, details: &Value) -> bool {
        match self {
            Self::DedupPassed => details
                .get("dedup_passed")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DedupPassed => "duplicate check passed",
        }
    }
}

/// Policy for one gated action type.
#[derive(Debug, Clone, Copy)]
pub struct ActionPolicy {
    pub description: &'static str,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub auto_approve: Option<AutoApprove>,
}

/// Looks up the policy for an action type. `None` means the action is not
/// gated (fail-open).
#[must_use]
pub fn policy(action: ActionType) -> Option<ActionPolicy> {
    let policy = match action {
        ActionType::EmailSend => ActionPolicy {
            description: "Send email",
            risk_level: RiskLevel::High,
            requires_approval: true,
            auto_approve: None,
        },
        ActionType::SocialPost => ActionPolicy {
            description: "Post to social media",
            risk_level: RiskLevel::High,
            requires_approval: true,
            auto_approve: None,
        },
        ActionType::FileDelete => ActionPolicy {
            description: "Delete file or directory",
            risk_level: RiskLevel::Medium,
            requires_approval: true,
            auto_approve: None,
        },
        ActionType::FileOverwrite => ActionPolicy {
            description: "Overwrite existing file",
            risk_level: RiskLevel::Medium,
            requires_approval: true,
            auto_approve: None,
        },
        ActionType::VideoPitch => ActionPolicy {
            description: "Submit video idea pitch",
            risk_level: RiskLevel::Low,
            requires_approval: true,
            auto_approve: Some(AutoApprove::DedupPassed),
        },
        ActionType::ExternalApiCall => ActionPolicy {
            description: "Call external API with user data",
            risk_level: RiskLevel::Medium,
            requires_approval: false,
            auto_approve: None,
        },
        ActionType::ConfigChange => ActionPolicy {
            description: "Modify system configuration",
            risk_level: RiskLevel::High,
            requires_approval: true,
            auto_approve: None,
        },
        ActionType::TradeExecute => ActionPolicy {
            description: "Execute trade above approval threshold",
            risk_level: RiskLevel::High,
            requires_approval: true,
            auto_approve: None,
        },
        ActionType::AlertSend => return None,
    };
    Some(policy)
}
