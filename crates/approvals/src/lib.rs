//! Approval gate for sensitive actions.
//!
//! A durable state machine tracking approval requests through
//! pending/approved/rejected. Independent of trading: any gated action goes
//! through the same registry and lifecycle.

pub mod gate;
pub mod registry;
pub mod store;

pub use gate::{
    ApprovalError, ApprovalGate, ApprovalOutcome, ApprovalRequest, ApprovalStatus, Permission,
};
pub use registry::{policy, ActionPolicy, ActionType, AutoApprove, RiskLevel};
pub use store::{ApprovalStore, StoreError, StoreLock};
