//! Approval request lifecycle.
//!
//! Requests move pending -> approved/rejected exactly once; resolved
//! requests are retained for audit, never deleted. The gate is an explicit
//! value constructed once per process and passed where needed. Every
//! mutation takes the store's cross-process lock and reloads before
//! writing, so an out-of-band operator decision and a scheduled cycle
//! cannot lose each other's updates.

use crate::registry::{policy, ActionType, RiskLevel};
use crate::store::{ApprovalStore, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// One approval request. `id` is a random v4 uuid, not a content hash, so
/// identical concurrent requests never collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub action_type: ActionType,
    pub description: String,
    pub risk_level: RiskLevel,
    pub details: Value,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

/// Result of `request_approval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApprovalOutcome {
    Approved { reason: String },
    Pending { request_id: String },
}

/// Result of a read-only `check_permission`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub allowed: bool,
    pub notify: bool,
    pub requires_approval: bool,
    pub reason: String,
}

/// Errors from approval operations.
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("approval request {id} not found")]
    NotFound { id: String },

    #[error("approval request {id} already resolved as {status}")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ApprovalGate {
    store: ApprovalStore,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ApprovalGate {
    /// Opens the gate over a durable store, loading existing requests.
    ///
    /// # Errors
    /// Propagates store errors; a corrupt store is not silently reset.
    pub fn open(store: ApprovalStore) -> Result<Self, ApprovalError> {
        let requests = store.load()?;
        Ok(Self {
            store,
            requests: Mutex::new(requests),
        })
    }

    /// Requests approval for an action.
    ///
    /// Ungated action types, satisfied auto-approve predicates, and
    /// no-approval policies resolve immediately; everything else creates a
    /// durable pending request.
    ///
    /// # Errors
    /// Store errors when persisting a new pending request.
    pub fn request_approval(
        &self,
        action_type: ActionType,
        details: Value,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let Some(policy) = policy(action_type) else {
            return Ok(ApprovalOutcome::Approved {
                reason: "Action type not gated".to_string(),
            });
        };

        if let Some(predicate) = policy.auto_approve {
            if predicate.holds(&details) {
                return Ok(ApprovalOutcome::Approved {
                    reason: format!("Auto-approved: {}", predicate.name()),
                });
            }
        }

        if !policy.requires_approval {
            return Ok(ApprovalOutcome::Approved {
                reason: "No approval required for this action type".to_string(),
            });
        }

        let request = ApprovalRequest {
            id: Uuid::new_v4().to_string(),
            action_type,
            description: policy.description.to_string(),
            risk_level: policy.risk_level,
            details,
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            reject_reason: None,
        };
        let request_id = request.id.clone();

        let mut requests = self.requests.lock();
        let _store_lock = self.store.lock()?;
        *requests = self.store.load()?;
        requests.push(request);
        self.store.save(&requests)?;

        info!(%request_id, %action_type, "Approval requested");

        Ok(ApprovalOutcome::Pending { request_id })
    }

    /// Approves a pending request.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `AlreadyResolved` for a second
    /// resolution.
    pub fn approve(&self, id: &str) -> Result<ApprovalRequest, ApprovalError> {
        self.resolve(id, |request| {
            request.status = ApprovalStatus::Approved;
            request.approved_at = Some(Utc::now());
        })
    }

    /// Rejects a pending request, recording the reason.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `AlreadyResolved` for a second
    /// resolution.
    pub fn reject(&self, id: &str, reason: &str) -> Result<ApprovalRequest, ApprovalError> {
        self.resolve(id, |request| {
            request.status = ApprovalStatus::Rejected;
            request.rejected_at = Some(Utc::now());
            request.reject_reason = Some(reason.to_string());
        })
    }

    fn resolve(
        &self,
        id: &str,
        transition: impl FnOnce(&mut ApprovalRequest),
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut requests = self.requests.lock();
        // Lock out concurrent writers, then reload so their latest
        // resolution is observed before ours is applied.
        let _store_lock = self.store.lock()?;
        *requests = self.store.load()?;

        let request = requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ApprovalError::NotFound { id: id.to_string() })?;

        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyResolved {
                id: id.to_string(),
                status: request.status,
            });
        }

        transition(request);
        let resolved = request.clone();
        self.store.save(&requests)?;

        info!(id, status = %resolved.status, "Approval request resolved");

        Ok(resolved)
    }

    /// Read-only permission check for tiered actions. Tier 1 passes
    /// silently, tier 2 passes with a notify flag, anything else falls
    /// through to the registry without creating a request.
    #[must_use]
    pub fn check_permission(&self, action_type: ActionType, tier: Option<u8>) -> Permission {
        match tier {
            Some(1) => Permission {
                allowed: true,
                notify: false,
                requires_approval: false,
                reason: "Tier 1 action".to_string(),
            },
            Some(2) => Permission {
                allowed: true,
                notify: true,
                requires_approval: false,
                reason: "Tier 2 action".to_string(),
            },
            _ => match policy(action_type) {
                Some(policy) if policy.requires_approval => Permission {
                    allowed: false,
                    notify: false,
                    requires_approval: true,
                    reason: format!("{action_type} requires approval"),
                },
                _ => Permission {
                    allowed: true,
                    notify: false,
                    requires_approval: false,
                    reason: "No approval required".to_string(),
                },
            },
        }
    }

    /// All requests, resolved and pending, in creation order.
    pub fn list(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let mut requests = self.requests.lock();
        *requests = self.store.load()?;
        Ok(requests.clone())
    }

    /// All pending requests in creation order.
    pub fn list_pending(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let mut requests = self.requests.lock();
        *requests = self.store.load()?;
        Ok(requests
            .iter()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .cloned()
            .collect())
    }

    /// Looks up one request by id.
    ///
    /// # Errors
    /// Propagates store errors; a stale cached status must never stand in
    /// for an unreadable store.
    pub fn get(&self, id: &str) -> Result<Option<ApprovalRequest>, ApprovalError> {
        let mut requests = self.requests.lock();
        *requests = self.store.load()?;
        Ok(requests.iter().find(|r| r.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn gate() -> (TempDir, ApprovalGate) {
        let dir = TempDir::new().unwrap();
        let store = ApprovalStore::new(dir.path().join("approval_state.json"));
        let gate = ApprovalGate::open(store).unwrap();
        (dir, gate)
    }

    #[test]
    fn ungated_action_approves_immediately() {
        let (_dir, gate) = gate();
        let outcome = gate
            .request_approval(ActionType::AlertSend, json!({}))
            .unwrap();
        match outcome {
            ApprovalOutcome::Approved { reason } => assert!(reason.contains("not gated")),
            ApprovalOutcome::Pending { .. } => panic!("expected immediate approval"),
        }
    }

    #[test]
    fn no_approval_required_action_approves_immediately() {
        let (_dir, gate) = gate();
        let outcome = gate
            .request_approval(ActionType::ExternalApiCall, json!({}))
            .unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Approved { .. }));
    }

    #[test]
    fn dedup_passed_auto_approves_video_pitch() {
        let (_dir, gate) = gate();
        let outcome = gate
            .request_approval(ActionType::VideoPitch, json!({"dedup_passed": true}))
            .unwrap();
        match outcome {
            ApprovalOutcome::Approved { reason } => {
                assert!(reason.contains("duplicate check passed"));
            }
            ApprovalOutcome::Pending { .. } => panic!("predicate should auto-approve"),
        }
    }

    #[test]
    fn video_pitch_without_dedup_goes_pending() {
        let (_dir, gate) = gate();
        let outcome = gate
            .request_approval(ActionType::VideoPitch, json!({}))
            .unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Pending { .. }));
    }

    #[test]
    fn gated_action_creates_durable_pending_request() {
        let (_dir, gate) = gate();
        let outcome = gate
            .request_approval(ActionType::EmailSend, json!({"to": "ops@example.com"}))
            .unwrap();
        let ApprovalOutcome::Pending { request_id } = outcome else {
            panic!("expected pending");
        };

        let pending = gate.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, request_id);
        assert_eq!(pending[0].action_type, ActionType::EmailSend);
        assert_eq!(pending[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn identical_concurrent_requests_get_distinct_ids() {
        let (_dir, gate) = gate();
        let details = json!({"symbol": "BTC-USD"});
        let first = gate
            .request_approval(ActionType::TradeExecute, details.clone())
            .unwrap();
        let second = gate
            .request_approval(ActionType::TradeExecute, details)
            .unwrap();

        let (ApprovalOutcome::Pending { request_id: a }, ApprovalOutcome::Pending { request_id: b }) =
            (first, second)
        else {
            panic!("both should be pending");
        };
        assert_ne!(a, b);
    }

    #[test]
    fn approve_transitions_once() {
        let (_dir, gate) = gate();
        let ApprovalOutcome::Pending { request_id } = gate
            .request_approval(ActionType::ConfigChange, json!({}))
            .unwrap()
        else {
            panic!("expected pending");
        };

        let resolved = gate.approve(&request_id).unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
        assert!(resolved.approved_at.is_some());

        let err = gate.approve(&request_id).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved { .. }));
    }

    #[test]
    fn reject_records_reason_and_is_terminal() {
        let (_dir, gate) = gate();
        let ApprovalOutcome::Pending { request_id } = gate
            .request_approval(ActionType::SocialPost, json!({}))
            .unwrap()
        else {
            panic!("expected pending");
        };

        let resolved = gate.reject(&request_id, "off-brand content").unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Rejected);
        assert_eq!(resolved.reject_reason.as_deref(), Some("off-brand content"));
        assert!(resolved.rejected_at.is_some());

        let err = gate.approve(&request_id).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved { .. }));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (_dir, gate) = gate();
        let err = gate.approve("no-such-id").unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound { .. }));
        let err = gate.reject("no-such-id", "whatever").unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound { .. }));
    }

    #[test]
    fn resolved_requests_are_retained_for_audit() {
        let (_dir, gate) = gate();
        let ApprovalOutcome::Pending { request_id } = gate
            .request_approval(ActionType::FileDelete, json!({"path": "/tmp/x"}))
            .unwrap()
        else {
            panic!("expected pending");
        };
        gate.reject(&request_id, "nope").unwrap();

        assert!(gate.list_pending().unwrap().is_empty());
        let retained = gate.get(&request_id).unwrap().unwrap();
        assert_eq!(retained.status, ApprovalStatus::Rejected);
    }

    #[test]
    fn store_roundtrip_preserves_every_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval_state.json");

        let request_id = {
            let gate = ApprovalGate::open(ApprovalStore::new(path.clone())).unwrap();
            let ApprovalOutcome::Pending { request_id } = gate
                .request_approval(
                    ActionType::TradeExecute,
                    json!({"symbol": "ETH-USD", "size_usd": "750"}),
                )
                .unwrap()
            else {
                panic!("expected pending");
            };
            gate.approve(&request_id).unwrap();
            request_id
        };

        // reopen from disk
        let gate = ApprovalGate::open(ApprovalStore::new(path)).unwrap();
        let request = gate.get(&request_id).unwrap().unwrap();
        assert_eq!(request.action_type, ActionType::TradeExecute);
        assert_eq!(request.status, ApprovalStatus::Approved);
        assert_eq!(request.details["symbol"], "ETH-USD");
        assert!(request.approved_at.is_some());
        assert!(request.reject_reason.is_none());
    }

    #[test]
    fn operator_resolution_survives_concurrent_gate_instance() {
        // A second gate over the same store (the out-of-band operator path)
        // resolves a request; the first gate observes it on next read.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval_state.json");

        let cycle_gate = ApprovalGate::open(ApprovalStore::new(path.clone())).unwrap();
        let ApprovalOutcome::Pending { request_id } = cycle_gate
            .request_approval(ActionType::TradeExecute, json!({}))
            .unwrap()
        else {
            panic!("expected pending");
        };

        let operator_gate = ApprovalGate::open(ApprovalStore::new(path)).unwrap();
        operator_gate.approve(&request_id).unwrap();

        let seen = cycle_gate.get(&request_id).unwrap().unwrap();
        assert_eq!(seen.status, ApprovalStatus::Approved);
        let err = cycle_gate.approve(&request_id).unwrap_err();
        assert!(matches!(err, ApprovalError::AlreadyResolved { .. }));
    }

    #[test]
    fn writer_blocks_until_the_store_lock_is_released() {
        // A mutation that started while another writer holds the lock must
        // wait for it, so it can never persist a snapshot taken before that
        // writer's transaction.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval_state.json");

        let cycle_gate = ApprovalGate::open(ApprovalStore::new(path.clone())).unwrap();
        let ApprovalOutcome::Pending { request_id } = cycle_gate
            .request_approval(ActionType::TradeExecute, json!({}))
            .unwrap()
        else {
            panic!("expected pending");
        };

        let store = ApprovalStore::new(path.clone());
        let held = store.lock().unwrap();

        let operator = {
            let path = path.clone();
            let id = request_id.clone();
            std::thread::spawn(move || {
                let gate = ApprovalGate::open(ApprovalStore::new(path)).unwrap();
                gate.approve(&id).unwrap()
            })
        };

        std::thread::sleep(std::time::Duration::from_millis(100));
        let on_disk = store.load().unwrap();
        assert_eq!(on_disk[0].status, ApprovalStatus::Pending);

        drop(held);
        let resolved = operator.join().unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
        let seen = cycle_gate.get(&request_id).unwrap().unwrap();
        assert_eq!(seen.status, ApprovalStatus::Approved);
    }

    #[test]
    fn get_propagates_a_store_read_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval_state.json");
        let gate = ApprovalGate::open(ApprovalStore::new(path.clone())).unwrap();
        let ApprovalOutcome::Pending { request_id } = gate
            .request_approval(ActionType::TradeExecute, json!({}))
            .unwrap()
        else {
            panic!("expected pending");
        };

        std::fs::write(&path, b"not valid json {{{").unwrap();

        let err = gate.get(&request_id).unwrap_err();
        assert!(matches!(err, ApprovalError::Store(StoreError::Corrupt { .. })));
    }

    #[test]
    fn corrupt_store_is_an_error_not_a_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("approval_state.json");
        std::fs::write(&path, b"not valid json {{{").unwrap();

        let result = ApprovalGate::open(ApprovalStore::new(path));
        assert!(result.is_err());
    }

    #[test]
    fn pending_listed_in_creation_order() {
        let (_dir, gate) = gate();
        let mut ids = Vec::new();
        for _ in 0..3 {
            if let ApprovalOutcome::Pending { request_id } = gate
                .request_approval(ActionType::EmailSend, json!({}))
                .unwrap()
            {
                ids.push(request_id);
            }
        }

        let pending = gate.list_pending().unwrap();
        let listed: Vec<String> = pending.into_iter().map(|r| r.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn tier_checks_bypass_registry() {
        let (_dir, gate) = gate();

        let p1 = gate.check_permission(ActionType::EmailSend, Some(1));
        assert!(p1.allowed);
        assert!(!p1.notify);

        let p2 = gate.check_permission(ActionType::EmailSend, Some(2));
        assert!(p2.allowed);
        assert!(p2.notify);

        let p3 = gate.check_permission(ActionType::EmailSend, None);
        assert!(!p3.allowed);
        assert!(p3.requires_approval);

        let p4 = gate.check_permission(ActionType::ExternalApiCall, None);
        assert!(p4.allowed);

        // read-only: no request was created
        assert!(gate.list_pending().unwrap().is_empty());
    }
}
