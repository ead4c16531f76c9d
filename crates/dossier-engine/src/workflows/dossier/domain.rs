use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ledger::StepLedger;
use super::quote::Quote;
use super::settlement::AuditResult;

/// Identifier wrapper for dossiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DossierId(pub String);

impl std::fmt::Display for DossierId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for steps within a dossier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three caller populations that may act on a dossier. Callers arrive
/// pre-resolved and pre-authorized; the engine only checks which population
/// a given operation is reserved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Client,
    Expert,
    Admin,
}

impl ActorKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Expert => "expert",
            Self::Admin => "admin",
        }
    }
}

/// A resolved caller identity attached to every mutation and event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: String,
    pub kind: ActorKind,
}

impl ActorRef {
    pub fn new(id: impl Into<String>, kind: ActorKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.kind == ActorKind::Admin
    }

    /// Admins may act in place of either party.
    pub fn acts_as(&self, kind: ActorKind) -> bool {
        self.kind == kind || self.is_admin()
    }
}

/// Product families with distinct canonical step chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    FiscalRefund,
    SocialContributions,
    EquipmentDistribution,
}

impl ProductCategory {
    pub const fn ordered() -> [Self; 3] {
        [
            Self::FiscalRefund,
            Self::SocialContributions,
            Self::EquipmentDistribution,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::FiscalRefund => "Fiscal Refund",
            Self::SocialContributions => "Social Contributions",
            Self::EquipmentDistribution => "Equipment Distribution",
        }
    }
}

/// The product a dossier applies for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: String,
    pub name: String,
    pub category: ProductCategory,
}

/// Scheduling weight; lower ranks are worked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub const fn rank(self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Overall dossier lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DossierStatus {
    Eligible,
    ExpertAssigned,
    InProgress,
    Validated,
    Rejected,
    RefundCompleted,
}

impl DossierStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::ExpertAssigned => "expert_assigned",
            Self::InProgress => "in_progress",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::RefundCompleted => "refund_completed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::RefundCompleted)
    }

    /// Steps may only move while the dossier itself is being worked.
    pub const fn accepts_step_updates(self) -> bool {
        matches!(self, Self::ExpertAssigned | Self::InProgress)
    }
}

/// Stored step status. Overdue is a read-time projection, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    /// Transition table: pending -> in_progress -> completed, any
    /// non-completed step may block, and unblocking always lands back on
    /// pending so the step has to be picked up again.
    pub const fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::Pending, Self::Blocked)
                | (Self::InProgress, Self::Blocked)
                | (Self::Blocked, Self::Pending)
        )
    }
}

/// Unit of required work within a dossier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Validation,
    Documentation,
    Expertise,
    Approval,
    Payment,
}

impl StepType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Documentation => "documentation",
            Self::Expertise => "expertise",
            Self::Approval => "approval",
            Self::Payment => "payment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    pub step_type: StepType,
    pub status: StepStatus,
    pub assignee: Option<ActorRef>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: u32,
    pub progress: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Read-time projection; the stored status stays pending/in_progress
    /// underneath.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, StepStatus::Pending | StepStatus::InProgress)
            && self.due_date.is_some_and(|due| due < now)
    }
}

/// Opaque handle into the external document store. The engine never reads
/// file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub file_url: Option<String>,
}

/// Terminal refusal record; the reason is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub actor: ActorRef,
    pub at: DateTime<Utc>,
}

/// One client's engagement with one eligible product. The aggregate is the
/// unit of locking: steps, quote, and audit history are embedded and commit
/// together, fenced by `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub id: DossierId,
    pub client_id: String,
    pub product: ProductRef,
    pub expert_id: Option<String>,
    pub status: DossierStatus,
    #[serde(flatten)]
    pub ledger: StepLedger,
    pub progress: u8,
    pub priority: Priority,
    pub quote: Option<Quote>,
    pub audits: Vec<AuditResult>,
    pub rejection: Option<Rejection>,
    pub estimated_amount: Option<f64>,
    pub invoice_id: Option<String>,
    pub provenance: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dossier {
    /// Latest audit entry; supersedes earlier ones when amended.
    pub fn current_audit(&self) -> Option<&AuditResult> {
        self.audits.last()
    }

    pub fn has_audit(&self) -> bool {
        !self.audits.is_empty()
    }
}

/// Engine error taxonomy. Every operation returns one of these as a typed
/// result; `ConcurrentModification` is the only variant a caller is expected
/// to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DossierError {
    #[error("illegal transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("step {step_id} is not the current step of its dossier")]
    OutOfOrder { step_id: StepId },
    #[error("quote operation '{operation}' is illegal in state {state}")]
    InvalidQuoteState {
        state: &'static str,
        operation: &'static str,
    },
    #[error("dossier was modified concurrently; re-read and retry")]
    ConcurrentModification,
    #[error("audit has already been finalized for this dossier")]
    AlreadyFinalized,
    #[error("{0}")]
    Validation(&'static str),
    #[error("unknown dossier, step, or quote")]
    NotFound,
}
