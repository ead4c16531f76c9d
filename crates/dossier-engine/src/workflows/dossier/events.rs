use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorRef, DossierId, DossierStatus};

/// Delivery hint forwarded to the dispatcher; mirrors the notification
/// priorities recipients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Low,
    Medium,
    High,
}

/// What happened. One kind per accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ExpertAssigned,
    WorkStarted,
    StepStarted,
    StepCompleted,
    StepBlocked,
    StepUnblocked,
    QuoteProposed,
    QuoteAccepted,
    QuoteRejected,
    QuoteInfoRequested,
    QuoteInfoProvided,
    AuditFinalized,
    AuditAmended,
    DossierValidated,
    PaymentConfirmed,
    DossierRejected,
}

impl EventKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ExpertAssigned => "expert_assigned",
            Self::WorkStarted => "work_started",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepBlocked => "step_blocked",
            Self::StepUnblocked => "step_unblocked",
            Self::QuoteProposed => "quote_proposed",
            Self::QuoteAccepted => "quote_accepted",
            Self::QuoteRejected => "quote_rejected",
            Self::QuoteInfoRequested => "quote_info_requested",
            Self::QuoteInfoProvided => "quote_info_provided",
            Self::AuditFinalized => "audit_finalized",
            Self::AuditAmended => "audit_amended",
            Self::DossierValidated => "dossier_validated",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::DossierRejected => "dossier_rejected",
        }
    }

    pub const fn priority(self) -> EventPriority {
        match self {
            Self::QuoteProposed
            | Self::QuoteAccepted
            | Self::AuditFinalized
            | Self::DossierValidated
            | Self::PaymentConfirmed => EventPriority::High,
            Self::StepStarted | Self::StepUnblocked => EventPriority::Low,
            _ => EventPriority::Medium,
        }
    }
}

/// Immutable record of an accepted transition. Appended to the outbox after
/// the dossier commit; the dispatcher owns delivery and its retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub dossier_id: DossierId,
    pub kind: EventKind,
    pub actor: ActorRef,
    pub before_status: DossierStatus,
    pub after_status: DossierStatus,
    pub at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn priority(&self) -> EventPriority {
        self.kind.priority()
    }
}

/// Outbox boundary. The engine appends and returns; it never blocks on
/// delivery to recipients.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent) -> Result<(), OutboxError>;
}

/// Outbox append failure.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("event outbox unavailable: {0}")]
    Unavailable(String),
}
