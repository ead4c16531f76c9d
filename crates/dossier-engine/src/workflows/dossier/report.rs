use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    ActorRef, Dossier, DossierId, DossierStatus, Priority, ProductRef, Rejection, Step, StepId,
    StepStatus, StepType,
};
use super::quote::Quote;
use super::settlement::{AuditResult, Settlement};

/// Step as UI layers consume it: stored status plus the derived overdue flag.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub id: StepId,
    pub name: String,
    pub step_type: StepType,
    pub type_label: &'static str,
    pub status: StepStatus,
    pub status_label: &'static str,
    pub overdue: bool,
    pub assignee: Option<ActorRef>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub estimated_duration_minutes: u32,
    pub progress: u8,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepView {
    pub fn project(step: &Step, now: DateTime<Utc>) -> Self {
        Self {
            id: step.id.clone(),
            name: step.name.clone(),
            step_type: step.step_type,
            type_label: step.step_type.label(),
            status: step.status,
            status_label: step.status.label(),
            overdue: step.is_overdue(now),
            assignee: step.assignee.clone(),
            priority: step.priority,
            due_date: step.due_date,
            estimated_duration_minutes: step.estimated_duration_minutes,
            progress: step.progress,
            completed_at: step.completed_at,
        }
    }
}

/// Current audit record with its derived settlement attached.
#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    #[serde(flatten)]
    pub result: AuditResult,
    pub settlement: Settlement,
}

impl AuditView {
    pub fn project(result: &AuditResult) -> Self {
        Self {
            result: result.clone(),
            settlement: result.settlement(),
        }
    }
}

/// Success payload of every orchestrator operation: the dossier with its
/// steps, quote, and audit as the caller should render them.
#[derive(Debug, Clone, Serialize)]
pub struct DossierSnapshot {
    pub id: DossierId,
    pub client_id: String,
    pub product: ProductRef,
    pub expert_id: Option<String>,
    pub status: DossierStatus,
    pub status_label: &'static str,
    pub progress: u8,
    pub priority: Priority,
    pub current_step_index: usize,
    pub steps: Vec<StepView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DossierSnapshot {
    pub fn project(dossier: &Dossier, now: DateTime<Utc>) -> Self {
        Self {
            id: dossier.id.clone(),
            client_id: dossier.client_id.clone(),
            product: dossier.product.clone(),
            expert_id: dossier.expert_id.clone(),
            status: dossier.status,
            status_label: dossier.status.label(),
            progress: dossier.progress,
            priority: dossier.priority,
            current_step_index: dossier.ledger.current_step_index(),
            steps: dossier
                .ledger
                .steps()
                .iter()
                .map(|step| StepView::project(step, now))
                .collect(),
            quote: dossier.quote.clone(),
            audit: dossier.current_audit().map(AuditView::project),
            rejection: dossier.rejection.clone(),
            invoice_id: dossier.invoice_id.clone(),
            created_at: dossier.created_at,
            updated_at: dossier.updated_at,
        }
    }
}

/// One overdue step of one dossier, as produced for SLA sweeps.
#[derive(Debug, Clone, Serialize)]
pub struct OverdueEntry {
    pub dossier_id: DossierId,
    pub dossier_status: DossierStatus,
    pub step: StepView,
}
