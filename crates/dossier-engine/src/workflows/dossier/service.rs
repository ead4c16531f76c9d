use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use super::domain::{
    ActorKind, ActorRef, Dossier, DossierError, DossierId, DossierStatus, Priority, ProductRef,
    StepId, StepStatus,
};
use super::events::{DomainEvent, EventKind, EventSink, OutboxError};
use super::ledger::{LedgerSignal, StepLedger};
use super::quote::{self, QuoteProposal};
use super::report::{DossierSnapshot, OverdueEntry, StepView};
use super::repository::{DossierRepository, RepositoryError};
use super::settlement::{self, AuditInput};
use super::template::StepTemplateSource;

/// Engine-level dials, loaded from configuration by the hosting service.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Platform commission rate applied when no negotiated rate exists.
    pub default_client_fee_percentage: f64,
    /// Validity window granted to proposals that omit their own.
    pub quote_validity_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_client_fee_percentage: 0.15,
            quote_validity_days: 30,
        }
    }
}

/// Intake payload for a dossier created by an external eligibility decision.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDossier {
    pub client_id: String,
    pub product: ProductRef,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub estimated_amount: Option<f64>,
    #[serde(default)]
    pub provenance: std::collections::BTreeMap<String, String>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

static DOSSIER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_dossier_id() -> DossierId {
    let id = DOSSIER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DossierId(format!("dos-{id:06}"))
}

/// Error raised by orchestrator operations. Engine errors carry the business
/// taxonomy; repository/outbox variants are infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Engine(#[from] DossierError),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    Outbox(#[from] OutboxError),
}

fn from_repository(err: RepositoryError) -> OrchestratorError {
    match err {
        RepositoryError::NotFound => OrchestratorError::Engine(DossierError::NotFound),
        RepositoryError::VersionConflict => {
            OrchestratorError::Engine(DossierError::ConcurrentModification)
        }
        other => OrchestratorError::Repository(other),
    }
}

/// Top-level entity coordinating the step ledger, the quote negotiation, and
/// the settlement computation for every dossier. Operations mutate a working
/// copy, commit it through the repository's version-checked update, and only
/// then append events to the outbox; a rejected operation leaves the stored
/// state untouched.
pub struct DossierOrchestrator<R, E> {
    repository: Arc<R>,
    outbox: Arc<E>,
    templates: Arc<dyn StepTemplateSource>,
    settings: EngineSettings,
}

impl<R, E> DossierOrchestrator<R, E>
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    pub fn new(
        repository: Arc<R>,
        outbox: Arc<E>,
        templates: Arc<dyn StepTemplateSource>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repository,
            outbox,
            templates,
            settings,
        }
    }

    /// Register a dossier for a client that an external eligibility decision
    /// has admitted. The ledger stays empty until an expert is assigned.
    pub fn register_eligible(
        &self,
        new: NewDossier,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        if new.client_id.trim().is_empty() {
            return Err(DossierError::Validation("client_id is required").into());
        }

        let dossier = Dossier {
            id: next_dossier_id(),
            client_id: new.client_id,
            product: new.product,
            expert_id: None,
            status: DossierStatus::Eligible,
            ledger: StepLedger::empty(),
            progress: 0,
            priority: new.priority,
            quote: None,
            audits: Vec::new(),
            rejection: None,
            estimated_amount: new.estimated_amount,
            invoice_id: None,
            provenance: new.provenance,
            created_at: now,
            updated_at: now,
        };

        let stored = self.repository.insert(dossier).map_err(from_repository)?;
        info!(dossier = %stored.id, product = %stored.product.name, "dossier registered");
        Ok(DossierSnapshot::project(&stored, now))
    }

    /// Assign an expert and seed the ledger from the product's canonical
    /// step template. Admin operation, legal only from `eligible`.
    pub fn assign_expert(
        &self,
        id: &DossierId,
        expert_id: &str,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        if !actor.is_admin() {
            return Err(
                DossierError::Validation("expert assignment is reserved for administrators").into(),
            );
        }
        if expert_id.trim().is_empty() {
            return Err(DossierError::Validation("expert_id is required").into());
        }

        let mut dossier = self.load(id, expected_updated_at)?;
        if dossier.status != DossierStatus::Eligible {
            return Err(DossierError::InvalidTransition {
                from: dossier.status.label(),
                to: DossierStatus::ExpertAssigned.label(),
            }
            .into());
        }

        let templates = self.templates.templates_for(dossier.product.category);
        dossier.ledger = StepLedger::seed(
            &dossier.id,
            &templates,
            &dossier.client_id,
            expert_id,
            now,
        );
        dossier.expert_id = Some(expert_id.to_string());
        let event = transition(&mut dossier, DossierStatus::ExpertAssigned, actor, now)
            .with_kind(EventKind::ExpertAssigned);

        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Explicitly open the work phase. Expert (or admin) operation, legal
    /// only from `expert_assigned`.
    pub fn start_work(
        &self,
        id: &DossierId,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        if !actor.acts_as(ActorKind::Expert) {
            return Err(
                DossierError::Validation("starting work is reserved for the assigned expert")
                    .into(),
            );
        }

        let mut dossier = self.load(id, expected_updated_at)?;
        if dossier.status != DossierStatus::ExpertAssigned {
            return Err(DossierError::InvalidTransition {
                from: dossier.status.label(),
                to: DossierStatus::InProgress.label(),
            }
            .into());
        }

        let event = transition(&mut dossier, DossierStatus::InProgress, actor, now)
            .with_kind(EventKind::WorkStarted);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Advance one step through the ledger, recompute overall progress, and
    /// settle the dossier status that follows from it.
    pub fn record_step_update(
        &self,
        id: &DossierId,
        step_id: &StepId,
        new_status: StepStatus,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let mut dossier = self.load(id, expected_updated_at)?;
        if !dossier.status.accepts_step_updates() {
            return Err(DossierError::Validation(
                "steps can only advance while the dossier is being worked",
            )
            .into());
        }

        let advance = dossier.ledger.advance(step_id, new_status, now)?;
        let mut events = Vec::new();

        // The first accepted step movement opens the work phase.
        if dossier.status == DossierStatus::ExpertAssigned {
            events.push(
                transition(&mut dossier, DossierStatus::InProgress, actor, now)
                    .with_kind(EventKind::WorkStarted),
            );
        }

        let kind = match advance.signal {
            LedgerSignal::Started => EventKind::StepStarted,
            LedgerSignal::Completed => EventKind::StepCompleted,
            LedgerSignal::Blocked => EventKind::StepBlocked,
            LedgerSignal::Unblocked => EventKind::StepUnblocked,
        };
        events.push(stamp(&dossier, actor, now).with_kind(kind));

        dossier.progress = dossier.ledger.progress();
        if dossier.ledger.all_completed() && dossier.has_audit() {
            events.push(
                transition(&mut dossier, DossierStatus::Validated, actor, now)
                    .with_kind(EventKind::DossierValidated),
            );
        }

        self.commit(dossier, expected_updated_at, events, now)
    }

    /// Expert puts a quote on the table (or re-proposes after a refusal).
    pub fn propose_quote(
        &self,
        id: &DossierId,
        proposal: QuoteProposal,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let mut dossier = self.load(id, expected_updated_at)?;
        self.ensure_quote_open(&dossier)?;
        self.ensure_expert_party(&dossier, actor)?;

        quote::propose(
            &mut dossier.quote,
            proposal,
            actor,
            now,
            chrono::Duration::days(self.settings.quote_validity_days),
        )?;
        let event = stamp(&dossier, actor, now).with_kind(EventKind::QuoteProposed);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Client accepts the pending quote; a payment step is scheduled if the
    /// ledger does not already carry one.
    pub fn accept_quote(
        &self,
        id: &DossierId,
        comment: Option<&str>,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let mut dossier = self.load(id, expected_updated_at)?;
        self.ensure_quote_open(&dossier)?;
        self.ensure_client_party(&dossier, actor)?;

        quote::accept(&mut dossier.quote, comment, actor, now)?;
        let assignee = dossier
            .expert_id
            .as_deref()
            .map(|expert| ActorRef::new(expert, ActorKind::Expert));
        dossier
            .ledger
            .ensure_payment_step(&dossier.id, "Invoicing & installation", assignee, now);
        dossier.progress = dossier.ledger.progress();

        let event = stamp(&dossier, actor, now).with_kind(EventKind::QuoteAccepted);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Client refuses the pending quote; the refusal reason is mandatory.
    pub fn reject_quote(
        &self,
        id: &DossierId,
        comment: &str,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let mut dossier = self.load(id, expected_updated_at)?;
        self.ensure_quote_open(&dossier)?;
        self.ensure_client_party(&dossier, actor)?;

        quote::reject(&mut dossier.quote, comment, actor, now)?;
        let event = stamp(&dossier, actor, now).with_kind(EventKind::QuoteRejected);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Client asks for more information on the pending quote.
    pub fn request_quote_info(
        &self,
        id: &DossierId,
        comment: &str,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let mut dossier = self.load(id, expected_updated_at)?;
        self.ensure_quote_open(&dossier)?;
        self.ensure_client_party(&dossier, actor)?;

        quote::request_info(&mut dossier.quote, comment, actor, now)?;
        let event = stamp(&dossier, actor, now).with_kind(EventKind::QuoteInfoRequested);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Expert answers an info request, re-opening the proposal.
    pub fn respond_quote_info(
        &self,
        id: &DossierId,
        comment: &str,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let mut dossier = self.load(id, expected_updated_at)?;
        self.ensure_quote_open(&dossier)?;
        self.ensure_expert_party(&dossier, actor)?;

        quote::respond(&mut dossier.quote, comment, actor, now)?;
        let event = stamp(&dossier, actor, now).with_kind(EventKind::QuoteInfoProvided);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Record the audit conclusion. One-shot per dossier; the admin amend
    /// flag appends a superseding record instead. Transitions to `validated`
    /// when every step is already complete.
    pub fn finalize_audit(
        &self,
        id: &DossierId,
        input: AuditInput,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        if input.amend && !actor.is_admin() {
            return Err(
                DossierError::Validation("amending an audit is reserved for administrators").into(),
            );
        }

        let mut dossier = self.load(id, expected_updated_at)?;
        self.ensure_expert_party(&dossier, actor)?;
        // Admin amendments remain possible after validation; the initial
        // finalize only happens while the work is underway.
        let amend_after_validation = input.amend && dossier.status == DossierStatus::Validated;
        if dossier.status != DossierStatus::InProgress && !amend_after_validation {
            return Err(DossierError::Validation(
                "audit can only be finalized while the dossier is in progress",
            )
            .into());
        }

        let result = settlement::finalize_audit(
            &mut dossier.audits,
            dossier.estimated_amount,
            self.settings.default_client_fee_percentage,
            input,
            actor.clone(),
            now,
        )?;
        dossier.estimated_amount = Some(result.montant_final);

        let kind = if result.amends {
            EventKind::AuditAmended
        } else {
            EventKind::AuditFinalized
        };
        let mut events = vec![stamp(&dossier, actor, now).with_kind(kind)];

        if dossier.ledger.all_completed() && dossier.status != DossierStatus::Validated {
            events.push(
                transition(&mut dossier, DossierStatus::Validated, actor, now)
                    .with_kind(EventKind::DossierValidated),
            );
        }

        self.commit(dossier, expected_updated_at, events, now)
    }

    /// Close the dossier after the refund/invoice has been paid out. Legal
    /// only from `validated`.
    pub fn confirm_payment(
        &self,
        id: &DossierId,
        invoice_id: &str,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        if actor.kind == ActorKind::Expert {
            return Err(DossierError::Validation(
                "payment confirmation is reserved for the client or administrators",
            )
            .into());
        }
        if invoice_id.trim().is_empty() {
            return Err(DossierError::Validation("invoice_id is required").into());
        }

        let mut dossier = self.load(id, expected_updated_at)?;
        if dossier.status != DossierStatus::Validated {
            return Err(DossierError::InvalidTransition {
                from: dossier.status.label(),
                to: DossierStatus::RefundCompleted.label(),
            }
            .into());
        }

        dossier.invoice_id = Some(invoice_id.to_string());
        dossier.progress = 100;
        let event = transition(&mut dossier, DossierStatus::RefundCompleted, actor, now)
            .with_kind(EventKind::PaymentConfirmed);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Terminal refusal from any non-terminal state; the reason is mandatory
    /// and kept on the aggregate.
    pub fn reject_dossier(
        &self,
        id: &DossierId,
        reason: &str,
        actor: &ActorRef,
        expected_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        if reason.trim().is_empty() {
            return Err(DossierError::Validation("a rejection reason is required").into());
        }

        let mut dossier = self.load(id, expected_updated_at)?;
        if dossier.status.is_terminal() {
            return Err(DossierError::InvalidTransition {
                from: dossier.status.label(),
                to: DossierStatus::Rejected.label(),
            }
            .into());
        }

        dossier.rejection = Some(super::domain::Rejection {
            reason: reason.trim().to_string(),
            actor: actor.clone(),
            at: now,
        });
        let event = transition(&mut dossier, DossierStatus::Rejected, actor, now)
            .with_kind(EventKind::DossierRejected);
        self.commit(dossier, expected_updated_at, vec![event], now)
    }

    /// Read-only snapshot for UI layers.
    pub fn snapshot(
        &self,
        id: &DossierId,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        let dossier = self.fetch(id)?;
        Ok(DossierSnapshot::project(&dossier, now))
    }

    /// Overdue projection across every stored dossier, for external SLA
    /// sweeps. Pure read; nothing transitions.
    pub fn overdue_report(&self, now: DateTime<Utc>) -> Result<Vec<OverdueEntry>, OrchestratorError> {
        let mut entries: Vec<OverdueEntry> = self
            .repository
            .list()
            .map_err(from_repository)?
            .iter()
            .flat_map(|dossier| {
                dossier
                    .ledger
                    .overdue_view(now)
                    .into_iter()
                    .map(|step| OverdueEntry {
                        dossier_id: dossier.id.clone(),
                        dossier_status: dossier.status,
                        step: StepView::project(step, now),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by(|a, b| a.step.due_date.cmp(&b.step.due_date));
        Ok(entries)
    }

    fn fetch(&self, id: &DossierId) -> Result<Dossier, OrchestratorError> {
        self.repository
            .fetch(id)
            .map_err(from_repository)?
            .ok_or(OrchestratorError::Engine(DossierError::NotFound))
    }

    /// Fetch plus the early half of the optimistic check; the repository's
    /// compare-and-swap at commit time is the authoritative one.
    fn load(
        &self,
        id: &DossierId,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Dossier, OrchestratorError> {
        let dossier = self.fetch(id)?;
        if dossier.updated_at != expected_updated_at {
            return Err(OrchestratorError::Engine(
                DossierError::ConcurrentModification,
            ));
        }
        Ok(dossier)
    }

    fn ensure_quote_open(&self, dossier: &Dossier) -> Result<(), OrchestratorError> {
        if !dossier.status.accepts_step_updates() {
            return Err(
                DossierError::Validation("quote operations require an active dossier").into(),
            );
        }
        Ok(())
    }

    fn ensure_expert_party(
        &self,
        dossier: &Dossier,
        actor: &ActorRef,
    ) -> Result<(), OrchestratorError> {
        if !actor.acts_as(ActorKind::Expert) {
            return Err(
                DossierError::Validation("this operation is reserved for the assigned expert")
                    .into(),
            );
        }
        if actor.kind == ActorKind::Expert && dossier.expert_id.as_deref() != Some(actor.id.as_str())
        {
            return Err(DossierError::Validation("dossier is not assigned to this expert").into());
        }
        Ok(())
    }

    fn ensure_client_party(
        &self,
        dossier: &Dossier,
        actor: &ActorRef,
    ) -> Result<(), OrchestratorError> {
        if !actor.acts_as(ActorKind::Client) {
            return Err(
                DossierError::Validation("this operation is reserved for the dossier's client")
                    .into(),
            );
        }
        if actor.kind == ActorKind::Client && dossier.client_id != actor.id {
            return Err(DossierError::Validation("dossier does not belong to this client").into());
        }
        Ok(())
    }

    /// Commit the mutated aggregate, then append the accepted transitions to
    /// the outbox. The version check happens inside the repository update.
    fn commit(
        &self,
        mut dossier: Dossier,
        expected_updated_at: DateTime<Utc>,
        events: Vec<DomainEvent>,
        now: DateTime<Utc>,
    ) -> Result<DossierSnapshot, OrchestratorError> {
        dossier.updated_at = now;
        let stored = self
            .repository
            .update(dossier, expected_updated_at)
            .map_err(from_repository)?;
        for event in events {
            info!(
                dossier = %event.dossier_id,
                kind = event.kind.label(),
                actor = event.actor.kind.label(),
                "domain event"
            );
            self.outbox.publish(event)?;
        }
        Ok(DossierSnapshot::project(&stored, now))
    }
}

/// Event under construction: status change applied, kind still pending.
struct PendingEvent {
    dossier_id: DossierId,
    actor: ActorRef,
    before_status: DossierStatus,
    after_status: DossierStatus,
    at: DateTime<Utc>,
}

impl PendingEvent {
    fn with_kind(self, kind: EventKind) -> DomainEvent {
        DomainEvent {
            dossier_id: self.dossier_id,
            kind,
            actor: self.actor,
            before_status: self.before_status,
            after_status: self.after_status,
            at: self.at,
        }
    }
}

/// Apply a status transition and capture before/after for the event.
fn transition(
    dossier: &mut Dossier,
    to: DossierStatus,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> PendingEvent {
    let before = dossier.status;
    dossier.status = to;
    PendingEvent {
        dossier_id: dossier.id.clone(),
        actor: actor.clone(),
        before_status: before,
        after_status: to,
        at: now,
    }
}

/// Event for an accepted operation that leaves the dossier status in place.
fn stamp(dossier: &Dossier, actor: &ActorRef, now: DateTime<Utc>) -> PendingEvent {
    PendingEvent {
        dossier_id: dossier.id.clone(),
        actor: actor.clone(),
        before_status: dossier.status,
        after_status: dossier.status,
        at: now,
    }
}
