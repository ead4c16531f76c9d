use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ActorKind, ActorRef, DossierError, DossierId, Priority, Step, StepId, StepStatus, StepType,
};
use super::template::StepTemplate;

/// Signal the ledger hands back to the orchestrator so it can stamp the
/// matching domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerSignal {
    Started,
    Completed,
    Blocked,
    Unblocked,
}

/// Outcome of an accepted advance: the post-transition step and the signal
/// describing what happened.
#[derive(Debug, Clone)]
pub struct StepAdvance {
    pub step: Step,
    pub signal: LedgerSignal,
}

/// Ordered list of steps for one dossier plus the single-active-step cursor.
/// Embedded in the aggregate; all mutations commit with the dossier row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLedger {
    steps: Vec<Step>,
    current_step_index: usize,
}

impl StepLedger {
    pub fn empty() -> Self {
        Self {
            steps: Vec::new(),
            current_step_index: 0,
        }
    }

    /// Instantiate the canonical template chain for a freshly assigned
    /// dossier. Steps owned by the expert are assigned to the incoming
    /// expert; client/admin steps carry the matching party.
    pub fn seed(
        dossier_id: &DossierId,
        templates: &[StepTemplate],
        client_id: &str,
        expert_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let steps = templates
            .iter()
            .enumerate()
            .map(|(index, template)| {
                let assignee = match template.owner {
                    ActorKind::Client => Some(ActorRef::new(client_id, ActorKind::Client)),
                    ActorKind::Expert => Some(ActorRef::new(expert_id, ActorKind::Expert)),
                    ActorKind::Admin => None,
                };
                Step {
                    id: StepId(format!("{dossier_id}-step-{:02}", index + 1)),
                    name: template.name.to_string(),
                    step_type: template.step_type,
                    status: StepStatus::Pending,
                    assignee,
                    priority: template.priority,
                    due_date: template.due_in_days.map(|days| now + Duration::days(days)),
                    estimated_duration_minutes: template.estimated_duration_minutes,
                    progress: 0,
                    completed_at: None,
                }
            })
            .collect();

        Self {
            steps,
            current_step_index: 0,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }

    pub fn all_completed(&self) -> bool {
        !self.steps.is_empty() && self.completed_count() == self.steps.len()
    }

    /// Whole-ledger progress in percent, integer division so a three-step
    /// chain reads 33 / 66 / 100.
    pub fn progress(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        ((self.completed_count() * 100) / self.steps.len()) as u8
    }

    pub fn find(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| &step.id == step_id)
    }

    /// Advance one step through the transition table, enforcing the
    /// single-active-step discipline: only the step under the cursor (or an
    /// already-blocked step) may move.
    pub fn advance(
        &mut self,
        step_id: &StepId,
        new_status: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<StepAdvance, DossierError> {
        let index = self
            .steps
            .iter()
            .position(|step| &step.id == step_id)
            .ok_or(DossierError::NotFound)?;

        let current = self.steps[index].status;
        if !current.can_transition_to(new_status) {
            return Err(DossierError::InvalidTransition {
                from: current.label(),
                to: new_status.label(),
            });
        }

        if index != self.current_step_index && current != StepStatus::Blocked {
            return Err(DossierError::OutOfOrder {
                step_id: step_id.clone(),
            });
        }

        let signal = match new_status {
            StepStatus::InProgress => LedgerSignal::Started,
            StepStatus::Completed => LedgerSignal::Completed,
            StepStatus::Blocked => LedgerSignal::Blocked,
            StepStatus::Pending => LedgerSignal::Unblocked,
        };

        let step = &mut self.steps[index];
        step.status = new_status;
        match new_status {
            StepStatus::InProgress => step.progress = 50,
            StepStatus::Completed => {
                step.progress = 100;
                step.completed_at = Some(now);
            }
            // Re-pickup starts from scratch; blocking freezes progress.
            StepStatus::Pending => step.progress = 0,
            StepStatus::Blocked => {}
        }

        self.recompute_cursor();

        Ok(StepAdvance {
            step: self.steps[index].clone(),
            signal,
        })
    }

    /// Idempotent payment-step append used when a quote is accepted. An
    /// existing payment step, whatever its status, suppresses the append.
    pub fn ensure_payment_step(
        &mut self,
        dossier_id: &DossierId,
        name: &str,
        assignee: Option<ActorRef>,
        now: DateTime<Utc>,
    ) -> bool {
        if self
            .steps
            .iter()
            .any(|step| step.step_type == StepType::Payment)
        {
            return false;
        }

        self.steps.push(Step {
            id: StepId(format!("{dossier_id}-step-{:02}", self.steps.len() + 1)),
            name: name.to_string(),
            step_type: StepType::Payment,
            status: StepStatus::Pending,
            assignee,
            priority: Priority::High,
            due_date: Some(now + Duration::days(21)),
            estimated_duration_minutes: 120,
            progress: 0,
            completed_at: None,
        });
        self.recompute_cursor();
        true
    }

    /// Pure read-time projection: steps whose due date has passed while they
    /// still sit in pending or in_progress. Never mutates, never stored.
    pub fn overdue_view(&self, now: DateTime<Utc>) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|step| step.is_overdue(now))
            .collect()
    }

    /// The cursor points at the in_progress step if there is one, otherwise
    /// the earliest pending step (so an unblocked early step is picked back
    /// up before later work), otherwise one past the end.
    fn recompute_cursor(&mut self) {
        self.current_step_index = self
            .steps
            .iter()
            .position(|step| step.status == StepStatus::InProgress)
            .or_else(|| {
                self.steps
                    .iter()
                    .position(|step| step.status == StepStatus::Pending)
            })
            .unwrap_or(self.steps.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::dossier::template::{StandardTemplateRegistry, StepTemplateSource};
    use crate::workflows::dossier::ProductCategory;

    fn seeded() -> StepLedger {
        let registry = StandardTemplateRegistry::new();
        StepLedger::seed(
            &DossierId("dos-000001".to_string()),
            &registry.templates_for(ProductCategory::EquipmentDistribution),
            "cli-1",
            "exp-1",
            Utc::now(),
        )
    }

    fn step_id(ledger: &StepLedger, index: usize) -> StepId {
        ledger.steps()[index].id.clone()
    }

    #[test]
    fn completing_the_current_step_moves_the_cursor() {
        let mut ledger = seeded();
        let now = Utc::now();
        let first = step_id(&ledger, 0);

        ledger
            .advance(&first, StepStatus::InProgress, now)
            .expect("start current step");
        assert_eq!(ledger.current_step_index(), 0);

        let advance = ledger
            .advance(&first, StepStatus::Completed, now)
            .expect("complete current step");
        assert_eq!(advance.signal, LedgerSignal::Completed);
        assert_eq!(ledger.current_step_index(), 1);
        assert_eq!(ledger.progress(), 33);
    }

    #[test]
    fn advancing_a_non_current_step_is_out_of_order() {
        let mut ledger = seeded();
        let now = Utc::now();
        let second = step_id(&ledger, 1);

        let err = ledger
            .advance(&second, StepStatus::InProgress, now)
            .expect_err("second step is not current");
        assert_eq!(err, DossierError::OutOfOrder { step_id: second });
        assert_eq!(ledger.current_step_index(), 0);
    }

    #[test]
    fn unblock_returns_to_pending_and_is_repicked_first() {
        let mut ledger = seeded();
        let now = Utc::now();
        let first = step_id(&ledger, 0);

        ledger
            .advance(&first, StepStatus::InProgress, now)
            .expect("start");
        ledger
            .advance(&first, StepStatus::Blocked, now)
            .expect("block");

        // Blocked steps cannot resume directly.
        let err = ledger
            .advance(&first, StepStatus::InProgress, now)
            .expect_err("blocked must pass through pending");
        assert!(matches!(err, DossierError::InvalidTransition { .. }));

        let advance = ledger
            .advance(&first, StepStatus::Pending, now)
            .expect("unblock");
        assert_eq!(advance.signal, LedgerSignal::Unblocked);
        assert_eq!(advance.step.progress, 0);
        assert_eq!(ledger.current_step_index(), 0);
    }

    #[test]
    fn payment_step_append_is_idempotent() {
        let mut ledger = seeded();
        let now = Utc::now();
        let id = DossierId("dos-000001".to_string());

        // The distribution chain already carries a payment step.
        assert!(!ledger.ensure_payment_step(&id, "Invoicing", None, now));

        let mut empty = StepLedger::empty();
        assert!(empty.ensure_payment_step(&id, "Invoicing", None, now));
        assert!(!empty.ensure_payment_step(&id, "Invoicing", None, now));
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn overdue_view_is_a_pure_projection() {
        let mut ledger = seeded();
        let now = Utc::now();
        let later = now + Duration::days(60);

        assert!(ledger.overdue_view(now).is_empty());
        let overdue = ledger.overdue_view(later);
        assert_eq!(overdue.len(), ledger.len());

        // Completed steps are never reported overdue.
        let first = step_id(&ledger, 0);
        ledger
            .advance(&first, StepStatus::InProgress, now)
            .expect("start");
        ledger
            .advance(&first, StepStatus::Completed, now)
            .expect("complete");
        assert_eq!(ledger.overdue_view(later).len(), ledger.len() - 1);
    }

    #[test]
    fn at_most_one_step_in_progress() {
        let mut ledger = seeded();
        let now = Utc::now();
        let first = step_id(&ledger, 0);
        let second = step_id(&ledger, 1);

        ledger
            .advance(&first, StepStatus::InProgress, now)
            .expect("start first");
        let err = ledger
            .advance(&second, StepStatus::InProgress, now)
            .expect_err("cursor still on first step");
        assert!(matches!(err, DossierError::OutOfOrder { .. }));

        let active = ledger
            .steps()
            .iter()
            .filter(|step| step.status == StepStatus::InProgress)
            .count();
        assert_eq!(active, 1);
    }
}
