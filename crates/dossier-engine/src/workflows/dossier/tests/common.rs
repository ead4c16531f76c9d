use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::dossier::domain::{
    ActorKind, ActorRef, Dossier, DossierId, Priority, ProductCategory, ProductRef, StepType,
};
use crate::workflows::dossier::events::{DomainEvent, EventSink, OutboxError};
use crate::workflows::dossier::repository::{DossierRepository, RepositoryError};
use crate::workflows::dossier::service::{
    DossierOrchestrator, EngineSettings, NewDossier, OrchestratorError,
};
use crate::workflows::dossier::template::{StepTemplate, StepTemplateSource};
use crate::workflows::dossier::DossierError;

/// Compare-and-swap in-memory store mirroring the production adapter.
#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<DossierId, Dossier>>,
}

impl DossierRepository for MemoryRepository {
    fn insert(&self, dossier: Dossier) -> Result<Dossier, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&dossier.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(dossier.id.clone(), dossier.clone());
        Ok(dossier)
    }

    fn fetch(&self, id: &DossierId) -> Result<Option<Dossier>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(
        &self,
        dossier: Dossier,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Dossier, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard
            .get(&dossier.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.updated_at != expected_updated_at {
            return Err(RepositoryError::VersionConflict);
        }
        guard.insert(dossier.id.clone(), dossier.clone());
        Ok(dossier)
    }

    fn list(&self) -> Result<Vec<Dossier>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

/// Repository that refuses every call, for infrastructure-failure paths.
pub(super) struct UnavailableRepository;

impl DossierRepository for UnavailableRepository {
    fn insert(&self, _dossier: Dossier) -> Result<Dossier, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn fetch(&self, _id: &DossierId) -> Result<Option<Dossier>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn update(
        &self,
        _dossier: Dossier,
        _expected_updated_at: DateTime<Utc>,
    ) -> Result<Dossier, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }

    fn list(&self) -> Result<Vec<Dossier>, RepositoryError> {
        Err(RepositoryError::Unavailable("store offline".to_string()))
    }
}

/// Outbox capturing every published event for assertions.
#[derive(Default)]
pub(super) struct MemoryOutbox {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryOutbox {
    pub(super) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("outbox mutex poisoned").clone()
    }
}

impl EventSink for MemoryOutbox {
    fn publish(&self, event: DomainEvent) -> Result<(), OutboxError> {
        self.events
            .lock()
            .expect("outbox mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Minimal three-step chain: validation, documentation, payment.
pub(super) struct ThreeStepTemplates;

impl StepTemplateSource for ThreeStepTemplates {
    fn templates_for(&self, _category: ProductCategory) -> Vec<StepTemplate> {
        vec![
            StepTemplate {
                name: "Eligibility validation",
                step_type: StepType::Validation,
                owner: ActorKind::Admin,
                priority: Priority::High,
                estimated_duration_minutes: 120,
                due_in_days: Some(2),
            },
            StepTemplate {
                name: "Document collection",
                step_type: StepType::Documentation,
                owner: ActorKind::Client,
                priority: Priority::High,
                estimated_duration_minutes: 240,
                due_in_days: Some(7),
            },
            StepTemplate {
                name: "Refund payment",
                step_type: StepType::Payment,
                owner: ActorKind::Admin,
                priority: Priority::Medium,
                estimated_duration_minutes: 120,
                due_in_days: Some(21),
            },
        ]
    }
}

/// Chain with no payment step, to exercise the accept-quote append.
pub(super) struct NoPaymentTemplates;

impl StepTemplateSource for NoPaymentTemplates {
    fn templates_for(&self, _category: ProductCategory) -> Vec<StepTemplate> {
        vec![
            StepTemplate {
                name: "Initial checks",
                step_type: StepType::Validation,
                owner: ActorKind::Client,
                priority: Priority::High,
                estimated_duration_minutes: 60,
                due_in_days: Some(1),
            },
            StepTemplate {
                name: "Quote & validation",
                step_type: StepType::Approval,
                owner: ActorKind::Expert,
                priority: Priority::High,
                estimated_duration_minutes: 120,
                due_in_days: Some(7),
            },
        ]
    }
}

pub(super) type TestOrchestrator = DossierOrchestrator<MemoryRepository, MemoryOutbox>;

pub(super) fn build_orchestrator(
    templates: Arc<dyn StepTemplateSource>,
) -> (Arc<TestOrchestrator>, Arc<MemoryRepository>, Arc<MemoryOutbox>) {
    let repository = Arc::new(MemoryRepository::default());
    let outbox = Arc::new(MemoryOutbox::default());
    let orchestrator = Arc::new(DossierOrchestrator::new(
        repository.clone(),
        outbox.clone(),
        templates,
        EngineSettings::default(),
    ));
    (orchestrator, repository, outbox)
}

pub(super) fn admin() -> ActorRef {
    ActorRef::new("adm-1", ActorKind::Admin)
}

pub(super) fn client() -> ActorRef {
    ActorRef::new("cli-1", ActorKind::Client)
}

pub(super) fn expert() -> ActorRef {
    ActorRef::new("exp-1", ActorKind::Expert)
}

pub(super) fn product(category: ProductCategory) -> ProductRef {
    ProductRef {
        id: "prd-ticpe".to_string(),
        name: "Fuel tax recovery".to_string(),
        category,
    }
}

pub(super) fn new_dossier(category: ProductCategory) -> NewDossier {
    NewDossier {
        client_id: "cli-1".to_string(),
        product: product(category),
        priority: Priority::High,
        estimated_amount: Some(12_000.0),
        provenance: std::collections::BTreeMap::new(),
    }
}

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 24, 9, 0, 0)
        .single()
        .expect("valid base time")
}

pub(super) fn at(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

pub(super) fn engine_err(err: OrchestratorError) -> DossierError {
    match err {
        OrchestratorError::Engine(engine) => engine,
        other => panic!("expected engine error, got {other:?}"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is json")
}
