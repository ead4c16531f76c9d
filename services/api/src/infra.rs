use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dossier_engine::config::EngineConfig;
use dossier_engine::workflows::dossier::{
    DomainEvent, Dossier, DossierId, DossierRepository, EngineSettings, EventSink, OutboxError,
    RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory aggregate store. `update` is the compare-and-swap the engine
/// relies on for its optimistic concurrency fence.
#[derive(Default, Clone)]
pub(crate) struct InMemoryDossierRepository {
    records: Arc<Mutex<HashMap<DossierId, Dossier>>>,
}

impl DossierRepository for InMemoryDossierRepository {
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
        let stored = guard.get(&dossier.id).ok_or(RepositoryError::NotFound)?;
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

/// Append-only outbox. A separate dispatcher drains it towards recipients;
/// the engine never waits on delivery.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEventOutbox {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl EventSink for InMemoryEventOutbox {
    fn publish(&self, event: DomainEvent) -> Result<(), OutboxError> {
        let mut guard = self.events.lock().expect("outbox mutex poisoned");
        guard.push(event);
        Ok(())
    }
}

impl InMemoryEventOutbox {
    pub(crate) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("outbox mutex poisoned").clone()
    }
}

pub(crate) fn engine_settings(config: &EngineConfig) -> EngineSettings {
    EngineSettings {
        default_client_fee_percentage: config.default_client_fee_percentage,
        quote_validity_days: config.quote_validity_days,
    }
}
