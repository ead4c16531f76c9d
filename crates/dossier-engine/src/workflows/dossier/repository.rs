use chrono::{DateTime, Utc};

use super::domain::{Dossier, DossierId};

/// Storage abstraction for the dossier aggregate. The aggregate commits as a
/// whole; `update` is a compare-and-swap on `updated_at` so no writer can
/// commit on a stale read.
pub trait DossierRepository: Send + Sync {
    fn insert(&self, dossier: Dossier) -> Result<Dossier, RepositoryError>;
    fn fetch(&self, id: &DossierId) -> Result<Option<Dossier>, RepositoryError>;
    /// Replace the stored aggregate iff its `updated_at` still equals
    /// `expected_updated_at`; `VersionConflict` otherwise.
    fn update(
        &self,
        dossier: Dossier,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<Dossier, RepositoryError>;
    fn list(&self) -> Result<Vec<Dossier>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("dossier already exists")]
    Conflict,
    #[error("dossier not found")]
    NotFound,
    #[error("stale read: dossier was updated by another writer")]
    VersionConflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
