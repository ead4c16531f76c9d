//! Dossier workflow engine: lifecycle orchestration, step ledger, quote
//! negotiation, and settlement for fiscal optimization dossiers.
//!
//! The aggregate commits as a whole behind an optimistic version fence; every
//! accepted transition appends a domain event to the outbox for the external
//! notification dispatcher.

pub mod domain;
pub mod events;
mod ledger;
pub mod quote;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod settlement;
pub mod template;

#[cfg(test)]
mod tests;

pub use domain::{
    ActorKind, ActorRef, DocumentRef, Dossier, DossierError, DossierId, DossierStatus, Priority,
    ProductCategory, ProductRef, Rejection, Step, StepId, StepStatus, StepType,
};
pub use events::{DomainEvent, EventKind, EventPriority, EventSink, OutboxError};
pub use ledger::{LedgerSignal, StepAdvance, StepLedger};
pub use quote::{Quote, QuoteAmounts, QuoteComment, QuoteProposal, QuoteStatus};
pub use report::{AuditView, DossierSnapshot, OverdueEntry, StepView};
pub use repository::{DossierRepository, RepositoryError};
pub use router::dossier_router;
pub use service::{
    DossierOrchestrator, EngineSettings, NewDossier, OrchestratorError,
};
pub use settlement::{compute_commission, AuditInput, AuditResult, Settlement};
pub use template::{StandardTemplateRegistry, StepTemplate, StepTemplateSource};
