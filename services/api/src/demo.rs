use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;
use dossier_engine::error::AppError;
use dossier_engine::workflows::dossier::{
    ActorKind, ActorRef, AuditInput, DossierOrchestrator, DossierSnapshot, EngineSettings,
    NewDossier, Priority, ProductCategory, ProductRef, QuoteAmounts, QuoteProposal,
    StandardTemplateRegistry, StepStatus, StepTemplateSource,
};

use crate::infra::{InMemoryDossierRepository, InMemoryEventOutbox};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Platform commission rate applied when no negotiated rate exists
    #[arg(long)]
    pub(crate) default_fee_rate: Option<f64>,
    /// Skip the distribution-product quote negotiation portion of the demo
    #[arg(long)]
    pub(crate) skip_quote: bool,
}

type DemoOrchestrator = DossierOrchestrator<InMemoryDossierRepository, InMemoryEventOutbox>;

fn build_engine(default_fee_rate: Option<f64>) -> (Arc<DemoOrchestrator>, Arc<InMemoryEventOutbox>) {
    let outbox = Arc::new(InMemoryEventOutbox::default());
    let settings = EngineSettings {
        default_client_fee_percentage: default_fee_rate.unwrap_or(0.15),
        ..EngineSettings::default()
    };
    let orchestrator = Arc::new(DossierOrchestrator::new(
        Arc::new(InMemoryDossierRepository::default()),
        outbox.clone(),
        Arc::new(StandardTemplateRegistry::new()),
        settings,
    ));
    (orchestrator, outbox)
}

fn print_steps(snapshot: &DossierSnapshot) {
    for step in &snapshot.steps {
        println!(
            "  - [{}] {} ({}) | {}% | due {}",
            step.status_label,
            step.name,
            step.type_label,
            step.progress,
            step.due_date
                .map(|due| due.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
}

pub(crate) fn run_templates() -> Result<(), AppError> {
    let registry = StandardTemplateRegistry::new();
    for category in ProductCategory::ordered() {
        println!("{}", category.label());
        for template in registry.templates_for(category) {
            println!(
                "  - {} ({}) | owner {} | ~{} min | due +{}d",
                template.name,
                template.step_type.label(),
                template.owner.label(),
                template.estimated_duration_minutes,
                template
                    .due_in_days
                    .map(|days| days.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let (engine, outbox) = build_engine(args.default_fee_rate);
    let admin = ActorRef::new("adm-demo", ActorKind::Admin);
    let client = ActorRef::new("cli-demo", ActorKind::Client);
    let expert = ActorRef::new("exp-demo", ActorKind::Expert);

    println!("Dossier workflow demo");

    let mut now = Utc::now();
    let created = engine.register_eligible(
        NewDossier {
            client_id: client.id.clone(),
            product: ProductRef {
                id: "prd-ticpe".to_string(),
                name: "Fuel tax recovery".to_string(),
                category: ProductCategory::FiscalRefund,
            },
            priority: Priority::High,
            estimated_amount: Some(12_000.0),
            provenance: std::collections::BTreeMap::new(),
        },
        now,
    )?;
    println!(
        "- Registered {} for client {} -> status {}",
        created.id, created.client_id, created.status_label
    );

    now += Duration::minutes(1);
    let mut snapshot = engine.assign_expert(&created.id, &expert.id, &admin, created.updated_at, now)?;
    println!(
        "- Assigned expert {} -> {} steps seeded",
        expert.id,
        snapshot.steps.len()
    );
    print_steps(&snapshot);

    let step_ids: Vec<_> = snapshot.steps.iter().map(|step| step.id.clone()).collect();
    for (index, step_id) in step_ids.iter().enumerate() {
        now += Duration::minutes(1);
        snapshot =
            engine.record_step_update(&snapshot.id, step_id, StepStatus::InProgress, &expert, snapshot.updated_at, now)?;
        now += Duration::minutes(1);
        snapshot =
            engine.record_step_update(&snapshot.id, step_id, StepStatus::Completed, &expert, snapshot.updated_at, now)?;
        println!(
            "- Completed step {}/{} -> progress {}% | status {}",
            index + 1,
            step_ids.len(),
            snapshot.progress,
            snapshot.status_label
        );

        // The audit concludes before the final payment step.
        if index + 2 == step_ids.len() {
            now += Duration::minutes(1);
            snapshot = engine.finalize_audit(
                &snapshot.id,
                AuditInput {
                    montant_final: 9_500.0,
                    rapport_detaille: "Recoverable fuel taxes verified against carrier logs."
                        .to_string(),
                    notes: String::new(),
                    client_fee_percentage_negotiated: Some(0.1),
                    amend: false,
                },
                &expert,
                snapshot.updated_at,
                now,
            )?;
            let audit = snapshot.audit.as_ref().expect("audit just finalized");
            println!(
                "- Audit finalized: {} EUR recovered | commission {} EUR | net client {} EUR",
                audit.result.montant_final,
                audit.settlement.commission_amount,
                audit.settlement.net_client
            );
        }
    }

    now += Duration::minutes(1);
    snapshot = engine.confirm_payment(&snapshot.id, "inv-demo-001", &admin, snapshot.updated_at, now)?;
    println!(
        "- Payment confirmed -> status {} | progress {}%",
        snapshot.status_label, snapshot.progress
    );

    if !args.skip_quote {
        println!("\nQuote negotiation demo (distribution product)");
        now += Duration::minutes(1);
        let created = engine.register_eligible(
            NewDossier {
                client_id: client.id.clone(),
                product: ProductRef {
                    id: "prd-chrono".to_string(),
                    name: "Tachograph fleet equipment".to_string(),
                    category: ProductCategory::EquipmentDistribution,
                },
                priority: Priority::Medium,
                estimated_amount: None,
                provenance: std::collections::BTreeMap::new(),
            },
            now,
        )?;
        now += Duration::minutes(1);
        let assigned =
            engine.assign_expert(&created.id, &expert.id, &admin, created.updated_at, now)?;

        now += Duration::minutes(1);
        let proposed = engine.propose_quote(
            &assigned.id,
            QuoteProposal {
                amounts: QuoteAmounts {
                    unit_count: Some(8),
                    unit_price: Some(1_050.0),
                    total: 8_400.0,
                },
                valid_until: None,
                document: None,
                comment: Some("Covers supply, installation, and calibration.".to_string()),
            },
            &expert,
            assigned.updated_at,
            now,
        )?;
        let quote = proposed.quote.as_ref().expect("quote just proposed");
        println!(
            "- Quote proposed: {} EUR, valid until {}",
            quote.amounts.total,
            quote.valid_until.format("%Y-%m-%d")
        );

        now += Duration::minutes(1);
        let questioned = engine.request_quote_info(
            &proposed.id,
            "Does the price include maintenance?",
            &client,
            proposed.updated_at,
            now,
        )?;
        now += Duration::minutes(1);
        let answered = engine.respond_quote_info(
            &questioned.id,
            "First year of maintenance included.",
            &expert,
            questioned.updated_at,
            now,
        )?;
        now += Duration::minutes(1);
        let accepted = engine.accept_quote(
            &answered.id,
            Some("Proceed with installation."),
            &client,
            answered.updated_at,
            now,
        )?;
        let quote = accepted.quote.as_ref().expect("quote accepted");
        println!(
            "- Quote accepted after {} comment(s) -> status {}",
            quote.comments.len(),
            quote.status.label()
        );
    }

    println!("\nOutbox ({} events emitted)", outbox.events().len());
    for event in outbox.events() {
        println!(
            "  - {} | {} | {} -> {} | by {}",
            event.at.format("%H:%M"),
            event.kind.label(),
            event.before_status.label(),
            event.after_status.label(),
            event.actor.kind.label()
        );
    }

    Ok(())
}
