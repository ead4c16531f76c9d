use super::domain::{ActorKind, Priority, ProductCategory, StepType};

/// Blueprint for one step of a product's canonical chain. Instantiated into
/// concrete steps when an expert is assigned.
#[derive(Debug, Clone)]
pub struct StepTemplate {
    pub name: &'static str,
    pub step_type: StepType,
    pub owner: ActorKind,
    pub priority: Priority,
    pub estimated_duration_minutes: u32,
    pub due_in_days: Option<i64>,
}

/// Registry boundary: given a product category, return the ordered canonical
/// step list used to seed a dossier's ledger.
pub trait StepTemplateSource: Send + Sync {
    fn templates_for(&self, category: ProductCategory) -> Vec<StepTemplate>;
}

/// Built-in registry carrying the canonical chains per product family.
#[derive(Debug, Default)]
pub struct StandardTemplateRegistry;

impl StandardTemplateRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl StepTemplateSource for StandardTemplateRegistry {
    fn templates_for(&self, category: ProductCategory) -> Vec<StepTemplate> {
        match category {
            ProductCategory::FiscalRefund => fiscal_refund_templates(),
            ProductCategory::SocialContributions => social_contributions_templates(),
            ProductCategory::EquipmentDistribution => equipment_distribution_templates(),
        }
    }
}

fn fiscal_refund_templates() -> Vec<StepTemplate> {
    vec![
        StepTemplate {
            name: "Eligibility validation",
            step_type: StepType::Validation,
            owner: ActorKind::Admin,
            priority: Priority::High,
            estimated_duration_minutes: 240,
            due_in_days: Some(2),
        },
        StepTemplate {
            name: "Fuel and activity document collection",
            step_type: StepType::Documentation,
            owner: ActorKind::Client,
            priority: Priority::High,
            estimated_duration_minutes: 480,
            due_in_days: Some(7),
        },
        StepTemplate {
            name: "Expert audit",
            step_type: StepType::Expertise,
            owner: ActorKind::Expert,
            priority: Priority::Medium,
            estimated_duration_minutes: 960,
            due_in_days: Some(21),
        },
        StepTemplate {
            name: "Client approval of audit result",
            step_type: StepType::Approval,
            owner: ActorKind::Client,
            priority: Priority::High,
            estimated_duration_minutes: 120,
            due_in_days: Some(25),
        },
        StepTemplate {
            name: "Refund payment",
            step_type: StepType::Payment,
            owner: ActorKind::Admin,
            priority: Priority::Medium,
            estimated_duration_minutes: 240,
            due_in_days: Some(40),
        },
    ]
}

fn social_contributions_templates() -> Vec<StepTemplate> {
    vec![
        StepTemplate {
            name: "Eligibility validation",
            step_type: StepType::Validation,
            owner: ActorKind::Admin,
            priority: Priority::High,
            estimated_duration_minutes: 240,
            due_in_days: Some(2),
        },
        StepTemplate {
            name: "Payroll document collection",
            step_type: StepType::Documentation,
            owner: ActorKind::Client,
            priority: Priority::High,
            estimated_duration_minutes: 480,
            due_in_days: Some(10),
        },
        StepTemplate {
            name: "Contributions audit",
            step_type: StepType::Expertise,
            owner: ActorKind::Expert,
            priority: Priority::Medium,
            estimated_duration_minutes: 720,
            due_in_days: Some(30),
        },
        StepTemplate {
            name: "Client approval of audit result",
            step_type: StepType::Approval,
            owner: ActorKind::Client,
            priority: Priority::High,
            estimated_duration_minutes: 120,
            due_in_days: Some(35),
        },
        StepTemplate {
            name: "Recovery payment",
            step_type: StepType::Payment,
            owner: ActorKind::Admin,
            priority: Priority::Medium,
            estimated_duration_minutes: 240,
            due_in_days: Some(50),
        },
    ]
}

// Distribution products skip the audit chain: the expert quotes, the client
// validates, the expert invoices and installs.
fn equipment_distribution_templates() -> Vec<StepTemplate> {
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
        StepTemplate {
            name: "Invoicing & installation",
            step_type: StepType::Payment,
            owner: ActorKind::Expert,
            priority: Priority::High,
            estimated_duration_minutes: 120,
            due_in_days: Some(21),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_products_end_with_a_payment_step() {
        let registry = StandardTemplateRegistry::new();
        for category in [
            ProductCategory::FiscalRefund,
            ProductCategory::SocialContributions,
        ] {
            let templates = registry.templates_for(category);
            assert_eq!(templates.len(), 5, "{category:?} carries the full chain");
            assert_eq!(templates[0].step_type, StepType::Validation);
            assert!(templates
                .iter()
                .any(|template| template.step_type == StepType::Expertise));
            assert_eq!(
                templates.last().map(|template| template.step_type),
                Some(StepType::Payment)
            );
        }
    }

    #[test]
    fn distribution_products_use_the_short_chain() {
        let registry = StandardTemplateRegistry::new();
        let templates = registry.templates_for(ProductCategory::EquipmentDistribution);
        assert_eq!(templates.len(), 3);
        assert!(templates
            .iter()
            .all(|template| template.step_type != StepType::Expertise));
        assert_eq!(templates[1].name, "Quote & validation");
    }

    #[test]
    fn due_offsets_are_ordered_within_each_chain() {
        let registry = StandardTemplateRegistry::new();
        for category in ProductCategory::ordered() {
            let offsets: Vec<i64> = registry
                .templates_for(category)
                .iter()
                .filter_map(|template| template.due_in_days)
                .collect();
            assert!(
                offsets.windows(2).all(|pair| pair[0] <= pair[1]),
                "{category:?} due dates must not run backwards"
            );
        }
    }
}
