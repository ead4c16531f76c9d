use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorRef, DossierError};

/// Commission and net amounts derived from an audit. Never stored; always
/// recomputed from the rates on the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Settlement {
    pub commission_amount: f64,
    pub net_client: f64,
}

/// Commission math: the negotiated rate wins when present, otherwise the
/// platform default applies. A negative or non-finite recovered amount is
/// treated as zero so the outputs can never go negative.
pub fn compute_commission(
    montant_final: f64,
    negotiated_rate: Option<f64>,
    default_rate: f64,
) -> Settlement {
    let montant = if montant_final.is_finite() && montant_final > 0.0 {
        montant_final
    } else {
        0.0
    };
    let rate = negotiated_rate.unwrap_or(default_rate);
    let commission_amount = montant * rate;
    Settlement {
        commission_amount,
        net_client: montant - commission_amount,
    }
}

/// Expert-submitted audit conclusion.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditInput {
    pub montant_final: f64,
    pub rapport_detaille: String,
    #[serde(default)]
    pub notes: String,
    pub client_fee_percentage_negotiated: Option<f64>,
    /// Admin-only: append a superseding record instead of failing with
    /// `AlreadyFinalized`.
    #[serde(default)]
    pub amend: bool,
}

/// Outcome of a completed audit. Appended once per dossier; an amend appends
/// a superseding record and keeps the prior one for audit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub montant_initial: f64,
    pub montant_final: f64,
    pub client_fee_percentage_negotiated: Option<f64>,
    pub client_fee_percentage_default: f64,
    pub commission_negotiated: bool,
    pub rapport_detaille: String,
    pub notes: String,
    pub completed_by: ActorRef,
    pub completed_at: DateTime<Utc>,
    pub amends: bool,
}

impl AuditResult {
    pub fn settlement(&self) -> Settlement {
        compute_commission(
            self.montant_final,
            self.client_fee_percentage_negotiated,
            self.client_fee_percentage_default,
        )
    }
}

/// Validate and append the audit conclusion. Writing is one-shot per dossier
/// (idempotency key is the dossier itself); only the amend flag may add a
/// superseding record on top.
pub fn finalize_audit(
    audits: &mut Vec<AuditResult>,
    montant_initial: Option<f64>,
    default_rate: f64,
    input: AuditInput,
    actor: ActorRef,
    now: DateTime<Utc>,
) -> Result<AuditResult, DossierError> {
    if !audits.is_empty() && !input.amend {
        return Err(DossierError::AlreadyFinalized);
    }
    if !input.montant_final.is_finite() || input.montant_final < 0.0 {
        return Err(DossierError::Validation(
            "montant_final must be a non-negative amount",
        ));
    }
    if input.rapport_detaille.trim().is_empty() {
        return Err(DossierError::Validation("rapport_detaille is required"));
    }
    if let Some(rate) = input.client_fee_percentage_negotiated {
        if !rate.is_finite() || !(0.0..=1.0).contains(&rate) {
            return Err(DossierError::Validation(
                "negotiated fee percentage must lie between 0 and 1",
            ));
        }
    }

    let result = AuditResult {
        montant_initial: montant_initial.unwrap_or(input.montant_final),
        montant_final: input.montant_final,
        commission_negotiated: input.client_fee_percentage_negotiated.is_some(),
        client_fee_percentage_negotiated: input.client_fee_percentage_negotiated,
        client_fee_percentage_default: default_rate,
        rapport_detaille: input.rapport_detaille,
        notes: input.notes,
        completed_by: actor,
        completed_at: now,
        amends: !audits.is_empty(),
    };
    audits.push(result.clone());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::dossier::ActorKind;

    fn expert() -> ActorRef {
        ActorRef::new("exp-1", ActorKind::Expert)
    }

    fn input(montant: f64) -> AuditInput {
        AuditInput {
            montant_final: montant,
            rapport_detaille: "Recoverable amounts verified against ledgers.".to_string(),
            notes: String::new(),
            client_fee_percentage_negotiated: None,
            amend: false,
        }
    }

    #[test]
    fn negotiated_rate_takes_precedence() {
        let settlement = compute_commission(1000.0, Some(0.1), 0.05);
        assert_eq!(settlement.commission_amount, 100.0);
        assert_eq!(settlement.net_client, 900.0);
    }

    #[test]
    fn default_rate_applies_without_negotiation() {
        let settlement = compute_commission(1000.0, None, 0.05);
        assert_eq!(settlement.commission_amount, 50.0);
        assert_eq!(settlement.net_client, 950.0);
    }

    #[test]
    fn negative_amounts_clamp_to_zero() {
        let settlement = compute_commission(-5.0, None, 0.05);
        assert_eq!(settlement.commission_amount, 0.0);
        assert_eq!(settlement.net_client, 0.0);

        let settlement = compute_commission(f64::NAN, Some(0.1), 0.05);
        assert_eq!(settlement.commission_amount, 0.0);
        assert_eq!(settlement.net_client, 0.0);
    }

    #[test]
    fn finalize_is_one_shot_without_amend() {
        let mut audits = Vec::new();
        let now = Utc::now();

        let first = finalize_audit(&mut audits, Some(12000.0), 0.15, input(9500.0), expert(), now)
            .expect("first finalize");
        assert_eq!(first.montant_initial, 12000.0);
        assert!(!first.amends);

        let err = finalize_audit(&mut audits, None, 0.15, input(9000.0), expert(), now)
            .expect_err("second finalize must fail");
        assert_eq!(err, DossierError::AlreadyFinalized);
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].montant_final, 9500.0);
    }

    #[test]
    fn amend_appends_and_keeps_history() {
        let mut audits = Vec::new();
        let now = Utc::now();
        finalize_audit(&mut audits, None, 0.15, input(9500.0), expert(), now).expect("finalize");

        let mut amended = input(10200.0);
        amended.amend = true;
        let superseding = finalize_audit(
            &mut audits,
            Some(9500.0),
            0.15,
            amended,
            ActorRef::new("adm-1", ActorKind::Admin),
            now,
        )
        .expect("amend appends");

        assert!(superseding.amends);
        assert_eq!(audits.len(), 2);
        assert_eq!(audits[0].montant_final, 9500.0);
        assert_eq!(audits[1].montant_final, 10200.0);
    }

    #[test]
    fn finalize_validates_mandatory_fields() {
        let mut audits = Vec::new();
        let now = Utc::now();

        let mut missing_report = input(9500.0);
        missing_report.rapport_detaille = "  ".to_string();
        assert_eq!(
            finalize_audit(&mut audits, None, 0.15, missing_report, expert(), now)
                .expect_err("report required"),
            DossierError::Validation("rapport_detaille is required")
        );

        assert_eq!(
            finalize_audit(&mut audits, None, 0.15, input(-1.0), expert(), now)
                .expect_err("negative amount"),
            DossierError::Validation("montant_final must be a non-negative amount")
        );
        assert!(audits.is_empty());
    }
}
