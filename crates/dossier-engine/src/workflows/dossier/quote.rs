use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ActorRef, DocumentRef, DossierError};

/// Negotiation state of the active quote cycle. The absence of a quote
/// ("none") is the `Option` on the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Proposed,
    Accepted,
    Rejected,
    NeedsInfo,
}

impl QuoteStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::NeedsInfo => "needs_info",
        }
    }
}

/// Priced terms of a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteAmounts {
    pub unit_count: Option<u32>,
    pub unit_price: Option<f64>,
    pub total: f64,
}

/// One side's remark in the negotiation; the history is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteComment {
    pub author: ActorRef,
    pub body: String,
    pub at: DateTime<Utc>,
}

/// The single active quote of a dossier. A fresh proposal after a rejection
/// or an info request starts a new cycle; comments survive across cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub status: QuoteStatus,
    pub amounts: QuoteAmounts,
    pub valid_until: DateTime<Utc>,
    pub document: Option<DocumentRef>,
    pub comments: Vec<QuoteComment>,
    pub cycle: u32,
    pub proposed_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Terms of a new proposal. A missing validity window falls back to the
/// engine's configured default.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteProposal {
    pub amounts: QuoteAmounts,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub document: Option<DocumentRef>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn push_comment(quote: &mut Quote, actor: &ActorRef, body: &str, at: DateTime<Utc>) {
    quote.comments.push(QuoteComment {
        author: actor.clone(),
        body: body.to_string(),
        at,
    });
}

fn require_comment(comment: &str, missing: &'static str) -> Result<(), DossierError> {
    if comment.trim().is_empty() {
        return Err(DossierError::Validation(missing));
    }
    Ok(())
}

fn state_label(slot: &Option<Quote>) -> &'static str {
    slot.as_ref()
        .map(|quote| quote.status.label())
        .unwrap_or("none")
}

fn illegal(slot: &Option<Quote>, operation: &'static str) -> DossierError {
    DossierError::InvalidQuoteState {
        state: state_label(slot),
        operation,
    }
}

/// Start a negotiation cycle. Legal from none, or after a rejection or an
/// unanswered info request; a pending or accepted proposal refuses a new one.
pub fn propose(
    slot: &mut Option<Quote>,
    proposal: QuoteProposal,
    actor: &ActorRef,
    now: DateTime<Utc>,
    default_validity: chrono::Duration,
) -> Result<Quote, DossierError> {
    let restartable = match slot.as_ref().map(|quote| quote.status) {
        None => true,
        Some(QuoteStatus::Rejected) | Some(QuoteStatus::NeedsInfo) => true,
        Some(QuoteStatus::Proposed) | Some(QuoteStatus::Accepted) => false,
    };
    if !restartable {
        return Err(illegal(slot, "propose"));
    }

    let valid_until = proposal.valid_until.unwrap_or(now + default_validity);
    if valid_until <= now {
        return Err(DossierError::Validation(
            "quote validity must end in the future",
        ));
    }
    if !(proposal.amounts.total > 0.0) {
        return Err(DossierError::Validation("quote total must be positive"));
    }

    let (mut comments, cycle) = match slot.take() {
        Some(previous) => (previous.comments, previous.cycle + 1),
        None => (Vec::new(), 1),
    };
    if let Some(body) = proposal.comment.as_deref() {
        if !body.trim().is_empty() {
            comments.push(QuoteComment {
                author: actor.clone(),
                body: body.to_string(),
                at: now,
            });
        }
    }

    let quote = Quote {
        status: QuoteStatus::Proposed,
        amounts: proposal.amounts,
        valid_until,
        document: proposal.document,
        comments,
        cycle,
        proposed_at: now,
        decided_at: None,
    };
    *slot = Some(quote.clone());
    Ok(quote)
}

/// Client accepts the pending proposal. Terminal for the quote.
pub fn accept(
    slot: &mut Option<Quote>,
    comment: Option<&str>,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Quote, DossierError> {
    match slot.as_mut() {
        Some(quote) if quote.status == QuoteStatus::Proposed => {
            quote.status = QuoteStatus::Accepted;
            quote.decided_at = Some(now);
            if let Some(body) = comment {
                if !body.trim().is_empty() {
                    push_comment(quote, actor, body, now);
                }
            }
            Ok(quote.clone())
        }
        _ => Err(illegal(slot, "accept")),
    }
}

/// Client refuses the pending proposal. The refusal reason is mandatory.
pub fn reject(
    slot: &mut Option<Quote>,
    comment: &str,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Quote, DossierError> {
    require_comment(comment, "a rejection comment is required")?;
    match slot.as_mut() {
        Some(quote) if quote.status == QuoteStatus::Proposed => {
            quote.status = QuoteStatus::Rejected;
            quote.decided_at = Some(now);
            push_comment(quote, actor, comment, now);
            Ok(quote.clone())
        }
        _ => Err(illegal(slot, "reject")),
    }
}

/// Client asks for more information on the pending proposal.
pub fn request_info(
    slot: &mut Option<Quote>,
    comment: &str,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Quote, DossierError> {
    require_comment(comment, "an information request needs a comment")?;
    match slot.as_mut() {
        Some(quote) if quote.status == QuoteStatus::Proposed => {
            quote.status = QuoteStatus::NeedsInfo;
            push_comment(quote, actor, comment, now);
            Ok(quote.clone())
        }
        _ => Err(illegal(slot, "request_info")),
    }
}

/// Expert answers an info request, putting the proposal back on the table.
pub fn respond(
    slot: &mut Option<Quote>,
    comment: &str,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<Quote, DossierError> {
    require_comment(comment, "a response needs a comment")?;
    match slot.as_mut() {
        Some(quote) if quote.status == QuoteStatus::NeedsInfo => {
            quote.status = QuoteStatus::Proposed;
            push_comment(quote, actor, comment, now);
            Ok(quote.clone())
        }
        _ => Err(illegal(slot, "respond")),
    }
}
