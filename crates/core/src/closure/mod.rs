//! Two-phase closure: an employee asks for an order to be closed, a reviewer
//! approves or rejects the request.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::journal::{ActionKind, ApprovalStatus, EntryId, JournalEntry};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::tenant::ActorContext;
use crate::errors::LedgerError;
use crate::ledger::{is_settled, normalize_comment};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureCommand {
    pub order_id: OrderId,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureReceipt {
    pub entry_id: EntryId,
    pub created: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClosurePlan {
    /// A pending request already exists; nothing is written.
    Existing(EntryId),
    Append(JournalEntry),
}

impl ClosurePlan {
    pub fn receipt(&self) -> ClosureReceipt {
        match self {
            Self::Existing(entry_id) => ClosureReceipt { entry_id: entry_id.clone(), created: false },
            Self::Append(entry) => ClosureReceipt { entry_id: entry.id.clone(), created: true },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn from_approve(approve: bool) -> Self {
        if approve {
            Self::Approve
        } else {
            Self::Reject
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommand {
    pub entry_id: EntryId,
    pub decision: ReviewDecision,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub entry: JournalEntry,
    pub order: Order,
    pub order_changed: bool,
}

/// Decides what a closure request does against the freshly loaded `order`.
///
/// `existing_pending` is the pending closure request already on file for the
/// order, if any. The balance gate runs before the idempotency check.
pub fn plan_closure(
    order: &Order,
    actor: &ActorContext,
    command: &ClosureCommand,
    existing_pending: Option<&JournalEntry>,
    now: DateTime<Utc>,
) -> Result<ClosurePlan, LedgerError> {
    actor.authorize_tenant(&order.tenant_id)?;

    if !is_settled(order.amount_remaining) {
        return Err(LedgerError::NotFullyPaid {
            order_id: order.id.0.clone(),
            remaining: order.amount_remaining,
        });
    }

    if let Some(existing) = existing_pending.filter(|entry| entry.is_pending_closure()) {
        return Ok(ClosurePlan::Existing(existing.id.clone()));
    }

    if order.status == OrderStatus::Delivered {
        return Err(LedgerError::InvalidState(format!(
            "order `{}` is already delivered",
            order.id.0
        )));
    }

    Ok(ClosurePlan::Append(JournalEntry {
        id: EntryId(Uuid::new_v4().to_string()),
        order_id: order.id.clone(),
        tenant_id: order.tenant_id.clone(),
        actor_id: actor.actor_id().clone(),
        action_kind: ActionKind::ClosureRequest,
        amount_paid: Decimal::ZERO,
        remaining_after: order.amount_remaining,
        label_before: order.status,
        label_after: OrderStatus::Delivered,
        comment: normalize_comment(command.comment.clone()),
        approval_status: ApprovalStatus::Pending,
        reviewer_id: None,
        reviewed_at: None,
        reviewer_comment: None,
        created_at: now,
    }))
}

/// Records a reviewer decision on `entry` and applies its effect to `order`.
///
/// Approving a closure request delivers the order. Payments were applied when
/// they were recorded, so approving one is an acknowledgement only. Rejection
/// never reverses anything. Returns whether `order` changed.
pub fn apply_review(
    entry: &mut JournalEntry,
    order: &mut Order,
    actor: &ActorContext,
    command: &ReviewCommand,
    now: DateTime<Utc>,
) -> Result<bool, LedgerError> {
    actor.require_reviewer()?;
    actor.authorize_tenant(&entry.tenant_id)?;

    if entry.order_id != order.id {
        return Err(LedgerError::InvalidState(format!(
            "journal entry `{}` does not belong to order `{}`",
            entry.id.0, order.id.0
        )));
    }
    if !entry.is_pending() {
        return Err(LedgerError::InvalidState(format!(
            "journal entry `{}` was already {}",
            entry.id.0,
            entry.approval_status.as_str()
        )));
    }

    entry.approval_status = match command.decision {
        ReviewDecision::Approve => ApprovalStatus::Approved,
        ReviewDecision::Reject => ApprovalStatus::Rejected,
    };
    entry.reviewer_id = Some(actor.actor_id().clone());
    entry.reviewed_at = Some(now);
    entry.reviewer_comment = normalize_comment(command.comment.clone());

    let delivers =
        command.decision == ReviewDecision::Approve && entry.action_kind == ActionKind::ClosureRequest;
    if delivers {
        order.status = OrderStatus::Delivered;
        order.closed_at = Some(now);
        order.updated_at = now;
    }

    Ok(delivers)
}
