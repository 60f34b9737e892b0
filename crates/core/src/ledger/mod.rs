//! Financial rules of an order: creation, payments and the administrative
//! pricing override.
//!
//! Everything here is pure. Storage backends load the current order inside
//! their transaction, call these functions, and persist the result; that keeps
//! the arithmetic identical across backends.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::journal::{ActionKind, ApprovalStatus, EntryId, JournalEntry};
use crate::domain::order::{NewOrder, Order, OrderId, OrderStatus};
use crate::domain::tenant::ActorContext;
use crate::errors::LedgerError;

/// Remaining balances at or below this amount count as fully paid. The value
/// is part of the ledger contract and must stay exactly `0.01`.
pub const SETTLEMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentCommand {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricingAdjustment {
    pub order_id: OrderId,
    pub total_price: Decimal,
    pub amount_advanced: Decimal,
    /// Trusted over the derived value when present (clamped at zero).
    pub amount_remaining: Option<Decimal>,
}

pub fn remaining_balance(total_price: Decimal, amount_advanced: Decimal) -> Decimal {
    (total_price - amount_advanced).max(Decimal::ZERO)
}

pub fn is_settled(amount_remaining: Decimal) -> bool {
    amount_remaining <= SETTLEMENT_TOLERANCE
}

pub fn open_order(
    actor: &ActorContext,
    new_order: NewOrder,
    now: DateTime<Utc>,
) -> Result<Order, LedgerError> {
    actor.authorize_tenant(&new_order.tenant_id)?;

    let customer_name = required_text("customer name", new_order.customer_name)?;
    let garment_model = required_text("garment model", new_order.garment_model)?;
    if new_order.total_price <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput("total price must be greater than zero".to_owned()));
    }
    validate_amounts(new_order.total_price, new_order.amount_advanced)?;

    let amount_remaining = new_order
        .amount_remaining
        .map(|remaining| remaining.max(Decimal::ZERO))
        .unwrap_or_else(|| remaining_balance(new_order.total_price, new_order.amount_advanced));

    Ok(Order {
        id: OrderId(Uuid::new_v4().to_string()),
        tenant_id: new_order.tenant_id,
        created_by: actor.actor_id().clone(),
        customer_name,
        garment_model,
        category: new_order.category.filter(|value| !value.trim().is_empty()),
        total_price: new_order.total_price,
        amount_advanced: new_order.amount_advanced,
        amount_remaining,
        status: OrderStatus::Open,
        delivery_date: new_order.delivery_date,
        last_payment_at: None,
        closed_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// Applies a payment to `order` and returns the journal entry recording it.
///
/// The order reflects the payment as soon as this returns; the entry is
/// created `Pending` only as an acknowledgement item for a reviewer.
pub fn apply_payment(
    order: &mut Order,
    actor: &ActorContext,
    command: &PaymentCommand,
    now: DateTime<Utc>,
) -> Result<JournalEntry, LedgerError> {
    actor.authorize_tenant(&order.tenant_id)?;

    let amount = command.amount;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidInput("payment amount must be greater than zero".to_owned()));
    }

    let headroom = order.amount_remaining.min(order.total_price - order.amount_advanced);
    if amount > headroom {
        return Err(LedgerError::InvalidInput(format!(
            "payment of {amount} exceeds the {} still owed on order `{}`",
            headroom.max(Decimal::ZERO),
            order.id.0
        )));
    }

    let label_before = order.status;
    let remaining_after = (order.amount_remaining - amount).max(Decimal::ZERO);

    order.amount_advanced += amount;
    order.amount_remaining = remaining_after;
    // Delivery is terminal; settling a repriced delivered order keeps it there.
    if remaining_after <= Decimal::ZERO && order.status == OrderStatus::Open {
        order.status = OrderStatus::FullyPaid;
    }
    order.last_payment_at = Some(now);
    order.updated_at = now;

    Ok(JournalEntry {
        id: EntryId(Uuid::new_v4().to_string()),
        order_id: order.id.clone(),
        tenant_id: order.tenant_id.clone(),
        actor_id: actor.actor_id().clone(),
        action_kind: ActionKind::Payment,
        amount_paid: amount,
        remaining_after,
        label_before,
        label_after: order.status,
        comment: normalize_comment(command.comment.clone()),
        approval_status: ApprovalStatus::Pending,
        reviewer_id: None,
        reviewed_at: None,
        reviewer_comment: None,
        created_at: now,
    })
}

/// Administrative correction path. Overwrites the monetary fields without
/// producing a journal entry and leaves the lifecycle untouched.
pub fn adjust_pricing(
    order: &mut Order,
    actor: &ActorContext,
    adjustment: &PricingAdjustment,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    actor.authorize_tenant(&order.tenant_id)?;
    actor.require_reviewer()?;
    validate_amounts(adjustment.total_price, adjustment.amount_advanced)?;

    order.total_price = adjustment.total_price;
    order.amount_advanced = adjustment.amount_advanced;
    order.amount_remaining = adjustment
        .amount_remaining
        .map(|remaining| remaining.max(Decimal::ZERO))
        .unwrap_or_else(|| remaining_balance(adjustment.total_price, adjustment.amount_advanced));
    order.updated_at = now;

    Ok(())
}

fn validate_amounts(total_price: Decimal, amount_advanced: Decimal) -> Result<(), LedgerError> {
    if total_price < Decimal::ZERO {
        return Err(LedgerError::InvalidInput("total price must not be negative".to_owned()));
    }
    if amount_advanced < Decimal::ZERO {
        return Err(LedgerError::InvalidInput("advance must not be negative".to_owned()));
    }
    if amount_advanced > total_price {
        return Err(LedgerError::InvalidInput(format!(
            "advance {amount_advanced} exceeds total price {total_price}"
        )));
    }
    Ok(())
}

fn required_text(field: &str, value: String) -> Result<String, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

pub(crate) fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}
