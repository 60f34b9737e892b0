use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderId, OrderStatus};
use crate::domain::tenant::{ActorId, TenantId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Payment,
    ClosureRequest,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::ClosureRequest => "closure_request",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "payment" => Some(Self::Payment),
            "closure_request" => Some(Self::ClosureRequest),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Append-only record of a ledger action. Only the review fields change after
/// creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub actor_id: ActorId,
    pub action_kind: ActionKind,
    pub amount_paid: Decimal,
    pub remaining_after: Decimal,
    pub label_before: OrderStatus,
    pub label_after: OrderStatus,
    pub comment: Option<String>,
    pub approval_status: ApprovalStatus,
    pub reviewer_id: Option<ActorId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn is_pending(&self) -> bool {
        self.approval_status == ApprovalStatus::Pending
    }

    pub fn is_pending_closure(&self) -> bool {
        self.is_pending() && self.action_kind == ActionKind::ClosureRequest
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFilter {
    pub tenant_id: Option<TenantId>,
    pub action_kind: Option<ActionKind>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl PendingFilter {
    pub fn matches(&self, entry: &JournalEntry) -> bool {
        entry.is_pending()
            && self.tenant_id.as_ref().map_or(true, |tenant| &entry.tenant_id == tenant)
            && self.action_kind.map_or(true, |kind| entry.action_kind == kind)
            && self.created_from.map_or(true, |from| entry.created_at >= from)
            && self.created_until.map_or(true, |until| entry.created_at <= until)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{ActionKind, ApprovalStatus, EntryId, JournalEntry, PendingFilter};
    use crate::domain::order::{OrderId, OrderStatus};
    use crate::domain::tenant::{ActorId, TenantId};

    fn entry(kind: ActionKind, status: ApprovalStatus) -> JournalEntry {
        JournalEntry {
            id: EntryId("ENT-1".to_owned()),
            order_id: OrderId("ORD-1".to_owned()),
            tenant_id: TenantId("SALON-A".to_owned()),
            actor_id: ActorId("emp-1".to_owned()),
            action_kind: kind,
            amount_paid: Decimal::ZERO,
            remaining_after: Decimal::ZERO,
            label_before: OrderStatus::FullyPaid,
            label_after: OrderStatus::Delivered,
            comment: None,
            approval_status: status,
            reviewer_id: None,
            reviewed_at: None,
            reviewer_comment: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pending_filter_skips_reviewed_entries() {
        let filter = PendingFilter::default();
        assert!(filter.matches(&entry(ActionKind::Payment, ApprovalStatus::Pending)));
        assert!(!filter.matches(&entry(ActionKind::Payment, ApprovalStatus::Approved)));
    }

    #[test]
    fn pending_filter_applies_tenant_kind_and_window() {
        let pending_closure = entry(ActionKind::ClosureRequest, ApprovalStatus::Pending);

        let other_tenant = PendingFilter {
            tenant_id: Some(TenantId("SALON-B".to_owned())),
            ..PendingFilter::default()
        };
        assert!(!other_tenant.matches(&pending_closure));

        let payments_only =
            PendingFilter { action_kind: Some(ActionKind::Payment), ..PendingFilter::default() };
        assert!(!payments_only.matches(&pending_closure));

        let future_window = PendingFilter {
            created_from: Some(Utc::now() + Duration::hours(1)),
            ..PendingFilter::default()
        };
        assert!(!future_window.matches(&pending_closure));
    }

    #[test]
    fn pending_closure_requires_both_kind_and_status() {
        assert!(entry(ActionKind::ClosureRequest, ApprovalStatus::Pending).is_pending_closure());
        assert!(!entry(ActionKind::Payment, ApprovalStatus::Pending).is_pending_closure());
        assert!(!entry(ActionKind::ClosureRequest, ApprovalStatus::Rejected).is_pending_closure());
    }
}
