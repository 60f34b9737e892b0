use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::tenant::{ActorId, TenantId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Lifecycle of an order. The open/closed view is derived from it, never
/// stored independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    FullyPaid,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::FullyPaid => "fully_paid",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "fully_paid" => Some(Self::FullyPaid),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }

    /// Label shown to salon staff.
    pub fn display_label(self) -> &'static str {
        match self {
            Self::Open => "En cours",
            Self::FullyPaid => "Terminé",
            Self::Delivered => "Livré et payé",
        }
    }

    pub fn is_open(self) -> bool {
        !matches!(self, Self::Delivered)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    /// Staff member who took the order.
    pub created_by: ActorId,
    pub customer_name: String,
    pub garment_model: String,
    pub category: Option<String>,
    pub total_price: Decimal,
    pub amount_advanced: Decimal,
    pub amount_remaining: Decimal,
    pub status: OrderStatus,
    pub delivery_date: Option<NaiveDate>,
    pub last_payment_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Input of order creation. `amount_remaining` is an optional caller override;
/// when absent it is derived from total and advance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    pub tenant_id: TenantId,
    pub customer_name: String,
    pub garment_model: String,
    pub category: Option<String>,
    pub total_price: Decimal,
    pub amount_advanced: Decimal,
    pub amount_remaining: Option<Decimal>,
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub tenant_id: Option<TenantId>,
    pub created_by: Option<ActorId>,
    /// `Some(true)` for open orders, `Some(false)` for delivered ones.
    pub open: Option<bool>,
    /// Inclusive delivery window. Setting either bound drops orders without a
    /// delivery date and sorts by delivery date, earliest first.
    pub delivery_from: Option<NaiveDate>,
    pub delivery_until: Option<NaiveDate>,
    pub limit: Option<u32>,
}

impl OrderFilter {
    pub fn has_delivery_window(&self) -> bool {
        self.delivery_from.is_some() || self.delivery_until.is_some()
    }

    /// In-process form of the listing predicate, shared by backends that do
    /// not filter in SQL.
    pub fn matches(&self, order: &Order) -> bool {
        if self.tenant_id.as_ref().is_some_and(|tenant_id| &order.tenant_id != tenant_id) {
            return false;
        }
        if self.created_by.as_ref().is_some_and(|actor_id| &order.created_by != actor_id) {
            return false;
        }
        if self.open.is_some_and(|open| order.is_open() != open) {
            return false;
        }
        if !self.has_delivery_window() {
            return true;
        }
        match order.delivery_date {
            Some(date) => {
                self.delivery_from.map_or(true, |from| date >= from)
                    && self.delivery_until.map_or(true, |until| date <= until)
            }
            None => false,
        }
    }
}
