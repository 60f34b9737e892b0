use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use atelier_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use atelier_core::closure::{
    ClosureCommand, ClosureReceipt, ReviewCommand, ReviewDecision, ReviewOutcome,
};
use atelier_core::domain::journal::{EntryId, JournalEntry, PendingFilter};
use atelier_core::domain::order::{NewOrder, Order, OrderFilter, OrderId};
use atelier_core::domain::tenant::{ActorContext, Tenant, TenantId};
use atelier_core::errors::{ErrorKind, LedgerError};
use atelier_core::ledger::{self, PaymentCommand, PricingAdjustment};

use crate::repositories::{
    InMemoryLedgerRepository, InMemoryTenantRepository, LedgerRepository, SqlLedgerRepository,
    SqlTenantRepository, TenantRepository,
};
use crate::DbPool;

const DEFAULT_PENDING_LIMIT: u32 = 100;

/// Entry point of every ledger operation.
///
/// Scope and role checks, logging and auditing happen here; the atomic
/// read-modify-write units live in the [`LedgerRepository`] implementations.
#[derive(Clone)]
pub struct LedgerService {
    tenants: Arc<dyn TenantRepository>,
    ledger: Arc<dyn LedgerRepository>,
    audit: Arc<dyn AuditSink>,
    pending_limit: u32,
}

impl LedgerService {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        ledger: Arc<dyn LedgerRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { tenants, ledger, audit, pending_limit: DEFAULT_PENDING_LIMIT }
    }

    pub fn sqlite(pool: DbPool) -> Self {
        Self::new(
            Arc::new(SqlTenantRepository::new(pool.clone())),
            Arc::new(SqlLedgerRepository::new(pool)),
            Arc::new(TracingAuditSink),
        )
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryTenantRepository::default()),
            Arc::new(InMemoryLedgerRepository::default()),
            Arc::new(TracingAuditSink),
        )
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Upper bound applied to pending listings that do not carry their own.
    pub fn with_pending_limit(mut self, pending_limit: u32) -> Self {
        self.pending_limit = pending_limit.max(1);
        self
    }

    pub async fn create_tenant(
        &self,
        actor: &ActorContext,
        id: TenantId,
        name: &str,
    ) -> Result<Tenant, LedgerError> {
        let result: Result<Tenant, LedgerError> = async {
            actor.require_super_admin()?;
            if id.0.trim().is_empty() {
                return Err(LedgerError::InvalidInput("tenant id must not be empty".to_owned()));
            }
            let name = name.trim();
            if name.is_empty() {
                return Err(LedgerError::InvalidInput("tenant name must not be empty".to_owned()));
            }

            let tenant = Tenant { id, name: name.to_owned(), created_at: now() };
            if !self.tenants.insert(tenant.clone()).await? {
                return Err(LedgerError::InvalidState(format!(
                    "tenant `{}` already exists",
                    tenant.id.0
                )));
            }
            Ok(tenant)
        }
        .await;

        match &result {
            Ok(tenant) => {
                info!(
                    event_name = "ledger.tenant.created",
                    correlation_id = actor.correlation_id(),
                    tenant_id = %tenant.id.0,
                    actor_id = %actor.actor_id().0,
                    "tenant created"
                );
                self.audit.emit(
                    AuditEvent::new(actor, "tenant.created", AuditCategory::Scope, AuditOutcome::Success)
                        .with_metadata("tenant_id", tenant.id.0.clone()),
                );
            }
            Err(error) => self.refused(actor, "tenant.create", AuditCategory::Scope, None, error),
        }
        result
    }

    pub async fn list_tenants(&self, actor: &ActorContext) -> Result<Vec<Tenant>, LedgerError> {
        let tenants = self.tenants.list().await?;
        Ok(tenants.into_iter().filter(|tenant| actor.scope().permits(&tenant.id)).collect())
    }

    pub async fn create_order(
        &self,
        actor: &ActorContext,
        new_order: NewOrder,
    ) -> Result<Order, LedgerError> {
        let result: Result<Order, LedgerError> = async {
            let order = ledger::open_order(actor, new_order, now())?;
            if self.tenants.find_by_id(&order.tenant_id).await?.is_none() {
                return Err(LedgerError::tenant_not_found(order.tenant_id.0.clone()));
            }
            self.ledger.insert_order(order.clone()).await?;
            Ok(order)
        }
        .await;

        match &result {
            Ok(order) => {
                info!(
                    event_name = "ledger.order.created",
                    correlation_id = actor.correlation_id(),
                    order_id = %order.id.0,
                    tenant_id = %order.tenant_id.0,
                    actor_id = %actor.actor_id().0,
                    total_price = %order.total_price,
                    amount_remaining = %order.amount_remaining,
                    "order created"
                );
                self.audit.emit(
                    AuditEvent::new(actor, "order.created", AuditCategory::Ledger, AuditOutcome::Success)
                        .for_order(&order.id, &order.tenant_id)
                        .with_metadata("total_price", order.total_price.to_string()),
                );
            }
            Err(error) => self.refused(actor, "order.create", AuditCategory::Ledger, None, error),
        }
        result
    }

    pub async fn record_payment(
        &self,
        actor: &ActorContext,
        order_id: &OrderId,
        amount: Decimal,
        comment: Option<String>,
    ) -> Result<JournalEntry, LedgerError> {
        let command = PaymentCommand { order_id: order_id.clone(), amount, comment };
        let result = self
            .ledger
            .record_payment(actor, &command, now())
            .await
            .map_err(|error| actor.conceal_missing(error.into()));

        match &result {
            Ok((order, entry)) => {
                info!(
                    event_name = "ledger.payment.recorded",
                    correlation_id = actor.correlation_id(),
                    order_id = %order.id.0,
                    tenant_id = %order.tenant_id.0,
                    actor_id = %actor.actor_id().0,
                    entry_id = %entry.id.0,
                    amount = %entry.amount_paid,
                    remaining_after = %entry.remaining_after,
                    status = order.status.as_str(),
                    "payment recorded"
                );
                self.audit.emit(
                    AuditEvent::new(actor, "payment.recorded", AuditCategory::Ledger, AuditOutcome::Success)
                        .for_order(&order.id, &order.tenant_id)
                        .with_metadata("entry_id", entry.id.0.clone())
                        .with_metadata("amount", entry.amount_paid.to_string())
                        .with_metadata("remaining_after", entry.remaining_after.to_string()),
                );
            }
            Err(error) => {
                self.refused(actor, "payment.record", AuditCategory::Ledger, Some(order_id), error)
            }
        }
        result.map(|(_, entry)| entry)
    }

    pub async fn adjust_pricing(
        &self,
        actor: &ActorContext,
        order_id: &OrderId,
        total_price: Decimal,
        amount_advanced: Decimal,
        amount_remaining: Option<Decimal>,
    ) -> Result<Order, LedgerError> {
        let adjustment = PricingAdjustment {
            order_id: order_id.clone(),
            total_price,
            amount_advanced,
            amount_remaining,
        };
        let result = self
            .ledger
            .adjust_pricing(actor, &adjustment, now())
            .await
            .map_err(|error| actor.conceal_missing(error.into()));

        match &result {
            Ok(order) => {
                info!(
                    event_name = "ledger.pricing.adjusted",
                    correlation_id = actor.correlation_id(),
                    order_id = %order.id.0,
                    tenant_id = %order.tenant_id.0,
                    actor_id = %actor.actor_id().0,
                    total_price = %order.total_price,
                    amount_advanced = %order.amount_advanced,
                    amount_remaining = %order.amount_remaining,
                    "order pricing adjusted"
                );
                self.audit.emit(
                    AuditEvent::new(actor, "pricing.adjusted", AuditCategory::Ledger, AuditOutcome::Success)
                        .for_order(&order.id, &order.tenant_id)
                        .with_metadata("total_price", order.total_price.to_string())
                        .with_metadata("amount_remaining", order.amount_remaining.to_string()),
                );
            }
            Err(error) => {
                self.refused(actor, "pricing.adjust", AuditCategory::Ledger, Some(order_id), error)
            }
        }
        result
    }

    pub async fn request_closure(
        &self,
        actor: &ActorContext,
        order_id: &OrderId,
        comment: Option<String>,
    ) -> Result<ClosureReceipt, LedgerError> {
        let command = ClosureCommand { order_id: order_id.clone(), comment };
        let result = self
            .ledger
            .request_closure(actor, &command, now())
            .await
            .map_err(|error| actor.conceal_missing(error.into()));

        match &result {
            Ok((receipt, order)) => {
                info!(
                    event_name = "ledger.closure.requested",
                    correlation_id = actor.correlation_id(),
                    order_id = %order.id.0,
                    tenant_id = %order.tenant_id.0,
                    actor_id = %actor.actor_id().0,
                    entry_id = %receipt.entry_id.0,
                    created = receipt.created,
                    "closure requested"
                );
                if receipt.created {
                    self.audit.emit(
                        AuditEvent::new(
                            actor,
                            "closure.requested",
                            AuditCategory::Closure,
                            AuditOutcome::Success,
                        )
                        .for_order(&order.id, &order.tenant_id)
                        .with_metadata("entry_id", receipt.entry_id.0.clone()),
                    );
                }
            }
            Err(error) => {
                self.refused(actor, "closure.request", AuditCategory::Closure, Some(order_id), error)
            }
        }
        result.map(|(receipt, _)| receipt)
    }

    pub async fn review_entry(
        &self,
        actor: &ActorContext,
        entry_id: &EntryId,
        approve: bool,
        comment: Option<String>,
    ) -> Result<ReviewOutcome, LedgerError> {
        let command = ReviewCommand {
            entry_id: entry_id.clone(),
            decision: ReviewDecision::from_approve(approve),
            comment,
        };
        let result = self
            .ledger
            .review_entry(actor, &command, now())
            .await
            .map_err(|error| actor.conceal_missing(error.into()));

        match &result {
            Ok(outcome) => {
                let status = outcome.entry.approval_status.as_str();
                info!(
                    event_name = "ledger.entry.reviewed",
                    correlation_id = actor.correlation_id(),
                    order_id = %outcome.order.id.0,
                    tenant_id = %outcome.order.tenant_id.0,
                    actor_id = %actor.actor_id().0,
                    entry_id = %outcome.entry.id.0,
                    action_kind = outcome.entry.action_kind.as_str(),
                    approval_status = status,
                    order_status = outcome.order.status.as_str(),
                    "journal entry reviewed"
                );
                self.audit.emit(
                    AuditEvent::new(
                        actor,
                        format!("{}.{status}", outcome.entry.action_kind.as_str()),
                        AuditCategory::Review,
                        AuditOutcome::Success,
                    )
                    .for_order(&outcome.order.id, &outcome.order.tenant_id)
                    .with_metadata("entry_id", outcome.entry.id.0.clone())
                    .with_metadata("order_changed", outcome.order_changed.to_string()),
                );
            }
            Err(error) => self.refused(actor, "entry.review", AuditCategory::Review, None, error),
        }
        result
    }

    /// Review queue, newest first. Scoped reviewers only ever see their own
    /// tenant.
    pub async fn list_pending_entries(
        &self,
        actor: &ActorContext,
        filter: PendingFilter,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        actor.require_reviewer()?;
        let tenant_id = actor.resolve_tenant_filter(filter.tenant_id.as_ref())?;
        let filter = PendingFilter {
            tenant_id,
            limit: Some(filter.limit.unwrap_or(self.pending_limit)),
            ..filter
        };

        Ok(self.ledger.list_pending_entries(&filter).await?)
    }

    pub async fn get_order(
        &self,
        actor: &ActorContext,
        order_id: &OrderId,
    ) -> Result<Order, LedgerError> {
        let order = self
            .ledger
            .find_order(order_id)
            .await?
            .ok_or_else(|| {
                actor.conceal_missing(LedgerError::order_not_found(order_id.0.clone()))
            })?;
        actor.authorize_tenant(&order.tenant_id)?;
        Ok(order)
    }

    /// Open orders first, or earliest delivery first when the filter carries a
    /// delivery window. Employees only see the orders they took.
    pub async fn list_orders(
        &self,
        actor: &ActorContext,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, LedgerError> {
        let tenant_id = actor.resolve_tenant_filter(filter.tenant_id.as_ref())?;
        let created_by = actor.resolve_owner_filter(filter.created_by.as_ref())?;
        if let (Some(from), Some(until)) = (filter.delivery_from, filter.delivery_until) {
            if from > until {
                return Err(LedgerError::InvalidInput(format!(
                    "delivery window starts on {from} after it ends on {until}"
                )));
            }
        }
        let filter = OrderFilter { tenant_id, created_by, ..filter };

        Ok(self.ledger.list_orders(&filter).await?)
    }

    /// Every journal entry of an order, oldest first.
    pub async fn order_history(
        &self,
        actor: &ActorContext,
        order_id: &OrderId,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        self.get_order(actor, order_id).await?;
        Ok(self.ledger.list_entries_for_order(order_id).await?)
    }

    fn refused(
        &self,
        actor: &ActorContext,
        operation: &str,
        category: AuditCategory,
        order_id: Option<&OrderId>,
        error: &LedgerError,
    ) {
        let kind = error.kind();
        warn!(
            event_name = "ledger.operation.refused",
            correlation_id = actor.correlation_id(),
            operation,
            order_id = order_id.map(|id| id.0.as_str()).unwrap_or("none"),
            actor_id = %actor.actor_id().0,
            error_class = kind.as_str(),
            error = %error,
            "ledger operation refused"
        );

        let outcome =
            if kind == ErrorKind::Unavailable { AuditOutcome::Failed } else { AuditOutcome::Rejected };
        let mut event = AuditEvent::new(actor, operation, category, outcome)
            .with_metadata("error_class", kind.as_str());
        if let Some(order_id) = order_id {
            event = event.with_metadata("order_id", order_id.0.clone());
        }
        self.audit.emit(event);
    }
}

/// Timestamps are kept at microsecond precision, the resolution they are
/// stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
