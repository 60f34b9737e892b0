use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use atelier_core::closure::{
    self, ClosureCommand, ClosureReceipt, ReviewCommand, ReviewOutcome,
};
use atelier_core::domain::journal::{EntryId, JournalEntry, PendingFilter};
use atelier_core::domain::order::{Order, OrderFilter, OrderId};
use atelier_core::domain::tenant::{ActorContext, Tenant, TenantId};
use atelier_core::errors::LedgerError;
use atelier_core::ledger::{self, PaymentCommand, PricingAdjustment};

use super::{LedgerRepository, RepositoryError, TenantRepository};

#[derive(Default)]
pub struct InMemoryTenantRepository {
    tenants: RwLock<HashMap<String, Tenant>>,
}

#[async_trait::async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn insert(&self, tenant: Tenant) -> Result<bool, RepositoryError> {
        let mut tenants = self.tenants.write().await;
        if tenants.contains_key(&tenant.id.0) {
            return Ok(false);
        }
        tenants.insert(tenant.id.0.clone(), tenant);
        Ok(true)
    }

    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let tenants = self.tenants.read().await;
        let mut listed: Vec<Tenant> = tenants.values().cloned().collect();
        listed.sort_by(|left, right| left.name.cmp(&right.name).then(left.id.0.cmp(&right.id.0)));
        Ok(listed)
    }
}

#[derive(Default)]
struct LedgerState {
    /// Insertion order doubles as the tie-breaker of every listing.
    orders: Vec<Order>,
    entries: Vec<JournalEntry>,
}

impl LedgerState {
    fn order(&self, id: &OrderId) -> Result<Order, RepositoryError> {
        self.orders
            .iter()
            .find(|order| &order.id == id)
            .cloned()
            .ok_or_else(|| LedgerError::order_not_found(id.0.clone()).into())
    }

    fn replace_order(&mut self, order: Order) {
        if let Some(slot) = self.orders.iter_mut().find(|stored| stored.id == order.id) {
            *slot = order;
        }
    }
}

/// Ledger held in process memory. Each mutation runs under the write half of
/// one lock and works on copies, so a refused operation leaves no trace.
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    state: RwLock<LedgerState>,
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn insert_order(&self, order: Order) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.orders.iter().any(|stored| stored.id == order.id) {
            return Err(LedgerError::InvalidState(format!("order `{}` already exists", order.id.0))
                .into());
        }
        state.orders.push(order);
        Ok(())
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        let mut listed: Vec<(usize, Order)> = state
            .orders
            .iter()
            .enumerate()
            .filter(|(_, order)| filter.matches(order))
            .map(|(position, order)| (position, order.clone()))
            .collect();

        let by_delivery = filter.has_delivery_window();
        listed.sort_by(|(left_pos, left), (right_pos, right)| {
            let delivery = if by_delivery {
                left.delivery_date.cmp(&right.delivery_date)
            } else {
                Ordering::Equal
            };
            delivery
                .then_with(|| right.is_open().cmp(&left.is_open()))
                .then_with(|| listing_time(right).cmp(&listing_time(left)))
                .then_with(|| right_pos.cmp(left_pos))
        });

        Ok(apply_limit(listed.into_iter().map(|(_, order)| order), filter.limit))
    }

    async fn find_entry(&self, id: &EntryId) -> Result<Option<JournalEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.entries.iter().find(|entry| &entry.id == id).cloned())
    }

    async fn list_pending_entries(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<JournalEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut listed: Vec<(usize, JournalEntry)> = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(position, entry)| (position, entry.clone()))
            .collect();

        listed.sort_by(|(left_pos, left), (right_pos, right)| {
            right.created_at.cmp(&left.created_at).then_with(|| right_pos.cmp(left_pos))
        });

        Ok(apply_limit(listed.into_iter().map(|(_, entry)| entry), filter.limit))
    }

    async fn list_entries_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<JournalEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut history: Vec<JournalEntry> =
            state.entries.iter().filter(|entry| &entry.order_id == order_id).cloned().collect();
        history.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(history)
    }

    async fn record_payment(
        &self,
        actor: &ActorContext,
        command: &PaymentCommand,
        now: DateTime<Utc>,
    ) -> Result<(Order, JournalEntry), RepositoryError> {
        let mut state = self.state.write().await;

        let mut order = state.order(&command.order_id)?;
        let entry = ledger::apply_payment(&mut order, actor, command, now)?;

        state.replace_order(order.clone());
        state.entries.push(entry.clone());
        Ok((order, entry))
    }

    async fn adjust_pricing(
        &self,
        actor: &ActorContext,
        adjustment: &PricingAdjustment,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;

        let mut order = state.order(&adjustment.order_id)?;
        ledger::adjust_pricing(&mut order, actor, adjustment, now)?;

        state.replace_order(order.clone());
        Ok(order)
    }

    async fn request_closure(
        &self,
        actor: &ActorContext,
        command: &ClosureCommand,
        now: DateTime<Utc>,
    ) -> Result<(ClosureReceipt, Order), RepositoryError> {
        let mut state = self.state.write().await;

        let order = state.order(&command.order_id)?;
        let existing = state
            .entries
            .iter()
            .find(|entry| entry.order_id == order.id && entry.is_pending_closure())
            .cloned();
        let plan = closure::plan_closure(&order, actor, command, existing.as_ref(), now)?;

        let receipt = plan.receipt();
        if let closure::ClosurePlan::Append(entry) = plan {
            state.entries.push(entry);
        }
        Ok((receipt, order))
    }

    async fn review_entry(
        &self,
        actor: &ActorContext,
        command: &ReviewCommand,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, RepositoryError> {
        let mut state = self.state.write().await;

        let position = state
            .entries
            .iter()
            .position(|entry| entry.id == command.entry_id)
            .ok_or_else(|| LedgerError::entry_not_found(command.entry_id.0.clone()))?;
        let mut entry = state.entries[position].clone();
        let mut order = state.order(&entry.order_id)?;

        let order_changed = closure::apply_review(&mut entry, &mut order, actor, command, now)?;

        state.entries[position] = entry.clone();
        if order_changed {
            state.replace_order(order.clone());
        }
        Ok(ReviewOutcome { entry, order, order_changed })
    }
}

fn listing_time(order: &Order) -> DateTime<Utc> {
    order.closed_at.unwrap_or(order.created_at)
}

fn apply_limit<T>(items: impl Iterator<Item = T>, limit: Option<u32>) -> Vec<T> {
    match limit {
        Some(limit) => items.take(limit as usize).collect(),
        None => items.collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use atelier_core::closure::{ClosureCommand, ReviewCommand, ReviewDecision};
    use atelier_core::domain::journal::{ActionKind, ApprovalStatus, PendingFilter};
    use atelier_core::domain::order::{NewOrder, Order, OrderStatus};
    use atelier_core::domain::tenant::{ActorContext, Tenant, TenantId};
    use atelier_core::errors::ErrorKind;
    use atelier_core::ledger::{open_order, PaymentCommand};

    use crate::repositories::{
        InMemoryLedgerRepository, InMemoryTenantRepository, LedgerRepository, RepositoryError,
        TenantRepository,
    };

    fn salon() -> TenantId {
        TenantId("SALON-A".to_string())
    }

    async fn seed_order(repo: &InMemoryLedgerRepository, total: i64, advanced: i64) -> Order {
        let order = open_order(
            &ActorContext::employee("emp-1", salon()),
            NewOrder {
                tenant_id: salon(),
                customer_name: "Fatou".to_string(),
                garment_model: "Kaftan".to_string(),
                category: None,
                total_price: Decimal::new(total, 0),
                amount_advanced: Decimal::new(advanced, 0),
                amount_remaining: None,
                delivery_date: None,
            },
            Utc::now(),
        )
        .expect("open order");
        repo.insert_order(order.clone()).await.expect("insert order");
        order
    }

    #[tokio::test]
    async fn in_memory_tenant_repo_rejects_duplicates() {
        let repo = InMemoryTenantRepository::default();
        let tenant = Tenant { id: salon(), name: "Salon A".to_string(), created_at: Utc::now() };

        assert!(repo.insert(tenant.clone()).await.expect("insert"));
        assert!(!repo.insert(tenant.clone()).await.expect("duplicate"));
        assert_eq!(repo.find_by_id(&tenant.id).await.expect("find"), Some(tenant));
    }

    #[tokio::test]
    async fn rejected_review_leaves_order_untouched() {
        let repo = InMemoryLedgerRepository::default();
        let order = seed_order(&repo, 10_000, 4_000).await;
        let employee = ActorContext::employee("emp-1", salon());
        let (settled, _) = repo
            .record_payment(
                &employee,
                &PaymentCommand {
                    order_id: order.id.clone(),
                    amount: Decimal::new(6_000, 0),
                    comment: None,
                },
                Utc::now(),
            )
            .await
            .expect("settle order");
        assert_eq!(settled.status, OrderStatus::FullyPaid);

        let (receipt, _) = repo
            .request_closure(
                &employee,
                &ClosureCommand { order_id: order.id.clone(), comment: None },
                Utc::now(),
            )
            .await
            .expect("request");

        let outcome = repo
            .review_entry(
                &ActorContext::admin("adm-1", salon()),
                &ReviewCommand {
                    entry_id: receipt.entry_id.clone(),
                    decision: ReviewDecision::Reject,
                    comment: Some("retouche demandee".to_string()),
                },
                Utc::now(),
            )
            .await
            .expect("reject");

        assert!(!outcome.order_changed);
        assert_eq!(outcome.entry.approval_status, ApprovalStatus::Rejected);
        let stored = repo.find_order(&order.id).await.expect("find").expect("order");
        assert_eq!(stored.status, OrderStatus::FullyPaid);

        let (again, _) = repo
            .request_closure(
                &employee,
                &ClosureCommand { order_id: order.id.clone(), comment: None },
                Utc::now(),
            )
            .await
            .expect("request again after rejection");
        assert!(again.created);
        assert_ne!(again.entry_id, receipt.entry_id);
    }

    #[tokio::test]
    async fn scoped_actor_cannot_pay_another_tenant_order() {
        let repo = InMemoryLedgerRepository::default();
        let order = seed_order(&repo, 10_000, 0).await;
        let outsider = ActorContext::employee("emp-9", TenantId("SALON-B".to_string()));

        let error = repo
            .record_payment(
                &outsider,
                &PaymentCommand { order_id: order.id.clone(), amount: Decimal::ONE, comment: None },
                Utc::now(),
            )
            .await
            .expect_err("cross-tenant payment");
        assert!(matches!(error, RepositoryError::Rejected(ref e) if e.kind() == ErrorKind::Forbidden));
        assert!(repo.list_entries_for_order(&order.id).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn pending_window_and_limit_are_applied_newest_first() {
        let repo = InMemoryLedgerRepository::default();
        let order = seed_order(&repo, 10_000, 0).await;
        let employee = ActorContext::employee("emp-1", salon());
        let start = Utc::now();

        for offset in 0..4 {
            repo.record_payment(
                &employee,
                &PaymentCommand {
                    order_id: order.id.clone(),
                    amount: Decimal::new(100, 0),
                    comment: Some(format!("versement {offset}")),
                },
                start + Duration::minutes(offset),
            )
            .await
            .expect("pay");
        }

        let listed = repo
            .list_pending_entries(&PendingFilter {
                tenant_id: Some(salon()),
                action_kind: Some(ActionKind::Payment),
                created_from: Some(start + Duration::minutes(1)),
                created_until: None,
                limit: Some(2),
            })
            .await
            .expect("pending");

        let comments: Vec<_> = listed.iter().filter_map(|entry| entry.comment.clone()).collect();
        assert_eq!(comments, vec!["versement 3".to_string(), "versement 2".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_payments_do_not_lose_updates() {
        let repo = Arc::new(InMemoryLedgerRepository::default());
        let order = seed_order(&repo, 10_000, 0).await;

        let mut handles = Vec::new();
        for amount in [1_500_i64, 2_500] {
            let repo = Arc::clone(&repo);
            let order_id = order.id.clone();
            handles.push(tokio::spawn(async move {
                repo.record_payment(
                    &ActorContext::employee("emp-1", TenantId("SALON-A".to_string())),
                    &PaymentCommand { order_id, amount: Decimal::new(amount, 0), comment: None },
                    Utc::now(),
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("payment");
        }

        let stored = repo.find_order(&order.id).await.expect("find").expect("order");
        assert_eq!(stored.amount_remaining, Decimal::new(6_000, 0));
        assert_eq!(stored.amount_advanced, Decimal::new(4_000, 0));
    }
}
