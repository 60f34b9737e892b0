use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use atelier_core::closure::{ClosureCommand, ClosureReceipt, ReviewCommand, ReviewOutcome};
use atelier_core::domain::journal::{EntryId, JournalEntry, PendingFilter};
use atelier_core::domain::order::{Order, OrderFilter, OrderId};
use atelier_core::domain::tenant::{ActorContext, Tenant, TenantId};
use atelier_core::errors::LedgerError;
use atelier_core::ledger::{PaymentCommand, PricingAdjustment};

pub mod ledger;
pub mod memory;
pub mod tenant;

pub use ledger::SqlLedgerRepository;
pub use memory::{InMemoryLedgerRepository, InMemoryTenantRepository};
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// A ledger rule refused the operation; nothing was written.
    #[error(transparent)]
    Rejected(#[from] LedgerError),
}

impl From<RepositoryError> for LedgerError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Rejected(error) => error,
            RepositoryError::Database(error) => LedgerError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => {
                LedgerError::Unavailable(format!("stored row could not be decoded: {message}"))
            }
        }
    }
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Returns `false` when a tenant with the same id already exists.
    async fn insert(&self, tenant: Tenant) -> Result<bool, RepositoryError>;
    async fn find_by_id(&self, id: &TenantId) -> Result<Option<Tenant>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Tenant>, RepositoryError>;
}

/// Storage of orders and their journal.
///
/// The mutating methods are the transactional units of the ledger: each one
/// loads the current order under the store's write lock, runs the matching
/// `atelier_core` rule, and persists the result or nothing at all.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<(), RepositoryError>;
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    async fn find_entry(&self, id: &EntryId) -> Result<Option<JournalEntry>, RepositoryError>;
    async fn list_pending_entries(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<JournalEntry>, RepositoryError>;
    async fn list_entries_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<JournalEntry>, RepositoryError>;

    async fn record_payment(
        &self,
        actor: &ActorContext,
        command: &PaymentCommand,
        now: DateTime<Utc>,
    ) -> Result<(Order, JournalEntry), RepositoryError>;

    async fn adjust_pricing(
        &self,
        actor: &ActorContext,
        adjustment: &PricingAdjustment,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError>;

    async fn request_closure(
        &self,
        actor: &ActorContext,
        command: &ClosureCommand,
        now: DateTime<Utc>,
    ) -> Result<(ClosureReceipt, Order), RepositoryError>;

    async fn review_entry(
        &self,
        actor: &ActorContext,
        command: &ReviewCommand,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, RepositoryError>;
}
