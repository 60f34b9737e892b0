pub mod audit;
pub mod closure;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use closure::{
    ClosureCommand, ClosurePlan, ClosureReceipt, ReviewCommand, ReviewDecision, ReviewOutcome,
};
pub use domain::journal::{ActionKind, ApprovalStatus, EntryId, JournalEntry, PendingFilter};
pub use domain::order::{NewOrder, Order, OrderFilter, OrderId, OrderStatus};
pub use domain::tenant::{ActorContext, ActorId, Role, Tenant, TenantId, TenantScope};
pub use errors::{ErrorKind, LedgerError};
pub use ledger::{PaymentCommand, PricingAdjustment, SETTLEMENT_TOLERANCE};

pub use chrono;
pub use rust_decimal;
