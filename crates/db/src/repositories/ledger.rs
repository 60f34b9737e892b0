use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use atelier_core::closure::{
    self, ClosureCommand, ClosurePlan, ClosureReceipt, ReviewCommand, ReviewOutcome,
};
use atelier_core::domain::journal::{ActionKind, ApprovalStatus, EntryId, JournalEntry, PendingFilter};
use atelier_core::domain::order::{Order, OrderFilter, OrderId, OrderStatus};
use atelier_core::domain::tenant::{ActorContext, ActorId, TenantId};
use atelier_core::errors::LedgerError;
use atelier_core::ledger::{self, PaymentCommand, PricingAdjustment};

use super::{LedgerRepository, RepositoryError};
use crate::DbPool;

const ORDER_SELECT: &str = "SELECT id, tenant_id, created_by, customer_name, garment_model, category,
        total_price, amount_advanced, amount_remaining, status, delivery_date,
        last_payment_at, closed_at, created_at, updated_at
     FROM orders";

const ENTRY_SELECT: &str = "SELECT id, order_id, tenant_id, actor_id, action_kind, amount_paid,
        remaining_after, label_before, label_after, comment, approval_status,
        reviewer_id, reviewed_at, reviewer_comment, created_at
     FROM journal_entries";

/// SQLite-backed ledger.
///
/// Every mutation opens a transaction whose first statement writes the row it
/// is about to read. That takes the database write lock before the snapshot is
/// read, so concurrent writers on the same order queue up behind
/// `busy_timeout` instead of losing updates.
pub struct SqlLedgerRepository {
    pool: DbPool,
}

impl SqlLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LedgerRepository for SqlLedgerRepository {
    async fn insert_order(&self, order: Order) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO orders (id, tenant_id, created_by, customer_name, garment_model, category,
                                 total_price, amount_advanced, amount_remaining, status,
                                 delivery_date, last_payment_at, closed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.tenant_id.0)
        .bind(&order.created_by.0)
        .bind(&order.customer_name)
        .bind(&order.garment_model)
        .bind(&order.category)
        .bind(order.total_price.to_string())
        .bind(order.amount_advanced.to_string())
        .bind(order.amount_remaining.to_string())
        .bind(order.status.as_str())
        .bind(order.delivery_date.map(|date| date.to_string()))
        .bind(order.last_payment_at.map(encode_timestamp))
        .bind(order.closed_at.map(encode_timestamp))
        .bind(encode_timestamp(order.created_at))
        .bind(encode_timestamp(order.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, id).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let tenant = filter.tenant_id.as_ref().map(|tenant| tenant.0.as_str());
        let created_by = filter.created_by.as_ref().map(|actor| actor.0.as_str());
        let open = filter.open.map(i64::from);
        let from = filter.delivery_from.map(|date| date.to_string());
        let until = filter.delivery_until.map(|date| date.to_string());

        // Delivery windows read as a calendar: earliest delivery first.
        let rows = sqlx::query(&format!(
            "{ORDER_SELECT}
             WHERE (? IS NULL OR tenant_id = ?)
               AND (? IS NULL OR created_by = ?)
               AND (? IS NULL OR is_open = ?)
               AND (? IS NULL OR delivery_date >= ?)
               AND (? IS NULL OR delivery_date <= ?)
             ORDER BY CASE WHEN ? THEN delivery_date END ASC,
                      is_open DESC, COALESCE(closed_at, created_at) DESC, rowid DESC
             LIMIT ?"
        ))
        .bind(tenant)
        .bind(tenant)
        .bind(created_by)
        .bind(created_by)
        .bind(open)
        .bind(open)
        .bind(from.as_deref())
        .bind(from.as_deref())
        .bind(until.as_deref())
        .bind(until.as_deref())
        .bind(filter.has_delivery_window())
        .bind(sql_limit(filter.limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn find_entry(&self, id: &EntryId) -> Result<Option<JournalEntry>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_entry(&mut conn, id).await
    }

    async fn list_pending_entries(
        &self,
        filter: &PendingFilter,
    ) -> Result<Vec<JournalEntry>, RepositoryError> {
        let tenant = filter.tenant_id.as_ref().map(|tenant| tenant.0.as_str());
        let kind = filter.action_kind.map(ActionKind::as_str);
        let from = filter.created_from.map(encode_timestamp);
        let until = filter.created_until.map(encode_timestamp);

        let rows = sqlx::query(&format!(
            "{ENTRY_SELECT}
             WHERE approval_status = 'pending'
               AND (? IS NULL OR tenant_id = ?)
               AND (? IS NULL OR action_kind = ?)
               AND (? IS NULL OR created_at >= ?)
               AND (? IS NULL OR created_at <= ?)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?"
        ))
        .bind(tenant)
        .bind(tenant)
        .bind(kind)
        .bind(kind)
        .bind(from.as_deref())
        .bind(from.as_deref())
        .bind(until.as_deref())
        .bind(until.as_deref())
        .bind(sql_limit(filter.limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn list_entries_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<JournalEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{ENTRY_SELECT} WHERE order_id = ? ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn record_payment(
        &self,
        actor: &ActorContext,
        command: &PaymentCommand,
        now: DateTime<Utc>,
    ) -> Result<(Order, JournalEntry), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut order = lock_order(&mut tx, &command.order_id).await?;
        let entry = ledger::apply_payment(&mut order, actor, command, now)?;
        update_order(&mut tx, &order).await?;
        insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok((order, entry))
    }

    async fn adjust_pricing(
        &self,
        actor: &ActorContext,
        adjustment: &PricingAdjustment,
        now: DateTime<Utc>,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut order = lock_order(&mut tx, &adjustment.order_id).await?;
        ledger::adjust_pricing(&mut order, actor, adjustment, now)?;
        update_order(&mut tx, &order).await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn request_closure(
        &self,
        actor: &ActorContext,
        command: &ClosureCommand,
        now: DateTime<Utc>,
    ) -> Result<(ClosureReceipt, Order), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = lock_order(&mut tx, &command.order_id).await?;
        let existing = fetch_pending_closure(&mut tx, &order.id).await?;
        let plan = closure::plan_closure(&order, actor, command, existing.as_ref(), now)?;

        let receipt = match &plan {
            ClosurePlan::Existing(_) => plan.receipt(),
            ClosurePlan::Append(entry) => match insert_entry(&mut tx, entry).await {
                Ok(()) => plan.receipt(),
                Err(RepositoryError::Database(error)) if is_unique_violation(&error) => {
                    let existing = fetch_pending_closure(&mut tx, &order.id).await?.ok_or_else(|| {
                        RepositoryError::Decode(format!(
                            "pending closure for order `{}` vanished after a unique violation",
                            order.id.0
                        ))
                    })?;
                    ClosureReceipt { entry_id: existing.id, created: false }
                }
                Err(error) => return Err(error),
            },
        };

        tx.commit().await?;
        Ok((receipt, order))
    }

    async fn review_entry(
        &self,
        actor: &ActorContext,
        command: &ReviewCommand,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE journal_entries SET approval_status = approval_status WHERE id = ?",
        )
        .bind(&command.entry_id.0)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Err(LedgerError::entry_not_found(command.entry_id.0.clone()).into());
        }

        let mut entry = fetch_entry(&mut tx, &command.entry_id)
            .await?
            .ok_or_else(|| LedgerError::entry_not_found(command.entry_id.0.clone()))?;
        let mut order = fetch_order(&mut tx, &entry.order_id)
            .await?
            .ok_or_else(|| LedgerError::order_not_found(entry.order_id.0.clone()))?;

        let order_changed = closure::apply_review(&mut entry, &mut order, actor, command, now)?;

        sqlx::query(
            "UPDATE journal_entries
             SET approval_status = ?, reviewer_id = ?, reviewed_at = ?, reviewer_comment = ?
             WHERE id = ?",
        )
        .bind(entry.approval_status.as_str())
        .bind(entry.reviewer_id.as_ref().map(|reviewer| reviewer.0.as_str()))
        .bind(entry.reviewed_at.map(encode_timestamp))
        .bind(&entry.reviewer_comment)
        .bind(&entry.id.0)
        .execute(&mut *tx)
        .await?;
        if order_changed {
            update_order(&mut tx, &order).await?;
        }

        tx.commit().await?;
        Ok(ReviewOutcome { entry, order, order_changed })
    }
}

/// Takes the write lock through a no-op update of the order row, then reads it.
async fn lock_order(conn: &mut SqliteConnection, id: &OrderId) -> Result<Order, RepositoryError> {
    let claimed = sqlx::query("UPDATE orders SET updated_at = updated_at WHERE id = ?")
        .bind(&id.0)
        .execute(&mut *conn)
        .await?;
    if claimed.rows_affected() == 0 {
        return Err(LedgerError::order_not_found(id.0.clone()).into());
    }

    fetch_order(conn, id).await?.ok_or_else(|| LedgerError::order_not_found(id.0.clone()).into())
}

async fn fetch_order(
    conn: &mut SqliteConnection,
    id: &OrderId,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query(&format!("{ORDER_SELECT} WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_order).transpose()
}

async fn fetch_entry(
    conn: &mut SqliteConnection,
    id: &EntryId,
) -> Result<Option<JournalEntry>, RepositoryError> {
    let row = sqlx::query(&format!("{ENTRY_SELECT} WHERE id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_entry).transpose()
}

async fn fetch_pending_closure(
    conn: &mut SqliteConnection,
    order_id: &OrderId,
) -> Result<Option<JournalEntry>, RepositoryError> {
    let row = sqlx::query(&format!(
        "{ENTRY_SELECT}
         WHERE order_id = ? AND action_kind = 'closure_request' AND approval_status = 'pending'"
    ))
    .bind(&order_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_entry).transpose()
}

async fn update_order(conn: &mut SqliteConnection, order: &Order) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE orders
         SET total_price = ?, amount_advanced = ?, amount_remaining = ?, status = ?,
             last_payment_at = ?, closed_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(order.total_price.to_string())
    .bind(order.amount_advanced.to_string())
    .bind(order.amount_remaining.to_string())
    .bind(order.status.as_str())
    .bind(order.last_payment_at.map(encode_timestamp))
    .bind(order.closed_at.map(encode_timestamp))
    .bind(encode_timestamp(order.updated_at))
    .bind(&order.id.0)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &JournalEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO journal_entries (id, order_id, tenant_id, actor_id, action_kind, amount_paid,
                                     remaining_after, label_before, label_after, comment,
                                     approval_status, reviewer_id, reviewed_at, reviewer_comment,
                                     created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.order_id.0)
    .bind(&entry.tenant_id.0)
    .bind(&entry.actor_id.0)
    .bind(entry.action_kind.as_str())
    .bind(entry.amount_paid.to_string())
    .bind(entry.remaining_after.to_string())
    .bind(entry.label_before.as_str())
    .bind(entry.label_after.as_str())
    .bind(&entry.comment)
    .bind(entry.approval_status.as_str())
    .bind(entry.reviewer_id.as_ref().map(|reviewer| reviewer.0.as_str()))
    .bind(entry.reviewed_at.map(encode_timestamp))
    .bind(&entry.reviewer_comment)
    .bind(encode_timestamp(entry.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().map_or(false, |db_error| db_error.is_unique_violation())
}

fn sql_limit(limit: Option<u32>) -> i64 {
    limit.map_or(-1, i64::from)
}

/// Fixed-width UTC text so that lexical order in SQL matches time order.
pub(crate) fn encode_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_order(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;

    Ok(Order {
        id: OrderId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        created_by: ActorId(row.try_get("created_by")?),
        customer_name: row.try_get("customer_name")?,
        garment_model: row.try_get("garment_model")?,
        category: row.try_get("category")?,
        total_price: parse_decimal("total_price", row.try_get("total_price")?)?,
        amount_advanced: parse_decimal("amount_advanced", row.try_get("amount_advanced")?)?,
        amount_remaining: parse_decimal("amount_remaining", row.try_get("amount_remaining")?)?,
        status: parse_status("status", &status)?,
        delivery_date: parse_optional_date("delivery_date", row.try_get("delivery_date")?)?,
        last_payment_at: parse_optional_timestamp(
            "last_payment_at",
            row.try_get("last_payment_at")?,
        )?,
        closed_at: parse_optional_timestamp("closed_at", row.try_get("closed_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<JournalEntry, RepositoryError> {
    let action_kind: String = row.try_get("action_kind")?;
    let approval_status: String = row.try_get("approval_status")?;
    let label_before: String = row.try_get("label_before")?;
    let label_after: String = row.try_get("label_after")?;
    let reviewer_id: Option<String> = row.try_get("reviewer_id")?;

    Ok(JournalEntry {
        id: EntryId(row.try_get("id")?),
        order_id: OrderId(row.try_get("order_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        actor_id: ActorId(row.try_get("actor_id")?),
        action_kind: ActionKind::parse(&action_kind).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown action kind `{action_kind}`"))
        })?,
        amount_paid: parse_decimal("amount_paid", row.try_get("amount_paid")?)?,
        remaining_after: parse_decimal("remaining_after", row.try_get("remaining_after")?)?,
        label_before: parse_status("label_before", &label_before)?,
        label_after: parse_status("label_after", &label_after)?,
        comment: row.try_get("comment")?,
        approval_status: ApprovalStatus::parse(&approval_status).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown approval status `{approval_status}`"))
        })?,
        reviewer_id: reviewer_id.map(ActorId),
        reviewed_at: parse_optional_timestamp("reviewed_at", row.try_get("reviewed_at")?)?,
        reviewer_comment: row.try_get("reviewer_comment")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_status(column: &str, value: &str) -> Result<OrderStatus, RepositoryError> {
    OrderStatus::parse(value).ok_or_else(|| {
        RepositoryError::Decode(format!("invalid order status in `{column}`: `{value}`"))
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|date| {
            NaiveDate::from_str(&date).map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{date}` ({error})"))
            })
        })
        .transpose()
}
