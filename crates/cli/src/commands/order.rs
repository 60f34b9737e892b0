use atelier_core::{ActorId, LedgerError, NewOrder, OrderFilter, OrderId};
use chrono::NaiveDate;
use clap::Subcommand;
use rust_decimal::Decimal;

use crate::commands::{run_ledger, to_value, ActorArgs, CommandResult};

#[derive(Debug, Subcommand)]
pub enum OrderCommand {
    #[command(about = "Open a new order for the actor's salon")]
    Create {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long)]
        customer: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        total: Decimal,
        #[arg(long, default_value = "0")]
        advance: Decimal,
        #[arg(long, help = "Override the remaining balance derived from total and advance")]
        remaining: Option<Decimal>,
        #[arg(long, help = "Promised delivery date (YYYY-MM-DD)")]
        delivery: Option<NaiveDate>,
    },
    #[command(about = "Show one order")]
    Show {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "order")]
        order_id: String,
    },
    #[command(about = "List orders visible to the actor, open orders first")]
    List {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long, conflicts_with = "closed")]
        open: bool,
        #[arg(long)]
        closed: bool,
        #[arg(long = "by", help = "Only orders taken by this staff member (admins)")]
        created_by: Option<String>,
        #[arg(long = "due-from", help = "Delivery window start (YYYY-MM-DD), sorts by delivery date")]
        delivery_from: Option<NaiveDate>,
        #[arg(long = "due-until", help = "Delivery window end (YYYY-MM-DD), sorts by delivery date")]
        delivery_until: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<u32>,
    },
    #[command(about = "Show the journal of an order, oldest entry first")]
    History {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "order")]
        order_id: String,
    },
    #[command(about = "Record a payment against an order")]
    Pay {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "order")]
        order_id: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "Correct the price fields of an order (admin only)")]
    Adjust {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "order")]
        order_id: String,
        #[arg(long)]
        total: Decimal,
        #[arg(long)]
        advance: Decimal,
        #[arg(long)]
        remaining: Option<Decimal>,
    },
    #[command(about = "Ask an admin to mark a fully paid order as delivered")]
    Close {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "order")]
        order_id: String,
        #[arg(long)]
        comment: Option<String>,
    },
}

pub fn run(command: OrderCommand) -> CommandResult {
    match command {
        OrderCommand::Create {
            actor,
            customer,
            model,
            category,
            total,
            advance,
            remaining,
            delivery,
        } => run_ledger("order.create", &actor, |service, actor| async move {
            let tenant_id = actor.scope().tenant().cloned().ok_or_else(|| {
                LedgerError::InvalidInput("--tenant is required to create an order".to_owned())
            })?;
            let new_order = NewOrder {
                tenant_id,
                customer_name: customer,
                garment_model: model,
                category,
                total_price: total,
                amount_advanced: advance,
                amount_remaining: remaining,
                delivery_date: delivery,
            };
            let order = service.create_order(&actor, new_order).await?;
            Ok((format!("order {} opened", order.id.0), to_value(&order)?))
        }),
        OrderCommand::Show { actor, order_id } => {
            run_ledger("order.show", &actor, |service, actor| async move {
                let order = service.get_order(&actor, &OrderId(order_id)).await?;
                Ok((
                    format!("order {}: {}", order.id.0, order.status.display_label()),
                    to_value(&order)?,
                ))
            })
        }
        OrderCommand::List {
            actor,
            open,
            closed,
            created_by,
            delivery_from,
            delivery_until,
            limit,
        } => {
            let open = match (open, closed) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            run_ledger("order.list", &actor, |service, actor| async move {
                let filter = OrderFilter {
                    tenant_id: None,
                    created_by: created_by.map(ActorId),
                    open,
                    delivery_from,
                    delivery_until,
                    limit,
                };
                let orders = service.list_orders(&actor, filter).await?;
                Ok((format!("{} order(s)", orders.len()), to_value(&orders)?))
            })
        }
        OrderCommand::History { actor, order_id } => {
            run_ledger("order.history", &actor, |service, actor| async move {
                let entries = service.order_history(&actor, &OrderId(order_id)).await?;
                Ok((format!("{} journal entr(ies)", entries.len()), to_value(&entries)?))
            })
        }
        OrderCommand::Pay { actor, order_id, amount, comment } => {
            run_ledger("order.pay", &actor, |service, actor| async move {
                let order_id = OrderId(order_id);
                let entry = service.record_payment(&actor, &order_id, amount, comment).await?;
                Ok((
                    format!("payment of {} recorded, {} remaining", entry.amount_paid, entry.remaining_after),
                    to_value(&entry)?,
                ))
            })
        }
        OrderCommand::Adjust { actor, order_id, total, advance, remaining } => {
            run_ledger("order.adjust", &actor, |service, actor| async move {
                let order = service
                    .adjust_pricing(&actor, &OrderId(order_id), total, advance, remaining)
                    .await?;
                Ok((format!("order {} repriced", order.id.0), to_value(&order)?))
            })
        }
        OrderCommand::Close { actor, order_id, comment } => {
            run_ledger("order.close", &actor, |service, actor| async move {
                let receipt = service.request_closure(&actor, &OrderId(order_id), comment).await?;
                let message = if receipt.created {
                    "closure request submitted for review"
                } else {
                    "a closure request is already pending"
                };
                Ok((message.to_owned(), to_value(&receipt)?))
            })
        }
    }
}
