use atelier_core::{ActionKind, EntryId, LedgerError, PendingFilter};
use chrono::{DateTime, Utc};
use clap::Subcommand;

use crate::commands::{run_ledger, to_value, ActorArgs, CommandResult};

#[derive(Debug, Subcommand)]
pub enum ReviewCommand {
    #[command(about = "List journal entries awaiting review, newest first")]
    Pending {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long, help = "payment | closure_request")]
        kind: Option<String>,
        #[arg(long, help = "Only entries created at or after this RFC 3339 instant")]
        from: Option<DateTime<Utc>>,
        #[arg(long, help = "Only entries created at or before this RFC 3339 instant")]
        until: Option<DateTime<Utc>>,
        #[arg(long)]
        limit: Option<u32>,
    },
    #[command(about = "Approve a pending journal entry")]
    Approve {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "entry")]
        entry_id: String,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "Reject a pending journal entry")]
    Reject {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "entry")]
        entry_id: String,
        #[arg(long)]
        comment: Option<String>,
    },
}

pub fn run(command: ReviewCommand) -> CommandResult {
    match command {
        ReviewCommand::Pending { actor, kind, from, until, limit } => {
            run_ledger("review.pending", &actor, |service, actor| async move {
                let action_kind = kind
                    .map(|kind| {
                        ActionKind::parse(&kind).ok_or_else(|| {
                            LedgerError::InvalidInput(format!("unknown action kind `{kind}`"))
                        })
                    })
                    .transpose()?;
                let filter = PendingFilter {
                    tenant_id: None,
                    action_kind,
                    created_from: from,
                    created_until: until,
                    limit,
                };
                let entries = service.list_pending_entries(&actor, filter).await?;
                Ok((format!("{} pending entr(ies)", entries.len()), to_value(&entries)?))
            })
        }
        ReviewCommand::Approve { actor, entry_id, comment } => {
            decide("review.approve", &actor, entry_id, true, comment)
        }
        ReviewCommand::Reject { actor, entry_id, comment } => {
            decide("review.reject", &actor, entry_id, false, comment)
        }
    }
}

fn decide(
    command: &str,
    actor: &ActorArgs,
    entry_id: String,
    approve: bool,
    comment: Option<String>,
) -> CommandResult {
    run_ledger(command, actor, |service, actor| async move {
        let outcome = service.review_entry(&actor, &EntryId(entry_id), approve, comment).await?;
        let message = format!(
            "entry {} {}; order {} is {}",
            outcome.entry.id.0,
            outcome.entry.approval_status.as_str(),
            outcome.order.id.0,
            outcome.order.status.display_label()
        );
        Ok((message, to_value(&outcome)?))
    })
}
