use atelier_core::TenantId;
use clap::Subcommand;

use crate::commands::{run_ledger, to_value, ActorArgs, CommandResult};

#[derive(Debug, Subcommand)]
pub enum TenantCommand {
    #[command(about = "Register a salon (super admin only)")]
    Create {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long = "id")]
        tenant_id: String,
        #[arg(long)]
        name: String,
    },
    #[command(about = "List the salons visible to the actor")]
    List {
        #[command(flatten)]
        actor: ActorArgs,
    },
}

pub fn run(command: TenantCommand) -> CommandResult {
    match command {
        TenantCommand::Create { actor, tenant_id, name } => {
            run_ledger("tenant.create", &actor, |service, actor| async move {
                let tenant = service.create_tenant(&actor, TenantId(tenant_id), &name).await?;
                Ok((format!("tenant {} registered", tenant.id.0), to_value(&tenant)?))
            })
        }
        TenantCommand::List { actor } => {
            run_ledger("tenant.list", &actor, |service, actor| async move {
                let tenants = service.list_tenants(&actor).await?;
                Ok((format!("{} tenant(s)", tenants.len()), to_value(&tenants)?))
            })
        }
    }
}
