pub mod config;
pub mod doctor;
pub mod migrate;
pub mod order;
pub mod review;
pub mod tenant;

use std::future::Future;

use atelier_core::config::{AppConfig, LoadOptions};
use atelier_core::{ActorContext, ErrorKind, LedgerError, Role, TenantId};
use atelier_db::{connect_with_settings, DbPool, LedgerService};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn ledger_failure(command: &str, error: &LedgerError) -> Self {
        let kind = error.kind();
        Self::failure(command, kind.as_str(), error.to_string(), ledger_exit_code(kind))
    }
}

/// Exit codes 2..=5 belong to the bootstrap steps shared with `migrate`.
pub fn ledger_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::NotFound => 6,
        ErrorKind::Forbidden => 7,
        ErrorKind::InvalidInput => 8,
        ErrorKind::NotFullyPaid => 9,
        ErrorKind::InvalidState => 10,
        ErrorKind::Unavailable => 11,
    }
}

/// Caller identity as given on the command line.
#[derive(Debug, Clone, clap::Args)]
pub struct ActorArgs {
    #[arg(long = "actor", help = "Identifier of the staff member running the command")]
    pub actor_id: String,
    #[arg(long, default_value = "employee", help = "employee | admin | super_admin")]
    pub role: String,
    #[arg(long = "tenant", help = "Salon the actor belongs to (optional for super_admin)")]
    pub tenant_id: Option<String>,
}

impl ActorArgs {
    pub fn to_context(&self) -> Result<ActorContext, LedgerError> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            LedgerError::InvalidInput(format!("unknown role `{}`", self.role))
        })?;
        let context =
            ActorContext::from_parts(self.actor_id.clone(), role, self.tenant_id.clone().map(TenantId))?;
        let correlation_id = format!("cli-{}", chrono::Utc::now().timestamp_micros());
        Ok(context.with_correlation_id(correlation_id))
    }
}

/// Config and runtime every database-backed command starts from.
pub(crate) struct Bootstrap {
    pub config: AppConfig,
    pub runtime: Runtime,
}

/// Exit code 2 for config problems, 3 when no runtime can be built.
pub(crate) fn bootstrap(command: &str) -> Result<Bootstrap, CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok(Bootstrap { config, runtime })
}

pub(crate) async fn open_pool(command: &str, config: &AppConfig) -> Result<DbPool, CommandResult> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| CommandResult::failure(command, "db_connectivity", error.to_string(), 4))
}

/// Opens the database and hands a ready service to `operation`, which returns
/// the success message and the JSON payload to embed.
pub fn run_ledger<F, Fut>(command: &str, actor: &ActorArgs, operation: F) -> CommandResult
where
    F: FnOnce(LedgerService, ActorContext) -> Fut,
    Fut: Future<Output = Result<(String, Value), LedgerError>>,
{
    let Bootstrap { config, runtime } = match bootstrap(command) {
        Ok(bootstrap) => bootstrap,
        Err(failure) => return failure,
    };

    let actor = match actor.to_context() {
        Ok(actor) => actor,
        Err(error) => return CommandResult::ledger_failure(command, &error),
    };

    runtime.block_on(async {
        let pool = match open_pool(command, &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };

        let service =
            LedgerService::sqlite(pool.clone()).with_pending_limit(config.ledger.pending_limit);
        let result = operation(service, actor).await;
        pool.close().await;

        match result {
            Ok((message, data)) => CommandResult::success_with(command, message, Some(data)),
            Err(error) => CommandResult::ledger_failure(command, &error),
        }
    })
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, LedgerError> {
    serde_json::to_value(value)
        .map_err(|error| LedgerError::Unavailable(format!("could not encode result: {error}")))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
