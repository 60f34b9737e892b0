pub mod commands;

use atelier_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::order::OrderCommand;
use crate::commands::review::ReviewCommand;
use crate::commands::tenant::TenantCommand;

#[derive(Debug, Parser)]
#[command(
    name = "atelier",
    about = "Atelier salon ledger CLI",
    long_about = "Operate the salon order ledger: schema migrations, readiness checks, config inspection, orders, payments and closure reviews.",
    after_help = "Examples:\n  atelier migrate\n  atelier order pay --actor awa --tenant SALON-A --order <id> --amount 5000\n  atelier review pending --actor fatou --role admin --tenant SALON-A"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Register and list salons")]
    Tenant(TenantCommand),
    #[command(subcommand, about = "Create, inspect, pay, reprice and close orders")]
    Order(OrderCommand),
    #[command(subcommand, about = "Work the admin review queue")]
    Review(ReviewCommand),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&AppConfig::load(LoadOptions::default()).unwrap_or_default());

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Tenant(command) => commands::tenant::run(command),
        Command::Order(command) => commands::order::run(command),
        Command::Review(command) => commands::review::run(command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON result line.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};
    use crate::commands::order::OrderCommand;

    #[test]
    fn pay_arguments_parse_into_decimal_amount() {
        let cli = Cli::try_parse_from([
            "atelier", "order", "pay", "--actor", "awa", "--tenant", "SALON-A", "--order", "ORD-1",
            "--amount", "12500.50",
        ])
        .expect("arguments should parse");

        let Command::Order(OrderCommand::Pay { actor, order_id, amount, comment }) = cli.command
        else {
            panic!("expected order pay command");
        };
        assert_eq!(actor.role, "employee");
        assert_eq!(order_id, "ORD-1");
        assert_eq!(amount.to_string(), "12500.50");
        assert!(comment.is_none());
    }

    #[test]
    fn order_list_rejects_open_and_closed_together() {
        let result = Cli::try_parse_from([
            "atelier", "order", "list", "--actor", "root", "--role", "super_admin", "--open",
            "--closed",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn order_list_parses_owner_and_delivery_window() {
        let cli = Cli::try_parse_from([
            "atelier", "order", "list", "--actor", "fatou", "--role", "admin", "--tenant", "SALON-A",
            "--by", "awa", "--due-from", "2026-11-01", "--due-until", "2026-11-30",
        ])
        .expect("arguments should parse");

        let Command::Order(OrderCommand::List { created_by, delivery_from, delivery_until, .. }) =
            cli.command
        else {
            panic!("expected order list command");
        };
        assert_eq!(created_by.as_deref(), Some("awa"));
        assert_eq!(delivery_from.map(|date| date.to_string()).as_deref(), Some("2026-11-01"));
        assert_eq!(delivery_until.map(|date| date.to_string()).as_deref(), Some("2026-11-30"));
    }
}
