use std::env;
use std::sync::{Mutex, OnceLock};

use atelier_cli::commands::order::OrderCommand;
use atelier_cli::commands::review::ReviewCommand;
use atelier_cli::commands::tenant::TenantCommand;
use atelier_cli::commands::{config, doctor, migrate, order, review, tenant, ActorArgs};
use rust_decimal::Decimal;
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("ATELIER_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("ATELIER_DATABASE_URL", "postgres://localhost/atelier")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ledger_command_reports_config_failure_before_touching_the_store() {
    with_env(&[("ATELIER_LEDGER_PENDING_LIMIT", "0")], || {
        let result = review::run(ReviewCommand::Pending {
            actor: admin("fatou"),
            kind: None,
            from: None,
            until: None,
            limit: None,
        });
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn order_lifecycle_runs_through_payment_closure_and_review() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    with_env(&[("ATELIER_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let created = tenant::run(TenantCommand::Create {
            actor: super_admin("root"),
            tenant_id: "SALON-A".to_string(),
            name: "Couture Awa".to_string(),
        });
        assert_eq!(created.exit_code, 0, "{}", created.output);

        let opened = parse_payload(
            &order::run(OrderCommand::Create {
                actor: employee("awa"),
                customer: "Mariama Diallo".to_string(),
                model: "Grand boubou".to_string(),
                category: Some("ceremonie".to_string()),
                total: Decimal::from(20_000),
                advance: Decimal::from(5_000),
                remaining: None,
                delivery: None,
            })
            .output,
        );
        assert_eq!(opened["status"], "ok");
        assert_eq!(opened["data"]["status"], "open");
        assert_eq!(opened["data"]["amount_remaining"], "15000");
        let order_id = opened["data"]["id"].as_str().expect("order id").to_string();

        let early = order::run(OrderCommand::Close {
            actor: employee("awa"),
            order_id: order_id.clone(),
            comment: None,
        });
        assert_eq!(early.exit_code, 9);
        assert_eq!(parse_payload(&early.output)["error_class"], "not_fully_paid");

        let paid = order::run(OrderCommand::Pay {
            actor: employee("awa"),
            order_id: order_id.clone(),
            amount: Decimal::from(15_000),
            comment: Some("solde".to_string()),
        });
        assert_eq!(paid.exit_code, 0, "{}", paid.output);
        assert_eq!(parse_payload(&paid.output)["data"]["remaining_after"], "0");

        let shown = parse_payload(
            &order::run(OrderCommand::Show { actor: employee("awa"), order_id: order_id.clone() })
                .output,
        );
        assert_eq!(shown["data"]["status"], "fully_paid");

        let first = parse_payload(
            &order::run(OrderCommand::Close {
                actor: employee("awa"),
                order_id: order_id.clone(),
                comment: Some("cliente passe demain".to_string()),
            })
            .output,
        );
        assert_eq!(first["data"]["created"], true);
        let entry_id = first["data"]["entry_id"].as_str().expect("entry id").to_string();

        let second = parse_payload(
            &order::run(OrderCommand::Close {
                actor: employee("awa"),
                order_id: order_id.clone(),
                comment: None,
            })
            .output,
        );
        assert_eq!(second["data"]["created"], false);
        assert_eq!(second["data"]["entry_id"], entry_id.as_str());

        let queue = parse_payload(
            &review::run(ReviewCommand::Pending {
                actor: admin("fatou"),
                kind: Some("closure_request".to_string()),
                from: None,
                until: None,
                limit: None,
            })
            .output,
        );
        let queue = queue["data"].as_array().expect("pending entries");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0]["id"], entry_id.as_str());

        let approved = parse_payload(
            &review::run(ReviewCommand::Approve {
                actor: admin("fatou"),
                entry_id: entry_id.clone(),
                comment: None,
            })
            .output,
        );
        assert_eq!(approved["status"], "ok");
        assert_eq!(approved["data"]["entry"]["approval_status"], "approved");
        assert_eq!(approved["data"]["order"]["status"], "delivered");

        let again = review::run(ReviewCommand::Reject {
            actor: admin("fatou"),
            entry_id,
            comment: None,
        });
        assert_eq!(again.exit_code, 10);
        assert_eq!(parse_payload(&again.output)["error_class"], "invalid_state");

        let history = parse_payload(
            &order::run(OrderCommand::History { actor: employee("awa"), order_id }).output,
        );
        let history = history["data"].as_array().expect("journal entries");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0]["action_kind"], "payment");
        assert_eq!(history[1]["action_kind"], "closure_request");
    });
}

#[test]
fn employees_cannot_open_the_review_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    with_env(&[("ATELIER_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = review::run(ReviewCommand::Pending {
            actor: employee("awa"),
            kind: None,
            from: None,
            until: None,
            limit: None,
        });
        assert_eq!(result.exit_code, 7);
        assert_eq!(parse_payload(&result.output)["error_class"], "forbidden");
    });
}

#[test]
fn orders_for_unknown_salons_are_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    with_env(&[("ATELIER_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = order::run(OrderCommand::Create {
            actor: employee("awa"),
            customer: "Mariama Diallo".to_string(),
            model: "Taille basse".to_string(),
            category: None,
            total: Decimal::from(10_000),
            advance: Decimal::ZERO,
            remaining: None,
            delivery: None,
        });
        assert_eq!(result.exit_code, 6);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

#[test]
fn order_listing_defaults_to_own_orders_and_reads_as_a_calendar() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    with_env(&[("ATELIER_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);
        let created = tenant::run(TenantCommand::Create {
            actor: super_admin("root"),
            tenant_id: "SALON-A".to_string(),
            name: "Couture Awa".to_string(),
        });
        assert_eq!(created.exit_code, 0, "{}", created.output);

        for (staff, due) in [("awa", "2026-11-20"), ("awa", "2026-11-12"), ("binta", "2026-11-15")] {
            let opened = order::run(OrderCommand::Create {
                actor: employee(staff),
                customer: "Mariama Diallo".to_string(),
                model: "Taille basse".to_string(),
                category: None,
                total: Decimal::from(10_000),
                advance: Decimal::ZERO,
                remaining: None,
                delivery: Some(due.parse().expect("date")),
            });
            assert_eq!(opened.exit_code, 0, "{}", opened.output);
        }

        let own = parse_payload(
            &order::run(OrderCommand::List {
                actor: employee("awa"),
                open: false,
                closed: false,
                created_by: None,
                delivery_from: None,
                delivery_until: None,
                limit: None,
            })
            .output,
        );
        let own = own["data"].as_array().expect("orders");
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|order| order["created_by"] == "awa"));

        let calendar = parse_payload(
            &order::run(OrderCommand::List {
                actor: admin("fatou"),
                open: true,
                closed: false,
                created_by: None,
                delivery_from: Some("2026-11-01".parse().expect("date")),
                delivery_until: Some("2026-11-30".parse().expect("date")),
                limit: None,
            })
            .output,
        );
        let dates: Vec<_> = calendar["data"]
            .as_array()
            .expect("orders")
            .iter()
            .filter_map(|order| order["delivery_date"].as_str())
            .collect();
        assert_eq!(dates, vec!["2026-11-12", "2026-11-15", "2026-11-20"]);

        let unknown = order::run(OrderCommand::Show {
            actor: employee("awa"),
            order_id: "no-such-order".to_string(),
        });
        assert_eq!(unknown.exit_code, 7);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "forbidden");
    });
}

#[test]
fn doctor_reports_missing_schema_until_migrated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());

    with_env(&[("ATELIER_DATABASE_URL", url.as_str())], || {
        let before = parse_payload(&doctor::run(true));
        assert_eq!(before["overall_status"], "fail");
        assert_eq!(check_status(&before, "database_connectivity"), "pass");
        assert_eq!(check_status(&before, "schema_migrations"), "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = parse_payload(&doctor::run(true));
        assert_eq!(after["overall_status"], "pass");
        assert_eq!(check_status(&after, "schema_migrations"), "pass");
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("ATELIER_LEDGER_CURRENCY", "cfa")], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "skipped");
        assert_eq!(check_status(&report, "schema_migrations"), "skipped");

        let human = doctor::run(false);
        assert!(human.starts_with("doctor: one or more readiness checks failed"));
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("ATELIER_LEDGER_CURRENCY", "EUR"), ("ATELIER_LOG_FORMAT", "json")], || {
        let output = config::run();

        assert!(output.contains("- ledger.currency = EUR (source: env (ATELIER_LEDGER_CURRENCY))"));
        assert!(output.contains("- logging.format = json (source: env (ATELIER_LOG_FORMAT))"));
        assert!(output.contains("- ledger.pending_limit = 100 (source: default)"));
        assert_eq!(last_line(&output), "- ledger.pending_limit = 100 (source: default)");
    });
}

fn employee(actor_id: &str) -> ActorArgs {
    actor(actor_id, "employee", Some("SALON-A"))
}

fn admin(actor_id: &str) -> ActorArgs {
    actor(actor_id, "admin", Some("SALON-A"))
}

fn super_admin(actor_id: &str) -> ActorArgs {
    actor(actor_id, "super_admin", None)
}

fn actor(actor_id: &str, role: &str, tenant_id: Option<&str>) -> ActorArgs {
    ActorArgs {
        actor_id: actor_id.to_string(),
        role: role.to_string(),
        tenant_id: tenant_id.map(str::to_string),
    }
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .expect("checks array")
        .iter()
        .find(|check| check["name"] == name)
        .and_then(|check| check["status"].as_str())
        .unwrap_or("missing")
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ATELIER_DATABASE_URL",
        "ATELIER_DATABASE_MAX_CONNECTIONS",
        "ATELIER_DATABASE_TIMEOUT_SECS",
        "ATELIER_LOGGING_LEVEL",
        "ATELIER_LOGGING_FORMAT",
        "ATELIER_LOG_LEVEL",
        "ATELIER_LOG_FORMAT",
        "ATELIER_LEDGER_CURRENCY",
        "ATELIER_LEDGER_PENDING_LIMIT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
