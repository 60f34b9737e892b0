use crate::commands::{bootstrap, open_pool, Bootstrap, CommandResult};
use atelier_db::migrations;

pub fn run() -> CommandResult {
    let Bootstrap { config, runtime } = match bootstrap("migrate") {
        Ok(bootstrap) => bootstrap,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let pool = match open_pool("migrate", &config).await {
            Ok(pool) => pool,
            Err(failure) => return failure,
        };

        let applied = match migrations::run_pending(&pool).await {
            Ok(()) => migrations::applied_count(&pool).await.map_err(|error| error.to_string()),
            Err(error) => Err(error.to_string()),
        };
        pool.close().await;

        match applied {
            Ok(applied) => CommandResult::success(
                "migrate",
                format!("ledger schema up to date ({applied} migration(s) applied)"),
            ),
            Err(message) => CommandResult::failure("migrate", "migration", message, 5),
        }
    })
}
