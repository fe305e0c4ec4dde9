use atendia_db::connection;

use crate::commands::{finish, prepare, CommandResult, EXIT_DATABASE};

/// Preflight only: the long-running process is `atendia-server`.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("start") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connection::connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        let reachable = connection::ping(&pool).await;
        pool.close().await;
        reachable.map_err(|error| ("db_connectivity", format!("database ping failed: {error}"), EXIT_DATABASE))
    });

    finish("start", result, |()| {
        format!(
            "preflight passed: database reachable, http api will listen on {}:{}",
            config.server.bind_address, config.server.port
        )
    })
}
