use atendia_db::repositories::SqlPracticeConfigRepository;
use atendia_db::{DemoPracticeSeed, SeedResult, VerificationResult};

use crate::commands::{finish, open_store, prepare, CommandResult, Failure, EXIT_MIGRATION, EXIT_QUERY};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let repository = SqlPracticeConfigRepository::new(pool.clone());

        let outcome = async {
            let seeded = DemoPracticeSeed::load(&repository)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
            let verification = DemoPracticeSeed::verify(&repository)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), EXIT_QUERY))?;
            if !verification.all_passed {
                return Err(("seed_verification", verification_failure_message(&verification), EXIT_QUERY));
            }
            Ok::<SeedResult, Failure>(seeded)
        }
        .await;

        pool.close().await;
        outcome
    });

    finish("seed", result, |seeded| summary(&seeded))
}

fn summary(seeded: &SeedResult) -> String {
    let kept = if seeded.skipped.is_empty() {
        "none".to_string()
    } else {
        seeded.skipped.join(", ")
    };
    format!(
        "demo practice ready: {} key(s) written, existing keys kept: {kept}",
        seeded.written.len()
    )
}

fn verification_failure_message(verification: &VerificationResult) -> String {
    let failed = verification
        .checks
        .iter()
        .filter(|check| !check.passed)
        .map(|check| format!("{} ({})", check.name, check.details))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "demo practice verification failed".to_string()
    } else {
        format!("demo practice verification failed for: {}", failed.join(", "))
    }
}
