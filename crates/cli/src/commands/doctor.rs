use atendia_core::config::{AppConfig, ChannelMode, LlmProvider, LoadOptions};
use atendia_core::domain::practice::PracticeSettings;
use atendia_db::repositories::{PracticeConfigRepository, SqlPracticeConfigRepository};
use atendia_db::{connection, migrations, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const STORE_CHECKS: [&str; 3] = ["database_connectivity", "schema", "practice_configuration"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_llm(&config));
            checks.push(check_channel(&config));
            checks.extend(check_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["llm_readiness", "channel_readiness"].into_iter().chain(STORE_CHECKS) {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let (overall_status, summary) = if failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    let target = match config.llm.provider {
        LlmProvider::Anthropic => "anthropic messages api",
        LlmProvider::OpenAi => "openai chat completions",
        LlmProvider::Ollama => "ollama (openai-compatible)",
    };
    let endpoint = config.llm.base_url.as_deref().unwrap_or("provider default endpoint");
    DoctorCheck::new(
        "llm_readiness",
        CheckStatus::Pass,
        format!("{target}, model `{}` at {endpoint}", config.llm.model),
    )
}

fn check_channel(config: &AppConfig) -> DoctorCheck {
    match config.channel.mode {
        ChannelMode::Noop => DoctorCheck::new(
            "channel_readiness",
            CheckStatus::Warn,
            "channel mode is noop: inbound messages are never received and replies are dropped",
        ),
        ChannelMode::Bridge => DoctorCheck::new(
            "channel_readiness",
            CheckStatus::Pass,
            format!(
                "bridge mode, outbound to {}",
                config.channel.outbound_url.as_deref().unwrap_or("<unset>")
            ),
        ),
    }
}

fn check_store(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return STORE_CHECKS
                .into_iter()
                .map(|name| {
                    DoctorCheck::new(
                        name,
                        CheckStatus::Fail,
                        format!("failed to initialize async runtime: {error}"),
                    )
                })
                .collect();
        }
    };

    runtime.block_on(async {
        let pool = match connection::connect_from_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new("schema", CheckStatus::Skipped, "skipped without a connection"),
                    DoctorCheck::new(
                        "practice_configuration",
                        CheckStatus::Skipped,
                        "skipped without a connection",
                    ),
                ];
            }
        };

        let checks = vec![
            DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Pass,
                format!("connected using `{}`", config.database.url),
            ),
            check_schema(&pool).await,
            check_practice(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    match migrations::missing_tables(pool).await {
        Ok(missing) if missing.is_empty() => {
            DoctorCheck::new("schema", CheckStatus::Pass, "config, turnos and conversations tables present")
        }
        Ok(missing) => DoctorCheck::new(
            "schema",
            CheckStatus::Fail,
            format!("missing table(s) {}; run `atendia migrate`", missing.join(", ")),
        ),
        Err(error) => DoctorCheck::new("schema", CheckStatus::Fail, format!("schema query failed: {error}")),
    }
}

async fn check_practice(pool: &DbPool) -> DoctorCheck {
    let repository = SqlPracticeConfigRepository::new(pool.clone());
    match repository.get_all().await {
        Ok(entries) if entries.is_empty() => DoctorCheck::new(
            "practice_configuration",
            CheckStatus::Warn,
            "no practice configured; run `atendia seed` or start the server once",
        ),
        Ok(entries) => {
            let settings = PracticeSettings::from_entries(&entries);
            if settings.issues.is_empty() {
                DoctorCheck::new(
                    "practice_configuration",
                    CheckStatus::Pass,
                    format!(
                        "{} configured, capacity {} per day",
                        settings.name.as_deref().unwrap_or("practice"),
                        settings.daily_capacity
                    ),
                )
            } else {
                DoctorCheck::new("practice_configuration", CheckStatus::Warn, settings.issues.join("; "))
            }
        }
        Err(error) => DoctorCheck::new(
            "practice_configuration",
            CheckStatus::Fail,
            format!("could not read practice configuration: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
