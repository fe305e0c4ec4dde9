use std::sync::Arc;

use atendia_agent::{build_client, AgentRuntime, GuardrailPolicy, LlmClient};
use atendia_channel::{
    bridge_channel, bridge::DEFAULT_INBOX_CAPACITY, sender_from_config, BridgeInbox,
    ChannelTransport, MessageSender, NoopTransport, SendError,
};
use atendia_core::calendar::{Clock, SystemClock};
use atendia_core::config::{AppConfig, ChannelMode, ConfigError};
use atendia_core::domain::practice::keys;
use atendia_db::repositories::{
    ConversationRepository, PracticeConfigRepository, RepositoryError, SqlAppointmentRepository,
    SqlConversationRepository, SqlPracticeConfigRepository,
};
use atendia_db::{connection, migrations, BookingLedger, DbPool, DemoPracticeSeed};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub ledger: Arc<BookingLedger>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub practice_config: Arc<dyn PracticeConfigRepository>,
    pub agent: Arc<AgentRuntime>,
    pub sender: Arc<dyn MessageSender>,
    pub transport: Arc<dyn ChannelTransport>,
    /// Present only in bridge mode; handed to the webhook route.
    pub inbox: Option<BridgeInbox>,
}

impl Application {
    pub fn channel_mode(&self) -> &'static str {
        match self.config.channel.mode {
            ChannelMode::Noop => "noop",
            ChannelMode::Bridge => "bridge",
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("first-run practice seed failed: {0}")]
    Seed(#[source] RepositoryError),
    #[error("language model client setup failed: {0}")]
    Llm(String),
    #[error("channel setup failed: {0}")]
    Channel(#[source] SendError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let llm = build_client(&config.llm).map_err(|error| BootstrapError::Llm(format!("{error:#}")))?;
    bootstrap_with_llm(config, llm).await
}

/// Wires every component around an already constructed model client.
pub async fn bootstrap_with_llm(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let db_pool =
        connection::connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let practice_config: Arc<dyn PracticeConfigRepository> =
        Arc::new(SqlPracticeConfigRepository::new(db_pool.clone()));
    seed_on_first_run(practice_config.as_ref()).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.practice.utc_offset_minutes));
    let ledger = Arc::new(BookingLedger::new(
        Arc::new(SqlAppointmentRepository::new(db_pool.clone())),
        practice_config.clone(),
        clock,
    ));
    let conversations: Arc<dyn ConversationRepository> =
        Arc::new(SqlConversationRepository::new(db_pool.clone()));

    let agent = Arc::new(AgentRuntime::new(
        llm,
        ledger.clone(),
        GuardrailPolicy::from_config(&config.agent),
    ));

    let sender = sender_from_config(&config.channel).map_err(BootstrapError::Channel)?;
    let (transport, inbox): (Arc<dyn ChannelTransport>, Option<BridgeInbox>) = match config.channel.mode
    {
        ChannelMode::Noop => (Arc::new(NoopTransport), None),
        ChannelMode::Bridge => {
            let (inbox, transport) = bridge_channel(DEFAULT_INBOX_CAPACITY);
            (Arc::new(transport), Some(inbox))
        }
    };

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        channel_bridge = inbox.is_some(),
        "application components wired"
    );

    Ok(Application {
        config,
        db_pool,
        ledger,
        conversations,
        practice_config,
        agent,
        sender,
        transport,
        inbox,
    })
}

async fn seed_on_first_run(repository: &dyn PracticeConfigRepository) -> Result<(), BootstrapError> {
    let existing = repository.get(keys::PRACTICE_NAME).await.map_err(BootstrapError::Seed)?;
    if existing.is_some() {
        return Ok(());
    }

    let result = DemoPracticeSeed::load(repository).await.map_err(BootstrapError::Seed)?;
    info!(
        event_name = "system.bootstrap.demo_seeded",
        correlation_id = "bootstrap",
        written = result.written.len(),
        "no practice configured; demo practice loaded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use atendia_core::config::{AppConfig, ChannelMode, ConfigOverrides, LlmProvider, LoadOptions};
    use atendia_core::domain::practice::keys;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(database_url: &str) -> ConfigOverrides {
        ConfigOverrides {
            database_url: Some(database_url.to_string()),
            llm_provider: Some(LlmProvider::OpenAi),
            llm_api_key: Some("sk-test".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_bridge_lacks_outbound_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                channel_mode: Some(ChannelMode::Bridge),
                channel_token: Some("bridge-secret".to_string()),
                ..overrides("sqlite::memory:")
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("channel.outbound_url"));
    }

    #[tokio::test]
    async fn first_bootstrap_seeds_demo_practice() {
        let app = bootstrap(LoadOptions { overrides: overrides("sqlite::memory:"), ..LoadOptions::default() })
            .await
            .expect("bootstrap should succeed");

        let name = app.practice_config.get(keys::PRACTICE_NAME).await.expect("read config");
        assert_eq!(name.as_deref(), Some("Consultorio Dental Dra. García"));
        assert!(app.inbox.is_none());
        assert_eq!(app.channel_mode(), "noop");

        let settings = app.ledger.practice_settings().await.expect("settings");
        assert_eq!(settings.daily_capacity, 20);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bridge_mode_provides_a_webhook_inbox() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                channel_mode: Some(ChannelMode::Bridge),
                channel_outbound_url: Some("http://127.0.0.1:9/send".to_string()),
                channel_token: Some("bridge-secret".to_string()),
                ..overrides("sqlite::memory:")
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        assert!(app.inbox.is_some());
        assert_eq!(app.channel_mode(), "bridge");
        app.db_pool.close().await;
    }
}
