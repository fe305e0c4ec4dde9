use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use atendia_core::domain::appointment::{Appointment, AppointmentId, NewAppointment};
use atendia_core::domain::conversation::{Conversation, ConversationMessage};

pub mod appointment;
pub mod config;
pub mod conversation;
pub mod memory;

pub use appointment::SqlAppointmentRepository;
pub use config::SqlPracticeConfigRepository;
pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryAppointmentRepository, InMemoryConversationRepository,
    InMemoryPracticeConfigRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Key/value practice configuration.
#[async_trait]
pub trait PracticeConfigRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
    async fn get_all(&self) -> Result<BTreeMap<String, String>, RepositoryError>;
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    /// Inserts a confirmed appointment. A confirmed booking already holding the same
    /// `(date, time)` yields `RepositoryError::Conflict`.
    async fn create(
        &self,
        request: NewAppointment,
        created_at: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError>;

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError>;

    /// Returns `false` when the appointment was already cancelled or does not exist.
    async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError>;

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError>;

    async fn list_by_phone(&self, phone: &str) -> Result<Vec<Appointment>, RepositoryError>;

    async fn list_upcoming(
        &self,
        from: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn list_all(&self, limit: u32) -> Result<Vec<Appointment>, RepositoryError>;

    async fn list_pending_reminders(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn mark_reminded(&self, id: AppointmentId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn get_or_create(
        &self,
        correspondent: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError>;

    /// Appends one message and trims the stored history to the most recent entries.
    async fn append(
        &self,
        correspondent: &str,
        message: ConversationMessage,
    ) -> Result<Conversation, RepositoryError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<Conversation>, RepositoryError>;
}
