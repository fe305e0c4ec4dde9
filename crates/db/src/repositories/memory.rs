use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use atendia_core::calendar::{format_date, format_time};
use atendia_core::domain::appointment::{Appointment, AppointmentId, NewAppointment};
use atendia_core::domain::conversation::{Conversation, ConversationId, ConversationMessage};

use super::{
    AppointmentRepository, ConversationRepository, PracticeConfigRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryPracticeConfigRepository {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryPracticeConfigRepository {
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        Self { entries: RwLock::new(entries) }
    }
}

#[async_trait::async_trait]
impl PracticeConfigRepository for InMemoryPracticeConfigRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, String>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.clone())
    }
}

#[derive(Default)]
struct AppointmentTable {
    next_id: i64,
    rows: BTreeMap<i64, Appointment>,
}

#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    table: RwLock<AppointmentTable>,
}

fn sorted_by_slot(mut appointments: Vec<Appointment>) -> Vec<Appointment> {
    appointments.sort_by_key(|appointment| (appointment.date, appointment.time));
    appointments
}

#[async_trait::async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn create(
        &self,
        request: NewAppointment,
        created_at: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError> {
        let mut table = self.table.write().await;
        let taken = table.rows.values().any(|existing| {
            existing.is_confirmed() && existing.date == request.date && existing.time == request.time
        });
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "{} {} is already booked",
                format_date(request.date),
                format_time(request.time)
            )));
        }

        table.next_id += 1;
        let appointment = request.into_confirmed(AppointmentId(table.next_id), created_at);
        table.rows.insert(appointment.id.0, appointment.clone());
        Ok(appointment)
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id.0).cloned())
    }

    async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id.0) {
            Some(appointment) => {
                appointment.cancel().map_err(|e| RepositoryError::Decode(e.to_string()))
            }
            None => Ok(false),
        }
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError> {
        let table = self.table.read().await;
        Ok(sorted_by_slot(
            table.rows.values().filter(|a| a.date == date && a.is_confirmed()).cloned().collect(),
        ))
    }

    async fn list_by_phone(&self, phone: &str) -> Result<Vec<Appointment>, RepositoryError> {
        let table = self.table.read().await;
        Ok(sorted_by_slot(
            table
                .rows
                .values()
                .filter(|a| a.patient_phone == phone && a.is_confirmed())
                .cloned()
                .collect(),
        ))
    }

    async fn list_upcoming(
        &self,
        from: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let table = self.table.read().await;
        let mut upcoming = sorted_by_slot(
            table.rows.values().filter(|a| a.date >= from && a.is_confirmed()).cloned().collect(),
        );
        upcoming.truncate(limit as usize);
        Ok(upcoming)
    }

    async fn list_all(&self, limit: u32) -> Result<Vec<Appointment>, RepositoryError> {
        let table = self.table.read().await;
        let mut all = sorted_by_slot(table.rows.values().cloned().collect());
        all.reverse();
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn list_pending_reminders(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let table = self.table.read().await;
        Ok(sorted_by_slot(
            table
                .rows
                .values()
                .filter(|a| a.date == date && a.is_confirmed() && !a.is_reminded())
                .cloned()
                .collect(),
        ))
    }

    async fn mark_reminded(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        let mut table = self.table.write().await;
        Ok(table.rows.get_mut(&id.0).map(Appointment::mark_reminded).unwrap_or(false))
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn get_or_create(
        &self,
        correspondent: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let next_id = conversations.len() as i64 + 1;
        Ok(conversations
            .entry(correspondent.to_string())
            .or_insert_with(|| Conversation::new(ConversationId(next_id), correspondent, now))
            .clone())
    }

    async fn append(
        &self,
        correspondent: &str,
        message: ConversationMessage,
    ) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let next_id = conversations.len() as i64 + 1;
        let conversation = conversations.entry(correspondent.to_string()).or_insert_with(|| {
            Conversation::new(ConversationId(next_id), correspondent, message.timestamp)
        });
        conversation.push(message);
        Ok(conversation.clone())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut recent: Vec<Conversation> = conversations.values().cloned().collect();
        recent.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}
