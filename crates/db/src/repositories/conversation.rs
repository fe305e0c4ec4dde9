use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use atendia_core::domain::conversation::{Conversation, ConversationId, ConversationMessage};

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Fixed-width so text ordering in SQL matches chronological ordering.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let correspondent: String =
        row.try_get("patient_phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let messages_json: String =
        row.try_get("messages").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let messages: Vec<ConversationMessage> = serde_json::from_str(&messages_json)
        .map_err(|e| RepositoryError::Decode(format!("conversation {id} messages: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            RepositoryError::Decode(format!(
                "conversation {id} has invalid updated_at `{updated_at_str}`: {e}"
            ))
        })?;

    Ok(Conversation { id: ConversationId(id), correspondent, messages, updated_at })
}

async fn latest_for(
    conn: &mut sqlx::SqliteConnection,
    correspondent: &str,
) -> Result<Option<Conversation>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, patient_phone, messages, updated_at
         FROM conversations
         WHERE patient_phone = ?
         ORDER BY updated_at DESC, id DESC
         LIMIT 1",
    )
    .bind(correspondent)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(ref r) => Ok(Some(row_to_conversation(r)?)),
        None => Ok(None),
    }
}

async fn insert_empty(
    conn: &mut sqlx::SqliteConnection,
    correspondent: &str,
    now: DateTime<Utc>,
) -> Result<Conversation, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO conversations (patient_phone, messages, updated_at, created_at)
         VALUES (?, '[]', ?, ?)",
    )
    .bind(correspondent)
    .bind(timestamp(now))
    .bind(timestamp(now))
    .execute(&mut *conn)
    .await?;

    Ok(Conversation::new(ConversationId(result.last_insert_rowid()), correspondent, now))
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn get_or_create(
        &self,
        correspondent: &str,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let conversation = match latest_for(&mut tx, correspondent).await? {
            Some(existing) => existing,
            None => insert_empty(&mut tx, correspondent, now).await?,
        };
        tx.commit().await?;
        Ok(conversation)
    }

    async fn append(
        &self,
        correspondent: &str,
        message: ConversationMessage,
    ) -> Result<Conversation, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut conversation = match latest_for(&mut tx, correspondent).await? {
            Some(existing) => existing,
            None => insert_empty(&mut tx, correspondent, message.timestamp).await?,
        };
        conversation.push(message);

        let messages_json = serde_json::to_string(&conversation.messages)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        sqlx::query("UPDATE conversations SET messages = ?, updated_at = ? WHERE id = ?")
            .bind(messages_json)
            .bind(timestamp(conversation.updated_at))
            .bind(conversation.id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, patient_phone, messages, updated_at
             FROM conversations
             ORDER BY updated_at DESC, id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_conversation).collect::<Result<Vec<_>, _>>()
    }
}
