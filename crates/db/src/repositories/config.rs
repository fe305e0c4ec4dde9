use std::collections::BTreeMap;

use sqlx::Row;

use super::{PracticeConfigRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPracticeConfigRepository {
    pool: DbPool,
}

impl SqlPracticeConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PracticeConfigRepository for SqlPracticeConfigRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get("value").map_err(|e| RepositoryError::Decode(e.to_string())))
            .transpose()
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, String>, RepositoryError> {
        let rows = sqlx::query("SELECT key, value FROM config").fetch_all(&self.pool).await?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let key: String =
                row.try_get("key").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let value: String =
                row.try_get("value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            entries.insert(key, value);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::SqlPracticeConfigRepository;
    use crate::repositories::PracticeConfigRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlPracticeConfigRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlPracticeConfigRepository::new(pool)
    }

    #[tokio::test]
    async fn set_overwrites_and_get_all_returns_every_key() {
        let repo = setup().await;

        repo.set("practice_name", "Consultorio Sur").await.expect("set name");
        repo.set("turno_duration", "30").await.expect("set duration");
        repo.set("turno_duration", "45").await.expect("overwrite duration");

        assert_eq!(repo.get("turno_duration").await.expect("get"), Some("45".to_string()));
        assert_eq!(repo.get("missing").await.expect("get missing"), None);

        let all = repo.get_all().await.expect("get all");
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("practice_name").map(String::as_str), Some("Consultorio Sur"));
    }
}
