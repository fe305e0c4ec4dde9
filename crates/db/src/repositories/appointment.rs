use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use atendia_core::calendar::{format_date, format_time, parse_date, parse_time};
use atendia_core::domain::appointment::{
    Appointment, AppointmentId, AppointmentStatus, NewAppointment, REMINDER_MARKER,
};

use super::{AppointmentRepository, RepositoryError};
use crate::DbPool;

const APPOINTMENT_COLUMNS: &str = "id, patient_name, patient_phone, date, time, service,
     obra_social, status, notes, created_at";

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn select(clause: &str) -> String {
    format!("SELECT {APPOINTMENT_COLUMNS} FROM turnos {clause}")
}

fn rows_to_appointments(
    rows: &[sqlx::sqlite::SqliteRow],
) -> Result<Vec<Appointment>, RepositoryError> {
    rows.iter().map(row_to_appointment).collect()
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_appointment(row: &sqlx::sqlite::SqliteRow) -> Result<Appointment, RepositoryError> {
    let id: i64 = decode(row, "id")?;
    let date_str: String = decode(row, "date")?;
    let time_str: String = decode(row, "time")?;
    let status_str: String = decode(row, "status")?;
    let created_at_str: String = decode(row, "created_at")?;

    let date = parse_date(&date_str)
        .ok_or_else(|| RepositoryError::Decode(format!("turno {id} has invalid date `{date_str}`")))?;
    let time = parse_time(&time_str)
        .ok_or_else(|| RepositoryError::Decode(format!("turno {id} has invalid time `{time_str}`")))?;
    let status = AppointmentStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("turno {id} has unknown status `{status_str}`"))
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            RepositoryError::Decode(format!("turno {id} has invalid created_at `{created_at_str}`: {e}"))
        })?;

    Ok(Appointment {
        id: AppointmentId(id),
        patient_name: decode(row, "patient_name")?,
        patient_phone: decode(row, "patient_phone")?,
        date,
        time,
        service: decode(row, "service")?,
        payer: decode(row, "obra_social")?,
        status,
        notes: decode(row, "notes")?,
        created_at,
    })
}

#[async_trait::async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn create(
        &self,
        request: NewAppointment,
        created_at: DateTime<Utc>,
    ) -> Result<Appointment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO turnos (patient_name, patient_phone, date, time, service, obra_social,
                                 status, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'confirmed', NULL, ?)",
        )
        .bind(&request.patient_name)
        .bind(&request.patient_phone)
        .bind(format_date(request.date))
        .bind(format_time(request.time))
        .bind(&request.service)
        .bind(&request.payer)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        let result = match inserted {
            Ok(result) => result,
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                return Err(RepositoryError::Conflict(format!(
                    "{} {} is already booked",
                    format_date(request.date),
                    format_time(request.time)
                )));
            }
            Err(error) => return Err(error.into()),
        };
        tx.commit().await?;

        Ok(request.into_confirmed(AppointmentId(result.last_insert_rowid()), created_at))
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(&select("WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_appointment(r)?)),
            None => Ok(None),
        }
    }

    async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE turnos SET status = 'cancelled' WHERE id = ? AND status = 'confirmed'")
                .bind(id.0)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&select("WHERE date = ? AND status != 'cancelled' ORDER BY time"))
            .bind(format_date(date))
            .fetch_all(&self.pool)
            .await?;
        rows_to_appointments(&rows)
    }

    async fn list_by_phone(&self, phone: &str) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&select(
            "WHERE patient_phone = ? AND status != 'cancelled' ORDER BY date, time",
        ))
        .bind(phone)
        .fetch_all(&self.pool)
        .await?;
        rows_to_appointments(&rows)
    }

    async fn list_upcoming(
        &self,
        from: NaiveDate,
        limit: u32,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&select(
            "WHERE date >= ? AND status = 'confirmed' ORDER BY date, time LIMIT ?",
        ))
        .bind(format_date(from))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows_to_appointments(&rows)
    }

    async fn list_all(&self, limit: u32) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&select("ORDER BY date DESC, time DESC LIMIT ?"))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows_to_appointments(&rows)
    }

    async fn list_pending_reminders(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&select(
            "WHERE date = ? AND status = 'confirmed'
               AND (notes IS NULL OR instr(notes, ?) = 0)
             ORDER BY time",
        ))
        .bind(format_date(date))
        .bind(REMINDER_MARKER)
        .fetch_all(&self.pool)
        .await?;
        rows_to_appointments(&rows)
    }

    async fn mark_reminded(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE turnos
             SET notes = CASE
                 WHEN notes IS NULL OR trim(notes) = '' THEN ?1
                 ELSE notes || ' ' || ?1
             END
             WHERE id = ?2 AND (notes IS NULL OR instr(notes, ?1) = 0)",
        )
        .bind(REMINDER_MARKER)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};

    use atendia_core::domain::appointment::{AppointmentId, AppointmentStatus, NewAppointment};

    use super::SqlAppointmentRepository;
    use crate::repositories::{AppointmentRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlAppointmentRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlAppointmentRepository::new(pool)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).expect("date")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("time")
    }

    fn request(name: &str, phone: &str, day: u32, at: NaiveTime) -> NewAppointment {
        NewAppointment {
            patient_name: name.to_string(),
            patient_phone: phone.to_string(),
            date: date(day),
            time: at,
            service: Some("Control general".to_string()),
            payer: Some("Particular".to_string()),
        }
    }

    #[tokio::test]
    async fn create_then_find_round_trips_every_column() {
        let repo = setup().await;
        let created = repo
            .create(request("Juan Pérez", "5491111111111@c.us", 19, time(9, 0)), Utc::now())
            .await
            .expect("create");

        let found = repo.find_by_id(created.id).await.expect("find").expect("present");
        assert_eq!(found.patient_name, "Juan Pérez");
        assert_eq!(found.time, time(9, 0));
        assert_eq!(found.payer.as_deref(), Some("Particular"));
        assert_eq!(found.status, AppointmentStatus::Confirmed);
        assert_eq!(found.notes, None);
    }

    #[tokio::test]
    async fn confirmed_slot_is_unique_but_cancelled_slot_can_be_rebooked() {
        let repo = setup().await;
        let first = repo
            .create(request("Ana", "111@c.us", 19, time(10, 0)), Utc::now())
            .await
            .expect("first booking");

        let duplicate = repo.create(request("Beto", "222@c.us", 19, time(10, 0)), Utc::now()).await;
        assert!(matches!(duplicate, Err(RepositoryError::Conflict(_))));

        assert!(repo.cancel(first.id).await.expect("cancel"));
        assert!(!repo.cancel(first.id).await.expect("cancel again"));

        repo.create(request("Beto", "222@c.us", 19, time(10, 0)), Utc::now())
            .await
            .expect("rebook after cancel");
    }

    #[tokio::test]
    async fn listings_exclude_cancelled_and_keep_chronological_order() {
        let repo = setup().await;
        repo.create(request("Ana", "111@c.us", 20, time(11, 0)), Utc::now()).await.expect("a");
        repo.create(request("Ana", "111@c.us", 19, time(15, 30)), Utc::now()).await.expect("b");
        let cancelled =
            repo.create(request("Ana", "111@c.us", 19, time(9, 0)), Utc::now()).await.expect("c");
        repo.cancel(cancelled.id).await.expect("cancel");

        let by_phone = repo.list_by_phone("111@c.us").await.expect("by phone");
        let slots: Vec<_> = by_phone.iter().map(|a| (a.date, a.time)).collect();
        assert_eq!(slots, vec![(date(19), time(15, 30)), (date(20), time(11, 0))]);

        let by_date = repo.list_by_date(date(19)).await.expect("by date");
        assert_eq!(by_date.len(), 1);

        let upcoming = repo.list_upcoming(date(20), 10).await.expect("upcoming");
        assert_eq!(upcoming.len(), 1);

        let all = repo.list_all(10).await.expect("all");
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].date, date(20));
    }

    #[tokio::test]
    async fn reminder_marking_is_per_appointment_and_idempotent() {
        let repo = setup().await;
        let first =
            repo.create(request("Ana", "111@c.us", 21, time(9, 0)), Utc::now()).await.expect("a");
        let second =
            repo.create(request("Beto", "222@c.us", 21, time(9, 30)), Utc::now()).await.expect("b");

        assert!(repo.mark_reminded(first.id).await.expect("mark"));
        assert!(!repo.mark_reminded(first.id).await.expect("mark twice"));

        let pending = repo.list_pending_reminders(date(21)).await.expect("pending");
        assert_eq!(pending.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id]);

        let marked = repo.find_by_id(first.id).await.expect("find").expect("present");
        assert!(marked.is_reminded());
        assert!(!repo.mark_reminded(AppointmentId(999)).await.expect("unknown id"));
    }

    #[tokio::test]
    async fn corrupt_created_at_is_a_decode_error() {
        let repo = setup().await;
        let created =
            repo.create(request("Ana", "111@c.us", 22, time(9, 0)), Utc::now()).await.expect("a");
        sqlx::query("UPDATE turnos SET created_at = 'ayer' WHERE id = ?")
            .bind(created.id.0)
            .execute(&repo.pool)
            .await
            .expect("corrupt row");

        let result = repo.find_by_id(created.id).await;
        assert!(matches!(result, Err(RepositoryError::Decode(message)) if message.contains("created_at")));
    }
}
