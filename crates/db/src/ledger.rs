//! Authoritative appointment book.
//!
//! Every booking re-reads the practice configuration and the day's bookings, recomputes
//! availability and only then inserts. Writes for one date are serialized by an
//! in-process lock; the partial unique index on confirmed `(date, time)` pairs backs that
//! up across processes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use atendia_core::availability::{self, DayAvailability};
use atendia_core::calendar::{format_date, format_time, Clock};
use atendia_core::domain::appointment::{Appointment, AppointmentId, NewAppointment};
use atendia_core::domain::practice::PracticeSettings;
use atendia_core::errors::DomainError;

use crate::repositories::{AppointmentRepository, PracticeConfigRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingRejection {
    SlotUnavailable,
    PastDate,
    Invalid(String),
}

impl fmt::Display for BookingRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotUnavailable => f.write_str("slot no longer available"),
            Self::PastDate => f.write_str("date is in the past"),
            Self::Invalid(reason) => write!(f, "invalid booking: {reason}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    Confirmed(Appointment),
    Rejected(BookingRejection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Appointment),
    AlreadyCancelled(Appointment),
    NotFound,
}

pub struct BookingLedger {
    appointments: Arc<dyn AppointmentRepository>,
    config: Arc<dyn PracticeConfigRepository>,
    clock: Arc<dyn Clock>,
    date_locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl BookingLedger {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        config: Arc<dyn PracticeConfigRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { appointments, config, clock, date_locks: Mutex::new(HashMap::new()) }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Current practice configuration. Parse problems are logged and degrade to closed days.
    pub async fn practice_settings(&self) -> Result<PracticeSettings, LedgerError> {
        let entries = self.config.get_all().await?;
        let settings = PracticeSettings::from_entries(&entries);
        for issue in &settings.issues {
            warn!(event_name = "ledger.config.malformed", issue = %issue, "practice configuration issue");
        }
        Ok(settings)
    }

    pub async fn availability(&self, date: NaiveDate) -> Result<DayAvailability, LedgerError> {
        let settings = self.practice_settings().await?;
        self.availability_with(&settings, date).await
    }

    pub async fn available_slots(&self, date: NaiveDate) -> Result<Vec<NaiveTime>, LedgerError> {
        Ok(self.availability(date).await?.slots)
    }

    async fn availability_with(
        &self,
        settings: &PracticeSettings,
        date: NaiveDate,
    ) -> Result<DayAvailability, LedgerError> {
        let booked: Vec<NaiveTime> = self
            .appointments
            .list_by_date(date)
            .await?
            .into_iter()
            .map(|appointment| appointment.time)
            .collect();
        Ok(availability::compute(settings, date, &booked))
    }

    pub async fn book(&self, request: NewAppointment) -> Result<BookingOutcome, LedgerError> {
        if let Err(error) = request.validate() {
            return Ok(BookingOutcome::Rejected(BookingRejection::Invalid(error.to_string())));
        }
        if request.date < self.clock.today() {
            return Ok(BookingOutcome::Rejected(BookingRejection::PastDate));
        }

        let date_lock = self.lock_for(request.date).await;
        let _guard = date_lock.lock().await;

        let settings = self.practice_settings().await?;
        let day = self.availability_with(&settings, request.date).await?;
        if !day.contains(request.time) {
            info!(
                event_name = "ledger.booking.rejected",
                date = %format_date(request.date),
                time = %format_time(request.time),
                reason = ?day.unavailable,
                "requested slot is not available"
            );
            return Ok(BookingOutcome::Rejected(BookingRejection::SlotUnavailable));
        }

        match self.appointments.create(request, Utc::now()).await {
            Ok(appointment) => {
                info!(
                    event_name = "ledger.booking.confirmed",
                    appointment_id = appointment.id.0,
                    date = %format_date(appointment.date),
                    time = %format_time(appointment.time),
                    "appointment confirmed"
                );
                Ok(BookingOutcome::Confirmed(appointment))
            }
            Err(RepositoryError::Conflict(detail)) => {
                warn!(event_name = "ledger.booking.conflict", detail = %detail, "slot taken concurrently");
                Ok(BookingOutcome::Rejected(BookingRejection::SlotUnavailable))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn cancel(&self, id: AppointmentId) -> Result<CancelOutcome, LedgerError> {
        let Some(existing) = self.appointments.find_by_id(id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        let date_lock = self.lock_for(existing.date).await;
        let _guard = date_lock.lock().await;

        if self.appointments.cancel(id).await? {
            info!(event_name = "ledger.cancel.applied", appointment_id = id.0, "appointment cancelled");
            let mut cancelled = existing;
            cancelled.cancel()?;
            Ok(CancelOutcome::Cancelled(cancelled))
        } else {
            Ok(CancelOutcome::AlreadyCancelled(existing))
        }
    }

    pub async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>, LedgerError> {
        Ok(self.appointments.find_by_id(id).await?)
    }

    pub async fn by_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, LedgerError> {
        Ok(self.appointments.list_by_date(date).await?)
    }

    pub async fn by_patient(&self, phone: &str) -> Result<Vec<Appointment>, LedgerError> {
        Ok(self.appointments.list_by_phone(phone).await?)
    }

    pub async fn upcoming(&self, limit: u32) -> Result<Vec<Appointment>, LedgerError> {
        Ok(self.appointments.list_upcoming(self.clock.today(), limit).await?)
    }

    pub async fn all(&self, limit: u32) -> Result<Vec<Appointment>, LedgerError> {
        Ok(self.appointments.list_all(limit).await?)
    }

    pub async fn pending_reminders(&self, date: NaiveDate) -> Result<Vec<Appointment>, LedgerError> {
        Ok(self.appointments.list_pending_reminders(date).await?)
    }

    pub async fn mark_reminded(&self, id: AppointmentId) -> Result<bool, LedgerError> {
        Ok(self.appointments.mark_reminded(id).await?)
    }

    async fn lock_for(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.date_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(date).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
