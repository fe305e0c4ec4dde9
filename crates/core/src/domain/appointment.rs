use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::hhmm;
use crate::errors::DomainError;

/// Note annotation written once a reminder has been delivered.
pub const REMINDER_MARKER: &str = "reminder_sent";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentId(pub i64);

impl std::fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub patient_name: String,
    pub patient_phone: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub service: Option<String>,
    pub payer: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }

    pub fn is_reminded(&self) -> bool {
        self.notes.as_deref().is_some_and(|notes| notes.contains(REMINDER_MARKER))
    }

    /// Cancelling twice is allowed; the second call changes nothing.
    pub fn cancel(&mut self) -> Result<bool, DomainError> {
        match self.status {
            AppointmentStatus::Confirmed => {
                self.status = AppointmentStatus::Cancelled;
                Ok(true)
            }
            AppointmentStatus::Cancelled => Ok(false),
        }
    }

    /// Appends the reminder marker unless already present. Returns whether it changed.
    pub fn mark_reminded(&mut self) -> bool {
        if self.is_reminded() {
            return false;
        }
        self.notes = Some(match self.notes.take() {
            Some(notes) if !notes.trim().is_empty() => format!("{notes} {REMINDER_MARKER}"),
            _ => REMINDER_MARKER.to_string(),
        });
        true
    }
}

/// Booking request as accepted by the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAppointment {
    pub patient_name: String,
    pub patient_phone: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub service: Option<String>,
    pub payer: Option<String>,
}

impl NewAppointment {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.patient_name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("patient name is required".to_string()));
        }
        if self.patient_phone.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "patient identifier is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_confirmed(self, id: AppointmentId, created_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id,
            patient_name: self.patient_name,
            patient_phone: self.patient_phone,
            date: self.date,
            time: self.time,
            service: self.service,
            payer: self.payer,
            status: AppointmentStatus::Confirmed,
            notes: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};

    use super::{AppointmentId, AppointmentStatus, NewAppointment, REMINDER_MARKER};

    fn request() -> NewAppointment {
        NewAppointment {
            patient_name: "Juan Pérez".to_string(),
            patient_phone: "5491112345678@c.us".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"),
            time: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            service: Some("Limpieza dental".to_string()),
            payer: Some("OSDE".to_string()),
        }
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut appointment = request().into_confirmed(AppointmentId(1), Utc::now());
        assert_eq!(appointment.cancel(), Ok(true));
        assert_eq!(appointment.cancel(), Ok(false));
        assert_eq!(appointment.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn reminder_marker_is_written_once() {
        let mut appointment = request().into_confirmed(AppointmentId(1), Utc::now());
        appointment.notes = Some("primera consulta".to_string());

        assert!(appointment.mark_reminded());
        assert!(!appointment.mark_reminded());
        assert_eq!(appointment.notes.as_deref(), Some("primera consulta reminder_sent"));
        assert_eq!(appointment.notes.as_deref().map(|n| n.matches(REMINDER_MARKER).count()), Some(1));
    }

    #[test]
    fn serializes_time_as_hour_minute() {
        let appointment = request().into_confirmed(AppointmentId(7), Utc::now());
        let json = serde_json::to_value(&appointment).expect("serialize");
        assert_eq!(json["id"], 7);
        assert_eq!(json["date"], "2026-10-19");
        assert_eq!(json["time"], "09:00");
        assert_eq!(json["status"], "confirmed");
    }

    #[test]
    fn blank_patient_name_is_rejected() {
        let mut invalid = request();
        invalid.patient_name = "  ".to_string();
        assert!(invalid.validate().is_err());
    }
}
