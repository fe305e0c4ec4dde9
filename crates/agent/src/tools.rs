//! The fixed booking tool catalog and its dispatcher.
//!
//! Results are JSON strings handed back to the model verbatim; availability conflicts and
//! unknown ids are ordinary results, only store failures surface as errors.

use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tracing::{info, warn};

use atendia_core::calendar::{format_date, format_time, parse_date, parse_time};
use atendia_core::domain::appointment::{Appointment, AppointmentId, NewAppointment};
use atendia_db::{BookingLedger, BookingOutcome, BookingRejection, CancelOutcome, LedgerError};

use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::llm::{ToolCall, ToolSpec};

pub const CHECK_AVAILABILITY: &str = "check_availability";
pub const BOOK_APPOINTMENT: &str = "book_turno";
pub const CANCEL_APPOINTMENT: &str = "cancel_turno";
pub const LIST_PATIENT_APPOINTMENTS: &str = "get_patient_turnos";

/// Tools that change the ledger. Once started they run to completion so the reply always
/// reflects what was actually stored.
pub fn writes_ledger(name: &str) -> bool {
    matches!(name, BOOK_APPOINTMENT | CANCEL_APPOINTMENT)
}

/// Slots listed per availability answer; the total is reported separately.
pub const MAX_LISTED_SLOTS: usize = 8;

pub fn catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: CHECK_AVAILABILITY,
            description: "Consulta los horarios disponibles para una fecha. Usar antes de ofrecer o reservar un turno.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Fecha en formato YYYY-MM-DD" }
                },
                "required": ["date"]
            }),
        },
        ToolSpec {
            name: BOOK_APPOINTMENT,
            description: "Reserva un turno para el paciente con el que se está hablando. Solo llamar con todos los datos confirmados.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "patient_name": { "type": "string", "description": "Nombre completo del paciente" },
                    "date": { "type": "string", "description": "Fecha en formato YYYY-MM-DD" },
                    "time": { "type": "string", "description": "Hora en formato HH:MM" },
                    "service": { "type": "string", "description": "Servicio solicitado" },
                    "obra_social": { "type": "string", "description": "Obra social o 'Particular'" }
                },
                "required": ["patient_name", "date", "time", "service", "obra_social"]
            }),
        },
        ToolSpec {
            name: CANCEL_APPOINTMENT,
            description: "Cancela un turno existente del paciente por su número de turno.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "turno_id": { "type": "number", "description": "Número de turno a cancelar" }
                },
                "required": ["turno_id"]
            }),
        },
        ToolSpec {
            name: LIST_PATIENT_APPOINTMENTS,
            description: "Lista los próximos turnos confirmados del paciente.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "phone": { "type": "string", "description": "Teléfono del paciente; por defecto, el de esta conversación" }
                }
            }),
        },
    ]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolInvocation {
    CheckAvailability {
        date: NaiveDate,
    },
    BookAppointment {
        patient_name: String,
        date: NaiveDate,
        time: NaiveTime,
        service: Option<String>,
        payer: Option<String>,
    },
    CancelAppointment {
        id: AppointmentId,
    },
    ListPatientAppointments {
        phone: Option<String>,
    },
    Unknown {
        name: String,
    },
    Malformed {
        name: String,
        reason: String,
    },
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: &Value) -> Self {
        let parsed = match name {
            CHECK_AVAILABILITY => {
                date_arg(arguments, "date").map(|date| Self::CheckAvailability { date })
            }
            BOOK_APPOINTMENT => Self::parse_booking(arguments),
            CANCEL_APPOINTMENT => id_arg(arguments, "turno_id").map(|id| Self::CancelAppointment { id }),
            LIST_PATIENT_APPOINTMENTS => {
                Ok(Self::ListPatientAppointments { phone: optional_text(arguments, "phone") })
            }
            other => return Self::Unknown { name: other.to_string() },
        };

        parsed.unwrap_or_else(|reason| Self::Malformed { name: name.to_string(), reason })
    }

    fn parse_booking(arguments: &Value) -> Result<Self, String> {
        Ok(Self::BookAppointment {
            patient_name: required_text(arguments, "patient_name")?,
            date: date_arg(arguments, "date")?,
            time: time_arg(arguments, "time")?,
            service: optional_text(arguments, "service"),
            payer: optional_text(arguments, "obra_social"),
        })
    }
}

fn optional_text(arguments: &Value, field: &str) -> Option<String> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required_text(arguments: &Value, field: &str) -> Result<String, String> {
    optional_text(arguments, field).ok_or_else(|| format!("missing `{field}`"))
}

fn date_arg(arguments: &Value, field: &str) -> Result<NaiveDate, String> {
    let raw = required_text(arguments, field)?;
    parse_date(&raw).ok_or_else(|| format!("`{field}` must be YYYY-MM-DD, got `{raw}`"))
}

fn time_arg(arguments: &Value, field: &str) -> Result<NaiveTime, String> {
    let raw = required_text(arguments, field)?;
    parse_time(&raw).ok_or_else(|| format!("`{field}` must be HH:MM, got `{raw}`"))
}

/// Models send ids either as numbers or as numeric strings.
fn id_arg(arguments: &Value, field: &str) -> Result<AppointmentId, String> {
    let value = arguments.get(field).ok_or_else(|| format!("missing `{field}`"))?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64))
        .or_else(|| value.as_str().and_then(|raw| raw.trim().parse().ok()))
        .map(AppointmentId)
        .ok_or_else(|| format!("`{field}` must be an appointment number"))
}

/// Executes tool invocations on behalf of one correspondent.
pub struct ToolExecutor<'a> {
    ledger: &'a BookingLedger,
    guardrails: &'a GuardrailPolicy,
    correspondent: &'a str,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(
        ledger: &'a BookingLedger,
        guardrails: &'a GuardrailPolicy,
        correspondent: &'a str,
    ) -> Self {
        Self { ledger, guardrails, correspondent }
    }

    /// Runs one call and renders its result string.
    pub async fn execute(&self, call: &ToolCall) -> Result<String, LedgerError> {
        let invocation = ToolInvocation::parse(&call.name, &call.arguments);
        info!(
            event_name = "agent.tool.invoked",
            tool = %call.name,
            call_id = %call.id,
            correspondent = %self.correspondent,
            "executing tool"
        );
        Ok(self.run(invocation).await?.to_string())
    }

    pub async fn run(&self, invocation: ToolInvocation) -> Result<Value, LedgerError> {
        match invocation {
            ToolInvocation::CheckAvailability { date } => self.check_availability(date).await,
            ToolInvocation::BookAppointment { patient_name, date, time, service, payer } => {
                let request = NewAppointment {
                    patient_name,
                    patient_phone: self.correspondent.to_string(),
                    date,
                    time,
                    service,
                    payer,
                };
                self.book(request).await
            }
            ToolInvocation::CancelAppointment { id } => self.cancel(id).await,
            ToolInvocation::ListPatientAppointments { phone } => {
                let phone = phone.as_deref().unwrap_or(self.correspondent);
                self.list_for(phone).await
            }
            ToolInvocation::Unknown { name } => {
                warn!(event_name = "agent.tool.unknown", tool = %name, "model requested unknown tool");
                Ok(json!({ "error": "Unknown tool", "tool": name }))
            }
            ToolInvocation::Malformed { name, reason } => {
                warn!(event_name = "agent.tool.malformed", tool = %name, reason = %reason, "unusable tool arguments");
                Ok(json!({ "error": format!("Argumentos inválidos para {name}: {reason}") }))
            }
        }
    }

    async fn check_availability(&self, date: NaiveDate) -> Result<Value, LedgerError> {
        if date < self.ledger.clock().today() {
            return Ok(json!({
                "available": false,
                "message": "Esa fecha ya pasó. Elegí una fecha a partir de hoy.",
            }));
        }

        let day = self.ledger.availability(date).await?;
        if day.slots.is_empty() {
            return Ok(json!({
                "available": false,
                "message": "No hay turnos disponibles para esa fecha.",
            }));
        }

        let slots = day.formatted_slots();
        Ok(json!({
            "available": true,
            "date": format_date(date),
            "slots": slots.iter().take(MAX_LISTED_SLOTS).collect::<Vec<_>>(),
            "total": slots.len(),
        }))
    }

    async fn book(&self, request: NewAppointment) -> Result<Value, LedgerError> {
        Ok(match self.ledger.book(request).await? {
            BookingOutcome::Confirmed(appointment) => json!({
                "success": true,
                "turno_id": appointment.id,
                "date": format_date(appointment.date),
                "time": format_time(appointment.time),
                "message": "Turno confirmado",
            }),
            BookingOutcome::Rejected(BookingRejection::SlotUnavailable) => json!({
                "success": false,
                "error": "Ese horario ya no está disponible.",
            }),
            BookingOutcome::Rejected(BookingRejection::PastDate) => json!({
                "success": false,
                "error": "No se pueden reservar turnos en fechas pasadas.",
            }),
            BookingOutcome::Rejected(BookingRejection::Invalid(reason)) => json!({
                "success": false,
                "error": format!("Datos del turno inválidos: {reason}"),
            }),
        })
    }

    async fn cancel(&self, id: AppointmentId) -> Result<Value, LedgerError> {
        let not_found = json!({ "success": false, "error": "Turno no encontrado." });

        let Some(existing) = self.ledger.get(id).await? else {
            return Ok(not_found);
        };
        let decision = self.guardrails.evaluate(&GuardrailIntent::CancelAppointment {
            owner: existing.patient_phone.clone(),
            correspondent: self.correspondent.to_string(),
        });
        if let GuardrailDecision::Deny { reason_code, .. } = decision {
            warn!(
                event_name = "agent.tool.cancel_denied",
                appointment_id = id.0,
                reason_code,
                "cancel attempted on another patient's appointment"
            );
            return Ok(not_found);
        }

        Ok(match self.ledger.cancel(id).await? {
            CancelOutcome::Cancelled(_) => json!({ "success": true, "message": "Turno cancelado" }),
            CancelOutcome::AlreadyCancelled(_) => {
                json!({ "success": true, "message": "El turno ya estaba cancelado" })
            }
            CancelOutcome::NotFound => not_found,
        })
    }

    async fn list_for(&self, phone: &str) -> Result<Value, LedgerError> {
        let today = self.ledger.clock().today();
        let upcoming: Vec<Value> = self
            .ledger
            .by_patient(phone)
            .await?
            .iter()
            .filter(|appointment| appointment.date >= today)
            .map(summarize)
            .collect();
        Ok(json!({ "turnos": upcoming }))
    }
}

fn summarize(appointment: &Appointment) -> Value {
    json!({
        "id": appointment.id,
        "patient_name": appointment.patient_name,
        "date": format_date(appointment.date),
        "time": format_time(appointment.time),
        "service": appointment.service,
        "obra_social": appointment.payer,
    })
}
