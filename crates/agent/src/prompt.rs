//! System context sent with every model call.
//!
//! Rebuilt on each turn from the live configuration and the practice clock, so edits and
//! opening/closing take effect on the next message.

use std::fmt::Write as _;

use chrono::{NaiveDateTime, Weekday};

use atendia_core::calendar::{format_date, format_time, weekday_key, weekday_of};
use atendia_core::domain::practice::{DaySchedule, PracticeSettings, DEFAULT_SLOT_MINUTES};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const INSTRUCTIONS: &str = "\
INSTRUCCIONES:
1. Para sacar un turno necesitás el nombre del paciente, su obra social (o si es particular), \
la fecha y hora que prefiere y el motivo de la consulta. Pedí los datos de a poco, charlando.
2. Antes de ofrecer o confirmar un horario, consultá SIEMPRE check_availability.
3. Reservá con book_turno recién cuando tengas todos los datos.
4. Para cancelar usá cancel_turno con el número de turno; si no lo sabe, buscalo con get_patient_turnos.
5. Si el consultorio está CERRADO, avisalo y ofrecé sacar turno para cuando abra.
6. Ante dudas médicas, respondé que lo consultás con el profesional y le avisás.
7. No inventes horarios libres: solo ofrecé los que devuelve check_availability.
8. Escribí mensajes cortos, como en un chat de WhatsApp.
9. Convertí expresiones como \"mañana\" o \"el lunes que viene\" a fechas YYYY-MM-DD usando la fecha actual.
10. Al listar horarios, mostrá pocas opciones (5 o 6 como mucho).";

pub fn system_context(settings: &PracticeSettings, now: NaiveDateTime) -> String {
    let name = settings.name.as_deref().unwrap_or("el consultorio");
    let mut prompt = String::with_capacity(2048);

    let _ = writeln!(prompt, "Sos el asistente virtual de {name}.");
    let _ = writeln!(
        prompt,
        "Hablás en español rioplatense (vos, tenés, podés). Sos cordial, profesional y vas al grano."
    );
    prompt.push('\n');

    let _ = writeln!(prompt, "DATOS DEL CONSULTORIO:");
    let _ = writeln!(prompt, "- Nombre: {}", settings.name.as_deref().unwrap_or("Consultorio"));
    let _ = writeln!(prompt, "- Dirección: {}", settings.address.as_deref().unwrap_or("sin datos"));
    let _ = writeln!(prompt, "- Teléfono: {}", settings.phone.as_deref().unwrap_or("sin datos"));
    let _ = writeln!(prompt, "- Horarios:");
    for weekday in WEEK {
        let hours = match settings.schedule_for(weekday) {
            DaySchedule::Open { start, end } => {
                format!("{} a {}", format_time(start), format_time(end))
            }
            DaySchedule::Closed => "cerrado".to_string(),
        };
        let _ = writeln!(prompt, "  {}: {hours}", weekday_key(weekday));
    }
    let _ = writeln!(prompt, "- Servicios: {}", join_or_none(&settings.services));
    let _ = writeln!(prompt, "- Obras sociales: {}", join_or_none(&settings.payers));
    let _ = writeln!(
        prompt,
        "- Duración de cada turno: {} minutos",
        settings.slot_minutes.unwrap_or(DEFAULT_SLOT_MINUTES)
    );
    prompt.push('\n');

    let status = if settings.is_open_at(now) { "ABIERTO" } else { "CERRADO" };
    let _ = writeln!(prompt, "AHORA:");
    let _ = writeln!(
        prompt,
        "- Fecha: {} ({})",
        format_date(now.date()),
        weekday_key(weekday_of(now.date()))
    );
    let _ = writeln!(prompt, "- Hora: {}", format_time(now.time()));
    let _ = writeln!(prompt, "- El consultorio está {status}");
    prompt.push('\n');

    prompt.push_str(INSTRUCTIONS);
    prompt
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "sin datos".to_string()
    } else {
        values.join(", ")
    }
}
