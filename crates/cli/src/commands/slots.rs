use std::sync::Arc;

use atendia_core::availability::{DayAvailability, Unavailability};
use atendia_core::calendar::{format_date, parse_date, weekday_key, SystemClock};
use atendia_db::repositories::{SqlAppointmentRepository, SqlPracticeConfigRepository};
use atendia_db::BookingLedger;

use crate::commands::{finish, open_store, prepare, CommandResult, Failure, EXIT_QUERY};

pub fn run(date: &str) -> CommandResult {
    let Some(date) = parse_date(date) else {
        return CommandResult::failure(
            "slots",
            "invalid_argument",
            format!("invalid date `{date}`, expected YYYY-MM-DD"),
            EXIT_QUERY,
        );
    };

    let (config, runtime) = match prepare("slots") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let ledger = BookingLedger::new(
            Arc::new(SqlAppointmentRepository::new(pool.clone())),
            Arc::new(SqlPracticeConfigRepository::new(pool.clone())),
            Arc::new(SystemClock::new(config.practice.utc_offset_minutes)),
        );
        let availability = ledger
            .availability(date)
            .await
            .map_err(|error| ("availability_query", error.to_string(), EXIT_QUERY));
        pool.close().await;
        Ok::<DayAvailability, Failure>(availability?)
    });

    finish("slots", result, |availability| describe(&availability))
}

pub fn describe(availability: &DayAvailability) -> String {
    let day = format!("{} ({})", format_date(availability.date), weekday_key(availability.weekday));
    match availability.unavailable {
        Some(Unavailability::Closed) => format!("{day}: closed"),
        Some(Unavailability::Misconfigured) => {
            format!("{day}: no slots, practice hours are misconfigured")
        }
        Some(Unavailability::CapacityReached) => format!(
            "{day}: daily capacity reached ({}/{})",
            availability.booked_count, availability.capacity
        ),
        Some(Unavailability::FullyBooked) => format!("{day}: every slot is booked"),
        None => format!(
            "{day}: {} free slot(s): {}",
            availability.slots.len(),
            availability.formatted_slots().join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Weekday};

    use atendia_core::availability::{DayAvailability, Unavailability};

    use super::describe;

    fn day(slots: Vec<NaiveTime>, unavailable: Option<Unavailability>) -> DayAvailability {
        DayAvailability {
            date: NaiveDate::from_ymd_opt(2026, 10, 19).expect("date"),
            weekday: Weekday::Mon,
            slots,
            booked_count: 20,
            capacity: 20,
            unavailable,
        }
    }

    #[test]
    fn lists_free_slots() {
        let slots = vec![
            NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            NaiveTime::from_hms_opt(9, 30, 0).expect("time"),
        ];
        assert_eq!(describe(&day(slots, None)), "2026-10-19 (lunes): 2 free slot(s): 09:00, 09:30");
    }

    #[test]
    fn explains_empty_days() {
        assert_eq!(
            describe(&day(Vec::new(), Some(Unavailability::CapacityReached))),
            "2026-10-19 (lunes): daily capacity reached (20/20)"
        );
        assert_eq!(describe(&day(Vec::new(), Some(Unavailability::Closed))), "2026-10-19 (lunes): closed");
    }
}
