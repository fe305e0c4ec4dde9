//! Deterministic slot computation.
//!
//! Availability is a pure function of the practice settings, the requested date and the
//! times already held by non-cancelled appointments on that date. Nothing here is cached.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime, Weekday};

use crate::calendar::{self, minutes_of_day, time_from_minutes};
use crate::domain::practice::{DaySchedule, PracticeSettings};

/// Why a day offers no slots at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unavailability {
    Closed,
    Misconfigured,
    CapacityReached,
    FullyBooked,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub slots: Vec<NaiveTime>,
    pub booked_count: usize,
    pub capacity: u32,
    pub unavailable: Option<Unavailability>,
}

impl DayAvailability {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.slots.contains(&time)
    }

    pub fn formatted_slots(&self) -> Vec<String> {
        self.slots.iter().copied().map(calendar::format_time).collect()
    }
}

/// Every slot start inside `[start, end)` whose full duration fits before closing.
pub fn candidate_grid(schedule: DaySchedule, slot_minutes: u32) -> Vec<NaiveTime> {
    let DaySchedule::Open { start, end } = schedule else {
        return Vec::new();
    };
    if slot_minutes == 0 {
        return Vec::new();
    }

    let close = minutes_of_day(end);
    let mut cursor = minutes_of_day(start);
    let mut grid = Vec::new();
    while let Some(slot_end) = cursor.checked_add(slot_minutes).filter(|slot_end| *slot_end <= close) {
        if let Some(time) = time_from_minutes(cursor) {
            grid.push(time);
        }
        cursor = slot_end;
    }
    grid
}

/// `booked` holds the start times of every non-cancelled appointment on `date`.
pub fn compute(
    settings: &PracticeSettings,
    date: NaiveDate,
    booked: &[NaiveTime],
) -> DayAvailability {
    let weekday = calendar::weekday_of(date);
    let booked_count = booked.len();
    let capacity = settings.daily_capacity;
    let unavailable = |reason| DayAvailability {
        date,
        weekday,
        slots: Vec::new(),
        booked_count,
        capacity,
        unavailable: Some(reason),
    };

    let schedule = settings.schedule_for(weekday);
    if schedule == DaySchedule::Closed {
        return unavailable(Unavailability::Closed);
    }
    let Some(slot_minutes) = settings.slot_minutes else {
        return unavailable(Unavailability::Misconfigured);
    };
    if booked_count >= capacity as usize {
        return unavailable(Unavailability::CapacityReached);
    }

    let taken: BTreeSet<NaiveTime> = booked.iter().copied().collect();
    let slots: Vec<NaiveTime> = candidate_grid(schedule, slot_minutes)
        .into_iter()
        .filter(|candidate| !taken.contains(candidate))
        .collect();

    DayAvailability {
        date,
        weekday,
        unavailable: slots.is_empty().then_some(Unavailability::FullyBooked),
        slots,
        booked_count,
        capacity,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, NaiveDate, NaiveTime, Weekday};

    use super::{candidate_grid, compute, Unavailability};
    use crate::calendar::{minutes_of_day, parse_time};
    use crate::domain::practice::{keys, DaySchedule, PracticeSettings};

    const WEEKDAY_HOURS: &str = r#"{
        "lunes": {"open": true, "start": "09:00", "end": "18:00"},
        "martes": {"open": true, "start": "09:00", "end": "18:00"},
        "miercoles": {"open": true, "start": "09:00", "end": "18:00"},
        "jueves": {"open": true, "start": "09:00", "end": "18:00"},
        "viernes": {"open": true, "start": "09:00", "end": "18:00"},
        "sabado": {"open": true, "start": "09:00", "end": "13:00"},
        "domingo": {"open": false, "start": "", "end": ""}
    }"#;

    fn settings(slot_minutes: &str, capacity: &str) -> PracticeSettings {
        let entries: BTreeMap<String, String> = [
            (keys::OPERATING_HOURS, WEEKDAY_HOURS),
            (keys::SLOT_MINUTES, slot_minutes),
            (keys::DAILY_CAPACITY, capacity),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
        PracticeSettings::from_entries(&entries)
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid monday")
    }

    fn at(value: &str) -> NaiveTime {
        parse_time(value).expect("valid time")
    }

    #[test]
    fn full_weekday_grid_has_eighteen_half_hour_slots() {
        let day = compute(&settings("30", "20"), monday(), &[]);

        assert_eq!(day.slots.len(), 18);
        let formatted = day.formatted_slots();
        assert_eq!(formatted.first().map(String::as_str), Some("09:00"));
        assert_eq!(formatted.get(1).map(String::as_str), Some("09:30"));
        assert_eq!(formatted.last().map(String::as_str), Some("17:30"));
        assert!(!formatted.iter().any(|slot| slot == "09:40"));
        assert_eq!(day.unavailable, None);
    }

    #[test]
    fn booked_time_is_removed_from_the_grid() {
        let day = compute(&settings("30", "20"), monday(), &[at("09:00")]);
        assert_eq!(day.slots.len(), 17);
        assert!(!day.contains(at("09:00")));
        assert!(day.contains(at("09:30")));
    }

    #[test]
    fn closed_days_never_offer_slots() {
        let practice = settings("30", "20");
        for offset in 0..28 {
            let date = monday() + Duration::days(offset);
            let day = compute(&practice, date, &[]);
            if crate::calendar::weekday_of(date) == Weekday::Sun {
                assert!(day.slots.is_empty());
                assert_eq!(day.unavailable, Some(Unavailability::Closed));
            }
        }
    }

    #[test]
    fn every_slot_fits_inside_opening_hours() {
        let practice = settings("45", "40");
        for offset in 0..7 {
            let date = monday() + Duration::days(offset);
            let day = compute(&practice, date, &[]);
            let DaySchedule::Open { start, end } =
                practice.schedule_for(crate::calendar::weekday_of(date))
            else {
                continue;
            };
            for slot in &day.slots {
                assert!(*slot >= start);
                assert!(minutes_of_day(*slot) + 45 <= minutes_of_day(end));
            }
        }
    }

    #[test]
    fn trailing_partial_slot_is_dropped() {
        let grid = candidate_grid(
            DaySchedule::Open { start: at("09:00"), end: at("10:00") },
            25,
        );
        assert_eq!(grid, vec![at("09:00"), at("09:25")]);
    }

    #[test]
    fn capacity_gates_the_whole_day() {
        let booked = [at("09:00"), at("09:30")];
        let day = compute(&settings("30", "2"), monday(), &booked);

        assert!(day.slots.is_empty());
        assert_eq!(day.unavailable, Some(Unavailability::CapacityReached));
    }

    #[test]
    fn unusable_duration_degrades_to_no_slots() {
        let day = compute(&settings("media hora", "20"), monday(), &[]);
        assert!(day.slots.is_empty());
        assert_eq!(day.unavailable, Some(Unavailability::Misconfigured));
    }

    #[test]
    fn day_long_or_larger_duration_degrades_to_no_slots() {
        for raw in ["1440", "4294967295"] {
            let day = compute(&settings(raw, "20"), monday(), &[]);
            assert!(day.slots.is_empty(), "duration {raw} produced slots");
            assert_eq!(day.unavailable, Some(Unavailability::Misconfigured));
        }
    }

    #[test]
    fn grid_stops_instead_of_overflowing_on_huge_steps() {
        let grid = candidate_grid(
            DaySchedule::Open { start: at("09:00"), end: at("18:00") },
            u32::MAX,
        );
        assert!(grid.is_empty());
    }

    #[test]
    fn saturday_half_day_ends_at_twelve_thirty() {
        let saturday = monday() + Duration::days(5);
        let day = compute(&settings("30", "20"), saturday, &[]);
        assert_eq!(day.slots.len(), 8);
        assert_eq!(day.slots.last().copied(), Some(at("12:30")));
    }
}
