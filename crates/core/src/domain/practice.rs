use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::{self, parse_time};

pub mod keys {
    pub const PRACTICE_NAME: &str = "practice_name";
    pub const PRACTICE_ADDRESS: &str = "practice_address";
    pub const PRACTICE_PHONE: &str = "practice_phone";
    pub const OPERATING_HOURS: &str = "operating_hours";
    pub const SERVICES: &str = "services";
    pub const PAYERS: &str = "obras_sociales";
    pub const SLOT_MINUTES: &str = "turno_duration";
    pub const DAILY_CAPACITY: &str = "max_turnos_per_day";
}

pub const DEFAULT_SLOT_MINUTES: u32 = 30;
pub const DEFAULT_DAILY_CAPACITY: u32 = 20;
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Raw shape of one `operating_hours` entry as stored in configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHoursEntry {
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DaySchedule {
    Closed,
    Open { start: NaiveTime, end: NaiveTime },
}

/// Typed view over the practice key/value configuration.
///
/// Parsing never fails: anything unusable degrades to a closed day or zero capacity and
/// is recorded in `issues` so callers can log it.
#[derive(Clone, Debug, PartialEq)]
pub struct PracticeSettings {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub hours: HashMap<Weekday, DaySchedule>,
    /// `None` when the stored duration is unusable.
    pub slot_minutes: Option<u32>,
    pub daily_capacity: u32,
    pub services: Vec<String>,
    pub payers: Vec<String>,
    pub issues: Vec<String>,
}

impl PracticeSettings {
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        let mut issues = Vec::new();
        let text = |key: &str| {
            entries.get(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };

        let hours = match entries.get(keys::OPERATING_HOURS) {
            Some(raw) => parse_hours(raw, &mut issues),
            None => HashMap::new(),
        };

        let slot_minutes = match text(keys::SLOT_MINUTES) {
            None => Some(DEFAULT_SLOT_MINUTES),
            Some(raw) => match raw.parse::<u32>() {
                Ok(minutes) if minutes > 0 && minutes < MINUTES_PER_DAY => Some(minutes),
                _ => {
                    issues.push(format!(
                        "{} `{raw}` is not a whole number of minutes shorter than a day",
                        keys::SLOT_MINUTES
                    ));
                    None
                }
            },
        };

        let daily_capacity = match text(keys::DAILY_CAPACITY) {
            None => DEFAULT_DAILY_CAPACITY,
            Some(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
                issues.push(format!("{} `{raw}` is not an integer", keys::DAILY_CAPACITY));
                0
            }),
        };

        Self {
            name: text(keys::PRACTICE_NAME),
            address: text(keys::PRACTICE_ADDRESS),
            phone: text(keys::PRACTICE_PHONE),
            hours,
            slot_minutes,
            daily_capacity,
            services: parse_list(entries.get(keys::SERVICES), keys::SERVICES, &mut issues),
            payers: parse_list(entries.get(keys::PAYERS), keys::PAYERS, &mut issues),
            issues,
        }
    }

    pub fn schedule_for(&self, weekday: Weekday) -> DaySchedule {
        self.hours.get(&weekday).copied().unwrap_or(DaySchedule::Closed)
    }

    pub fn is_open_at(&self, now: NaiveDateTime) -> bool {
        match self.schedule_for(calendar::weekday_of(now.date())) {
            DaySchedule::Open { start, end } => {
                let time = now.time();
                time >= start && time < end
            }
            DaySchedule::Closed => false,
        }
    }
}

fn parse_hours(raw: &str, issues: &mut Vec<String>) -> HashMap<Weekday, DaySchedule> {
    let entries = match serde_json::from_str::<BTreeMap<String, DayHoursEntry>>(raw) {
        Ok(entries) => entries,
        Err(error) => {
            issues.push(format!("{} is not valid JSON: {error}", keys::OPERATING_HOURS));
            return HashMap::new();
        }
    };

    let mut hours = HashMap::new();
    for (key, entry) in entries {
        let Some(weekday) = calendar::weekday_from_key(&key) else {
            issues.push(format!("{} has unknown day `{key}`", keys::OPERATING_HOURS));
            continue;
        };
        if !entry.open {
            hours.insert(weekday, DaySchedule::Closed);
            continue;
        }
        let schedule = match (parse_time(&entry.start), parse_time(&entry.end)) {
            (Some(start), Some(end)) if start < end => DaySchedule::Open { start, end },
            _ => {
                issues.push(format!(
                    "{} for `{key}` has unusable range `{}`-`{}`",
                    keys::OPERATING_HOURS,
                    entry.start,
                    entry.end
                ));
                DaySchedule::Closed
            }
        };
        hours.insert(weekday, schedule);
    }
    hours
}

fn parse_list(raw: Option<&String>, key: &str, issues: &mut Vec<String>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|error| {
        issues.push(format!("{key} is not a JSON string array: {error}"));
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, NaiveTime, Weekday};

    use super::{keys, DaySchedule, PracticeSettings};

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn parses_hours_catalogs_and_defaults() {
        let settings = PracticeSettings::from_entries(&entries(&[
            (keys::PRACTICE_NAME, "Consultorio Norte"),
            (
                keys::OPERATING_HOURS,
                r#"{"lunes":{"open":true,"start":"09:00","end":"18:00"},"domingo":{"open":false,"start":"","end":""}}"#,
            ),
            (keys::SERVICES, r#"["Limpieza","Control"]"#),
            (keys::PAYERS, r#"["OSDE","Particular"]"#),
        ]));

        assert_eq!(settings.name.as_deref(), Some("Consultorio Norte"));
        assert_eq!(
            settings.schedule_for(Weekday::Mon),
            DaySchedule::Open {
                start: NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
                end: NaiveTime::from_hms_opt(18, 0, 0).expect("time"),
            }
        );
        assert_eq!(settings.schedule_for(Weekday::Sun), DaySchedule::Closed);
        assert_eq!(settings.schedule_for(Weekday::Tue), DaySchedule::Closed);
        assert_eq!(settings.slot_minutes, Some(30));
        assert_eq!(settings.daily_capacity, 20);
        assert_eq!(settings.services, vec!["Limpieza", "Control"]);
        assert!(settings.issues.is_empty());
    }

    #[test]
    fn malformed_values_degrade_and_are_reported() {
        let settings = PracticeSettings::from_entries(&entries(&[
            (keys::OPERATING_HOURS, r#"{"lunes":{"open":true,"start":"nueve","end":"18:00"}}"#),
            (keys::SLOT_MINUTES, "0"),
            (keys::DAILY_CAPACITY, "veinte"),
        ]));

        assert_eq!(settings.schedule_for(Weekday::Mon), DaySchedule::Closed);
        assert_eq!(settings.slot_minutes, None);
        assert_eq!(settings.daily_capacity, 0);
        assert_eq!(settings.issues.len(), 3);
    }

    #[test]
    fn unparseable_hours_json_means_closed_every_day() {
        let settings =
            PracticeSettings::from_entries(&entries(&[(keys::OPERATING_HOURS, "{not json")]));
        assert!(settings.hours.is_empty());
        assert_eq!(settings.issues.len(), 1);
    }

    #[test]
    fn open_status_uses_half_open_range() {
        let settings = PracticeSettings::from_entries(&entries(&[(
            keys::OPERATING_HOURS,
            r#"{"lunes":{"open":true,"start":"09:00","end":"18:00"}}"#,
        )]));
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");

        assert!(settings.is_open_at(monday.and_hms_opt(9, 0, 0).expect("instant")));
        assert!(!settings.is_open_at(monday.and_hms_opt(18, 0, 0).expect("instant")));
        assert!(!settings.is_open_at(monday.and_hms_opt(8, 59, 0).expect("instant")));
    }
}
