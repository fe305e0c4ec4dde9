//! Practice-local date and time helpers.
//!
//! Every date in the system is a practice-local calendar date and every time is a
//! practice-local wall-clock time. Weekdays are always derived from the date value,
//! never from the current instant.

use chrono::{
    Datelike, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike,
    Utc, Weekday,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

const WEEKDAY_KEYS: [(Weekday, &str); 7] = [
    (Weekday::Mon, "lunes"),
    (Weekday::Tue, "martes"),
    (Weekday::Wed, "miercoles"),
    (Weekday::Thu, "jueves"),
    (Weekday::Fri, "viernes"),
    (Weekday::Sat, "sabado"),
    (Weekday::Sun, "domingo"),
];

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Accepts `H:MM`, `HH:MM` and `HH:MM:SS`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn weekday_of(date: NaiveDate) -> Weekday {
    date.weekday()
}

pub fn weekday_key(weekday: Weekday) -> &'static str {
    WEEKDAY_KEYS
        .iter()
        .find_map(|(day, key)| (*day == weekday).then_some(*key))
        .unwrap_or("lunes")
}

/// Resolves an operating-hours key. Accented spellings and English names are aliases.
pub fn weekday_from_key(key: &str) -> Option<Weekday> {
    let normalized = key.trim().to_lowercase().replace('é', "e").replace('á', "a");
    if let Some((day, _)) = WEEKDAY_KEYS.iter().find(|(_, name)| *name == normalized) {
        return Some(*day);
    }
    normalized.parse::<Weekday>().ok()
}

pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Source of the practice-local "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    fn tomorrow(&self) -> NaiveDate {
        self.today() + Duration::days(1)
    }
}

/// Wall clock. With an offset the practice clock is `UTC + offset`, otherwise the host's local zone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    pub fn new(utc_offset_minutes: Option<i32>) -> Self {
        Self { offset: utc_offset_minutes.and_then(|minutes| FixedOffset::east_opt(minutes * 60)) }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Serde adapter that writes times as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_time(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).ok_or_else(|| D::Error::custom(format!("invalid time `{raw}`")))
    }
}
