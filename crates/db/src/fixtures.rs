use serde_json::json;

use atendia_core::domain::practice::{keys, PracticeSettings};

use crate::repositories::{PracticeConfigRepository, RepositoryError};

/// Demo practice used by `atendia seed` and by tests that need a realistic calendar.
///
/// Seeding is idempotent: keys already present in the store are left untouched, so an
/// operator's edits survive re-running the seed.
pub struct DemoPracticeSeed;

impl DemoPracticeSeed {
    pub fn entries() -> Vec<(&'static str, String)> {
        let weekday = |open: bool, start: &str, end: &str| {
            json!({ "open": open, "start": start, "end": end })
        };
        let hours = json!({
            "lunes": weekday(true, "09:00", "18:00"),
            "martes": weekday(true, "09:00", "18:00"),
            "miercoles": weekday(true, "09:00", "18:00"),
            "jueves": weekday(true, "09:00", "18:00"),
            "viernes": weekday(true, "09:00", "18:00"),
            "sabado": weekday(true, "09:00", "13:00"),
            "domingo": weekday(false, "", ""),
        });
        let services = json!([
            "Limpieza dental",
            "Extracción",
            "Ortodoncia",
            "Implantes",
            "Blanqueamiento",
            "Control general",
            "Endodoncia",
            "Prótesis",
        ]);
        let payers = json!(["OSDE", "Swiss Medical", "Galeno", "Medifé", "IOMA", "Particular"]);

        vec![
            (keys::PRACTICE_NAME, "Consultorio Dental Dra. García".to_string()),
            (keys::PRACTICE_ADDRESS, "Av. Corrientes 1234, CABA".to_string()),
            (keys::PRACTICE_PHONE, "011-4567-8900".to_string()),
            (keys::OPERATING_HOURS, hours.to_string()),
            (keys::SERVICES, services.to_string()),
            (keys::PAYERS, payers.to_string()),
            (keys::SLOT_MINUTES, "30".to_string()),
            (keys::DAILY_CAPACITY, "20".to_string()),
        ]
    }

    pub async fn load(
        repository: &dyn PracticeConfigRepository,
    ) -> Result<SeedResult, RepositoryError> {
        let existing = repository.get_all().await?;
        let mut result = SeedResult::default();

        for (key, value) in Self::entries() {
            if existing.contains_key(key) {
                result.skipped.push(key);
                continue;
            }
            repository.set(key, &value).await?;
            result.written.push(key);
        }

        Ok(result)
    }

    /// Checks that every demo key is present and that the stored configuration parses cleanly.
    pub async fn verify(
        repository: &dyn PracticeConfigRepository,
    ) -> Result<VerificationResult, RepositoryError> {
        let entries = repository.get_all().await?;
        let mut checks = Self::entries()
            .into_iter()
            .map(|(key, _)| VerificationCheck {
                name: key.to_string(),
                passed: entries.contains_key(key),
                details: if entries.contains_key(key) {
                    "present".to_string()
                } else {
                    "missing".to_string()
                },
            })
            .collect::<Vec<_>>();

        let settings = PracticeSettings::from_entries(&entries);
        checks.push(VerificationCheck {
            name: "practice_settings_parse".to_string(),
            passed: settings.issues.is_empty(),
            details: if settings.issues.is_empty() {
                "configuration parses without issues".to_string()
            } else {
                settings.issues.join("; ")
            },
        });

        let all_passed = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { all_passed, checks })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SeedResult {
    pub written: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_passed: bool,
    pub checks: Vec<VerificationCheck>,
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use atendia_core::domain::practice::{keys, DaySchedule, PracticeSettings};

    use super::DemoPracticeSeed;
    use crate::repositories::{InMemoryPracticeConfigRepository, PracticeConfigRepository};

    #[tokio::test]
    async fn seed_writes_only_missing_keys() {
        let repo = InMemoryPracticeConfigRepository::with_entries([(
            keys::PRACTICE_NAME,
            "Consultorio Propio",
        )]);

        let first = DemoPracticeSeed::load(&repo).await.expect("seed");
        assert_eq!(first.skipped, vec![keys::PRACTICE_NAME]);
        assert_eq!(first.written.len(), DemoPracticeSeed::entries().len() - 1);

        let second = DemoPracticeSeed::load(&repo).await.expect("reseed");
        assert!(second.written.is_empty());

        assert_eq!(
            repo.get(keys::PRACTICE_NAME).await.expect("name"),
            Some("Consultorio Propio".to_string())
        );
    }

    #[tokio::test]
    async fn seeded_configuration_parses_into_the_demo_calendar() {
        let repo = InMemoryPracticeConfigRepository::default();
        DemoPracticeSeed::load(&repo).await.expect("seed");

        let verification = DemoPracticeSeed::verify(&repo).await.expect("verify");
        assert!(verification.all_passed, "{:?}", verification.checks);

        let settings = PracticeSettings::from_entries(&repo.get_all().await.expect("all"));
        assert_eq!(settings.schedule_for(Weekday::Sun), DaySchedule::Closed);
        assert!(matches!(settings.schedule_for(Weekday::Sat), DaySchedule::Open { .. }));
        assert_eq!(settings.services.len(), 8);
        assert_eq!(settings.payers.last().map(String::as_str), Some("Particular"));
    }
}
