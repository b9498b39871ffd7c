//! Patient row parsing.

use csv::StringRecord;
use medrec_types::Patient;

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadConfig, StoreResult};

/// Expected columns in a patients file.
const PATIENT_COLUMNS: &[&str] = &[
    "patientId",
    "gender",
    "birthdate",
    "dead",
    "deathDate",
    "givenName",
    "familyName",
    "healthCenter",
    "voided",
];

impl TsvRecord for Patient {
    const EXPECTED_COLUMNS: &'static [&'static str] = PATIENT_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(Patient {
            patient_id: parse::id(parse::field(record, 0))?,
            gender: parse::optional_text(parse::field(record, 1)),
            birthdate: parse::optional_date(parse::field(record, 2))?,
            dead: parse::boolean(parse::field(record, 3))?,
            death_date: parse::optional_date(parse::field(record, 4))?,
            given_name: parse::optional_text(parse::field(record, 5)),
            family_name: parse::optional_text(parse::field(record, 6)),
            health_center: parse::optional_id(parse::field(record, 7))?,
            voided: parse::boolean(parse::field(record, 8))?,
        })
    }

    fn passes_filter(&self, config: &LoadConfig) -> bool {
        config.include_voided || !self.voided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_record(fields: &[&str]) -> StringRecord {
        let mut record = StringRecord::new();
        for field in fields {
            record.push_field(field);
        }
        record
    }

    #[test]
    fn test_parse_patient_record() {
        let record = make_record(&[
            "12", "F", "1984-07-02", "0", "", "Achieng", "Otieno", "3", "0",
        ]);

        let patient = Patient::from_record(&record).unwrap();
        assert_eq!(patient.patient_id, 12);
        assert_eq!(patient.gender.as_deref(), Some("F"));
        assert_eq!(patient.birthdate, NaiveDate::from_ymd_opt(1984, 7, 2));
        assert!(!patient.dead);
        assert_eq!(patient.death_date, None);
        assert_eq!(patient.health_center, Some(3));
    }

    #[test]
    fn test_parse_sparse_patient_record() {
        let record = make_record(&["5", "", "", "1", "2020-01-01", "", "", "", "0"]);

        let patient = Patient::from_record(&record).unwrap();
        assert_eq!(patient.gender, None);
        assert_eq!(patient.birthdate, None);
        assert!(patient.dead);
        assert_eq!(patient.full_name(), None);
    }

    #[test]
    fn test_filter_voided() {
        let mut patient = Patient::new(1);
        patient.voided = true;

        assert!(!patient.passes_filter(&LoadConfig::default()));
        assert!(patient.passes_filter(&LoadConfig {
            include_voided: true,
            ..Default::default()
        }));
    }
}
