//! Location, encounter type and encounter row parsing.

use csv::StringRecord;
use medrec_types::{Encounter, EncounterType, Location};

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadConfig, StoreResult};

/// Expected columns in a locations file.
const LOCATION_COLUMNS: &[&str] = &["locationId", "name", "retired"];

/// Expected columns in an encounter types file.
const ENCOUNTER_TYPE_COLUMNS: &[&str] = &["encounterTypeId", "name", "retired"];

/// Expected columns in an encounters file.
const ENCOUNTER_COLUMNS: &[&str] = &[
    "encounterId",
    "patientId",
    "encounterTypeId",
    "locationId",
    "encounterDatetime",
    "voided",
];

impl TsvRecord for Location {
    const EXPECTED_COLUMNS: &'static [&'static str] = LOCATION_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(Location {
            location_id: parse::id(parse::field(record, 0))?,
            name: parse::field(record, 1).to_string(),
            retired: parse::boolean(parse::field(record, 2))?,
        })
    }

    // Retired locations still anchor historical encounters.
    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for EncounterType {
    const EXPECTED_COLUMNS: &'static [&'static str] = ENCOUNTER_TYPE_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(EncounterType {
            encounter_type_id: parse::id(parse::field(record, 0))?,
            name: parse::field(record, 1).to_string(),
            retired: parse::boolean(parse::field(record, 2))?,
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for Encounter {
    const EXPECTED_COLUMNS: &'static [&'static str] = ENCOUNTER_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(Encounter {
            encounter_id: parse::id(parse::field(record, 0))?,
            patient_id: parse::id(parse::field(record, 1))?,
            encounter_type_id: parse::id(parse::field(record, 2))?,
            location_id: parse::optional_id(parse::field(record, 3))?,
            encounter_datetime: parse::datetime(parse::field(record, 4))?,
            voided: parse::boolean(parse::field(record, 5))?,
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
    fn test_parse_encounter_record() {
        let record = make_record(&["100", "7", "2", "", "2023-11-05 08:15:00", "0"]);

        let encounter = Encounter::from_record(&record).unwrap();
        assert_eq!(encounter.encounter_id, 100);
        assert_eq!(encounter.patient_id, 7);
        assert_eq!(encounter.encounter_type_id, 2);
        assert_eq!(encounter.location_id, None);
        assert_eq!(
            encounter.encounter_datetime,
            NaiveDate::from_ymd_opt(2023, 11, 5)
                .unwrap()
                .and_hms_opt(8, 15, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_location_and_type() {
        let location = Location::from_record(&make_record(&["3", "Mosoriot", "1"])).unwrap();
        assert_eq!(location.name, "Mosoriot");
        assert!(location.retired);
        assert!(location.passes_filter(&LoadConfig::default()));

        let encounter_type =
            EncounterType::from_record(&make_record(&["2", "ADULTRETURN", "0"])).unwrap();
        assert_eq!(encounter_type.encounter_type_id, 2);
    }

    #[test]
    fn test_bad_datetime_is_error() {
        let record = make_record(&["1", "1", "1", "", "05/11/2023", "0"]);
        assert!(Encounter::from_record(&record).is_err());
    }
}
