//! Observation row parsing.

use csv::StringRecord;
use medrec_types::Observation;

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadConfig, StoreResult};

/// Expected columns in an observations file.
const OBSERVATION_COLUMNS: &[&str] = &[
    "obsId",
    "patientId",
    "conceptId",
    "encounterId",
    "obsDatetime",
    "locationId",
    "valueNumeric",
    "valueText",
    "valueCoded",
    "voided",
];

impl TsvRecord for Observation {
    const EXPECTED_COLUMNS: &'static [&'static str] = OBSERVATION_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(Observation {
            obs_id: parse::id(parse::field(record, 0))?,
            patient_id: parse::id(parse::field(record, 1))?,
            concept_id: parse::id(parse::field(record, 2))?,
            encounter_id: parse::optional_id(parse::field(record, 3))?,
            obs_datetime: parse::datetime(parse::field(record, 4))?,
            location_id: parse::optional_id(parse::field(record, 5))?,
            value_numeric: parse::optional_decimal(parse::field(record, 6))?,
            value_text: parse::optional_text(parse::field(record, 7)),
            value_coded: parse::optional_id(parse::field(record, 8))?,
            voided: parse::boolean(parse::field(record, 9))?,
        })
    }

    fn passes_filter(&self, config: &LoadConfig) -> bool {
        config.include_voided || !self.voided
    }
}
