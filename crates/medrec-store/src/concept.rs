//! Concept dictionary row parsing.
//!
//! Concepts arrive as flat rows that the store assembles into
//! [`Concept`](medrec_types::Concept) values: one row per concept name,
//! numeric ranges in a side file, and set members and answers as link rows.

use csv::StringRecord;
use medrec_types::{ConceptAnswer, ConceptId, ConceptSetMember, Drug};

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadConfig, StoreResult};

/// Expected columns in a concepts file.
const CONCEPT_COLUMNS: &[&str] = &[
    "conceptId",
    "datatypeId",
    "classId",
    "isSet",
    "retired",
    "name",
    "locale",
];

/// Expected columns in a concept numerics file.
const CONCEPT_NUMERIC_COLUMNS: &[&str] = &[
    "conceptId",
    "hiAbsolute",
    "hiCritical",
    "hiNormal",
    "lowAbsolute",
    "lowCritical",
    "lowNormal",
    "units",
    "precise",
    "displayPrecision",
];

/// Expected columns in a concept sets file.
const CONCEPT_SET_COLUMNS: &[&str] = &["conceptSetId", "conceptId", "sortWeight"];

/// Expected columns in a concept answers file.
const CONCEPT_ANSWER_COLUMNS: &[&str] = &["conceptId", "answerConceptId"];

/// Expected columns in a drugs file.
const DRUG_COLUMNS: &[&str] = &["drugId", "conceptId", "name", "retired"];

/// One row of the concepts file.
///
/// A concept with several names appears on several rows; the first row
/// fixes its datatype, class and flags and carries the preferred name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptRecord {
    /// Concept id.
    pub concept_id: ConceptId,
    /// Datatype id.
    pub datatype_id: u32,
    /// Concept class id.
    pub class_id: u32,
    /// Whether the concept is a set.
    pub is_set: bool,
    /// Whether the concept is retired.
    pub retired: bool,
    /// Name on this row.
    pub name: String,
    /// Locale of the name, "en" when blank.
    pub locale: String,
}

/// One row of the concept numerics file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptNumericRecord {
    /// Concept id.
    pub concept_id: ConceptId,
    /// Highest physically possible value.
    pub hi_absolute: Option<f64>,
    /// Critical-high threshold.
    pub hi_critical: Option<f64>,
    /// Upper bound of the normal range.
    pub hi_normal: Option<f64>,
    /// Lowest physically possible value.
    pub low_absolute: Option<f64>,
    /// Critical-low threshold.
    pub low_critical: Option<f64>,
    /// Lower bound of the normal range.
    pub low_normal: Option<f64>,
    /// Units of measure.
    pub units: String,
    /// Whether fractional values are meaningful.
    pub precise: bool,
    /// Significant digits for display.
    pub display_precision: Option<u32>,
}

impl TsvRecord for ConceptRecord {
    const EXPECTED_COLUMNS: &'static [&'static str] = CONCEPT_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        let locale = parse::field(record, 6);
        Ok(ConceptRecord {
            concept_id: parse::id(parse::field(record, 0))?,
            datatype_id: parse::id(parse::field(record, 1))?,
            class_id: parse::id(parse::field(record, 2))?,
            is_set: parse::boolean(parse::field(record, 3))?,
            retired: parse::boolean(parse::field(record, 4))?,
            name: parse::field(record, 5).to_string(),
            locale: if locale.is_empty() { "en" } else { locale }.to_string(),
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for ConceptNumericRecord {
    const EXPECTED_COLUMNS: &'static [&'static str] = CONCEPT_NUMERIC_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(ConceptNumericRecord {
            concept_id: parse::id(parse::field(record, 0))?,
            hi_absolute: parse::optional_decimal(parse::field(record, 1))?,
            hi_critical: parse::optional_decimal(parse::field(record, 2))?,
            hi_normal: parse::optional_decimal(parse::field(record, 3))?,
            low_absolute: parse::optional_decimal(parse::field(record, 4))?,
            low_critical: parse::optional_decimal(parse::field(record, 5))?,
            low_normal: parse::optional_decimal(parse::field(record, 6))?,
            units: parse::field(record, 7).to_string(),
            precise: parse::boolean(parse::field(record, 8))?,
            display_precision: parse::optional_id(parse::field(record, 9))?,
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for ConceptSetMember {
    const EXPECTED_COLUMNS: &'static [&'static str] = CONCEPT_SET_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        let weight = parse::optional_decimal(parse::field(record, 2))?;
        Ok(ConceptSetMember {
            concept_id: parse::id(parse::field(record, 0))?,
            member_id: parse::id(parse::field(record, 1))?,
            sort_weight: weight.unwrap_or(0.0),
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for ConceptAnswer {
    const EXPECTED_COLUMNS: &'static [&'static str] = CONCEPT_ANSWER_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(ConceptAnswer {
            concept_id: parse::id(parse::field(record, 0))?,
            answer_concept: parse::id(parse::field(record, 1))?,
            answer_drug: None,
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for Drug {
    const EXPECTED_COLUMNS: &'static [&'static str] = DRUG_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(Drug {
            drug_id: parse::id(parse::field(record, 0))?,
            concept_id: parse::id(parse::field(record, 1))?,
            name: parse::field(record, 2).to_string(),
            retired: parse::boolean(parse::field(record, 3))?,
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(fields: &[&str]) -> StringRecord {
        let mut record = StringRecord::new();
        for field in fields {
            record.push_field(field);
        }
        record
    }

    #[test]
    fn test_parse_concept_record() {
        let record = make_record(&["5089", "1", "1", "0", "0", "WEIGHT (KG)", ""]);

        let concept = ConceptRecord::from_record(&record).unwrap();
        assert_eq!(concept.concept_id, 5089);
        assert_eq!(concept.datatype_id, 1);
        assert_eq!(concept.class_id, 1);
        assert!(!concept.is_set);
        assert_eq!(concept.name, "WEIGHT (KG)");
        assert_eq!(concept.locale, "en");
    }

    #[test]
    fn test_parse_concept_numeric_record() {
        let record = make_record(&["5089", "250", "", "", "0", "", "", "kg", "1", "1"]);

        let numeric = ConceptNumericRecord::from_record(&record).unwrap();
        assert_eq!(numeric.hi_absolute, Some(250.0));
        assert_eq!(numeric.hi_critical, None);
        assert_eq!(numeric.low_absolute, Some(0.0));
        assert_eq!(numeric.units, "kg");
        assert!(numeric.precise);
        assert_eq!(numeric.display_precision, Some(1));
    }

    #[test]
    fn test_parse_links() {
        let member = ConceptSetMember::from_record(&make_record(&["1000", "5089", "2.5"])).unwrap();
        assert_eq!(member.concept_id, 1000);
        assert_eq!(member.member_id, 5089);
        assert_eq!(member.sort_weight, 2.5);

        let member = ConceptSetMember::from_record(&make_record(&["1000", "5090", ""])).unwrap();
        assert_eq!(member.sort_weight, 0.0);

        let answer = ConceptAnswer::from_record(&make_record(&["1065", "1066"])).unwrap();
        assert_eq!(answer.answer_concept, 1066);
    }

    #[test]
    fn test_parse_drug_record() {
        let drug =
            Drug::from_record(&make_record(&["4", "86663", "Zidovudine 300mg", "0"])).unwrap();
        assert_eq!(drug.drug_id, 4);
        assert_eq!(drug.concept_id, 86663);
        assert!(!drug.retired);
    }

    #[test]
    fn test_bad_range_value_is_error() {
        let record = make_record(&["1", "high", "", "", "", "", "", "", "0", ""]);
        assert!(ConceptNumericRecord::from_record(&record).is_err());
    }
}
