//! Declarative cohort criteria.
//!
//! Criteria are plain serde types so cohorts can be written as JSON:
//!
//! ```json
//! { "type": "intersection", "of": [
//!     { "type": "characteristics", "gender": "F", "min_age": 15 },
//!     { "type": "numeric_obs", "concept_id": 5497, "time_modifier": "LAST",
//!       "comparison": { "operator": "<", "value": 350.0 } }
//! ] }
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use medrec_types::{
    ComparisonOperator, ConceptId, DrugId, LocationId, Patient, PatientSet, TimeModifier,
};

use crate::types::{ServiceError, ServiceResult};

/// Demographic constraints. Every field left unset imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacteristicFilter {
    /// Gender code, matched ignoring case.
    pub gender: Option<String>,
    /// Earliest birthdate (inclusive).
    pub min_birthdate: Option<NaiveDate>,
    /// Latest birthdate (inclusive).
    pub max_birthdate: Option<NaiveDate>,
    /// Minimum age in completed years (inclusive).
    pub min_age: Option<u32>,
    /// Maximum age in completed years (inclusive).
    pub max_age: Option<u32>,
    /// Only living patients.
    pub alive_only: bool,
    /// Only deceased patients.
    pub dead_only: bool,
}

impl CharacteristicFilter {
    /// Rejects contradictory constraints.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.alive_only && self.dead_only {
            return Err(ServiceError::invalid("alive_only and dead_only are mutually exclusive"));
        }
        if let (Some(min), Some(max)) = (self.min_birthdate, self.max_birthdate) {
            if min > max {
                return Err(ServiceError::invalid(format!(
                    "min_birthdate {} is after max_birthdate {}",
                    min, max
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_age, self.max_age) {
            if min > max {
                return Err(ServiceError::invalid(format!(
                    "min_age {} is greater than max_age {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Returns true if the patient satisfies every constraint on `today`.
    ///
    /// A patient with no recorded birthdate fails any birthdate or age
    /// constraint.
    pub fn matches(&self, patient: &Patient, today: NaiveDate) -> bool {
        if let Some(gender) = &self.gender {
            if !patient.has_gender(gender) {
                return false;
            }
        }
        if self.alive_only && patient.dead {
            return false;
        }
        if self.dead_only && !patient.dead {
            return false;
        }
        if let Some(min) = self.min_birthdate {
            if !patient.birthdate.is_some_and(|b| b >= min) {
                return false;
            }
        }
        if let Some(max) = self.max_birthdate {
            if !patient.birthdate.is_some_and(|b| b <= max) {
                return false;
            }
        }
        if self.min_age.is_some() || self.max_age.is_some() {
            let Some(age) = patient.age_on(today) else {
                return false;
            };
            if self.min_age.is_some_and(|min| age < min)
                || self.max_age.is_some_and(|max| age > max)
            {
                return false;
            }
        }
        true
    }
}

/// An operator and the threshold it compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Operator applied as `recorded <op> value`.
    pub operator: ComparisonOperator,
    /// Threshold.
    pub value: f64,
}

/// Selects patients by their numeric observations of one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericObsCriterion {
    /// Observed concept.
    pub concept_id: ConceptId,
    /// Which observation(s) of each patient are tested.
    #[serde(default = "any_modifier")]
    pub time_modifier: TimeModifier,
    /// Test applied to the reduced value. Without one, having a value to
    /// test is enough.
    #[serde(default)]
    pub comparison: Option<Comparison>,
    /// First day of the observation window (inclusive).
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    /// Last day of the observation window (inclusive).
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
}

fn any_modifier() -> TimeModifier {
    TimeModifier::Any
}

impl NumericObsCriterion {
    /// A criterion over all observations of `concept_id`, any date.
    pub fn new(concept_id: ConceptId, time_modifier: TimeModifier) -> Self {
        Self {
            concept_id,
            time_modifier,
            comparison: None,
            from_date: None,
            to_date: None,
        }
    }

    /// Adds a comparison.
    pub fn compare(mut self, operator: ComparisonOperator, value: f64) -> Self {
        self.comparison = Some(Comparison { operator, value });
        self
    }

    /// Restricts the observation window.
    pub fn between(mut self, from_date: Option<NaiveDate>, to_date: Option<NaiveDate>) -> Self {
        self.from_date = from_date;
        self.to_date = to_date;
        self
    }
}

/// Selects patients with a text observation equal to `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextObsCriterion {
    /// Observed concept.
    pub concept_id: ConceptId,
    /// Exact text to match.
    pub value: String,
}

/// Selects patients by drug orders active on a date.
///
/// `drug_ids` distinguishes three cases: absent selects patients with no
/// active order at all, an empty list selects patients with any active
/// order, and a non-empty list selects patients with an active order for
/// one of the listed drugs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrugOrderCriterion {
    /// Drugs to look for.
    pub drug_ids: Option<Vec<DrugId>>,
    /// Reference date, today when absent.
    pub on_date: Option<NaiveDate>,
}

/// A composable cohort definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CohortDefinition {
    /// Every non-voided patient.
    All,
    /// Demographic constraints.
    Characteristics(CharacteristicFilter),
    /// Numeric observation test.
    NumericObs(NumericObsCriterion),
    /// Text observation match.
    TextObs(TextObsCriterion),
    /// Patients seen at, or registered at, a location.
    Location {
        /// The location.
        location_id: LocationId,
    },
    /// Drug orders active on a date.
    DrugOrder(DrugOrderCriterion),
    /// A literal set of patients; every id must be a known, non-voided patient.
    Patients {
        /// The patients.
        patient_ids: PatientSet,
    },
    /// Patients matching any of the parts.
    Union {
        /// Parts.
        of: Vec<CohortDefinition>,
    },
    /// Patients matching all of the parts.
    Intersection {
        /// Parts; at least one.
        of: Vec<CohortDefinition>,
    },
    /// Patients matching `base` but not `minus`.
    Difference {
        /// Starting cohort.
        base: Box<CohortDefinition>,
        /// Cohort removed from it.
        minus: Box<CohortDefinition>,
    },
}

/// Converts an inclusive day range into datetime bounds covering whole days.
pub(crate) fn day_bounds(
    from_date: Option<NaiveDate>,
    to_date: Option<NaiveDate>,
) -> ServiceResult<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
    if let (Some(from), Some(to)) = (from_date, to_date) {
        if from > to {
            return Err(ServiceError::invalid(format!(
                "from_date {} is after to_date {}",
                from, to
            )));
        }
    }
    Ok((
        from_date.and_then(|d| d.and_hms_opt(0, 0, 0)),
        to_date.and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn make_test_patient(gender: &str, birthdate: Option<NaiveDate>, dead: bool) -> Patient {
        let mut patient = Patient::new(1);
        patient.gender = Some(gender.to_string());
        patient.birthdate = birthdate;
        patient.dead = dead;
        patient
    }

    #[test]
    fn test_filter_validation() {
        let both = CharacteristicFilter {
            alive_only: true,
            dead_only: true,
            ..Default::default()
        };
        assert!(matches!(both.validate(), Err(ServiceError::InvalidArgument(_))));

        let ages = CharacteristicFilter {
            min_age: Some(50),
            max_age: Some(20),
            ..Default::default()
        };
        assert!(ages.validate().is_err());

        assert!(CharacteristicFilter::default().validate().is_ok());
    }

    #[test]
    fn test_filter_matches() {
        let today = d(2024, 6, 1);
        let woman = make_test_patient("F", Some(d(1990, 1, 1)), false);
        let unknown_age = make_test_patient("F", None, true);

        let filter = CharacteristicFilter {
            gender: Some("f".to_string()),
            min_age: Some(30),
            max_age: Some(40),
            ..Default::default()
        };
        assert!(filter.matches(&woman, today));
        assert!(!filter.matches(&unknown_age, today));

        let dead = CharacteristicFilter {
            dead_only: true,
            ..Default::default()
        };
        assert!(dead.matches(&unknown_age, today));
        assert!(!dead.matches(&woman, today));

        let born = CharacteristicFilter {
            min_birthdate: Some(d(1990, 1, 1)),
            max_birthdate: Some(d(1990, 1, 1)),
            ..Default::default()
        };
        assert!(born.matches(&woman, today));
        assert!(!born.matches(&unknown_age, today));
    }

    #[test]
    fn test_day_bounds() {
        let (from, to) = day_bounds(Some(d(2024, 1, 1)), Some(d(2024, 1, 1))).unwrap();
        let noon = d(2024, 1, 1).and_hms_opt(12, 0, 0).unwrap();
        assert!(from.unwrap() <= noon && noon <= to.unwrap());

        assert!(day_bounds(Some(d(2024, 2, 1)), Some(d(2024, 1, 1))).is_err());
        assert_eq!(day_bounds(None, None).unwrap(), (None, None));
    }

    #[test]
    fn test_definition_from_json() {
        let json = r#"{ "type": "intersection", "of": [
            { "type": "characteristics", "gender": "F", "min_age": 15 },
            { "type": "numeric_obs", "concept_id": 5497, "time_modifier": "LAST",
              "comparison": { "operator": "<", "value": 350.0 } },
            { "type": "drug_order", "drug_ids": [] },
            { "type": "patients", "patient_ids": [3, 1] }
        ] }"#;

        let definition: CohortDefinition = serde_json::from_str(json).unwrap();
        let CohortDefinition::Intersection { of } = definition else {
            panic!("expected intersection");
        };
        assert_eq!(of.len(), 4);
        assert_eq!(
            of[1],
            CohortDefinition::NumericObs(
                NumericObsCriterion::new(5497, TimeModifier::Last)
                    .compare(ComparisonOperator::LessThan, 350.0)
            )
        );
        assert_eq!(
            of[2],
            CohortDefinition::DrugOrder(DrugOrderCriterion {
                drug_ids: Some(vec![]),
                on_date: None,
            })
        );
        let CohortDefinition::Patients { patient_ids } = &of[3] else {
            panic!("expected patients");
        };
        assert_eq!(patient_ids.to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_drug_order_absent_vs_empty() {
        let absent: DrugOrderCriterion = serde_json::from_str("{}").unwrap();
        let empty: DrugOrderCriterion = serde_json::from_str(r#"{"drug_ids": []}"#).unwrap();
        assert_eq!(absent.drug_ids, None);
        assert_eq!(empty.drug_ids, Some(vec![]));
    }
}
