//! Patient demographics.

use chrono::{Datelike, NaiveDate};

use crate::{LocationId, PatientId};

/// A patient and the demographic attributes cohort queries filter on.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use medrec_types::Patient;
///
/// let mut patient = Patient::new(7);
/// patient.birthdate = NaiveDate::from_ymd_opt(1990, 6, 15);
///
/// let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
/// assert_eq!(patient.age_on(today), Some(33));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patient {
    /// Patient id.
    pub patient_id: PatientId,
    /// Gender code, typically "M" or "F".
    pub gender: Option<String>,
    /// Date of birth.
    pub birthdate: Option<NaiveDate>,
    /// Whether the patient has died.
    pub dead: bool,
    /// Date of death.
    pub death_date: Option<NaiveDate>,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// Health center the patient is registered at.
    pub health_center: Option<LocationId>,
    /// Voided patients are invisible to every query.
    pub voided: bool,
}

impl Patient {
    /// Creates a patient with no demographics recorded.
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            ..Default::default()
        }
    }

    /// Age in completed years on `date`, if the birthdate is known.
    ///
    /// Returns `None` for a date before the birthdate.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let birthdate = self.birthdate?;
        if date < birthdate {
            return None;
        }
        let mut age = date.year() - birthdate.year();
        if (date.month(), date.day()) < (birthdate.month(), birthdate.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    /// Returns true if the recorded gender equals `gender`, ignoring case.
    pub fn has_gender(&self, gender: &str) -> bool {
        self.gender
            .as_deref()
            .is_some_and(|g| g.eq_ignore_ascii_case(gender))
    }

    /// "Given Family", or whichever part is known.
    pub fn full_name(&self) -> Option<String> {
        match (&self.given_name, &self.family_name) {
            (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
            (Some(name), None) | (None, Some(name)) => Some(name.clone()),
            (None, None) => None,
        }
    }
}

/// A fixed, typed view of the patient attributes reporting layers ask for.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatientCharacteristics {
    /// Gender code.
    pub gender: Option<String>,
    /// Date of birth.
    pub birthdate: Option<NaiveDate>,
    /// Age in completed years on the reference date.
    pub age: Option<u32>,
    /// Whether the patient has died.
    pub dead: bool,
    /// Date of death.
    pub death_date: Option<NaiveDate>,
}

impl PatientCharacteristics {
    /// Extracts the characteristics of `patient` as of `today`.
    pub fn of(patient: &Patient, today: NaiveDate) -> Self {
        Self {
            gender: patient.gender.clone(),
            birthdate: patient.birthdate,
            age: patient.age_on(today),
            dead: patient.dead,
            death_date: patient.death_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let mut patient = Patient::new(1);
        patient.birthdate = Some(date(2000, 3, 10));

        assert_eq!(patient.age_on(date(2020, 3, 9)), Some(19));
        assert_eq!(patient.age_on(date(2020, 3, 10)), Some(20));
        assert_eq!(patient.age_on(date(1999, 1, 1)), None);
    }

    #[test]
    fn test_age_unknown_without_birthdate() {
        assert_eq!(Patient::new(1).age_on(date(2020, 1, 1)), None);
    }

    #[test]
    fn test_gender_match_ignores_case() {
        let mut patient = Patient::new(1);
        patient.gender = Some("F".to_string());
        assert!(patient.has_gender("f"));
        assert!(!patient.has_gender("M"));
    }

    #[test]
    fn test_full_name() {
        let mut patient = Patient::new(1);
        assert_eq!(patient.full_name(), None);
        patient.family_name = Some("Otieno".to_string());
        assert_eq!(patient.full_name().as_deref(), Some("Otieno"));
        patient.given_name = Some("Achieng".to_string());
        assert_eq!(patient.full_name().as_deref(), Some("Achieng Otieno"));
    }
}
