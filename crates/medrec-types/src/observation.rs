//! Observations.

use chrono::NaiveDateTime;

use crate::{ConceptId, EncounterId, LocationId, ObsId, PatientId};

/// A value recorded for a concept on a patient at a point in time.
///
/// Exactly which `value_*` field is populated depends on the concept's
/// datatype.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use medrec_types::Observation;
///
/// let at = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
/// let obs = Observation::numeric(1, 7, 5089, at, 61.5);
///
/// assert_eq!(obs.value_numeric, Some(61.5));
/// assert!(obs.is_within(Some(at), Some(at)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    /// Observation id.
    pub obs_id: ObsId,
    /// Patient observed.
    pub patient_id: PatientId,
    /// Concept (question) observed.
    pub concept_id: ConceptId,
    /// Encounter the observation was recorded in.
    pub encounter_id: Option<EncounterId>,
    /// When the observation was made.
    pub obs_datetime: NaiveDateTime,
    /// Where the observation was made.
    pub location_id: Option<LocationId>,
    /// Numeric value.
    pub value_numeric: Option<f64>,
    /// Text value.
    pub value_text: Option<String>,
    /// Coded value (an answer concept).
    pub value_coded: Option<ConceptId>,
    /// Voided observations are invisible to queries.
    pub voided: bool,
}

impl Observation {
    /// Creates a numeric observation.
    pub fn numeric(
        obs_id: ObsId,
        patient_id: PatientId,
        concept_id: ConceptId,
        obs_datetime: NaiveDateTime,
        value: f64,
    ) -> Self {
        Self {
            value_numeric: Some(value),
            ..Self::empty(obs_id, patient_id, concept_id, obs_datetime)
        }
    }

    /// Creates a text observation.
    pub fn text(
        obs_id: ObsId,
        patient_id: PatientId,
        concept_id: ConceptId,
        obs_datetime: NaiveDateTime,
        value: impl Into<String>,
    ) -> Self {
        Self {
            value_text: Some(value.into()),
            ..Self::empty(obs_id, patient_id, concept_id, obs_datetime)
        }
    }

    fn empty(
        obs_id: ObsId,
        patient_id: PatientId,
        concept_id: ConceptId,
        obs_datetime: NaiveDateTime,
    ) -> Self {
        Self {
            obs_id,
            patient_id,
            concept_id,
            encounter_id: None,
            obs_datetime,
            location_id: None,
            value_numeric: None,
            value_text: None,
            value_coded: None,
            voided: false,
        }
    }

    /// Returns true if the observation falls within `[from, to]`; absent
    /// bounds are unbounded.
    pub fn is_within(&self, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> bool {
        from.map_or(true, |f| self.obs_datetime >= f) && to.map_or(true, |t| self.obs_datetime <= t)
    }
}
