//! Locations, encounter types and encounters.

use chrono::NaiveDateTime;

use crate::{EncounterId, EncounterTypeId, LocationId, PatientId};

/// A place where care is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    /// Location id.
    pub location_id: LocationId,
    /// Display name.
    pub name: String,
    /// Retired locations remain resolvable.
    pub retired: bool,
}

/// A kind of clinical encounter (e.g. "ADULT INITIAL").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncounterType {
    /// Encounter type id.
    pub encounter_type_id: EncounterTypeId,
    /// Display name.
    pub name: String,
    /// Retired types remain resolvable.
    pub retired: bool,
}

/// A single clinical encounter.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use medrec_types::Encounter;
///
/// let encounter = Encounter {
///     encounter_id: 1,
///     patient_id: 7,
///     encounter_type_id: 2,
///     location_id: Some(3),
///     encounter_datetime: NaiveDate::from_ymd_opt(2024, 1, 5)
///         .unwrap()
///         .and_hms_opt(9, 30, 0)
///         .unwrap(),
///     voided: false,
/// };
/// assert_eq!(encounter.location_id, Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Encounter {
    /// Encounter id.
    pub encounter_id: EncounterId,
    /// Patient seen.
    pub patient_id: PatientId,
    /// Kind of encounter.
    pub encounter_type_id: EncounterTypeId,
    /// Where it took place.
    pub location_id: Option<LocationId>,
    /// When it took place.
    pub encounter_datetime: NaiveDateTime,
    /// Voided encounters are invisible to queries.
    pub voided: bool,
}
