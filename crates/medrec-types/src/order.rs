//! Drugs and drug orders.

use chrono::NaiveDate;

use crate::{ConceptId, DrugId, OrderId, PatientId};

/// A drug formulation, linked to the concept it is an instance of.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Drug {
    /// Drug id (zero means "assign on create").
    pub drug_id: DrugId,
    /// Generic concept of the drug.
    pub concept_id: ConceptId,
    /// Display name, e.g. "Lamivudine 150mg".
    pub name: String,
    /// Retired drugs are hidden from searches by default.
    pub retired: bool,
}

/// An order for a drug.
///
/// An order is active on a date from its start date (inclusive) until the
/// earlier of its discontinued and auto-expire dates (exclusive).
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use medrec_types::DrugOrder;
///
/// let d = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
/// let mut order = DrugOrder::new(1, 7, 3, d(1));
/// order.discontinued_date = Some(d(10));
///
/// assert!(order.is_active_on(d(1)));
/// assert!(order.is_active_on(d(9)));
/// assert!(!order.is_active_on(d(10)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrugOrder {
    /// Order id.
    pub order_id: OrderId,
    /// Patient the drug is ordered for.
    pub patient_id: PatientId,
    /// Drug ordered.
    pub drug_id: DrugId,
    /// Concept of the ordered drug.
    pub concept_id: ConceptId,
    /// First day the order is in effect.
    pub start_date: NaiveDate,
    /// Day the order lapses on its own.
    pub auto_expire_date: Option<NaiveDate>,
    /// Day the order was stopped.
    pub discontinued_date: Option<NaiveDate>,
    /// Voided orders are invisible to queries.
    pub voided: bool,
}

impl DrugOrder {
    /// Creates an open-ended order. The concept id is left at zero.
    pub fn new(
        order_id: OrderId,
        patient_id: PatientId,
        drug_id: DrugId,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            order_id,
            patient_id,
            drug_id,
            concept_id: 0,
            start_date,
            auto_expire_date: None,
            discontinued_date: None,
            voided: false,
        }
    }

    /// Returns true if the order covers `date`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        !self.voided
            && self.start_date <= date
            && self.discontinued_date.map_or(true, |d| date < d)
            && self.auto_expire_date.map_or(true, |d| date < d)
    }
}
