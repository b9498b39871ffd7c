//! Numeric concepts.
//!
//! A `ConceptNumeric` extends a concept with reference ranges, a unit and
//! rendering hints. Every range bound is optional; an unset bound never
//! takes part in a comparison.

use std::fmt;

use crate::{Concept, ConceptId};

/// A concept whose observations are numbers, with optional reference
/// ranges.
///
/// The bounds are expected to be ordered
/// `low_absolute <= low_critical <= low_normal <= hi_normal <= hi_critical <= hi_absolute`
/// wherever they are set; see [`ConceptNumeric::validate_ranges`].
///
/// # Examples
///
/// ```
/// use medrec_types::{ConceptNumeric, RangeBand};
///
/// let mut cd4 = ConceptNumeric::new(5497);
/// cd4.low_normal = Some(500.0);
/// cd4.low_critical = Some(200.0);
/// cd4.units = "cells/mm3".to_string();
///
/// assert!(cd4.validate_ranges().is_ok());
/// assert_eq!(cd4.classify(150.0), Some(RangeBand::CriticalLow));
/// assert_eq!(cd4.classify(350.0), Some(RangeBand::Low));
/// assert_eq!(cd4.classify(5000.0), Some(RangeBand::Normal)); // no upper bounds set
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptNumeric {
    /// The underlying concept.
    pub concept: Concept,
    /// Highest physically possible value.
    pub hi_absolute: Option<f64>,
    /// Values above this are critical.
    pub hi_critical: Option<f64>,
    /// Upper limit of the normal range.
    pub hi_normal: Option<f64>,
    /// Lowest physically possible value.
    pub low_absolute: Option<f64>,
    /// Values below this are critical.
    pub low_critical: Option<f64>,
    /// Lower limit of the normal range.
    pub low_normal: Option<f64>,
    /// Unit of measure.
    pub units: String,
    /// Whether fractional values are meaningful.
    pub precise: bool,
    /// Significant digits used when rendering a value.
    pub display_precision: Option<u32>,
}

/// Where a value falls relative to a numeric concept's ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RangeBand {
    /// Below the absolute minimum (implausible).
    BelowAbsolute,
    /// Below the critical low bound.
    CriticalLow,
    /// Below the normal range.
    Low,
    /// Within the normal range.
    Normal,
    /// Above the normal range.
    High,
    /// Above the critical high bound.
    CriticalHigh,
    /// Above the absolute maximum (implausible).
    AboveAbsolute,
}

/// Two set bounds of a numeric concept are out of order.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOrderError {
    /// Name of the bound that should be lower.
    pub lower: &'static str,
    /// Its value.
    pub lower_value: f64,
    /// Name of the bound that should be higher.
    pub upper: &'static str,
    /// Its value.
    pub upper_value: f64,
}

impl fmt::Display for RangeOrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) must not exceed {} ({})",
            self.lower, self.lower_value, self.upper, self.upper_value
        )
    }
}

impl std::error::Error for RangeOrderError {}

impl ConceptNumeric {
    /// Creates a numeric concept with no ranges set.
    pub fn new(concept_id: ConceptId) -> Self {
        Self {
            concept: Concept::new(concept_id),
            ..Default::default()
        }
    }

    /// Builds a numeric concept from a generic one.
    ///
    /// Scalar fields are copied, every child collection is deep-copied and
    /// re-owned by the new concept, and the numeric fields start unset
    /// (`units` empty, `precise` false). The source concept is not touched.
    pub fn from_concept(source: &Concept) -> Self {
        let children = source.children_for(source.concept_id);
        let concept = Concept {
            concept_id: source.concept_id,
            uuid: source.uuid.clone(),
            datatype: source.datatype.clone(),
            concept_class: source.concept_class.clone(),
            is_set: source.is_set,
            retired: source.retired,
            retired_by: source.retired_by,
            retire_reason: source.retire_reason.clone(),
            version: source.version.clone(),
            creator: source.creator,
            date_created: source.date_created,
            changed_by: source.changed_by,
            date_changed: source.date_changed,
            names: children.names,
            answers: children.answers,
            concept_sets: children.concept_sets,
            descriptions: children.descriptions,
            concept_mappings: children.concept_mappings,
        };

        Self {
            concept,
            hi_absolute: None,
            hi_critical: None,
            hi_normal: None,
            low_absolute: None,
            low_critical: None,
            low_normal: None,
            units: String::new(),
            precise: false,
            display_precision: None,
        }
    }

    /// Concept id.
    pub fn concept_id(&self) -> ConceptId {
        self.concept.concept_id
    }

    /// True iff the underlying datatype is "Numeric".
    pub fn is_numeric(&self) -> bool {
        self.concept.datatype.is_numeric()
    }

    /// Bounds in ascending order, paired with their names.
    fn ordered_bounds(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("low_absolute", self.low_absolute),
            ("low_critical", self.low_critical),
            ("low_normal", self.low_normal),
            ("hi_normal", self.hi_normal),
            ("hi_critical", self.hi_critical),
            ("hi_absolute", self.hi_absolute),
        ]
    }

    /// Checks the ordering invariant over every pair of set bounds.
    pub fn validate_ranges(&self) -> Result<(), RangeOrderError> {
        let bounds = self.ordered_bounds();
        for (i, &(lower, lower_value)) in bounds.iter().enumerate() {
            let Some(lower_value) = lower_value else {
                continue;
            };
            for &(upper, upper_value) in &bounds[i + 1..] {
                if let Some(upper_value) = upper_value {
                    if lower_value > upper_value {
                        return Err(RangeOrderError {
                            lower,
                            lower_value,
                            upper,
                            upper_value,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns true if at least one bound is set.
    pub fn has_ranges(&self) -> bool {
        self.ordered_bounds().iter().any(|(_, b)| b.is_some())
    }

    /// Classifies a value against the set bounds.
    ///
    /// Returns `None` when no bound is set.
    pub fn classify(&self, value: f64) -> Option<RangeBand> {
        if !self.has_ranges() {
            return None;
        }
        let below = |bound: Option<f64>| bound.is_some_and(|b| value < b);
        let above = |bound: Option<f64>| bound.is_some_and(|b| value > b);

        let band = if below(self.low_absolute) {
            RangeBand::BelowAbsolute
        } else if above(self.hi_absolute) {
            RangeBand::AboveAbsolute
        } else if below(self.low_critical) {
            RangeBand::CriticalLow
        } else if above(self.hi_critical) {
            RangeBand::CriticalHigh
        } else if below(self.low_normal) {
            RangeBand::Low
        } else if above(self.hi_normal) {
            RangeBand::High
        } else {
            RangeBand::Normal
        };
        Some(band)
    }

    /// Renders a value for display.
    ///
    /// Imprecise concepts are rounded to an integer. Precise concepts use
    /// `display_precision` significant digits when set.
    pub fn format_value(&self, value: f64) -> String {
        if !self.precise {
            return format!("{}", value.round() as i64);
        }
        match self.display_precision {
            Some(digits) if digits > 0 && value != 0.0 && value.is_finite() => {
                format_significant(value, digits)
            }
            _ => value.to_string(),
        }
    }
}

fn format_significant(value: f64, digits: u32) -> String {
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = digits as i32 - 1 - magnitude;
    if decimals >= 0 {
        format!("{:.*}", decimals as usize, value)
    } else {
        let factor = 10f64.powi(-decimals);
        format!("{:.0}", (value / factor).round() * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{well_known, ConceptName};

    fn make_full_range() -> ConceptNumeric {
        ConceptNumeric {
            low_absolute: Some(0.0),
            low_critical: Some(50.0),
            low_normal: Some(100.0),
            hi_normal: Some(200.0),
            hi_critical: Some(300.0),
            hi_absolute: Some(1000.0),
            ..ConceptNumeric::new(1)
        }
    }

    fn make_test_concept() -> Concept {
        let mut concept = Concept::new(5089);
        concept.datatype = well_known::datatypes()
            .into_iter()
            .find(|d| d.id == well_known::DATATYPE_NUMERIC)
            .unwrap();
        concept.uuid = Some("5089AAAA".to_string());
        concept.add_name("WEIGHT (KG)", "en", true);
        concept.add_answer(1065);
        concept.add_set_member(5090, 1.0);
        concept.add_description("Patient's weight in kilograms", "en");
        concept.add_mapping("CIEL", "5089");
        concept
    }

    #[test]
    fn test_full_range_is_valid() {
        assert!(make_full_range().validate_ranges().is_ok());
    }

    #[test]
    fn test_out_of_order_range_rejected() {
        let mut numeric = make_full_range();
        numeric.hi_normal = Some(40.0);
        let err = numeric.validate_ranges().unwrap_err();
        assert_eq!(err.upper, "hi_normal");
        assert_eq!(err.lower, "low_critical");
    }

    #[test]
    fn test_partial_ranges_skip_unset_bounds() {
        let mut numeric = ConceptNumeric::new(1);
        numeric.low_absolute = Some(10.0);
        numeric.hi_absolute = Some(20.0);
        assert!(numeric.validate_ranges().is_ok());

        numeric.hi_normal = Some(5.0);
        assert!(numeric.validate_ranges().is_err());
    }

    #[test]
    fn test_setting_one_bound_leaves_others() {
        let mut numeric = make_full_range();
        numeric.hi_critical = Some(250.0);
        assert_eq!(numeric.low_absolute, Some(0.0));
        assert_eq!(numeric.low_critical, Some(50.0));
        assert_eq!(numeric.low_normal, Some(100.0));
        assert_eq!(numeric.hi_normal, Some(200.0));
        assert_eq!(numeric.hi_absolute, Some(1000.0));
    }

    #[test]
    fn test_classify() {
        let numeric = make_full_range();
        assert_eq!(numeric.classify(-1.0), Some(RangeBand::BelowAbsolute));
        assert_eq!(numeric.classify(10.0), Some(RangeBand::CriticalLow));
        assert_eq!(numeric.classify(75.0), Some(RangeBand::Low));
        assert_eq!(numeric.classify(150.0), Some(RangeBand::Normal));
        assert_eq!(numeric.classify(100.0), Some(RangeBand::Normal));
        assert_eq!(numeric.classify(250.0), Some(RangeBand::High));
        assert_eq!(numeric.classify(500.0), Some(RangeBand::CriticalHigh));
        assert_eq!(numeric.classify(1001.0), Some(RangeBand::AboveAbsolute));
        assert_eq!(ConceptNumeric::new(2).classify(0.0), None);
    }

    #[test]
    fn test_unset_bound_is_not_zero() {
        let mut numeric = ConceptNumeric::new(1);
        numeric.hi_normal = Some(10.0);
        assert_eq!(numeric.classify(-5.0), Some(RangeBand::Normal));
    }

    #[test]
    fn test_from_concept_resets_numeric_fields() {
        let source = make_test_concept();
        let numeric = ConceptNumeric::from_concept(&source);

        assert_eq!(numeric.concept_id(), 5089);
        assert!(numeric.is_numeric());
        assert!(!numeric.has_ranges());
        assert_eq!(numeric.units, "");
        assert!(!numeric.precise);
        assert_eq!(numeric.display_precision, None);
        assert_eq!(numeric.concept.uuid.as_deref(), Some("5089AAAA"));
    }

    #[test]
    fn test_from_concept_deep_copies_children() {
        let mut source = make_test_concept();
        // a name carried over from another concept must be re-owned
        source.names.push(ConceptName {
            concept_id: 999,
            name: "WT".to_string(),
            locale: "en".to_string(),
            preferred: false,
        });

        let mut numeric = ConceptNumeric::from_concept(&source);

        assert!(numeric.concept.names.iter().all(|n| n.concept_id == 5089));
        assert!(numeric.concept.answers.iter().all(|a| a.concept_id == 5089));
        assert!(numeric.concept.concept_sets.iter().all(|s| s.concept_id == 5089));
        assert!(numeric.concept.descriptions.iter().all(|d| d.concept_id == 5089));
        assert!(numeric.concept.concept_mappings.iter().all(|m| m.concept_id == 5089));

        numeric.concept.names[0].name = "CHANGED".to_string();
        numeric.concept.answers.clear();
        assert_eq!(source.names[0].name, "WEIGHT (KG)");
        assert_eq!(source.names[1].concept_id, 999);
        assert_eq!(source.answers.len(), 1);
    }

    #[test]
    fn test_is_numeric_follows_datatype() {
        let mut numeric = ConceptNumeric::new(1);
        assert!(!numeric.is_numeric());
        numeric.concept.datatype.name = well_known::NUMERIC_NAME.to_string();
        assert!(numeric.is_numeric());
    }

    #[test]
    fn test_format_value() {
        let mut numeric = ConceptNumeric::new(1);
        assert_eq!(numeric.format_value(36.6), "37");

        numeric.precise = true;
        assert_eq!(numeric.format_value(36.6), "36.6");

        numeric.display_precision = Some(2);
        assert_eq!(numeric.format_value(36.64), "37");
        assert_eq!(numeric.format_value(0.01234), "0.012");
        assert_eq!(numeric.format_value(12345.0), "12000");
    }
}
