//! Well-known concept datatypes and concept classes.
//!
//! These are the standard dictionary entries every installation ships with.
//! A store seeds its datatype and class tables from here.
//!
//! # Examples
//!
//! ```
//! use medrec_types::well_known;
//!
//! assert_eq!(well_known::NUMERIC_NAME, "Numeric");
//! let numeric = well_known::datatypes()
//!     .into_iter()
//!     .find(|d| d.id == well_known::DATATYPE_NUMERIC)
//!     .unwrap();
//! assert!(numeric.is_numeric());
//! ```

use crate::{ConceptClass, ConceptDatatype};

// =============================================================================
// Datatype names
// =============================================================================

/// Name of the numeric datatype. Only concepts of this datatype report
/// themselves as numeric.
pub const NUMERIC_NAME: &str = "Numeric";

/// Name of the coded datatype.
pub const CODED_NAME: &str = "Coded";

/// Name of the free-text datatype.
pub const TEXT_NAME: &str = "Text";

/// Name of the "not applicable" datatype used by sets and answers.
pub const NOT_APPLICABLE_NAME: &str = "N/A";

// =============================================================================
// Datatype ids
// =============================================================================

/// Numeric (NM).
pub const DATATYPE_NUMERIC: u32 = 1;
/// Coded (CWE).
pub const DATATYPE_CODED: u32 = 2;
/// Text (ST).
pub const DATATYPE_TEXT: u32 = 3;
/// N/A (ZZ).
pub const DATATYPE_NOT_APPLICABLE: u32 = 4;
/// Document (RP).
pub const DATATYPE_DOCUMENT: u32 = 5;
/// Date (DT).
pub const DATATYPE_DATE: u32 = 6;
/// Time (TM).
pub const DATATYPE_TIME: u32 = 7;
/// Datetime (TS).
pub const DATATYPE_DATETIME: u32 = 8;
/// Boolean (BIT).
pub const DATATYPE_BOOLEAN: u32 = 10;

// =============================================================================
// Class ids
// =============================================================================

/// Laboratory or diagnostic test.
pub const CLASS_TEST: u32 = 1;
/// Procedure.
pub const CLASS_PROCEDURE: u32 = 2;
/// Drug.
pub const CLASS_DRUG: u32 = 3;
/// Diagnosis.
pub const CLASS_DIAGNOSIS: u32 = 4;
/// Finding.
pub const CLASS_FINDING: u32 = 5;
/// Anatomy.
pub const CLASS_ANATOMY: u32 = 6;
/// Question.
pub const CLASS_QUESTION: u32 = 7;
/// Set of laboratory tests.
pub const CLASS_LAB_SET: u32 = 8;
/// Set of medications.
pub const CLASS_MED_SET: u32 = 9;
/// Convenience set.
pub const CLASS_CONV_SET: u32 = 10;
/// Miscellaneous.
pub const CLASS_MISC: u32 = 11;
/// Symptom.
pub const CLASS_SYMPTOM: u32 = 12;
/// Program.
pub const CLASS_PROGRAM: u32 = 16;
/// Program workflow.
pub const CLASS_WORKFLOW: u32 = 17;
/// Program workflow state.
pub const CLASS_STATE: u32 = 18;

/// The standard concept datatypes.
pub fn datatypes() -> Vec<ConceptDatatype> {
    [
        (DATATYPE_NUMERIC, NUMERIC_NAME, "NM"),
        (DATATYPE_CODED, CODED_NAME, "CWE"),
        (DATATYPE_TEXT, TEXT_NAME, "ST"),
        (DATATYPE_NOT_APPLICABLE, NOT_APPLICABLE_NAME, "ZZ"),
        (DATATYPE_DOCUMENT, "Document", "RP"),
        (DATATYPE_DATE, "Date", "DT"),
        (DATATYPE_TIME, "Time", "TM"),
        (DATATYPE_DATETIME, "Datetime", "TS"),
        (DATATYPE_BOOLEAN, "Boolean", "BIT"),
    ]
    .into_iter()
    .map(|(id, name, hl7)| ConceptDatatype {
        id,
        name: name.to_string(),
        hl7_abbreviation: hl7.to_string(),
    })
    .collect()
}

/// The standard concept classes.
pub fn classes() -> Vec<ConceptClass> {
    [
        (CLASS_TEST, "Test"),
        (CLASS_PROCEDURE, "Procedure"),
        (CLASS_DRUG, "Drug"),
        (CLASS_DIAGNOSIS, "Diagnosis"),
        (CLASS_FINDING, "Finding"),
        (CLASS_ANATOMY, "Anatomy"),
        (CLASS_QUESTION, "Question"),
        (CLASS_LAB_SET, "LabSet"),
        (CLASS_MED_SET, "MedSet"),
        (CLASS_CONV_SET, "ConvSet"),
        (CLASS_MISC, "Misc"),
        (CLASS_SYMPTOM, "Symptom"),
        (CLASS_PROGRAM, "Program"),
        (CLASS_WORKFLOW, "Workflow"),
        (CLASS_STATE, "State"),
    ]
    .into_iter()
    .map(|(id, name)| ConceptClass {
        id,
        name: name.to_string(),
        description: String::new(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_ids_unique() {
        let mut ids: Vec<u32> = datatypes().iter().map(|d| d.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), datatypes().len());
    }

    #[test]
    fn test_only_numeric_datatype_is_numeric() {
        let numeric: Vec<_> = datatypes().into_iter().filter(|d| d.is_numeric()).collect();
        assert_eq!(numeric.len(), 1);
        assert_eq!(numeric[0].id, DATATYPE_NUMERIC);
    }

    #[test]
    fn test_class_lookup() {
        let drug = classes().into_iter().find(|c| c.id == CLASS_DRUG).unwrap();
        assert_eq!(drug.name, "Drug");
    }
}
