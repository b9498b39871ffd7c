//! # medrec-types
//!
//! Type definitions for a medical-records cohort engine.
//!
//! This crate provides the domain model shared by the store and query
//! layers: coded concepts (including numeric concepts with reference
//! ranges), patients, observations, encounters, drug orders, program
//! enrollment, and the `PatientSet` produced by cohort queries.
//!
//! ## Features
//!
//! - `serde` (default): Enables serialization/deserialization support via serde.
//!
//! ## Usage
//!
//! ```rust
//! use medrec_types::{ComparisonOperator, ConceptNumeric, PatientSet, TimeModifier};
//!
//! let mut hemoglobin = ConceptNumeric::new(21);
//! hemoglobin.low_normal = Some(12.0);
//! hemoglobin.hi_normal = Some(16.0);
//! assert!(hemoglobin.validate_ranges().is_ok());
//!
//! let cohort: PatientSet = [3, 1, 2].into_iter().collect();
//! assert_eq!(cohort.to_vec(), vec![1, 2, 3]);
//!
//! assert!(ComparisonOperator::GreaterThan.holds(6.0, 5.0));
//! assert!(TimeModifier::Avg.is_aggregate());
//! ```

#![warn(missing_docs)]

mod concept;
mod concept_numeric;
mod encounter;
mod enums;
mod ids;
mod observation;
mod order;
mod patient;
mod patient_set;
mod program;
pub mod well_known;

// Re-export all public types at crate root
pub use concept::{
    Concept, ConceptAnswer, ConceptChild, ConceptChildren, ConceptClass, ConceptDatatype,
    ConceptDescription, ConceptMap, ConceptName, ConceptProposal, ConceptSetMember, ConceptWord,
    ProposalState,
};
pub use concept_numeric::{ConceptNumeric, RangeBand, RangeOrderError};
pub use encounter::{Encounter, EncounterType, Location};
pub use enums::{ComparisonOperator, TimeModifier, UnknownVariant};
pub use ids::{
    ConceptId, DrugId, EncounterId, EncounterTypeId, LocationId, ObsId, OrderId, PatientId,
    ProgramId, StateId, UserId, WorkflowId,
};
pub use observation::Observation;
pub use order::{Drug, DrugOrder};
pub use patient::{Patient, PatientCharacteristics};
pub use patient_set::PatientSet;
pub use program::{PatientProgram, PatientState, Program, ProgramWorkflow, ProgramWorkflowState};
