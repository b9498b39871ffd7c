//! Identifier types.
//!
//! Every persisted entity is keyed by an opaque integer. The aliases below
//! only document intent; they do not prevent mixing one kind of id with
//! another.

/// Identifier of a patient.
///
/// # Examples
///
/// ```
/// use medrec_types::PatientId;
///
/// let patient: PatientId = 42;
/// ```
pub type PatientId = u32;

/// Identifier of a concept (diagnosis, test, drug concept, answer, ...).
pub type ConceptId = u32;

/// Identifier of a drug formulation.
pub type DrugId = u32;

/// Identifier of a location.
pub type LocationId = u32;

/// Identifier of an encounter type.
pub type EncounterTypeId = u32;

/// Identifier of an encounter.
pub type EncounterId = u32;

/// Identifier of an observation.
pub type ObsId = u32;

/// Identifier of an order.
pub type OrderId = u32;

/// Identifier of a program.
pub type ProgramId = u32;

/// Identifier of a program workflow.
pub type WorkflowId = u32;

/// Identifier of a program workflow state.
pub type StateId = u32;

/// Identifier of a user (creator, changer, retirer).
pub type UserId = u32;
