//! Programs, workflows and enrollment.

use chrono::NaiveDate;

use crate::{ConceptId, PatientId, ProgramId, StateId, WorkflowId};

/// A state within a program workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramWorkflowState {
    /// State id.
    pub state_id: StateId,
    /// Workflow the state belongs to.
    pub workflow_id: WorkflowId,
    /// Concept naming the state.
    pub concept_id: ConceptId,
    /// Whether patients may start in this state.
    pub initial: bool,
    /// Whether this state ends the workflow.
    pub terminal: bool,
}

/// A workflow within a program (e.g. "treatment status").
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramWorkflow {
    /// Workflow id.
    pub workflow_id: WorkflowId,
    /// Program the workflow belongs to.
    pub program_id: ProgramId,
    /// Concept naming the workflow.
    pub concept_id: ConceptId,
    /// States of the workflow.
    pub states: Vec<ProgramWorkflowState>,
}

impl ProgramWorkflow {
    /// Returns true if `state_id` is one of this workflow's states.
    pub fn has_state(&self, state_id: StateId) -> bool {
        self.states.iter().any(|s| s.state_id == state_id)
    }
}

/// A care program patients can be enrolled in.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    /// Program id.
    pub program_id: ProgramId,
    /// Concept naming the program.
    pub concept_id: ConceptId,
    /// Display name.
    pub name: String,
    /// Workflows of the program.
    pub workflows: Vec<ProgramWorkflow>,
}

/// A patient's time in one workflow state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatientState {
    /// Patient state id.
    pub patient_state_id: u32,
    /// Enrollment the state belongs to.
    pub patient_program_id: u32,
    /// Workflow state entered.
    pub state_id: StateId,
    /// Day the state was entered.
    pub start_date: Option<NaiveDate>,
    /// Day the state was left.
    pub end_date: Option<NaiveDate>,
    /// Voided states are ignored.
    pub voided: bool,
}

impl PatientState {
    /// Returns true if the state is in effect on `date` (start inclusive,
    /// end exclusive, absent bounds open).
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        !self.voided
            && self.start_date.map_or(true, |d| d <= date)
            && self.end_date.map_or(true, |d| date < d)
    }
}

/// A patient's enrollment in a program.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use medrec_types::PatientProgram;
///
/// let d = |m| NaiveDate::from_ymd_opt(2024, m, 1).unwrap();
/// let enrollment = PatientProgram {
///     patient_program_id: 1,
///     patient_id: 7,
///     program_id: 2,
///     date_enrolled: Some(d(1)),
///     date_completed: Some(d(6)),
///     voided: false,
///     states: vec![],
/// };
/// assert!(enrollment.is_active_on(d(3)));
/// assert!(!enrollment.is_active_on(d(6)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatientProgram {
    /// Enrollment id.
    pub patient_program_id: u32,
    /// Patient enrolled.
    pub patient_id: PatientId,
    /// Program enrolled in.
    pub program_id: ProgramId,
    /// Day of enrollment.
    pub date_enrolled: Option<NaiveDate>,
    /// Day of completion.
    pub date_completed: Option<NaiveDate>,
    /// Voided enrollments are ignored.
    pub voided: bool,
    /// Workflow states recorded during the enrollment.
    pub states: Vec<PatientState>,
}

impl PatientProgram {
    /// Returns true if the enrollment is in effect on `date`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        !self.voided
            && self.date_enrolled.map_or(true, |d| d <= date)
            && self.date_completed.map_or(true, |d| date < d)
    }

    /// The state of `workflow` in effect on `date`, if any. When several
    /// overlap, the one that started last wins.
    pub fn state_on(&self, workflow: &ProgramWorkflow, date: NaiveDate) -> Option<&PatientState> {
        self.states
            .iter()
            .filter(|s| workflow.has_state(s.state_id) && s.is_active_on(date))
            .max_by_key(|s| (s.start_date, s.patient_state_id))
    }
}
