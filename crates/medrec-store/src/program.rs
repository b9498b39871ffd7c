//! Program, workflow and enrollment row parsing.
//!
//! Rows are parsed into the domain types with their child collections
//! empty; the store links workflows into programs, states into workflows
//! and patient states into enrollments.

use csv::StringRecord;
use medrec_types::{PatientProgram, PatientState, Program, ProgramWorkflow, ProgramWorkflowState};

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadConfig, StoreResult};

const PROGRAM_COLUMNS: &[&str] = &["programId", "conceptId", "name"];

const WORKFLOW_COLUMNS: &[&str] = &["workflowId", "programId", "conceptId"];

const WORKFLOW_STATE_COLUMNS: &[&str] =
    &["stateId", "workflowId", "conceptId", "initial", "terminal"];

const PATIENT_PROGRAM_COLUMNS: &[&str] = &[
    "patientProgramId",
    "patientId",
    "programId",
    "dateEnrolled",
    "dateCompleted",
    "voided",
];

const PATIENT_STATE_COLUMNS: &[&str] = &[
    "patientStateId",
    "patientProgramId",
    "stateId",
    "startDate",
    "endDate",
    "voided",
];

impl TsvRecord for Program {
    const EXPECTED_COLUMNS: &'static [&'static str] = PROGRAM_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(Program {
            program_id: parse::id(parse::field(record, 0))?,
            concept_id: parse::id(parse::field(record, 1))?,
            name: parse::field(record, 2).to_string(),
            workflows: Vec::new(),
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for ProgramWorkflow {
    const EXPECTED_COLUMNS: &'static [&'static str] = WORKFLOW_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(ProgramWorkflow {
            workflow_id: parse::id(parse::field(record, 0))?,
            program_id: parse::id(parse::field(record, 1))?,
            concept_id: parse::id(parse::field(record, 2))?,
            states: Vec::new(),
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for ProgramWorkflowState {
    const EXPECTED_COLUMNS: &'static [&'static str] = WORKFLOW_STATE_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(ProgramWorkflowState {
            state_id: parse::id(parse::field(record, 0))?,
            workflow_id: parse::id(parse::field(record, 1))?,
            concept_id: parse::id(parse::field(record, 2))?,
            initial: parse::boolean(parse::field(record, 3))?,
            terminal: parse::boolean(parse::field(record, 4))?,
        })
    }

    fn passes_filter(&self, _config: &LoadConfig) -> bool {
        true
    }
}

impl TsvRecord for PatientProgram {
    const EXPECTED_COLUMNS: &'static [&'static str] = PATIENT_PROGRAM_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(PatientProgram {
            patient_program_id: parse::id(parse::field(record, 0))?,
            patient_id: parse::id(parse::field(record, 1))?,
            program_id: parse::id(parse::field(record, 2))?,
            date_enrolled: parse::optional_date(parse::field(record, 3))?,
            date_completed: parse::optional_date(parse::field(record, 4))?,
            voided: parse::boolean(parse::field(record, 5))?,
            states: Vec::new(),
        })
    }

    fn passes_filter(&self, config: &LoadConfig) -> bool {
        config.include_voided || !self.voided
    }
}

impl TsvRecord for PatientState {
    const EXPECTED_COLUMNS: &'static [&'static str] = PATIENT_STATE_COLUMNS;

    fn from_record(record: &StringRecord) -> StoreResult<Self> {
        Ok(PatientState {
            patient_state_id: parse::id(parse::field(record, 0))?,
            patient_program_id: parse::id(parse::field(record, 1))?,
            state_id: parse::id(parse::field(record, 2))?,
            start_date: parse::optional_date(parse::field(record, 3))?,
            end_date: parse::optional_date(parse::field(record, 4))?,
            voided: parse::boolean(parse::field(record, 5))?,
        })
    }

    fn passes_filter(&self, config: &LoadConfig) -> bool {
        config.include_voided || !self.voided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_record(fields: &[&str]) -> StringRecord {
        let mut record = StringRecord::new();
        for field in fields {
            record.push_field(field);
        }
        record
    }

    #[test]
    fn test_parse_program_rows() {
        let program = Program::from_record(&make_record(&["1", "1482", "HIV PROGRAM"])).unwrap();
        assert_eq!(program.program_id, 1);
        assert!(program.workflows.is_empty());

        let workflow = ProgramWorkflow::from_record(&make_record(&["2", "1", "1484"])).unwrap();
        assert_eq!(workflow.program_id, 1);

        let state =
            ProgramWorkflowState::from_record(&make_record(&["7", "2", "1577", "1", "0"])).unwrap();
        assert!(state.initial);
        assert!(!state.terminal);
    }

    #[test]
    fn test_parse_enrollment_rows() {
        let enrollment =
            PatientProgram::from_record(&make_record(&["30", "7", "1", "2022-02-01", "", "0"]))
                .unwrap();
        assert_eq!(enrollment.patient_id, 7);
        assert_eq!(enrollment.date_enrolled, NaiveDate::from_ymd_opt(2022, 2, 1));
        assert_eq!(enrollment.date_completed, None);

        let state =
            PatientState::from_record(&make_record(&["40", "30", "7", "2022-02-01", "", "1"]))
                .unwrap();
        assert_eq!(state.patient_program_id, 30);
        assert!(!state.passes_filter(&LoadConfig::default()));
    }
}
