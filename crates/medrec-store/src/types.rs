//! Store-specific types: errors, configuration and discovered data files.

use std::fmt;
use std::path::PathBuf;

use chrono::{Local, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Errors raised while loading or reading clinical data.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error reading a data file.
    #[error("IO error reading data file: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid identifier.
    #[error("Invalid identifier: {value}")]
    InvalidId {
        /// The invalid value that was encountered.
        value: String,
    },

    /// Invalid date or datetime.
    #[error("Invalid date format: {value} (expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)")]
    InvalidDate {
        /// The invalid date value.
        value: String,
    },

    /// Invalid boolean value.
    #[error("Invalid boolean value: {value} (expected 0 or 1)")]
    InvalidBoolean {
        /// The invalid boolean value.
        value: String,
    },

    /// Invalid decimal value.
    #[error("Invalid number: {value}")]
    InvalidNumber {
        /// The invalid value.
        value: String,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Directory not found.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Required file missing from the data directory.
    #[error("Required data file not found: {file} in {directory}")]
    RequiredFileMissing {
        /// The file that was missing.
        file: String,
        /// The directory that was searched.
        directory: String,
    },

    /// Invalid header - column count mismatch.
    #[error("Invalid header: expected {expected} columns, found {found}")]
    InvalidHeader {
        /// Expected column count.
        expected: usize,
        /// Found column count.
        found: usize,
    },

    /// Unexpected column name.
    #[error("Unexpected column '{found}' at position {position}, expected '{expected}'")]
    UnexpectedColumn {
        /// The column position.
        position: usize,
        /// Expected column name.
        expected: String,
        /// Found column name.
        found: String,
    },

    /// A row refers to an entity that was never loaded.
    #[error("Dangling reference: {kind} {id}")]
    DanglingReference {
        /// Kind of the missing entity.
        kind: EntityKind,
        /// Its id.
        id: u32,
    },

    /// The storage backend failed.
    #[error("Backend failure: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The kinds of entity a lookup can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A patient.
    Patient,
    /// A concept.
    Concept,
    /// A numeric concept.
    ConceptNumeric,
    /// A concept class.
    ConceptClass,
    /// A concept datatype.
    ConceptDatatype,
    /// A concept proposal.
    ConceptProposal,
    /// A drug.
    Drug,
    /// A location.
    Location,
    /// An encounter type.
    EncounterType,
    /// A program.
    Program,
    /// A program workflow.
    Workflow,
    /// A program enrollment.
    PatientProgram,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Patient => "patient",
            Self::Concept => "concept",
            Self::ConceptNumeric => "numeric concept",
            Self::ConceptClass => "concept class",
            Self::ConceptDatatype => "concept datatype",
            Self::ConceptProposal => "concept proposal",
            Self::Drug => "drug",
            Self::Location => "location",
            Self::EncounterType => "encounter type",
            Self::Program => "program",
            Self::Workflow => "workflow",
            Self::PatientProgram => "patient program",
        };
        f.write_str(name)
    }
}

/// Errors reported by the query engine and the concept service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// An identifier does not resolve to a known entity.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of entity looked up.
        kind: EntityKind,
        /// The unknown id.
        id: u32,
    },

    /// Arguments are contradictory or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage backend failed while executing the request.
    #[error("Data access failure: {0}")]
    DataAccessFailure(#[from] StoreError),
}

impl ServiceError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: EntityKind, id: u32) -> Self {
        Self::NotFound { kind, id }
    }

    /// Shorthand for an `InvalidArgument` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Result type for engine and service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Configuration for loading data files.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Whether to keep voided rows.
    pub include_voided: bool,
    /// Batch size for processing (affects memory usage).
    pub batch_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            include_voided: false,
            batch_size: 10_000,
        }
    }
}

/// Configuration for the cohort query engine.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Fixed "now" used for ages, default drug-order dates and current
    /// program state. `None` reads the local clock on every call.
    pub as_of: Option<NaiveDateTime>,
    /// Minimum number of patients before numeric reductions run in
    /// parallel (only with the `parallel` feature).
    pub parallel_threshold: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            as_of: None,
            parallel_threshold: 4_096,
        }
    }
}

impl QueryConfig {
    /// A configuration pinned to the given instant.
    pub fn as_of(now: NaiveDateTime) -> Self {
        Self {
            as_of: Some(now),
            ..Default::default()
        }
    }

    /// The instant queries treat as "now".
    pub fn now(&self) -> NaiveDateTime {
        self.as_of.unwrap_or_else(|| Local::now().naive_local())
    }

    /// The date queries treat as "today".
    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Statistics from loading a data directory.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    /// Patients loaded.
    pub patients: usize,
    /// Concepts loaded.
    pub concepts: usize,
    /// Observations loaded.
    pub observations: usize,
    /// Encounters loaded.
    pub encounters: usize,
    /// Drug orders loaded.
    pub drug_orders: usize,
    /// Program enrollments loaded.
    pub patient_programs: usize,
    /// Time taken to load in milliseconds.
    pub load_time_ms: u64,
}

/// Data files discovered in a data directory.
#[derive(Debug, Clone, Default)]
pub struct DataFiles {
    /// patients.tsv
    pub patients: Option<PathBuf>,
    /// locations.tsv
    pub locations: Option<PathBuf>,
    /// encounter_types.tsv
    pub encounter_types: Option<PathBuf>,
    /// encounters.tsv
    pub encounters: Option<PathBuf>,
    /// concepts.tsv
    pub concepts: Option<PathBuf>,
    /// concept_numerics.tsv
    pub concept_numerics: Option<PathBuf>,
    /// concept_sets.tsv
    pub concept_sets: Option<PathBuf>,
    /// concept_answers.tsv
    pub concept_answers: Option<PathBuf>,
    /// drugs.tsv
    pub drugs: Option<PathBuf>,
    /// observations.tsv
    pub observations: Option<PathBuf>,
    /// drug_orders.tsv
    pub drug_orders: Option<PathBuf>,
    /// programs.tsv
    pub programs: Option<PathBuf>,
    /// workflows.tsv
    pub workflows: Option<PathBuf>,
    /// workflow_states.tsv
    pub workflow_states: Option<PathBuf>,
    /// patient_programs.tsv
    pub patient_programs: Option<PathBuf>,
    /// patient_states.tsv
    pub patient_states: Option<PathBuf>,
}

impl DataFiles {
    /// Creates a new empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if all required files are present.
    pub fn has_required_files(&self) -> bool {
        self.patients.is_some()
    }

    /// Returns a list of missing required files.
    pub fn missing_files(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.patients.is_none() {
            missing.push("patients.tsv");
        }
        missing
    }

    /// Number of files found.
    pub fn file_count(&self) -> usize {
        [
            &self.patients,
            &self.locations,
            &self.encounter_types,
            &self.encounters,
            &self.concepts,
            &self.concept_numerics,
            &self.concept_sets,
            &self.concept_answers,
            &self.drugs,
            &self.observations,
            &self.drug_orders,
            &self.programs,
            &self.workflows,
            &self.workflow_states,
            &self.patient_programs,
            &self.patient_states,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_default() {
        let config = LoadConfig::default();
        assert!(!config.include_voided);
        assert_eq!(config.batch_size, 10_000);
    }

    #[test]
    fn test_query_config_pinned_clock() {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let config = QueryConfig::as_of(now);
        assert_eq!(config.now(), now);
        assert_eq!(config.today(), now.date());
    }

    #[test]
    fn test_data_files_missing() {
        let files = DataFiles {
            observations: Some(PathBuf::from("observations.tsv")),
            ..Default::default()
        };

        assert!(!files.has_required_files());
        assert_eq!(files.missing_files(), vec!["patients.tsv"]);
        assert_eq!(files.file_count(), 1);
    }

    #[test]
    fn test_service_error_messages() {
        let err = ServiceError::not_found(EntityKind::EncounterType, 4);
        assert_eq!(err.to_string(), "encounter type 4 not found");

        let err: ServiceError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, ServiceError::DataAccessFailure(_)));
    }
}
