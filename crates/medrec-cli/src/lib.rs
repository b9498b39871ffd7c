//! # medrec-cli
//!
//! Loads a clinical data directory and answers one JSON cohort query.
//!
//! A request names a cohort and, optionally, asks for enrichment:
//!
//! ```json
//! {
//!   "cohort": { "type": "numeric_obs", "concept_id": 5089, "time_modifier": "LAST",
//!               "comparison": { "operator": ">", "value": 60.0 } },
//!   "observations": { "concept_id": 5089, "from_date": "2023-01-01" },
//!   "describe": true
//! }
//! ```
//!
//! A bare cohort definition is accepted as a request without enrichment.

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use medrec_store::{
    discover_data_files, ClinicalRepository, ClinicalStore, CohortDefinition, CohortQueryEngine,
    LoadConfig, QueryConfig, ServiceError, StoreError,
};
use medrec_types::{ConceptId, Observation, PatientId, PatientSet};

/// Environment variable naming the data directory.
pub const DATA_PATH_VAR: &str = "MEDREC_DATA_PATH";
/// Environment variable pinning "now" for age and date computations.
pub const AS_OF_VAR: &str = "MEDREC_AS_OF";
/// Data directory used when none is configured.
pub const DEFAULT_DATA_PATH: &str = "data";

/// Errors reported by the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Loading the data directory failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The query was rejected or failed.
    #[error(transparent)]
    Query(#[from] ServiceError),

    /// The request could not be parsed or the response written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the request failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the command-line front end.
pub type CliResult<T> = Result<T, CliError>;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Directory holding the data files.
    pub data_path: PathBuf,
    /// Fixed "now"; the local clock when absent.
    pub as_of: Option<NaiveDateTime>,
}

impl CliConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> CliResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through a variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CliResult<Self> {
        let data_path = lookup(DATA_PATH_VAR)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());
        let as_of = match lookup(AS_OF_VAR) {
            Some(value) if !value.trim().is_empty() => Some(parse_as_of(value.trim())?),
            _ => None,
        };
        Ok(Self {
            data_path: PathBuf::from(data_path),
            as_of,
        })
    }

    /// Query engine configuration derived from this one.
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            as_of: self.as_of,
            ..Default::default()
        }
    }
}

fn parse_as_of(value: &str) -> CliResult<NaiveDateTime> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(datetime);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            CliError::Config(format!(
                "{} must be YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS, got '{}'",
                AS_OF_VAR, value
            ))
        })
}

/// Observation enrichment requested alongside a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRequest {
    /// Observed concept.
    pub concept_id: ConceptId,
    /// First day (inclusive).
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    /// Last day (inclusive).
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
}

/// A cohort query with optional enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The cohort to evaluate.
    pub cohort: CohortDefinition,
    /// Observations to attach to each patient of the cohort.
    #[serde(default)]
    pub observations: Option<ObservationRequest>,
    /// Attach a one-line description of each patient.
    #[serde(default)]
    pub describe: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequestBody {
    Full(QueryRequest),
    Bare(CohortDefinition),
}

impl QueryRequest {
    /// Parses a request, accepting a bare cohort definition too.
    pub fn from_json(json: &str) -> CliResult<Self> {
        Ok(match serde_json::from_str::<RequestBody>(json)? {
            RequestBody::Full(request) => request,
            RequestBody::Bare(cohort) => QueryRequest {
                cohort,
                observations: None,
                describe: false,
            },
        })
    }
}

/// The answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Patients in the cohort, ascending.
    pub patients: PatientSet,
    /// Requested observations by patient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observations: Option<BTreeMap<PatientId, Vec<Observation>>>,
    /// Requested descriptions by patient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<BTreeMap<PatientId, String>>,
}

/// Reads a request from a file, or from `input` when `source` is `-`.
pub fn read_request(source: &str, mut input: impl Read) -> CliResult<QueryRequest> {
    let json = if source == "-" {
        let mut buffer = String::new();
        input.read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(source)?
    };
    QueryRequest::from_json(&json)
}

/// Discovers and loads every data file of a directory.
pub fn load_store(data_path: &Path) -> CliResult<ClinicalStore> {
    let start = Instant::now();
    let files = discover_data_files(data_path)?;
    tracing::info!("Discovered {} data files in {}", files.file_count(), data_path.display());

    let mut store = ClinicalStore::new();
    let stats = store.load_all(&files, &LoadConfig::default())?;
    tracing::info!(
        "Loaded {} patients, {} concepts, {} observations in {:?}",
        stats.patients,
        stats.concepts,
        stats.observations,
        start.elapsed()
    );
    Ok(store)
}

/// Evaluates a request against an engine.
pub fn run_query<R: ClinicalRepository>(
    engine: &CohortQueryEngine<R>,
    request: &QueryRequest,
) -> CliResult<QueryResponse> {
    let patients = engine.evaluate(&request.cohort)?;
    tracing::info!("Cohort has {} patients", patients.len());

    let observations = match &request.observations {
        Some(wanted) => Some(engine.observations(
            &patients,
            wanted.concept_id,
            wanted.from_date,
            wanted.to_date,
        )?),
        None => None,
    };
    let descriptions = if request.describe {
        Some(engine.short_patient_descriptions(&patients)?)
    } else {
        None
    };

    Ok(QueryResponse {
        patients,
        observations,
        descriptions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Arc;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn make_test_directory() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, lines: &[&str]| {
            fs::write(dir.path().join(name), lines.join("\n") + "\n").unwrap();
        };
        write("patients.tsv", &[
            concat!(
                "patientId\tgender\tbirthdate\tdead\tdeathDate\t",
                "givenName\tfamilyName\thealthCenter\tvoided"
            ),
            "1\tF\t1980-01-01\t0\t\t\t\t\t0",
            "2\tM\t1990-06-15\t0\t\t\t\t\t0",
        ]);
        write("concepts.tsv", &[
            "conceptId\tdatatypeId\tclassId\tisSet\tretired\tname\tlocale",
            "5089\t1\t1\t0\t0\tWEIGHT (KG)\ten",
        ]);
        write("observations.tsv", &[
            concat!(
                "obsId\tpatientId\tconceptId\tencounterId\tobsDatetime\t",
                "locationId\tvalueNumeric\tvalueText\tvalueCoded\tvoided"
            ),
            "100\t1\t5089\t\t2023-01-05\t\t61.5\t\t\t0",
            "101\t2\t5089\t\t2023-01-06\t\t58\t\t\t0",
        ]);
        dir
    }

    #[test]
    fn test_config_defaults() {
        let config = CliConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        assert_eq!(config.as_of, None);
    }

    #[test]
    fn test_config_as_of() {
        let date = CliConfig::from_lookup(lookup(&[(AS_OF_VAR, "2024-06-01")])).unwrap();
        assert_eq!(
            date.as_of,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(0, 0, 0)
        );

        let datetime = CliConfig::from_lookup(lookup(&[
            (AS_OF_VAR, "2024-06-01T08:30:00"),
            (DATA_PATH_VAR, "/srv/medrec"),
        ]))
        .unwrap();
        assert_eq!(datetime.data_path, PathBuf::from("/srv/medrec"));
        assert_eq!(
            datetime.query_config().as_of,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(8, 30, 0)
        );

        let bad = CliConfig::from_lookup(lookup(&[(AS_OF_VAR, "June 1st")]));
        assert!(matches!(bad, Err(CliError::Config(_))));
    }

    #[test]
    fn test_request_forms() {
        let bare = QueryRequest::from_json(r#"{ "type": "all" }"#).unwrap();
        assert_eq!(bare.cohort, CohortDefinition::All);
        assert!(!bare.describe);

        let full = QueryRequest::from_json(
            r#"{ "cohort": { "type": "all" },
                 "observations": { "concept_id": 5089 },
                 "describe": true }"#,
        )
        .unwrap();
        assert_eq!(full.observations.map(|o| o.concept_id), Some(5089));
        assert!(full.describe);

        assert!(QueryRequest::from_json(r#"{ "type": "nonsense" }"#).is_err());
    }

    #[test]
    fn test_read_request_from_stdin() {
        let request = read_request("-", r#"{ "type": "all" }"#.as_bytes()).unwrap();
        assert_eq!(request.cohort, CohortDefinition::All);
    }

    #[test]
    fn test_load_and_run() {
        let dir = make_test_directory();
        let store = load_store(dir.path()).unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let engine = CohortQueryEngine::new(Arc::new(store), QueryConfig::as_of(now));

        let request = QueryRequest::from_json(
            r#"{
                "cohort": { "type": "numeric_obs", "concept_id": 5089,
                            "comparison": { "operator": ">", "value": 60.0 } },
                "observations": { "concept_id": 5089 },
                "describe": true
            }"#,
        )
        .unwrap();
        let response = run_query(&engine, &request).unwrap();

        assert_eq!(response.patients.to_vec(), vec![1]);
        let observations = response.observations.as_ref().unwrap();
        assert_eq!(observations[&1][0].value_numeric, Some(61.5));
        assert_eq!(response.descriptions.as_ref().unwrap()[&1], "Female, 44 years old");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["patients"], serde_json::json!([1]));
    }

    #[test]
    fn test_unknown_concept_is_reported() {
        let dir = make_test_directory();
        let store = load_store(dir.path()).unwrap();
        let engine = CohortQueryEngine::new(Arc::new(store), QueryConfig::default());
        let request =
            QueryRequest::from_json(r#"{ "type": "text_obs", "concept_id": 1, "value": "x" }"#)
                .unwrap();

        let err = run_query(&engine, &request).unwrap_err();
        assert!(matches!(err, CliError::Query(ServiceError::NotFound { .. })));
    }

    #[test]
    fn test_missing_directory() {
        let err = load_store(Path::new("/nonexistent/medrec")).unwrap_err();
        assert!(matches!(err, CliError::Store(StoreError::DirectoryNotFound { .. })));
    }
}
