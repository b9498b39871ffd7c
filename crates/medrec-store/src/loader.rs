//! Data directory discovery.

use std::fs;
use std::path::Path;

use crate::types::{DataFiles, StoreError, StoreResult};

/// Discovers data files in a data directory.
///
/// Files are matched by exact name (`patients.tsv`, `observations.tsv`,
/// ...). Unknown files are ignored. Only `patients.tsv` is required.
pub fn discover_data_files<P: AsRef<Path>>(path: P) -> StoreResult<DataFiles> {
    let path = path.as_ref();

    if !path.is_dir() {
        return Err(StoreError::DirectoryNotFound {
            path: path.display().to_string(),
        });
    }

    let mut files = DataFiles::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let filename = entry.file_name();
        let slot = match filename.to_string_lossy().as_ref() {
            "patients.tsv" => &mut files.patients,
            "locations.tsv" => &mut files.locations,
            "encounter_types.tsv" => &mut files.encounter_types,
            "encounters.tsv" => &mut files.encounters,
            "concepts.tsv" => &mut files.concepts,
            "concept_numerics.tsv" => &mut files.concept_numerics,
            "concept_sets.tsv" => &mut files.concept_sets,
            "concept_answers.tsv" => &mut files.concept_answers,
            "drugs.tsv" => &mut files.drugs,
            "observations.tsv" => &mut files.observations,
            "drug_orders.tsv" => &mut files.drug_orders,
            "programs.tsv" => &mut files.programs,
            "workflows.tsv" => &mut files.workflows,
            "workflow_states.tsv" => &mut files.workflow_states,
            "patient_programs.tsv" => &mut files.patient_programs,
            "patient_states.tsv" => &mut files.patient_states,
            _ => continue,
        };
        *slot = Some(entry.path());
    }

    if !files.has_required_files() {
        let missing = files.missing_files();
        return Err(StoreError::RequiredFileMissing {
            file: missing.join(", "),
            directory: path.display().to_string(),
        });
    }

    tracing::debug!(
        directory = %path.display(),
        files = files.file_count(),
        "discovered data files"
    );

    Ok(files)
}
