//! In-memory clinical data store.
//!
//! Holds every loaded entity, indexed for the lookups the cohort query
//! engine issues: observations by concept, encounters by type and by
//! location, drug orders by patient and enrollments by program.
//!
//! ```ignore
//! let files = discover_data_files("/data/site-a")?;
//! let mut store = ClinicalStore::new();
//! let stats = store.load_all(&files, &LoadConfig::default())?;
//! println!("{} patients", stats.patients);
//! ```
//!
//! Load order matters: concepts before numeric ranges, set members and
//! drugs; programs before workflows before workflow states; enrollments
//! before patient states.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Instant;

use medrec_types::{
    well_known, Concept, ConceptAnswer, ConceptClass, ConceptDatatype, ConceptId, ConceptNumeric,
    ConceptProposal, ConceptSetMember, Drug, DrugId, DrugOrder, Encounter, EncounterType,
    EncounterTypeId, Location, LocationId, Observation, Patient, PatientId, PatientProgram,
    PatientState, Program, ProgramId, ProgramWorkflow, ProgramWorkflowState, WorkflowId,
};

use crate::concept::{ConceptNumericRecord, ConceptRecord};
use crate::parser::TsvParser;
use crate::types::{DataFiles, EntityKind, LoadConfig, LoadStats, StoreError, StoreResult};

/// A concept as stored: either plain or carrying numeric ranges.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredConcept {
    /// A concept without numeric extension.
    Plain(Concept),
    /// A concept with numeric ranges.
    Numeric(ConceptNumeric),
}

impl StoredConcept {
    /// The underlying concept.
    pub fn concept(&self) -> &Concept {
        match self {
            Self::Plain(concept) => concept,
            Self::Numeric(numeric) => &numeric.concept,
        }
    }

    /// Mutable access to the underlying concept.
    pub fn concept_mut(&mut self) -> &mut Concept {
        match self {
            Self::Plain(concept) => concept,
            Self::Numeric(numeric) => &mut numeric.concept,
        }
    }

    /// The numeric extension, if any.
    pub fn as_numeric(&self) -> Option<&ConceptNumeric> {
        match self {
            Self::Plain(_) => None,
            Self::Numeric(numeric) => Some(numeric),
        }
    }

    /// Concept id.
    pub fn concept_id(&self) -> ConceptId {
        self.concept().concept_id
    }
}

impl From<Concept> for StoredConcept {
    fn from(concept: Concept) -> Self {
        Self::Plain(concept)
    }
}

impl From<ConceptNumeric> for StoredConcept {
    fn from(numeric: ConceptNumeric) -> Self {
        Self::Numeric(numeric)
    }
}

/// In-memory store for clinical data.
///
/// Voided rows kept by [`LoadConfig::include_voided`] stay in the store;
/// the [`ClinicalRepository`](crate::ClinicalRepository) view hides them.
pub struct ClinicalStore {
    /// Patients indexed by id.
    patients: BTreeMap<PatientId, Patient>,
    /// Locations indexed by id.
    locations: BTreeMap<LocationId, Location>,
    /// Encounter types indexed by id.
    encounter_types: BTreeMap<EncounterTypeId, EncounterType>,
    /// Encounters indexed by encounter type.
    encounters_by_type: HashMap<EncounterTypeId, Vec<Encounter>>,
    /// Encounters indexed by location (for location cohorts).
    encounters_by_location: HashMap<LocationId, Vec<Encounter>>,
    /// Concepts indexed by id.
    concepts: BTreeMap<ConceptId, StoredConcept>,
    /// Concept datatypes indexed by id.
    datatypes: BTreeMap<u32, ConceptDatatype>,
    /// Concept classes indexed by id.
    classes: BTreeMap<u32, ConceptClass>,
    /// Drugs indexed by id.
    drugs: BTreeMap<DrugId, Drug>,
    /// Observations indexed by concept.
    observations_by_concept: HashMap<ConceptId, Vec<Observation>>,
    /// Drug orders indexed by patient.
    drug_orders_by_patient: BTreeMap<PatientId, Vec<DrugOrder>>,
    /// Programs (with workflows and states) indexed by id.
    programs: BTreeMap<ProgramId, Program>,
    /// Owning program of each workflow.
    workflow_programs: HashMap<WorkflowId, ProgramId>,
    /// Enrollments indexed by program.
    patient_programs_by_program: HashMap<ProgramId, Vec<PatientProgram>>,
    /// Owning program of each enrollment.
    enrollment_programs: HashMap<u32, ProgramId>,
    /// Concept proposals indexed by id.
    proposals: BTreeMap<u32, ConceptProposal>,
}

impl Default for ClinicalStore {
    fn default() -> Self {
        Self {
            patients: BTreeMap::new(),
            locations: BTreeMap::new(),
            encounter_types: BTreeMap::new(),
            encounters_by_type: HashMap::new(),
            encounters_by_location: HashMap::new(),
            concepts: BTreeMap::new(),
            datatypes: well_known::datatypes().into_iter().map(|d| (d.id, d)).collect(),
            classes: well_known::classes().into_iter().map(|c| (c.id, c)).collect(),
            drugs: BTreeMap::new(),
            observations_by_concept: HashMap::new(),
            drug_orders_by_patient: BTreeMap::new(),
            programs: BTreeMap::new(),
            workflow_programs: HashMap::new(),
            patient_programs_by_program: HashMap::new(),
            enrollment_programs: HashMap::new(),
            proposals: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for ClinicalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicalStore")
            .field("patients", &self.patients.len())
            .field("locations", &self.locations.len())
            .field("encounter_types", &self.encounter_types.len())
            .field("encounters", &self.encounter_count())
            .field("concepts", &self.concepts.len())
            .field("drugs", &self.drugs.len())
            .field("observations", &self.observation_count())
            .field("drug_orders", &self.drug_order_count())
            .field("programs", &self.programs.len())
            .field("patient_programs", &self.patient_program_count())
            .field("proposals", &self.proposals.len())
            .finish()
    }
}

impl ClinicalStore {
    /// Creates a new empty store seeded with the standard datatypes and
    /// concept classes.
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Loading
    // ═══════════════════════════════════════════════════════════════════════════

    /// Loads every discovered data file, in dependency order.
    pub fn load_all(&mut self, files: &DataFiles, config: &LoadConfig) -> StoreResult<LoadStats> {
        let start = Instant::now();
        let mut stats = LoadStats::default();

        if let Some(path) = &files.locations {
            let count = self.load_locations(path, config)?;
            tracing::debug!(count, "loaded locations");
        }
        if let Some(path) = &files.encounter_types {
            let count = self.load_encounter_types(path, config)?;
            tracing::debug!(count, "loaded encounter types");
        }
        if let Some(path) = &files.patients {
            stats.patients = self.load_patients(path, config)?;
            tracing::info!(count = stats.patients, "loaded patients");
        }
        if let Some(path) = &files.concepts {
            stats.concepts = self.load_concepts(path, config)?;
            tracing::info!(count = stats.concepts, "loaded concepts");
        }
        if let Some(path) = &files.concept_numerics {
            let count = self.load_concept_numerics(path, config)?;
            tracing::debug!(count, "loaded numeric concept ranges");
        }
        if let Some(path) = &files.concept_sets {
            let count = self.load_concept_sets(path, config)?;
            tracing::debug!(count, "loaded concept set members");
        }
        if let Some(path) = &files.concept_answers {
            let count = self.load_concept_answers(path, config)?;
            tracing::debug!(count, "loaded concept answers");
        }
        if let Some(path) = &files.drugs {
            let count = self.load_drugs(path, config)?;
            tracing::debug!(count, "loaded drugs");
        }
        if let Some(path) = &files.encounters {
            stats.encounters = self.load_encounters(path, config)?;
            tracing::info!(count = stats.encounters, "loaded encounters");
        }
        if let Some(path) = &files.observations {
            stats.observations = self.load_observations(path, config)?;
            tracing::info!(count = stats.observations, "loaded observations");
        }
        if let Some(path) = &files.drug_orders {
            stats.drug_orders = self.load_drug_orders(path, config)?;
            tracing::info!(count = stats.drug_orders, "loaded drug orders");
        }
        if let Some(path) = &files.programs {
            let count = self.load_programs(path, config)?;
            tracing::debug!(count, "loaded programs");
        }
        if let Some(path) = &files.workflows {
            let count = self.load_workflows(path, config)?;
            tracing::debug!(count, "loaded workflows");
        }
        if let Some(path) = &files.workflow_states {
            let count = self.load_workflow_states(path, config)?;
            tracing::debug!(count, "loaded workflow states");
        }
        if let Some(path) = &files.patient_programs {
            stats.patient_programs = self.load_patient_programs(path, config)?;
            tracing::info!(count = stats.patient_programs, "loaded program enrollments");
        }
        if let Some(path) = &files.patient_states {
            let count = self.load_patient_states(path, config)?;
            tracing::debug!(count, "loaded patient states");
        }

        stats.load_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(elapsed_ms = stats.load_time_ms, "data directory loaded");
        Ok(stats)
    }

    /// Loads patients from a file.
    pub fn load_patients<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let patients = TsvParser::<_, Patient>::from_path(path, config.clone())?.parse_all()?;
        let count = patients.len();
        self.insert_patients(patients);
        Ok(count)
    }

    /// Loads locations from a file.
    pub fn load_locations<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let locations = TsvParser::<_, Location>::from_path(path, config.clone())?.parse_all()?;
        let count = locations.len();
        self.insert_locations(locations);
        Ok(count)
    }

    /// Loads encounter types from a file.
    pub fn load_encounter_types<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let types = TsvParser::<_, EncounterType>::from_path(path, config.clone())?.parse_all()?;
        let count = types.len();
        self.insert_encounter_types(types);
        Ok(count)
    }

    /// Loads encounters from a file, in batches.
    pub fn load_encounters<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        TsvParser::<_, Encounter>::from_path(path, config.clone())?.parse_batched(|batch| {
            self.insert_encounters(batch);
            Ok(())
        })
    }

    /// Loads concepts from a file.
    ///
    /// Each row contributes one name; the first name of a concept in a
    /// locale becomes its preferred name there. Returns the number of
    /// distinct concepts.
    pub fn load_concepts<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let before = self.concepts.len();
        let records = TsvParser::<_, ConceptRecord>::from_path(path, config.clone())?.parse_all()?;

        for record in records {
            if let Some(existing) = self.concepts.get_mut(&record.concept_id) {
                if record.name.is_empty() {
                    continue;
                }
                let concept = existing.concept_mut();
                let preferred = concept.preferred_name(&record.locale).is_none();
                concept.add_name(record.name, record.locale, preferred);
                continue;
            }

            let datatype = self.datatypes.get(&record.datatype_id).cloned().ok_or(
                StoreError::DanglingReference {
                    kind: EntityKind::ConceptDatatype,
                    id: record.datatype_id,
                },
            )?;
            let class = self.classes.get(&record.class_id).cloned().ok_or(
                StoreError::DanglingReference {
                    kind: EntityKind::ConceptClass,
                    id: record.class_id,
                },
            )?;

            let mut concept = Concept::new(record.concept_id);
            concept.datatype = datatype;
            concept.concept_class = class;
            concept.is_set = record.is_set;
            concept.retired = record.retired;
            if !record.name.is_empty() {
                concept.add_name(record.name, record.locale, true);
            }
            self.concepts.insert(concept.concept_id, StoredConcept::Plain(concept));
        }

        Ok(self.concepts.len() - before)
    }

    /// Loads numeric ranges, upgrading the referenced concepts to numeric
    /// concepts.
    pub fn load_concept_numerics<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let records =
            TsvParser::<_, ConceptNumericRecord>::from_path(path, config.clone())?.parse_all()?;
        let count = records.len();

        for record in records {
            let stored = self.concepts.get(&record.concept_id).ok_or(StoreError::DanglingReference {
                kind: EntityKind::Concept,
                id: record.concept_id,
            })?;

            let mut numeric = ConceptNumeric::from_concept(stored.concept());
            numeric.hi_absolute = record.hi_absolute;
            numeric.hi_critical = record.hi_critical;
            numeric.hi_normal = record.hi_normal;
            numeric.low_absolute = record.low_absolute;
            numeric.low_critical = record.low_critical;
            numeric.low_normal = record.low_normal;
            numeric.units = record.units;
            numeric.precise = record.precise;
            numeric.display_precision = record.display_precision;

            if let Err(e) = numeric.validate_ranges() {
                tracing::warn!(
                    concept_id = record.concept_id,
                    error = %e,
                    "numeric ranges out of order"
                );
            }

            self.concepts.insert(record.concept_id, StoredConcept::Numeric(numeric));
        }

        Ok(count)
    }

    /// Loads concept set members.
    pub fn load_concept_sets<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let members =
            TsvParser::<_, ConceptSetMember>::from_path(path, config.clone())?.parse_all()?;
        let count = members.len();
        for member in members {
            self.concept_entry(member.concept_id)?.concept_sets.push(member);
        }
        Ok(count)
    }

    /// Loads concept answers.
    pub fn load_concept_answers<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let answers = TsvParser::<_, ConceptAnswer>::from_path(path, config.clone())?.parse_all()?;
        let count = answers.len();
        for answer in answers {
            self.concept_entry(answer.concept_id)?.answers.push(answer);
        }
        Ok(count)
    }

    /// Loads drugs. Every drug must refer to a loaded concept.
    pub fn load_drugs<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let drugs = TsvParser::<_, Drug>::from_path(path, config.clone())?.parse_all()?;
        let count = drugs.len();
        for drug in drugs {
            if !self.concepts.contains_key(&drug.concept_id) {
                return Err(StoreError::DanglingReference {
                    kind: EntityKind::Concept,
                    id: drug.concept_id,
                });
            }
            self.drugs.insert(drug.drug_id, drug);
        }
        Ok(count)
    }

    /// Loads observations from a file, in batches.
    pub fn load_observations<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        TsvParser::<_, Observation>::from_path(path, config.clone())?.parse_batched(|batch| {
            self.insert_observations(batch);
            Ok(())
        })
    }

    /// Loads drug orders from a file, in batches.
    pub fn load_drug_orders<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        TsvParser::<_, DrugOrder>::from_path(path, config.clone())?.parse_batched(|batch| {
            self.insert_drug_orders(batch);
            Ok(())
        })
    }

    /// Loads programs.
    pub fn load_programs<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let programs = TsvParser::<_, Program>::from_path(path, config.clone())?.parse_all()?;
        let count = programs.len();
        self.insert_programs(programs);
        Ok(count)
    }

    /// Loads workflows into their programs.
    pub fn load_workflows<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let workflows =
            TsvParser::<_, ProgramWorkflow>::from_path(path, config.clone())?.parse_all()?;
        let count = workflows.len();
        for workflow in workflows {
            let program = self.programs.get_mut(&workflow.program_id).ok_or(
                StoreError::DanglingReference {
                    kind: EntityKind::Program,
                    id: workflow.program_id,
                },
            )?;
            self.workflow_programs.insert(workflow.workflow_id, program.program_id);
            program.workflows.push(workflow);
        }
        Ok(count)
    }

    /// Loads workflow states into their workflows.
    pub fn load_workflow_states<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let states =
            TsvParser::<_, ProgramWorkflowState>::from_path(path, config.clone())?.parse_all()?;
        let count = states.len();
        for state in states {
            let workflow = self
                .workflow_mut(state.workflow_id)
                .ok_or(StoreError::DanglingReference {
                    kind: EntityKind::Workflow,
                    id: state.workflow_id,
                })?;
            workflow.states.push(state);
        }
        Ok(count)
    }

    /// Loads program enrollments.
    pub fn load_patient_programs<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let enrollments =
            TsvParser::<_, PatientProgram>::from_path(path, config.clone())?.parse_all()?;
        let count = enrollments.len();
        for enrollment in &enrollments {
            if !self.programs.contains_key(&enrollment.program_id) {
                return Err(StoreError::DanglingReference {
                    kind: EntityKind::Program,
                    id: enrollment.program_id,
                });
            }
        }
        self.insert_patient_programs(enrollments);
        Ok(count)
    }

    /// Loads patient states into their enrollments.
    ///
    /// States of enrollments that were not loaded (voided ones, usually)
    /// are skipped.
    pub fn load_patient_states<P: AsRef<Path>>(
        &mut self,
        path: P,
        config: &LoadConfig,
    ) -> StoreResult<usize> {
        let states = TsvParser::<_, PatientState>::from_path(path, config.clone())?.parse_all()?;
        let mut count = 0;
        for state in states {
            match self.enrollment_mut(state.patient_program_id) {
                Some(enrollment) => {
                    enrollment.states.push(state);
                    count += 1;
                }
                None => {
                    tracing::trace!(
                        patient_program_id = state.patient_program_id,
                        "skipping state of unloaded enrollment"
                    );
                }
            }
        }
        Ok(count)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Direct insertion
    // ═══════════════════════════════════════════════════════════════════════════

    /// Inserts patients, replacing any with the same id.
    pub fn insert_patients(&mut self, patients: impl IntoIterator<Item = Patient>) {
        for patient in patients {
            self.patients.insert(patient.patient_id, patient);
        }
    }

    /// Inserts locations.
    pub fn insert_locations(&mut self, locations: impl IntoIterator<Item = Location>) {
        for location in locations {
            self.locations.insert(location.location_id, location);
        }
    }

    /// Inserts encounter types.
    pub fn insert_encounter_types(&mut self, types: impl IntoIterator<Item = EncounterType>) {
        for encounter_type in types {
            self.encounter_types
                .insert(encounter_type.encounter_type_id, encounter_type);
        }
    }

    /// Inserts encounters into both the type and the location index.
    pub fn insert_encounters(&mut self, encounters: impl IntoIterator<Item = Encounter>) {
        for encounter in encounters {
            if let Some(location_id) = encounter.location_id {
                self.encounters_by_location
                    .entry(location_id)
                    .or_default()
                    .push(encounter.clone());
            }
            self.encounters_by_type
                .entry(encounter.encounter_type_id)
                .or_default()
                .push(encounter);
        }
    }

    /// Inserts concepts (plain or numeric), replacing any with the same id.
    pub fn insert_concepts(&mut self, concepts: impl IntoIterator<Item = StoredConcept>) {
        for concept in concepts {
            self.concepts.insert(concept.concept_id(), concept);
        }
    }

    /// Inserts drugs.
    pub fn insert_drugs(&mut self, drugs: impl IntoIterator<Item = Drug>) {
        for drug in drugs {
            self.drugs.insert(drug.drug_id, drug);
        }
    }

    /// Inserts observations.
    pub fn insert_observations(&mut self, observations: impl IntoIterator<Item = Observation>) {
        for obs in observations {
            self.observations_by_concept
                .entry(obs.concept_id)
                .or_default()
                .push(obs);
        }
    }

    /// Inserts drug orders. A zero concept id is filled from the drug.
    pub fn insert_drug_orders(&mut self, orders: impl IntoIterator<Item = DrugOrder>) {
        for mut order in orders {
            if order.concept_id == 0 {
                if let Some(drug) = self.drugs.get(&order.drug_id) {
                    order.concept_id = drug.concept_id;
                }
            }
            self.drug_orders_by_patient
                .entry(order.patient_id)
                .or_default()
                .push(order);
        }
    }

    /// Inserts programs with their workflows.
    pub fn insert_programs(&mut self, programs: impl IntoIterator<Item = Program>) {
        for program in programs {
            for workflow in &program.workflows {
                self.workflow_programs
                    .insert(workflow.workflow_id, program.program_id);
            }
            self.programs.insert(program.program_id, program);
        }
    }

    /// Inserts program enrollments with their states.
    pub fn insert_patient_programs(
        &mut self,
        enrollments: impl IntoIterator<Item = PatientProgram>,
    ) {
        for enrollment in enrollments {
            self.enrollment_programs
                .insert(enrollment.patient_program_id, enrollment.program_id);
            self.patient_programs_by_program
                .entry(enrollment.program_id)
                .or_default()
                .push(enrollment);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns all patients, voided ones included, in id order.
    pub fn patients(&self) -> impl Iterator<Item = &Patient> {
        self.patients.values()
    }

    /// Gets a patient by id.
    pub fn get_patient(&self, id: PatientId) -> Option<&Patient> {
        self.patients.get(&id)
    }

    /// Gets a location by id.
    pub fn get_location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(&id)
    }

    /// Gets an encounter type by id.
    pub fn get_encounter_type(&self, id: EncounterTypeId) -> Option<&EncounterType> {
        self.encounter_types.get(&id)
    }

    /// Encounters of a type, in load order.
    pub fn encounters_of_type(&self, id: EncounterTypeId) -> &[Encounter] {
        self.encounters_by_type.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Encounters at a location, in load order.
    pub fn encounters_at_location(&self, id: LocationId) -> &[Encounter] {
        self.encounters_by_location.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Gets a stored concept by id.
    pub fn get_stored_concept(&self, id: ConceptId) -> Option<&StoredConcept> {
        self.concepts.get(&id)
    }

    /// Gets a concept by id.
    pub fn get_concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(&id).map(StoredConcept::concept)
    }

    /// Gets a numeric concept by id.
    pub fn get_concept_numeric(&self, id: ConceptId) -> Option<&ConceptNumeric> {
        self.concepts.get(&id).and_then(StoredConcept::as_numeric)
    }

    /// Returns true if the concept exists.
    pub fn has_concept(&self, id: ConceptId) -> bool {
        self.concepts.contains_key(&id)
    }

    /// All concepts in id order.
    pub fn concepts(&self) -> impl DoubleEndedIterator<Item = &StoredConcept> {
        self.concepts.values()
    }

    /// Concepts with an id within the given bounds, in id order.
    pub fn concepts_in_id_range(
        &self,
        range: (std::ops::Bound<ConceptId>, std::ops::Bound<ConceptId>),
    ) -> impl DoubleEndedIterator<Item = &StoredConcept> {
        self.concepts.range(range).map(|(_, c)| c)
    }

    /// Gets a datatype by id.
    pub fn get_datatype(&self, id: u32) -> Option<&ConceptDatatype> {
        self.datatypes.get(&id)
    }

    /// All datatypes in id order.
    pub fn datatypes(&self) -> impl Iterator<Item = &ConceptDatatype> {
        self.datatypes.values()
    }

    /// Gets a concept class by id.
    pub fn get_class(&self, id: u32) -> Option<&ConceptClass> {
        self.classes.get(&id)
    }

    /// All concept classes in id order.
    pub fn classes(&self) -> impl Iterator<Item = &ConceptClass> {
        self.classes.values()
    }

    /// Gets a drug by id.
    pub fn get_drug(&self, id: DrugId) -> Option<&Drug> {
        self.drugs.get(&id)
    }

    /// All drugs in id order.
    pub fn drugs(&self) -> impl Iterator<Item = &Drug> {
        self.drugs.values()
    }

    /// Observations of a concept, in load order.
    pub fn observations_of(&self, concept_id: ConceptId) -> &[Observation] {
        self.observations_by_concept
            .get(&concept_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Every drug order, grouped by patient in id order.
    pub fn drug_orders(&self) -> impl Iterator<Item = &DrugOrder> {
        self.drug_orders_by_patient.values().flatten()
    }

    /// Drug orders of one patient.
    pub fn drug_orders_of(&self, patient_id: PatientId) -> &[DrugOrder] {
        self.drug_orders_by_patient
            .get(&patient_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Gets a program by id.
    pub fn get_program(&self, id: ProgramId) -> Option<&Program> {
        self.programs.get(&id)
    }

    /// Gets a workflow by id.
    pub fn get_workflow(&self, id: WorkflowId) -> Option<&ProgramWorkflow> {
        let program = self.programs.get(self.workflow_programs.get(&id)?)?;
        program.workflows.iter().find(|w| w.workflow_id == id)
    }

    /// Enrollments in a program, in load order.
    pub fn enrollments_in(&self, program_id: ProgramId) -> &[PatientProgram] {
        self.patient_programs_by_program
            .get(&program_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Gets a concept proposal by id.
    pub fn get_proposal(&self, id: u32) -> Option<&ConceptProposal> {
        self.proposals.get(&id)
    }

    /// All concept proposals in id order.
    pub fn proposals(&self) -> impl Iterator<Item = &ConceptProposal> {
        self.proposals.values()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Dictionary maintenance
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mutable access to a stored concept.
    pub fn get_stored_concept_mut(&mut self, id: ConceptId) -> Option<&mut StoredConcept> {
        self.concepts.get_mut(&id)
    }

    /// Removes a concept, returning it.
    pub fn remove_concept(&mut self, id: ConceptId) -> Option<StoredConcept> {
        self.concepts.remove(&id)
    }

    /// Inserts or replaces a concept proposal.
    pub fn insert_proposal(&mut self, proposal: ConceptProposal) {
        self.proposals.insert(proposal.id, proposal);
    }

    /// One more than the highest concept id in use.
    pub fn next_concept_id(&self) -> ConceptId {
        self.concepts.keys().next_back().map_or(1, |id| id + 1)
    }

    /// One more than the highest proposal id in use.
    pub fn next_proposal_id(&self) -> u32 {
        self.proposals.keys().next_back().map_or(1, |id| id + 1)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Statistics
    // ═══════════════════════════════════════════════════════════════════════════

    /// Returns the number of patients.
    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    /// Returns the number of concepts.
    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// Returns the number of encounters.
    pub fn encounter_count(&self) -> usize {
        self.encounters_by_type.values().map(Vec::len).sum()
    }

    /// Returns the number of observations.
    pub fn observation_count(&self) -> usize {
        self.observations_by_concept.values().map(Vec::len).sum()
    }

    /// Returns the number of drug orders.
    pub fn drug_order_count(&self) -> usize {
        self.drug_orders_by_patient.values().map(Vec::len).sum()
    }

    /// Returns the number of program enrollments.
    pub fn patient_program_count(&self) -> usize {
        self.patient_programs_by_program.values().map(Vec::len).sum()
    }

    fn concept_entry(&mut self, id: ConceptId) -> StoreResult<&mut Concept> {
        self.concepts
            .get_mut(&id)
            .map(StoredConcept::concept_mut)
            .ok_or(StoreError::DanglingReference {
                kind: EntityKind::Concept,
                id,
            })
    }

    fn workflow_mut(&mut self, id: WorkflowId) -> Option<&mut ProgramWorkflow> {
        let program_id = *self.workflow_programs.get(&id)?;
        self.programs
            .get_mut(&program_id)?
            .workflows
            .iter_mut()
            .find(|w| w.workflow_id == id)
    }

    fn enrollment_mut(&mut self, id: u32) -> Option<&mut PatientProgram> {
        let program_id = *self.enrollment_programs.get(&id)?;
        self.patient_programs_by_program
            .get_mut(&program_id)?
            .iter_mut()
            .find(|e| e.patient_program_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, lines: &[&str]) {
        fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
    }

    fn make_test_directory() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        write(p, "patients.tsv", &[
            concat!(
                "patientId\tgender\tbirthdate\tdead\tdeathDate\t",
                "givenName\tfamilyName\thealthCenter\tvoided"
            ),
            "1\tF\t1980-01-01\t0\t\tAchieng\tOtieno\t1\t0",
            "2\tM\t1990-06-15\t0\t\t\t\t\t0",
            "3\tM\t\t0\t\t\t\t\t1",
        ]);
        write(p, "locations.tsv", &["locationId\tname\tretired", "1\tMosoriot\t0"]);
        write(p, "encounter_types.tsv", &["encounterTypeId\tname\tretired", "1\tADULTINITIAL\t0"]);
        write(p, "encounters.tsv", &[
            "encounterId\tpatientId\tencounterTypeId\tlocationId\tencounterDatetime\tvoided",
            "10\t1\t1\t1\t2023-01-05 09:00:00\t0",
            "11\t2\t1\t\t2023-02-05\t0",
        ]);
        write(p, "concepts.tsv", &[
            "conceptId\tdatatypeId\tclassId\tisSet\tretired\tname\tlocale",
            "5089\t1\t1\t0\t0\tWEIGHT (KG)\ten",
            "5089\t1\t1\t0\t0\tPOIDS\tfr",
            "5089\t1\t1\t0\t0\tWT\ten",
            "1000\t4\t10\t1\t0\tVITALS\ten",
            "86663\t4\t3\t0\t0\tZIDOVUDINE\ten",
        ]);
        write(p, "concept_numerics.tsv", &[
            concat!(
                "conceptId\thiAbsolute\thiCritical\thiNormal\tlowAbsolute\tlowCritical\t",
                "lowNormal\tunits\tprecise\tdisplayPrecision"
            ),
            "5089\t250\t\t\t0\t\t\tkg\t1\t1",
        ]);
        write(p, "concept_sets.tsv", &["conceptSetId\tconceptId\tsortWeight", "1000\t5089\t1"]);
        write(
            p,
            "drugs.tsv",
            &["drugId\tconceptId\tname\tretired", "4\t86663\tZidovudine 300mg\t0"],
        );
        write(p, "observations.tsv", &[
            concat!(
                "obsId\tpatientId\tconceptId\tencounterId\tobsDatetime\t",
                "locationId\tvalueNumeric\tvalueText\tvalueCoded\tvoided"
            ),
            "100\t1\t5089\t10\t2023-01-05 09:10:00\t1\t61.5\t\t\t0",
            "101\t1\t5089\t\t2023-03-05\t\t63\t\t\t1",
        ]);
        write(p, "drug_orders.tsv", &[
            concat!(
                "orderId\tpatientId\tdrugId\tconceptId\tstartDate\t",
                "autoExpireDate\tdiscontinuedDate\tvoided"
            ),
            "200\t1\t4\t\t2023-01-05\t\t\t0",
        ]);
        write(p, "programs.tsv", &["programId\tconceptId\tname", "1\t1482\tHIV PROGRAM"]);
        write(p, "workflows.tsv", &["workflowId\tprogramId\tconceptId", "2\t1\t1484"]);
        write(p, "workflow_states.tsv", &[
            "stateId\tworkflowId\tconceptId\tinitial\tterminal",
            "7\t2\t1577\t1\t0",
        ]);
        write(p, "patient_programs.tsv", &[
            "patientProgramId\tpatientId\tprogramId\tdateEnrolled\tdateCompleted\tvoided",
            "30\t1\t1\t2023-01-05\t\t0",
            "31\t2\t1\t2023-01-05\t\t1",
        ]);
        write(p, "patient_states.tsv", &[
            "patientStateId\tpatientProgramId\tstateId\tstartDate\tendDate\tvoided",
            "40\t30\t7\t2023-01-05\t\t0",
            "41\t31\t7\t2023-01-05\t\t0",
        ]);
        dir
    }

    #[test]
    fn test_load_all() {
        let dir = make_test_directory();
        let files = crate::discover_data_files(dir.path()).unwrap();
        let mut store = ClinicalStore::new();
        let stats = store.load_all(&files, &LoadConfig::default()).unwrap();

        assert_eq!(stats.patients, 2);
        assert_eq!(stats.concepts, 3);
        assert_eq!(stats.observations, 1);
        assert_eq!(stats.encounters, 2);
        assert_eq!(stats.drug_orders, 1);
        assert_eq!(stats.patient_programs, 1);

        assert_eq!(store.encounters_at_location(1).len(), 1);
        assert_eq!(store.encounters_of_type(1).len(), 2);
        assert_eq!(store.drug_orders_of(1)[0].concept_id, 86663);
        assert_eq!(store.get_workflow(2).unwrap().states.len(), 1);
        assert_eq!(store.enrollments_in(1)[0].states.len(), 1);
    }

    #[test]
    fn test_load_concepts_names_and_numerics() {
        let dir = make_test_directory();
        let files = crate::discover_data_files(dir.path()).unwrap();
        let mut store = ClinicalStore::new();
        store.load_all(&files, &LoadConfig::default()).unwrap();

        let weight = store.get_concept_numeric(5089).unwrap();
        assert!(weight.is_numeric());
        assert_eq!(weight.hi_absolute, Some(250.0));
        assert_eq!(weight.units, "kg");
        assert_eq!(weight.concept.names.len(), 3);
        assert_eq!(weight.concept.preferred_name("en"), Some("WEIGHT (KG)"));
        assert_eq!(weight.concept.preferred_name("fr"), Some("POIDS"));
        assert!(weight.concept.names.iter().all(|n| n.concept_id == 5089));

        let vitals = store.get_concept(1000).unwrap();
        assert!(vitals.is_set);
        assert_eq!(vitals.concept_sets[0].member_id, 5089);
        assert!(store.get_concept_numeric(1000).is_none());
    }

    #[test]
    fn test_load_keeps_voided_when_configured() {
        let dir = make_test_directory();
        let files = crate::discover_data_files(dir.path()).unwrap();
        let mut store = ClinicalStore::new();
        let config = LoadConfig {
            include_voided: true,
            ..Default::default()
        };
        let stats = store.load_all(&files, &config).unwrap();

        assert_eq!(stats.patients, 3);
        assert_eq!(stats.observations, 2);
        assert_eq!(store.enrollments_in(1).len(), 2);
    }

    #[test]
    fn test_dangling_drug_concept() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "drugs.tsv", &["drugId\tconceptId\tname\tretired", "4\t999\tX\t0"]);

        let mut store = ClinicalStore::new();
        let err = store
            .load_drugs(dir.path().join("drugs.tsv"), &LoadConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DanglingReference {
                kind: EntityKind::Concept,
                id: 999
            }
        ));
    }

    #[test]
    fn test_unknown_datatype() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "concepts.tsv", &[
            "conceptId\tdatatypeId\tclassId\tisSet\tretired\tname\tlocale",
            "1\t99\t1\t0\t0\tX\ten",
        ]);

        let mut store = ClinicalStore::new();
        let err = store
            .load_concepts(dir.path().join("concepts.tsv"), &LoadConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DanglingReference {
                kind: EntityKind::ConceptDatatype,
                ..
            }
        ));
    }

    #[test]
    fn test_next_ids() {
        let mut store = ClinicalStore::new();
        assert_eq!(store.next_concept_id(), 1);
        store.insert_concepts([StoredConcept::from(Concept::new(41))]);
        assert_eq!(store.next_concept_id(), 42);
        assert_eq!(store.next_proposal_id(), 1);
    }

    #[test]
    fn test_seeded_dictionary() {
        let store = ClinicalStore::new();
        assert!(store.get_datatype(well_known::DATATYPE_NUMERIC).unwrap().is_numeric());
        assert!(store.classes().count() > 0);
    }
}
