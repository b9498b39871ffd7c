//! Data-access seam between the query layer and storage.
//!
//! The cohort query engine only talks to a [`ClinicalRepository`]. Every
//! method returns owned values and a [`StoreResult`], so a backend that can
//! fail (a database, a remote service) fits the same trait as the
//! in-memory [`ClinicalStore`].
//!
//! Results never contain voided records, nor records belonging to a voided
//! or unknown patient.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::RwLock;

use medrec_types::{
    Concept, ConceptId, ConceptSetMember, Drug, DrugId, DrugOrder, Encounter, EncounterType,
    EncounterTypeId, Location, LocationId, Observation, Patient, PatientId, PatientProgram,
    PatientSet, Program, ProgramId, ProgramWorkflow, WorkflowId,
};

use crate::store::ClinicalStore;
use crate::types::StoreResult;

/// Read access to clinical data, as needed by cohort queries.
pub trait ClinicalRepository: Send + Sync {
    /// All non-voided patients, in id order.
    fn patients(&self) -> StoreResult<Vec<Patient>>;

    /// A non-voided patient by id.
    fn patient(&self, id: PatientId) -> StoreResult<Option<Patient>>;

    /// A concept by id.
    fn concept(&self, id: ConceptId) -> StoreResult<Option<Concept>>;

    /// A drug by id.
    fn drug(&self, id: DrugId) -> StoreResult<Option<Drug>>;

    /// A location by id.
    fn location(&self, id: LocationId) -> StoreResult<Option<Location>>;

    /// An encounter type by id.
    fn encounter_type(&self, id: EncounterTypeId) -> StoreResult<Option<EncounterType>>;

    /// A program by id, with its workflows and states.
    fn program(&self, id: ProgramId) -> StoreResult<Option<Program>>;

    /// A workflow by id, with its states.
    fn workflow(&self, id: WorkflowId) -> StoreResult<Option<ProgramWorkflow>>;

    /// Direct members of a concept set, ordered by sort weight.
    fn concept_set_members(&self, set_id: ConceptId) -> StoreResult<Vec<ConceptSetMember>>;

    /// Observations of a concept dated within `[from, to]` (unbounded
    /// where absent), ordered by datetime then id.
    fn observations(
        &self,
        concept_id: ConceptId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> StoreResult<Vec<Observation>>;

    /// Encounters of a type, ordered by datetime then id.
    fn encounters_by_type(&self, encounter_type_id: EncounterTypeId) -> StoreResult<Vec<Encounter>>;

    /// Patients with an encounter at the location or registered at it as
    /// their health center.
    fn patients_at_location(&self, location_id: LocationId) -> StoreResult<PatientSet>;

    /// Drug orders active on `date`, ordered by patient then start date.
    fn drug_orders_active_on(&self, date: NaiveDate) -> StoreResult<Vec<DrugOrder>>;

    /// Enrollments in a program, with voided states removed.
    fn patient_programs(&self, program_id: ProgramId) -> StoreResult<Vec<PatientProgram>>;

    /// The leaf concepts of a concept set, expanding nested sets.
    ///
    /// Members come back in sort-weight order, depth first, each at most
    /// once. A set that contains itself (directly or through other sets)
    /// is expanded only once.
    fn explode_concept_set(&self, set_id: ConceptId) -> StoreResult<Vec<ConceptId>> {
        let mut seen_sets = HashSet::from([set_id]);
        let mut seen_leaves = HashSet::new();
        let mut leaves = Vec::new();
        explode_into(self, set_id, &mut seen_sets, &mut seen_leaves, &mut leaves)?;
        Ok(leaves)
    }
}

fn explode_into<R: ClinicalRepository + ?Sized>(
    repo: &R,
    set_id: ConceptId,
    seen_sets: &mut HashSet<ConceptId>,
    seen_leaves: &mut HashSet<ConceptId>,
    leaves: &mut Vec<ConceptId>,
) -> StoreResult<()> {
    for member in repo.concept_set_members(set_id)? {
        let id = member.member_id;
        let is_set = repo.concept(id)?.is_some_and(|c| c.is_set);
        if is_set {
            if seen_sets.insert(id) {
                explode_into(repo, id, seen_sets, seen_leaves, leaves)?;
            }
        } else if seen_leaves.insert(id) {
            leaves.push(id);
        }
    }
    Ok(())
}

impl ClinicalStore {
    fn is_visible_patient(&self, id: PatientId) -> bool {
        self.get_patient(id).is_some_and(|p| !p.voided)
    }
}

impl ClinicalRepository for ClinicalStore {
    fn patients(&self) -> StoreResult<Vec<Patient>> {
        Ok(ClinicalStore::patients(self).filter(|p| !p.voided).cloned().collect())
    }

    fn patient(&self, id: PatientId) -> StoreResult<Option<Patient>> {
        Ok(self.get_patient(id).filter(|p| !p.voided).cloned())
    }

    fn concept(&self, id: ConceptId) -> StoreResult<Option<Concept>> {
        Ok(self.get_concept(id).cloned())
    }

    fn drug(&self, id: DrugId) -> StoreResult<Option<Drug>> {
        Ok(self.get_drug(id).cloned())
    }

    fn location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        Ok(self.get_location(id).cloned())
    }

    fn encounter_type(&self, id: EncounterTypeId) -> StoreResult<Option<EncounterType>> {
        Ok(self.get_encounter_type(id).cloned())
    }

    fn program(&self, id: ProgramId) -> StoreResult<Option<Program>> {
        Ok(self.get_program(id).cloned())
    }

    fn workflow(&self, id: WorkflowId) -> StoreResult<Option<ProgramWorkflow>> {
        Ok(self.get_workflow(id).cloned())
    }

    fn concept_set_members(&self, set_id: ConceptId) -> StoreResult<Vec<ConceptSetMember>> {
        let mut members = self
            .get_concept(set_id)
            .map(|c| c.concept_sets.clone())
            .unwrap_or_default();
        members.sort_by(|a, b| {
            a.sort_weight
                .total_cmp(&b.sort_weight)
                .then(a.member_id.cmp(&b.member_id))
        });
        Ok(members)
    }

    fn observations(
        &self,
        concept_id: ConceptId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> StoreResult<Vec<Observation>> {
        let mut observations: Vec<Observation> = self
            .observations_of(concept_id)
            .iter()
            .filter(|o| !o.voided && o.is_within(from, to) && self.is_visible_patient(o.patient_id))
            .cloned()
            .collect();
        observations.sort_by_key(|o| (o.obs_datetime, o.obs_id));
        Ok(observations)
    }

    fn encounters_by_type(
        &self,
        encounter_type_id: EncounterTypeId,
    ) -> StoreResult<Vec<Encounter>> {
        let mut encounters: Vec<Encounter> = self
            .encounters_of_type(encounter_type_id)
            .iter()
            .filter(|e| !e.voided && self.is_visible_patient(e.patient_id))
            .cloned()
            .collect();
        encounters.sort_by_key(|e| (e.encounter_datetime, e.encounter_id));
        Ok(encounters)
    }

    fn patients_at_location(&self, location_id: LocationId) -> StoreResult<PatientSet> {
        let mut patients: PatientSet = self
            .encounters_at_location(location_id)
            .iter()
            .filter(|e| !e.voided && self.is_visible_patient(e.patient_id))
            .map(|e| e.patient_id)
            .collect();
        patients.extend(
            ClinicalStore::patients(self)
                .filter(|p| !p.voided && p.health_center == Some(location_id))
                .map(|p| p.patient_id),
        );
        Ok(patients)
    }

    fn drug_orders_active_on(&self, date: NaiveDate) -> StoreResult<Vec<DrugOrder>> {
        Ok(self
            .drug_orders()
            .filter(|o| o.is_active_on(date) && self.is_visible_patient(o.patient_id))
            .cloned()
            .collect())
    }

    fn patient_programs(&self, program_id: ProgramId) -> StoreResult<Vec<PatientProgram>> {
        Ok(self
            .enrollments_in(program_id)
            .iter()
            .filter(|e| !e.voided && self.is_visible_patient(e.patient_id))
            .map(|e| {
                let mut enrollment = e.clone();
                enrollment.states.retain(|s| !s.voided);
                enrollment
            })
            .collect())
    }
}

/// A repository behind a lock, for stores that are also written to.
impl<R: ClinicalRepository> ClinicalRepository for RwLock<R> {
    fn patients(&self) -> StoreResult<Vec<Patient>> {
        self.read().patients()
    }

    fn patient(&self, id: PatientId) -> StoreResult<Option<Patient>> {
        self.read().patient(id)
    }

    fn concept(&self, id: ConceptId) -> StoreResult<Option<Concept>> {
        self.read().concept(id)
    }

    fn drug(&self, id: DrugId) -> StoreResult<Option<Drug>> {
        self.read().drug(id)
    }

    fn location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        self.read().location(id)
    }

    fn encounter_type(&self, id: EncounterTypeId) -> StoreResult<Option<EncounterType>> {
        self.read().encounter_type(id)
    }

    fn program(&self, id: ProgramId) -> StoreResult<Option<Program>> {
        self.read().program(id)
    }

    fn workflow(&self, id: WorkflowId) -> StoreResult<Option<ProgramWorkflow>> {
        self.read().workflow(id)
    }

    fn concept_set_members(&self, set_id: ConceptId) -> StoreResult<Vec<ConceptSetMember>> {
        self.read().concept_set_members(set_id)
    }

    fn observations(
        &self,
        concept_id: ConceptId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> StoreResult<Vec<Observation>> {
        self.read().observations(concept_id, from, to)
    }

    fn encounters_by_type(
        &self,
        encounter_type_id: EncounterTypeId,
    ) -> StoreResult<Vec<Encounter>> {
        self.read().encounters_by_type(encounter_type_id)
    }

    fn patients_at_location(&self, location_id: LocationId) -> StoreResult<PatientSet> {
        self.read().patients_at_location(location_id)
    }

    fn drug_orders_active_on(&self, date: NaiveDate) -> StoreResult<Vec<DrugOrder>> {
        self.read().drug_orders_active_on(date)
    }

    fn patient_programs(&self, program_id: ProgramId) -> StoreResult<Vec<PatientProgram>> {
        self.read().patient_programs(program_id)
    }

    fn explode_concept_set(&self, set_id: ConceptId) -> StoreResult<Vec<ConceptId>> {
        self.read().explode_concept_set(set_id)
    }
}
