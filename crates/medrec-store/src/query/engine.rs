//! The cohort query engine.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use medrec_types::{
    ConceptId, DrugId, DrugOrder, Encounter, EncounterTypeId, LocationId, Observation, Patient,
    PatientCharacteristics, PatientId, PatientProgram, PatientSet, PatientState, ProgramId,
    TimeModifier, WorkflowId,
};

use super::definition::{
    day_bounds, CharacteristicFilter, CohortDefinition, DrugOrderCriterion, NumericObsCriterion,
    TextObsCriterion,
};
use super::numeric::{group_values, matching_patients};
use crate::repository::ClinicalRepository;
use crate::session::WorkingSet;
use crate::types::{EntityKind, QueryConfig, ServiceError, ServiceResult};

/// Evaluates cohort criteria against a [`ClinicalRepository`] and enriches
/// patient sets with related clinical data.
///
/// Every operation is read-only against the repository and returns a fresh
/// result, so one engine can serve concurrent callers.
///
/// # Example
///
/// ```ignore
/// let engine = CohortQueryEngine::new(Arc::new(store), QueryConfig::default());
/// let women = engine.patients_by_characteristics(&CharacteristicFilter {
///     gender: Some("F".into()),
///     ..Default::default()
/// })?;
/// let weights = engine.observations(&women, 5089, None, None)?;
/// ```
pub struct CohortQueryEngine<R> {
    repo: Arc<R>,
    config: QueryConfig,
}

impl<R> Clone for CohortQueryEngine<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            config: self.config.clone(),
        }
    }
}

impl<R: ClinicalRepository> CohortQueryEngine<R> {
    /// Creates an engine over a shared repository.
    pub fn new(repo: Arc<R>, config: QueryConfig) -> Self {
        Self { repo, config }
    }

    /// The repository queried by this engine.
    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// The engine configuration.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Cohort criteria
    // ═══════════════════════════════════════════════════════════════════════════

    /// Every non-voided patient.
    pub fn all_patients(&self) -> ServiceResult<PatientSet> {
        let patients = self.repo.patients()?;
        Ok(patients.iter().map(|p| p.patient_id).collect())
    }

    /// Patients satisfying every demographic constraint of `filter`.
    ///
    /// # Errors
    /// `InvalidArgument` when the filter is contradictory.
    pub fn patients_by_characteristics(
        &self,
        filter: &CharacteristicFilter,
    ) -> ServiceResult<PatientSet> {
        filter.validate()?;
        let today = self.config.today();
        let result: PatientSet = self
            .repo
            .patients()?
            .iter()
            .filter(|p| filter.matches(p, today))
            .map(|p| p.patient_id)
            .collect();
        tracing::debug!(?filter, matched = result.len(), "characteristics query");
        Ok(result)
    }

    /// Patients whose numeric observations of a concept satisfy the
    /// criterion.
    ///
    /// # Errors
    /// `NotFound` for an unknown concept, `InvalidArgument` when the window
    /// ends before it starts.
    pub fn patients_having_numeric_obs(
        &self,
        criterion: &NumericObsCriterion,
    ) -> ServiceResult<PatientSet> {
        let (from, to) = day_bounds(criterion.from_date, criterion.to_date)?;
        self.require_concept(criterion.concept_id)?;

        let observations = self.repo.observations(criterion.concept_id, from, to)?;
        let groups = group_values(&observations);
        let matched = matching_patients(
            groups,
            criterion.time_modifier,
            criterion.comparison,
            self.config.parallel_threshold,
        );

        let result = if criterion.time_modifier == TimeModifier::No {
            self.all_patients()?.difference(&matched)
        } else {
            matched
        };
        tracing::debug!(
            concept_id = criterion.concept_id,
            modifier = %criterion.time_modifier,
            observations = observations.len(),
            matched = result.len(),
            "numeric observation query"
        );
        Ok(result)
    }

    /// Patients with a text observation of the concept exactly equal to the
    /// value.
    pub fn patients_having_text_obs(
        &self,
        criterion: &TextObsCriterion,
    ) -> ServiceResult<PatientSet> {
        self.require_concept(criterion.concept_id)?;
        let result: PatientSet = self
            .repo
            .observations(criterion.concept_id, None, None)?
            .iter()
            .filter(|o| o.value_text.as_deref() == Some(criterion.value.as_str()))
            .map(|o| o.patient_id)
            .collect();
        tracing::debug!(
            concept_id = criterion.concept_id,
            matched = result.len(),
            "text observation query"
        );
        Ok(result)
    }

    /// Patients with an encounter at the location or registered there.
    pub fn patients_having_location(&self, location_id: LocationId) -> ServiceResult<PatientSet> {
        if self.repo.location(location_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::Location, location_id));
        }
        let result = self.repo.patients_at_location(location_id)?;
        tracing::debug!(location_id, matched = result.len(), "location query");
        Ok(result)
    }

    /// Patients by drug orders active on `on_date` (today when absent).
    ///
    /// - `drug_ids == None`: patients with no active drug order at all.
    /// - `drug_ids == Some(&[])`: patients with at least one active order.
    /// - otherwise: patients with an active order for one of the drugs.
    ///
    /// The result is restricted to `candidates` when given.
    ///
    /// # Errors
    /// `NotFound` for an unknown drug or for a candidate that is unknown or
    /// voided.
    pub fn patients_having_drug_order(
        &self,
        candidates: Option<&PatientSet>,
        drug_ids: Option<&[DrugId]>,
        on_date: Option<NaiveDate>,
    ) -> ServiceResult<PatientSet> {
        if let Some(ids) = drug_ids {
            for &id in ids {
                if self.repo.drug(id)?.is_none() {
                    return Err(ServiceError::not_found(EntityKind::Drug, id));
                }
            }
        }
        if let Some(set) = candidates {
            self.require_patients(set)?;
        }
        let date = on_date.unwrap_or_else(|| self.config.today());
        let orders = self.repo.drug_orders_active_on(date)?;

        let result = match drug_ids {
            None => {
                let treated: PatientSet = orders.iter().map(|o| o.patient_id).collect();
                let population = match candidates {
                    Some(set) => set.clone(),
                    None => self.all_patients()?,
                };
                population.difference(&treated)
            }
            Some(ids) => {
                let wanted: HashSet<DrugId> = ids.iter().copied().collect();
                let treated: PatientSet = orders
                    .iter()
                    .filter(|o| wanted.is_empty() || wanted.contains(&o.drug_id))
                    .map(|o| o.patient_id)
                    .collect();
                match candidates {
                    Some(set) => treated.intersection(set),
                    None => treated,
                }
            }
        };
        tracing::debug!(%date, drugs = ?drug_ids, matched = result.len(), "drug order query");
        Ok(result)
    }

    /// Evaluates a composite cohort definition.
    ///
    /// # Errors
    /// Any error of the leaf criteria; `InvalidArgument` for an
    /// intersection with no parts.
    pub fn evaluate(&self, definition: &CohortDefinition) -> ServiceResult<PatientSet> {
        match definition {
            CohortDefinition::All => self.all_patients(),
            CohortDefinition::Characteristics(filter) => self.patients_by_characteristics(filter),
            CohortDefinition::NumericObs(criterion) => self.patients_having_numeric_obs(criterion),
            CohortDefinition::TextObs(criterion) => self.patients_having_text_obs(criterion),
            CohortDefinition::Location { location_id } => {
                self.patients_having_location(*location_id)
            }
            CohortDefinition::DrugOrder(DrugOrderCriterion { drug_ids, on_date }) => {
                self.patients_having_drug_order(None, drug_ids.as_deref(), *on_date)
            }
            CohortDefinition::Patients { patient_ids } => {
                self.require_patients(patient_ids)?;
                Ok(patient_ids.clone())
            }
            CohortDefinition::Union { of } => {
                let parts = of
                    .iter()
                    .map(|part| self.evaluate(part))
                    .collect::<ServiceResult<Vec<_>>>()?;
                Ok(PatientSet::union_all(&parts))
            }
            CohortDefinition::Intersection { of } => {
                let parts = of
                    .iter()
                    .map(|part| self.evaluate(part))
                    .collect::<ServiceResult<Vec<_>>>()?;
                PatientSet::intersect_all(&parts)
                    .ok_or_else(|| ServiceError::invalid("intersection needs at least one part"))
            }
            CohortDefinition::Difference { base, minus } => {
                let base = self.evaluate(base)?;
                let minus = self.evaluate(minus)?;
                Ok(base.difference(&minus))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Enrichment
    // ═══════════════════════════════════════════════════════════════════════════

    /// Observations of a concept for each patient in the set, dated within
    /// the inclusive day range, in chronological order. Patients without a
    /// matching observation are absent from the map.
    ///
    /// # Errors
    /// `NotFound` for an unknown concept or an unknown or voided patient.
    pub fn observations(
        &self,
        patients: &PatientSet,
        concept_id: ConceptId,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> ServiceResult<BTreeMap<PatientId, Vec<Observation>>> {
        let (from, to) = day_bounds(from_date, to_date)?;
        self.require_concept(concept_id)?;
        self.require_patients(patients)?;

        let mut result: BTreeMap<PatientId, Vec<Observation>> = BTreeMap::new();
        for obs in self.repo.observations(concept_id, from, to)? {
            if patients.contains(obs.patient_id) {
                result.entry(obs.patient_id).or_default().push(obs);
            }
        }
        Ok(result)
    }

    /// The most recent encounter of the type for each patient in the set.
    pub fn encounters_by_type(
        &self,
        patients: &PatientSet,
        encounter_type_id: EncounterTypeId,
    ) -> ServiceResult<BTreeMap<PatientId, Encounter>> {
        let encounters = self.encounters_of(patients, encounter_type_id)?;
        let mut result = BTreeMap::new();
        // Chronological order: later encounters overwrite earlier ones.
        for encounter in encounters {
            result.insert(encounter.patient_id, encounter);
        }
        Ok(result)
    }

    /// The earliest encounter of the type for each patient in the set.
    pub fn first_encounters_by_type(
        &self,
        patients: &PatientSet,
        encounter_type_id: EncounterTypeId,
    ) -> ServiceResult<BTreeMap<PatientId, Encounter>> {
        let encounters = self.encounters_of(patients, encounter_type_id)?;
        let mut result = BTreeMap::new();
        for encounter in encounters {
            result.entry(encounter.patient_id).or_insert(encounter);
        }
        Ok(result)
    }

    fn encounters_of(
        &self,
        patients: &PatientSet,
        encounter_type_id: EncounterTypeId,
    ) -> ServiceResult<Vec<Encounter>> {
        if self.repo.encounter_type(encounter_type_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::EncounterType, encounter_type_id));
        }
        self.require_patients(patients)?;
        let mut encounters = self.repo.encounters_by_type(encounter_type_id)?;
        encounters.retain(|e| patients.contains(e.patient_id));
        Ok(encounters)
    }

    /// The state of the workflow each patient is in today.
    ///
    /// When a patient has several active enrollments, the state that started
    /// last wins.
    pub fn current_states(
        &self,
        patients: &PatientSet,
        workflow_id: WorkflowId,
    ) -> ServiceResult<BTreeMap<PatientId, PatientState>> {
        let workflow = self
            .repo
            .workflow(workflow_id)?
            .ok_or(ServiceError::not_found(EntityKind::Workflow, workflow_id))?;
        self.require_patients(patients)?;
        let today = self.config.today();

        let mut result: BTreeMap<PatientId, PatientState> = BTreeMap::new();
        for enrollment in self.repo.patient_programs(workflow.program_id)? {
            if !patients.contains(enrollment.patient_id) || !enrollment.is_active_on(today) {
                continue;
            }
            let Some(state) = enrollment.state_on(&workflow, today) else {
                continue;
            };
            let newer = result
                .get(&enrollment.patient_id)
                .map_or(true, |current| {
                    (state.start_date, state.patient_state_id)
                        > (current.start_date, current.patient_state_id)
                });
            if newer {
                result.insert(enrollment.patient_id, state.clone());
            }
        }
        Ok(result)
    }

    /// The enrollment in the program each patient has today; the most
    /// recent one when several are active.
    pub fn current_patient_programs(
        &self,
        patients: &PatientSet,
        program_id: ProgramId,
    ) -> ServiceResult<BTreeMap<PatientId, PatientProgram>> {
        let today = self.config.today();
        let mut result: BTreeMap<PatientId, PatientProgram> = BTreeMap::new();
        for enrollment in self.enrollments_of(patients, program_id)? {
            if !enrollment.is_active_on(today) {
                continue;
            }
            // Enrollments are sorted by enrollment date, so later ones win.
            result.insert(enrollment.patient_id, enrollment);
        }
        Ok(result)
    }

    /// Every enrollment in the program, per patient, ordered by enrollment
    /// date.
    pub fn patient_programs(
        &self,
        patients: &PatientSet,
        program_id: ProgramId,
    ) -> ServiceResult<BTreeMap<PatientId, Vec<PatientProgram>>> {
        let mut result: BTreeMap<PatientId, Vec<PatientProgram>> = BTreeMap::new();
        for enrollment in self.enrollments_of(patients, program_id)? {
            result.entry(enrollment.patient_id).or_default().push(enrollment);
        }
        Ok(result)
    }

    fn enrollments_of(
        &self,
        patients: &PatientSet,
        program_id: ProgramId,
    ) -> ServiceResult<Vec<PatientProgram>> {
        if self.repo.program(program_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::Program, program_id));
        }
        self.require_patients(patients)?;
        let mut enrollments = self.repo.patient_programs(program_id)?;
        enrollments.retain(|e| patients.contains(e.patient_id));
        enrollments.sort_by_key(|e| (e.date_enrolled, e.patient_program_id));
        Ok(enrollments)
    }

    /// Drug orders active today for each patient, ordered by start date.
    ///
    /// With `drug_set`, only orders whose drug concept belongs to that
    /// concept set (nested sets included) are returned.
    pub fn current_drug_orders(
        &self,
        patients: &PatientSet,
        drug_set: Option<ConceptId>,
    ) -> ServiceResult<BTreeMap<PatientId, Vec<DrugOrder>>> {
        let concepts: Option<HashSet<ConceptId>> = match drug_set {
            Some(set_id) => {
                self.require_concept(set_id)?;
                Some(self.repo.explode_concept_set(set_id)?.into_iter().collect())
            }
            None => None,
        };
        self.require_patients(patients)?;

        let mut orders = self.repo.drug_orders_active_on(self.config.today())?;
        orders.retain(|o| {
            patients.contains(o.patient_id)
                && concepts.as_ref().map_or(true, |c| c.contains(&o.concept_id))
        });
        orders.sort_by_key(|o| (o.patient_id, o.start_date, o.order_id));

        let mut result: BTreeMap<PatientId, Vec<DrugOrder>> = BTreeMap::new();
        for order in orders {
            result.entry(order.patient_id).or_default().push(order);
        }
        Ok(result)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Patient lookups
    // ═══════════════════════════════════════════════════════════════════════════

    /// The patients of the set, in id order.
    ///
    /// # Errors
    /// `NotFound` for the first id that is unknown or voided.
    pub fn patients(&self, ids: &PatientSet) -> ServiceResult<Vec<Patient>> {
        let mut found: BTreeMap<PatientId, Patient> = self
            .repo
            .patients()?
            .into_iter()
            .filter(|p| ids.contains(p.patient_id))
            .map(|p| (p.patient_id, p))
            .collect();
        ids.iter()
            .map(|id| {
                found
                    .remove(&id)
                    .ok_or(ServiceError::not_found(EntityKind::Patient, id))
            })
            .collect()
    }

    /// One-line summaries such as "Male, 34 years old".
    pub fn short_patient_descriptions(
        &self,
        ids: &PatientSet,
    ) -> ServiceResult<BTreeMap<PatientId, String>> {
        let today = self.config.today();
        Ok(self
            .patients(ids)?
            .into_iter()
            .map(|p| (p.patient_id, describe(&p, today)))
            .collect())
    }

    /// Typed demographic attributes of each patient.
    pub fn characteristics(
        &self,
        ids: &PatientSet,
    ) -> ServiceResult<BTreeMap<PatientId, PatientCharacteristics>> {
        let today = self.config.today();
        Ok(self
            .patients(ids)?
            .into_iter()
            .map(|p| (p.patient_id, PatientCharacteristics::of(&p, today)))
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Working sets
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replaces the working set. Fails without touching it if any patient
    /// is unknown.
    pub fn set_working_set(&self, working_set: &WorkingSet, set: PatientSet) -> ServiceResult<()> {
        self.require_patients(&set)?;
        working_set.replace(set);
        Ok(())
    }

    /// A snapshot of the working set.
    pub fn working_set(&self, working_set: &WorkingSet) -> PatientSet {
        working_set.snapshot()
    }

    /// Adds a patient to the working set.
    pub fn add_to_working_set(&self, working_set: &WorkingSet, id: PatientId) -> ServiceResult<()> {
        self.require_patient(id)?;
        working_set.insert(id);
        Ok(())
    }

    /// Removes a patient from the working set.
    pub fn remove_from_working_set(
        &self,
        working_set: &WorkingSet,
        id: PatientId,
    ) -> ServiceResult<()> {
        self.require_patient(id)?;
        working_set.remove(id);
        Ok(())
    }

    /// Empties the working set.
    pub fn clear_working_set(&self, working_set: &WorkingSet) {
        working_set.clear();
    }

    fn require_patient(&self, id: PatientId) -> ServiceResult<()> {
        match self.repo.patient(id)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::not_found(EntityKind::Patient, id)),
        }
    }

    /// Fails on the first id of the set that is unknown or voided.
    fn require_patients(&self, ids: &PatientSet) -> ServiceResult<()> {
        let known = self.all_patients()?;
        match ids.iter().find(|&id| !known.contains(id)) {
            Some(unknown) => Err(ServiceError::not_found(EntityKind::Patient, unknown)),
            None => Ok(()),
        }
    }

    fn require_concept(&self, id: ConceptId) -> ServiceResult<()> {
        match self.repo.concept(id)? {
            Some(_) => Ok(()),
            None => Err(ServiceError::not_found(EntityKind::Concept, id)),
        }
    }
}

fn describe(patient: &Patient, today: NaiveDate) -> String {
    let gender = match patient.gender.as_deref() {
        Some(g) if g.eq_ignore_ascii_case("M") => "Male",
        Some(g) if g.eq_ignore_ascii_case("F") => "Female",
        _ => "Unknown gender",
    };
    match patient.age_on(today) {
        Some(1) => format!("{}, 1 year old", gender),
        Some(age) => format!("{}, {} years old", gender, age),
        None => format!("{}, age unknown", gender),
    }
}
