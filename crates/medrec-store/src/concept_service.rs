//! Concept dictionary service.
//!
//! [`ConceptService`] maintains concepts, drugs and concept proposals in a
//! [`ClinicalStore`] shared with the query engine, and answers dictionary
//! lookups and searches.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use medrec_types::{
    well_known, Concept, ConceptClass, ConceptDatatype, ConceptId, ConceptNumeric,
    ConceptProposal, ConceptSetMember, ConceptWord, Drug, DrugId, ProposalState,
};

use crate::repository::ClinicalRepository;
use crate::store::{ClinicalStore, StoredConcept};
use crate::types::{EntityKind, ServiceError, ServiceResult};

/// Field concepts are sorted by in [`ConceptService::concepts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConceptSort {
    /// Concept id.
    #[default]
    Id,
    /// Display name in the default locale.
    Name,
    /// Concept class name.
    Class,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// Parameters of a concept word search.
///
/// Every word of `phrase` must be a prefix of some word of a concept name,
/// ignoring case and punctuation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptSearch {
    /// Search words.
    pub phrase: String,
    /// Only names in this locale; all locales when empty.
    pub locale: String,
    /// Include retired concepts.
    pub include_retired: bool,
    /// Only concepts of these classes (no restriction when empty).
    pub require_classes: Vec<u32>,
    /// Never concepts of these classes.
    pub exclude_classes: Vec<u32>,
}

impl ConceptSearch {
    /// A search for `phrase` in `locale`.
    pub fn new(phrase: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            locale: locale.into(),
            ..Default::default()
        }
    }
}

const DEFAULT_LOCALE: &str = "en";

/// Dictionary operations over a shared store.
#[derive(Debug, Clone)]
pub struct ConceptService {
    store: Arc<RwLock<ClinicalStore>>,
}

impl ConceptService {
    /// Creates a service over a shared store.
    pub fn new(store: Arc<RwLock<ClinicalStore>>) -> Self {
        Self { store }
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<RwLock<ClinicalStore>> {
        &self.store
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Concepts
    // ═══════════════════════════════════════════════════════════════════════════

    /// Adds a concept and returns its id. A zero id is replaced with the
    /// next available one.
    ///
    /// # Errors
    /// `InvalidArgument` if the id is taken or the datatype or class is
    /// unknown.
    pub fn create_concept(&self, concept: Concept) -> ServiceResult<ConceptId> {
        let mut store = self.store.write();
        let concept = prepare_new(&store, concept)?;
        let id = concept.concept_id;
        store.insert_concepts([StoredConcept::Plain(concept)]);
        tracing::info!(concept_id = id, "created concept");
        Ok(id)
    }

    /// Adds a numeric concept and returns its id.
    ///
    /// A concept without a datatype is given the numeric one.
    ///
    /// # Errors
    /// `InvalidArgument` if the ranges are out of order, the datatype is
    /// not numeric, or any check of [`create_concept`](Self::create_concept)
    /// fails.
    pub fn create_concept_numeric(&self, mut numeric: ConceptNumeric) -> ServiceResult<ConceptId> {
        validate_numeric(&numeric)?;
        let mut store = self.store.write();
        if numeric.concept.datatype.id == 0 {
            numeric.concept.datatype = numeric_datatype(&store)?;
        }
        numeric.concept = prepare_new(&store, numeric.concept)?;
        if !numeric.is_numeric() {
            return Err(ServiceError::invalid(format!(
                "numeric concept {} has datatype {}",
                numeric.concept_id(),
                numeric.concept.datatype.name
            )));
        }
        let id = numeric.concept_id();
        store.insert_concepts([StoredConcept::Numeric(numeric)]);
        tracing::info!(concept_id = id, "created numeric concept");
        Ok(id)
    }

    /// Gets a concept by id.
    pub fn concept(&self, id: ConceptId) -> ServiceResult<Concept> {
        self.store
            .read()
            .get_concept(id)
            .cloned()
            .ok_or(ServiceError::not_found(EntityKind::Concept, id))
    }

    /// Gets a numeric concept by id.
    ///
    /// # Errors
    /// `NotFound` if the concept does not exist or has no numeric ranges.
    pub fn concept_numeric(&self, id: ConceptId) -> ServiceResult<ConceptNumeric> {
        self.store
            .read()
            .get_concept_numeric(id)
            .cloned()
            .ok_or(ServiceError::not_found(EntityKind::ConceptNumeric, id))
    }

    /// All concepts, sorted.
    pub fn concepts(&self, sort: ConceptSort, direction: SortDirection) -> Vec<Concept> {
        let mut concepts: Vec<Concept> = self
            .store
            .read()
            .concepts()
            .map(|c| c.concept().clone())
            .collect();
        let by_id = |a: &Concept, b: &Concept| a.concept_id.cmp(&b.concept_id);
        concepts.sort_by(|a, b| {
            let primary = match sort {
                ConceptSort::Id => Ordering::Equal,
                ConceptSort::Name => a
                    .display_name(DEFAULT_LOCALE)
                    .cmp(&b.display_name(DEFAULT_LOCALE)),
                ConceptSort::Class => a.concept_class.name.cmp(&b.concept_class.name),
            };
            primary.then_with(|| by_id(a, b))
        });
        if direction == SortDirection::Desc {
            concepts.reverse();
        }
        concepts
    }

    /// Replaces a concept. Numeric ranges of a numeric concept are kept.
    pub fn update_concept(&self, concept: Concept) -> ServiceResult<()> {
        let mut store = self.store.write();
        let concept = resolve_references(&store, concept)?;
        let id = concept.concept_id;
        let stored = store
            .get_stored_concept_mut(id)
            .ok_or(ServiceError::not_found(EntityKind::Concept, id))?;
        *stored.concept_mut() = concept;
        tracing::debug!(concept_id = id, "updated concept");
        Ok(())
    }

    /// Replaces a concept with a numeric one, upgrading a plain concept.
    pub fn update_concept_numeric(&self, mut numeric: ConceptNumeric) -> ServiceResult<()> {
        validate_numeric(&numeric)?;
        let mut store = self.store.write();
        numeric.concept = resolve_references(&store, numeric.concept)?;
        let id = numeric.concept_id();
        let stored = store
            .get_stored_concept_mut(id)
            .ok_or(ServiceError::not_found(EntityKind::Concept, id))?;
        *stored = StoredConcept::Numeric(numeric);
        tracing::debug!(concept_id = id, "updated numeric concept");
        Ok(())
    }

    /// Removes a concept from the dictionary.
    ///
    /// # Errors
    /// `InvalidArgument` while observations still reference the concept;
    /// retire it with [`void_concept`](Self::void_concept) instead.
    pub fn delete_concept(&self, id: ConceptId) -> ServiceResult<Concept> {
        let mut store = self.store.write();
        if !store.has_concept(id) {
            return Err(ServiceError::not_found(EntityKind::Concept, id));
        }
        let in_use = store.observations_of(id).len();
        if in_use > 0 {
            return Err(ServiceError::invalid(format!(
                "concept {} is referenced by {} observations",
                id, in_use
            )));
        }
        let removed = store
            .remove_concept(id)
            .ok_or(ServiceError::not_found(EntityKind::Concept, id))?;
        tracing::info!(concept_id = id, "deleted concept");
        Ok(match removed {
            StoredConcept::Plain(concept) => concept,
            StoredConcept::Numeric(numeric) => numeric.concept,
        })
    }

    /// Retires a concept, hiding it from searches.
    pub fn void_concept(&self, id: ConceptId, reason: &str) -> ServiceResult<()> {
        let mut store = self.store.write();
        let stored = store
            .get_stored_concept_mut(id)
            .ok_or(ServiceError::not_found(EntityKind::Concept, id))?;
        let concept = stored.concept_mut();
        concept.retired = true;
        concept.retire_reason = Some(reason.to_string());
        tracing::info!(concept_id = id, reason, "retired concept");
        Ok(())
    }

    /// Concepts with a name equal to `name`, ignoring case, in id order.
    pub fn concepts_by_name(&self, name: &str) -> Vec<Concept> {
        self.store
            .read()
            .concepts()
            .map(StoredConcept::concept)
            .filter(|c| c.has_name(name))
            .cloned()
            .collect()
    }

    /// The first concept, by id, with a name equal to `name`.
    pub fn concept_by_name(&self, name: &str) -> Option<Concept> {
        self.store
            .read()
            .concepts()
            .map(StoredConcept::concept)
            .find(|c| c.has_name(name))
            .cloned()
    }

    /// The concept with the next lower id.
    pub fn prev_concept(&self, id: ConceptId) -> ServiceResult<Option<Concept>> {
        let store = self.store.read();
        if !store.has_concept(id) {
            return Err(ServiceError::not_found(EntityKind::Concept, id));
        }
        let found = store
            .concepts_in_id_range((Bound::Unbounded, Bound::Excluded(id)))
            .next_back()
            .map(|c| c.concept().clone());
        Ok(found)
    }

    /// The concept with the next higher id.
    pub fn next_concept(&self, id: ConceptId) -> ServiceResult<Option<Concept>> {
        let store = self.store.read();
        if !store.has_concept(id) {
            return Err(ServiceError::not_found(EntityKind::Concept, id));
        }
        let found = store
            .concepts_in_id_range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|c| c.concept().clone());
        Ok(found)
    }

    /// Concepts that list `answer_id` among their answers.
    pub fn questions_for_answer(&self, answer_id: ConceptId) -> ServiceResult<Vec<Concept>> {
        let store = self.store.read();
        if !store.has_concept(answer_id) {
            return Err(ServiceError::not_found(EntityKind::Concept, answer_id));
        }
        Ok(store
            .concepts()
            .map(StoredConcept::concept)
            .filter(|c| c.answers.iter().any(|a| a.answer_concept == answer_id))
            .cloned()
            .collect())
    }

    /// The next unused concept id.
    pub fn next_available_id(&self) -> ConceptId {
        self.store.read().next_concept_id()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Concept sets
    // ═══════════════════════════════════════════════════════════════════════════

    /// Direct members of a set, ordered by sort weight.
    pub fn concept_sets(&self, set_id: ConceptId) -> ServiceResult<Vec<ConceptSetMember>> {
        let store = self.store.read();
        if !store.has_concept(set_id) {
            return Err(ServiceError::not_found(EntityKind::Concept, set_id));
        }
        Ok(store.concept_set_members(set_id)?)
    }

    /// Every leaf concept of a set, nested sets expanded.
    pub fn concepts_in_set(&self, set_id: ConceptId) -> ServiceResult<Vec<Concept>> {
        let store = self.store.read();
        if !store.has_concept(set_id) {
            return Err(ServiceError::not_found(EntityKind::Concept, set_id));
        }
        Ok(store
            .explode_concept_set(set_id)?
            .into_iter()
            .filter_map(|id| store.get_concept(id).cloned())
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Search
    // ═══════════════════════════════════════════════════════════════════════════

    /// Concepts with a name matching the search, best match first.
    pub fn find_concepts(&self, search: &ConceptSearch) -> Vec<ConceptWord> {
        let store = self.store.read();
        let mut words = search_concepts(store.concepts().map(StoredConcept::concept), search);
        rank(&mut words);
        tracing::debug!(phrase = %search.phrase, matched = words.len(), "concept search");
        words
    }

    /// One page of [`find_concepts`](Self::find_concepts).
    pub fn find_concepts_paged(
        &self,
        search: &ConceptSearch,
        start: usize,
        size: usize,
    ) -> Vec<ConceptWord> {
        self.find_concepts(search)
            .into_iter()
            .skip(start)
            .take(size)
            .collect()
    }

    /// Permitted answers of a question matching the search.
    pub fn find_concept_answers(
        &self,
        question_id: ConceptId,
        search: &ConceptSearch,
    ) -> ServiceResult<Vec<ConceptWord>> {
        let store = self.store.read();
        let question = store
            .get_concept(question_id)
            .ok_or(ServiceError::not_found(EntityKind::Concept, question_id))?;
        let answers = question
            .answers
            .iter()
            .filter_map(|a| store.get_concept(a.answer_concept));
        let mut words = search_concepts(answers, search);
        rank(&mut words);
        Ok(words)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Drugs
    // ═══════════════════════════════════════════════════════════════════════════

    /// Adds a drug and returns its id. A zero id is replaced with the next
    /// available one.
    pub fn create_drug(&self, mut drug: Drug) -> ServiceResult<DrugId> {
        let mut store = self.store.write();
        if !store.has_concept(drug.concept_id) {
            return Err(ServiceError::not_found(EntityKind::Concept, drug.concept_id));
        }
        if drug.drug_id == 0 {
            drug.drug_id = store.drugs().map(|d| d.drug_id).max().map_or(1, |id| id + 1);
        } else if store.get_drug(drug.drug_id).is_some() {
            return Err(ServiceError::invalid(format!("drug {} already exists", drug.drug_id)));
        }
        let id = drug.drug_id;
        store.insert_drugs([drug]);
        tracing::info!(drug_id = id, "created drug");
        Ok(id)
    }

    /// Replaces a drug.
    pub fn update_drug(&self, drug: Drug) -> ServiceResult<()> {
        let mut store = self.store.write();
        if store.get_drug(drug.drug_id).is_none() {
            return Err(ServiceError::not_found(EntityKind::Drug, drug.drug_id));
        }
        if !store.has_concept(drug.concept_id) {
            return Err(ServiceError::not_found(EntityKind::Concept, drug.concept_id));
        }
        store.insert_drugs([drug]);
        Ok(())
    }

    /// Gets a drug by id.
    pub fn drug(&self, id: DrugId) -> ServiceResult<Drug> {
        self.store
            .read()
            .get_drug(id)
            .cloned()
            .ok_or(ServiceError::not_found(EntityKind::Drug, id))
    }

    /// Gets a drug by exact name, ignoring case.
    pub fn drug_by_name(&self, name: &str) -> Option<Drug> {
        self.store
            .read()
            .drugs()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// All drugs in id order.
    pub fn drugs(&self) -> Vec<Drug> {
        self.store.read().drugs().cloned().collect()
    }

    /// Drugs whose name contains `phrase`, ignoring case.
    pub fn find_drugs(&self, phrase: &str, include_retired: bool) -> Vec<Drug> {
        let phrase = phrase.to_lowercase();
        self.store
            .read()
            .drugs()
            .filter(|d| include_retired || !d.retired)
            .filter(|d| d.name.to_lowercase().contains(&phrase))
            .cloned()
            .collect()
    }

    /// Drugs made from a concept.
    pub fn drugs_for_concept(&self, concept_id: ConceptId) -> ServiceResult<Vec<Drug>> {
        let store = self.store.read();
        if !store.has_concept(concept_id) {
            return Err(ServiceError::not_found(EntityKind::Concept, concept_id));
        }
        Ok(store
            .drugs()
            .filter(|d| d.concept_id == concept_id)
            .cloned()
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Classes and datatypes
    // ═══════════════════════════════════════════════════════════════════════════

    /// All concept classes.
    pub fn concept_classes(&self) -> Vec<ConceptClass> {
        self.store.read().classes().cloned().collect()
    }

    /// Gets a concept class by id.
    pub fn concept_class(&self, id: u32) -> ServiceResult<ConceptClass> {
        self.store
            .read()
            .get_class(id)
            .cloned()
            .ok_or(ServiceError::not_found(EntityKind::ConceptClass, id))
    }

    /// Gets a concept class by name, ignoring case.
    pub fn concept_class_by_name(&self, name: &str) -> Option<ConceptClass> {
        self.store
            .read()
            .classes()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// All concept datatypes.
    pub fn concept_datatypes(&self) -> Vec<ConceptDatatype> {
        self.store.read().datatypes().cloned().collect()
    }

    /// Gets a concept datatype by id.
    pub fn concept_datatype(&self, id: u32) -> ServiceResult<ConceptDatatype> {
        self.store
            .read()
            .get_datatype(id)
            .cloned()
            .ok_or(ServiceError::not_found(EntityKind::ConceptDatatype, id))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Proposals
    // ═══════════════════════════════════════════════════════════════════════════

    /// Records a proposal and returns its id.
    pub fn propose_concept(&self, mut proposal: ConceptProposal) -> ServiceResult<u32> {
        if proposal.original_text.trim().is_empty() {
            return Err(ServiceError::invalid("proposal text is empty"));
        }
        let mut store = self.store.write();
        if let Some(question) = proposal.obs_concept_id {
            if !store.has_concept(question) {
                return Err(ServiceError::not_found(EntityKind::Concept, question));
            }
        }
        if proposal.id == 0 {
            proposal.id = store.next_proposal_id();
        }
        let id = proposal.id;
        store.insert_proposal(proposal);
        tracing::info!(proposal_id = id, "recorded concept proposal");
        Ok(id)
    }

    /// Gets a proposal by id.
    pub fn concept_proposal(&self, id: u32) -> ServiceResult<ConceptProposal> {
        self.store
            .read()
            .get_proposal(id)
            .cloned()
            .ok_or(ServiceError::not_found(EntityKind::ConceptProposal, id))
    }

    /// Proposals in id order; reviewed ones only when asked.
    pub fn concept_proposals(&self, include_completed: bool) -> Vec<ConceptProposal> {
        self.store
            .read()
            .proposals()
            .filter(|p| include_completed || !p.is_completed())
            .cloned()
            .collect()
    }

    /// Unreviewed proposals with the same text, ignoring case.
    pub fn find_matching_concept_proposals(&self, text: &str) -> Vec<ConceptProposal> {
        let text = text.trim();
        self.store
            .read()
            .proposals()
            .filter(|p| !p.is_completed() && p.original_text.trim().eq_ignore_ascii_case(text))
            .cloned()
            .collect()
    }

    /// Concepts that proposals with this text were mapped to.
    pub fn find_proposed_concepts(&self, text: &str) -> Vec<Concept> {
        let text = text.trim();
        let store = self.store.read();
        let mut seen = HashSet::new();
        store
            .proposals()
            .filter(|p| matches!(p.state, ProposalState::Synonym | ProposalState::Concept))
            .filter(|p| p.original_text.trim().eq_ignore_ascii_case(text))
            .filter_map(|p| p.mapped_concept_id)
            .filter(|id| seen.insert(*id))
            .filter_map(|id| store.get_concept(id).cloned())
            .collect()
    }
}

fn validate_numeric(numeric: &ConceptNumeric) -> ServiceResult<()> {
    numeric
        .validate_ranges()
        .map_err(|e| ServiceError::invalid(format!("concept {}: {}", numeric.concept_id(), e)))
}

fn numeric_datatype(store: &ClinicalStore) -> ServiceResult<ConceptDatatype> {
    store
        .get_datatype(well_known::DATATYPE_NUMERIC)
        .cloned()
        .ok_or(ServiceError::not_found(
            EntityKind::ConceptDatatype,
            well_known::DATATYPE_NUMERIC,
        ))
}

/// Assigns an id to a new concept and resolves its datatype and class.
fn prepare_new(store: &ClinicalStore, mut concept: Concept) -> ServiceResult<Concept> {
    if concept.concept_id == 0 {
        let id = store.next_concept_id();
        let children = concept.children_for(id);
        concept.concept_id = id;
        concept.names = children.names;
        concept.answers = children.answers;
        concept.concept_sets = children.concept_sets;
        concept.descriptions = children.descriptions;
        concept.concept_mappings = children.concept_mappings;
    } else if store.has_concept(concept.concept_id) {
        return Err(ServiceError::invalid(format!(
            "concept {} already exists",
            concept.concept_id
        )));
    }
    resolve_references(store, concept)
}

/// Replaces datatype and class with the stored entries of the same id.
fn resolve_references(store: &ClinicalStore, mut concept: Concept) -> ServiceResult<Concept> {
    if concept.datatype.id != 0 {
        concept.datatype = store
            .get_datatype(concept.datatype.id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::invalid(format!("unknown datatype {}", concept.datatype.id))
            })?;
    }
    if concept.concept_class.id != 0 {
        concept.concept_class = store
            .get_class(concept.concept_class.id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::invalid(format!("unknown concept class {}", concept.concept_class.id))
            })?;
    }
    Ok(concept)
}

/// Upper-cased alphanumeric words of a text.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Best-matching name of each concept that passes the search filters.
fn search_concepts<'a>(
    concepts: impl Iterator<Item = &'a Concept>,
    search: &ConceptSearch,
) -> Vec<ConceptWord> {
    let query = words(&search.phrase);
    if query.is_empty() {
        return Vec::new();
    }

    let mut results = Vec::new();
    for concept in concepts {
        if concept.retired && !search.include_retired {
            continue;
        }
        let class = concept.concept_class.id;
        if !search.require_classes.is_empty() && !search.require_classes.contains(&class) {
            continue;
        }
        if search.exclude_classes.contains(&class) {
            continue;
        }

        let best = concept
            .names
            .iter()
            .filter(|n| search.locale.is_empty() || n.locale == search.locale)
            .filter_map(|n| {
                let name_words = words(&n.name);
                let all_found = query
                    .iter()
                    .all(|q| name_words.iter().any(|w| w.starts_with(q.as_str())));
                if !all_found {
                    return None;
                }
                let weight = name_words
                    .iter()
                    .filter(|w| query.iter().any(|q| w.starts_with(q.as_str())))
                    .count();
                Some((weight, name_words.len(), n))
            })
            // More words covered first, then shorter names.
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        if let Some((weight, _, name)) = best {
            results.push(ConceptWord {
                concept_id: concept.concept_id,
                name: name.name.clone(),
                locale: name.locale.clone(),
                weight,
            });
        }
    }
    results
}

fn rank(words: &mut [ConceptWord]) {
    words.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then(a.name.len().cmp(&b.name.len()))
            .then(a.concept_id.cmp(&b.concept_id))
    });
}
