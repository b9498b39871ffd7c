//! Concept dictionary types.
//!
//! A `Concept` is a coded clinical term. It owns several child collections
//! (names, answers, set members, descriptions, mappings); each child records
//! the id of its owning concept. Children are copied into a new owner with
//! [`ConceptChild::cloned_for`], never shared between owners.

use chrono::NaiveDateTime;

use crate::{ConceptId, DrugId, EncounterId, UserId};

/// Datatype of the values recorded against a concept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptDatatype {
    /// Datatype id.
    pub id: u32,
    /// Display name, e.g. "Numeric".
    pub name: String,
    /// HL7 abbreviation, e.g. "NM".
    pub hl7_abbreviation: String,
}

impl ConceptDatatype {
    /// Returns true if this is the numeric datatype.
    pub fn is_numeric(&self) -> bool {
        self.name == crate::well_known::NUMERIC_NAME
    }

    /// Returns true if this is the coded datatype.
    pub fn is_coded(&self) -> bool {
        self.name == crate::well_known::CODED_NAME
    }

    /// Returns true if this is the free-text datatype.
    pub fn is_text(&self) -> bool {
        self.name == crate::well_known::TEXT_NAME
    }
}

/// Classification of a concept (Test, Drug, Diagnosis, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptClass {
    /// Class id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
}

/// An entry in one of a concept's child collections.
pub trait ConceptChild: Clone {
    /// Id of the concept that owns this entry.
    fn owner(&self) -> ConceptId;

    /// Returns a copy of this entry owned by `owner`.
    fn cloned_for(&self, owner: ConceptId) -> Self;
}

macro_rules! concept_child {
    ($ty:ty) => {
        impl ConceptChild for $ty {
            fn owner(&self) -> ConceptId {
                self.concept_id
            }

            fn cloned_for(&self, owner: ConceptId) -> Self {
                Self {
                    concept_id: owner,
                    ..self.clone()
                }
            }
        }
    };
}

/// A name of a concept in one locale.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptName {
    /// Owning concept.
    pub concept_id: ConceptId,
    /// The name text.
    pub name: String,
    /// Locale code, e.g. "en".
    pub locale: String,
    /// Whether this is the preferred name in its locale.
    pub preferred: bool,
}

/// A permitted answer to a question concept.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptAnswer {
    /// Owning (question) concept.
    pub concept_id: ConceptId,
    /// The answer concept.
    pub answer_concept: ConceptId,
    /// Optional drug the answer refers to.
    pub answer_drug: Option<DrugId>,
}

/// Membership of a concept in a concept set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptSetMember {
    /// Owning (set) concept.
    pub concept_id: ConceptId,
    /// The member concept.
    pub member_id: ConceptId,
    /// Position of the member within the set.
    pub sort_weight: f64,
}

/// A free-text description of a concept in one locale.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptDescription {
    /// Owning concept.
    pub concept_id: ConceptId,
    /// Description text.
    pub description: String,
    /// Locale code.
    pub locale: String,
}

/// A mapping of a concept to a code in an external terminology.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptMap {
    /// Owning concept.
    pub concept_id: ConceptId,
    /// Source terminology, e.g. "ICD-10".
    pub source: String,
    /// Code within the source terminology.
    pub source_code: String,
    /// Optional comment.
    pub comment: Option<String>,
}

concept_child!(ConceptName);
concept_child!(ConceptAnswer);
concept_child!(ConceptSetMember);
concept_child!(ConceptDescription);
concept_child!(ConceptMap);

/// A coded clinical term.
///
/// # Examples
///
/// ```
/// use medrec_types::Concept;
///
/// let mut concept = Concept::new(5089);
/// concept.add_name("WEIGHT (KG)", "en", true);
/// concept.add_set_member(5090, 1.0);
///
/// assert_eq!(concept.preferred_name("en"), Some("WEIGHT (KG)"));
/// assert_eq!(concept.concept_sets[0].concept_id, 5089);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Concept {
    /// Concept id.
    pub concept_id: ConceptId,
    /// Optional globally unique identifier.
    pub uuid: Option<String>,
    /// Datatype of values recorded against this concept.
    pub datatype: ConceptDatatype,
    /// Concept class.
    pub concept_class: ConceptClass,
    /// Whether this concept is a set of other concepts.
    pub is_set: bool,
    /// Retired concepts stay in the dictionary but are hidden from searches.
    pub retired: bool,
    /// Who retired the concept.
    pub retired_by: Option<UserId>,
    /// Why the concept was retired.
    pub retire_reason: Option<String>,
    /// Free-text version label.
    pub version: Option<String>,
    /// Creator.
    pub creator: Option<UserId>,
    /// Creation timestamp.
    pub date_created: Option<NaiveDateTime>,
    /// Last changer.
    pub changed_by: Option<UserId>,
    /// Last change timestamp.
    pub date_changed: Option<NaiveDateTime>,
    /// Names in all locales.
    pub names: Vec<ConceptName>,
    /// Permitted answers (for question concepts).
    pub answers: Vec<ConceptAnswer>,
    /// Members (for set concepts).
    pub concept_sets: Vec<ConceptSetMember>,
    /// Descriptions in all locales.
    pub descriptions: Vec<ConceptDescription>,
    /// External terminology mappings.
    pub concept_mappings: Vec<ConceptMap>,
}

impl Concept {
    /// Creates an empty concept with the given id.
    pub fn new(concept_id: ConceptId) -> Self {
        Self {
            concept_id,
            ..Default::default()
        }
    }

    /// Adds a name owned by this concept.
    pub fn add_name(
        &mut self,
        name: impl Into<String>,
        locale: impl Into<String>,
        preferred: bool,
    ) {
        self.names.push(ConceptName {
            concept_id: self.concept_id,
            name: name.into(),
            locale: locale.into(),
            preferred,
        });
    }

    /// Adds a permitted answer owned by this concept.
    pub fn add_answer(&mut self, answer_concept: ConceptId) {
        self.answers.push(ConceptAnswer {
            concept_id: self.concept_id,
            answer_concept,
            answer_drug: None,
        });
    }

    /// Adds a set member owned by this concept.
    pub fn add_set_member(&mut self, member_id: ConceptId, sort_weight: f64) {
        self.concept_sets.push(ConceptSetMember {
            concept_id: self.concept_id,
            member_id,
            sort_weight,
        });
    }

    /// Adds a description owned by this concept.
    pub fn add_description(&mut self, description: impl Into<String>, locale: impl Into<String>) {
        self.descriptions.push(ConceptDescription {
            concept_id: self.concept_id,
            description: description.into(),
            locale: locale.into(),
        });
    }

    /// Adds an external mapping owned by this concept.
    pub fn add_mapping(&mut self, source: impl Into<String>, source_code: impl Into<String>) {
        self.concept_mappings.push(ConceptMap {
            concept_id: self.concept_id,
            source: source.into(),
            source_code: source_code.into(),
            comment: None,
        });
    }

    /// Returns the best name for a locale: the preferred one, otherwise
    /// the first name in that locale.
    pub fn preferred_name(&self, locale: &str) -> Option<&str> {
        let in_locale = || self.names.iter().filter(|n| n.locale == locale);
        in_locale()
            .find(|n| n.preferred)
            .or_else(|| in_locale().next())
            .map(|n| n.name.as_str())
    }

    /// Returns the best name in any locale, preferring `locale`.
    pub fn display_name(&self, locale: &str) -> Option<&str> {
        self.preferred_name(locale)
            .or_else(|| self.names.first().map(|n| n.name.as_str()))
    }

    /// Returns true if any of this concept's names equals `name`,
    /// ignoring ASCII case.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.name.eq_ignore_ascii_case(name))
    }

    /// Copies every child collection into fresh entries owned by `owner`.
    pub fn children_for(&self, owner: ConceptId) -> ConceptChildren {
        fn copy<T: ConceptChild>(items: &[T], owner: ConceptId) -> Vec<T> {
            items.iter().map(|item| item.cloned_for(owner)).collect()
        }
        ConceptChildren {
            names: copy(&self.names, owner),
            answers: copy(&self.answers, owner),
            concept_sets: copy(&self.concept_sets, owner),
            descriptions: copy(&self.descriptions, owner),
            concept_mappings: copy(&self.concept_mappings, owner),
        }
    }
}

/// Detached copies of a concept's child collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConceptChildren {
    /// Names.
    pub names: Vec<ConceptName>,
    /// Answers.
    pub answers: Vec<ConceptAnswer>,
    /// Set members.
    pub concept_sets: Vec<ConceptSetMember>,
    /// Descriptions.
    pub descriptions: Vec<ConceptDescription>,
    /// Mappings.
    pub concept_mappings: Vec<ConceptMap>,
}

/// A word-level match returned by concept searches.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptWord {
    /// Matched concept.
    pub concept_id: ConceptId,
    /// The name that matched.
    pub name: String,
    /// Locale of the matched name.
    pub locale: String,
    /// Words of the matched name that a search word prefixes; higher
    /// ranks first.
    pub weight: usize,
}

/// Lifecycle state of a concept proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProposalState {
    /// Awaiting review.
    Unmapped,
    /// Accepted as a synonym of an existing concept.
    Synonym,
    /// Accepted as a new concept.
    Concept,
    /// Rejected.
    Reject,
}

/// A user-proposed addition to the dictionary.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConceptProposal {
    /// Proposal id (assigned on submission when zero).
    pub id: u32,
    /// Text as originally entered.
    pub original_text: String,
    /// Text after review.
    pub final_text: Option<String>,
    /// Encounter during which the proposal was made.
    pub encounter_id: Option<EncounterId>,
    /// Question concept the proposed answer was for.
    pub obs_concept_id: Option<ConceptId>,
    /// Concept the proposal was mapped to.
    pub mapped_concept_id: Option<ConceptId>,
    /// Review state.
    pub state: ProposalState,
    /// Reviewer comments.
    pub comments: Option<String>,
}

impl ConceptProposal {
    /// Creates an unmapped proposal for the given text.
    pub fn new(original_text: impl Into<String>) -> Self {
        Self {
            id: 0,
            original_text: original_text.into(),
            final_text: None,
            encounter_id: None,
            obs_concept_id: None,
            mapped_concept_id: None,
            state: ProposalState::Unmapped,
            comments: None,
        }
    }

    /// Returns true once the proposal has been reviewed.
    pub fn is_completed(&self) -> bool {
        self.state != ProposalState::Unmapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_follow_owner() {
        let mut concept = Concept::new(10);
        concept.add_name("CD4 COUNT", "en", true);
        concept.add_answer(11);
        concept.add_set_member(12, 2.0);
        concept.add_description("Absolute CD4 count", "en");
        concept.add_mapping("LOINC", "24467-3");

        assert!(concept.names.iter().all(|n| n.owner() == 10));
        assert_eq!(concept.answers[0].owner(), 10);
        assert_eq!(concept.concept_sets[0].owner(), 10);
        assert_eq!(concept.descriptions[0].owner(), 10);
        assert_eq!(concept.concept_mappings[0].owner(), 10);
    }

    #[test]
    fn test_cloned_for_repoints_owner_only() {
        let name = ConceptName {
            concept_id: 1,
            name: "HEIGHT".to_string(),
            locale: "en".to_string(),
            preferred: true,
        };
        let copy = name.cloned_for(2);
        assert_eq!(copy.concept_id, 2);
        assert_eq!(copy.name, "HEIGHT");
        assert_eq!(name.concept_id, 1);
    }

    #[test]
    fn test_preferred_name_fallbacks() {
        let mut concept = Concept::new(1);
        concept.add_name("POIDS", "fr", false);
        concept.add_name("WT", "en", false);
        concept.add_name("WEIGHT", "en", true);

        assert_eq!(concept.preferred_name("en"), Some("WEIGHT"));
        assert_eq!(concept.preferred_name("fr"), Some("POIDS"));
        assert_eq!(concept.preferred_name("es"), None);
        assert_eq!(concept.display_name("es"), Some("POIDS"));
        assert!(concept.has_name("weight"));
    }

    #[test]
    fn test_proposal_completion() {
        let mut proposal = ConceptProposal::new("BROKEN ARM");
        assert!(!proposal.is_completed());
        proposal.state = ProposalState::Reject;
        assert!(proposal.is_completed());
    }
}
