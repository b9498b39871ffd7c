//! Cohort queries: declarative criteria and the engine that evaluates them.

mod definition;
mod engine;
mod numeric;

pub use definition::{
    CharacteristicFilter, CohortDefinition, Comparison, DrugOrderCriterion, NumericObsCriterion,
    TextObsCriterion,
};
pub use engine::CohortQueryEngine;
