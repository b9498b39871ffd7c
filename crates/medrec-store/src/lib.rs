//! # medrec-store
//!
//! In-memory clinical store and cohort query engine.
//!
//! This crate loads tab-delimited clinical data files into a
//! [`ClinicalStore`], exposes it through the [`ClinicalRepository`] trait,
//! and answers cohort queries with a [`CohortQueryEngine`]. Dictionary
//! maintenance goes through the [`ConceptService`].
//!
//! ## Features
//!
//! - `parallel` (default): Evaluates numeric observation criteria in
//!   parallel via rayon once enough patients are involved.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use medrec_store::{
//!     discover_data_files, ClinicalStore, CohortDefinition, CohortQueryEngine, LoadConfig,
//!     QueryConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let files = discover_data_files("/data/medrec")?;
//! let mut store = ClinicalStore::new();
//! store.load_all(&files, &LoadConfig::default())?;
//!
//! let engine = CohortQueryEngine::new(Arc::new(store), QueryConfig::default());
//! let definition: CohortDefinition = serde_json::from_str(
//!     r#"{ "type": "characteristics", "gender": "F", "min_age": 15 }"#,
//! )?;
//! let women = engine.evaluate(&definition)?;
//! println!("{} patients", women.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod concept;
mod concept_service;
mod encounter;
mod loader;
mod observation;
mod order;
mod parser;
mod patient;
mod program;
pub mod query;
mod repository;
mod session;
mod store;
mod types;

pub use concept::{ConceptNumericRecord, ConceptRecord};
pub use concept_service::{ConceptSearch, ConceptService, ConceptSort, SortDirection};
pub use loader::discover_data_files;
pub use parser::{parse, TsvParser, TsvRecord};
pub use query::{
    CharacteristicFilter, CohortDefinition, CohortQueryEngine, Comparison, DrugOrderCriterion,
    NumericObsCriterion, TextObsCriterion,
};
pub use repository::ClinicalRepository;
pub use session::{SessionId, SessionRegistry, WorkingSet};
pub use store::{ClinicalStore, StoredConcept};
pub use types::{
    DataFiles, EntityKind, LoadConfig, LoadStats, QueryConfig, ServiceError, ServiceResult,
    StoreError, StoreResult,
};

// Re-export medrec-types for convenience
pub use medrec_types;
