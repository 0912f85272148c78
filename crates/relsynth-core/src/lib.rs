//! Core contracts for relsynth.
//!
//! This crate defines entity and relation descriptors, schema validation, the
//! dependency graph that orders generation, and the type-indexed store that
//! holds generated instances.

pub mod batch;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod key;
pub mod schema;
pub mod store;
pub mod types;
pub mod validation;

pub use batch::EntityBatch;
pub use descriptor::{
    ContextPredicate, Eligibility, Entity, EntityDescriptor, KeyGeneration, PairPredicate,
    Relation, RelationDescriptor, SelectionStrategy,
};
pub use error::{Result, SchemaError, StoreError};
pub use graph::{DependencyGraph, GraphReport, GraphSummary};
pub use key::{EntityKey, KeyShape};
pub use schema::{Schema, SchemaBuilder};
pub use store::GeneratedStore;
pub use types::TypeTag;
pub use validation::validate_entities;
