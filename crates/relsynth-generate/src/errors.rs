use thiserror::Error;

use relsynth_core::{SchemaError, StoreError};

/// Error raised by a post-processing callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors emitted by the generation engine. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("required relation {relation}: no instances of '{target}' exist")]
    NoTargets { relation: String, target: String },
    #[error(
        "required relation {relation}: predicate excluded all {candidates} existing '{target}' \
         instances for '{entity}' instance #{index}"
    )]
    NoEligibleTargets {
        relation: String,
        entity: String,
        target: String,
        index: usize,
        candidates: usize,
    },
    #[error(
        "unique relation {relation}: {needed} instances need distinct targets but only \
         {available} exist"
    )]
    InsufficientUniquePool {
        relation: String,
        needed: usize,
        available: usize,
    },
    #[error(
        "unique relation {relation}: all {eligible} eligible targets for instance #{index} \
         are already bound"
    )]
    UniquePoolExhausted {
        relation: String,
        index: usize,
        eligible: usize,
    },
    #[error(
        "'{entity}': generated {generated}, survived {survived}, discarded {discarded}; \
         at least {min} required"
    )]
    IdealShortfall {
        entity: String,
        generated: usize,
        survived: usize,
        discarded: usize,
        min: usize,
    },
    #[error("no key could be produced for '{entity}' instance #{index}")]
    KeyGeneration { entity: String, index: usize },
    #[error("instance type mismatch while resolving {0}")]
    TypeMismatch(String),
    #[error("{0}")]
    Invariant(BoxError),
    #[error("generation panicked: {0}")]
    Panicked(String),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
