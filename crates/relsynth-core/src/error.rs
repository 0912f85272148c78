use thiserror::Error;

/// Errors detected while building a schema. All of them are fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity type '{0}' is registered more than once")]
    DuplicateEntity(String),
    #[error("entity name '{0}' is used by more than one type")]
    DuplicateName(String),
    #[error("relation {entity} -> {target} references an unregistered entity type")]
    UnknownTarget { entity: String, target: String },
    #[error(
        "relation {entity} -> {target} uses a key type that differs from the key of '{target}'"
    )]
    KeyTypeMismatch { entity: String, target: String },
    #[error(
        "relation {entity} -> {target} sets both a pair predicate and a context predicate"
    )]
    ConflictingPredicates { entity: String, target: String },
    #[error("relation {entity} -> {target} uses weighted selection without a weight function")]
    MissingWeight { entity: String, target: String },
    #[error("cyclic dependency between entity types: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Errors returned by the generated store accessors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity type '{0}' is not present in the generated store")]
    TypeNotPresent(String),
    #[error("entity type '{0}' is already finalized in the generated store")]
    AlreadyFinalized(String),
    #[error("stored batch for '{0}' does not hold the requested type")]
    TypeMismatch(String),
}

/// Convenience alias for schema results.
pub type Result<T> = std::result::Result<T, SchemaError>;
