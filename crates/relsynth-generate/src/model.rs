use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

/// How many instances of a type to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSpec {
    /// Exactly `n` instances; any unresolvable required relation aborts the run.
    Exact(usize),
    /// Up to `count` instances; unresolvable ones are discarded as long as at
    /// least `min` survive.
    Ideal { count: usize, min: usize },
}

impl CountSpec {
    pub fn exact(count: usize) -> Self {
        CountSpec::Exact(count)
    }

    pub fn ideal(count: usize, min: usize) -> Self {
        CountSpec::Ideal { count, min }
    }

    pub fn count(&self) -> usize {
        match self {
            CountSpec::Exact(count) | CountSpec::Ideal { count, .. } => *count,
        }
    }

    /// Minimum number of survivors.
    pub fn min(&self) -> usize {
        match self {
            CountSpec::Exact(count) => *count,
            CountSpec::Ideal { min, .. } => *min,
        }
    }

    pub fn is_ideal(&self) -> bool {
        matches!(self, CountSpec::Ideal { .. })
    }

    pub fn validate(&self, entity: &str) -> Result<(), GenerationError> {
        match *self {
            CountSpec::Exact(_) => Ok(()),
            CountSpec::Ideal { count: 0, .. } => Err(GenerationError::InvalidConfig(format!(
                "ideal count for '{entity}' must be greater than zero"
            ))),
            CountSpec::Ideal { count, min } if min > count => {
                Err(GenerationError::InvalidConfig(format!(
                    "ideal count for '{entity}' has min {min} above count {count}"
                )))
            }
            CountSpec::Ideal { .. } => Ok(()),
        }
    }
}

/// Options for the generation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Global seed; `None` draws every random stream from OS entropy.
    pub seed: Option<u64>,
    /// Turn panics raised by callbacks into [`GenerationError::Panicked`].
    pub catch_panics: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seed: None,
            catch_panics: true,
        }
    }
}

impl GenerateOptions {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Where a type's instances came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSource {
    Synthesized,
    Prefilled,
}

/// Outcome counts for one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationReport {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub bound: u64,
    pub nulled: u64,
    pub discarded: u64,
}

/// Summary of a generated entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReport {
    pub name: String,
    pub source: BatchSource,
    pub requested: u64,
    pub generated: u64,
    pub survived: u64,
    pub discarded: u64,
    pub relations: Vec<RelationReport>,
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub seed: Option<u64>,
    pub order: Vec<String>,
    pub types: Vec<TypeReport>,
    pub post_processors: u64,
    pub duration_ms: u64,
}

impl GenerationReport {
    pub fn new(run_id: String, seed: Option<u64>, order: Vec<String>) -> Self {
        Self {
            run_id,
            seed,
            order,
            types: Vec::new(),
            post_processors: 0,
            duration_ms: 0,
        }
    }

    pub fn type_report(&self, name: &str) -> Option<&TypeReport> {
        self.types.iter().find(|report| report.name == name)
    }

    pub fn total_survived(&self) -> u64 {
        self.types.iter().map(|report| report.survived).sum()
    }

    pub fn total_discarded(&self) -> u64 {
        self.types.iter().map(|report| report.discarded).sum()
    }
}
