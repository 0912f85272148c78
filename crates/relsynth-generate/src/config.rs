use std::collections::BTreeMap;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use relsynth_core::{Schema, TypeTag};

use crate::errors::GenerationError;
use crate::model::{CountSpec, GenerateOptions};

/// File-level configuration for a generation run.
///
/// ```toml
/// seed = 42
///
/// [counts.Customer]
/// count = 10
///
/// [counts.Order]
/// count = 100
/// min = 60
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Global seed for deterministic runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Convert callback panics into generation errors (default true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_panics: Option<bool>,
    /// Count per entity display name.
    #[serde(default)]
    pub counts: BTreeMap<String, CountConfig>,
}

/// Count entry; a `min` turns it into an ideal count.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CountConfig {
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
}

impl CountConfig {
    pub fn to_spec(&self, entity: &str) -> Result<CountSpec, GenerationError> {
        let count = non_negative(self.count, entity, "count")?;
        let spec = match self.min {
            Some(min) => CountSpec::Ideal {
                count,
                min: non_negative(min, entity, "min")?,
            },
            None => CountSpec::Exact(count),
        };
        spec.validate(entity)?;
        Ok(spec)
    }
}

impl GenerationConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, GenerationError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, GenerationError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn options(&self) -> GenerateOptions {
        let defaults = GenerateOptions::default();
        GenerateOptions {
            seed: self.seed,
            catch_panics: self.catch_panics.unwrap_or(defaults.catch_panics),
        }
    }

    /// Resolve count entries against the schema's display names.
    pub fn count_specs(
        &self,
        schema: &Schema,
    ) -> Result<Vec<(TypeTag, CountSpec)>, GenerationError> {
        let mut specs = Vec::with_capacity(self.counts.len());
        for (name, entry) in &self.counts {
            let entity = schema.entity_by_name(name).ok_or_else(|| {
                GenerationError::InvalidConfig(format!("count given for unknown entity '{name}'"))
            })?;
            specs.push((entity.tag(), entry.to_spec(name)?));
        }
        Ok(specs)
    }
}

fn non_negative(value: i64, entity: &str, field: &str) -> Result<usize, GenerationError> {
    usize::try_from(value).map_err(|_| {
        GenerationError::InvalidConfig(format!(
            "{field} for '{entity}' must not be negative, got {value}"
        ))
    })
}
