use relsynth_core::{KeyGeneration, Schema, TypeTag};
use tracing::debug;

use crate::errors::GenerationError;
use crate::model::CountSpec;
use crate::plan::GenerationPlan;

/// Where a task's working batch comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSource {
    Prefill,
    Synthesize { count: usize },
}

/// Planned generation task for an entity type.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub tag: TypeTag,
    pub name: String,
    pub source: TaskSource,
    pub count: Option<CountSpec>,
}

impl GenerationTask {
    pub fn is_ideal(&self) -> bool {
        self.count.is_some_and(|spec| spec.is_ideal())
    }
}

/// Build the ordered task list and reject configuration errors up front.
///
/// Types with neither a prefill nor a count are skipped and never reach the
/// store.
pub fn plan_tasks(
    schema: &Schema,
    plan: &GenerationPlan,
) -> Result<Vec<GenerationTask>, GenerationError> {
    let registered = plan
        .counts
        .keys()
        .chain(plan.prefill.keys())
        .chain(plan.synthesizers.keys());
    for tag in registered {
        if !schema.contains(tag) {
            return Err(GenerationError::InvalidConfig(format!(
                "entity type '{}' is not registered in the schema",
                tag.short_name()
            )));
        }
    }

    let mut tasks = Vec::new();
    for tag in schema.generation_order() {
        let entity = schema.entity(tag).ok_or_else(|| {
            GenerationError::InvalidConfig(format!("entity type '{}' not found in schema", tag))
        })?;
        let name = entity.name().to_string();
        let count = plan.count_spec(tag);
        if let Some(spec) = &count {
            spec.validate(&name)?;
        }

        let source = if plan.prefill.contains_key(tag) {
            TaskSource::Prefill
        } else if let Some(spec) = count {
            let requested = spec.count();
            if requested > 0 {
                if !plan.synthesizers.contains_key(tag) {
                    return Err(GenerationError::InvalidConfig(format!(
                        "no synthesizer registered for '{name}'"
                    )));
                }
                if entity.key_generation() == KeyGeneration::Unsupported {
                    return Err(GenerationError::InvalidConfig(format!(
                        "unsupported key shape for '{name}' and no custom key generator"
                    )));
                }
            }
            TaskSource::Synthesize { count: requested }
        } else {
            debug!(entity = %name, "no count or prefill, skipping entity type");
            continue;
        };

        tasks.push(GenerationTask {
            tag: *tag,
            name,
            source,
            count,
        });
    }

    Ok(tasks)
}
