use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};

use crate::descriptor::EntityDescriptor;
use crate::error::{Result, SchemaError};
use crate::types::TypeTag;

/// Validate internal consistency of a set of entity descriptors.
///
/// This checks:
/// - duplicate types and display names
/// - relation targets are registered and share the target's key type
/// - at most one predicate variant per relation
/// - weighted relations carry a weight function
pub fn validate_entities(entities: &[EntityDescriptor]) -> Result<()> {
    let mut keys: HashMap<TypeTag, TypeId> = HashMap::new();
    let mut names = BTreeSet::new();

    for entity in entities {
        if keys.insert(entity.tag(), entity.key_type()).is_some() {
            return Err(SchemaError::DuplicateEntity(entity.name().to_string()));
        }
        if !names.insert(entity.name()) {
            return Err(SchemaError::DuplicateName(entity.name().to_string()));
        }
    }

    let names: HashMap<TypeTag, &str> = entities
        .iter()
        .map(|entity| (entity.tag(), entity.name()))
        .collect();

    for entity in entities {
        for relation in entity.relations() {
            let source = entity.name().to_string();
            let target = names
                .get(&relation.target())
                .map(|name| name.to_string())
                .unwrap_or_else(|| relation.target().short_name().to_string());

            let Some(target_key) = keys.get(&relation.target()) else {
                return Err(SchemaError::UnknownTarget {
                    entity: source,
                    target,
                });
            };
            if *target_key != relation.key_type() {
                return Err(SchemaError::KeyTypeMismatch {
                    entity: source,
                    target,
                });
            }
            if relation.has_conflicting_predicates() {
                return Err(SchemaError::ConflictingPredicates {
                    entity: source,
                    target,
                });
            }
            if relation.strategy() == crate::SelectionStrategy::Weighted && !relation.has_weight()
            {
                return Err(SchemaError::MissingWeight {
                    entity: source,
                    target,
                });
            }
        }
    }

    Ok(())
}
