use rand_chacha::ChaCha8Rng;

use relsynth_core::{EntityBatch, EntityDescriptor};

use crate::errors::GenerationError;

/// Assign keys to every synthesized instance, passing 1-based indices.
pub fn assign_keys(
    entity: &EntityDescriptor,
    batch: &mut dyn EntityBatch,
    rng: &mut ChaCha8Rng,
) -> Result<(), GenerationError> {
    for position in 0..batch.len() {
        let index = position + 1;
        let instance = batch
            .item_mut(position)
            .ok_or_else(|| GenerationError::TypeMismatch(format!("{} keys", entity.name())))?;
        if !entity.assign_key(instance, index, rng) {
            return Err(GenerationError::KeyGeneration {
                entity: entity.name().to_string(),
                index,
            });
        }
    }
    Ok(())
}
