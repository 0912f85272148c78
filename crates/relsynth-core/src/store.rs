use std::any::Any;
use std::collections::BTreeMap;

use crate::batch::EntityBatch;
use crate::error::StoreError;
use crate::types::TypeTag;

struct StoredBatch {
    name: String,
    batch: Box<dyn EntityBatch>,
}

/// Type-indexed, append-only store of generated instances.
///
/// Batches are inserted once, in generation order, and are read-only for the
/// rest of the resolution pass. Only post-processing gets mutable access.
#[derive(Default)]
pub struct GeneratedStore {
    batches: BTreeMap<TypeTag, StoredBatch>,
    order: Vec<TypeTag>,
}

impl GeneratedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the batch for `tag`. A type can be inserted only once.
    pub fn insert(
        &mut self,
        tag: TypeTag,
        name: impl Into<String>,
        batch: Box<dyn EntityBatch>,
    ) -> Result<(), StoreError> {
        let name = name.into();
        if self.batches.contains_key(&tag) {
            return Err(StoreError::AlreadyFinalized(name));
        }
        self.batches.insert(tag, StoredBatch { name, batch });
        self.order.push(tag);
        Ok(())
    }

    /// All instances of `T`.
    pub fn get<T: Any>(&self) -> Result<&[T], StoreError> {
        let tag = TypeTag::of::<T>();
        let stored = self
            .batches
            .get(&tag)
            .ok_or_else(|| StoreError::TypeNotPresent(tag.short_name().to_string()))?;
        stored
            .batch
            .as_any()
            .downcast_ref::<Vec<T>>()
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::TypeMismatch(stored.name.clone()))
    }

    /// Mutable access to all instances of `T`, intended for post-processing.
    pub fn get_mut<T: Any>(&mut self) -> Result<&mut Vec<T>, StoreError> {
        let tag = TypeTag::of::<T>();
        let stored = self
            .batches
            .get_mut(&tag)
            .ok_or_else(|| StoreError::TypeNotPresent(tag.short_name().to_string()))?;
        let name = stored.name.clone();
        stored
            .batch
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .ok_or(StoreError::TypeMismatch(name))
    }

    /// Type-erased batch for `tag`.
    pub fn batch(&self, tag: &TypeTag) -> Result<&dyn EntityBatch, StoreError> {
        self.batches
            .get(tag)
            .map(|stored| stored.batch.as_ref())
            .ok_or_else(|| StoreError::TypeNotPresent(tag.short_name().to_string()))
    }

    /// Type-erased batch looked up by entity display name.
    pub fn by_name(&self, name: &str) -> Result<&dyn EntityBatch, StoreError> {
        self.batches
            .values()
            .find(|stored| stored.name == name)
            .map(|stored| stored.batch.as_ref())
            .ok_or_else(|| StoreError::TypeNotPresent(name.to_string()))
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.batches.contains_key(tag)
    }

    /// Stored types in insertion order.
    pub fn tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.order.iter()
    }

    /// Number of stored types.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn total_instances(&self) -> usize {
        self.batches.values().map(|stored| stored.batch.len()).sum()
    }
}

impl std::fmt::Debug for GeneratedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for tag in &self.order {
            if let Some(stored) = self.batches.get(tag) {
                map.entry(&stored.name, &stored.batch.len());
            }
        }
        map.finish()
    }
}
