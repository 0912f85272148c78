use std::any::Any;
use std::collections::BTreeSet;

/// Type-erased, ordered batch of entity instances.
///
/// Implemented for `Vec<T>`; the engine only sees instances as `&dyn Any`
/// and hands them to the accessors bound in the descriptors.
pub trait EntityBatch: Any {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn item(&self, index: usize) -> Option<&dyn Any>;

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Any>;

    /// Drop the instances at `indices`, keeping the relative order of survivors.
    fn discard(&mut self, indices: &BTreeSet<usize>);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> EntityBatch for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn item(&self, index: usize) -> Option<&dyn Any> {
        self.get(index).map(|item| item as &dyn Any)
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Any> {
        self.get_mut(index).map(|item| item as &mut dyn Any)
    }

    fn discard(&mut self, indices: &BTreeSet<usize>) {
        if indices.is_empty() {
            return;
        }
        let mut position = 0;
        self.retain(|_| {
            let keep = !indices.contains(&position);
            position += 1;
            keep
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
