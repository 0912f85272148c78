use std::any::Any;
use std::collections::{BTreeMap, HashMap};

use fake::{Dummy, Faker};
use rand_chacha::ChaCha8Rng;

use relsynth_core::{EntityBatch, GeneratedStore, Schema, TypeTag};

use crate::config::GenerationConfig;
use crate::errors::{BoxError, GenerationError};
use crate::model::CountSpec;
use crate::synth::{ErasedSynthesizer, FakerSynthesizer, FnSynthesizer, Synthesizer, erase};

/// Callback run after every type is generated, with full access to the store.
pub type PostProcessor = Box<dyn FnOnce(&mut GeneratedStore) -> Result<(), BoxError>>;

/// What to generate: counts, prefilled instances, synthesizers and
/// post-processing callbacks.
#[derive(Default)]
pub struct GenerationPlan {
    pub(crate) counts: BTreeMap<TypeTag, CountSpec>,
    pub(crate) prefill: HashMap<TypeTag, Box<dyn EntityBatch>>,
    pub(crate) synthesizers: HashMap<TypeTag, ErasedSynthesizer>,
    pub(crate) post_processors: Vec<PostProcessor>,
}

impl GenerationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count<T: Any>(self, spec: CountSpec) -> Self {
        self.count_for(TypeTag::of::<T>(), spec)
    }

    pub fn count_for(mut self, tag: TypeTag, spec: CountSpec) -> Self {
        self.counts.insert(tag, spec);
        self
    }

    pub fn exact<T: Any>(self, count: usize) -> Self {
        self.count::<T>(CountSpec::Exact(count))
    }

    pub fn ideal<T: Any>(self, count: usize, min: usize) -> Self {
        self.count::<T>(CountSpec::Ideal { count, min })
    }

    /// Use `instances` verbatim instead of synthesizing `T`. Keys must already be set.
    pub fn prefill<T: Any>(mut self, instances: Vec<T>) -> Self {
        self.prefill.insert(TypeTag::of::<T>(), Box::new(instances));
        self
    }

    pub fn synthesizer<T: Any>(mut self, synthesizer: impl Synthesizer<T> + 'static) -> Self {
        self.synthesizers
            .insert(TypeTag::of::<T>(), erase::<T, _>(synthesizer));
        self
    }

    pub fn synthesize_with<T: Any>(
        self,
        synthesize: impl Fn(usize, &mut ChaCha8Rng) -> Vec<T> + 'static,
    ) -> Self {
        self.synthesizer::<T>(FnSynthesizer(synthesize))
    }

    /// Synthesize `T` through its `fake::Dummy` implementation.
    pub fn faked<T: Any + Dummy<Faker>>(self) -> Self {
        self.synthesizer::<T>(FakerSynthesizer)
    }

    pub fn post_process(
        mut self,
        callback: impl FnOnce(&mut GeneratedStore) -> Result<(), BoxError> + 'static,
    ) -> Self {
        self.post_processors.push(Box::new(callback));
        self
    }

    /// Apply the count table of `config`, resolving names against `schema`.
    pub fn with_config(
        mut self,
        schema: &Schema,
        config: &GenerationConfig,
    ) -> Result<Self, GenerationError> {
        for (tag, spec) in config.count_specs(schema)? {
            self.counts.insert(tag, spec);
        }
        Ok(self)
    }

    pub fn count_spec(&self, tag: &TypeTag) -> Option<CountSpec> {
        self.counts.get(tag).copied()
    }
}

impl std::fmt::Debug for GenerationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPlan")
            .field("counts", &self.counts)
            .field("prefill", &self.prefill.keys().collect::<Vec<_>>())
            .field("synthesizers", &self.synthesizers.len())
            .field("post_processors", &self.post_processors.len())
            .finish()
    }
}
