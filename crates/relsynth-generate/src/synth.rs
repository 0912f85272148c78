//! Value-synthesis collaborators that populate non-key, non-FK fields.

use std::any::Any;

use fake::{Dummy, Fake, Faker};
use rand_chacha::ChaCha8Rng;

use relsynth_core::EntityBatch;

/// Produces `count` populated instances of `T` from a seeded stream.
pub trait Synthesizer<T> {
    fn synthesize(&self, count: usize, rng: &mut ChaCha8Rng) -> Vec<T>;
}

/// Synthesizer backed by the `fake` crate's `Dummy` implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakerSynthesizer;

impl<T: Dummy<Faker>> Synthesizer<T> for FakerSynthesizer {
    fn synthesize(&self, count: usize, rng: &mut ChaCha8Rng) -> Vec<T> {
        (0..count).map(|_| Faker.fake_with_rng::<T, _>(rng)).collect()
    }
}

/// Adapter turning a closure into a [`Synthesizer`].
pub struct FnSynthesizer<F>(pub F);

impl<T, F> Synthesizer<T> for FnSynthesizer<F>
where
    F: Fn(usize, &mut ChaCha8Rng) -> Vec<T>,
{
    fn synthesize(&self, count: usize, rng: &mut ChaCha8Rng) -> Vec<T> {
        (self.0)(count, rng)
    }
}

pub(crate) type ErasedSynthesizer = Box<dyn Fn(usize, &mut ChaCha8Rng) -> Box<dyn EntityBatch>>;

pub(crate) fn erase<T, S>(synthesizer: S) -> ErasedSynthesizer
where
    T: Any,
    S: Synthesizer<T> + 'static,
{
    Box::new(move |count: usize, rng: &mut ChaCha8Rng| {
        Box::new(synthesizer.synthesize(count, rng)) as Box<dyn EntityBatch>
    })
}
