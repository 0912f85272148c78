use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shape of an entity key, deciding which default key strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyShape {
    /// Sequential integer starting at 1.
    Integer,
    /// Sequential index rendered as text.
    Text,
    /// Fresh random unique token.
    Token,
    /// No default strategy; a custom key generator is required.
    Unsupported,
}

impl KeyShape {
    pub fn has_default(self) -> bool {
        !matches!(self, KeyShape::Unsupported)
    }
}

/// Value usable as an entity key and as the payload of a foreign key.
///
/// Custom key types only need the marker impl; they report
/// [`KeyShape::Unsupported`] and must be paired with a custom key generator.
pub trait EntityKey: Clone + fmt::Debug + 'static {
    fn shape() -> KeyShape {
        KeyShape::Unsupported
    }

    /// Default key for the instance at the 1-based `index`.
    fn default_key(index: usize, rng: &mut dyn RngCore) -> Option<Self> {
        let _ = (index, rng);
        None
    }
}

macro_rules! sequential_integer_key {
    ($($ty:ty),*) => {
        $(
            impl EntityKey for $ty {
                fn shape() -> KeyShape {
                    KeyShape::Integer
                }

                fn default_key(index: usize, _rng: &mut dyn RngCore) -> Option<Self> {
                    <$ty>::try_from(index).ok()
                }
            }
        )*
    };
}

sequential_integer_key!(i32, i64, u32, u64, usize);

impl EntityKey for String {
    fn shape() -> KeyShape {
        KeyShape::Text
    }

    fn default_key(index: usize, _rng: &mut dyn RngCore) -> Option<Self> {
        Some(index.to_string())
    }
}

impl EntityKey for Uuid {
    fn shape() -> KeyShape {
        KeyShape::Token
    }

    fn default_key(_index: usize, rng: &mut dyn RngCore) -> Option<Self> {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        Some(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[derive(Debug, Clone)]
    struct Sku(#[allow(dead_code)] String);

    impl EntityKey for Sku {}

    #[test]
    fn integer_keys_are_one_based_sequences() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(i64::default_key(1, &mut rng), Some(1));
        assert_eq!(u32::default_key(42, &mut rng), Some(42));
        assert_eq!(i32::shape(), KeyShape::Integer);
    }

    #[test]
    fn text_keys_render_the_index() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(String::default_key(3, &mut rng).as_deref(), Some("3"));
    }

    #[test]
    fn token_keys_follow_the_seed() {
        let mut rng_a = ChaCha8Rng::seed_from_u64(11);
        let mut rng_b = ChaCha8Rng::seed_from_u64(11);
        let a = Uuid::default_key(1, &mut rng_a).expect("token");
        let b = Uuid::default_key(1, &mut rng_b).expect("token");
        let c = Uuid::default_key(2, &mut rng_a).expect("token");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn custom_keys_have_no_default() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(Sku::shape(), KeyShape::Unsupported);
        assert!(Sku::default_key(1, &mut rng).is_none());
        assert!(!Sku::shape().has_default());
    }
}
