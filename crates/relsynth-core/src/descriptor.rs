//! Entity and relation descriptors.
//!
//! The typed builders [`Entity`] and [`Relation`] capture accessors and
//! predicates over concrete record types. Converting them yields the erased
//! [`EntityDescriptor`] / [`RelationDescriptor`] the engine works with: every
//! record is seen as `&dyn Any` and only ever touched through the bound
//! functions.

use std::any::{Any, TypeId};
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::batch::EntityBatch;
use crate::key::{EntityKey, KeyShape};
use crate::store::GeneratedStore;
use crate::types::TypeTag;

/// How a relation picks a target among the eligible candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Uniform pick per source instance.
    #[default]
    Random,
    /// `source[i]` binds to `targets[i mod len]`.
    RoundRobin,
    /// Same binding rule as `RoundRobin`.
    SpreadEvenly,
    /// Pick proportionally to the relation's weight function.
    Weighted,
}

pub type PairPredicate = Box<dyn Fn(&dyn Any, &dyn Any) -> bool>;
pub type ContextPredicate = Box<dyn Fn(&dyn Any, &dyn Any, &GeneratedStore) -> bool>;
type WeightFn = Box<dyn Fn(&dyn Any) -> f64>;
type AssignFn = Box<dyn Fn(&mut dyn Any, Option<&dyn Any>) -> bool>;
type KeyOfFn = Box<dyn Fn(&dyn Any) -> Option<Box<dyn Any>>>;
type AssignKeyFn = Box<dyn Fn(&mut dyn Any, usize, &mut dyn RngCore) -> bool>;

/// Which targets a source instance may reference.
pub enum Eligibility {
    /// Every target is eligible.
    All,
    /// `(source, target) -> bool`.
    Pair(PairPredicate),
    /// `(source, target, generated so far) -> bool`.
    WithContext(ContextPredicate),
}

impl Eligibility {
    pub fn is_filtered(&self) -> bool {
        !matches!(self, Eligibility::All)
    }

    pub fn allows(&self, source: &dyn Any, target: &dyn Any, store: &GeneratedStore) -> bool {
        match self {
            Eligibility::All => true,
            Eligibility::Pair(predicate) => predicate(source, target),
            Eligibility::WithContext(predicate) => predicate(source, target, store),
        }
    }
}

impl fmt::Debug for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::All => f.write_str("All"),
            Eligibility::Pair(_) => f.write_str("Pair(..)"),
            Eligibility::WithContext(_) => f.write_str("WithContext(..)"),
        }
    }
}

/// How keys are produced for synthesized instances of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    Custom,
    Default(KeyShape),
    Unsupported,
}

/// Erased foreign-key declaration from a source type to a target type.
pub struct RelationDescriptor {
    source: TypeTag,
    target: TypeTag,
    key_type: TypeId,
    name: Option<String>,
    required: bool,
    unique: bool,
    strategy: SelectionStrategy,
    eligibility: Eligibility,
    conflicting_predicates: bool,
    weight: Option<WeightFn>,
    assign: AssignFn,
}

impl RelationDescriptor {
    pub fn source(&self) -> TypeTag {
        self.source
    }

    pub fn target(&self) -> TypeTag {
        self.target
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn key_type(&self) -> TypeId {
        self.key_type
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn eligibility(&self) -> &Eligibility {
        &self.eligibility
    }

    pub fn has_weight(&self) -> bool {
        self.weight.is_some()
    }

    pub(crate) fn has_conflicting_predicates(&self) -> bool {
        self.conflicting_predicates
    }

    pub fn is_self_referential(&self) -> bool {
        self.source == self.target
    }

    /// Weight of `target`, or `None` when the relation has no weight function.
    pub fn weight_of(&self, target: &dyn Any) -> Option<f64> {
        self.weight.as_ref().map(|weight| weight(target))
    }

    /// Write `key` (or the null sentinel) into the FK field of `source`.
    ///
    /// Returns `false` when `source` or `key` is not of the declared type.
    pub fn assign(&self, source: &mut dyn Any, key: Option<&dyn Any>) -> bool {
        (self.assign)(source, key)
    }

    /// Human-readable `Source -> Target` label, including the relation name.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} -> {} ({name})", self.source, self.target),
            None => format!("{} -> {}", self.source, self.target),
        }
    }

    /// Stable identity used to derive the relation's random stream.
    pub fn stream_key(&self) -> String {
        let mut key = format!("{}->{}", self.source.type_name(), self.target.type_name());
        if let Some(name) = &self.name {
            key.push('#');
            key.push_str(name);
        }
        key
    }
}

impl fmt::Debug for RelationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("source", &self.source.short_name())
            .field("target", &self.target.short_name())
            .field("name", &self.name)
            .field("required", &self.required)
            .field("unique", &self.unique)
            .field("strategy", &self.strategy)
            .field("eligibility", &self.eligibility)
            .field("weighted", &self.weight.is_some())
            .finish()
    }
}

/// Erased per-type metadata: identity, key access, declared relations.
pub struct EntityDescriptor {
    tag: TypeTag,
    name: String,
    key_type: TypeId,
    key_shape: KeyShape,
    has_key_generator: bool,
    key_of: KeyOfFn,
    assign_key: AssignKeyFn,
    empty_batch: fn() -> Box<dyn EntityBatch>,
    relations: Vec<RelationDescriptor>,
}

impl EntityDescriptor {
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_type(&self) -> TypeId {
        self.key_type
    }

    pub fn key_shape(&self) -> KeyShape {
        self.key_shape
    }

    pub fn relations(&self) -> &[RelationDescriptor] {
        &self.relations
    }

    /// Empty `Vec` of this entity's record type.
    pub fn empty_batch(&self) -> Box<dyn EntityBatch> {
        (self.empty_batch)()
    }

    pub fn key_generation(&self) -> KeyGeneration {
        if self.has_key_generator {
            KeyGeneration::Custom
        } else if self.key_shape.has_default() {
            KeyGeneration::Default(self.key_shape)
        } else {
            KeyGeneration::Unsupported
        }
    }

    /// Boxed copy of the key of `instance`.
    pub fn key_of(&self, instance: &dyn Any) -> Option<Box<dyn Any>> {
        (self.key_of)(instance)
    }

    /// Assign the key for the instance at the 1-based `index`.
    ///
    /// Returns `false` when no key could be produced for this key shape.
    pub fn assign_key(&self, instance: &mut dyn Any, index: usize, rng: &mut dyn RngCore) -> bool {
        (self.assign_key)(instance, index, rng)
    }
}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field("key_shape", &self.key_shape)
            .field("key_generation", &self.key_generation())
            .field("relations", &self.relations)
            .finish()
    }
}

/// Typed builder for an [`EntityDescriptor`].
///
/// ```ignore
/// Entity::new(|c: &Customer| c.id, |c, id| c.id = id)
///     .named("customers")
///     .relation(Relation::<Customer, Region, String>::new(|c, code| c.region = code))
/// ```
pub struct Entity<T, K> {
    name: Option<String>,
    get: Box<dyn Fn(&T) -> K>,
    set: Box<dyn Fn(&mut T, K)>,
    generator: Option<Box<dyn Fn(usize) -> K>>,
    relations: Vec<RelationDescriptor>,
}

impl<T: Any, K: EntityKey> Entity<T, K> {
    pub fn new(get: impl Fn(&T) -> K + 'static, set: impl Fn(&mut T, K) + 'static) -> Self {
        Self {
            name: None,
            get: Box::new(get),
            set: Box::new(set),
            generator: None,
            relations: Vec::new(),
        }
    }

    /// Display name; defaults to the short type name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Custom key generator, called with the 1-based index of each instance.
    pub fn key_generator(mut self, generator: impl Fn(usize) -> K + 'static) -> Self {
        self.generator = Some(Box::new(generator));
        self
    }

    pub fn relation<U: Any, FK: EntityKey>(mut self, relation: Relation<T, U, FK>) -> Self {
        self.relations.push(relation.into_descriptor());
        self
    }

    pub fn into_descriptor(self) -> EntityDescriptor {
        let tag = TypeTag::of::<T>();
        let name = self.name.unwrap_or_else(|| tag.short_name().to_string());
        let has_key_generator = self.generator.is_some();
        let get = self.get;
        let set = self.set;
        let generator = self.generator;

        let key_of: KeyOfFn = Box::new(move |instance: &dyn Any| {
            instance
                .downcast_ref::<T>()
                .map(|instance| Box::new(get(instance)) as Box<dyn Any>)
        });

        let assign_key: AssignKeyFn = Box::new(
            move |instance: &mut dyn Any, index: usize, rng: &mut dyn RngCore| {
                let Some(instance) = instance.downcast_mut::<T>() else {
                    return false;
                };
                let key = match &generator {
                    Some(generator) => Some(generator(index)),
                    None => K::default_key(index, rng),
                };
                match key {
                    Some(key) => {
                        set(instance, key);
                        true
                    }
                    None => false,
                }
            },
        );

        EntityDescriptor {
            tag,
            name,
            key_type: TypeId::of::<K>(),
            key_shape: K::shape(),
            has_key_generator,
            key_of,
            assign_key,
            empty_batch: || -> Box<dyn EntityBatch> { Box::new(Vec::<T>::new()) },
            relations: self.relations,
        }
    }
}

impl<T: Any, K: EntityKey> From<Entity<T, K>> for EntityDescriptor {
    fn from(entity: Entity<T, K>) -> Self {
        entity.into_descriptor()
    }
}

/// Typed builder for a [`RelationDescriptor`] from `S` to `T` keyed by `K`.
///
/// Defaults: required, non-unique, [`SelectionStrategy::Random`], every
/// target eligible.
pub struct Relation<S, T, K> {
    assign: Box<dyn Fn(&mut S, Option<K>)>,
    name: Option<String>,
    required: bool,
    unique: bool,
    strategy: SelectionStrategy,
    filter: Option<Box<dyn Fn(&S, &T) -> bool>>,
    context_filter: Option<Box<dyn Fn(&S, &T, &GeneratedStore) -> bool>>,
    weight: Option<Box<dyn Fn(&T) -> f64>>,
}

impl<S: Any, T: Any, K: EntityKey> Relation<S, T, K> {
    /// `assign` receives `None` when an optional relation finds no target.
    pub fn new(assign: impl Fn(&mut S, Option<K>) + 'static) -> Self {
        Self {
            assign: Box::new(assign),
            name: None,
            required: true,
            unique: false,
            strategy: SelectionStrategy::Random,
            filter: None,
            context_filter: None,
            weight: None,
        }
    }

    /// Label distinguishing several relations between the same two types.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn optional(self) -> Self {
        self.required(false)
    }

    /// Each target may be referenced by at most one source.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn filter(mut self, predicate: impl Fn(&S, &T) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Predicate that can also look at every type generated so far.
    pub fn filter_with_context(
        mut self,
        predicate: impl Fn(&S, &T, &GeneratedStore) -> bool + 'static,
    ) -> Self {
        self.context_filter = Some(Box::new(predicate));
        self
    }

    /// Weighted selection; also switches the strategy to `Weighted`.
    pub fn weighted(mut self, weight: impl Fn(&T) -> f64 + 'static) -> Self {
        self.weight = Some(Box::new(weight));
        self.strategy = SelectionStrategy::Weighted;
        self
    }

    pub fn into_descriptor(self) -> RelationDescriptor {
        let conflicting_predicates = self.filter.is_some() && self.context_filter.is_some();
        let eligibility = match (self.context_filter, self.filter) {
            (Some(predicate), _) => Eligibility::WithContext(Box::new(
                move |source: &dyn Any, target: &dyn Any, store: &GeneratedStore| {
                    match (source.downcast_ref::<S>(), target.downcast_ref::<T>()) {
                        (Some(source), Some(target)) => predicate(source, target, store),
                        _ => false,
                    }
                },
            )),
            (None, Some(predicate)) => {
                Eligibility::Pair(Box::new(move |source: &dyn Any, target: &dyn Any| {
                    match (source.downcast_ref::<S>(), target.downcast_ref::<T>()) {
                        (Some(source), Some(target)) => predicate(source, target),
                        _ => false,
                    }
                }))
            }
            (None, None) => Eligibility::All,
        };

        let weight = self.weight.map(|weight| -> WeightFn {
            Box::new(move |target: &dyn Any| {
                target.downcast_ref::<T>().map(|target| weight(target)).unwrap_or(0.0)
            })
        });

        let assign_fk = self.assign;
        let assign: AssignFn = Box::new(move |source: &mut dyn Any, key: Option<&dyn Any>| {
            let Some(source) = source.downcast_mut::<S>() else {
                return false;
            };
            match key {
                None => {
                    assign_fk(source, None);
                    true
                }
                Some(key) => match key.downcast_ref::<K>() {
                    Some(key) => {
                        assign_fk(source, Some(key.clone()));
                        true
                    }
                    None => false,
                },
            }
        });

        RelationDescriptor {
            source: TypeTag::of::<S>(),
            target: TypeTag::of::<T>(),
            key_type: TypeId::of::<K>(),
            name: self.name,
            required: self.required,
            unique: self.unique,
            strategy: self.strategy,
            eligibility,
            conflicting_predicates,
            weight,
            assign,
        }
    }
}
