//! Foreign-key resolution for one relation over one batch of source instances.
//!
//! Resolution runs in two passes. The selection pass only reads the source
//! batch, the target batch and the store, and decides per source index
//! whether it binds to a target, gets the null sentinel, or is discarded. The
//! apply pass then writes the FK fields. Self-referential relations read the
//! batch being resolved as their target list, which is why the passes are
//! kept apart. Instances already discarded never serve as self-referential
//! targets, and [`prune_self_references`] releases bindings to instances
//! discarded after the relation ran.

use std::any::Any;
use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use relsynth_core::{
    EntityBatch, EntityDescriptor, GeneratedStore, RelationDescriptor, SelectionStrategy,
};

use crate::errors::GenerationError;
use crate::model::RelationReport;

/// Target instances available to a relation.
#[derive(Clone, Copy)]
pub enum Targets<'a> {
    /// Finalized batch of another type.
    Stored(&'a dyn EntityBatch),
    /// The batch being resolved (self-referential relation).
    SameBatch,
    /// The target type was never generated.
    Missing,
}

/// Per-source outcome of the selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bound(usize),
    Null,
    Discarded,
    /// Already discarded by an earlier relation.
    Skipped,
}

/// Why a source instance found no target.
#[derive(Debug, Clone, Copy)]
enum Shortfall {
    NoTargets,
    NoEligible { candidates: usize },
    PoolExhausted { eligible: usize },
}

/// Outcome of resolving one relation.
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    pub report: RelationReport,
    /// Per-source outcome, indexed like the source batch.
    pub resolutions: Vec<Resolution>,
}

/// Everything the resolver needs besides the batches.
pub struct ResolveContext<'a> {
    pub relation: &'a RelationDescriptor,
    pub source_name: &'a str,
    pub target: &'a EntityDescriptor,
    pub store: &'a GeneratedStore,
}

/// Resolve `ctx.relation` for every non-discarded instance in `sources`.
///
/// `discarded` is present only for ideal counts; unresolvable required
/// instances are added to it instead of failing the run.
pub fn resolve_relation(
    ctx: &ResolveContext<'_>,
    sources: &mut dyn EntityBatch,
    targets: Targets<'_>,
    rng: &mut ChaCha8Rng,
    mut discarded: Option<&mut BTreeSet<usize>>,
) -> Result<ResolvedRelation, GenerationError> {
    let label = ctx.relation.label();
    let empty: Vec<()> = Vec::new();

    let (resolutions, mut keys) = {
        let source_view: &dyn EntityBatch = &*sources;
        let target_view: &dyn EntityBatch = match targets {
            Targets::Stored(batch) => batch,
            Targets::SameBatch => source_view,
            Targets::Missing => &empty,
        };

        let mut selector = Selector {
            ctx,
            label: &label,
            sources: source_view,
            targets: target_view,
            same_batch: matches!(targets, Targets::SameBatch),
            rng,
            discarded: discarded.as_deref_mut(),
        };
        let resolutions = selector.select()?;
        let keys = collect_keys(ctx, &label, target_view, &resolutions)?;
        (resolutions, keys)
    };

    let mut report = RelationReport {
        target: ctx.target.name().to_string(),
        name: ctx.relation.name().map(str::to_string),
        ..RelationReport::default()
    };

    for (index, resolution) in resolutions.iter().enumerate() {
        let key = match resolution {
            Resolution::Bound(_) => keys[index].take(),
            Resolution::Null => None,
            Resolution::Discarded => {
                report.discarded += 1;
                continue;
            }
            Resolution::Skipped => continue,
        };
        let instance = sources
            .item_mut(index)
            .ok_or_else(|| GenerationError::TypeMismatch(label.clone()))?;
        if !ctx.relation.assign(instance, key.as_deref()) {
            return Err(GenerationError::TypeMismatch(label.clone()));
        }
        if key.is_some() {
            report.bound += 1;
        } else {
            report.nulled += 1;
        }
    }

    debug!(
        relation = %label,
        bound = report.bound,
        nulled = report.nulled,
        discarded = report.discarded,
        "relation resolved"
    );
    if report.nulled > 0 || report.discarded > 0 {
        warn!(
            relation = %label,
            nulled = report.nulled,
            discarded = report.discarded,
            "relation left instances without a target"
        );
    }

    Ok(ResolvedRelation {
        report,
        resolutions,
    })
}

/// Release self-referential bindings whose target sits in `discarded`.
///
/// Surviving sources bound to a discarded instance get the null sentinel when
/// the relation is optional and are discarded themselves when it is required.
/// Returns whether anything changed; callers repeat until it returns `false`
/// since a new discard can strand further sources.
pub fn prune_self_references(
    relation: &RelationDescriptor,
    sources: &mut dyn EntityBatch,
    resolved: &mut ResolvedRelation,
    discarded: &mut BTreeSet<usize>,
) -> Result<bool, GenerationError> {
    let label = relation.label();
    let mut changed = false;

    for (index, resolution) in resolved.resolutions.iter_mut().enumerate() {
        let Resolution::Bound(target) = *resolution else {
            continue;
        };
        if discarded.contains(&index) || !discarded.contains(&target) {
            continue;
        }

        resolved.report.bound = resolved.report.bound.saturating_sub(1);
        if relation.is_required() {
            discarded.insert(index);
            *resolution = Resolution::Discarded;
            resolved.report.discarded += 1;
        } else {
            let instance = sources
                .item_mut(index)
                .ok_or_else(|| GenerationError::TypeMismatch(label.clone()))?;
            if !relation.assign(instance, None) {
                return Err(GenerationError::TypeMismatch(label.clone()));
            }
            *resolution = Resolution::Null;
            resolved.report.nulled += 1;
        }
        changed = true;
    }

    if changed {
        debug!(
            relation = %label,
            nulled = resolved.report.nulled,
            discarded = resolved.report.discarded,
            "released bindings to discarded instances"
        );
    }
    Ok(changed)
}

fn collect_keys(
    ctx: &ResolveContext<'_>,
    label: &str,
    targets: &dyn EntityBatch,
    resolutions: &[Resolution],
) -> Result<Vec<Option<Box<dyn Any>>>, GenerationError> {
    resolutions
        .iter()
        .map(|resolution| match resolution {
            Resolution::Bound(target) => targets
                .item(*target)
                .and_then(|instance| ctx.target.key_of(instance))
                .map(Some)
                .ok_or_else(|| GenerationError::TypeMismatch(label.to_string())),
            _ => Ok(None),
        })
        .collect()
}

struct Selector<'r, 'a> {
    ctx: &'r ResolveContext<'a>,
    label: &'r str,
    sources: &'r dyn EntityBatch,
    targets: &'r dyn EntityBatch,
    /// Targets are the source batch; discarded indices are not candidates.
    same_batch: bool,
    rng: &'r mut ChaCha8Rng,
    discarded: Option<&'r mut BTreeSet<usize>>,
}

impl Selector<'_, '_> {
    fn select(&mut self) -> Result<Vec<Resolution>, GenerationError> {
        let mut resolutions = vec![Resolution::Skipped; self.sources.len()];
        let active: Vec<usize> = (0..self.sources.len())
            .filter(|index| !self.is_discarded(*index))
            .collect();

        if self.targets.is_empty() {
            for &index in &active {
                resolutions[index] = self.unresolved(index, Shortfall::NoTargets)?;
            }
            return Ok(resolutions);
        }

        let filtered = self.ctx.relation.eligibility().is_filtered();
        match (self.ctx.relation.is_unique(), filtered) {
            (true, false) => self.select_unique(&active, &mut resolutions)?,
            (true, true) => self.select_unique_filtered(&active, &mut resolutions)?,
            (false, false) => {
                let mut all = self.candidates();
                for &index in &active {
                    if self.same_batch {
                        all = self.candidates();
                    }
                    resolutions[index] = if all.is_empty() {
                        self.unresolved(index, Shortfall::NoTargets)?
                    } else {
                        Resolution::Bound(self.pick(index, &all))
                    };
                }
            }
            (false, true) => {
                for &index in &active {
                    let eligible = self.eligible(index);
                    resolutions[index] = if eligible.is_empty() {
                        let candidates = self.targets.len();
                        self.unresolved(index, Shortfall::NoEligible { candidates })?
                    } else {
                        Resolution::Bound(self.pick(index, &eligible))
                    };
                }
            }
        }

        Ok(resolutions)
    }

    /// Unique assignment without a predicate: bind a random permutation prefix.
    fn select_unique(
        &mut self,
        active: &[usize],
        resolutions: &mut [Resolution],
    ) -> Result<(), GenerationError> {
        let mut pool = self.candidates();
        let available = pool.len();
        if active.len() > available && self.ctx.relation.is_required() && self.discarded.is_none()
        {
            return Err(GenerationError::InsufficientUniquePool {
                relation: self.label.to_string(),
                needed: active.len(),
                available,
            });
        }

        pool.shuffle(self.rng);

        for (slot, &index) in active.iter().enumerate() {
            resolutions[index] = match pool.get(slot) {
                Some(&target) => Resolution::Bound(target),
                None => self.unresolved(
                    index,
                    Shortfall::PoolExhausted {
                        eligible: available,
                    },
                )?,
            };
        }
        Ok(())
    }

    /// Greedy unique assignment with a predicate.
    ///
    /// Sources are served in order, each taking a random unused eligible
    /// target. An early source may take the only target a later one could
    /// use; this is not a maximum matching.
    fn select_unique_filtered(
        &mut self,
        active: &[usize],
        resolutions: &mut [Resolution],
    ) -> Result<(), GenerationError> {
        let mut used = vec![false; self.targets.len()];

        for &index in active {
            let eligible = self.eligible(index);
            let available: Vec<usize> = eligible
                .iter()
                .copied()
                .filter(|target| !used[*target])
                .collect();

            if available.is_empty() {
                let shortfall = if eligible.is_empty() {
                    Shortfall::NoEligible {
                        candidates: self.targets.len(),
                    }
                } else {
                    Shortfall::PoolExhausted {
                        eligible: eligible.len(),
                    }
                };
                resolutions[index] = self.unresolved(index, shortfall)?;
                continue;
            }

            let target = available[self.rng.random_range(0..available.len())];
            used[target] = true;
            resolutions[index] = Resolution::Bound(target);
        }
        Ok(())
    }

    fn eligible(&self, index: usize) -> Vec<usize> {
        let Some(source) = self.sources.item(index) else {
            return Vec::new();
        };
        let eligibility = self.ctx.relation.eligibility();
        self.candidates()
            .into_iter()
            .filter(|target| {
                self.targets
                    .item(*target)
                    .is_some_and(|target| eligibility.allows(source, target, self.ctx.store))
            })
            .collect()
    }

    /// Target indices before eligibility filtering.
    fn candidates(&self) -> Vec<usize> {
        (0..self.targets.len())
            .filter(|target| !(self.same_batch && self.is_discarded(*target)))
            .collect()
    }

    /// Pick one of `candidates` (never empty) for the source at `index`.
    fn pick(&mut self, index: usize, candidates: &[usize]) -> usize {
        match self.ctx.relation.strategy() {
            SelectionStrategy::Random => candidates[self.rng.random_range(0..candidates.len())],
            SelectionStrategy::RoundRobin | SelectionStrategy::SpreadEvenly => {
                candidates[index % candidates.len()]
            }
            SelectionStrategy::Weighted => self.pick_weighted(candidates),
        }
    }

    fn pick_weighted(&mut self, candidates: &[usize]) -> usize {
        let weights: Vec<f64> = candidates
            .iter()
            .map(|target| {
                self.targets
                    .item(*target)
                    .and_then(|target| self.ctx.relation.weight_of(target))
                    .filter(|weight| weight.is_finite() && *weight > 0.0)
                    .unwrap_or(0.0)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return candidates[self.rng.random_range(0..candidates.len())];
        }

        let draw = self.rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        for (candidate, weight) in candidates.iter().zip(&weights) {
            cumulative += weight;
            if draw < cumulative {
                return *candidate;
            }
        }

        candidates
            .iter()
            .zip(&weights)
            .rev()
            .find(|(_, weight)| **weight > 0.0)
            .map(|(candidate, _)| *candidate)
            .unwrap_or(candidates[candidates.len() - 1])
    }

    fn is_discarded(&self, index: usize) -> bool {
        self.discarded
            .as_ref()
            .is_some_and(|discarded| discarded.contains(&index))
    }

    /// Apply the optional / ideal / required policy to one instance.
    fn unresolved(
        &mut self,
        index: usize,
        shortfall: Shortfall,
    ) -> Result<Resolution, GenerationError> {
        if !self.ctx.relation.is_required() {
            return Ok(Resolution::Null);
        }
        if let Some(discarded) = self.discarded.as_deref_mut() {
            discarded.insert(index);
            return Ok(Resolution::Discarded);
        }

        let relation = self.label.to_string();
        let target = self.ctx.target.name().to_string();
        Err(match shortfall {
            Shortfall::NoTargets => GenerationError::NoTargets { relation, target },
            Shortfall::NoEligible { candidates } => GenerationError::NoEligibleTargets {
                relation,
                entity: self.ctx.source_name.to_string(),
                target,
                index,
                candidates,
            },
            Shortfall::PoolExhausted { eligible } => {
                if self.ctx.relation.eligibility().is_filtered() {
                    GenerationError::UniquePoolExhausted {
                        relation,
                        index,
                        eligible,
                    }
                } else {
                    GenerationError::InsufficientUniquePool {
                        relation,
                        needed: index + 1,
                        available: eligible,
                    }
                }
            }
        })
    }
}
