use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use tracing::{debug, info, warn};

use relsynth_core::{EntityBatch, GeneratedStore, Schema, TypeTag};

use crate::errors::GenerationError;
use crate::foreign::{
    ResolveContext, ResolvedRelation, Targets, prune_self_references, resolve_relation,
};
use crate::keys::assign_keys;
use crate::model::{BatchSource, GenerateOptions, GenerationReport, TypeReport};
use crate::plan::{GenerationPlan, PostProcessor};
use crate::planner::{GenerationTask, TaskSource, plan_tasks};
use crate::seed::{key_rng, relation_rng, synthesis_rng};
use crate::synth::ErasedSynthesizer;

/// Result of a generation run.
#[derive(Debug)]
pub struct GenerationResult {
    pub store: GeneratedStore,
    pub report: GenerationReport,
}

/// Entry point for generating an object graph from a schema and a plan.
#[derive(Debug, Clone, Default)]
pub struct GenerationEngine {
    options: GenerateOptions,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// Generate every planned type in dependency order, resolve its
    /// relations, then run the plan's post-processors.
    ///
    /// The first error aborts the run; no partial store is returned.
    pub fn run(
        &self,
        schema: &Schema,
        plan: GenerationPlan,
    ) -> Result<GenerationResult, GenerationError> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let tasks = plan_tasks(schema, &plan)?;
        let order = tasks.iter().map(|task| task.name.clone()).collect();
        let mut report = GenerationReport::new(run_id.clone(), self.options.seed, order);

        let GenerationPlan {
            prefill,
            synthesizers,
            post_processors,
            ..
        } = plan;
        let mut run = Run {
            schema,
            seed: self.options.seed,
            prefill,
            synthesizers,
            store: GeneratedStore::new(),
        };

        info!(
            run_id = %run_id,
            types = tasks.len(),
            seed = ?self.options.seed,
            "generation started"
        );

        let outcome = if self.options.catch_panics {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                run.execute(tasks, post_processors, &mut report)
            }))
            .unwrap_or_else(|panic| Err(GenerationError::Panicked(panic_message(panic))))
        } else {
            run.execute(tasks, post_processors, &mut report)
        };

        report.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(
                    run_id = %run_id,
                    types = report.types.len(),
                    instances = report.total_survived(),
                    discarded = report.total_discarded(),
                    duration_ms = report.duration_ms,
                    "generation completed"
                );
                Ok(GenerationResult {
                    store: run.store,
                    report,
                })
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "generation failed");
                Err(err)
            }
        }
    }
}

/// Mutable state of one run.
struct Run<'s> {
    schema: &'s Schema,
    seed: Option<u64>,
    prefill: HashMap<TypeTag, Box<dyn EntityBatch>>,
    synthesizers: HashMap<TypeTag, ErasedSynthesizer>,
    store: GeneratedStore,
}

impl Run<'_> {
    fn execute(
        &mut self,
        tasks: Vec<GenerationTask>,
        post_processors: Vec<PostProcessor>,
        report: &mut GenerationReport,
    ) -> Result<(), GenerationError> {
        for task in tasks {
            let type_report = self.generate_type(&task)?;
            report.types.push(type_report);
        }

        let total = post_processors.len();
        for (position, post_process) in post_processors.into_iter().enumerate() {
            debug!(position, total, "running post-processor");
            post_process(&mut self.store).map_err(GenerationError::Invariant)?;
            report.post_processors += 1;
        }

        Ok(())
    }

    fn generate_type(&mut self, task: &GenerationTask) -> Result<TypeReport, GenerationError> {
        let type_start = Instant::now();
        let entity = self.schema.entity(&task.tag).ok_or_else(|| {
            GenerationError::InvalidConfig(format!(
                "entity type '{}' not found in schema",
                task.name
            ))
        })?;

        let (mut batch, source, requested) = match task.source {
            TaskSource::Prefill => {
                let batch = self.prefill.remove(&task.tag).ok_or_else(|| {
                    GenerationError::InvalidConfig(format!(
                        "no prefill registered for '{}'",
                        task.name
                    ))
                })?;
                let requested = batch.len();
                (batch, BatchSource::Prefilled, requested)
            }
            TaskSource::Synthesize { count } => {
                let batch = self.synthesize(task, count)?;
                (batch, BatchSource::Synthesized, count)
            }
        };

        if source == BatchSource::Synthesized {
            let mut rng = key_rng(self.seed, &task.tag);
            assign_keys(entity, batch.as_mut(), &mut rng)?;
        }

        info!(
            entity = %task.name,
            source = ?source,
            instances = batch.len(),
            relations = entity.relations().len(),
            "generating entity type"
        );

        let generated = batch.len();
        let mut discarded = task.is_ideal().then(BTreeSet::new);
        let mut resolved: Vec<ResolvedRelation> = Vec::with_capacity(entity.relations().len());

        for relation in entity.relations() {
            let target_entity = self.schema.entity(&relation.target()).ok_or_else(|| {
                GenerationError::InvalidConfig(format!(
                    "relation {} targets an unregistered type",
                    relation.label()
                ))
            })?;
            let targets = if relation.is_self_referential() {
                Targets::SameBatch
            } else {
                match self.store.batch(&relation.target()) {
                    Ok(stored) => Targets::Stored(stored),
                    Err(_) => Targets::Missing,
                }
            };

            let ctx = ResolveContext {
                relation,
                source_name: &task.name,
                target: target_entity,
                store: &self.store,
            };
            let mut rng = relation_rng(self.seed, relation);
            resolved.push(resolve_relation(
                &ctx,
                batch.as_mut(),
                targets,
                &mut rng,
                discarded.as_mut(),
            )?);
        }

        if let Some(discarded) = discarded.as_mut() {
            loop {
                let mut changed = false;
                for (relation, outcome) in entity.relations().iter().zip(resolved.iter_mut()) {
                    if relation.is_self_referential() {
                        changed |=
                            prune_self_references(relation, batch.as_mut(), outcome, discarded)?;
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        let relations = resolved.into_iter().map(|outcome| outcome.report).collect();

        let discarded = discarded.unwrap_or_default();
        if !discarded.is_empty() {
            batch.discard(&discarded);
        }
        let survived = batch.len();

        if let Some(spec) = task.count
            && spec.is_ideal()
            && survived < spec.min()
        {
            return Err(GenerationError::IdealShortfall {
                entity: task.name.clone(),
                generated,
                survived,
                discarded: discarded.len(),
                min: spec.min(),
            });
        }

        self.store.insert(task.tag, task.name.clone(), batch)?;

        info!(
            entity = %task.name,
            generated,
            survived,
            discarded = discarded.len(),
            duration_ms = type_start.elapsed().as_millis() as u64,
            "entity type generated"
        );

        Ok(TypeReport {
            name: task.name.clone(),
            source,
            requested: requested as u64,
            generated: generated as u64,
            survived: survived as u64,
            discarded: discarded.len() as u64,
            relations,
        })
    }

    fn synthesize(
        &self,
        task: &GenerationTask,
        count: usize,
    ) -> Result<Box<dyn EntityBatch>, GenerationError> {
        let Some(synthesizer) = self.synthesizers.get(&task.tag) else {
            return match self.schema.entity(&task.tag) {
                Some(entity) if count == 0 => Ok(entity.empty_batch()),
                _ => Err(GenerationError::InvalidConfig(format!(
                    "no synthesizer registered for '{}'",
                    task.name
                ))),
            };
        };

        let mut rng = synthesis_rng(self.seed, &task.tag);
        let batch = synthesizer(count, &mut rng);
        if batch.len() != count {
            return Err(GenerationError::InvalidConfig(format!(
                "synthesizer for '{}' returned {} instances, expected {count}",
                task.name,
                batch.len()
            )));
        }
        Ok(batch)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during generation".to_string()
    }
}
