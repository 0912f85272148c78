//! Relation-resolving generation engine for relsynth.
//!
//! This crate consumes a built `relsynth_core::Schema` and a `GenerationPlan`
//! to produce a deterministic, referentially consistent `GeneratedStore`.

pub mod config;
pub mod engine;
pub mod errors;
pub mod foreign;
pub mod keys;
pub mod logging;
pub mod model;
pub mod plan;
pub mod planner;
pub mod seed;
pub mod synth;

pub use config::{CountConfig, GenerationConfig};
pub use engine::{GenerationEngine, GenerationResult};
pub use errors::{BoxError, GenerationError};
pub use logging::{LogFormat, init_logging};
pub use model::{
    BatchSource, CountSpec, GenerateOptions, GenerationReport, RelationReport, TypeReport,
};
pub use plan::{GenerationPlan, PostProcessor};
pub use synth::{FakerSynthesizer, FnSynthesizer, Synthesizer};
