//! Load-time class transformation.
//!
//! This module ties the class file codec to the host's class load events:
//!
//! - [`crate::transform::rule`] - [`TransformRule`] and the other extension points
//! - [`crate::transform::registry`] - The [`Registry`] rules and caches are registered with
//! - [`crate::transform::pipeline`] - The per-class [`Pipeline`]
//! - [`crate::transform::launch`] - The start-up sequence, [`Launcher`]
//! - [`crate::transform::cache`] - [`DiskCache`], a content-addressed [`ClassCache`]
//! - [`crate::transform::dump`] - [`DumpService`], the background class dumper
//! - [`crate::transform::builtin`] - The relocation marker and its [`RelocationRule`]
//!
//! # Lifecycle
//!
//! Rules are only accepted while the registry is open, which is during the initializer phase
//! of [`Launcher::launch`]. After the registry is frozen the rule lists never change, so the
//! pipeline reads them without locking.
//!
//! # Thread Safety
//!
//! [`Pipeline`] is [`Send`] and [`Sync`] and is shared by every loader thread. Each class name
//! is transformed at most once per process, no matter how many threads request it.

pub mod builtin;
pub mod cache;
pub mod dump;
pub mod identifier;
pub mod launch;
pub mod pipeline;
pub mod registry;
pub mod rule;

pub use builtin::RelocationRule;
pub use cache::DiskCache;
pub use dump::DumpService;
pub use identifier::Identifier;
pub use launch::{Instrumentation, Launcher};
pub use pipeline::{LoadOutcome, Pipeline, PipelineBuilder};
pub use registry::{Registry, RegistryState};
pub use rule::{
    ClassCache, DumpSink, EscapeSink, Initializer, MandatoryTransform, Passthrough,
    TransformFlags, TransformRule,
};
