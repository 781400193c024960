// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # classweave
//!
//! Load-time instrumentation for JVM class files. Built in pure Rust, `classweave` decodes
//! class files into an editable instruction model, lets an ordered set of transform rules
//! rewrite them, and encodes the result back with recomputed `max_stack`, `max_locals` and
//! stack map frames.
//!
//! ## Features
//!
//! - **Label-based instruction model** - Splice, insert and remove instructions without
//!   touching branch offsets
//! - **Instruction queries** - Find calls, field accesses, returns and throw sequences with
//!   wildcard member patterns
//! - **Round-trip codec** - Unknown attributes are preserved; long jumps are widened on write
//! - **Frame recomputation** - Stack map frames are rebuilt on request, against a pluggable
//!   type hierarchy
//! - **Deduplicated pipeline** - Each class name is transformed at most once per process,
//!   from any number of loader threads
//! - **Result cache** - Transformed bytes are cached under the original bytes and reused
//!   across runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use classweave::prelude::*;
//!
//! struct Quiet(Identifier);
//!
//! impl TransformRule for Quiet {
//!     fn name(&self) -> &Identifier {
//!         &self.0
//!     }
//!
//!     fn handles_class(&self, name: &str, _loader_name: &str) -> bool {
//!         name.starts_with("com.example.")
//!     }
//!
//!     fn transform(&self, class: &mut ClassUnit, _flags: &mut TransformFlags) -> Result<bool> {
//!         Ok(class.remove_annotations("Lcom/example/Noisy;"))
//!     }
//! }
//!
//! let instrumentation = Launcher::new(Configuration::default())
//!     .initializer(|registry: &Registry| -> Result<()> {
//!         registry.register_early(Arc::new(Quiet(Identifier::new("example", "quiet"))));
//!         Ok(())
//!     })
//!     .launch(Arc::new(Passthrough))?;
//!
//! let bytes = std::fs::read("com/example/Service.class")?;
//! let outcome = instrumentation
//!     .pipeline()
//!     .transform("com.example.Service", "com.example.Service", bytes)?;
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`assembly`] - Instructions, labels, frames and the [`assembly::InstructionSequence`]
//! - [`query`] - Search operations over an instruction sequence
//! - [`classfile`] - Class file reader and writer, maxs and frame computation
//! - [`transform`] - Rule registry, per-class pipeline, cache and dump service
//! - [`config`] - The persisted [`config::Configuration`]
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! All components log through [`tracing`]; install any subscriber in the host to see the
//! output. Per-class events are logged at `debug` and `trace`, start-up and shutdown at `info`.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use classweave::prelude::*;
///
/// let bytes = std::fs::read("Example.class")?;
/// let class = ClassUnit::parse(&bytes, ReaderFlags::empty())?;
/// println!("{} has {} methods", class.name, class.methods.len());
/// # Ok::<(), classweave::Error>(())
/// ```
pub mod prelude;

pub mod assembly;
pub mod classfile;
pub mod config;
pub mod file;
pub mod query;
pub mod transform;
pub mod utils;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// Every fallible operation in this crate returns this error.
pub use error::Error;

/// Cursor-based big-endian reader over class file bytes.
///
/// # Example
///
/// ```rust
/// use classweave::Parser;
/// let mut parser = Parser::new(&[0xCA, 0xFE, 0xBA, 0xBE]);
/// assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
/// # Ok::<(), classweave::Error>(())
/// ```
pub use file::Parser;
