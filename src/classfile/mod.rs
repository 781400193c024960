//! Class file decoding and encoding.
//!
//! This module turns class file bytes into a [`ClassUnit`] and back:
//!
//! - [`crate::classfile::reader`] - [`ClassReader`], a zero-copy header view and the decoder
//! - [`crate::classfile::writer`] - [`ClassWriter`], the encoder with maxs and frame recomputation
//! - [`crate::classfile::unit`] - [`ClassUnit`], [`MethodUnit`] and their parts
//! - [`crate::classfile::constpool`] - The constant pool and bootstrap method table
//! - [`crate::classfile::annotation`] - Runtime visible and invisible annotations
//! - [`crate::classfile::descriptor`] - Descriptor parsing and the shared [`TypeCache`]
//! - [`crate::classfile::maxs`] - `max_stack` / `max_locals` computation
//! - [`crate::classfile::frames`] - Stack map frame computation
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::classfile::{ClassReader, ClassUnit, EncodeFlags, ReaderFlags};
//!
//! let bytes = std::fs::read("Example.class")?;
//!
//! // Cheap look at the header without decoding any method
//! let reader = ClassReader::new(&bytes)?;
//! println!("{} (major {})", reader.class_name()?, reader.major_version());
//!
//! let class = ClassUnit::parse(&bytes, ReaderFlags::SKIP_DEBUG)?;
//! let bytes = class.to_bytes(EncodeFlags::COMPUTE_FRAMES)?;
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod annotation;
pub mod constpool;
pub mod descriptor;
pub mod frames;
pub mod maxs;
pub mod reader;
pub mod unit;
pub mod writer;

pub use annotation::{Annotation, Annotations, ElementValue};
pub use constpool::{BootstrapTable, ConstantPool, PoolEntry};
pub use descriptor::{FieldType, MethodType, TypeCache};
pub use frames::{compute_frames, DefaultHierarchy, TypeHierarchy};
pub use maxs::compute_maxs;
pub use reader::{ClassReader, ReaderFlags};
pub use unit::{
    ClassAccess, ClassUnit, Code, FieldAccess, FieldUnit, LocalVariable, MethodAccess,
    MethodUnit, RawAttribute, TryCatchBlock,
};
pub use writer::{ClassWriter, EncodeFlags};

use crate::{Error, Result};

/// Narrow a table length or byte length to its `u16` field.
pub(crate) fn count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::Encoding(format!("Too many {}: {}", what, len)))
}
