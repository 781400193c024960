//! # classweave Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the classweave library. Import it to write transform rules and host integrations
//! without a long list of paths.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classweave operations
pub use crate::Error;

/// The result type used throughout classweave
pub use crate::Result;

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Instructions, their operands and the sequence holding them
pub use crate::assembly::{
    opcodes, Constant, DynamicCall, Frame, Handle, InsnId, Instruction, InstructionSequence,
    Label, MemberRef, Operand, VerificationType,
};

/// Search operations and member patterns
pub use crate::query::{FieldPattern, MatchFlags, MemberPattern, MethodPattern};

// ================================================================================================
// Class Files
// ================================================================================================

/// Decoded class structure
pub use crate::classfile::{
    Annotation, ClassAccess, ClassUnit, Code, FieldAccess, FieldUnit, MethodAccess, MethodUnit,
    TryCatchBlock,
};

/// Reading and writing class files
pub use crate::classfile::{ClassReader, ClassWriter, EncodeFlags, ReaderFlags, TypeHierarchy};

// ================================================================================================
// Transformation
// ================================================================================================

/// Extension points implemented by rule modules and hosts
pub use crate::transform::{
    ClassCache, DumpSink, EscapeSink, Initializer, MandatoryTransform, TransformFlags,
    TransformRule,
};

/// Registration, start-up and the per-class pipeline
pub use crate::transform::{
    Identifier, Instrumentation, Launcher, LoadOutcome, Passthrough, Pipeline, Registry,
};

/// Persisted settings
pub use crate::config::{Configuration, DumpMode};
