//! JVM instruction model.
//!
//! This module contains the in-memory representation of a method body that transform rules
//! operate on:
//!
//! - [`crate::assembly::opcodes`] - Opcode constants, method handle kinds and translation tables
//! - [`crate::assembly::instruction`] - [`Instruction`], [`Operand`] and constant types
//! - [`crate::assembly::sequence`] - The arena-backed [`InstructionSequence`]
//!
//! The class reader produces an [`InstructionSequence`] per method (see
//! [`crate::classfile`]); the query engine in [`crate::query`] searches it, rules splice it, and
//! the class writer lowers it back into bytecode.
//!
//! # Thread Safety
//!
//! All types are plain owned data and are [`Send`] and [`Sync`]. A sequence is owned by exactly
//! one transform call at a time; there is no interior mutability.

pub mod instruction;
pub mod opcodes;
pub mod sequence;

pub use instruction::{
    Constant, DynamicCall, Frame, Handle, Instruction, Label, MemberRef, Operand,
    VerificationType,
};
pub use sequence::{InsnId, InstructionSequence};
