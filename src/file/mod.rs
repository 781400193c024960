//! Binary access to class file bytes.
//!
//! This module contains the byte-level building blocks that the class file codec is
//! built upon:
//!
//! - [`crate::file::io`] - Big-endian, bounds-checked primitive reads and writes
//! - [`crate::file::parser`] - Cursor-based [`Parser`] used by the class reader
//! - [`crate::file::writer`] - Growable [`ByteWriter`] used by the class writer
//!
//! # Thread Safety
//!
//! None of the types in this module hold shared state; a [`Parser`] borrows its input and a
//! [`ByteWriter`] owns its output, so independent instances can be used on any thread.

pub mod io;
pub mod parser;
pub mod writer;

pub use parser::Parser;
pub use writer::ByteWriter;
