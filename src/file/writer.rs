//! Growable big-endian byte sink used by the class file writer.
//!
//! [`crate::file::writer::ByteWriter`] is the write-side counterpart of
//! [`crate::file::parser::Parser`]: values are appended in big-endian order, and previously
//! reserved slots (attribute lengths, branch offsets) can be patched once their value is known.

use crate::{
    file::io::{write_be_at, ClassIO},
    Result,
};

/// Append-only big-endian byte buffer with support for back-patching.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer
    #[must_use]
    pub fn new() -> Self {
        ByteWriter { data: Vec::new() }
    }

    /// Current length of the written data, which is also the offset of the next write
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a value in big-endian order
    pub fn put<T: ClassIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_be_bytes().as_ref());
    }

    /// Append raw bytes
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append `count` zero bytes
    pub fn put_zeros(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0);
    }

    /// Overwrite a previously written value at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the slot lies outside the written data.
    pub fn patch<T: ClassIO>(&mut self, offset: usize, value: T) -> Result<()> {
        let mut position = offset;
        write_be_at(&mut self.data, &mut position, value)
    }

    /// Mutable access to the written bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Borrow the written bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer and return the buffer
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_patch() {
        let mut writer = ByteWriter::new();
        writer.put(0xCAFE_BABEu32);
        let slot = writer.len();
        writer.put(0u16);
        writer.put_bytes(&[1, 2, 3]);
        writer.patch(slot, 3u16).unwrap();
        assert_eq!(
            writer.into_inner(),
            vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x03, 1, 2, 3]
        );
    }

    #[test]
    fn patch_out_of_range() {
        let mut writer = ByteWriter::new();
        writer.put(1u8);
        assert!(writer.patch(0, 1u32).is_err());
    }
}
