//! Low-level byte order and safe reading/writing utilities for class file parsing.
//!
//! The JVM class file format stores every multi-byte quantity in big-endian order. This module
//! provides the [`crate::file::io::ClassIO`] trait which unifies reading and writing of primitive
//! types, and bounds-checked helpers on top of it.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait defining big-endian conversion for primitive types
//! - [`crate::file::io::read_be`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_be_at`] - Read a value at an offset and advance it
//! - [`crate::file::io::write_be_at`] - Write a value at an offset and advance it
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use classweave::file::io::{read_be_at, write_be_at};
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&data, &mut offset)?;
//! let minor: u16 = read_be_at(&data, &mut offset)?;
//! assert_eq!(magic, 0xCAFEBABE);
//! assert_eq!(minor, 0x34);
//!
//! let mut buffer = [0u8; 2];
//! let mut offset = 0;
//! write_be_at(&mut buffer, &mut offset, 0x1234u16)?;
//! assert_eq!(buffer, [0x12, 0x34]);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All functions return [`crate::Error::OutOfBounds`] if there are insufficient bytes in
//! the buffer to complete the operation.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data reading and writing operations.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait ClassIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in big-endian byte order from the start of a buffer.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Safely reads a value of type `T` in big-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes read.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_be_bytes(read))
}

/// Safely writes a value of type `T` in big-endian byte order at a specific offset.
///
/// The offset is advanced by the number of bytes written.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too small.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    if (bytes.len() + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    *offset += bytes.len();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_be_u16() {
        let result = read_be::<u16>(&[0x12, 0x34]).unwrap();
        assert_eq!(result, 0x1234);
    }

    #[test]
    fn read_be_i32_negative() {
        let result = read_be::<i32>(&[0xFF, 0xFF, 0xFF, 0xFE]).unwrap();
        assert_eq!(result, -2);
    }

    #[test]
    fn read_be_at_advances() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
        let mut offset = 0;
        assert_eq!(read_be_at::<u32>(&data, &mut offset).unwrap(), 0xCAFE_BABE);
        assert_eq!(offset, 4);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 0x34);
        assert_eq!(offset, 6);
    }

    #[test]
    fn read_be_at_out_of_bounds() {
        let data = [0x01];
        let mut offset = 0;
        assert!(matches!(
            read_be_at::<u16>(&data, &mut offset),
            Err(crate::Error::OutOfBounds)
        ));
        assert_eq!(offset, 0);
    }

    #[test]
    fn write_be_at_roundtrip_f64() {
        let mut buffer = [0u8; 8];
        let mut offset = 0;
        write_be_at(&mut buffer, &mut offset, 1.5f64).unwrap();
        assert_eq!(offset, 8);
        assert_eq!(read_be::<f64>(&buffer).unwrap(), 1.5);
    }

    #[test]
    fn write_be_at_too_small() {
        let mut buffer = [0u8; 3];
        let mut offset = 0;
        assert!(write_be_at(&mut buffer, &mut offset, 7u32).is_err());
    }
}
