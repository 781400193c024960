//! Field and method descriptor parsing.
//!
//! Descriptors are parsed on demand by the maxs and frame analysis, which look at the same
//! handful of call descriptors over and over. [`TypeCache`] memoizes parsed method types
//! behind a [`crate::utils::ConcurrentMap`] so that concurrent transform calls share them.

use std::{fmt, str::FromStr, sync::Arc};

use crate::{assembly::VerificationType, utils::ConcurrentMap, Error, Result};

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `D`
    Double,
    /// `F`
    Float,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `S`
    Short,
    /// `Z`
    Boolean,
    /// `L<internal name>;`
    Object(String),
    /// `[<component>`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `desc` is not exactly one field descriptor.
    pub fn parse(desc: &str) -> Result<Self> {
        let bytes = desc.as_bytes();
        let mut pos = 0;
        let parsed = Self::parse_at(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(malformed_error!("Trailing data in field descriptor {}", desc));
        }
        Ok(parsed)
    }

    fn parse_at(bytes: &[u8], pos: &mut usize) -> Result<Self> {
        let Some(&tag) = bytes.get(*pos) else {
            return Err(malformed_error!("Truncated descriptor"));
        };
        *pos += 1;

        Ok(match tag {
            b'B' => FieldType::Byte,
            b'C' => FieldType::Char,
            b'D' => FieldType::Double,
            b'F' => FieldType::Float,
            b'I' => FieldType::Int,
            b'J' => FieldType::Long,
            b'S' => FieldType::Short,
            b'Z' => FieldType::Boolean,
            b'L' => {
                let start = *pos;
                let Some(len) = bytes[start..].iter().position(|b| *b == b';') else {
                    return Err(malformed_error!("Unterminated class in descriptor"));
                };
                *pos = start + len + 1;
                let name = std::str::from_utf8(&bytes[start..start + len])
                    .map_err(|_| malformed_error!("Invalid class name in descriptor"))?;
                if name.is_empty() {
                    return Err(malformed_error!("Empty class name in descriptor"));
                }
                FieldType::Object(name.to_string())
            }
            b'[' => FieldType::Array(Box::new(Self::parse_at(bytes, pos)?)),
            other => {
                return Err(malformed_error!(
                    "Invalid descriptor tag '{}'",
                    char::from(other)
                ))
            }
        })
    }

    /// Number of local variable or operand stack slots a value of this type occupies
    #[must_use]
    pub fn size(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }

    /// Verification type of a value of this type
    #[must_use]
    pub fn verification_type(&self) -> VerificationType {
        match self {
            FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Boolean
            | FieldType::Int => VerificationType::Integer,
            FieldType::Float => VerificationType::Float,
            FieldType::Long => VerificationType::Long,
            FieldType::Double => VerificationType::Double,
            FieldType::Object(name) => VerificationType::Object(name.clone()),
            FieldType::Array(_) => VerificationType::Object(self.to_string()),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(component) => write!(f, "[{}", component),
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodType {
    /// Parameter types in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub ret: Option<FieldType>,
}

impl MethodType {
    /// Parse a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `desc` is not a valid method descriptor.
    pub fn parse(desc: &str) -> Result<Self> {
        let bytes = desc.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed_error!("Method descriptor must start with '(': {}", desc));
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => params.push(FieldType::parse_at(bytes, &mut pos)?),
                None => return Err(malformed_error!("Unterminated method descriptor {}", desc)),
            }
        }

        let ret = if bytes.get(pos) == Some(&b'V') {
            pos += 1;
            None
        } else {
            Some(FieldType::parse_at(bytes, &mut pos)?)
        };

        if pos != bytes.len() {
            return Err(malformed_error!("Trailing data in method descriptor {}", desc));
        }

        Ok(MethodType { params, ret })
    }

    /// Slots occupied by the arguments, excluding `this`
    #[must_use]
    pub fn argument_slots(&self) -> u16 {
        self.params.iter().map(FieldType::size).sum()
    }

    /// Slots pushed by the return value
    #[must_use]
    pub fn return_slots(&self) -> u16 {
        self.ret.as_ref().map_or(0, FieldType::size)
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{}", ret),
            None => f.write_str("V"),
        }
    }
}

impl FromStr for MethodType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Shared memo of parsed method descriptors.
#[derive(Debug, Default)]
pub struct TypeCache {
    methods: ConcurrentMap<String, Arc<MethodType>>,
    fields: ConcurrentMap<String, Arc<FieldType>>,
}

impl TypeCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed form of a method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid. Invalid descriptors
    /// are not cached.
    pub fn method_type(&self, desc: &str) -> Result<Arc<MethodType>> {
        if let Some(parsed) = self.methods.get(desc) {
            return Ok(parsed);
        }

        let parsed = Arc::new(MethodType::parse(desc)?);
        Ok(self.methods.put_if_absent(desc.to_string(), parsed))
    }

    /// Parsed form of a field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn field_type(&self, desc: &str) -> Result<Arc<FieldType>> {
        if let Some(parsed) = self.fields.get(desc) {
            return Ok(parsed);
        }

        let parsed = Arc::new(FieldType::parse(desc)?);
        Ok(self.fields.put_if_absent(desc.to_string(), parsed))
    }

    /// Number of cached method descriptors
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if no method descriptor has been cached
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
