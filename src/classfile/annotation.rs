//! Runtime visible and invisible annotations.
//!
//! Classes and methods keep their `RuntimeVisibleAnnotations` and
//! `RuntimeInvisibleAnnotations` in decoded form so that rules can look for marker
//! annotations, strip them, or add new ones. [`crate::classfile::annotation::Annotations`]
//! bundles both lists and offers the lookup and edit helpers that rules use.

use crate::{
    assembly::Constant,
    classfile::{
        constpool::{BootstrapTable, ConstantPool, PoolEntry},
        count,
    },
    file::{ByteWriter, Parser},
    Result,
};

/// Attribute name of visible annotations
pub const RUNTIME_VISIBLE: &str = "RuntimeVisibleAnnotations";
/// Attribute name of invisible annotations
pub const RUNTIME_INVISIBLE: &str = "RuntimeInvisibleAnnotations";

/// One annotation: its type descriptor and element/value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Annotation type descriptor, e.g. `Ljava/lang/Deprecated;`
    pub desc: String,
    /// Element name / value pairs in declaration order
    pub values: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// Marker annotation without elements
    pub fn marker(desc: impl Into<String>) -> Self {
        Annotation {
            desc: desc.into(),
            values: Vec::new(),
        }
    }
}

/// Value of an annotation element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant, with its element tag (`B C D F I J S Z s`)
    Const(u8, Constant),
    /// Enum constant
    Enum {
        /// Enum type descriptor
        desc: String,
        /// Constant name
        name: String,
    },
    /// Class literal, as a return descriptor
    Class(String),
    /// Nested annotation
    Annotation(Annotation),
    /// Array of values
    Array(Vec<ElementValue>),
}

/// Visible and invisible annotations of a class or method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    /// `RuntimeVisibleAnnotations`
    pub visible: Vec<Annotation>,
    /// `RuntimeInvisibleAnnotations`
    pub invisible: Vec<Annotation>,
}

impl Annotations {
    /// Returns `true` if neither list has entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.invisible.is_empty()
    }

    /// Every annotation of type `desc`, visible ones first
    #[must_use]
    pub fn all(&self, desc: &str) -> Vec<&Annotation> {
        self.visible
            .iter()
            .chain(self.invisible.iter())
            .filter(|annotation| annotation.desc == desc)
            .collect()
    }

    /// First annotation of type `desc`, visible ones first
    #[must_use]
    pub fn find(&self, desc: &str) -> Option<&Annotation> {
        self.visible
            .iter()
            .chain(self.invisible.iter())
            .find(|annotation| annotation.desc == desc)
    }

    /// Returns `true` if an annotation of type `desc` is present
    #[must_use]
    pub fn has(&self, desc: &str) -> bool {
        self.find(desc).is_some()
    }

    /// Append annotations to the visible or invisible list
    pub fn add<I>(&mut self, visible: bool, annotations: I)
    where
        I: IntoIterator<Item = Annotation>,
    {
        let list = if visible {
            &mut self.visible
        } else {
            &mut self.invisible
        };
        list.extend(annotations);
    }

    /// Remove every annotation equal to one of `annotations` from both lists.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove(&mut self, annotations: &[Annotation]) -> bool {
        let before = self.visible.len() + self.invisible.len();
        self.visible.retain(|a| !annotations.contains(a));
        self.invisible.retain(|a| !annotations.contains(a));
        before != self.visible.len() + self.invisible.len()
    }

    /// Remove every annotation of type `desc` from both lists.
    ///
    /// Returns `true` if anything was removed.
    pub fn remove_type(&mut self, desc: &str) -> bool {
        let before = self.visible.len() + self.invisible.len();
        self.visible.retain(|a| a.desc != desc);
        self.invisible.retain(|a| a.desc != desc);
        before != self.visible.len() + self.invisible.len()
    }

    /// Change the type of every annotation of type `from` to `to`, keeping its values.
    ///
    /// Returns `true` if anything was renamed.
    pub fn rename_type(&mut self, from: &str, to: &str) -> bool {
        let mut changed = false;
        for annotation in self.visible.iter_mut().chain(self.invisible.iter_mut()) {
            if annotation.desc == from {
                annotation.desc = to.to_string();
                changed = true;
            }
        }
        changed
    }
}

/// Decode the body of a `Runtime*Annotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid tags or pool references and
/// [`crate::Error::OutOfBounds`] for truncated data.
pub fn parse_annotations(data: &[u8], pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        annotations.push(parse_annotation(&mut parser, pool, 0)?);
    }
    Ok(annotations)
}

/// Scan the body of a `Runtime*Annotations` attribute for annotation type descriptors only.
///
/// # Errors
/// Same as [`parse_annotations`].
pub fn annotation_types(data: &[u8], pool: &ConstantPool) -> Result<Vec<String>> {
    Ok(parse_annotations(data, pool)?
        .into_iter()
        .map(|annotation| annotation.desc)
        .collect())
}

const MAX_DEPTH: usize = 64;

fn parse_annotation(parser: &mut Parser<'_>, pool: &ConstantPool, depth: usize) -> Result<Annotation> {
    if depth > MAX_DEPTH {
        return Err(malformed_error!("Annotation nesting too deep"));
    }

    let desc = pool.utf8(parser.read_be()?)?.to_string();
    let count = parser.read_be::<u16>()?;
    let mut values = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be()?)?.to_string();
        values.push((name, parse_element(parser, pool, depth + 1)?));
    }
    Ok(Annotation { desc, values })
}

fn parse_element(parser: &mut Parser<'_>, pool: &ConstantPool, depth: usize) -> Result<ElementValue> {
    if depth > MAX_DEPTH {
        return Err(malformed_error!("Annotation nesting too deep"));
    }

    let tag = parser.read_be::<u8>()?;
    Ok(match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' => match pool.get(parser.read_be()?)? {
            PoolEntry::Integer(value) => ElementValue::Const(tag, Constant::Int(*value)),
            _ => return Err(malformed_error!("Annotation element is not an Integer")),
        },
        b'F' => match pool.get(parser.read_be()?)? {
            PoolEntry::Float(bits) => ElementValue::Const(tag, Constant::Float(f32::from_bits(*bits))),
            _ => return Err(malformed_error!("Annotation element is not a Float")),
        },
        b'J' => match pool.get(parser.read_be()?)? {
            PoolEntry::Long(value) => ElementValue::Const(tag, Constant::Long(*value)),
            _ => return Err(malformed_error!("Annotation element is not a Long")),
        },
        b'D' => match pool.get(parser.read_be()?)? {
            PoolEntry::Double(bits) => {
                ElementValue::Const(tag, Constant::Double(f64::from_bits(*bits)))
            }
            _ => return Err(malformed_error!("Annotation element is not a Double")),
        },
        b's' => ElementValue::Const(
            tag,
            Constant::String(pool.utf8(parser.read_be()?)?.to_string()),
        ),
        b'e' => {
            let desc = pool.utf8(parser.read_be()?)?.to_string();
            let name = pool.utf8(parser.read_be()?)?.to_string();
            ElementValue::Enum { desc, name }
        }
        b'c' => ElementValue::Class(pool.utf8(parser.read_be()?)?.to_string()),
        b'@' => ElementValue::Annotation(parse_annotation(parser, pool, depth + 1)?),
        b'[' => {
            let count = parser.read_be::<u16>()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(parse_element(parser, pool, depth + 1)?);
            }
            ElementValue::Array(values)
        }
        other => {
            return Err(malformed_error!(
                "Invalid annotation element tag '{}'",
                char::from(other)
            ))
        }
    })
}

/// Encode the body of a `Runtime*Annotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Encoding`] on constant pool overflow or when a list exceeds 65535
/// entries.
pub fn write_annotations(
    annotations: &[Annotation],
    pool: &mut ConstantPool,
    out: &mut ByteWriter,
) -> Result<()> {
    out.put(count(annotations.len(), "annotations")?);
    for annotation in annotations {
        write_annotation(annotation, pool, out)?;
    }
    Ok(())
}

fn write_annotation(annotation: &Annotation, pool: &mut ConstantPool, out: &mut ByteWriter) -> Result<()> {
    out.put(pool.add_utf8(&annotation.desc)?);
    out.put(count(annotation.values.len(), "annotation values")?);
    for (name, value) in &annotation.values {
        out.put(pool.add_utf8(name)?);
        write_element(value, pool, out)?;
    }
    Ok(())
}

fn write_element(value: &ElementValue, pool: &mut ConstantPool, out: &mut ByteWriter) -> Result<()> {
    match value {
        ElementValue::Const(tag, constant) => {
            out.put(*tag);
            let index = match constant {
                Constant::String(text) if *tag == b's' => pool.add_utf8(text)?,
                // annotation constants never involve bootstrap methods
                other => pool.add_constant(other, &mut BootstrapTable::default())?,
            };
            out.put(index);
        }
        ElementValue::Enum { desc, name } => {
            out.put(b'e');
            out.put(pool.add_utf8(desc)?);
            out.put(pool.add_utf8(name)?);
        }
        ElementValue::Class(desc) => {
            out.put(b'c');
            out.put(pool.add_utf8(desc)?);
        }
        ElementValue::Annotation(annotation) => {
            out.put(b'@');
            write_annotation(annotation, pool, out)?;
        }
        ElementValue::Array(values) => {
            out.put(b'[');
            out.put(count(values.len(), "array elements")?);
            for value in values {
                write_element(value, pool, out)?;
            }
        }
    }
    Ok(())
}
