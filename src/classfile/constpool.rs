//! The class file constant pool and the `BootstrapMethods` table.
//!
//! [`crate::classfile::constpool::ConstantPool`] is both the read-side view used by the class
//! reader and the write-side builder used by the class writer. A decoded
//! [`crate::classfile::ClassUnit`] keeps the pool it was read from; the writer starts from a
//! clone of it and only appends, so every index that an untouched raw attribute refers to
//! keeps pointing at the same entry.
//!
//! Appends are deduplicated: adding an entry that already exists returns the existing index.
//!
//! # Strings
//!
//! `CONSTANT_Utf8` entries use the JVM's modified UTF-8; they are converted with the
//! [`cesu8`] crate in both directions.

use std::collections::HashMap;

use crate::{
    assembly::{Constant, DynamicCall, Handle, MemberRef},
    file::{ByteWriter, Parser},
    classfile::count,
    Error, Result,
};

/// Constant pool tags
pub mod tag {
    #![allow(missing_docs)]
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// One constant pool slot, with references kept as raw indices.
///
/// Floating point values are stored as their bit patterns so entries can be hashed for
/// deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolEntry {
    /// Slot 0 and the slot following a `long` or `double`
    Unusable,
    /// `CONSTANT_Utf8`
    Utf8(String),
    /// `CONSTANT_Integer`
    Integer(i32),
    /// `CONSTANT_Float` bits
    Float(u32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double` bits
    Double(u64),
    /// `CONSTANT_Class` name index
    Class(u16),
    /// `CONSTANT_String` value index
    String(u16),
    /// `CONSTANT_Fieldref`
    FieldRef {
        /// Class index
        class: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// `CONSTANT_Methodref`
    MethodRef {
        /// Class index
        class: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethodRef {
        /// Class index
        class: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// `CONSTANT_NameAndType`
    NameAndType {
        /// Name index
        name: u16,
        /// Descriptor index
        desc: u16,
    },
    /// `CONSTANT_MethodHandle`
    MethodHandle {
        /// Reference kind
        kind: u8,
        /// Member reference index
        reference: u16,
    },
    /// `CONSTANT_MethodType` descriptor index
    MethodType(u16),
    /// `CONSTANT_Dynamic`
    Dynamic {
        /// Index into the `BootstrapMethods` table
        bootstrap: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// `CONSTANT_InvokeDynamic`
    InvokeDynamic {
        /// Index into the `BootstrapMethods` table
        bootstrap: u16,
        /// Name-and-type index
        name_and_type: u16,
    },
    /// `CONSTANT_Module` name index
    Module(u16),
    /// `CONSTANT_Package` name index
    Package(u16),
}

impl PoolEntry {
    fn is_wide(&self) -> bool {
        matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
    }
}

/// One `BootstrapMethods` entry: a method handle index and static argument indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// `CONSTANT_MethodHandle` index
    pub handle: u16,
    /// Loadable constant indices
    pub args: Vec<u16>,
}

/// The `BootstrapMethods` table, deduplicated on append like the pool.
#[derive(Debug, Clone, Default)]
pub struct BootstrapTable {
    entries: Vec<BootstrapMethod>,
    lookup: HashMap<BootstrapMethod, u16>,
}

impl BootstrapTable {
    /// Decode the body of a `BootstrapMethods` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the attribute is truncated.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let count = parser.read_be::<u16>()?;
        let mut table = BootstrapTable::default();
        for _ in 0..count {
            let handle = parser.read_be::<u16>()?;
            let arg_count = parser.read_be::<u16>()?;
            let mut args = Vec::with_capacity(usize::from(arg_count));
            for _ in 0..arg_count {
                args.push(parser.read_be::<u16>()?);
            }
            table.push(BootstrapMethod { handle, args });
        }
        Ok(table)
    }

    fn push(&mut self, method: BootstrapMethod) -> u16 {
        // indices stay positional even if the original table carries duplicates
        let index = self.entries.len() as u16;
        self.lookup.entry(method.clone()).or_insert(index);
        self.entries.push(method);
        index
    }

    /// Index of `method`, appending it if absent.
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] if the table would exceed 65535 entries.
    pub fn add(&mut self, method: BootstrapMethod) -> Result<u16> {
        if let Some(index) = self.lookup.get(&method) {
            return Ok(*index);
        }
        if self.entries.len() >= usize::from(u16::MAX) {
            return Err(Error::Encoding("Too many bootstrap methods".to_string()));
        }
        Ok(self.push(method))
    }

    /// Entry at `index`
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&BootstrapMethod> {
        self.entries.get(usize::from(index))
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the attribute body.
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] if the table or an argument list is too long.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        out.put(count(self.entries.len(), "bootstrap methods")?);
        for entry in &self.entries {
            out.put(entry.handle);
            out.put(count(entry.args.len(), "bootstrap arguments")?);
            for arg in &entry.args {
                out.put(*arg);
            }
        }
        Ok(())
    }
}

/// The constant pool of one class file.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<PoolEntry>,
    lookup: HashMap<PoolEntry, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool {
            entries: vec![PoolEntry::Unusable],
            lookup: HashMap::new(),
        }
    }
}

impl ConstantPool {
    /// Create an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `constant_pool_count` and the entries that follow it.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on unknown tags or invalid modified UTF-8, and
    /// [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count must be at least 1"));
        }

        let mut pool = ConstantPool {
            entries: Vec::with_capacity(usize::from(count)),
            lookup: HashMap::with_capacity(usize::from(count)),
        };
        pool.entries.push(PoolEntry::Unusable);

        while pool.entries.len() < usize::from(count) {
            let entry = match parser.read_be::<u8>()? {
                tag::UTF8 => {
                    let len = parser.read_be::<u16>()?;
                    let bytes = parser.read_bytes(usize::from(len))?;
                    let text = cesu8::from_java_cesu8(bytes)
                        .map_err(|_| malformed_error!("Invalid modified UTF-8 in constant pool"))?;
                    PoolEntry::Utf8(text.into_owned())
                }
                tag::INTEGER => PoolEntry::Integer(parser.read_be()?),
                tag::FLOAT => PoolEntry::Float(parser.read_be()?),
                tag::LONG => PoolEntry::Long(parser.read_be()?),
                tag::DOUBLE => PoolEntry::Double(parser.read_be()?),
                tag::CLASS => PoolEntry::Class(parser.read_be()?),
                tag::STRING => PoolEntry::String(parser.read_be()?),
                tag::FIELD_REF => PoolEntry::FieldRef {
                    class: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                tag::METHOD_REF => PoolEntry::MethodRef {
                    class: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                tag::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef {
                    class: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                tag::NAME_AND_TYPE => PoolEntry::NameAndType {
                    name: parser.read_be()?,
                    desc: parser.read_be()?,
                },
                tag::METHOD_HANDLE => PoolEntry::MethodHandle {
                    kind: parser.read_be()?,
                    reference: parser.read_be()?,
                },
                tag::METHOD_TYPE => PoolEntry::MethodType(parser.read_be()?),
                tag::DYNAMIC => PoolEntry::Dynamic {
                    bootstrap: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                tag::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
                    bootstrap: parser.read_be()?,
                    name_and_type: parser.read_be()?,
                },
                tag::MODULE => PoolEntry::Module(parser.read_be()?),
                tag::PACKAGE => PoolEntry::Package(parser.read_be()?),
                other => {
                    return Err(malformed_error!(
                        "Unknown constant pool tag {} at index {}",
                        other,
                        pool.entries.len()
                    ))
                }
            };

            let wide = entry.is_wide();
            let index = pool.entries.len() as u16;
            pool.lookup.entry(entry.clone()).or_insert(index);
            pool.entries.push(entry);
            if wide {
                if pool.entries.len() >= usize::from(count) {
                    return Err(malformed_error!("Wide constant in the last pool slot"));
                }
                pool.entries.push(PoolEntry::Unusable);
            }
        }

        Ok(pool)
    }

    /// Number of slots including slot 0, i.e. the `constant_pool_count` to write
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool holds nothing besides slot 0
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is out of range or unusable.
    pub fn get(&self, index: u16) -> Result<&PoolEntry> {
        match self.entries.get(usize::from(index)) {
            Some(PoolEntry::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {}",
                index
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Text of a `CONSTANT_Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Utf8(text) => Ok(text),
            _ => Err(malformed_error!("Constant pool entry {} is not Utf8", index)),
        }
    }

    /// Internal name of a `CONSTANT_Class` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Class(name) => self.utf8(*name),
            _ => Err(malformed_error!("Constant pool entry {} is not a Class", index)),
        }
    }

    /// Like [`ConstantPool::class_name`], but index 0 yields `None`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a non-zero index is not a `CONSTANT_Class`.
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    /// Name and descriptor of a `CONSTANT_NameAndType` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            PoolEntry::NameAndType { name, desc } => Ok((self.utf8(*name)?, self.utf8(*desc)?)),
            _ => Err(malformed_error!(
                "Constant pool entry {} is not a NameAndType",
                index
            )),
        }
    }

    /// Field, method or interface method reference at `index`, with its interface flag.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<(MemberRef, bool)> {
        let (class, name_and_type, interface) = match self.get(index)? {
            PoolEntry::FieldRef {
                class,
                name_and_type,
            }
            | PoolEntry::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            _ => {
                return Err(malformed_error!(
                    "Constant pool entry {} is not a member reference",
                    index
                ))
            }
        };

        let owner = self.class_name(class)?;
        let (name, desc) = self.name_and_type(name_and_type)?;
        Ok((MemberRef::new(owner, name, desc), interface))
    }

    /// Method handle at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a `CONSTANT_MethodHandle`.
    pub fn handle(&self, index: u16) -> Result<Handle> {
        match self.get(index)? {
            PoolEntry::MethodHandle { kind, reference } => {
                let (member, interface) = self.member_ref(*reference)?;
                Ok(Handle {
                    tag: *kind,
                    owner: member.owner,
                    name: member.name,
                    desc: member.desc,
                    interface,
                })
            }
            _ => Err(malformed_error!(
                "Constant pool entry {} is not a MethodHandle",
                index
            )),
        }
    }

    /// Bootstrap call described by an `InvokeDynamic` or `Dynamic` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry or its bootstrap method is invalid.
    pub fn dynamic_call(&self, index: u16, bootstrap: &BootstrapTable) -> Result<DynamicCall> {
        self.dynamic_call_at_depth(index, bootstrap, 0)
    }

    fn dynamic_call_at_depth(
        &self,
        index: u16,
        bootstrap: &BootstrapTable,
        depth: usize,
    ) -> Result<DynamicCall> {
        if depth > 32 {
            return Err(malformed_error!("Dynamic constants nested too deeply"));
        }

        let (bsm, name_and_type) = match self.get(index)? {
            PoolEntry::Dynamic {
                bootstrap,
                name_and_type,
            }
            | PoolEntry::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => (*bootstrap, *name_and_type),
            _ => {
                return Err(malformed_error!(
                    "Constant pool entry {} is not dynamic",
                    index
                ))
            }
        };

        let method = bootstrap
            .get(bsm)
            .ok_or_else(|| malformed_error!("Invalid bootstrap method index {}", bsm))?;
        let (name, desc) = self.name_and_type(name_and_type)?;
        let args = method
            .args
            .iter()
            .map(|arg| self.constant_at_depth(*arg, bootstrap, depth + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(DynamicCall {
            name: name.to_string(),
            desc: desc.to_string(),
            bootstrap: self.handle(method.handle)?,
            args,
        })
    }

    /// Loadable constant at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not loadable.
    pub fn constant(&self, index: u16, bootstrap: &BootstrapTable) -> Result<Constant> {
        self.constant_at_depth(index, bootstrap, 0)
    }

    fn constant_at_depth(&self, index: u16, bootstrap: &BootstrapTable, depth: usize) -> Result<Constant> {
        Ok(match self.get(index)? {
            PoolEntry::Integer(value) => Constant::Int(*value),
            PoolEntry::Float(bits) => Constant::Float(f32::from_bits(*bits)),
            PoolEntry::Long(value) => Constant::Long(*value),
            PoolEntry::Double(bits) => Constant::Double(f64::from_bits(*bits)),
            PoolEntry::String(value) => Constant::String(self.utf8(*value)?.to_string()),
            PoolEntry::Class(name) => Constant::Class(self.utf8(*name)?.to_string()),
            PoolEntry::MethodType(desc) => Constant::MethodType(self.utf8(*desc)?.to_string()),
            PoolEntry::MethodHandle { .. } => Constant::Handle(self.handle(index)?),
            PoolEntry::Dynamic { .. } => Constant::Dynamic(Box::new(
                self.dynamic_call_at_depth(index, bootstrap, depth)?,
            )),
            _ => {
                return Err(malformed_error!(
                    "Constant pool entry {} is not loadable",
                    index
                ))
            }
        })
    }

    /// Index of `entry`, appending it if absent.
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] if the pool would exceed 65535 slots.
    pub fn add(&mut self, entry: PoolEntry) -> Result<u16> {
        if let Some(index) = self.lookup.get(&entry) {
            return Ok(*index);
        }

        let needed = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            return Err(Error::Encoding("Constant pool overflow".to_string()));
        }

        let index = self.entries.len() as u16;
        let wide = entry.is_wide();
        self.lookup.insert(entry.clone(), index);
        self.entries.push(entry);
        if wide {
            self.entries.push(PoolEntry::Unusable);
        }
        Ok(index)
    }

    /// Add a `CONSTANT_Utf8`
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool overflow.
    pub fn add_utf8(&mut self, text: &str) -> Result<u16> {
        self.add(PoolEntry::Utf8(text.to_string()))
    }

    /// Add a `CONSTANT_Class`
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool overflow.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        self.add(PoolEntry::Class(name))
    }

    /// Add a `CONSTANT_NameAndType`
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool overflow.
    pub fn add_name_and_type(&mut self, name: &str, desc: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let desc = self.add_utf8(desc)?;
        self.add(PoolEntry::NameAndType { name, desc })
    }

    /// Add a `CONSTANT_Fieldref`
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool overflow.
    pub fn add_field_ref(&mut self, member: &MemberRef) -> Result<u16> {
        let class = self.add_class(&member.owner)?;
        let name_and_type = self.add_name_and_type(&member.name, &member.desc)?;
        self.add(PoolEntry::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Add a `CONSTANT_Methodref` or `CONSTANT_InterfaceMethodref`
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool overflow.
    pub fn add_method_ref(&mut self, member: &MemberRef, interface: bool) -> Result<u16> {
        let class = self.add_class(&member.owner)?;
        let name_and_type = self.add_name_and_type(&member.name, &member.desc)?;
        if interface {
            self.add(PoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            })
        } else {
            self.add(PoolEntry::MethodRef {
                class,
                name_and_type,
            })
        }
    }

    /// Add a `CONSTANT_MethodHandle` and the reference it points to
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool overflow.
    pub fn add_handle(&mut self, handle: &Handle) -> Result<u16> {
        let member = MemberRef::new(&handle.owner, &handle.name, &handle.desc);
        let reference = if handle.tag <= crate::assembly::opcodes::H_PUTSTATIC {
            self.add_field_ref(&member)?
        } else {
            self.add_method_ref(&member, handle.interface)?
        };
        self.add(PoolEntry::MethodHandle {
            kind: handle.tag,
            reference,
        })
    }

    /// Add the bootstrap method of `call` to `bootstrap` and return the bootstrap index and
    /// name-and-type index.
    fn add_bootstrap(&mut self, call: &DynamicCall, bootstrap: &mut BootstrapTable) -> Result<(u16, u16)> {
        let handle = self.add_handle(&call.bootstrap)?;
        let args = call
            .args
            .iter()
            .map(|arg| self.add_constant(arg, bootstrap))
            .collect::<Result<Vec<_>>>()?;
        let bsm = bootstrap.add(BootstrapMethod { handle, args })?;
        let name_and_type = self.add_name_and_type(&call.name, &call.desc)?;
        Ok((bsm, name_and_type))
    }

    /// Add a `CONSTANT_InvokeDynamic` for `call`
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool or bootstrap table overflow.
    pub fn add_invoke_dynamic(&mut self, call: &DynamicCall, bootstrap: &mut BootstrapTable) -> Result<u16> {
        let (bootstrap, name_and_type) = self.add_bootstrap(call, bootstrap)?;
        self.add(PoolEntry::InvokeDynamic {
            bootstrap,
            name_and_type,
        })
    }

    /// Add a loadable constant
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] on pool or bootstrap table overflow.
    pub fn add_constant(&mut self, constant: &Constant, bootstrap: &mut BootstrapTable) -> Result<u16> {
        match constant {
            Constant::Int(value) => self.add(PoolEntry::Integer(*value)),
            Constant::Float(value) => self.add(PoolEntry::Float(value.to_bits())),
            Constant::Long(value) => self.add(PoolEntry::Long(*value)),
            Constant::Double(value) => self.add(PoolEntry::Double(value.to_bits())),
            Constant::String(value) => {
                let text = self.add_utf8(value)?;
                self.add(PoolEntry::String(text))
            }
            Constant::Class(name) => self.add_class(name),
            Constant::MethodType(desc) => {
                let desc = self.add_utf8(desc)?;
                self.add(PoolEntry::MethodType(desc))
            }
            Constant::Handle(handle) => self.add_handle(handle),
            Constant::Dynamic(call) => {
                let (bootstrap, name_and_type) = self.add_bootstrap(call, bootstrap)?;
                self.add(PoolEntry::Dynamic {
                    bootstrap,
                    name_and_type,
                })
            }
        }
    }

    /// Encode `constant_pool_count` and all entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] if a string constant exceeds 65535 encoded bytes.
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        out.put(count(self.entries.len(), "constant pool entries")?);
        for entry in &self.entries {
            match entry {
                PoolEntry::Unusable => {}
                PoolEntry::Utf8(text) => {
                    let bytes = cesu8::to_java_cesu8(text);
                    out.put(tag::UTF8);
                    out.put(count(bytes.len(), "string constant bytes")?);
                    out.put_bytes(&bytes);
                }
                PoolEntry::Integer(value) => {
                    out.put(tag::INTEGER);
                    out.put(*value);
                }
                PoolEntry::Float(bits) => {
                    out.put(tag::FLOAT);
                    out.put(*bits);
                }
                PoolEntry::Long(value) => {
                    out.put(tag::LONG);
                    out.put(*value);
                }
                PoolEntry::Double(bits) => {
                    out.put(tag::DOUBLE);
                    out.put(*bits);
                }
                PoolEntry::Class(name) => {
                    out.put(tag::CLASS);
                    out.put(*name);
                }
                PoolEntry::String(value) => {
                    out.put(tag::STRING);
                    out.put(*value);
                }
                PoolEntry::FieldRef {
                    class,
                    name_and_type,
                } => {
                    out.put(tag::FIELD_REF);
                    out.put(*class);
                    out.put(*name_and_type);
                }
                PoolEntry::MethodRef {
                    class,
                    name_and_type,
                } => {
                    out.put(tag::METHOD_REF);
                    out.put(*class);
                    out.put(*name_and_type);
                }
                PoolEntry::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    out.put(tag::INTERFACE_METHOD_REF);
                    out.put(*class);
                    out.put(*name_and_type);
                }
                PoolEntry::NameAndType { name, desc } => {
                    out.put(tag::NAME_AND_TYPE);
                    out.put(*name);
                    out.put(*desc);
                }
                PoolEntry::MethodHandle { kind, reference } => {
                    out.put(tag::METHOD_HANDLE);
                    out.put(*kind);
                    out.put(*reference);
                }
                PoolEntry::MethodType(desc) => {
                    out.put(tag::METHOD_TYPE);
                    out.put(*desc);
                }
                PoolEntry::Dynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.put(tag::DYNAMIC);
                    out.put(*bootstrap);
                    out.put(*name_and_type);
                }
                PoolEntry::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                } => {
                    out.put(tag::INVOKE_DYNAMIC);
                    out.put(*bootstrap);
                    out.put(*name_and_type);
                }
                PoolEntry::Module(name) => {
                    out.put(tag::MODULE);
                    out.put(*name);
                }
                PoolEntry::Package(name) => {
                    out.put(tag::PACKAGE);
                    out.put(*name);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes;

    fn reparse(pool: &ConstantPool) -> ConstantPool {
        let mut out = ByteWriter::new();
        pool.write(&mut out).unwrap();
        let bytes = out.into_inner();
        let mut parser = Parser::new(&bytes);
        ConstantPool::parse(&mut parser).unwrap()
    }

    #[test]
    fn appends_are_deduplicated() {
        let mut pool = ConstantPool::new();
        let a = pool.add_class("java/lang/Object").unwrap();
        let b = pool.add_class("java/lang/Object").unwrap();
        assert_eq!(a, b);
        // Utf8 + Class
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let mut bootstrap = BootstrapTable::default();
        let long = pool.add_constant(&Constant::Long(7), &mut bootstrap).unwrap();
        let int = pool.add_constant(&Constant::Int(7), &mut bootstrap).unwrap();
        assert_eq!(long, 1);
        assert_eq!(int, 3);
        assert!(pool.get(2).is_err());

        let parsed = reparse(&pool);
        assert_eq!(parsed.constant(1, &bootstrap).unwrap(), Constant::Long(7));
        assert_eq!(parsed.constant(3, &bootstrap).unwrap(), Constant::Int(7));
    }

    #[test]
    fn member_refs_resolve() {
        let mut pool = ConstantPool::new();
        let member = MemberRef::new("a/B", "run", "()V");
        let index = pool.add_method_ref(&member, true).unwrap();
        let parsed = reparse(&pool);
        let (resolved, interface) = parsed.member_ref(index).unwrap();
        assert_eq!(resolved, member);
        assert!(interface);
    }

    #[test]
    fn modified_utf8_roundtrip() {
        let mut pool = ConstantPool::new();
        let text = "nul\u{0}and\u{1F600}";
        let index = pool.add_utf8(text).unwrap();
        let parsed = reparse(&pool);
        assert_eq!(parsed.utf8(index).unwrap(), text);
    }

    #[test]
    fn dynamic_constants_use_bootstrap_table() {
        let mut pool = ConstantPool::new();
        let mut bootstrap = BootstrapTable::default();
        let call = DynamicCall {
            name: "value".to_string(),
            desc: "I".to_string(),
            bootstrap: Handle {
                tag: opcodes::H_INVOKESTATIC,
                owner: "a/Boot".to_string(),
                name: "bsm".to_string(),
                desc: "()I".to_string(),
                interface: false,
            },
            args: vec![Constant::String("x".to_string())],
        };
        let constant = Constant::Dynamic(Box::new(call));
        let index = pool.add_constant(&constant, &mut bootstrap).unwrap();
        assert_eq!(bootstrap.len(), 1);
        assert_eq!(pool.add_constant(&constant, &mut bootstrap).unwrap(), index);
        assert_eq!(bootstrap.len(), 1);

        let mut out = ByteWriter::new();
        bootstrap.write(&mut out).unwrap();
        let table = BootstrapTable::parse(out.as_slice()).unwrap();
        let parsed = reparse(&pool);
        assert_eq!(parsed.constant(index, &table).unwrap(), constant);
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        let mut parser = Parser::new(&bytes);
        assert!(matches!(
            ConstantPool::parse(&mut parser),
            Err(Error::Malformed { .. })
        ));
    }
}
