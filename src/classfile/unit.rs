//! The decoded form of one class: [`crate::classfile::unit::ClassUnit`] and its members.
//!
//! A `ClassUnit` is what transform rules receive. Everything a rule is expected to edit is
//! decoded (method bodies, annotations, member lists); everything else stays in raw attribute
//! form and is written back byte for byte, which is valid because the writer keeps the
//! original constant pool indices stable.

use bitflags::bitflags;

use crate::{
    assembly::{InstructionSequence, Label},
    classfile::{
        annotation::{Annotation, Annotations},
        constpool::{BootstrapTable, ConstantPool},
        reader::{ClassReader, ReaderFlags},
        writer::{ClassWriter, EncodeFlags},
    },
    Result,
};

bitflags! {
    /// Class access and property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared final
        const FINAL = 0x0010;
        /// Treat superclass methods specially in `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Is an annotation interface
        const ANNOTATION = 0x2000;
        /// Is an enum class
        const ENUM = 0x4000;
        /// Is a module
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// Method access and property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MethodAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared synchronized
        const SYNCHRONIZED = 0x0020;
        /// Compiler generated bridge method
        const BRIDGE = 0x0040;
        /// Variable arity
        const VARARGS = 0x0080;
        /// Declared native
        const NATIVE = 0x0100;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Declared strictfp
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// Field access and property flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared volatile
        const VOLATILE = 0x0040;
        /// Declared transient
        const TRANSIENT = 0x0080;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Element of an enum class
        const ENUM = 0x4000;
    }
}

/// An attribute kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute body, without the name index and length
    pub data: Vec<u8>,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUnit {
    /// Access flags
    pub access: FieldAccess,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub desc: String,
    /// All attributes, raw
    pub attributes: Vec<RawAttribute>,
}

/// One exception table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// Start of the protected range, inclusive
    pub start: Label,
    /// End of the protected range, exclusive
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Caught class, `None` for `finally`
    pub catch_type: Option<String>,
}

/// A `LocalVariableTable` entry, merged with its `LocalVariableTypeTable` signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    /// Variable name
    pub name: String,
    /// Field descriptor
    pub desc: String,
    /// Generic signature, if any
    pub signature: Option<String>,
    /// Scope start, inclusive
    pub start: Label,
    /// Scope end, exclusive
    pub end: Label,
    /// Local variable slot
    pub index: u16,
}

/// A decoded `Code` attribute.
#[derive(Debug, Clone, Default)]
pub struct Code {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// The method body
    pub instructions: InstructionSequence,
    /// Exception table, in priority order
    pub try_catch: Vec<TryCatchBlock>,
    /// Local variable debug information
    pub locals: Vec<LocalVariable>,
}

/// A method declaration.
#[derive(Debug, Clone)]
pub struct MethodUnit {
    /// Access flags
    pub access: MethodAccess,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub desc: String,
    /// Decoded annotations
    pub annotations: Annotations,
    /// Decoded body; `None` for abstract and native methods, or when code was not decoded
    pub code: Option<Code>,
    /// Remaining attributes, raw
    pub attributes: Vec<RawAttribute>,
}

impl MethodUnit {
    /// Create a method without body or attributes
    pub fn new(access: MethodAccess, name: impl Into<String>, desc: impl Into<String>) -> Self {
        MethodUnit {
            access,
            name: name.into(),
            desc: desc.into(),
            annotations: Annotations::default(),
            code: None,
            attributes: Vec::new(),
        }
    }

    /// Returns `true` if an annotation of type `desc` is present
    #[must_use]
    pub fn has_annotation(&self, desc: &str) -> bool {
        self.annotations.has(desc)
    }

    /// Every annotation of type `desc`
    #[must_use]
    pub fn annotations_of(&self, desc: &str) -> Vec<&Annotation> {
        self.annotations.all(desc)
    }

    /// Append annotations
    pub fn add_annotations<I>(&mut self, visible: bool, annotations: I)
    where
        I: IntoIterator<Item = Annotation>,
    {
        self.annotations.add(visible, annotations);
    }

    /// Remove annotations of type `desc`; returns `true` if any were removed
    pub fn remove_annotations(&mut self, desc: &str) -> bool {
        self.annotations.remove_type(desc)
    }
}

/// The decoded form of one class.
#[derive(Debug, Clone)]
pub struct ClassUnit {
    /// Minor class file version
    pub minor_version: u16,
    /// Major class file version
    pub major_version: u16,
    /// Access flags
    pub access: ClassAccess,
    /// Internal name
    pub name: String,
    /// Superclass internal name, `None` only for `java/lang/Object` and modules
    pub super_name: Option<String>,
    /// Implemented interfaces
    pub interfaces: Vec<String>,
    /// Field declarations
    pub fields: Vec<FieldUnit>,
    /// Method declarations
    pub methods: Vec<MethodUnit>,
    /// Decoded class annotations
    pub annotations: Annotations,
    /// Remaining class attributes, raw
    pub attributes: Vec<RawAttribute>,
    pub(crate) pool: ConstantPool,
    pub(crate) bootstrap: BootstrapTable,
}

impl ClassUnit {
    /// Create an empty class with a fresh constant pool
    pub fn new(
        major_version: u16,
        access: ClassAccess,
        name: impl Into<String>,
        super_name: Option<String>,
    ) -> Self {
        ClassUnit {
            minor_version: 0,
            major_version,
            access,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Annotations::default(),
            attributes: Vec::new(),
            pool: ConstantPool::new(),
            bootstrap: BootstrapTable::default(),
        }
    }

    /// Decode class file bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`], [`crate::Error::OutOfBounds`] or
    /// [`crate::Error::NotSupported`] if the bytes are not a readable class file.
    pub fn parse(bytes: &[u8], flags: ReaderFlags) -> Result<Self> {
        ClassReader::new(bytes)?.read(flags)
    }

    /// Encode back into class file bytes with the default type hierarchy.
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] if the class can not be represented, for example
    /// because a branch no longer fits its offset encoding.
    pub fn to_bytes(&self, flags: EncodeFlags) -> Result<Vec<u8>> {
        ClassWriter::new().encode(self, flags)
    }

    /// The original constant pool this class was read from
    #[must_use]
    pub fn constant_pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Method with the given name and descriptor
    #[must_use]
    pub fn find_method(&self, name: &str, desc: &str) -> Option<&MethodUnit> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.desc == desc)
    }

    /// Mutable access to the method with the given name and descriptor
    pub fn find_method_mut(&mut self, name: &str, desc: &str) -> Option<&mut MethodUnit> {
        self.methods
            .iter_mut()
            .find(|method| method.name == name && method.desc == desc)
    }

    /// Returns `true` if a class annotation of type `desc` is present
    #[must_use]
    pub fn has_annotation(&self, desc: &str) -> bool {
        self.annotations.has(desc)
    }

    /// Every class annotation of type `desc`
    #[must_use]
    pub fn annotations_of(&self, desc: &str) -> Vec<&Annotation> {
        self.annotations.all(desc)
    }

    /// Append class annotations
    pub fn add_annotations<I>(&mut self, visible: bool, annotations: I)
    where
        I: IntoIterator<Item = Annotation>,
    {
        self.annotations.add(visible, annotations);
    }

    /// Remove class annotations of type `desc`; returns `true` if any were removed
    pub fn remove_annotations(&mut self, desc: &str) -> bool {
        self.annotations.remove_type(desc)
    }
}
