//! JVM instruction representation and operand types.
//!
//! This module defines the strongly-typed form of a decoded method body element. Every node of an
//! [`crate::assembly::InstructionSequence`] holds one [`crate::assembly::instruction::Instruction`],
//! which is either a real opcode with its [`crate::assembly::instruction::Operand`], or one of the
//! pseudo-instructions that anchor positional metadata (labels, line numbers, stack map frames).
//!
//! # Key Components
//!
//! - [`crate::assembly::instruction::Instruction`] - One element of a method body
//! - [`crate::assembly::instruction::Operand`] - Type-safe operand payload of a real opcode
//! - [`crate::assembly::instruction::Constant`] - Loadable constants (`ldc`, bootstrap arguments)
//! - [`crate::assembly::instruction::MemberRef`] - Symbolic field or method reference
//! - [`crate::assembly::instruction::Label`] - Position marker used by branches and metadata
//! - [`crate::assembly::instruction::Frame`] - Stack map frame anchored at a label
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::assembly::{opcodes, Instruction, MemberRef, Operand};
//!
//! let call = Instruction::method(
//!     opcodes::INVOKEVIRTUAL,
//!     "java/io/PrintStream",
//!     "println",
//!     "(Ljava/lang/String;)V",
//!     false,
//! );
//! assert_eq!(call.opcode(), Some(opcodes::INVOKEVIRTUAL));
//!
//! if let Some(Operand::Method { member, .. }) = call.operand() {
//!     assert_eq!(member, &MemberRef::new("java/io/PrintStream", "println", "(Ljava/lang/String;)V"));
//! }
//! ```
//!
//! # Short Forms
//!
//! Instructions are always stored in their general form: `iload_1` is `ILOAD` with
//! `Operand::Var(1)`, `ldc_w` and `ldc2_w` are `LDC`, `goto_w` is `GOTO`. The class writer
//! picks the most compact encoding again when the method is written out.

use std::fmt;

use crate::assembly::opcodes;

/// Position marker within an [`crate::assembly::InstructionSequence`].
///
/// Labels are allocated by the owning sequence through
/// [`crate::assembly::InstructionSequence::new_label`] and become a position once an
/// [`Instruction::Label`] holding them is inserted. Branch operands, exception ranges, line
/// numbers and local variable scopes refer to labels rather than to byte offsets, so inserting
/// or removing instructions never invalidates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Symbolic reference to a field or method: owner internal name, member name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Internal name of the declaring class, e.g. `java/lang/String`
    pub owner: String,
    /// Simple member name
    pub name: String,
    /// Field or method descriptor
    pub desc: String,
}

impl MemberRef {
    /// Create a new member reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        MemberRef {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.desc)
    }
}

/// A `CONSTANT_MethodHandle`: a reference kind plus the member it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Reference kind, one of the `H_*` constants in [`crate::assembly::opcodes`]
    pub tag: u8,
    /// Internal name of the owner class
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub desc: String,
    /// Whether the owner is an interface
    pub interface: bool,
}

/// A bootstrap method invocation, shared by `invokedynamic` and dynamically-computed constants.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicCall {
    /// Name passed to the bootstrap method
    pub name: String,
    /// Method descriptor for `invokedynamic`, field descriptor for a dynamic constant
    pub desc: String,
    /// The bootstrap method
    pub bootstrap: Handle,
    /// Static bootstrap arguments
    pub args: Vec<Constant>,
}

/// A loadable constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `CONSTANT_Integer`
    Int(i32),
    /// `CONSTANT_Float`
    Float(f32),
    /// `CONSTANT_Long`
    Long(i64),
    /// `CONSTANT_Double`
    Double(f64),
    /// `CONSTANT_String`
    String(String),
    /// `CONSTANT_Class`, holding an internal name or array descriptor
    Class(String),
    /// `CONSTANT_MethodType`, holding a method descriptor
    MethodType(String),
    /// `CONSTANT_MethodHandle`
    Handle(Handle),
    /// `CONSTANT_Dynamic`
    Dynamic(Box<DynamicCall>),
}

impl Constant {
    /// Returns `true` for constants that occupy two stack slots (`long`, `double`, and
    /// dynamic constants of those types).
    #[must_use]
    pub fn is_wide(&self) -> bool {
        match self {
            Constant::Long(_) | Constant::Double(_) => true,
            Constant::Dynamic(call) => matches!(call.desc.as_str(), "J" | "D"),
            _ => false,
        }
    }
}

/// Operand payload of a real opcode.
///
/// The variant is determined by the opcode; constructing an instruction with a mismatching
/// operand is rejected by the class writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand (`iadd`, `return`, `athrow`, ...)
    None,
    /// Immediate integer: `bipush`, `sipush` values and `newarray` element type codes
    Int(i32),
    /// Local variable index (`iload`, `astore`, `ret`, ...)
    Var(u16),
    /// `iinc` local variable index and increment
    Iinc {
        /// Local variable index
        var: u16,
        /// Signed increment
        incr: i16,
    },
    /// Class internal name or array descriptor (`new`, `anewarray`, `checkcast`, `instanceof`)
    Type(String),
    /// Field reference of a field access
    Field(MemberRef),
    /// Method reference of an invoke
    Method {
        /// The invoked method
        member: MemberRef,
        /// Whether the owner is an interface
        interface: bool,
    },
    /// Call site of an `invokedynamic`
    InvokeDynamic(Box<DynamicCall>),
    /// Branch target
    Jump(Label),
    /// Constant loaded by `ldc`
    Ldc(Constant),
    /// `tableswitch` jump table
    TableSwitch {
        /// Target for keys outside `low..=high`
        default: Label,
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// One target per key in `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch` jump table, sorted by key
    LookupSwitch {
        /// Target for keys without a match
        default: Label,
        /// Key / target pairs
        pairs: Vec<(i32, Label)>,
    },
    /// `multianewarray` array descriptor and dimension count
    MultiANewArray {
        /// Array type descriptor
        desc: String,
        /// Number of dimensions to allocate
        dims: u8,
    },
}

/// Verification type of a stack map frame slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// Unusable slot
    Top,
    /// `int`, `short`, `char`, `byte`, `boolean`
    Integer,
    /// `float`
    Float,
    /// `long`, occupying one entry but two local or stack slots
    Long,
    /// `double`, occupying one entry but two local or stack slots
    Double,
    /// The `null` reference
    Null,
    /// `this` inside a constructor before the super constructor ran
    UninitializedThis,
    /// Reference to an instance of the named class or array descriptor
    Object(String),
    /// Result of the `new` instruction that follows the given label
    Uninitialized(Label),
}

impl VerificationType {
    /// Returns `true` for `long` and `double`
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, VerificationType::Long | VerificationType::Double)
    }
}

/// A stack map frame, stored as the complete local and operand stack state at its position.
///
/// Compressed frame encodings (`same`, `chop`, `append`, ...) are expanded by the class reader;
/// the class writer always emits full frames.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Local variable types, one entry per `long`/`double`
    pub locals: Vec<VerificationType>,
    /// Operand stack types, bottom first, one entry per `long`/`double`
    pub stack: Vec<VerificationType>,
}

/// One element of a method body.
///
/// Only [`Instruction::Op`] is an executable instruction; the other variants are
/// pseudo-instructions without an opcode that anchor metadata at a position.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Position marker
    Label(Label),
    /// Source line number starting at the given label
    Line {
        /// Source line
        line: u16,
        /// Label the line starts at
        start: Label,
    },
    /// Stack map frame valid at the position of this node
    Frame(Frame),
    /// Executable instruction
    Op {
        /// The opcode, always in its general form
        opcode: u8,
        /// The operand payload
        operand: Operand,
    },
}

impl Instruction {
    /// Instruction without operand
    #[must_use]
    pub fn simple(opcode: u8) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::None,
        }
    }

    /// `bipush`, `sipush` or `newarray`
    #[must_use]
    pub fn int(opcode: u8, value: i32) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::Int(value),
        }
    }

    /// Local variable load, store or `ret`
    #[must_use]
    pub fn var(opcode: u8, var: u16) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::Var(var),
        }
    }

    /// `new`, `anewarray`, `checkcast` or `instanceof`
    pub fn type_insn(opcode: u8, name: impl Into<String>) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::Type(name.into()),
        }
    }

    /// Field access
    pub fn field(
        opcode: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
    ) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::Field(MemberRef::new(owner, name, desc)),
        }
    }

    /// Method invocation
    pub fn method(
        opcode: u8,
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: impl Into<String>,
        interface: bool,
    ) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::Method {
                member: MemberRef::new(owner, name, desc),
                interface,
            },
        }
    }

    /// Branch to `target`
    #[must_use]
    pub fn jump(opcode: u8, target: Label) -> Self {
        Instruction::Op {
            opcode,
            operand: Operand::Jump(target),
        }
    }

    /// `ldc` of a constant
    #[must_use]
    pub fn ldc(constant: Constant) -> Self {
        Instruction::Op {
            opcode: opcodes::LDC,
            operand: Operand::Ldc(constant),
        }
    }

    /// The opcode, or `None` for pseudo-instructions
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Instruction::Op { opcode, .. } => Some(*opcode),
            _ => None,
        }
    }

    /// The operand, or `None` for pseudo-instructions
    #[must_use]
    pub fn operand(&self) -> Option<&Operand> {
        match self {
            Instruction::Op { operand, .. } => Some(operand),
            _ => None,
        }
    }

    /// Returns `true` for labels, line numbers and frames
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        !matches!(self, Instruction::Op { .. })
    }

    /// The label of an [`Instruction::Label`]
    #[must_use]
    pub fn as_label(&self) -> Option<Label> {
        match self {
            Instruction::Label(label) => Some(*label),
            _ => None,
        }
    }

    /// The member reference of a field access or method invocation
    #[must_use]
    pub fn member(&self) -> Option<&MemberRef> {
        match self {
            Instruction::Op {
                operand: Operand::Field(member) | Operand::Method { member, .. },
                ..
            } => Some(member),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(label) => write!(f, "{}:", label),
            Instruction::Line { line, start } => write!(f, "LINE {} {}", line, start),
            Instruction::Frame(frame) => write!(
                f,
                "FRAME locals={} stack={}",
                frame.locals.len(),
                frame.stack.len()
            ),
            Instruction::Op { opcode, operand } => {
                let name = opcodes::opcode_name(i32::from(*opcode));
                match operand {
                    Operand::None => write!(f, "{}", name),
                    Operand::Int(value) => write!(f, "{} {}", name, value),
                    Operand::Var(var) => write!(f, "{} {}", name, var),
                    Operand::Iinc { var, incr } => write!(f, "{} {} {}", name, var, incr),
                    Operand::Type(ty) => write!(f, "{} {}", name, ty),
                    Operand::Field(member) | Operand::Method { member, .. } => {
                        write!(f, "{} {}", name, member)
                    }
                    Operand::InvokeDynamic(call) => {
                        write!(f, "{} {}{}", name, call.name, call.desc)
                    }
                    Operand::Jump(label) => write!(f, "{} {}", name, label),
                    Operand::Ldc(constant) => write!(f, "{} {:?}", name, constant),
                    Operand::TableSwitch { low, high, .. } => {
                        write!(f, "{} {}..={}", name, low, high)
                    }
                    Operand::LookupSwitch { pairs, .. } => {
                        write!(f, "{} [{} keys]", name, pairs.len())
                    }
                    Operand::MultiANewArray { desc, dims } => {
                        write!(f, "{} {} {}", name, desc, dims)
                    }
                }
            }
        }
    }
}
