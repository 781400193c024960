//! Class file decoder.
//!
//! [`crate::classfile::reader::ClassReader`] parses the header and constant pool eagerly in
//! [`ClassReader::new`], which is enough to answer cheap questions about a class (its name,
//! its class-level annotation types) without decoding any method bodies. [`ClassReader::read`]
//! then produces the full [`crate::classfile::ClassUnit`].
//!
//! # Code decoding
//!
//! Method bodies are decoded in two passes. The first pass walks the bytecode and turns every
//! branch target, exception range boundary, line number start, local variable scope and stack
//! map frame offset into a [`crate::assembly::Label`]. The second pass builds the
//! [`crate::assembly::InstructionSequence`], placing at each offset its label, then its line
//! numbers, then its frame, then the instruction itself.
//!
//! Short forms are normalised: `iload_1` becomes `iload 1`, `ldc_w` becomes `ldc`, `goto_w`
//! becomes `goto`, and `wide` disappears into the operand width.
//!
//! # Stack map frames
//!
//! Compressed frame encodings are expanded against the previous frame, starting from the
//! implicit frame derived from the method descriptor, so every
//! [`crate::assembly::Instruction::Frame`] holds the complete state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bitflags::bitflags;
use tracing::debug;

use crate::{
    assembly::{
        opcodes::*, Frame, Instruction, InstructionSequence, Label, Operand, VerificationType,
    },
    classfile::{
        annotation::{annotation_types, parse_annotations, RUNTIME_INVISIBLE, RUNTIME_VISIBLE},
        constpool::{BootstrapTable, ConstantPool},
        descriptor::MethodType,
        unit::{
            ClassAccess, ClassUnit, Code, FieldAccess, FieldUnit, LocalVariable, MethodAccess,
            MethodUnit, RawAttribute, TryCatchBlock,
        },
    },
    file::Parser,
    Error, Result,
};

/// `0xCAFEBABE`
pub const MAGIC: u32 = 0xCAFE_BABE;
/// Oldest supported major version (JDK 1.1)
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Newest supported major version (Java 25)
pub const MAX_MAJOR_VERSION: u16 = 69;

bitflags! {
    /// Parts of a class file the reader leaves out
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReaderFlags: u32 {
        /// Keep `Code` attributes raw instead of decoding them
        const SKIP_CODE = 0x0001;
        /// Drop `LineNumberTable`, `LocalVariableTable`, `LocalVariableTypeTable`,
        /// `SourceFile` and `SourceDebugExtension`
        const SKIP_DEBUG = 0x0002;
        /// Drop `StackMapTable`
        const SKIP_FRAMES = 0x0004;
    }
}

/// One attribute as it appears in the class file: name and body.
struct AttributeSlice<'r> {
    name: &'r str,
    data: &'r [u8],
}

/// A method whose body has not been decoded yet.
struct PendingMethod<'r> {
    access: MethodAccess,
    name: &'r str,
    desc: &'r str,
    attributes: Vec<AttributeSlice<'r>>,
}

/// Header-parsed view of one class file.
pub struct ClassReader<'a> {
    data: &'a [u8],
    minor_version: u16,
    major_version: u16,
    pool: ConstantPool,
    body: usize,
}

impl<'a> ClassReader<'a> {
    /// Parse magic, version and constant pool.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input,
    /// [`crate::Error::Malformed`] on a bad magic number or pool, and
    /// [`crate::Error::NotSupported`] for class file versions outside the supported range.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let magic = parser.read_be::<u32>()?;
        if magic != MAGIC {
            return Err(malformed_error!("Invalid magic number 0x{:08X}", magic));
        }

        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
            return Err(Error::NotSupported(format!(
                "class file version {}.{}",
                major_version, minor_version
            )));
        }

        let pool = ConstantPool::parse(&mut parser)?;
        Ok(ClassReader {
            data,
            minor_version,
            major_version,
            pool,
            body: parser.pos(),
        })
    }

    /// Major class file version
    #[must_use]
    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    /// The parsed constant pool
    #[must_use]
    pub fn constant_pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Internal name of the class.
    ///
    /// # Errors
    /// Returns an error if `this_class` does not reference a class entry.
    pub fn class_name(&self) -> Result<&str> {
        let mut parser = Parser::new(self.data);
        parser.seek(self.body + 2)?;
        self.pool.class_name(parser.read_be()?)
    }

    /// Types of the class-level annotations, visible and invisible, without decoding any
    /// member.
    ///
    /// # Errors
    /// Returns an error if the class file structure is invalid.
    pub fn class_annotation_types(&self) -> Result<Vec<String>> {
        let mut parser = Parser::new(self.data);
        parser.seek(self.body + 6)?;
        let interfaces = parser.read_be::<u16>()?;
        parser.advance_by(usize::from(interfaces) * 2)?;

        // fields, then methods
        for _ in 0..2 {
            let count = parser.read_be::<u16>()?;
            for _ in 0..count {
                parser.advance_by(6)?;
                skip_attributes(&mut parser)?;
            }
        }

        let mut types = Vec::new();
        for attribute in self.read_attributes(&mut parser)? {
            if attribute.name == RUNTIME_VISIBLE || attribute.name == RUNTIME_INVISIBLE {
                types.extend(annotation_types(attribute.data, &self.pool)?);
            }
        }
        Ok(types)
    }

    /// Decode the complete class.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if any part of
    /// the class file is invalid.
    pub fn read(self, flags: ReaderFlags) -> Result<ClassUnit> {
        let mut parser = Parser::new(self.data);
        parser.seek(self.body)?;

        let access = ClassAccess::from_bits_retain(parser.read_be()?);
        let name = self.pool.class_name(parser.read_be()?)?.to_string();
        let super_name = self
            .pool
            .optional_class_name(parser.read_be()?)?
            .map(str::to_string);

        let interface_count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(self.pool.class_name(parser.read_be()?)?.to_string());
        }

        let field_count = parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            let access = FieldAccess::from_bits_retain(parser.read_be()?);
            let name = self.pool.utf8(parser.read_be()?)?.to_string();
            let desc = self.pool.utf8(parser.read_be()?)?.to_string();
            let attributes = self
                .read_attributes(&mut parser)?
                .into_iter()
                .map(AttributeSlice::into_raw)
                .collect();
            fields.push(FieldUnit {
                access,
                name,
                desc,
                attributes,
            });
        }

        let method_count = parser.read_be::<u16>()?;
        let mut pending = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            let access = MethodAccess::from_bits_retain(parser.read_be()?);
            let name = self.pool.utf8(parser.read_be()?)?;
            let desc = self.pool.utf8(parser.read_be()?)?;
            let attributes = self.read_attributes(&mut parser)?;
            pending.push(PendingMethod {
                access,
                name,
                desc,
                attributes,
            });
        }

        let mut class = ClassUnit::new(self.major_version, access, name, super_name);
        class.minor_version = self.minor_version;
        class.interfaces = interfaces;
        class.fields = fields;

        for attribute in self.read_attributes(&mut parser)? {
            match attribute.name {
                "BootstrapMethods" => class.bootstrap = BootstrapTable::parse(attribute.data)?,
                RUNTIME_VISIBLE => class
                    .annotations
                    .visible
                    .extend(parse_annotations(attribute.data, &self.pool)?),
                RUNTIME_INVISIBLE => class
                    .annotations
                    .invisible
                    .extend(parse_annotations(attribute.data, &self.pool)?),
                "SourceFile" | "SourceDebugExtension" if flags.contains(ReaderFlags::SKIP_DEBUG) => {}
                _ => class.attributes.push(attribute.into_raw()),
            }
        }

        if parser.has_more_data() {
            return Err(malformed_error!("Trailing data after class attributes"));
        }

        let mut methods = Vec::with_capacity(pending.len());
        for method in pending {
            methods.push(self.read_method(&class, method, flags)?);
        }
        class.methods = methods;
        class.pool = self.pool;

        Ok(class)
    }

    fn read_attributes<'r>(&'r self, parser: &mut Parser<'a>) -> Result<Vec<AttributeSlice<'r>>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name = self.pool.utf8(parser.read_be()?)?;
            let length = parser.read_be::<u32>()? as usize;
            let data = parser.read_bytes(length)?;
            attributes.push(AttributeSlice { name, data });
        }
        Ok(attributes)
    }

    fn read_method(
        &self,
        class: &ClassUnit,
        pending: PendingMethod<'_>,
        flags: ReaderFlags,
    ) -> Result<MethodUnit> {
        let mut method = MethodUnit::new(pending.access, pending.name, pending.desc);
        for attribute in pending.attributes {
            match attribute.name {
                "Code" if !flags.contains(ReaderFlags::SKIP_CODE) => {
                    let mut decoder = CodeDecoder {
                        pool: &self.pool,
                        bootstrap: &class.bootstrap,
                        flags,
                        sequence: InstructionSequence::new(),
                        labels: BTreeMap::new(),
                    };
                    method.code = Some(decoder.decode(class, &method, attribute.data)?);
                }
                RUNTIME_VISIBLE => method
                    .annotations
                    .visible
                    .extend(parse_annotations(attribute.data, &self.pool)?),
                RUNTIME_INVISIBLE => method
                    .annotations
                    .invisible
                    .extend(parse_annotations(attribute.data, &self.pool)?),
                "MethodParameters" if flags.contains(ReaderFlags::SKIP_DEBUG) => {}
                _ => method.attributes.push(attribute.into_raw()),
            }
        }
        Ok(method)
    }
}

impl AttributeSlice<'_> {
    fn into_raw(self) -> RawAttribute {
        RawAttribute {
            name: self.name.to_string(),
            data: self.data.to_vec(),
        }
    }
}

fn skip_attributes(parser: &mut Parser<'_>) -> Result<()> {
    let count = parser.read_be::<u16>()?;
    for _ in 0..count {
        parser.advance_by(2)?;
        let length = parser.read_be::<u32>()? as usize;
        parser.advance_by(length)?;
    }
    Ok(())
}

/// Per-method state of the two-pass `Code` decoder.
struct CodeDecoder<'p> {
    pool: &'p ConstantPool,
    bootstrap: &'p BootstrapTable,
    flags: ReaderFlags,
    sequence: InstructionSequence,
    labels: BTreeMap<u32, Label>,
}

impl CodeDecoder<'_> {
    fn label(&mut self, offset: i64, code_length: usize) -> Result<Label> {
        if offset < 0 || offset > code_length as i64 {
            return Err(malformed_error!("Code offset {} outside of method body", offset));
        }
        let sequence = &mut self.sequence;
        Ok(*self
            .labels
            .entry(offset as u32)
            .or_insert_with(|| sequence.new_label()))
    }

    fn decode(&mut self, class: &ClassUnit, method: &MethodUnit, data: &[u8]) -> Result<Code> {
        let mut parser = Parser::new(data);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()? as usize;
        if code_length == 0 || code_length > 65535 {
            return Err(malformed_error!("Invalid code length {}", code_length));
        }
        let code = parser.read_bytes(code_length)?;
        let decoded = self.decode_instructions(code)?;

        let table_length = parser.read_be::<u16>()?;
        let mut try_catch = Vec::with_capacity(usize::from(table_length));
        for _ in 0..table_length {
            let start = self.label(i64::from(parser.read_be::<u16>()?), code_length)?;
            let end = self.label(i64::from(parser.read_be::<u16>()?), code_length)?;
            let handler = self.label(i64::from(parser.read_be::<u16>()?), code_length)?;
            let catch_type = self
                .pool
                .optional_class_name(parser.read_be()?)?
                .map(str::to_string);
            try_catch.push(TryCatchBlock {
                start,
                end,
                handler,
                catch_type,
            });
        }

        let mut lines: BTreeMap<u32, Vec<u16>> = BTreeMap::new();
        let mut frames: BTreeMap<u32, Frame> = BTreeMap::new();
        let mut locals = Vec::new();
        let mut signatures: HashMap<(u16, u16, u16), String> = HashMap::new();

        let attribute_count = parser.read_be::<u16>()?;
        for _ in 0..attribute_count {
            let name = self.pool.utf8(parser.read_be()?)?;
            let length = parser.read_be::<u32>()? as usize;
            let body = parser.read_bytes(length)?;
            let skip_debug = self.flags.contains(ReaderFlags::SKIP_DEBUG);
            match name {
                "LineNumberTable" if !skip_debug => {
                    let mut table = Parser::new(body);
                    let count = table.read_be::<u16>()?;
                    for _ in 0..count {
                        let start = table.read_be::<u16>()?;
                        let line = table.read_be::<u16>()?;
                        self.label(i64::from(start), code_length)?;
                        lines.entry(u32::from(start)).or_default().push(line);
                    }
                }
                "LocalVariableTable" if !skip_debug => {
                    let mut table = Parser::new(body);
                    let count = table.read_be::<u16>()?;
                    for _ in 0..count {
                        let start = table.read_be::<u16>()?;
                        let length = table.read_be::<u16>()?;
                        let name = self.pool.utf8(table.read_be()?)?.to_string();
                        let desc = self.pool.utf8(table.read_be()?)?.to_string();
                        let index = table.read_be::<u16>()?;
                        let start_label = self.label(i64::from(start), code_length)?;
                        let end_label =
                            self.label(i64::from(start) + i64::from(length), code_length)?;
                        locals.push((
                            (start, length, index),
                            LocalVariable {
                                name,
                                desc,
                                signature: None,
                                start: start_label,
                                end: end_label,
                                index,
                            },
                        ));
                    }
                }
                "LocalVariableTypeTable" if !skip_debug => {
                    let mut table = Parser::new(body);
                    let count = table.read_be::<u16>()?;
                    for _ in 0..count {
                        let start = table.read_be::<u16>()?;
                        let length = table.read_be::<u16>()?;
                        table.advance_by(2)?;
                        let signature = self.pool.utf8(table.read_be()?)?.to_string();
                        let index = table.read_be::<u16>()?;
                        signatures.insert((start, length, index), signature);
                    }
                }
                "StackMapTable" if !self.flags.contains(ReaderFlags::SKIP_FRAMES) => {
                    frames = self.decode_frames(class, method, body, code_length)?;
                }
                "LineNumberTable" | "LocalVariableTable" | "LocalVariableTypeTable"
                | "StackMapTable" => {}
                other => {
                    debug!(
                        "Dropping code attribute {} of {}.{}{}",
                        other, class.name, method.name, method.desc
                    );
                }
            }
        }

        let locals = locals
            .into_iter()
            .map(|(key, mut local)| {
                local.signature = signatures.remove(&key);
                local
            })
            .collect();

        let boundaries: BTreeSet<u32> = decoded.iter().map(|(offset, _)| *offset).collect();
        for offset in self.labels.keys() {
            if *offset as usize != code_length && !boundaries.contains(offset) {
                return Err(malformed_error!(
                    "Label at offset {} is not on an instruction boundary",
                    offset
                ));
            }
        }

        for (offset, insn) in decoded {
            self.place_metadata(offset, &mut lines, &mut frames);
            self.sequence.push_back(insn);
        }
        if let Some(label) = self.labels.get(&(code_length as u32)) {
            self.sequence.push_back(Instruction::Label(*label));
        }

        Ok(Code {
            max_stack,
            max_locals,
            instructions: std::mem::take(&mut self.sequence),
            try_catch,
            locals,
        })
    }

    fn place_metadata(
        &mut self,
        offset: u32,
        lines: &mut BTreeMap<u32, Vec<u16>>,
        frames: &mut BTreeMap<u32, Frame>,
    ) {
        let Some(label) = self.labels.get(&offset).copied() else {
            return;
        };
        self.sequence.push_back(Instruction::Label(label));
        for line in lines.remove(&offset).unwrap_or_default() {
            self.sequence
                .push_back(Instruction::Line { line, start: label });
        }
        if let Some(frame) = frames.remove(&offset) {
            self.sequence.push_back(Instruction::Frame(frame));
        }
    }

    fn decode_instructions(&mut self, code: &[u8]) -> Result<Vec<(u32, Instruction)>> {
        let length = code.len();
        let mut parser = Parser::new(code);
        let mut decoded = Vec::new();

        while parser.has_more_data() {
            let offset = parser.pos();
            let base = offset as i64;
            let opcode = parser.read_be::<u8>()?;
            let insn = match opcode {
                NOP..=DCONST_1
                | IALOAD..=SALOAD
                | IASTORE..=SASTORE
                | POP..=LXOR
                | I2L..=DCMPG
                | IRETURN..=RETURN
                | ARRAYLENGTH
                | ATHROW
                | MONITORENTER
                | MONITOREXIT => Instruction::simple(opcode),
                BIPUSH => Instruction::int(opcode, i32::from(parser.read_be::<i8>()?)),
                SIPUSH => Instruction::int(opcode, i32::from(parser.read_be::<i16>()?)),
                NEWARRAY => Instruction::int(opcode, i32::from(parser.read_be::<u8>()?)),
                LDC => {
                    let index = u16::from(parser.read_be::<u8>()?);
                    Instruction::ldc(self.pool.constant(index, self.bootstrap)?)
                }
                LDC_W | LDC2_W => {
                    let index = parser.read_be::<u16>()?;
                    Instruction::ldc(self.pool.constant(index, self.bootstrap)?)
                }
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                    Instruction::var(opcode, u16::from(parser.read_be::<u8>()?))
                }
                ILOAD_0..=ALOAD_3 => {
                    let n = opcode - ILOAD_0;
                    Instruction::var(ILOAD + n / 4, u16::from(n % 4))
                }
                ISTORE_0..=ASTORE_3 => {
                    let n = opcode - ISTORE_0;
                    Instruction::var(ISTORE + n / 4, u16::from(n % 4))
                }
                IINC => Instruction::Op {
                    opcode,
                    operand: Operand::Iinc {
                        var: u16::from(parser.read_be::<u8>()?),
                        incr: i16::from(parser.read_be::<i8>()?),
                    },
                },
                IFEQ..=JSR | IFNULL | IFNONNULL => {
                    let target = base + i64::from(parser.read_be::<i16>()?);
                    Instruction::jump(opcode, self.label(target, length)?)
                }
                GOTO_W | JSR_W => {
                    let target = base + i64::from(parser.read_be::<i32>()?);
                    let opcode = if opcode == GOTO_W { GOTO } else { JSR };
                    Instruction::jump(opcode, self.label(target, length)?)
                }
                TABLESWITCH => {
                    parser.align_from(0, 4)?;
                    let default = self.label(base + i64::from(parser.read_be::<i32>()?), length)?;
                    let low = parser.read_be::<i32>()?;
                    let high = parser.read_be::<i32>()?;
                    if high < low {
                        return Err(malformed_error!("tableswitch high {} below low {}", high, low));
                    }
                    let count = (i64::from(high) - i64::from(low) + 1) as usize;
                    if count > length {
                        return Err(malformed_error!("tableswitch with {} targets", count));
                    }
                    let mut targets = Vec::with_capacity(count);
                    for _ in 0..count {
                        targets.push(self.label(base + i64::from(parser.read_be::<i32>()?), length)?);
                    }
                    Instruction::Op {
                        opcode,
                        operand: Operand::TableSwitch {
                            default,
                            low,
                            high,
                            targets,
                        },
                    }
                }
                LOOKUPSWITCH => {
                    parser.align_from(0, 4)?;
                    let default = self.label(base + i64::from(parser.read_be::<i32>()?), length)?;
                    let count = parser.read_be::<i32>()?;
                    if count < 0 || count as usize > length {
                        return Err(malformed_error!("lookupswitch with {} pairs", count));
                    }
                    let mut pairs = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let key = parser.read_be::<i32>()?;
                        let target = self.label(base + i64::from(parser.read_be::<i32>()?), length)?;
                        pairs.push((key, target));
                    }
                    Instruction::Op {
                        opcode,
                        operand: Operand::LookupSwitch { default, pairs },
                    }
                }
                GETSTATIC..=PUTFIELD => {
                    let (member, _) = self.pool.member_ref(parser.read_be()?)?;
                    Instruction::Op {
                        opcode,
                        operand: Operand::Field(member),
                    }
                }
                INVOKEVIRTUAL..=INVOKEINTERFACE => {
                    let (member, interface) = self.pool.member_ref(parser.read_be()?)?;
                    if opcode == INVOKEINTERFACE {
                        parser.advance_by(2)?;
                    }
                    Instruction::Op {
                        opcode,
                        operand: Operand::Method { member, interface },
                    }
                }
                INVOKEDYNAMIC => {
                    let call = self.pool.dynamic_call(parser.read_be()?, self.bootstrap)?;
                    parser.advance_by(2)?;
                    Instruction::Op {
                        opcode,
                        operand: Operand::InvokeDynamic(Box::new(call)),
                    }
                }
                NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                    Instruction::type_insn(opcode, self.pool.class_name(parser.read_be()?)?)
                }
                MULTIANEWARRAY => {
                    let desc = self.pool.class_name(parser.read_be()?)?.to_string();
                    let dims = parser.read_be::<u8>()?;
                    Instruction::Op {
                        opcode,
                        operand: Operand::MultiANewArray { desc, dims },
                    }
                }
                WIDE => {
                    let widened = parser.read_be::<u8>()?;
                    match widened {
                        IINC => Instruction::Op {
                            opcode: IINC,
                            operand: Operand::Iinc {
                                var: parser.read_be::<u16>()?,
                                incr: parser.read_be::<i16>()?,
                            },
                        },
                        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                            Instruction::var(widened, parser.read_be::<u16>()?)
                        }
                        other => {
                            return Err(malformed_error!(
                                "Invalid opcode 0x{:02X} after wide at {}",
                                other,
                                offset
                            ))
                        }
                    }
                }
                other => {
                    return Err(malformed_error!(
                        "Invalid opcode 0x{:02X} at {}",
                        other,
                        offset
                    ))
                }
            };
            decoded.push((offset as u32, insn));
        }

        Ok(decoded)
    }

    fn decode_frames(
        &mut self,
        class: &ClassUnit,
        method: &MethodUnit,
        data: &[u8],
        code_length: usize,
    ) -> Result<BTreeMap<u32, Frame>> {
        let mut frames = BTreeMap::new();
        let mut current = initial_frame(class, method)?;
        let mut parser = Parser::new(data);
        let count = parser.read_be::<u16>()?;
        let mut previous: Option<u32> = None;

        for _ in 0..count {
            let kind = parser.read_be::<u8>()?;
            let delta = match kind {
                0..=63 => {
                    current.stack.clear();
                    u16::from(kind)
                }
                64..=127 => {
                    current.stack = vec![self.verification_type(&mut parser, code_length)?];
                    u16::from(kind - 64)
                }
                247 => {
                    let delta = parser.read_be::<u16>()?;
                    current.stack = vec![self.verification_type(&mut parser, code_length)?];
                    delta
                }
                248..=250 => {
                    let delta = parser.read_be::<u16>()?;
                    let chopped = usize::from(251 - kind);
                    if chopped > current.locals.len() {
                        return Err(malformed_error!("Chop frame removes too many locals"));
                    }
                    current.locals.truncate(current.locals.len() - chopped);
                    current.stack.clear();
                    delta
                }
                251 => {
                    current.stack.clear();
                    parser.read_be::<u16>()?
                }
                252..=254 => {
                    let delta = parser.read_be::<u16>()?;
                    for _ in 0..kind - 251 {
                        let local = self.verification_type(&mut parser, code_length)?;
                        current.locals.push(local);
                    }
                    current.stack.clear();
                    delta
                }
                255 => {
                    let delta = parser.read_be::<u16>()?;
                    let local_count = parser.read_be::<u16>()?;
                    current.locals = (0..local_count)
                        .map(|_| self.verification_type(&mut parser, code_length))
                        .collect::<Result<_>>()?;
                    let stack_count = parser.read_be::<u16>()?;
                    current.stack = (0..stack_count)
                        .map(|_| self.verification_type(&mut parser, code_length))
                        .collect::<Result<_>>()?;
                    delta
                }
                reserved => {
                    return Err(malformed_error!("Reserved stack map frame type {}", reserved))
                }
            };

            let offset = match previous {
                None => u32::from(delta),
                Some(previous) => previous + u32::from(delta) + 1,
            };
            if offset as usize >= code_length {
                return Err(malformed_error!("Stack map frame at {} past end of code", offset));
            }
            self.label(i64::from(offset), code_length)?;
            frames.insert(offset, current.clone());
            previous = Some(offset);
        }

        Ok(frames)
    }

    fn verification_type(
        &mut self,
        parser: &mut Parser<'_>,
        code_length: usize,
    ) -> Result<VerificationType> {
        Ok(match parser.read_be::<u8>()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(self.pool.class_name(parser.read_be()?)?.to_string()),
            8 => {
                let offset = parser.read_be::<u16>()?;
                VerificationType::Uninitialized(self.label(i64::from(offset), code_length)?)
            }
            other => return Err(malformed_error!("Invalid verification type tag {}", other)),
        })
    }
}

/// The implicit frame at method entry: `this` (or `UninitializedThis` in constructors) and
/// the parameter types.
pub(crate) fn initial_frame(class: &ClassUnit, method: &MethodUnit) -> Result<Frame> {
    let descriptor = MethodType::parse(&method.desc)?;
    let mut locals = Vec::with_capacity(descriptor.params.len() + 1);
    if !method.access.contains(MethodAccess::STATIC) {
        if method.name == "<init>" && class.name != "java/lang/Object" {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(class.name.clone()));
        }
    }
    locals.extend(descriptor.params.iter().map(|param| param.verification_type()));
    Ok(Frame {
        locals,
        stack: Vec::new(),
    })
}
