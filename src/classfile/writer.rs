//! Class file encoder.
//!
//! [`crate::classfile::writer::ClassWriter`] turns a [`crate::classfile::ClassUnit`] back into
//! class file bytes without modifying it. The constant pool and bootstrap table of the unit
//! are cloned and only appended to, so raw attributes that were carried through untouched keep
//! referring to the right entries.
//!
//! # Method bodies
//!
//! Instructions are emitted in their most compact form (`iload_1`, `ldc` for low pool indices,
//! `wide` only when required). Branch offsets are resolved by iterating the layout to a
//! fixpoint: `goto` and `jsr` are widened to `goto_w`/`jsr_w` when their target moves out of
//! range, while a conditional branch that no longer fits is reported as
//! [`crate::Error::Encoding`].
//!
//! Stack map frames are always written as `full_frame` entries.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::classfile::{ClassUnit, EncodeFlags, ReaderFlags};
//!
//! let bytes = std::fs::read("Example.class")?;
//! let mut class = ClassUnit::parse(&bytes, ReaderFlags::empty())?;
//! class.remove_annotations("Ljava/lang/Deprecated;");
//! let rewritten = class.to_bytes(EncodeFlags::COMPUTE_MAXS)?;
//! # Ok::<(), classweave::Error>(())
//! ```

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use bitflags::bitflags;

use crate::{
    assembly::{opcodes::*, Frame, Instruction, Label, Operand, VerificationType},
    classfile::{
        annotation::{write_annotations, Annotations, RUNTIME_INVISIBLE, RUNTIME_VISIBLE},
        constpool::{BootstrapTable, ConstantPool},
        count,
        descriptor::TypeCache,
        frames::{compute_frames, frames_supported, DefaultHierarchy, TypeHierarchy},
        maxs::{compute_maxs, operand_mismatch},
        reader::MAGIC,
        unit::{ClassUnit, Code, MethodUnit, RawAttribute},
    },
    file::ByteWriter,
    Error, Result,
};

bitflags! {
    /// Post-processing applied to method bodies while encoding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EncodeFlags: u32 {
        /// Recompute `max_stack` and `max_locals`
        const COMPUTE_MAXS = 0x0001;
        /// Recompute stack map frames; implies `COMPUTE_MAXS`
        const COMPUTE_FRAMES = 0x0002;
    }
}

/// Encodes [`ClassUnit`]s, sharing a type hierarchy and descriptor cache across calls.
pub struct ClassWriter {
    hierarchy: Arc<dyn TypeHierarchy>,
    types: Arc<TypeCache>,
}

impl Default for ClassWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassWriter {
    /// Writer with the [`DefaultHierarchy`] and a private descriptor cache
    #[must_use]
    pub fn new() -> Self {
        Self::with_hierarchy(Arc::new(DefaultHierarchy), Arc::new(TypeCache::new()))
    }

    /// Writer that merges reference types through `hierarchy` and parses descriptors
    /// through the shared `types` cache
    #[must_use]
    pub fn with_hierarchy(hierarchy: Arc<dyn TypeHierarchy>, types: Arc<TypeCache>) -> Self {
        ClassWriter { hierarchy, types }
    }

    /// Encode `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Encoding`] if the class can not be represented in the class
    /// file format, [`crate::Error::NotSupported`] if frames are requested for a method that
    /// uses subroutines, and [`crate::Error::Malformed`] for invalid descriptors.
    pub fn encode(&self, class: &ClassUnit, flags: EncodeFlags) -> Result<Vec<u8>> {
        let mut encoder = Encoder {
            writer: self,
            class,
            flags,
            pool: class.pool.clone(),
            bootstrap: class.bootstrap.clone(),
        };

        let body = encoder.encode_body()?;

        let mut out = ByteWriter::new();
        out.put(MAGIC);
        out.put(class.minor_version);
        out.put(class.major_version);
        encoder.pool.write(&mut out)?;
        out.put_bytes(&body);
        Ok(out.into_inner())
    }
}

struct Encoder<'w> {
    writer: &'w ClassWriter,
    class: &'w ClassUnit,
    flags: EncodeFlags,
    pool: ConstantPool,
    bootstrap: BootstrapTable,
}

/// An attribute ready to be written: name and encoded body.
type Attribute = (String, Vec<u8>);

impl Encoder<'_> {
    fn encode_body(&mut self) -> Result<Vec<u8>> {
        let class = self.class;
        let mut out = ByteWriter::new();

        out.put(class.access.bits());
        out.put(self.pool.add_class(&class.name)?);
        match &class.super_name {
            Some(name) => out.put(self.pool.add_class(name)?),
            None => out.put(0u16),
        }

        out.put(count(class.interfaces.len(), "interfaces")?);
        for interface in &class.interfaces {
            out.put(self.pool.add_class(interface)?);
        }

        out.put(count(class.fields.len(), "fields")?);
        for field in &class.fields {
            out.put(field.access.bits());
            out.put(self.pool.add_utf8(&field.name)?);
            out.put(self.pool.add_utf8(&field.desc)?);
            let attributes = field
                .attributes
                .iter()
                .map(|raw| (raw.name.clone(), raw.data.clone()))
                .collect();
            self.write_attributes(&mut out, attributes)?;
        }

        out.put(count(class.methods.len(), "methods")?);
        for method in &class.methods {
            self.encode_method(&mut out, method)?;
        }

        let mut attributes = self.annotation_attributes(&class.annotations)?;
        attributes.extend(raw_attributes(&class.attributes));
        if !self.bootstrap.is_empty() {
            let mut table = ByteWriter::new();
            self.bootstrap.write(&mut table)?;
            attributes.push(("BootstrapMethods".to_string(), table.into_inner()));
        }
        self.write_attributes(&mut out, attributes)?;

        Ok(out.into_inner())
    }

    fn write_attributes(&mut self, out: &mut ByteWriter, attributes: Vec<Attribute>) -> Result<()> {
        out.put(count(attributes.len(), "attributes")?);
        for (name, body) in attributes {
            out.put(self.pool.add_utf8(&name)?);
            out.put(u32::try_from(body.len()).map_err(|_| {
                Error::Encoding(format!("Attribute {} exceeds 4GiB", name))
            })?);
            out.put_bytes(&body);
        }
        Ok(())
    }

    fn annotation_attributes(&mut self, annotations: &Annotations) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        for (name, list) in [
            (RUNTIME_VISIBLE, &annotations.visible),
            (RUNTIME_INVISIBLE, &annotations.invisible),
        ] {
            if list.is_empty() {
                continue;
            }
            let mut body = ByteWriter::new();
            write_annotations(list, &mut self.pool, &mut body)?;
            attributes.push((name.to_string(), body.into_inner()));
        }
        Ok(attributes)
    }

    fn encode_method(&mut self, out: &mut ByteWriter, method: &MethodUnit) -> Result<()> {
        out.put(method.access.bits());
        out.put(self.pool.add_utf8(&method.name)?);
        out.put(self.pool.add_utf8(&method.desc)?);

        let mut attributes = Vec::new();
        if let Some(code) = &method.code {
            attributes.push(("Code".to_string(), self.encode_code(method, code)?));
        }
        attributes.extend(self.annotation_attributes(&method.annotations)?);
        attributes.extend(raw_attributes(&method.attributes));
        self.write_attributes(out, attributes)
    }

    fn encode_code(&mut self, method: &MethodUnit, code: &Code) -> Result<Vec<u8>> {
        let writer = self.writer;
        let types = &*writer.types;
        let frames_requested = self.flags.contains(EncodeFlags::COMPUTE_FRAMES);

        let code: Cow<'_, Code> = if frames_requested && frames_supported(self.class, method) {
            Cow::Owned(compute_frames(
                self.class,
                method,
                code,
                &*writer.hierarchy,
                types,
            )?)
        } else if frames_requested || self.flags.contains(EncodeFlags::COMPUTE_MAXS) {
            let (max_stack, max_locals) = compute_maxs(method.access, &method.desc, code, types)?;
            let mut updated = code.clone();
            updated.max_stack = max_stack;
            updated.max_locals = max_locals;
            Cow::Owned(updated)
        } else {
            Cow::Borrowed(code)
        };

        let assembled = self.assemble(&code)?;
        let labels = &assembled.labels;

        let mut out = ByteWriter::new();
        out.put(code.max_stack);
        out.put(code.max_locals);
        out.put(assembled.bytes.len() as u32);
        out.put_bytes(&assembled.bytes);

        let mut table = Vec::with_capacity(code.try_catch.len());
        for block in &code.try_catch {
            let start = label_offset(labels, block.start)?;
            let end = label_offset(labels, block.end)?;
            if start >= end {
                continue;
            }
            let handler = label_offset(labels, block.handler)?;
            let catch_type = match &block.catch_type {
                Some(name) => self.pool.add_class(name)?,
                None => 0,
            };
            table.push((start, end, handler, catch_type));
        }
        out.put(count(table.len(), "exception handlers")?);
        for (start, end, handler, catch_type) in table {
            out.put(start as u16);
            out.put(end as u16);
            out.put(handler as u16);
            out.put(catch_type);
        }

        let mut attributes = Vec::new();

        let lines: Vec<(u32, u16)> = code
            .instructions
            .instructions()
            .filter_map(|insn| match insn {
                Instruction::Line { line, start } => Some((*start, *line)),
                _ => None,
            })
            .map(|(start, line)| Ok((label_offset(labels, start)?, line)))
            .collect::<Result<_>>()?;
        if !lines.is_empty() {
            let mut body = ByteWriter::new();
            body.put(count(lines.len(), "line numbers")?);
            for (offset, line) in lines {
                body.put(offset as u16);
                body.put(line);
            }
            attributes.push(("LineNumberTable".to_string(), body.into_inner()));
        }

        if !code.locals.is_empty() {
            let mut table = ByteWriter::new();
            let mut generic = ByteWriter::new();
            let mut generic_count = 0usize;
            table.put(count(code.locals.len(), "local variables")?);
            for local in &code.locals {
                let start = label_offset(labels, local.start)?;
                let end = label_offset(labels, local.end)?;
                let length = end.checked_sub(start).ok_or_else(|| {
                    Error::Encoding(format!("Local variable {} ends before it starts", local.name))
                })?;
                table.put(start as u16);
                table.put(length as u16);
                table.put(self.pool.add_utf8(&local.name)?);
                table.put(self.pool.add_utf8(&local.desc)?);
                table.put(local.index);

                if let Some(signature) = &local.signature {
                    generic_count += 1;
                    generic.put(start as u16);
                    generic.put(length as u16);
                    generic.put(self.pool.add_utf8(&local.name)?);
                    generic.put(self.pool.add_utf8(signature)?);
                    generic.put(local.index);
                }
            }
            attributes.push(("LocalVariableTable".to_string(), table.into_inner()));
            if generic_count > 0 {
                let mut body = ByteWriter::new();
                body.put(count(generic_count, "local variable types")?);
                body.put_bytes(generic.as_slice());
                attributes.push(("LocalVariableTypeTable".to_string(), body.into_inner()));
            }
        }

        if self.class.major_version >= 50 && !assembled.frames.is_empty() {
            let mut body = ByteWriter::new();
            body.put(count(assembled.frames.len(), "stack map frames")?);
            let mut previous: Option<u32> = None;
            for (offset, frame) in &assembled.frames {
                let delta = match previous {
                    None => *offset,
                    Some(previous) => offset - previous - 1,
                };
                previous = Some(*offset);
                body.put(255u8);
                body.put(delta as u16);
                body.put(count(frame.locals.len(), "frame locals")?);
                for value in &frame.locals {
                    self.write_verification_type(&mut body, value, labels)?;
                }
                body.put(count(frame.stack.len(), "frame stack entries")?);
                for value in &frame.stack {
                    self.write_verification_type(&mut body, value, labels)?;
                }
            }
            attributes.push(("StackMapTable".to_string(), body.into_inner()));
        }

        self.write_attributes(&mut out, attributes)?;
        Ok(out.into_inner())
    }

    fn write_verification_type(
        &mut self,
        out: &mut ByteWriter,
        value: &VerificationType,
        labels: &HashMap<Label, u32>,
    ) -> Result<()> {
        match value {
            VerificationType::Top => out.put(0u8),
            VerificationType::Integer => out.put(1u8),
            VerificationType::Float => out.put(2u8),
            VerificationType::Double => out.put(3u8),
            VerificationType::Long => out.put(4u8),
            VerificationType::Null => out.put(5u8),
            VerificationType::UninitializedThis => out.put(6u8),
            VerificationType::Object(name) => {
                out.put(7u8);
                out.put(self.pool.add_class(name)?);
            }
            VerificationType::Uninitialized(label) => {
                out.put(8u8);
                out.put(label_offset(labels, *label)? as u16);
            }
        }
        Ok(())
    }

    /// Resolve pool references, lay out the body and emit the bytecode.
    fn assemble<'c>(&mut self, code: &'c Code) -> Result<Assembled<'c>> {
        let nodes: Vec<&Instruction> = code.instructions.instructions().collect();

        let mut refs = vec![0u16; nodes.len()];
        for (index, insn) in nodes.iter().enumerate() {
            refs[index] = match insn.operand() {
                Some(Operand::Ldc(constant)) => {
                    self.pool.add_constant(constant, &mut self.bootstrap)?
                }
                Some(Operand::Type(name)) => self.pool.add_class(name)?,
                Some(Operand::Field(member)) => self.pool.add_field_ref(member)?,
                Some(Operand::Method { member, interface }) => {
                    self.pool.add_method_ref(member, *interface)?
                }
                Some(Operand::InvokeDynamic(call)) => {
                    self.pool.add_invoke_dynamic(call, &mut self.bootstrap)?
                }
                Some(Operand::MultiANewArray { desc, .. }) => self.pool.add_class(desc)?,
                _ => 0,
            };
        }

        let mut widened = HashSet::new();
        let (offsets, labels) = loop {
            let offsets = layout(&nodes, &refs, &widened)?;
            let labels: HashMap<Label, u32> = nodes
                .iter()
                .zip(&offsets)
                .filter_map(|(insn, offset)| insn.as_label().map(|label| (label, *offset)))
                .collect();

            let mut changed = false;
            for (index, insn) in nodes.iter().enumerate() {
                let (Some(opcode), Some(Operand::Jump(target))) = (insn.opcode(), insn.operand())
                else {
                    continue;
                };
                if widened.contains(&index) {
                    continue;
                }
                let relative = i64::from(label_offset(&labels, *target)?) - i64::from(offsets[index]);
                if i16::try_from(relative).is_ok() {
                    continue;
                }
                if opcode == GOTO || opcode == JSR {
                    widened.insert(index);
                    changed = true;
                } else {
                    return Err(Error::Encoding(format!(
                        "Branch offset {} of {} does not fit 16 bits",
                        relative, insn
                    )));
                }
            }

            if !changed {
                break (offsets, labels);
            }
        };

        let mut out = ByteWriter::new();
        let mut frames = BTreeMap::new();
        let code_length = offsets.last().copied().unwrap_or(0);
        for (index, &insn) in nodes.iter().enumerate() {
            let offset = offsets[index];
            match insn {
                Instruction::Frame(frame) if offset < code_length => {
                    frames.insert(offset, frame);
                }
                Instruction::Op { opcode, operand } => self.emit(
                    &mut out,
                    *opcode,
                    operand,
                    insn,
                    offset,
                    refs[index],
                    widened.contains(&index),
                    &labels,
                )?,
                _ => {}
            }
        }

        Ok(Assembled {
            bytes: out.into_inner(),
            labels,
            frames,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        out: &mut ByteWriter,
        opcode: u8,
        operand: &Operand,
        insn: &Instruction,
        offset: u32,
        index: u16,
        wide_jump: bool,
        labels: &HashMap<Label, u32>,
    ) -> Result<()> {
        let relative = |label: Label| -> Result<i64> {
            Ok(i64::from(label_offset(labels, label)?) - i64::from(offset))
        };

        match (opcode, operand) {
            (BIPUSH, Operand::Int(value)) => {
                let value = i8::try_from(*value)
                    .map_err(|_| Error::Encoding(format!("bipush value {} out of range", value)))?;
                out.put(opcode);
                out.put(value);
            }
            (SIPUSH, Operand::Int(value)) => {
                let value = i16::try_from(*value)
                    .map_err(|_| Error::Encoding(format!("sipush value {} out of range", value)))?;
                out.put(opcode);
                out.put(value);
            }
            (NEWARRAY, Operand::Int(value)) => {
                out.put(opcode);
                out.put(u8::try_from(*value).map_err(|_| operand_mismatch(insn))?);
            }
            (LDC, Operand::Ldc(constant)) => {
                if constant.is_wide() {
                    out.put(LDC2_W);
                    out.put(index);
                } else if let Ok(short) = u8::try_from(index) {
                    out.put(LDC);
                    out.put(short);
                } else {
                    out.put(LDC_W);
                    out.put(index);
                }
            }
            (ILOAD..=ALOAD | ISTORE..=ASTORE | RET, Operand::Var(var)) => {
                if opcode != RET && *var <= 3 {
                    let compact = if opcode <= ALOAD {
                        ILOAD_0 + (opcode - ILOAD) * 4
                    } else {
                        ISTORE_0 + (opcode - ISTORE) * 4
                    };
                    out.put(compact + *var as u8);
                } else if let Ok(short) = u8::try_from(*var) {
                    out.put(opcode);
                    out.put(short);
                } else {
                    out.put(WIDE);
                    out.put(opcode);
                    out.put(*var);
                }
            }
            (IINC, Operand::Iinc { var, incr }) => match (u8::try_from(*var), i8::try_from(*incr)) {
                (Ok(var), Ok(incr)) => {
                    out.put(IINC);
                    out.put(var);
                    out.put(incr);
                }
                _ => {
                    out.put(WIDE);
                    out.put(IINC);
                    out.put(*var);
                    out.put(*incr);
                }
            },
            (IFEQ..=JSR | IFNULL | IFNONNULL, Operand::Jump(target)) => {
                let relative = relative(*target)?;
                if wide_jump {
                    out.put(if opcode == GOTO { GOTO_W } else { JSR_W });
                    out.put(relative as i32);
                } else {
                    out.put(opcode);
                    out.put(relative as i16);
                }
            }
            (
                TABLESWITCH,
                Operand::TableSwitch {
                    default,
                    low,
                    high,
                    targets,
                },
            ) => {
                if i64::from(*high) - i64::from(*low) + 1 != targets.len() as i64 {
                    return Err(Error::Encoding(format!(
                        "tableswitch {}..={} has {} targets",
                        low,
                        high,
                        targets.len()
                    )));
                }
                out.put(opcode);
                out.put_zeros(switch_padding(offset));
                out.put(relative(*default)? as i32);
                out.put(*low);
                out.put(*high);
                for target in targets {
                    out.put(relative(*target)? as i32);
                }
            }
            (LOOKUPSWITCH, Operand::LookupSwitch { default, pairs }) => {
                let mut sorted = pairs.clone();
                sorted.sort_by_key(|(key, _)| *key);
                out.put(opcode);
                out.put_zeros(switch_padding(offset));
                out.put(relative(*default)? as i32);
                out.put(sorted.len() as i32);
                for (key, target) in sorted {
                    out.put(key);
                    out.put(relative(target)? as i32);
                }
            }
            (NEW | ANEWARRAY | CHECKCAST | INSTANCEOF, Operand::Type(_))
            | (GETSTATIC..=PUTFIELD, Operand::Field(_))
            | (INVOKEVIRTUAL..=INVOKESTATIC, Operand::Method { .. }) => {
                out.put(opcode);
                out.put(index);
            }
            (INVOKEINTERFACE, Operand::Method { member, .. }) => {
                let method = self.writer.types.method_type(&member.desc)?;
                out.put(opcode);
                out.put(index);
                out.put(u8::try_from(method.argument_slots() + 1).map_err(|_| {
                    Error::Encoding(format!("Too many arguments for {}", member))
                })?);
                out.put(0u8);
            }
            (INVOKEDYNAMIC, Operand::InvokeDynamic(_)) => {
                out.put(opcode);
                out.put(index);
                out.put(0u16);
            }
            (MULTIANEWARRAY, Operand::MultiANewArray { dims, .. }) => {
                out.put(opcode);
                out.put(index);
                out.put(*dims);
            }
            (_, Operand::None) if !takes_operand(opcode) => out.put(opcode),
            _ => return Err(operand_mismatch(insn)),
        }
        Ok(())
    }
}

/// Result of assembling one method body.
struct Assembled<'c> {
    bytes: Vec<u8>,
    labels: HashMap<Label, u32>,
    frames: BTreeMap<u32, &'c Frame>,
}

fn raw_attributes(attributes: &[RawAttribute]) -> impl Iterator<Item = Attribute> + '_ {
    attributes
        .iter()
        .map(|raw| (raw.name.clone(), raw.data.clone()))
}

fn label_offset(labels: &HashMap<Label, u32>, label: Label) -> Result<u32> {
    labels
        .get(&label)
        .copied()
        .ok_or_else(|| Error::Encoding(format!("Label {} is not placed in the method body", label)))
}

fn switch_padding(offset: u32) -> usize {
    ((4 - (offset + 1) % 4) % 4) as usize
}

fn takes_operand(opcode: u8) -> bool {
    matches!(
        opcode,
        BIPUSH
            | SIPUSH
            | LDC..=ALOAD
            | ISTORE..=ASTORE
            | IINC
            | IFEQ..=LOOKUPSWITCH
            | GETSTATIC..=INVOKEDYNAMIC
            | NEW
            | NEWARRAY
            | ANEWARRAY
            | CHECKCAST
            | INSTANCEOF
            | WIDE..=JSR_W
    )
}

/// Offset of every node for the given set of widened jumps; the last element is the code
/// length.
fn layout(nodes: &[&Instruction], refs: &[u16], widened: &HashSet<usize>) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(nodes.len() + 1);
    let mut pc = 0u32;
    for (index, insn) in nodes.iter().enumerate() {
        offsets.push(pc);
        let Instruction::Op { opcode, operand } = insn else {
            continue;
        };
        let size = match operand {
            Operand::None => 1,
            Operand::Int(_) => {
                if *opcode == SIPUSH {
                    3
                } else {
                    2
                }
            }
            Operand::Var(var) => {
                if *opcode != RET && *var <= 3 {
                    1
                } else if *var <= 255 {
                    2
                } else {
                    4
                }
            }
            Operand::Iinc { var, incr } => {
                if *var <= 255 && i8::try_from(*incr).is_ok() {
                    3
                } else {
                    6
                }
            }
            Operand::Ldc(constant) => {
                if !constant.is_wide() && refs[index] <= 255 {
                    2
                } else {
                    3
                }
            }
            Operand::Type(_) | Operand::Field(_) => 3,
            Operand::Method { .. } => {
                if *opcode == INVOKEINTERFACE {
                    5
                } else {
                    3
                }
            }
            Operand::InvokeDynamic(_) => 5,
            Operand::MultiANewArray { .. } => 4,
            Operand::Jump(_) => {
                if widened.contains(&index) {
                    5
                } else {
                    3
                }
            }
            Operand::TableSwitch { targets, .. } => {
                1 + switch_padding(pc) as u32 + 12 + 4 * targets.len() as u32
            }
            Operand::LookupSwitch { pairs, .. } => {
                1 + switch_padding(pc) as u32 + 8 + 8 * pairs.len() as u32
            }
        };
        pc += size;
        if pc > 65535 {
            return Err(Error::Encoding(format!(
                "Method body exceeds 65535 bytes ({} so far)",
                pc
            )));
        }
    }
    offsets.push(pc);
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Constant, InstructionSequence},
        classfile::{
            reader::ReaderFlags,
            unit::{ClassAccess, MethodAccess},
        },
    };

    fn class_with(code: Code, desc: &str) -> ClassUnit {
        let mut class = ClassUnit::new(
            52,
            ClassAccess::PUBLIC | ClassAccess::SUPER,
            "a/B",
            Some("java/lang/Object".to_string()),
        );
        let mut method = MethodUnit::new(MethodAccess::PUBLIC | MethodAccess::STATIC, "f", desc);
        method.code = Some(code);
        class.methods.push(method);
        class
    }

    fn reparse(class: &ClassUnit, flags: EncodeFlags) -> ClassUnit {
        let bytes = class.to_bytes(flags).unwrap();
        ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap()
    }

    fn opcodes(code: &Code) -> Vec<u8> {
        code.instructions
            .instructions()
            .filter_map(Instruction::opcode)
            .collect()
    }

    #[test]
    fn compact_forms_round_trip() {
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::var(ISTORE, 300));
        seq.push_back(Instruction::Op {
            opcode: IINC,
            operand: Operand::Iinc { var: 300, incr: 1000 },
        });
        seq.push_back(Instruction::ldc(Constant::Long(7)));
        seq.push_back(Instruction::simple(POP2));
        seq.push_back(Instruction::simple(RETURN));

        let class = class_with(
            Code {
                instructions: seq,
                ..Code::default()
            },
            "(I)V",
        );
        let bytes = class.to_bytes(EncodeFlags::COMPUTE_MAXS).unwrap();
        let decoded = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
        let code = decoded.methods[0].code.as_ref().unwrap();

        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 301);
        assert_eq!(
            code.instructions.instructions().cloned().collect::<Vec<_>>(),
            vec![
                Instruction::var(ILOAD, 0),
                Instruction::var(ISTORE, 300),
                Instruction::Op {
                    opcode: IINC,
                    operand: Operand::Iinc { var: 300, incr: 1000 },
                },
                Instruction::ldc(Constant::Long(7)),
                Instruction::simple(POP2),
                Instruction::simple(RETURN),
            ]
        );
    }

    #[test]
    fn long_goto_is_widened() {
        let mut seq = InstructionSequence::new();
        let end = seq.new_label();
        seq.push_back(Instruction::jump(GOTO, end));
        for _ in 0..40_000 {
            seq.push_back(Instruction::simple(NOP));
        }
        seq.push_back(Instruction::Label(end));
        seq.push_back(Instruction::simple(RETURN));

        let class = class_with(
            Code {
                instructions: seq,
                ..Code::default()
            },
            "()V",
        );
        let bytes = class.to_bytes(EncodeFlags::empty()).unwrap();
        assert!(bytes.windows(5).any(|w| w == [GOTO_W, 0x00, 0x00, 0x9C, 0x45]));

        let decoded = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
        let code = decoded.methods[0].code.as_ref().unwrap();
        assert_eq!(opcodes(code)[0], GOTO);
    }

    #[test]
    fn long_conditional_branch_is_rejected() {
        let mut seq = InstructionSequence::new();
        let end = seq.new_label();
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::jump(IFEQ, end));
        for _ in 0..40_000 {
            seq.push_back(Instruction::simple(NOP));
        }
        seq.push_back(Instruction::Label(end));
        seq.push_back(Instruction::simple(RETURN));

        let class = class_with(
            Code {
                instructions: seq,
                ..Code::default()
            },
            "(I)V",
        );
        assert!(matches!(
            class.to_bytes(EncodeFlags::empty()),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn unplaced_label_is_rejected() {
        let mut seq = InstructionSequence::new();
        let nowhere = seq.new_label();
        seq.push_back(Instruction::jump(GOTO, nowhere));

        let class = class_with(
            Code {
                instructions: seq,
                ..Code::default()
            },
            "()V",
        );
        assert!(matches!(
            class.to_bytes(EncodeFlags::empty()),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn oversized_string_constant_is_rejected() {
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::ldc(Constant::String("x".repeat(70_000))));
        seq.push_back(Instruction::simple(POP));
        seq.push_back(Instruction::simple(RETURN));

        let class = class_with(
            Code {
                instructions: seq,
                ..Code::default()
            },
            "()V",
        );
        assert!(matches!(
            class.to_bytes(EncodeFlags::COMPUTE_MAXS),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn switches_round_trip() {
        let mut seq = InstructionSequence::new();
        let a = seq.new_label();
        let b = seq.new_label();
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::Op {
            opcode: TABLESWITCH,
            operand: Operand::TableSwitch {
                default: a,
                low: 1,
                high: 2,
                targets: vec![a, b],
            },
        });
        seq.push_back(Instruction::Label(a));
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::Op {
            opcode: LOOKUPSWITCH,
            operand: Operand::LookupSwitch {
                default: b,
                pairs: vec![(10, b), (-3, a)],
            },
        });
        seq.push_back(Instruction::Label(b));
        seq.push_back(Instruction::simple(RETURN));

        let class = class_with(
            Code {
                instructions: seq,
                ..Code::default()
            },
            "(I)V",
        );
        let decoded = reparse(&class, EncodeFlags::COMPUTE_FRAMES);
        let code = decoded.methods[0].code.as_ref().unwrap();
        assert_eq!(opcodes(code), vec![ILOAD, TABLESWITCH, ILOAD, LOOKUPSWITCH, RETURN]);

        let Some(Operand::LookupSwitch { pairs, .. }) = code
            .instructions
            .instructions()
            .find(|insn| insn.opcode() == Some(LOOKUPSWITCH))
            .and_then(Instruction::operand)
        else {
            panic!("lookupswitch missing");
        };
        assert_eq!(pairs.iter().map(|(key, _)| *key).collect::<Vec<_>>(), vec![-3, 10]);

        let frames = code
            .instructions
            .instructions()
            .filter(|insn| matches!(insn, Instruction::Frame(_)))
            .count();
        assert_eq!(frames, 2);
    }

    #[test]
    fn encode_does_not_modify_unit() {
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::ldc(Constant::String("hello".to_string())));
        seq.push_back(Instruction::simple(ARETURN));
        let class = class_with(
            Code {
                max_stack: 1,
                instructions: seq,
                ..Code::default()
            },
            "()Ljava/lang/Object;",
        );
        let before = class.constant_pool().len();
        let first = class.to_bytes(EncodeFlags::COMPUTE_FRAMES).unwrap();
        let second = class.to_bytes(EncodeFlags::COMPUTE_FRAMES).unwrap();
        assert_eq!(first, second);
        assert_eq!(class.constant_pool().len(), before);
    }
}
