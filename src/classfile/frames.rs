//! Stack map frame computation.
//!
//! Rules that restructure control flow leave the original `StackMapTable` stale. When a rule
//! requests frames, [`compute_frames`] re-derives them by abstract interpretation: the types of
//! every local and stack slot are propagated along all control flow edges (exception handlers
//! included) until a fixpoint is reached, and a full [`crate::assembly::Frame`] is placed at
//! every branch target, handler entry and instruction following an unconditional jump.
//!
//! Internally each state is slot based: `long` and `double` occupy their slot plus a trailing
//! `Top`. Frames are converted back to the entry based [`VerificationType`] form on output.
//!
//! Reference types from different paths are merged through a [`TypeHierarchy`]. The
//! [`DefaultHierarchy`] knows no classes and merges any two distinct classes to
//! `java/lang/Object`.
//!
//! Code that no path reaches is replaced by `nop ... athrow` with a frame of its own, and
//! removed from exception handler ranges.
//!
//! Subroutines (`jsr`/`ret`) are not supported.

use std::collections::{BTreeSet, HashMap};

use crate::{
    assembly::{
        opcodes::*, Constant, Frame, InsnId, Instruction, Label, Operand, VerificationType,
    },
    classfile::{
        descriptor::{FieldType, TypeCache},
        maxs::{jump_targets, max_locals, operand_mismatch},
        reader::initial_frame,
        unit::{ClassUnit, Code, MethodAccess, MethodUnit, TryCatchBlock},
    },
    Error, Result,
};

const OBJECT: &str = "java/lang/Object";
const THROWABLE: &str = "java/lang/Throwable";

/// Answers subtype questions for the frame computation.
pub trait TypeHierarchy: Send + Sync {
    /// Closest common superclass of two internal class names.
    fn common_super_class(&self, first: &str, second: &str) -> String;
}

/// Hierarchy that knows no classes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHierarchy;

impl TypeHierarchy for DefaultHierarchy {
    fn common_super_class(&self, _first: &str, _second: &str) -> String {
        OBJECT.to_string()
    }
}

/// One local or stack slot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    Object(String),
    /// Result of the `new` at the given op index, before its constructor ran
    Uninitialized(usize),
}

impl Slot {
    fn from_verification(value: &VerificationType) -> Self {
        match value {
            VerificationType::Top | VerificationType::Uninitialized(_) => Slot::Top,
            VerificationType::Integer => Slot::Integer,
            VerificationType::Float => Slot::Float,
            VerificationType::Long => Slot::Long,
            VerificationType::Double => Slot::Double,
            VerificationType::Null => Slot::Null,
            VerificationType::UninitializedThis => Slot::UninitializedThis,
            VerificationType::Object(name) => Slot::Object(name.clone()),
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Slot::Long | Slot::Double)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    locals: Vec<Slot>,
    stack: Vec<Slot>,
}

impl State {
    fn pop(&mut self) -> Result<Slot> {
        self.stack
            .pop()
            .ok_or_else(|| Error::Encoding("Operand stack underflow".to_string()))
    }

    fn pop_n(&mut self, count: usize) -> Result<()> {
        if count > self.stack.len() {
            return Err(Error::Encoding("Operand stack underflow".to_string()));
        }
        self.stack.truncate(self.stack.len() - count);
        Ok(())
    }

    fn push(&mut self, slot: Slot) {
        let wide = slot.is_wide();
        self.stack.push(slot);
        if wide {
            self.stack.push(Slot::Top);
        }
    }

    fn push_field(&mut self, field: &FieldType) {
        self.push(Slot::from_verification(&field.verification_type()));
    }

    fn load(&self, var: u16) -> Result<Slot> {
        self.locals
            .get(usize::from(var))
            .cloned()
            .ok_or_else(|| Error::Encoding(format!("Local variable {} out of range", var)))
    }

    fn store(&mut self, var: u16, slot: Slot) -> Result<()> {
        let index = usize::from(var);
        let width = if slot.is_wide() { 2 } else { 1 };
        if index + width > self.locals.len() {
            return Err(Error::Encoding(format!("Local variable {} out of range", var)));
        }
        if index > 0 && self.locals[index - 1].is_wide() {
            self.locals[index - 1] = Slot::Top;
        }
        self.locals[index] = slot;
        if width == 2 {
            self.locals[index + 1] = Slot::Top;
        }
        Ok(())
    }

    /// Replace every occurrence of an uninitialized value once its constructor ran.
    fn initialize(&mut self, from: &Slot, to: &Slot) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if slot == from {
                *slot = to.clone();
            }
        }
    }
}

/// Abstract interpreter over the real instructions of one method body.
struct Analyzer<'a> {
    class: &'a ClassUnit,
    hierarchy: &'a dyn TypeHierarchy,
    types: &'a TypeCache,
    ops: Vec<(InsnId, &'a Instruction)>,
    labels: HashMap<Label, usize>,
    states: Vec<Option<State>>,
    max_stack: usize,
}

/// Exception handler with its range resolved to op indices.
struct Handler {
    start: usize,
    end: usize,
    handler: usize,
    catch: Slot,
}

impl<'a> Analyzer<'a> {
    fn target(&self, label: Label) -> Result<usize> {
        match self.labels.get(&label) {
            Some(index) if *index < self.ops.len() => Ok(*index),
            Some(_) => Err(Error::Encoding(format!(
                "Label {} does not precede an instruction",
                label
            ))),
            None => Err(Error::Encoding(format!(
                "Label {} is not placed in the method body",
                label
            ))),
        }
    }

    fn boundary(&self, label: Label) -> Result<usize> {
        self.labels.get(&label).copied().ok_or_else(|| {
            Error::Encoding(format!("Label {} is not placed in the method body", label))
        })
    }

    fn merge_slot(&self, current: &Slot, incoming: &Slot) -> Slot {
        if current == incoming {
            return current.clone();
        }
        match (current, incoming) {
            (Slot::Null, Slot::Object(_)) => incoming.clone(),
            (Slot::Object(_), Slot::Null) => current.clone(),
            (Slot::Object(first), Slot::Object(second)) => {
                if first.starts_with('[') || second.starts_with('[') {
                    Slot::Object(OBJECT.to_string())
                } else {
                    Slot::Object(self.hierarchy.common_super_class(first, second))
                }
            }
            _ => Slot::Top,
        }
    }

    /// Merge `incoming` into the state of op `index`; returns `true` if the state changed.
    fn merge_into(&mut self, index: usize, incoming: State) -> Result<bool> {
        let merged = match &self.states[index] {
            None => incoming,
            Some(current) => {
                if current.stack.len() != incoming.stack.len() {
                    return Err(Error::Encoding(format!(
                        "Inconsistent stack heights {} and {} at {}",
                        current.stack.len(),
                        incoming.stack.len(),
                        self.ops[index].1
                    )));
                }
                let mut locals: Vec<Slot> = current
                    .locals
                    .iter()
                    .zip(&incoming.locals)
                    .map(|(a, b)| self.merge_slot(a, b))
                    .collect();
                // a wide value whose second half was lost is no longer usable
                for slot in 0..locals.len() {
                    if locals[slot].is_wide() && locals.get(slot + 1) != Some(&Slot::Top) {
                        locals[slot] = Slot::Top;
                    }
                }
                let stack = current
                    .stack
                    .iter()
                    .zip(&incoming.stack)
                    .map(|(a, b)| self.merge_slot(a, b))
                    .collect();
                State { locals, stack }
            }
        };

        if self.states[index].as_ref() == Some(&merged) {
            return Ok(false);
        }
        self.max_stack = self.max_stack.max(merged.stack.len());
        self.states[index] = Some(merged);
        Ok(true)
    }

    fn run(&mut self, entry: State, handlers: &[Handler]) -> Result<()> {
        if self.ops.is_empty() {
            return Ok(());
        }
        self.merge_into(0, entry)?;
        let mut worklist = vec![0usize];

        while let Some(index) = worklist.pop() {
            let Some(before) = self.states[index].clone() else {
                continue;
            };
            let (_, insn) = self.ops[index];
            let Instruction::Op { opcode, operand } = insn else {
                continue;
            };

            let mut after = before.clone();
            self.execute(index, *opcode, operand, insn, &mut after)?;
            self.max_stack = self.max_stack.max(after.stack.len());

            for handler in handlers {
                if handler.start <= index && index < handler.end {
                    for locals in [&before.locals, &after.locals] {
                        let state = State {
                            locals: locals.clone(),
                            stack: vec![handler.catch.clone()],
                        };
                        if self.merge_into(handler.handler, state)? {
                            worklist.push(handler.handler);
                        }
                    }
                }
            }

            let mut successors = Vec::new();
            for label in jump_targets(insn) {
                successors.push(self.target(label)?);
            }
            if !is_unconditional(*opcode) {
                if index + 1 >= self.ops.len() {
                    return Err(Error::Encoding(
                        "Execution falls off the end of the method body".to_string(),
                    ));
                }
                successors.push(index + 1);
            }
            for successor in successors {
                if self.merge_into(successor, after.clone())? {
                    worklist.push(successor);
                }
            }
        }

        Ok(())
    }

    fn execute(
        &self,
        index: usize,
        opcode: u8,
        operand: &Operand,
        insn: &Instruction,
        state: &mut State,
    ) -> Result<()> {
        match opcode {
            NOP | GOTO => {}
            ACONST_NULL => state.push(Slot::Null),
            ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH => state.push(Slot::Integer),
            LCONST_0 | LCONST_1 => state.push(Slot::Long),
            FCONST_0..=FCONST_2 => state.push(Slot::Float),
            DCONST_0 | DCONST_1 => state.push(Slot::Double),
            LDC => {
                let Operand::Ldc(constant) = operand else {
                    return Err(operand_mismatch(insn));
                };
                match constant {
                    Constant::Int(_) => state.push(Slot::Integer),
                    Constant::Float(_) => state.push(Slot::Float),
                    Constant::Long(_) => state.push(Slot::Long),
                    Constant::Double(_) => state.push(Slot::Double),
                    Constant::String(_) => state.push(object("java/lang/String")),
                    Constant::Class(_) => state.push(object("java/lang/Class")),
                    Constant::MethodType(_) => state.push(object("java/lang/invoke/MethodType")),
                    Constant::Handle(_) => state.push(object("java/lang/invoke/MethodHandle")),
                    Constant::Dynamic(call) => state.push_field(&*self.types.field_type(&call.desc)?),
                }
            }
            ILOAD => {
                var(operand, insn)?;
                state.push(Slot::Integer);
            }
            LLOAD => {
                var(operand, insn)?;
                state.push(Slot::Long);
            }
            FLOAD => {
                var(operand, insn)?;
                state.push(Slot::Float);
            }
            DLOAD => {
                var(operand, insn)?;
                state.push(Slot::Double);
            }
            ALOAD => {
                let value = state.load(var(operand, insn)?)?;
                state.push(value);
            }
            IALOAD | BALOAD | CALOAD | SALOAD => {
                state.pop_n(2)?;
                state.push(Slot::Integer);
            }
            LALOAD => {
                state.pop_n(2)?;
                state.push(Slot::Long);
            }
            FALOAD => {
                state.pop_n(2)?;
                state.push(Slot::Float);
            }
            DALOAD => {
                state.pop_n(2)?;
                state.push(Slot::Double);
            }
            AALOAD => {
                state.pop()?;
                let element = match state.pop()? {
                    Slot::Object(array) if array.starts_with('[') => {
                        Slot::from_verification(&FieldType::parse(&array[1..])?.verification_type())
                    }
                    Slot::Null => Slot::Null,
                    _ => object(OBJECT),
                };
                state.push(element);
            }
            ISTORE | FSTORE | ASTORE => {
                let value = state.pop()?;
                state.store(var(operand, insn)?, value)?;
            }
            LSTORE | DSTORE => {
                state.pop()?;
                let value = state.pop()?;
                state.store(var(operand, insn)?, value)?;
            }
            IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => state.pop_n(3)?,
            LASTORE | DASTORE => state.pop_n(4)?,
            POP => state.pop_n(1)?,
            POP2 => state.pop_n(2)?,
            DUP => {
                let v1 = state.pop()?;
                state.stack.extend([v1.clone(), v1]);
            }
            DUP_X1 => {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                state.stack.extend([v1.clone(), v2, v1]);
            }
            DUP_X2 => {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                let v3 = state.pop()?;
                state.stack.extend([v1.clone(), v3, v2, v1]);
            }
            DUP2 => {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                state.stack.extend([v2.clone(), v1.clone(), v2, v1]);
            }
            DUP2_X1 => {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                let v3 = state.pop()?;
                state.stack.extend([v2.clone(), v1.clone(), v3, v2, v1]);
            }
            DUP2_X2 => {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                let v3 = state.pop()?;
                let v4 = state.pop()?;
                state.stack.extend([v2.clone(), v1.clone(), v4, v3, v2, v1]);
            }
            SWAP => {
                let v1 = state.pop()?;
                let v2 = state.pop()?;
                state.stack.extend([v1, v2]);
            }
            IADD..=DNEG => {
                let kind = (opcode - IADD) % 4;
                let (slot, width) = match kind {
                    0 => (Slot::Integer, 1),
                    1 => (Slot::Long, 2),
                    2 => (Slot::Float, 1),
                    _ => (Slot::Double, 2),
                };
                let operands = if opcode >= INEG { 1 } else { 2 };
                state.pop_n(operands * width)?;
                state.push(slot);
            }
            ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                state.pop_n(2)?;
                state.push(Slot::Integer);
            }
            LSHL | LSHR | LUSHR => {
                state.pop_n(3)?;
                state.push(Slot::Long);
            }
            LAND | LOR | LXOR => {
                state.pop_n(4)?;
                state.push(Slot::Long);
            }
            IINC => {
                let Operand::Iinc { var, .. } = operand else {
                    return Err(operand_mismatch(insn));
                };
                state.store(*var, Slot::Integer)?;
            }
            I2L | F2L => convert(state, 1, Slot::Long)?,
            I2F => convert(state, 1, Slot::Float)?,
            I2D | F2D => convert(state, 1, Slot::Double)?,
            L2I | D2I => convert(state, 2, Slot::Integer)?,
            L2F | D2F => convert(state, 2, Slot::Float)?,
            L2D => convert(state, 2, Slot::Double)?,
            D2L => convert(state, 2, Slot::Long)?,
            F2I | I2B | I2C | I2S => convert(state, 1, Slot::Integer)?,
            LCMP | DCMPL | DCMPG => convert(state, 4, Slot::Integer)?,
            FCMPL | FCMPG => convert(state, 2, Slot::Integer)?,
            IFEQ..=IFLE | IFNULL | IFNONNULL | TABLESWITCH | LOOKUPSWITCH => state.pop_n(1)?,
            IF_ICMPEQ..=IF_ACMPNE => state.pop_n(2)?,
            JSR | RET => {
                return Err(Error::NotSupported(
                    "subroutines while computing stack map frames".to_string(),
                ))
            }
            IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => {
                state.pop_n(1)?
            }
            LRETURN | DRETURN => state.pop_n(2)?,
            RETURN => {}
            GETSTATIC..=PUTFIELD => {
                let Operand::Field(member) = operand else {
                    return Err(operand_mismatch(insn));
                };
                let field = self.types.field_type(&member.desc)?;
                match opcode {
                    GETSTATIC => state.push_field(&field),
                    PUTSTATIC => state.pop_n(usize::from(field.size()))?,
                    GETFIELD => {
                        state.pop_n(1)?;
                        state.push_field(&field);
                    }
                    _ => state.pop_n(usize::from(field.size()) + 1)?,
                }
            }
            INVOKEVIRTUAL..=INVOKEINTERFACE => {
                let Operand::Method { member, .. } = operand else {
                    return Err(operand_mismatch(insn));
                };
                let method = self.types.method_type(&member.desc)?;
                state.pop_n(usize::from(method.argument_slots()))?;
                if opcode != INVOKESTATIC {
                    let receiver = state.pop()?;
                    if opcode == INVOKESPECIAL && member.name == "<init>" {
                        let initialized = match &receiver {
                            Slot::UninitializedThis => object(&self.class.name),
                            Slot::Uninitialized(new) => match self.ops[*new].1.operand() {
                                Some(Operand::Type(name)) => object(name),
                                _ => return Err(operand_mismatch(self.ops[*new].1)),
                            },
                            _ => receiver.clone(),
                        };
                        state.initialize(&receiver, &initialized);
                    }
                }
                if let Some(ret) = &method.ret {
                    state.push_field(ret);
                }
            }
            INVOKEDYNAMIC => {
                let Operand::InvokeDynamic(call) = operand else {
                    return Err(operand_mismatch(insn));
                };
                let method = self.types.method_type(&call.desc)?;
                state.pop_n(usize::from(method.argument_slots()))?;
                if let Some(ret) = &method.ret {
                    state.push_field(ret);
                }
            }
            NEW => state.push(Slot::Uninitialized(index)),
            NEWARRAY => {
                let Operand::Int(code) = operand else {
                    return Err(operand_mismatch(insn));
                };
                let desc = match *code {
                    T_BOOLEAN => "[Z",
                    T_CHAR => "[C",
                    T_FLOAT => "[F",
                    T_DOUBLE => "[D",
                    T_BYTE => "[B",
                    T_SHORT => "[S",
                    T_INT => "[I",
                    T_LONG => "[J",
                    other => {
                        return Err(Error::Encoding(format!(
                            "Invalid newarray element type {}",
                            other
                        )))
                    }
                };
                convert(state, 1, object(desc))?;
            }
            ANEWARRAY => {
                let Operand::Type(name) = operand else {
                    return Err(operand_mismatch(insn));
                };
                let desc = if name.starts_with('[') {
                    format!("[{}", name)
                } else {
                    format!("[L{};", name)
                };
                convert(state, 1, Slot::Object(desc))?;
            }
            ARRAYLENGTH | INSTANCEOF => convert(state, 1, Slot::Integer)?,
            CHECKCAST => {
                let Operand::Type(name) = operand else {
                    return Err(operand_mismatch(insn));
                };
                convert(state, 1, object(name))?;
            }
            MULTIANEWARRAY => {
                let Operand::MultiANewArray { desc, dims } = operand else {
                    return Err(operand_mismatch(insn));
                };
                convert(state, usize::from(*dims), object(desc))?;
            }
            other => {
                return Err(Error::Encoding(format!(
                    "Opcode {} can not appear in a decoded method body",
                    opcode_name(i32::from(other))
                )))
            }
        }
        Ok(())
    }
}

fn object(name: &str) -> Slot {
    Slot::Object(name.to_string())
}

fn var(operand: &Operand, insn: &Instruction) -> Result<u16> {
    match operand {
        Operand::Var(var) => Ok(*var),
        _ => Err(operand_mismatch(insn)),
    }
}

fn convert(state: &mut State, pop: usize, push: Slot) -> Result<()> {
    state.pop_n(pop)?;
    state.push(push);
    Ok(())
}

/// Entry based frame types from slot based state, with trailing `Top` locals trimmed.
fn to_frame(state: &State, new_labels: &HashMap<usize, Label>) -> Result<Frame> {
    let convert_slots = |slots: &[Slot]| -> Result<Vec<VerificationType>> {
        let mut out = Vec::with_capacity(slots.len());
        let mut index = 0;
        while index < slots.len() {
            let slot = &slots[index];
            out.push(match slot {
                Slot::Top => VerificationType::Top,
                Slot::Integer => VerificationType::Integer,
                Slot::Float => VerificationType::Float,
                Slot::Long => VerificationType::Long,
                Slot::Double => VerificationType::Double,
                Slot::Null => VerificationType::Null,
                Slot::UninitializedThis => VerificationType::UninitializedThis,
                Slot::Object(name) => VerificationType::Object(name.clone()),
                Slot::Uninitialized(new) => {
                    VerificationType::Uninitialized(*new_labels.get(new).ok_or_else(|| {
                        Error::Encoding("Uninitialized value without allocation site".to_string())
                    })?)
                }
            });
            index += if slot.is_wide() { 2 } else { 1 };
        }
        Ok(out)
    };

    let mut locals = convert_slots(&state.locals)?;
    while locals.last() == Some(&VerificationType::Top) {
        locals.pop();
    }
    Ok(Frame {
        locals,
        stack: convert_slots(&state.stack)?,
    })
}

/// Recompute stack map frames, `max_stack` and `max_locals` of a method body.
///
/// The returned [`Code`] is a copy of `code` with all previous frames removed, unreachable
/// code replaced and exception ranges trimmed around it, and a fresh frame at every position
/// the verifier requires one.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for methods that use `jsr`/`ret`, and
/// [`crate::Error::Encoding`] if the body is inconsistent (stack underflow, mismatching
/// stack heights at a merge point, unplaced labels).
pub fn compute_frames(
    class: &ClassUnit,
    method: &MethodUnit,
    code: &Code,
    hierarchy: &dyn TypeHierarchy,
    types: &TypeCache,
) -> Result<Code> {
    let mut result = code.clone();
    let stale: Vec<InsnId> = result
        .instructions
        .iter()
        .filter(|(_, insn)| matches!(insn, Instruction::Frame(_)))
        .map(|(id, _)| id)
        .collect();
    for id in stale {
        result.instructions.remove(id);
    }

    let locals = max_locals(method.access, &method.desc, &result.instructions, types)?;

    // analysis over an immutable view, edits applied afterwards
    let (plan, max_stack) = {
        let mut ops = Vec::new();
        let mut labels = HashMap::new();
        let mut pending = Vec::new();
        for (id, insn) in result.instructions.iter() {
            match insn {
                Instruction::Label(label) => pending.push(*label),
                Instruction::Op { .. } => {
                    for label in pending.drain(..) {
                        labels.insert(label, ops.len());
                    }
                    ops.push((id, insn));
                }
                _ => {}
            }
        }
        for label in pending {
            labels.insert(label, ops.len());
        }

        let mut analyzer = Analyzer {
            class,
            hierarchy,
            types,
            ops,
            labels,
            states: Vec::new(),
            max_stack: 0,
        };
        analyzer.states = vec![None; analyzer.ops.len()];

        let mut handlers = Vec::with_capacity(result.try_catch.len());
        for block in &result.try_catch {
            handlers.push(Handler {
                start: analyzer.boundary(block.start)?,
                end: analyzer.boundary(block.end)?,
                handler: analyzer.target(block.handler)?,
                catch: object(block.catch_type.as_deref().unwrap_or(THROWABLE)),
            });
        }

        let mut entry_locals: Vec<Slot> = Vec::with_capacity(usize::from(locals));
        for value in initial_frame(class, method)?.locals {
            let wide = value.is_wide();
            entry_locals.push(Slot::from_verification(&value));
            if wide {
                entry_locals.push(Slot::Top);
            }
        }
        entry_locals.resize(usize::from(locals), Slot::Top);
        analyzer.run(
            State {
                locals: entry_locals,
                stack: Vec::new(),
            },
            &handlers,
        )?;

        // frame positions: branch targets, handler entries, code after unconditional jumps
        let mut points = BTreeSet::new();
        for (index, (_, insn)) in analyzer.ops.iter().enumerate() {
            for label in jump_targets(insn) {
                points.insert(analyzer.target(label)?);
            }
            if let Some(opcode) = insn.opcode() {
                if is_unconditional(opcode) && index + 1 < analyzer.ops.len() {
                    points.insert(index + 1);
                }
            }
        }
        points.extend(handlers.iter().map(|handler| handler.handler));

        let mut dead = Vec::new();
        let mut index = 0;
        while index < analyzer.ops.len() {
            if analyzer.states[index].is_none() {
                let start = index;
                while index < analyzer.ops.len() && analyzer.states[index].is_none() {
                    index += 1;
                }
                dead.push((start, index));
            } else {
                index += 1;
            }
        }

        let plan = FramePlan {
            ops: analyzer.ops.iter().map(|(id, _)| *id).collect(),
            new_sites: analyzer
                .ops
                .iter()
                .enumerate()
                .filter(|(_, (_, insn))| insn.opcode() == Some(NEW))
                .map(|(index, _)| index)
                .collect(),
            frames: points
                .into_iter()
                .filter_map(|point| {
                    analyzer.states[point]
                        .clone()
                        .map(|state| (point, state))
                })
                .collect(),
            handlers,
            dead,
        };
        (plan, analyzer.max_stack)
    };

    let had_dead_code = !plan.dead.is_empty();
    plan.apply(&mut result)?;

    result.max_locals = locals;
    result.max_stack = u16::try_from(max_stack)
        .map_err(|_| Error::Encoding("Operand stack depth exceeds 65535".to_string()))?;
    if had_dead_code {
        result.max_stack = result.max_stack.max(1);
    }
    Ok(result)
}

/// Edits derived from the analysis, applied to the owned copy of the body.
struct FramePlan {
    ops: Vec<InsnId>,
    new_sites: Vec<usize>,
    frames: Vec<(usize, State)>,
    handlers: Vec<Handler>,
    dead: Vec<(usize, usize)>,
}

impl FramePlan {
    fn apply(self, code: &mut Code) -> Result<()> {
        let sequence = &mut code.instructions;

        // labels for allocation sites that frames refer to
        let mut new_labels = HashMap::new();
        for site in &self.new_sites {
            let referenced = self.frames.iter().any(|(_, state)| {
                state
                    .locals
                    .iter()
                    .chain(&state.stack)
                    .any(|slot| *slot == Slot::Uninitialized(*site))
            });
            if referenced {
                let label = sequence.new_label();
                sequence.insert_before(self.ops[*site], Instruction::Label(label));
                new_labels.insert(*site, label);
            }
        }

        for (point, state) in &self.frames {
            let frame = to_frame(state, &new_labels)?;
            sequence.insert_before(self.ops[*point], Instruction::Frame(frame));
        }

        if self.dead.is_empty() {
            return Ok(());
        }

        let mut boundaries: HashMap<usize, Label> = HashMap::new();
        for (start, end) in &self.dead {
            for index in *start..*end {
                let opcode = if index + 1 == *end { ATHROW } else { NOP };
                sequence.replace(self.ops[index], Instruction::simple(opcode));
            }
            sequence.insert_before(
                self.ops[*start],
                Instruction::Frame(Frame {
                    locals: Vec::new(),
                    stack: vec![VerificationType::Object(THROWABLE.to_string())],
                }),
            );
            for index in [*start, *end] {
                if boundaries.contains_key(&index) {
                    continue;
                }
                let label = sequence.new_label();
                match self.ops.get(index) {
                    Some(id) => {
                        // before any frame or line already anchored at this op
                        let mut anchor = *id;
                        while let Some(prev) = sequence.prev(anchor) {
                            if matches!(sequence.get(prev), Instruction::Op { .. }) {
                                break;
                            }
                            anchor = prev;
                        }
                        sequence.insert_before(anchor, Instruction::Label(label));
                    }
                    None => {
                        sequence.push_back(Instruction::Label(label));
                    }
                }
                boundaries.insert(index, label);
            }
        }

        let original = std::mem::take(&mut code.try_catch);
        for (block, handler) in original.into_iter().zip(&self.handlers) {
            let mut pieces = vec![(handler.start, handler.end)];
            for (dead_start, dead_end) in &self.dead {
                pieces = pieces
                    .into_iter()
                    .flat_map(|(start, end)| {
                        let cut_start = (*dead_start).min(end);
                        let cut_end = (*dead_end).max(start);
                        let mut kept = Vec::new();
                        if start < cut_start {
                            kept.push((start, cut_start));
                        }
                        if cut_end < end {
                            kept.push((cut_end, end));
                        }
                        kept
                    })
                    .collect();
            }

            let boundary = |index: usize| {
                boundaries.get(&index).copied().ok_or_else(|| {
                    Error::Encoding("Exception range split outside of dead code".to_string())
                })
            };
            for (start, end) in pieces {
                let start_label = if start == handler.start {
                    block.start
                } else {
                    boundary(start)?
                };
                let end_label = if end == handler.end {
                    block.end
                } else {
                    boundary(end)?
                };
                code.try_catch.push(TryCatchBlock {
                    start: start_label,
                    end: end_label,
                    handler: block.handler,
                    catch_type: block.catch_type.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Whether `method` should get frames at all: class files before version 50 do not carry them.
#[must_use]
pub fn frames_supported(class: &ClassUnit, method: &MethodUnit) -> bool {
    class.major_version >= 50 && !method.access.intersects(MethodAccess::ABSTRACT | MethodAccess::NATIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{DynamicCall, Handle, InstructionSequence},
        classfile::unit::ClassAccess,
    };

    fn class() -> ClassUnit {
        ClassUnit::new(
            52,
            ClassAccess::PUBLIC,
            "a/B",
            Some(OBJECT.to_string()),
        )
    }

    fn frames(code: &Code) -> Vec<Frame> {
        code.instructions
            .instructions()
            .filter_map(|insn| match insn {
                Instruction::Frame(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frame_at_branch_target() {
        let mut seq = InstructionSequence::new();
        let target = seq.new_label();
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::jump(IFEQ, target));
        seq.push_back(Instruction::ldc(Constant::String("x".to_string())));
        seq.push_back(Instruction::var(ASTORE, 1));
        seq.push_back(Instruction::Label(target));
        seq.push_back(Instruction::simple(RETURN));

        let method = MethodUnit::new(MethodAccess::STATIC, "f", "(I)V");
        let code = Code {
            instructions: seq,
            ..Code::default()
        };
        let computed = compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()).unwrap();

        assert_eq!(computed.max_stack, 1);
        assert_eq!(computed.max_locals, 2);
        // local 1 is only assigned on one path
        assert_eq!(
            frames(&computed),
            vec![Frame {
                locals: vec![VerificationType::Integer],
                stack: Vec::new(),
            }]
        );
    }

    #[test]
    fn merge_null_and_object() {
        let mut seq = InstructionSequence::new();
        let other = seq.new_label();
        let join = seq.new_label();
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::jump(IFEQ, other));
        seq.push_back(Instruction::ldc(Constant::String("x".to_string())));
        seq.push_back(Instruction::jump(GOTO, join));
        seq.push_back(Instruction::Label(other));
        seq.push_back(Instruction::simple(ACONST_NULL));
        seq.push_back(Instruction::Label(join));
        seq.push_back(Instruction::simple(ARETURN));

        let method = MethodUnit::new(MethodAccess::STATIC, "f", "(I)Ljava/lang/String;");
        let code = Code {
            instructions: seq,
            ..Code::default()
        };
        let computed = compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()).unwrap();
        let frames = frames(&computed);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].stack, Vec::new());
        assert_eq!(
            frames[1].stack,
            vec![VerificationType::Object("java/lang/String".to_string())]
        );
    }

    #[test]
    fn constructor_initializes_this() {
        let mut seq = InstructionSequence::new();
        let done = seq.new_label();
        seq.push_back(Instruction::var(ALOAD, 0));
        seq.push_back(Instruction::method(INVOKESPECIAL, OBJECT, "<init>", "()V", false));
        seq.push_back(Instruction::jump(GOTO, done));
        seq.push_back(Instruction::Label(done));
        seq.push_back(Instruction::simple(RETURN));

        let method = MethodUnit::new(MethodAccess::PUBLIC, "<init>", "()V");
        let code = Code {
            instructions: seq,
            ..Code::default()
        };
        let computed = compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()).unwrap();
        assert_eq!(
            frames(&computed),
            vec![Frame {
                locals: vec![VerificationType::Object("a/B".to_string())],
                stack: Vec::new(),
            }]
        );
    }

    #[test]
    fn dead_code_is_replaced() {
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::simple(RETURN));
        seq.push_back(Instruction::simple(ICONST_1));
        seq.push_back(Instruction::simple(POP));
        seq.push_back(Instruction::simple(RETURN));

        let method = MethodUnit::new(MethodAccess::STATIC, "f", "()V");
        let code = Code {
            instructions: seq,
            ..Code::default()
        };
        let computed = compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()).unwrap();
        let opcodes: Vec<_> = computed
            .instructions
            .instructions()
            .filter_map(Instruction::opcode)
            .collect();
        assert_eq!(opcodes, vec![RETURN, NOP, NOP, ATHROW]);
        assert_eq!(computed.max_stack, 1);
        assert_eq!(
            frames(&computed),
            vec![Frame {
                locals: Vec::new(),
                stack: vec![VerificationType::Object(THROWABLE.to_string())],
            }]
        );
    }

    #[test]
    fn handler_gets_frame() {
        let mut seq = InstructionSequence::new();
        let start = seq.new_label();
        let end = seq.new_label();
        let handler = seq.new_label();
        seq.push_back(Instruction::Label(start));
        seq.push_back(Instruction::method(INVOKESTATIC, "a/B", "g", "()V", false));
        seq.push_back(Instruction::Label(end));
        seq.push_back(Instruction::simple(RETURN));
        seq.push_back(Instruction::Label(handler));
        seq.push_back(Instruction::simple(ATHROW));

        let method = MethodUnit::new(MethodAccess::STATIC, "f", "()V");
        let mut code = Code {
            instructions: seq,
            ..Code::default()
        };
        code.try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: Some("java/io/IOException".to_string()),
        });
        let computed = compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()).unwrap();
        assert_eq!(
            frames(&computed),
            vec![Frame {
                locals: Vec::new(),
                stack: vec![VerificationType::Object("java/io/IOException".to_string())],
            }]
        );
        assert_eq!(computed.try_catch.len(), 1);
    }

    #[test]
    fn dynamic_constant_pushes_its_type() {
        let condy = Constant::Dynamic(Box::new(DynamicCall {
            name: "config".to_string(),
            desc: "Ljava/util/List;".to_string(),
            bootstrap: Handle {
                tag: H_INVOKESTATIC,
                owner: "a/Bootstrap".to_string(),
                name: "constant".to_string(),
                desc: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/Class;)Ljava/util/List;"
                    .to_string(),
                interface: false,
            },
            args: Vec::new(),
        }));

        let mut seq = InstructionSequence::new();
        let target = seq.new_label();
        seq.push_back(Instruction::ldc(condy));
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::jump(IFEQ, target));
        seq.push_back(Instruction::Label(target));
        seq.push_back(Instruction::simple(ARETURN));

        let method = MethodUnit::new(MethodAccess::STATIC, "f", "(I)Ljava/util/List;");
        let code = Code {
            instructions: seq,
            ..Code::default()
        };
        let computed = compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()).unwrap();

        assert_eq!(computed.max_stack, 2);
        assert_eq!(
            frames(&computed),
            vec![Frame {
                locals: vec![VerificationType::Integer],
                stack: vec![VerificationType::Object("java/util/List".to_string())],
            }]
        );
    }

    #[test]
    fn subroutines_are_rejected() {
        let mut seq = InstructionSequence::new();
        let sub = seq.new_label();
        seq.push_back(Instruction::jump(JSR, sub));
        seq.push_back(Instruction::simple(RETURN));
        seq.push_back(Instruction::Label(sub));
        seq.push_back(Instruction::var(ASTORE, 0));
        seq.push_back(Instruction::var(RET, 0));

        let method = MethodUnit::new(MethodAccess::STATIC, "f", "()V");
        let code = Code {
            instructions: seq,
            ..Code::default()
        };
        assert!(matches!(
            compute_frames(&class(), &method, &code, &DefaultHierarchy, &TypeCache::new()),
            Err(Error::NotSupported(_))
        ));
    }
}
