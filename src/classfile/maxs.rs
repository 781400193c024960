//! `max_stack` and `max_locals` computation.
//!
//! The operand stack depth is tracked along every control flow edge of the method body,
//! starting at depth 0 at the entry and at depth 1 at every exception handler. Each
//! instruction's effect comes from [`stack_effect`], which consults the [`TypeCache`] for
//! invoke and field descriptors.

use std::collections::HashMap;

use crate::{
    assembly::{opcodes::*, Constant, Instruction, InstructionSequence, Label, Operand},
    classfile::{
        descriptor::TypeCache,
        unit::{Code, MethodAccess},
    },
    Error, Result,
};

/// Number of stack slots popped and pushed by `insn`.
///
/// Pseudo-instructions have no effect.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a descriptor can not be parsed and
/// [`crate::Error::Encoding`] if the operand does not fit the opcode.
pub(crate) fn stack_effect(insn: &Instruction, types: &TypeCache) -> Result<(u16, u16)> {
    let Instruction::Op { opcode, operand } = insn else {
        return Ok((0, 0));
    };
    let opcode = *opcode;

    Ok(match opcode {
        NOP | IINC | GOTO | RET => (0, 0),
        ACONST_NULL..=ICONST_5 | FCONST_0..=FCONST_2 | BIPUSH | SIPUSH => (0, 1),
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => (0, 2),
        LDC => match operand {
            Operand::Ldc(constant) if constant.is_wide() => (0, 2),
            Operand::Ldc(Constant::Dynamic(call)) => (0, types.field_type(&call.desc)?.size()),
            Operand::Ldc(_) => (0, 1),
            _ => return Err(operand_mismatch(insn)),
        },
        ILOAD | FLOAD | ALOAD => (0, 1),
        LLOAD | DLOAD => (0, 2),
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => (2, 1),
        LALOAD | DALOAD => (2, 2),
        ISTORE | FSTORE | ASTORE => (1, 0),
        LSTORE | DSTORE => (2, 0),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => (3, 0),
        LASTORE | DASTORE => (4, 0),
        POP => (1, 0),
        POP2 => (2, 0),
        DUP => (1, 2),
        DUP_X1 => (2, 3),
        DUP_X2 => (3, 4),
        DUP2 => (2, 4),
        DUP2_X1 => (3, 5),
        DUP2_X2 => (4, 6),
        SWAP => (2, 2),
        IADD..=DREM => {
            if (opcode - IADD) % 2 == 0 {
                (2, 1)
            } else {
                (4, 2)
            }
        }
        INEG | FNEG => (1, 1),
        LNEG | DNEG => (2, 2),
        ISHL | ISHR | IUSHR => (2, 1),
        LSHL | LSHR | LUSHR => (3, 2),
        IAND | IOR | IXOR => (2, 1),
        LAND | LOR | LXOR => (4, 2),
        I2F | F2I | I2B | I2C | I2S => (1, 1),
        I2L | I2D | F2L | F2D => (1, 2),
        L2I | L2F | D2I | D2F => (2, 1),
        L2D | D2L => (2, 2),
        LCMP | DCMPL | DCMPG => (4, 1),
        FCMPL | FCMPG => (2, 1),
        IFEQ..=IFLE | IFNULL | IFNONNULL => (1, 0),
        IF_ICMPEQ..=IF_ACMPNE => (2, 0),
        JSR => (0, 1),
        TABLESWITCH | LOOKUPSWITCH => (1, 0),
        IRETURN | FRETURN | ARETURN => (1, 0),
        LRETURN | DRETURN => (2, 0),
        RETURN => (0, 0),
        GETSTATIC..=PUTFIELD => {
            let Operand::Field(member) = operand else {
                return Err(operand_mismatch(insn));
            };
            let size = types.field_type(&member.desc)?.size();
            match opcode {
                GETSTATIC => (0, size),
                PUTSTATIC => (size, 0),
                GETFIELD => (1, size),
                _ => (1 + size, 0),
            }
        }
        INVOKEVIRTUAL..=INVOKEINTERFACE => {
            let Operand::Method { member, .. } = operand else {
                return Err(operand_mismatch(insn));
            };
            let method = types.method_type(&member.desc)?;
            let receiver = u16::from(opcode != INVOKESTATIC);
            (method.argument_slots() + receiver, method.return_slots())
        }
        INVOKEDYNAMIC => {
            let Operand::InvokeDynamic(call) = operand else {
                return Err(operand_mismatch(insn));
            };
            let method = types.method_type(&call.desc)?;
            (method.argument_slots(), method.return_slots())
        }
        NEW => (0, 1),
        NEWARRAY | ANEWARRAY | ARRAYLENGTH | CHECKCAST | INSTANCEOF => (1, 1),
        ATHROW | MONITORENTER | MONITOREXIT => (1, 0),
        MULTIANEWARRAY => {
            let Operand::MultiANewArray { dims, .. } = operand else {
                return Err(operand_mismatch(insn));
            };
            (u16::from(*dims), 1)
        }
        other => {
            return Err(Error::Encoding(format!(
                "Opcode {} can not appear in a decoded method body",
                opcode_name(i32::from(other))
            )))
        }
    })
}

pub(crate) fn operand_mismatch(insn: &Instruction) -> Error {
    Error::Encoding(format!("Operand does not match opcode in {}", insn))
}

/// Labels mapped to the index of their node in sequence order.
pub(crate) fn label_positions(nodes: &[&Instruction]) -> HashMap<Label, usize> {
    nodes
        .iter()
        .enumerate()
        .filter_map(|(index, insn)| insn.as_label().map(|label| (label, index)))
        .collect()
}

/// Branch targets of `insn`, in operand order.
pub(crate) fn jump_targets(insn: &Instruction) -> Vec<Label> {
    match insn.operand() {
        Some(Operand::Jump(target)) => vec![*target],
        Some(Operand::TableSwitch {
            default, targets, ..
        }) => std::iter::once(*default).chain(targets.iter().copied()).collect(),
        Some(Operand::LookupSwitch { default, pairs }) => std::iter::once(*default)
            .chain(pairs.iter().map(|(_, target)| *target))
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve(positions: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    positions
        .get(&label)
        .copied()
        .ok_or_else(|| Error::Encoding(format!("Label {} is not placed in the method body", label)))
}

/// Maximum operand stack depth of `code`.
///
/// # Errors
/// Returns [`crate::Error::Encoding`] on stack underflow or unresolved labels.
pub fn max_stack(code: &Code, types: &TypeCache) -> Result<u16> {
    let nodes: Vec<&Instruction> = code.instructions.instructions().collect();
    let positions = label_positions(&nodes);

    let mut depths: Vec<Option<u16>> = vec![None; nodes.len()];
    let mut worklist = Vec::new();
    let mut max = 0u16;

    if !nodes.is_empty() {
        worklist.push((0usize, 0u16));
    }
    for block in &code.try_catch {
        worklist.push((resolve(&positions, block.handler)?, 1));
        max = max.max(1);
    }

    while let Some((start, depth)) = worklist.pop() {
        let mut index = start;
        let mut depth = depth;
        while index < nodes.len() {
            if depths[index].is_some() {
                break;
            }
            depths[index] = Some(depth);

            let insn = nodes[index];
            let Some(opcode) = insn.opcode() else {
                index += 1;
                continue;
            };

            let (pop, push) = stack_effect(insn, types)?;
            depth = depth.checked_sub(pop).ok_or_else(|| {
                Error::Encoding(format!("Operand stack underflow at {}", insn))
            })?;
            depth = depth.checked_add(push).ok_or_else(|| {
                Error::Encoding("Operand stack depth exceeds 65535".to_string())
            })?;
            max = max.max(depth);

            for target in jump_targets(insn) {
                worklist.push((resolve(&positions, target)?, depth));
            }

            if is_unconditional(opcode) {
                break;
            }
            if opcode == JSR {
                // the subroutine's return address is gone once control comes back
                depth -= 1;
            }
            index += 1;
        }
    }

    Ok(max)
}

/// Number of local variable slots used by the arguments and the instructions of a method.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `desc` is not a method descriptor.
pub fn max_locals(
    access: MethodAccess,
    desc: &str,
    instructions: &InstructionSequence,
    types: &TypeCache,
) -> Result<u16> {
    let method = types.method_type(desc)?;
    let mut max = method.argument_slots() + u16::from(!access.contains(MethodAccess::STATIC));

    for insn in instructions.instructions() {
        let used = match (insn.opcode(), insn.operand()) {
            (Some(LLOAD | DLOAD | LSTORE | DSTORE), Some(Operand::Var(var))) => {
                u32::from(*var) + 2
            }
            (Some(_), Some(Operand::Var(var))) => u32::from(*var) + 1,
            (Some(_), Some(Operand::Iinc { var, .. })) => u32::from(*var) + 1,
            _ => continue,
        };
        max = max.max(u16::try_from(used).map_err(|_| {
            Error::Encoding("Local variable index exceeds 65535 slots".to_string())
        })?);
    }

    Ok(max)
}

/// `max_stack` and `max_locals` of `code` as declared by `access` and `desc`.
///
/// # Errors
/// Same as [`max_stack`] and [`max_locals`].
pub fn compute_maxs(
    access: MethodAccess,
    desc: &str,
    code: &Code,
    types: &TypeCache,
) -> Result<(u16, u16)> {
    Ok((
        max_stack(code, types)?,
        max_locals(access, desc, &code.instructions, types)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::unit::TryCatchBlock;

    fn code(seq: InstructionSequence) -> Code {
        Code {
            instructions: seq,
            ..Code::default()
        }
    }

    #[test]
    fn straight_line_depth() {
        let types = TypeCache::new();
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::simple(LCONST_1));
        seq.push_back(Instruction::simple(LCONST_1));
        seq.push_back(Instruction::simple(LADD));
        seq.push_back(Instruction::simple(LRETURN));
        assert_eq!(max_stack(&code(seq), &types).unwrap(), 4);
    }

    #[test]
    fn invoke_uses_descriptor() {
        let types = TypeCache::new();
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::var(ALOAD, 0));
        seq.push_back(Instruction::simple(DCONST_0));
        seq.push_back(Instruction::simple(ICONST_0));
        seq.push_back(Instruction::method(INVOKEVIRTUAL, "a/B", "f", "(DI)J", false));
        seq.push_back(Instruction::simple(LRETURN));
        let code = code(seq);
        assert_eq!(max_stack(&code, &types).unwrap(), 4);
        assert_eq!(
            max_locals(MethodAccess::PUBLIC, "()J", &code.instructions, &types).unwrap(),
            1
        );
    }

    #[test]
    fn branches_and_handlers() {
        let types = TypeCache::new();
        let mut seq = InstructionSequence::new();
        let start = seq.new_label();
        let end = seq.new_label();
        let handler = seq.new_label();
        let skip = seq.new_label();

        seq.push_back(Instruction::Label(start));
        seq.push_back(Instruction::var(ILOAD, 0));
        seq.push_back(Instruction::jump(IFEQ, skip));
        seq.push_back(Instruction::field(GETSTATIC, "a/B", "d", "D"));
        seq.push_back(Instruction::simple(POP2));
        seq.push_back(Instruction::Label(skip));
        seq.push_back(Instruction::Label(end));
        seq.push_back(Instruction::simple(RETURN));
        seq.push_back(Instruction::Label(handler));
        seq.push_back(Instruction::var(ASTORE, 3));
        seq.push_back(Instruction::simple(RETURN));

        let mut code = code(seq);
        code.try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: None,
        });

        assert_eq!(max_stack(&code, &types).unwrap(), 2);
        assert_eq!(
            max_locals(MethodAccess::STATIC, "(I)V", &code.instructions, &types).unwrap(),
            4
        );
    }

    #[test]
    fn wide_locals() {
        let types = TypeCache::new();
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::simple(DCONST_0));
        seq.push_back(Instruction::var(DSTORE, 300));
        seq.push_back(Instruction::simple(RETURN));
        assert_eq!(
            max_locals(MethodAccess::STATIC, "()V", &seq, &types).unwrap(),
            302
        );
    }

    #[test]
    fn underflow_is_rejected() {
        let types = TypeCache::new();
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::simple(POP));
        seq.push_back(Instruction::simple(RETURN));
        assert!(matches!(
            max_stack(&code(seq), &types),
            Err(Error::Encoding(_))
        ));
    }
}
