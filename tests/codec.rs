//! Integration tests for decoding, editing and re-encoding class files.

use classweave::{
    prelude::*,
    classfile::RawAttribute,
    query::{self, exception_sequence},
};

fn class_with(major_version: u16, method: MethodUnit) -> ClassUnit {
    let mut class = ClassUnit::new(
        major_version,
        ClassAccess::PUBLIC | ClassAccess::SUPER,
        "com/example/Worker",
        Some("java/lang/Object".to_string()),
    );
    class.methods.push(method);
    class
}

fn static_method(name: &str, seq: InstructionSequence, max_stack: u16) -> MethodUnit {
    let mut method = MethodUnit::new(MethodAccess::STATIC, name, "()V");
    method.code = Some(Code {
        max_stack,
        instructions: seq,
        ..Code::default()
    });
    method
}

fn tick() -> Instruction {
    Instruction::method(opcodes::INVOKESTATIC, "com/example/Clock", "tick", "()V", false)
}

#[test]
fn spliced_throw_gets_new_maxs() {
    let mut seq = InstructionSequence::new();
    seq.push_back(tick());
    seq.push_back(Instruction::simple(opcodes::RETURN));
    let bytes = class_with(52, static_method("check", seq, 0))
        .to_bytes(EncodeFlags::empty())
        .unwrap();

    let mut class = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    let code = class
        .find_method_mut("check", "()V")
        .and_then(|method| method.code.as_mut())
        .unwrap();

    let pattern = MethodPattern::any().with_name("tick").with_desc("()V");
    let calls = query::find_calls(&code.instructions, MatchFlags::IGNORE_OWNER, -1, &pattern);
    assert_eq!(calls.len(), 1);

    let returns = query::find_returns(&code.instructions);
    assert_eq!(returns.len(), 1);
    code.instructions.insert_all_before(
        returns[0],
        exception_sequence("java/lang/IllegalStateException", Some("stopped")),
    );

    let bytes = class.to_bytes(EncodeFlags::COMPUTE_MAXS).unwrap();
    let class = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    let code = class
        .find_method("check", "()V")
        .and_then(|method| method.code.as_ref())
        .unwrap();
    assert_eq!(code.max_stack, 3);

    let init = MethodPattern::any()
        .with_owner("java/lang/IllegalStateException")
        .with_name("<init>");
    let constructors = query::find_calls(
        &code.instructions,
        MatchFlags::empty(),
        i32::from(opcodes::INVOKESPECIAL),
        &init,
    );
    assert_eq!(constructors.len(), 1);
    assert_eq!(
        query::find_opcode(&code.instructions, opcodes::ATHROW).len(),
        1
    );
}

#[test]
fn exception_table_survives_round_trip() {
    let mut seq = InstructionSequence::new();
    let start = seq.new_label();
    let end = seq.new_label();
    let handler = seq.new_label();
    seq.push_back(Instruction::Label(start));
    seq.push_back(tick());
    seq.push_back(Instruction::Label(end));
    seq.push_back(Instruction::simple(opcodes::RETURN));
    seq.push_back(Instruction::Label(handler));
    seq.push_back(Instruction::simple(opcodes::POP));
    seq.push_back(Instruction::simple(opcodes::RETURN));

    let mut method = static_method("guarded", seq, 1);
    if let Some(code) = method.code.as_mut() {
        code.try_catch.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: Some("java/lang/Exception".to_string()),
        });
    }

    let bytes = class_with(49, method).to_bytes(EncodeFlags::empty()).unwrap();
    let class = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    let code = class
        .find_method("guarded", "()V")
        .and_then(|method| method.code.as_ref())
        .unwrap();

    assert_eq!(code.try_catch.len(), 1);
    let block = &code.try_catch[0];
    assert_eq!(block.catch_type.as_deref(), Some("java/lang/Exception"));

    let seq = &code.instructions;
    let position_of = |label: Label| {
        seq.ids()
            .position(|id| seq.get(id).as_label() == Some(label))
            .unwrap()
    };
    assert!(position_of(block.start) < position_of(block.end));
    assert!(position_of(block.end) < position_of(block.handler));
}

#[test]
fn unknown_attributes_are_preserved() {
    let mut seq = InstructionSequence::new();
    seq.push_back(Instruction::simple(opcodes::RETURN));
    let mut class = class_with(52, static_method("noop", seq, 0));
    class.attributes.push(RawAttribute {
        name: "com.example.Checksum".to_string(),
        data: vec![0xDE, 0xAD, 0xBE, 0xEF],
    });

    let bytes = class.to_bytes(EncodeFlags::empty()).unwrap();
    let decoded = ClassUnit::parse(&bytes, ReaderFlags::empty()).unwrap();
    assert_eq!(decoded.attributes, class.attributes);

    let header = ClassReader::new(&bytes).unwrap();
    assert_eq!(header.class_name().unwrap(), "com/example/Worker");
    assert_eq!(header.major_version(), 52);
}

#[test]
fn truncated_class_is_rejected() {
    let mut seq = InstructionSequence::new();
    seq.push_back(Instruction::simple(opcodes::RETURN));
    let bytes = class_with(52, static_method("noop", seq, 0))
        .to_bytes(EncodeFlags::empty())
        .unwrap();

    let truncated = &bytes[..bytes.len() - 3];
    assert!(ClassUnit::parse(truncated, ReaderFlags::empty()).is_err());
    assert!(matches!(
        ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBF, 0, 0, 0, 52]),
        Err(Error::Malformed { .. })
    ));
}
