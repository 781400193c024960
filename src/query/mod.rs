//! Search operations over an [`InstructionSequence`].
//!
//! Transform rules are dominated by "find this call, field or shape, then splice" work. The
//! functions in this module cover the find half: they are pure, never mutate the sequence, and
//! return [`InsnId`]s that stay valid until the referenced node is removed.
//!
//! # Key Components
//!
//! - [`find_matching`] / [`find_opcode`] - Linear scans with a predicate
//! - [`find_next`] / [`find_previous`] - Bounded scans away from a node
//! - [`find_surrounding`] / [`find_leading_nodes`] / [`find_trailing_nodes`] - Windows around a node
//! - [`find_calls`] / [`find_field_accesses`] - Member reference matching with wildcards
//! - [`find_returns`] - Every return instruction
//! - [`find_in_range`] - Nodes strictly between two nodes
//! - [`exception_sequence`] - Instructions that construct and throw an exception
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::assembly::{opcodes, Instruction, InstructionSequence};
//! use classweave::query::{self, MatchFlags, MethodPattern};
//!
//! let mut seq = InstructionSequence::new();
//! seq.push_back(Instruction::var(opcodes::ALOAD, 0));
//! seq.push_back(Instruction::method(opcodes::INVOKEVIRTUAL, "a/Foo", "tick", "()V", false));
//! seq.push_back(Instruction::simple(opcodes::RETURN));
//!
//! let pattern = MethodPattern::any().with_name("tick");
//! let calls = query::find_calls(&seq, MatchFlags::IGNORE_OWNER, -1, &pattern);
//! assert_eq!(calls.len(), 1);
//! assert_eq!(query::find_returns(&seq).len(), 1);
//! ```

pub mod pattern;

pub use pattern::{FieldPattern, MatchFlags, MemberKind, MemberMatcher, MemberPattern, MethodPattern};

use crate::assembly::{opcodes, Constant, InsnId, Instruction, InstructionSequence};

/// Every node whose instruction satisfies `predicate`, in sequence order.
pub fn find_matching<F>(seq: &InstructionSequence, predicate: F) -> Vec<InsnId>
where
    F: Fn(&Instruction) -> bool,
{
    seq.iter()
        .filter(|(_, insn)| predicate(insn))
        .map(|(id, _)| id)
        .collect()
}

/// Every node with the given opcode. Pseudo-instructions never match.
#[must_use]
pub fn find_opcode(seq: &InstructionSequence, opcode: u8) -> Vec<InsnId> {
    find_matching(seq, |insn| insn.opcode() == Some(opcode))
}

/// First node strictly after `start` satisfying `predicate`.
///
/// At most `limit` nodes are examined, whether or not they match. Pass `usize::MAX` for an
/// unbounded scan.
pub fn find_next<F>(seq: &InstructionSequence, start: InsnId, predicate: F, limit: usize) -> Option<InsnId>
where
    F: Fn(&Instruction) -> bool,
{
    scan(seq, start, predicate, limit, InstructionSequence::next)
}

/// First node strictly before `start` satisfying `predicate`, scanning backwards.
///
/// At most `limit` nodes are examined.
pub fn find_previous<F>(
    seq: &InstructionSequence,
    start: InsnId,
    predicate: F,
    limit: usize,
) -> Option<InsnId>
where
    F: Fn(&Instruction) -> bool,
{
    scan(seq, start, predicate, limit, InstructionSequence::prev)
}

fn scan<F, S>(seq: &InstructionSequence, start: InsnId, predicate: F, limit: usize, step: S) -> Option<InsnId>
where
    F: Fn(&Instruction) -> bool,
    S: Fn(&InstructionSequence, InsnId) -> Option<InsnId>,
{
    let mut current = step(seq, start);
    let mut examined = 0;
    while let Some(id) = current {
        if examined >= limit {
            return None;
        }
        examined += 1;

        if predicate(seq.get(id)) {
            return Some(id);
        }
        current = step(seq, id);
    }
    None
}

/// `node` plus up to `leading` predecessors and `trailing` successors, in sequence order.
///
/// Fewer nodes are returned when a sequence boundary is reached.
#[must_use]
pub fn find_surrounding(
    seq: &InstructionSequence,
    node: InsnId,
    leading: usize,
    trailing: usize,
) -> Vec<InsnId> {
    let mut nodes = Vec::with_capacity(leading + trailing + 1);

    let mut current = seq.prev(node);
    for _ in 0..leading {
        let Some(id) = current else { break };
        nodes.push(id);
        current = seq.prev(id);
    }
    nodes.reverse();

    nodes.push(node);

    let mut current = seq.next(node);
    for _ in 0..trailing {
        let Some(id) = current else { break };
        nodes.push(id);
        current = seq.next(id);
    }

    nodes
}

/// Up to `count` predecessors of `node`, in sequence order, without `node` itself.
#[must_use]
pub fn find_leading_nodes(seq: &InstructionSequence, node: InsnId, count: usize) -> Vec<InsnId> {
    let mut nodes = find_surrounding(seq, node, count, 0);
    nodes.pop();
    nodes
}

/// Up to `count` successors of `node`, in sequence order, without `node` itself.
#[must_use]
pub fn find_trailing_nodes(seq: &InstructionSequence, node: InsnId, count: usize) -> Vec<InsnId> {
    let mut nodes = find_surrounding(seq, node, 0, count);
    nodes.remove(0);
    nodes
}

/// Every method call matching `pattern`.
///
/// `opcode` of `-1`, or [`MatchFlags::IGNORE_OPCODE`], accepts any of `invokevirtual`,
/// `invokespecial`, `invokestatic` and `invokeinterface`.
#[must_use]
pub fn find_calls(
    seq: &InstructionSequence,
    flags: MatchFlags,
    opcode: i32,
    pattern: &MethodPattern,
) -> Vec<InsnId> {
    let matcher = MemberMatcher::new(MemberKind::Method, flags, opcode, pattern);
    find_matching(seq, |insn| matcher.matches(insn))
}

/// First matching method call strictly after `start`, examining at most `limit` nodes.
#[must_use]
pub fn find_next_call(
    seq: &InstructionSequence,
    start: InsnId,
    flags: MatchFlags,
    opcode: i32,
    pattern: &MethodPattern,
    limit: usize,
) -> Option<InsnId> {
    let matcher = MemberMatcher::new(MemberKind::Method, flags, opcode, pattern);
    find_next(seq, start, |insn| matcher.matches(insn), limit)
}

/// First matching method call strictly before `start`, examining at most `limit` nodes.
#[must_use]
pub fn find_previous_call(
    seq: &InstructionSequence,
    start: InsnId,
    flags: MatchFlags,
    opcode: i32,
    pattern: &MethodPattern,
    limit: usize,
) -> Option<InsnId> {
    let matcher = MemberMatcher::new(MemberKind::Method, flags, opcode, pattern);
    find_previous(seq, start, |insn| matcher.matches(insn), limit)
}

/// Every field access matching `pattern`.
///
/// `opcode` of `-1`, or [`MatchFlags::IGNORE_OPCODE`], accepts any of `getfield`, `putfield`,
/// `getstatic` and `putstatic`.
#[must_use]
pub fn find_field_accesses(
    seq: &InstructionSequence,
    flags: MatchFlags,
    opcode: i32,
    pattern: &FieldPattern,
) -> Vec<InsnId> {
    let matcher = MemberMatcher::new(MemberKind::Field, flags, opcode, pattern);
    find_matching(seq, |insn| matcher.matches(insn))
}

/// First matching field access strictly after `start`, examining at most `limit` nodes.
#[must_use]
pub fn find_next_field_access(
    seq: &InstructionSequence,
    start: InsnId,
    flags: MatchFlags,
    opcode: i32,
    pattern: &FieldPattern,
    limit: usize,
) -> Option<InsnId> {
    let matcher = MemberMatcher::new(MemberKind::Field, flags, opcode, pattern);
    find_next(seq, start, |insn| matcher.matches(insn), limit)
}

/// First matching field access strictly before `start`, examining at most `limit` nodes.
#[must_use]
pub fn find_previous_field_access(
    seq: &InstructionSequence,
    start: InsnId,
    flags: MatchFlags,
    opcode: i32,
    pattern: &FieldPattern,
    limit: usize,
) -> Option<InsnId> {
    let matcher = MemberMatcher::new(MemberKind::Field, flags, opcode, pattern);
    find_previous(seq, start, |insn| matcher.matches(insn), limit)
}

/// Every return instruction, of any value category.
#[must_use]
pub fn find_returns(seq: &InstructionSequence) -> Vec<InsnId> {
    find_matching(seq, |insn| insn.opcode().is_some_and(opcodes::is_return))
}

/// Nodes strictly between `start` and `end`.
///
/// Returns `None` if `end` is not reached scanning forward from `start`, which distinguishes
/// nodes in the wrong order from adjacent nodes (`Some` of an empty list).
#[must_use]
pub fn find_in_range(seq: &InstructionSequence, start: InsnId, end: InsnId) -> Option<Vec<InsnId>> {
    let mut nodes = Vec::new();
    let mut current = seq.next(start);
    while let Some(id) = current {
        if id == end {
            return Some(nodes);
        }
        nodes.push(id);
        current = seq.next(id);
    }
    None
}

/// Instructions that construct and throw an exception of class `type_name`.
///
/// Produces `new`, `dup`, an optional `ldc` of the message, `invokespecial <init>` with the
/// matching constructor descriptor, and `athrow`.
#[must_use]
pub fn exception_sequence(type_name: &str, message: Option<&str>) -> Vec<Instruction> {
    let mut insns = vec![
        Instruction::type_insn(opcodes::NEW, type_name),
        Instruction::simple(opcodes::DUP),
    ];

    let desc = match message {
        Some(message) => {
            insns.push(Instruction::ldc(Constant::String(message.to_string())));
            "(Ljava/lang/String;)V"
        }
        None => "()V",
    };

    insns.push(Instruction::method(
        opcodes::INVOKESPECIAL,
        type_name,
        "<init>",
        desc,
        false,
    ));
    insns.push(Instruction::simple(opcodes::ATHROW));
    insns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Operand;
    use std::cell::Cell;

    fn numbered(count: usize) -> (InstructionSequence, Vec<InsnId>) {
        let mut seq = InstructionSequence::new();
        let ids = (0..count)
            .map(|i| seq.push_back(Instruction::int(opcodes::SIPUSH, i as i32)))
            .collect();
        (seq, ids)
    }

    fn positions(seq: &InstructionSequence, ids: &[InsnId]) -> Vec<usize> {
        ids.iter().map(|id| seq.position(*id)).collect()
    }

    #[test]
    fn surrounding_window() {
        let (seq, ids) = numbered(10);
        let window = find_surrounding(&seq, ids[5], 2, 3);
        assert_eq!(positions(&seq, &window), vec![3, 4, 5, 6, 7, 8]);

        let start = find_surrounding(&seq, ids[0], 2, 3);
        assert_eq!(positions(&seq, &start), vec![0, 1, 2, 3]);

        let end = find_surrounding(&seq, ids[9], 2, 3);
        assert_eq!(positions(&seq, &end), vec![7, 8, 9]);
    }

    #[test]
    fn leading_and_trailing_drop_anchor() {
        let (seq, ids) = numbered(10);
        assert_eq!(positions(&seq, &find_leading_nodes(&seq, ids[5], 2)), vec![3, 4]);
        assert_eq!(positions(&seq, &find_trailing_nodes(&seq, ids[5], 2)), vec![6, 7]);
        assert!(find_leading_nodes(&seq, ids[0], 3).is_empty());
        assert!(find_trailing_nodes(&seq, ids[9], 3).is_empty());
    }

    #[test]
    fn in_range() {
        let (seq, ids) = numbered(5);
        assert_eq!(
            find_in_range(&seq, ids[1], ids[4]).map(|r| positions(&seq, &r)),
            Some(vec![2, 3])
        );
        assert_eq!(find_in_range(&seq, ids[1], ids[2]), Some(vec![]));
        assert_eq!(find_in_range(&seq, ids[4], ids[1]), None);
    }

    #[test]
    fn next_examines_at_most_limit() {
        let (seq, ids) = numbered(10);
        let examined = Cell::new(0);
        let found = find_next(
            &seq,
            ids[0],
            |_| {
                examined.set(examined.get() + 1);
                false
            },
            3,
        );
        assert_eq!(found, None);
        assert_eq!(examined.get(), 3);

        let target = |insn: &Instruction| insn.operand() == Some(&Operand::Int(4));
        assert_eq!(find_next(&seq, ids[0], target, 3), None);
        assert_eq!(find_next(&seq, ids[0], target, 4), Some(ids[4]));
        assert_eq!(find_next(&seq, ids[4], target, usize::MAX), None);
    }

    #[test]
    fn previous_scans_backwards() {
        let (seq, ids) = numbered(6);
        let even = |insn: &Instruction| matches!(insn.operand(), Some(Operand::Int(v)) if v % 2 == 0);
        assert_eq!(find_previous(&seq, ids[5], even, usize::MAX), Some(ids[4]));
        assert_eq!(find_previous(&seq, ids[4], even, 1), None);
        assert_eq!(find_previous(&seq, ids[0], even, usize::MAX), None);
    }

    fn calls_fixture() -> InstructionSequence {
        let mut seq = InstructionSequence::new();
        seq.push_back(Instruction::method(opcodes::INVOKESTATIC, "a/A", "run", "()V", false));
        seq.push_back(Instruction::method(opcodes::INVOKEVIRTUAL, "b/B", "run", "()V", false));
        seq.push_back(Instruction::method(opcodes::INVOKEINTERFACE, "c/C", "run", "(I)V", true));
        seq.push_back(Instruction::field(opcodes::GETSTATIC, "a/A", "count", "I"));
        seq.push_back(Instruction::field(opcodes::PUTFIELD, "b/B", "count", "J"));
        seq.push_back(Instruction::simple(opcodes::RETURN));
        seq
    }

    #[test]
    fn calls_with_wildcards() {
        let seq = calls_fixture();
        let run = MethodPattern::any().with_name("run");
        assert_eq!(find_calls(&seq, MatchFlags::empty(), -1, &run).len(), 3);
        assert_eq!(
            find_calls(&seq, MatchFlags::empty(), i32::from(opcodes::INVOKESTATIC), &run).len(),
            1
        );

        let exact = MethodPattern::exact("b/B", "run", "()V");
        assert_eq!(find_calls(&seq, MatchFlags::empty(), -1, &exact).len(), 1);
        assert_eq!(find_calls(&seq, MatchFlags::IGNORE_OWNER, -1, &exact).len(), 2);
        assert_eq!(
            find_calls(
                &seq,
                MatchFlags::IGNORE_OWNER | MatchFlags::IGNORE_DESCRIPTOR,
                -1,
                &exact
            )
            .len(),
            3
        );
    }

    #[test]
    fn next_and_previous_call() {
        let seq = calls_fixture();
        let first = seq.first().unwrap();
        let pattern = MethodPattern::any().with_owner("c/C");
        let found = find_next_call(&seq, first, MatchFlags::empty(), -1, &pattern, usize::MAX);
        assert_eq!(found.map(|id| seq.position(id)), Some(2));
        assert_eq!(find_next_call(&seq, first, MatchFlags::empty(), -1, &pattern, 1), None);

        let last = seq.last().unwrap();
        let any = MethodPattern::any();
        let back = find_previous_call(&seq, last, MatchFlags::empty(), -1, &any, usize::MAX);
        assert_eq!(back.map(|id| seq.position(id)), Some(2));
    }

    #[test]
    fn field_accesses() {
        let seq = calls_fixture();
        let count = FieldPattern::any().with_name("count");
        assert_eq!(find_field_accesses(&seq, MatchFlags::empty(), -1, &count).len(), 2);
        assert_eq!(
            find_field_accesses(&seq, MatchFlags::empty(), i32::from(opcodes::PUTFIELD), &count).len(),
            1
        );

        let first = seq.first().unwrap();
        let long = FieldPattern::any().with_desc("J");
        let found = find_next_field_access(&seq, first, MatchFlags::empty(), -1, &long, usize::MAX);
        assert_eq!(found.map(|id| seq.position(id)), Some(4));

        let last = seq.last().unwrap();
        let back = find_previous_field_access(&seq, last, MatchFlags::IGNORE_DESCRIPTOR, -1, &long, 2);
        assert_eq!(back.map(|id| seq.position(id)), Some(4));
    }

    #[test]
    fn returns_and_opcodes() {
        let seq = calls_fixture();
        assert_eq!(find_returns(&seq).len(), 1);
        assert_eq!(find_opcode(&seq, opcodes::GETSTATIC).len(), 1);
    }

    #[test]
    fn exception_with_and_without_message() {
        let plain = exception_sequence("java/lang/IllegalStateException", None);
        assert_eq!(plain.len(), 4);
        assert_eq!(
            plain[2].member().map(|m| m.desc.as_str()),
            Some("()V")
        );

        let message = exception_sequence("java/lang/IllegalStateException", Some("nope"));
        assert_eq!(message.len(), 5);
        assert_eq!(
            message[2],
            Instruction::ldc(Constant::String("nope".to_string()))
        );
        assert_eq!(
            message[3].member().map(|m| m.desc.as_str()),
            Some("(Ljava/lang/String;)V")
        );
        assert_eq!(message[4].opcode(), Some(opcodes::ATHROW));
    }
}
