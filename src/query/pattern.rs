//! Member patterns for call and field-access queries.
//!
//! A [`crate::query::pattern::MemberPattern`] names an owner, a member name and a descriptor,
//! each optional. Together with [`crate::query::pattern::MatchFlags`] and an opcode it is
//! compiled once into a [`crate::query::pattern::MemberMatcher`] that only carries the checks
//! that remain after wildcards are removed, so scanning a method does not re-evaluate which
//! fields to compare at every node.

use bitflags::bitflags;

use crate::assembly::{opcodes, Instruction, MemberRef, Operand};

bitflags! {
    /// Wildcard selection for call and field-access queries.
    ///
    /// A set flag means the corresponding field of the pattern is not checked, even if the
    /// pattern provides a value for it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MatchFlags: u32 {
        /// Accept any owner
        const IGNORE_OWNER = 1 << 0;
        /// Accept any member name
        const IGNORE_NAME = 1 << 1;
        /// Accept any descriptor
        const IGNORE_DESCRIPTOR = 1 << 2;
        /// Accept any opcode of the reserved set
        const IGNORE_OPCODE = 1 << 3;
    }
}

/// Owner / name / descriptor pattern. `None` fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MemberPattern {
    /// Required owner internal name
    pub owner: Option<String>,
    /// Required member name
    pub name: Option<String>,
    /// Required descriptor
    pub desc: Option<String>,
}

/// Pattern used by the method call queries
pub type MethodPattern = MemberPattern;

/// Pattern used by the field access queries
pub type FieldPattern = MemberPattern;

impl MemberPattern {
    /// Pattern matching every member
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Pattern requiring all three fields
    pub fn exact(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        MemberPattern {
            owner: Some(owner.into()),
            name: Some(name.into()),
            desc: Some(desc.into()),
        }
    }

    /// Require the owner
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Require the member name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require the descriptor
    #[must_use]
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }
}

impl From<&MemberRef> for MemberPattern {
    fn from(member: &MemberRef) -> Self {
        MemberPattern::exact(&member.owner, &member.name, &member.desc)
    }
}

/// Which operand kind a matcher accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`
    Method,
    /// `getfield`, `putfield`, `getstatic`, `putstatic`
    Field,
}

impl MemberKind {
    fn reserved(self, opcode: u8) -> bool {
        match self {
            MemberKind::Method => opcodes::is_invoke(opcode),
            MemberKind::Field => opcodes::is_field_access(opcode),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OpcodeCheck {
    Reserved,
    Exact(u8),
    Never,
}

#[derive(Debug, Clone, Copy)]
enum FieldCheck<'p> {
    Owner(&'p str),
    Name(&'p str),
    Desc(&'p str),
}

impl FieldCheck<'_> {
    fn accepts(self, member: &MemberRef) -> bool {
        match self {
            FieldCheck::Owner(owner) => member.owner == owner,
            FieldCheck::Name(name) => member.name == name,
            FieldCheck::Desc(desc) => member.desc == desc,
        }
    }
}

/// Predicate specialised from a pattern, flags and opcode.
///
/// Build it once per query with [`MemberMatcher::new`]; [`MemberMatcher::matches`] then only
/// performs the comparisons that survived specialisation.
#[derive(Debug, Clone)]
pub struct MemberMatcher<'p> {
    kind: MemberKind,
    opcode: OpcodeCheck,
    checks: Vec<FieldCheck<'p>>,
}

impl<'p> MemberMatcher<'p> {
    /// Specialise `pattern` for the given flags and opcode.
    ///
    /// `opcode` of [`opcodes::UNKNOWN`] or the [`MatchFlags::IGNORE_OPCODE`] flag accept any
    /// opcode of the reserved set for `kind`.
    #[must_use]
    pub fn new(kind: MemberKind, flags: MatchFlags, opcode: i32, pattern: &'p MemberPattern) -> Self {
        let opcode = if flags.contains(MatchFlags::IGNORE_OPCODE) || opcode == opcodes::UNKNOWN {
            OpcodeCheck::Reserved
        } else {
            match u8::try_from(opcode) {
                Ok(opcode) if kind.reserved(opcode) => OpcodeCheck::Exact(opcode),
                _ => OpcodeCheck::Never,
            }
        };

        let mut checks = Vec::with_capacity(3);
        if !flags.contains(MatchFlags::IGNORE_NAME) {
            if let Some(name) = pattern.name.as_deref() {
                checks.push(FieldCheck::Name(name));
            }
        }
        if !flags.contains(MatchFlags::IGNORE_OWNER) {
            if let Some(owner) = pattern.owner.as_deref() {
                checks.push(FieldCheck::Owner(owner));
            }
        }
        if !flags.contains(MatchFlags::IGNORE_DESCRIPTOR) {
            if let Some(desc) = pattern.desc.as_deref() {
                checks.push(FieldCheck::Desc(desc));
            }
        }

        MemberMatcher {
            kind,
            opcode,
            checks,
        }
    }

    /// Number of field comparisons performed per candidate
    #[must_use]
    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    /// Test one instruction
    #[must_use]
    pub fn matches(&self, insn: &Instruction) -> bool {
        let Instruction::Op { opcode, operand } = insn else {
            return false;
        };

        let opcode_ok = match self.opcode {
            OpcodeCheck::Reserved => self.kind.reserved(*opcode),
            OpcodeCheck::Exact(expected) => *opcode == expected,
            OpcodeCheck::Never => false,
        };
        if !opcode_ok {
            return false;
        }

        let member = match (self.kind, operand) {
            (MemberKind::Method, Operand::Method { member, .. }) => member,
            (MemberKind::Field, Operand::Field(member)) => member,
            _ => return false,
        };

        self.checks.iter().all(|check| check.accepts(member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(owner: &str, name: &str, desc: &str) -> Instruction {
        Instruction::method(opcodes::INVOKEVIRTUAL, owner, name, desc, false)
    }

    #[test]
    fn flags_drop_checks() {
        let pattern = MemberPattern::exact("a/B", "f", "()V");
        let all = MemberMatcher::new(MemberKind::Method, MatchFlags::empty(), -1, &pattern);
        assert_eq!(all.check_count(), 3);

        let flags = MatchFlags::IGNORE_OWNER | MatchFlags::IGNORE_DESCRIPTOR;
        let name_only = MemberMatcher::new(MemberKind::Method, flags, -1, &pattern);
        assert_eq!(name_only.check_count(), 1);
        assert!(name_only.matches(&call("x/Y", "f", "(I)I")));
        assert!(!name_only.matches(&call("a/B", "g", "()V")));
    }

    #[test]
    fn none_fields_are_unconstrained() {
        let pattern = MemberPattern::any().with_name("f");
        let matcher = MemberMatcher::new(MemberKind::Method, MatchFlags::empty(), -1, &pattern);
        assert_eq!(matcher.check_count(), 1);
        assert!(matcher.matches(&call("q/R", "f", "()J")));
    }

    #[test]
    fn opcode_selection() {
        let pattern = MemberPattern::any();
        let exact = MemberMatcher::new(
            MemberKind::Method,
            MatchFlags::empty(),
            i32::from(opcodes::INVOKESTATIC),
            &pattern,
        );
        assert!(!exact.matches(&call("a/B", "f", "()V")));

        let ignored = MemberMatcher::new(
            MemberKind::Method,
            MatchFlags::IGNORE_OPCODE,
            i32::from(opcodes::INVOKESTATIC),
            &pattern,
        );
        assert!(ignored.matches(&call("a/B", "f", "()V")));

        let outside = MemberMatcher::new(
            MemberKind::Method,
            MatchFlags::empty(),
            i32::from(opcodes::GETFIELD),
            &pattern,
        );
        assert!(!outside.matches(&Instruction::field(opcodes::GETFIELD, "a/B", "x", "I")));
    }

    #[test]
    fn kinds_do_not_cross() {
        let pattern = MemberPattern::any();
        let fields = MemberMatcher::new(MemberKind::Field, MatchFlags::empty(), -1, &pattern);
        assert!(fields.matches(&Instruction::field(opcodes::PUTSTATIC, "a/B", "x", "I")));
        assert!(!fields.matches(&call("a/B", "f", "()V")));
        assert!(!fields.matches(&Instruction::simple(opcodes::RETURN)));
    }
}
