//! Arena-backed, doubly-linked instruction list of one method body.
//!
//! [`crate::assembly::sequence::InstructionSequence`] owns every
//! [`crate::assembly::Instruction`] of a method. Nodes live in an arena and are addressed by
//! [`crate::assembly::sequence::InsnId`]; each node stores the ids of its neighbours, so
//! insertion and removal at a known node are O(1) and never move other nodes.
//!
//! # Invariants
//!
//! - The chain is always consistent: if `next(a) == Some(b)` then `prev(b) == Some(a)`.
//! - `None` is only ever returned by `prev` of the first node and `next` of the last node.
//! - Ids of removed nodes are never handed out again. Using one afterwards is a programming
//!   error and panics.
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::assembly::{opcodes, Instruction, InstructionSequence};
//!
//! let mut seq = InstructionSequence::new();
//! let load = seq.push_back(Instruction::var(opcodes::ALOAD, 0));
//! let ret = seq.push_back(Instruction::simple(opcodes::ARETURN));
//!
//! seq.insert_after(load, Instruction::simple(opcodes::DUP));
//! seq.insert_before(ret, Instruction::simple(opcodes::POP));
//!
//! let opcodes: Vec<_> = seq.iter().filter_map(|(_, insn)| insn.opcode()).collect();
//! assert_eq!(
//!     opcodes,
//!     vec![opcodes::ALOAD, opcodes::DUP, opcodes::POP, opcodes::ARETURN]
//! );
//! ```

use std::fmt;

use crate::assembly::instruction::{Instruction, Label};

/// Stable handle of a node within one [`InstructionSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(u32);

impl InsnId {
    /// Arena slot of this id. Slots are assigned in allocation order, not sequence order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    insn: Instruction,
    prev: Option<InsnId>,
    next: Option<InsnId>,
}

/// Ordered instruction list of one method body.
#[derive(Debug, Clone, Default)]
pub struct InstructionSequence {
    slots: Vec<Option<Node>>,
    first: Option<InsnId>,
    last: Option<InsnId>,
    len: usize,
    labels: u32,
}

impl InstructionSequence {
    /// Create an empty sequence
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the sequence has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate a fresh label, unique within this sequence.
    ///
    /// The label is not placed anywhere until an [`Instruction::Label`] holding it is inserted.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.labels);
        self.labels += 1;
        label
    }

    /// Number of labels allocated so far
    #[must_use]
    pub fn label_count(&self) -> u32 {
        self.labels
    }

    /// First node, or `None` if empty
    #[must_use]
    pub fn first(&self) -> Option<InsnId> {
        self.first
    }

    /// Last node, or `None` if empty
    #[must_use]
    pub fn last(&self) -> Option<InsnId> {
        self.last
    }

    /// Successor of `id`, or `None` at the end of the sequence.
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    #[must_use]
    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.node(id).next
    }

    /// Predecessor of `id`, or `None` at the start of the sequence.
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    #[must_use]
    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        self.node(id).prev
    }

    /// Returns `true` if `id` refers to a live node of this sequence
    #[must_use]
    pub fn contains(&self, id: InsnId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    /// The instruction at `id`.
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    #[must_use]
    pub fn get(&self, id: InsnId) -> &Instruction {
        &self.node(id).insn
    }

    /// Mutable access to the instruction at `id`.
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    pub fn get_mut(&mut self, id: InsnId) -> &mut Instruction {
        &mut self.node_mut(id).insn
    }

    /// Append an instruction at the end
    pub fn push_back(&mut self, insn: Instruction) -> InsnId {
        let id = self.allocate(insn, self.last, None);
        match self.last {
            Some(last) => self.node_mut(last).next = Some(id),
            None => self.first = Some(id),
        }
        self.last = Some(id);
        id
    }

    /// Prepend an instruction at the start
    pub fn push_front(&mut self, insn: Instruction) -> InsnId {
        let id = self.allocate(insn, None, self.first);
        match self.first {
            Some(first) => self.node_mut(first).prev = Some(id),
            None => self.last = Some(id),
        }
        self.first = Some(id);
        id
    }

    /// Insert `insn` directly after `anchor`.
    ///
    /// # Panics
    /// Panics if `anchor` was removed or belongs to another sequence.
    pub fn insert_after(&mut self, anchor: InsnId, insn: Instruction) -> InsnId {
        let next = self.node(anchor).next;
        let id = self.allocate(insn, Some(anchor), next);
        self.node_mut(anchor).next = Some(id);
        match next {
            Some(next) => self.node_mut(next).prev = Some(id),
            None => self.last = Some(id),
        }
        id
    }

    /// Insert `insn` directly before `anchor`.
    ///
    /// # Panics
    /// Panics if `anchor` was removed or belongs to another sequence.
    pub fn insert_before(&mut self, anchor: InsnId, insn: Instruction) -> InsnId {
        let prev = self.node(anchor).prev;
        let id = self.allocate(insn, prev, Some(anchor));
        self.node_mut(anchor).prev = Some(id);
        match prev {
            Some(prev) => self.node_mut(prev).next = Some(id),
            None => self.first = Some(id),
        }
        id
    }

    /// Insert several instructions after `anchor`, keeping their order.
    ///
    /// Returns the ids of the inserted nodes in sequence order.
    pub fn insert_all_after<I>(&mut self, anchor: InsnId, insns: I) -> Vec<InsnId>
    where
        I: IntoIterator<Item = Instruction>,
    {
        let mut cursor = anchor;
        let mut ids = Vec::new();
        for insn in insns {
            cursor = self.insert_after(cursor, insn);
            ids.push(cursor);
        }
        ids
    }

    /// Insert several instructions before `anchor`, keeping their order.
    ///
    /// Returns the ids of the inserted nodes in sequence order.
    pub fn insert_all_before<I>(&mut self, anchor: InsnId, insns: I) -> Vec<InsnId>
    where
        I: IntoIterator<Item = Instruction>,
    {
        insns
            .into_iter()
            .map(|insn| self.insert_before(anchor, insn))
            .collect()
    }

    /// Unlink and return the instruction at `id`. The id becomes stale.
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    pub fn remove(&mut self, id: InsnId) -> Instruction {
        let node = self
            .slots
            .get_mut(id.index())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("stale instruction id {}", id));

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.first = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.last = node.prev,
        }

        self.len -= 1;
        node.insn
    }

    /// Swap the instruction at `id` for `insn` in place, returning the old one.
    ///
    /// The id and the node's position are unchanged.
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    pub fn replace(&mut self, id: InsnId, insn: Instruction) -> Instruction {
        std::mem::replace(&mut self.node_mut(id).insn, insn)
    }

    /// Iterate over `(id, instruction)` pairs in sequence order
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            seq: self,
            current: self.first,
            remaining: self.len,
        }
    }

    /// Ids in sequence order
    pub fn ids(&self) -> impl Iterator<Item = InsnId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Instructions in sequence order
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.iter().map(|(_, insn)| insn)
    }

    /// Zero-based position of `id` in sequence order. O(n).
    ///
    /// # Panics
    /// Panics if `id` was removed or belongs to another sequence.
    #[must_use]
    pub fn position(&self, id: InsnId) -> usize {
        let _ = self.node(id);
        let mut position = 0;
        let mut current = self.first;
        while let Some(node) = current {
            if node == id {
                break;
            }
            position += 1;
            current = self.next(node);
        }
        position
    }

    fn allocate(&mut self, insn: Instruction, prev: Option<InsnId>, next: Option<InsnId>) -> InsnId {
        let id = InsnId(
            u32::try_from(self.slots.len()).unwrap_or_else(|_| panic!("instruction arena full")),
        );
        self.slots.push(Some(Node { insn, prev, next }));
        self.len += 1;
        id
    }

    fn node(&self, id: InsnId) -> &Node {
        match self.slots.get(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("stale instruction id {}", id),
        }
    }

    fn node_mut(&mut self, id: InsnId) -> &mut Node {
        match self.slots.get_mut(id.index()) {
            Some(Some(node)) => node,
            _ => panic!("stale instruction id {}", id),
        }
    }
}

impl FromIterator<Instruction> for InstructionSequence {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        let mut seq = InstructionSequence::new();
        seq.extend(iter);
        seq
    }
}

impl Extend<Instruction> for InstructionSequence {
    fn extend<T: IntoIterator<Item = Instruction>>(&mut self, iter: T) {
        for insn in iter {
            self.push_back(insn);
        }
    }
}

/// Forward iterator over an [`InstructionSequence`]
pub struct Iter<'a> {
    seq: &'a InstructionSequence,
    current: Option<InsnId>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InsnId, &'a Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let node = self.seq.node(id);
        self.current = node.next;
        self.remaining -= 1;
        Some((id, &node.insn))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a InstructionSequence {
    type Item = (InsnId, &'a Instruction);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
