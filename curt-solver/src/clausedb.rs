//! Clause storage for the solver
//!
//! Clauses live in an arena of slots indexed by
//! [Clause](../../curt_common/clause/struct.Clause.html). A slot keeps the
//! literals, a word of status bits, the proof footer linking the clause to
//! the derivation log, and a forwarding index used after compacting
//! collection.

use bitfield::bitfield;
use curt_common::{
    clause::{Clause, Tagged32},
    invariant,
    literal::Literal,
    memory::{HeapSpace, Offset},
    requires,
};
use curt_macros::HeapSpace;
use std::mem::size_of;

bitfield! {
    /// The status bits of a clause slot.
    pub struct ClauseFields(u32);
    impl Debug;
    /// Whether the clause has been collected (it may still be allocated).
    pub garbage, set_garbage: 0;
    /// Whether the clause was learned rather than part of the input.
    pub redundant, set_redundant: 1;
    /// Whether the clause is exempt from garbage collection.
    pub keep, set_keep: 2;
    /// Whether the clause was moved by compacting collection.
    pub moved, set_moved: 3;
    /// Whether the clause is protected because it acts as a reason.
    pub protect, set_protect: 4;
    /// Whether the clause is currently connected to the watch lists.
    pub watched, set_watched: 5;
}

/// The proof footer of a clause: a 30-bit 1-based index into the derivation
/// log (0 meaning "not in the log") plus the `core` and `lemma` marks.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ProofTag(Tagged32);

impl ProofTag {
    /// Whether the clause participates in the refutation.
    pub fn core(self) -> bool {
        self.0.bit1()
    }
    pub fn set_core(&mut self, value: bool) {
        self.0 = if value {
            self.0.with_bit1()
        } else {
            self.0.without_bit1()
        };
    }
    /// Whether the clause is a derived lemma rather than an original clause.
    pub fn lemma(self) -> bool {
        self.0.bit2()
    }
    pub fn set_lemma(&mut self, value: bool) {
        self.0 = if value {
            self.0.with_bit2()
        } else {
            self.0.without_bit2()
        };
    }
    /// The 1-based index of the most recent log entry referencing this
    /// clause, or 0.
    pub fn index(self) -> u32 {
        self.0.payload()
    }
    pub fn set_index(&mut self, index: u32) {
        self.0 = self.0.with_payload(index);
    }
}

/// A clause slot in the arena.
#[derive(Debug)]
pub struct ClauseData {
    literals: Vec<Literal>,
    pub fields: ClauseFields,
    pub proof: ProofTag,
    /// Forwarding index set by compacting collection, `Clause::NONE` otherwise.
    pub copy: Clause,
}

impl HeapSpace for ClauseData {
    fn heap_space(&self) -> usize {
        self.literals.heap_space()
    }
}

/// The arena of clause slots.
#[derive(Debug, Default, HeapSpace)]
pub struct ClauseDatabase {
    slots: Vec<ClauseData>,
}

impl ClauseDatabase {
    /// Returns the total number of slots, including deallocated ones.
    pub fn number_of_clauses(&self) -> usize {
        self.slots.len()
    }
    /// Allocate a new clause slot holding the given literals.
    pub fn alloc(&mut self, literals: Vec<Literal>) -> Clause {
        requires!(!literals.is_empty());
        let clause = Clause::from_usize(self.slots.len());
        self.slots.push(ClauseData {
            literals,
            fields: ClauseFields(0),
            proof: ProofTag::default(),
            copy: Clause::NONE,
        });
        clause
    }
    /// The literals in the the clause.
    pub fn clause(&self, clause: Clause) -> &[Literal] {
        let slot = &self.slots[clause.as_offset()];
        invariant!(!slot.literals.is_empty(), "access to deallocated clause");
        &slot.literals
    }
    /// The number of literals in the clause.
    pub fn size(&self, clause: Clause) -> usize {
        self.slots[clause.as_offset()].literals.len()
    }
    /// Swap two literals within a clause.
    pub fn swap(&mut self, clause: Clause, a: usize, b: usize) {
        self.slots[clause.as_offset()].literals.swap(a, b);
    }
    /// Access the status bits of a clause.
    pub fn fields(&self, clause: Clause) -> &ClauseFields {
        &self.slots[clause.as_offset()].fields
    }
    /// Access the mutable status bits of a clause.
    pub fn fields_mut(&mut self, clause: Clause) -> &mut ClauseFields {
        &mut self.slots[clause.as_offset()].fields
    }
    /// Access the proof footer of a clause.
    pub fn proof(&self, clause: Clause) -> ProofTag {
        self.slots[clause.as_offset()].proof
    }
    /// Access the mutable proof footer of a clause.
    pub fn proof_mut(&mut self, clause: Clause) -> &mut ProofTag {
        &mut self.slots[clause.as_offset()].proof
    }
    /// The forwarding index of a moved clause.
    pub fn copy_of(&self, clause: Clause) -> Clause {
        self.slots[clause.as_offset()].copy
    }
    /// Set the forwarding index of a moved clause.
    pub fn set_copy(&mut self, clause: Clause, copy: Clause) {
        self.slots[clause.as_offset()].copy = copy;
    }
    /// Release the literal storage of a clause. The slot stays allocated so
    /// that outstanding identifiers remain valid.
    pub fn deallocate(&mut self, clause: Clause) {
        requires!(self.fields(clause).garbage());
        let slot = &mut self.slots[clause.as_offset()];
        slot.literals = Vec::new();
        slot.proof = ProofTag::default();
    }
    /// Whether the clause's literal storage has been released.
    pub fn is_deallocated(&self, clause: Clause) -> bool {
        self.slots[clause.as_offset()].literals.is_empty()
    }
    /// The number of bytes attributed to the clause in garbage accounting.
    pub fn bytes(&self, clause: Clause) -> usize {
        size_of::<ClauseData>() + self.size(clause) * size_of::<Literal>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_bits() {
        let mut tag = ProofTag::default();
        assert!(!tag.core() && !tag.lemma());
        assert_eq!(tag.index(), 0);
        tag.set_core(true);
        tag.set_index(42);
        assert!(tag.core());
        assert_eq!(tag.index(), 42);
        tag.set_lemma(true);
        tag.set_core(false);
        assert!(tag.lemma() && !tag.core());
        assert_eq!(tag.index(), 42);
    }

    #[test]
    fn alloc_and_deallocate() {
        let mut db = ClauseDatabase::default();
        let c = db.alloc(vec![Literal::new(1), Literal::new(-2)]);
        assert_eq!(db.size(c), 2);
        assert_eq!(db.clause(c)[0], Literal::new(1));
        db.fields_mut(c).set_garbage(true);
        db.deallocate(c);
        assert!(db.is_deallocated(c));
    }
}
