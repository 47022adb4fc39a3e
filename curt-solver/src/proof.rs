//! Entries of the derivation log
//!
//! Each entry records the derivation or deletion of one clause. While the
//! clause is allocated the entry borrows it from the arena; once the host
//! frees the clause the entry is flipped to own a copy of the literals.
//! Deletion entries carry a back-link (`revive_at`) to the derivation they
//! cancel so that reviving the deletion can rebind the derivation to the
//! resurrected clause.

use crate::clausedb::ClauseDatabase;
use curt_common::{clause::Clause, invariant, literal::Literal, memory::HeapSpace, requires};

/// The two representations of an entry's clause.
#[derive(Debug, PartialEq, Eq)]
pub enum Variant {
    /// Borrows a clause from the arena.
    Clause(Clause),
    /// Owns a copy of the literals. An empty vector marks a tombstoned
    /// slot whose contents were transferred during reconstruction.
    Literals(Vec<Literal>),
}

/// A single record in the derivation log.
#[derive(Debug, PartialEq, Eq)]
pub struct ProofEntry {
    /// Deletion (true) or derivation (false).
    pub deleted: bool,
    /// For a deletion whose matching derivation sits at log index `k`,
    /// this holds `k + 1`; 0 means no pairing.
    pub revive_at: u32,
    variant: Variant,
}

impl ProofEntry {
    /// Create an entry borrowing a clause from the arena.
    pub fn from_clause(clause: Clause, deleted: bool) -> ProofEntry {
        ProofEntry {
            deleted,
            revive_at: 0,
            variant: Variant::Clause(clause),
        }
    }
    /// Create an entry owning a copy of the literals.
    pub fn from_literals(literals: Vec<Literal>, deleted: bool) -> ProofEntry {
        requires!(!literals.is_empty());
        ProofEntry {
            deleted,
            revive_at: 0,
            variant: Variant::Literals(literals),
        }
    }
    /// Whether the entry currently borrows a clause.
    pub fn is_clause(&self) -> bool {
        match self.variant {
            Variant::Clause(_) => true,
            Variant::Literals(_) => false,
        }
    }
    /// Whether this slot was tombstoned.
    pub fn is_tombstone(&self) -> bool {
        match &self.variant {
            Variant::Clause(_) => false,
            Variant::Literals(literals) => literals.is_empty(),
        }
    }
    /// The borrowed clause. The entry must be in the clause variant.
    pub fn clause(&self) -> Clause {
        match self.variant {
            Variant::Clause(clause) => clause,
            Variant::Literals(_) => panic!("proof entry does not reference a clause"),
        }
    }
    /// The owned literals. The entry must be in the literals variant.
    pub fn literals(&self) -> &[Literal] {
        match &self.variant {
            Variant::Clause(_) => panic!("proof entry does not own literals"),
            Variant::Literals(literals) => literals,
        }
    }
    /// Rebind the entry to a clause in the arena.
    pub fn set_clause(&mut self, clause: Clause) {
        self.variant = Variant::Clause(clause);
    }
    /// Make the entry own the given literals.
    pub fn set_literals(&mut self, literals: Vec<Literal>) {
        self.variant = Variant::Literals(literals);
    }
    /// Tombstone the slot.
    pub fn clear(&mut self) {
        self.variant = Variant::Literals(Vec::new());
    }
    /// Copy the literals out of the borrowed clause and own them from now
    /// on. Returns the clause that was borrowed.
    pub fn flip_variant(&mut self, db: &ClauseDatabase) -> Clause {
        let clause = self.clause();
        invariant!(!db.is_deallocated(clause));
        self.variant = Variant::Literals(db.clause(clause).to_vec());
        clause
    }
}

impl HeapSpace for ProofEntry {
    fn heap_space(&self) -> usize {
        match &self.variant {
            Variant::Clause(_) => 0,
            Variant::Literals(literals) => literals.heap_space(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curt_common::literal::Literal;

    fn lits(values: &[i32]) -> Vec<Literal> {
        values.iter().cloned().map(Literal::new).collect()
    }

    #[test]
    fn variant_flip() {
        let mut db = ClauseDatabase::default();
        let c = db.alloc(lits(&[1, -2]));
        let mut entry = ProofEntry::from_clause(c, true);
        assert!(entry.is_clause());
        assert_eq!(entry.flip_variant(&db), c);
        assert!(!entry.is_clause());
        assert_eq!(entry.literals(), &lits(&[1, -2])[..]);
        entry.set_clause(c);
        assert!(entry.is_clause());
        assert_eq!(entry.clause(), c);
    }

    #[test]
    fn tombstone() {
        let mut entry = ProofEntry::from_literals(lits(&[3]), false);
        assert!(!entry.is_tombstone());
        entry.clear();
        assert!(entry.is_tombstone());
        assert!(!entry.is_clause());
    }
}
