//! CDCL kernel with DRUP-style proof trimming and unsatisfiable-core
//! extraction
//!
//! The solver records a derivation trace while searching. Once the formula
//! has been refuted, [trim](trim/fn.trim.html) walks the trace backwards,
//! re-validating every lemma that participates in the refutation and
//! marking its antecedents, and finally streams the resulting core to a
//! [CoreIterator](trim/trait.CoreIterator.html).

pub mod clausedb;
pub mod proof;
pub mod solver;
pub mod trim;

pub use crate::{
    clausedb::{ClauseDatabase, ClauseFields, ProofTag},
    proof::ProofEntry,
    solver::{Config, Solver, SolveResult},
    trim::{trim, CoreCollector, CoreIterator, CorePrinter, CoreVerifier, TrimSettings, Trimmer},
};
