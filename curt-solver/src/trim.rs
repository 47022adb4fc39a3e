//! Backward proof trimming and unsatisfiable-core extraction
//!
//! While the solver searches, the notification hooks in this module record
//! a derivation log: one entry per derived or deleted clause. After the
//! formula has been refuted, [trim](fn.trim.html) seeds the core from the
//! final conflict and walks the log backwards. Deletions are revived,
//! derivations are removed from the trail and retired, and every core
//! lemma is re-validated by propagating the negation of its literals to a
//! conflict whose antecedents are marked core in turn. The surviving core
//! is streamed to a [CoreIterator](trait.CoreIterator.html) and the solver
//! is restored to a usable state.

use crate::{
    proof::ProofEntry,
    solver::{Solver, SolveResult, NO_CONFLICT},
};
use curt_common::{
    clause::{Clause, Reason},
    config, die, invariant,
    literal::{Literal, Variable},
    memory::{Array, HeapSpace},
    parser::open_file_for_writing,
    requires,
};
use std::io::{self, Write};

/// Consumer of the extracted core.
///
/// Returning false from any callback aborts the traversal.
pub trait CoreIterator {
    /// A core clause, in the user-visible numbering.
    fn clause(&mut self, literals: &[i32]) -> bool;
    /// An assumption of the refuted query.
    fn assumption(&mut self, literal: i32) -> bool;
    /// The disjunctive constraint of the refuted query.
    fn constraint(&mut self, literals: &[i32]) -> bool;
}

/// Options of the trimming engine.
#[derive(Debug, Clone)]
pub struct TrimSettings {
    /// Mark the reason clauses of trail literals that are undone during
    /// the backward loop.
    pub core_units: bool,
    /// Clear all core marks after traversal.
    pub unmark_core: bool,
    /// Discard the log tail added while seeding the conflict and detach
    /// clause references so that collection can free the clauses.
    pub reconstruct: bool,
    /// Prefer clauses with a core watch during re-propagation.
    pub prefer_core: bool,
    /// Verify the extracted core with a fresh solver.
    pub check_core: bool,
    /// Dump the core CNF to this file after traversal.
    pub dump_core: Option<String>,
}

impl Default for TrimSettings {
    fn default() -> TrimSettings {
        TrimSettings {
            core_units: false,
            unmark_core: false,
            reconstruct: true,
            prefer_core: false,
            check_core: false,
            dump_core: None,
        }
    }
}

/// Core size counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreStats {
    pub clauses: usize,
    pub lemmas: usize,
    pub variables: usize,
}

/// Counters of the trimming engine.
#[derive(Debug, Clone, Default)]
pub struct TrimStats {
    pub derived: usize,
    pub deleted: usize,
    pub units: usize,
    pub revived: usize,
    pub trims: usize,
    /// Full-trail re-propagations after a replay stall.
    pub repropagations: usize,
    pub core: CoreStats,
}

/// The trimming engine. It lives inside the solver and borrows the rest of
/// the solver state through the free functions of this module.
#[derive(Debug)]
pub struct Trimmer {
    /// Whether a derivation log is being recorded at all.
    pub enabled: bool,
    /// The derivation log, in notification order.
    pub proof: Vec<ProofEntry>,
    /// Unit clauses, exempt from collection. Their lifetime is the
    /// lifetime of the trimmer.
    pub unit_clauses: Vec<Clause>,
    /// Unit clause already allocated for a literal, for reuse.
    pub(crate) unit_for: Array<Literal, Clause>,
    pub settings: TrimSettings,
    pub stats: TrimStats,
    /// The clause at which unsatisfiability was detected.
    pub final_conflict: Option<Clause>,
    /// Materialization of a failed size-≥2 constraint.
    pub failed_constraint: Option<Clause>,
    /// The final conflict is a revived deletion.
    pub overconstrained: bool,
    /// Whether installing the trimmer had to disable host options.
    pub forced_options: bool,
    /// Suppresses notification hooks during the backward loop.
    validating: bool,
    /// Suppresses notifications and collection during restoration.
    isolated: bool,
}

impl Trimmer {
    pub fn new(maxvar: Variable, enabled: bool) -> Trimmer {
        Trimmer {
            enabled,
            proof: Vec::new(),
            unit_clauses: Vec::new(),
            unit_for: Array::new(Clause::NONE, maxvar.array_size_for_literals()),
            settings: TrimSettings::default(),
            stats: TrimStats::default(),
            final_conflict: None,
            failed_constraint: None,
            overconstrained: false,
            forced_options: false,
            validating: false,
            isolated: false,
        }
    }
    /// Whether restoration is in progress (host collection must stand back).
    pub fn isolated(&self) -> bool {
        self.isolated
    }
    /// Whether the backward loop is running.
    pub fn validating(&self) -> bool {
        self.validating
    }
}

impl HeapSpace for Trimmer {
    fn heap_space(&self) -> usize {
        self.proof.heap_space() + self.unit_clauses.heap_space() + self.unit_for.heap_space()
    }
}

/// Return true iff the clause contains a literal and its negation.
pub fn trivially_satisfied(clause: &[Literal]) -> bool {
    let mut sorted = clause.to_vec();
    sorted.sort_unstable_by_key(|literal| (literal.var(), literal.encoding));
    sorted.windows(2).any(|pair| pair[0] == -pair[1])
}

/// Move falsified literals to the end of the clause, keeping the first two
/// slots for literals that can be watched on revival.
fn swap_falsified_literals_right(solver: &Solver, clause: &mut Vec<Literal>) {
    let mut size = clause.len();
    let mut i = 0;
    while i < size {
        if solver.falsified(clause[i]) {
            size -= 1;
            clause.swap(i, size);
        } else {
            i += 1;
        }
    }
}

fn mark_core(solver: &mut Solver, clause: Clause) {
    solver.db.proof_mut(clause).set_core(true);
}

/// Record a log entry, maintaining the clause footer and back-links.
fn append_lemma(solver: &mut Solver, mut entry: ProofEntry) {
    requires!(
        solver.trimmer.proof.len() <= (1usize << 30) - 1,
        "derivation log overflow"
    );
    if entry.deleted {
        solver.trimmer.stats.deleted += 1;
    } else {
        solver.trimmer.stats.derived += 1;
    }
    if entry.is_clause() {
        let clause = entry.clause();
        if entry.deleted {
            let index = solver.db.proof(clause).index();
            if index != 0 {
                invariant!(solver.trimmer.proof[index as usize - 1].clause() == clause);
                entry.revive_at = index;
            }
            if config::CHECK_TRAIL_INVARIANTS {
                // Reason clauses must not be deleted.
                let literal = solver.db.clause(clause)[0];
                if solver.assigned(literal)
                    && solver.is_fixed(literal)
                    && solver.var(literal).reason == Reason::forced(clause)
                {
                    invariant!(!solver.db.fields(clause).garbage());
                }
            }
        }
        let index = solver.trimmer.proof.len() as u32 + 1;
        solver.db.proof_mut(clause).set_index(index);
        let redundant = solver.db.fields(clause).redundant();
        solver.db.proof_mut(clause).set_lemma(redundant);
        invariant!(!solver.db.proof(clause).core());
    }
    solver.trimmer.proof.push(entry);
}

/// Record the derivation-then-deletion pair that stands in for a failing
/// assumption clause.
fn append_failed(solver: &mut Solver, literals: &[Literal]) {
    append_lemma(solver, ProofEntry::from_literals(literals.to_vec(), false));
    append_lemma(solver, ProofEntry::from_literals(literals.to_vec(), true));
    let index = solver.trimmer.proof.len() - 1;
    invariant!(solver.trimmer.proof[index - 1].revive_at == 0);
    solver.trimmer.proof[index].revive_at = index as u32;
}

/// Notification: the solver derived a clause of size ≥ 2.
pub fn add_derived_clause(solver: &mut Solver, clause: Clause) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    append_lemma(solver, ProofEntry::from_clause(clause, false));
}

/// Notification: the solver derived a unit, or an original unit needs a
/// reason. Allocates or reuses the unit clause and returns it.
pub fn add_derived_unit_clause(solver: &mut Solver, literal: Literal, original: bool) -> Clause {
    requires!(solver.trimmer.enabled && !solver.trimmer.isolated);
    invariant!(!solver.trimmer.validating);
    let existing = solver.trimmer.unit_for[literal];
    let clause = if existing == Clause::NONE {
        let clause = solver.new_unit_clause(literal, original);
        solver.trimmer.unit_for[literal] = clause;
        clause
    } else {
        existing
    };
    if !original {
        append_lemma(solver, ProofEntry::from_clause(clause, false));
    }
    invariant!(solver.db.clause(clause)[0] == literal);
    clause
}

/// Notification: the solver derived the empty clause. Records the current
/// conflict as the final one.
pub fn add_derived_empty_clause(solver: &mut Solver) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    invariant!(solver.conflict.is_some());
    solver.trimmer.final_conflict = solver.conflict;
}

/// Notification: an original clause is falsified by the root-level trail.
///
/// With `derived`, the clause is already present as the most recent
/// deletion; it is revived and becomes the final conflict (the
/// overconstrained case). Otherwise a fresh clause is materialized.
pub fn add_falsified_original_clause(solver: &mut Solver, literals: &[Literal], derived: bool) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    invariant!(solver.trimmer.final_conflict.is_none());
    let clause = if derived {
        invariant!(!solver.trimmer.proof.is_empty());
        let last = solver.trimmer.proof.len() - 1;
        invariant!(solver.trimmer.proof[last].deleted);
        invariant!(!solver.trimmer.proof[last].is_clause());
        let owned = solver.trimmer.proof[last].literals().to_vec();
        let clause = if owned.len() == 1 {
            let unit = solver.new_unit_clause(owned[0], false);
            solver.trimmer.proof[last].set_clause(unit);
            unit
        } else {
            revive_clause(solver, last);
            solver.trimmer.proof[last].clause()
        };
        solver.trimmer.overconstrained = true;
        clause
    } else {
        let unique = solver.remove_duplicates(literals);
        let mut modified = unique;
        swap_falsified_literals_right(solver, &mut modified);
        if modified.len() == 1 {
            solver.new_unit_clause(modified[0], false)
        } else {
            let clause = solver.new_redundant_clause(modified);
            solver.watch_clause(clause);
            clause
        }
    };
    solver.db.proof_mut(clause).set_lemma(false);
    solver.trimmer.final_conflict = Some(clause);
}

/// Notification: the query failed because of these assumptions. `literals`
/// is the clause over the negated failed assumptions.
pub fn add_failing_assumption(solver: &mut Solver, literals: &[Literal]) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    if literals.len() > 1 {
        if !trivially_satisfied(literals) {
            append_failed(solver, literals);
        }
    } else {
        let reason = solver.var(literals[0]).reason;
        if reason.is_forced() {
            mark_core(solver, reason.clause());
        }
    }
}

/// Notification: a clause was rewritten in place. `previous` holds its
/// literals before the update.
pub fn add_updated_clause(solver: &mut Solver, clause: Clause, previous: &[Literal]) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    let mut revive_at = 0;
    let index = solver.db.proof(clause).index();
    if index != 0 {
        revive_at = index;
        invariant!(solver.trimmer.proof[index as usize - 1].clause() == clause);
        solver.trimmer.proof[index as usize - 1].clear();
    }
    append_lemma(solver, ProofEntry::from_clause(clause, false));
    let mut old = ProofEntry::from_literals(previous.to_vec(), true);
    old.revive_at = revive_at;
    append_lemma(solver, old);
}

/// Notification: a clause was deleted.
pub fn delete_clause(solver: &mut Solver, clause: Clause) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    append_lemma(solver, ProofEntry::from_clause(clause, true));
}

/// Notification: a clause that was never allocated is deleted. Duplicates
/// are dropped; a clause collapsing to a single literal is skipped unless
/// it is a falsified original, whose falsified literals are moved to the
/// end so that revival can watch the first two.
pub fn delete_clause_literals(solver: &mut Solver, literals: &[Literal], original: bool) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    let unique = solver.remove_duplicates(literals);
    if unique.len() == literals.len() || unique.len() > 1 {
        let mut modified = unique;
        if original {
            swap_falsified_literals_right(solver, &mut modified);
        }
        append_lemma(solver, ProofEntry::from_literals(modified, true));
    }
}

/// Notification: the memory of a clause is about to be freed. The log
/// entry referencing it takes ownership of a literal copy.
pub fn deallocate_clause(solver: &mut Solver, clause: Clause) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    let index = solver.db.proof(clause).index() as usize;
    invariant!(index > 0 && index <= solver.trimmer.proof.len());
    invariant!(solver.trimmer.proof[index - 1].clause() == clause);
    solver.trimmer.proof[index - 1].flip_variant(&solver.db);
    let revive_at = solver.trimmer.proof[index - 1].revive_at as usize;
    if revive_at != 0 {
        invariant!(solver.trimmer.proof[revive_at - 1].clause() == clause);
        invariant!(!solver.trimmer.proof[revive_at - 1].deleted);
        solver.trimmer.proof[revive_at - 1].clear();
    }
}

/// Notification: compacting collection moved clauses. Retarget every log
/// entry whose clause has a forwarding index.
pub fn update_moved_counterparts(solver: &mut Solver) {
    if !solver.trimmer.enabled || solver.trimmer.isolated {
        return;
    }
    invariant!(!solver.trimmer.validating);
    for i in 0..solver.trimmer.proof.len() {
        if !solver.trimmer.proof[i].is_clause() {
            continue;
        }
        let clause = solver.trimmer.proof[i].clause();
        if !solver.db.fields(clause).moved() {
            continue;
        }
        let copy = solver.db.copy_of(clause);
        invariant!(copy != Clause::NONE && copy != clause);
        let tag = solver.db.proof(clause);
        invariant!(tag.index() != 0);
        solver.db.proof_mut(copy).set_index(tag.index());
        solver.db.proof_mut(copy).set_lemma(tag.lemma());
        solver.trimmer.proof[i].set_clause(copy);
        let revive_at = solver.trimmer.proof[i].revive_at as usize;
        if revive_at != 0 {
            solver.trimmer.proof[revive_at - 1].set_clause(copy);
        }
    }
}

/// Bring a deleted clause back to life: materialize it if the entry only
/// owns literals, reactivate it, watch it, and rebind the paired
/// derivation entry.
fn revive_clause(solver: &mut Solver, index: usize) {
    invariant!(solver.trimmer.proof[index].deleted);
    let clause = if solver.trimmer.proof[index].is_clause() {
        solver.trimmer.proof[index].clause()
    } else {
        let literals = solver.trimmer.proof[index].literals().to_vec();
        invariant!(literals.len() >= 2);
        let clause = solver.new_redundant_clause(literals);
        solver.mark_garbage(clause);
        solver.db.proof_mut(clause).set_index(index as u32 + 1);
        solver.trimmer.proof[index].set_clause(clause);
        clause
    };
    invariant!(solver.db.fields(clause).garbage());
    solver.mark_active(clause);
    // Revived clauses count as irredundant for core identification; the
    // backward loop restores the lemma mark when it reaches the
    // derivation.
    solver.db.proof_mut(clause).set_lemma(false);
    solver.watch_clause(clause);
    let revive_at = solver.trimmer.proof[index].revive_at as usize;
    if revive_at != 0 {
        invariant!(revive_at - 1 < index);
        // Chains of revival links are forbidden.
        invariant!(solver.trimmer.proof[revive_at - 1].revive_at == 0);
        invariant!(!solver.trimmer.proof[revive_at - 1].deleted);
        solver.trimmer.proof[revive_at - 1].set_clause(clause);
    }
    solver.trimmer.stats.revived += 1;
}

/// Retire a processed derivation: mark it garbage and disconnect it.
fn stagnate_clause(solver: &mut Solver, clause: Clause) {
    invariant!(!solver.db.fields(clause).garbage());
    invariant!(!solver.db.fields(clause).moved());
    solver.mark_garbage(clause);
    if solver.db.size(clause) > 1 {
        solver.unwatch_clause(clause);
    }
}

/// Truncate the trail to the lazily maintained size.
fn shrink_internal_trail(solver: &mut Solver, trail_sz: usize) {
    requires!(trail_sz <= solver.trail.len());
    solver.trail.truncate(trail_sz);
    solver.propagated = trail_sz;
    invariant!(solver.level() == 0);
}

/// Drop the current conflict and return to the root level.
fn clean_conflict(solver: &mut Solver) {
    solver.unsat = false;
    solver.backtrack(0);
    solver.conflict = None;
}

fn undo_trail_literal(solver: &mut Solver, literal: Literal) {
    invariant!(solver.assigned(literal));
    if solver.is_fixed(literal) {
        solver.reactivate_fixed(literal);
    }
    solver.unassign(literal);
}

/// Whether the clause currently forces the first of its literals.
fn is_on_trail(solver: &Solver, clause: Clause) -> bool {
    let literal = solver.db.clause(clause)[0];
    solver.assigned(literal) && solver.var(literal).reason == Reason::forced(clause)
}

/// Pop the trail down to the literal forced by `clause`, unassigning every
/// popped literal and propagating core marks through the reason chains.
fn undo_trail_core(solver: &mut Solver, clause: Clause, trail_sz: &mut usize) {
    invariant!(*trail_sz > 0);
    invariant!(*trail_sz <= solver.trail.len());
    invariant!(is_on_trail(solver, clause));
    let clause_literal = solver.db.clause(clause)[0];
    invariant!(solver.assigned(clause_literal));
    loop {
        *trail_sz -= 1;
        let literal = solver.trail[*trail_sz];
        if literal == clause_literal {
            break;
        }
        invariant!(*trail_sz > 0);
        let reason = solver.var(literal).reason;
        invariant!(reason.is_forced());
        let reason_clause = reason.clause();
        invariant!(solver.db.clause(reason_clause)[0] == literal);
        undo_trail_literal(solver, literal);
        if solver.trimmer.settings.core_units {
            mark_core(solver, reason_clause);
        }
        if solver.db.proof(reason_clause).core() {
            for i in 1..solver.db.size(reason_clause) {
                let other = solver.db.clause(reason_clause)[i];
                let other_reason = solver.var(other).reason;
                invariant!(other_reason.is_forced());
                mark_core(solver, other_reason.clause());
            }
        }
    }
    undo_trail_literal(solver, clause_literal);
}

fn mark_conflict_literal(solver: &mut Solver, literal: Literal) {
    invariant!(solver.falsified(literal));
    let reason = solver.var(literal).reason;
    if reason.is_forced() {
        mark_core(solver, reason.clause());
    }
}

/// Seed the core from the final conflict, or from the failed assumptions
/// and constraint.
fn mark_conflict(solver: &mut Solver) {
    if solver.unsat {
        invariant!(solver.trimmer.final_conflict.is_some());
        let conflict = solver.trimmer.final_conflict.unwrap();
        mark_core(solver, conflict);
        for i in 0..solver.db.size(conflict) {
            let literal = solver.db.clause(conflict)[i];
            mark_conflict_literal(solver, literal);
        }
    } else {
        if solver.unsat_constraint && solver.constraint.len() > 1 {
            let literals = solver.constraint.clone();
            let clause = solver.new_redundant_clause(literals);
            mark_core(solver, clause);
            solver.watch_clause(clause);
            solver.trimmer.failed_constraint = Some(clause);
        }
        if !solver.marked_failed {
            solver.failing();
            solver.marked_failed = true;
        }
    }
}

/// Mark the deletion halves of the failing-assumption pairs in the log
/// tail as core.
fn mark_failing(solver: &mut Solver, proof_sz: usize) {
    let length = solver.trimmer.proof.len();
    invariant!(proof_sz < length && (length - proof_sz) % 2 == 0);
    for i in proof_sz..length {
        if (i - proof_sz) % 2 == 1 {
            let clause = solver.trimmer.proof[i].clause();
            mark_core(solver, clause);
            solver.db.proof_mut(clause).set_lemma(false);
        }
    }
}

/// Assume the negation of every unassigned literal of the lemma, each on
/// its own decision level.
fn assume_negation(solver: &mut Solver, lemma: Clause) {
    invariant!(solver.trimmer.validating && solver.level() == 0);
    invariant!(solver.db.proof(lemma).core());
    invariant!(solver.propagated == solver.trail.len());
    let mut decisions = Vec::new();
    for i in 0..solver.db.size(lemma) {
        let literal = solver.db.clause(lemma)[i];
        if solver.unassigned(literal) {
            decisions.push(-literal);
        }
    }
    invariant!(!decisions.is_empty());
    let levels = decisions.len();
    solver.search_assume_multiple_decisions(&decisions);
    invariant!(solver.level() == levels);
}

/// Propagate to a conflict. If propagation stalls, which can happen due to
/// incrementality leaving unit implications unrecorded, re-propagate the
/// entire trail once.
fn propagate_conflict(solver: &mut Solver) -> bool {
    invariant!(solver.conflict.is_none());
    let prefer_core = solver.trimmer.settings.prefer_core;
    if solver.propagate(prefer_core) == NO_CONFLICT {
        solver.trimmer.stats.repropagations += 1;
        invariant!(solver.trimmer.stats.trims > 1);
        solver.propagated = 0;
        if solver.propagate(false) == NO_CONFLICT {
            solver.backtrack(0);
            return false;
        }
    }
    true
}

/// Whether the (assigned) literal got its value by propagation after the
/// last decision.
fn assigned_by_propagation(solver: &Solver, literal: Literal) -> bool {
    invariant!(!solver.unassigned(literal));
    solver.var(literal).trail > solver.top_level_mark()
}

/// Mark every antecedent of the current conflict as core.
///
/// Unlike search-time analysis this derives no lemma; it only walks the
/// implication graph between the conflict and the decisions, marking
/// reason clauses. All seen marks are cleared again before returning.
fn conflict_analysis_core(solver: &mut Solver) {
    invariant!(solver.conflict.is_some());
    let conflict = solver.conflict.unwrap();
    mark_core(solver, conflict);

    let mut seen_count = 0usize;
    for i in 0..solver.db.size(conflict) {
        let literal = solver.db.clause(conflict)[i];
        invariant!(solver.var(literal).level > 0 || solver.var(literal).reason.is_forced());
        if assigned_by_propagation(solver, literal) {
            invariant!(!solver.flags[literal.var()].seen);
            solver.flags[literal.var()].seen = true;
            seen_count += 1;
        } else if solver.var(literal).level == 0 {
            let reason = solver.var(literal).reason;
            invariant!(reason.is_forced());
            mark_core(solver, reason.clause());
        }
    }

    let mark = solver.top_level_mark();
    for position in (mark + 1..solver.trail.len()).rev() {
        let literal = solver.trail[position];
        if !solver.flags[literal.var()].seen {
            continue;
        }
        solver.flags[literal.var()].seen = false;
        seen_count -= 1;

        let reason = solver.var(literal).reason;
        invariant!(reason.is_forced());
        let clause = reason.clause();
        mark_core(solver, clause);
        invariant!(solver.db.clause(clause)[0] == literal);
        invariant!(solver.assigned(literal));

        for i in 1..solver.db.size(clause) {
            let other = solver.db.clause(clause)[i];
            invariant!(solver.falsified(other));
            if assigned_by_propagation(solver, other) {
                if !solver.flags[other.var()].seen {
                    solver.flags[other.var()].seen = true;
                    seen_count += 1;
                }
            } else if solver.var(other).level == 0 {
                let reason = solver.var(other).reason;
                invariant!(reason.is_forced());
                mark_core(solver, reason.clause());
            }
        }
    }
    invariant!(seen_count == 0);
}

/// After the loop, propagate core marks through the reasons that remain on
/// the trail and move the propagation marker below the last core reason.
fn mark_core_trail_antecedents(solver: &mut Solver) {
    for position in (0..solver.trail.len()).rev() {
        let literal = solver.trail[position];
        let reason = solver.var(literal).reason;
        invariant!(reason.is_forced());
        let clause = reason.clause();
        if solver.db.proof(clause).core() {
            invariant!(solver.db.clause(clause)[0] == literal);
            for i in 0..solver.db.size(clause) {
                let other = solver.db.clause(clause)[i];
                let other_reason = solver.var(other).reason;
                invariant!(other_reason.is_forced());
                mark_core(solver, other_reason.clause());
            }
            solver.propagated = position;
        }
    }
}

/// Clear every core mark and zero the core statistics.
fn unmark_core_marks(solver: &mut Solver) {
    for i in 0..solver.clauses.len() {
        let clause = solver.clauses[i];
        if solver.db.is_deallocated(clause) {
            continue;
        }
        solver.db.proof_mut(clause).set_core(false);
    }
    for i in 0..solver.trimmer.unit_clauses.len() {
        let clause = solver.trimmer.unit_clauses[i];
        solver.db.proof_mut(clause).set_core(false);
    }
    solver.trimmer.stats.core = CoreStats::default();
}

/// Re-assign every unit clause literal that is not assigned yet and
/// propagate, restoring the root-level trail.
fn restore_trail(solver: &mut Solver) {
    solver.trimmer.isolated = true;
    // Units are re-assigned in allocation order, which reproduces the
    // original trail order.
    for i in 0..solver.trimmer.unit_clauses.len() {
        let clause = solver.trimmer.unit_clauses[i];
        let literal = solver.db.clause(clause)[0];
        if !solver.unassigned(literal) {
            continue;
        }
        solver.assign(literal, Reason::forced(clause));
        let _ = solver.propagate(false);
    }
    solver.trimmer.isolated = false;
}

/// Re-establish the garbage marks and watches dictated by the log: deleted
/// entries garbage, derived entries active and watched.
fn restore_proof_garbage_marks(solver: &mut Solver) {
    solver.trimmer.isolated = true;
    for i in 0..solver.trimmer.proof.len() {
        invariant!(solver.trimmer.proof[i].is_clause());
        let clause = solver.trimmer.proof[i].clause();
        if solver.trimmer.proof[i].deleted {
            if solver.db.fields(clause).watched() {
                solver.unwatch_clause(clause);
            }
            solver.mark_garbage(clause);
        } else {
            solver.mark_active(clause);
            if solver.db.size(clause) > 1 && !solver.db.fields(clause).watched() {
                solver.watch_clause(clause);
            }
        }
    }
    if let Some(clause) = solver.trimmer.failed_constraint {
        if solver.db.fields(clause).watched() {
            solver.unwatch_clause(clause);
        }
        solver.mark_garbage(clause);
    }
    if solver.trimmer.overconstrained {
        invariant!(solver.trimmer.final_conflict.is_some());
        let clause = solver.trimmer.final_conflict.unwrap();
        if solver.db.fields(clause).watched() {
            solver.unwatch_clause(clause);
        }
        solver.mark_garbage(clause);
    }
    solver.trimmer.final_conflict = None;
    solver.trimmer.failed_constraint = None;
    solver.trimmer.isolated = false;
}

/// Truncate the log back to its pre-trim size and convert every deletion
/// entry to an owned literal copy so that collection can free the clauses.
/// Garbage clauses are retained until then, so memory can peak briefly.
fn reconstruct(solver: &mut Solver, proof_sz: usize) {
    solver.trimmer.isolated = true;
    while solver.trimmer.proof.len() > proof_sz {
        let entry = solver.trimmer.proof.pop().unwrap();
        if entry.is_clause() {
            let clause = entry.clause();
            invariant!(solver.db.fields(clause).garbage());
            solver.db.proof_mut(clause).set_index(0);
        }
        if entry.deleted {
            solver.trimmer.stats.deleted -= 1;
        } else {
            solver.trimmer.stats.derived -= 1;
        }
    }
    solver.protect_reasons();
    solver.flush_watches();
    for i in (0..solver.trimmer.proof.len()).rev() {
        if !solver.trimmer.proof[i].deleted {
            continue;
        }
        let clause = solver.trimmer.proof[i].clause();
        invariant!(solver.db.fields(clause).garbage());
        solver.db.proof_mut(clause).set_index(0);
        let literals = solver.db.clause(clause).to_vec();
        solver.trimmer.proof[i].set_literals(literals);
        let revive_at = solver.trimmer.proof[i].revive_at as usize;
        if revive_at != 0 {
            solver.trimmer.proof[revive_at - 1].clear();
        }
    }
    solver.unprotect_reasons();
    solver.trimmer.isolated = false;
}

/// Walk the entire log checking its structural invariants.
pub fn check_environment(solver: &Solver) {
    if !config::CHECK_PROOF_INVARIANTS {
        return;
    }
    let trimmer = &solver.trimmer;
    assert_eq!(
        trimmer.proof.len(),
        trimmer.stats.derived + trimmer.stats.deleted
    );
    for i in 0..trimmer.proof.len() {
        let entry = &trimmer.proof[i];
        if entry.deleted {
            if entry.is_clause() {
                let garbage = solver.db.fields(entry.clause()).garbage();
                if i == trimmer.proof.len() - 1 {
                    assert!(garbage || trimmer.overconstrained);
                } else {
                    assert!(garbage);
                }
            } else {
                assert!(!entry.literals().is_empty());
                let revive_at = entry.revive_at as usize;
                if revive_at != 0 {
                    assert!(revive_at <= trimmer.proof.len());
                    // Chains of revival links are forbidden, and the paired
                    // derivation may be a tombstone but never a deletion.
                    let paired = &trimmer.proof[revive_at - 1];
                    assert!(paired.revive_at == 0 && !paired.deleted);
                }
            }
        }
    }
}

/// Trim the proof and stream the core to the visitor.
///
/// Preconditions: the solver is UNSAT, or UNSAT under its assumptions or
/// constraint, and no trim is in progress.
pub fn trim(solver: &mut Solver, it: &mut dyn CoreIterator) {
    requires!(solver.trimmer.enabled);
    requires!(!solver.trimmer.validating && !solver.trimmer.isolated);
    solver.trimmer.stats.trims += 1;
    let saved_unsat = solver.unsat;
    invariant!(!solver.setup_trimming_options());
    check_environment(solver);

    // Mark the conflict and its reasons as core.
    let proof_sz = solver.trimmer.proof.len();
    mark_conflict(solver);

    solver.flush_watches();
    clean_conflict(solver);
    // 'trail_sz' is used for lazy shrinking of the trail.
    let mut trail_sz = solver.trail.len();

    solver.trimmer.validating = true;

    // Main trimming loop. An overconstrained proof ends with the revived
    // final conflict itself, which is skipped.
    let mut i =
        solver.trimmer.proof.len() as isize - 1 - (solver.trimmer.overconstrained as isize);
    while i >= 0 {
        let index = i as usize;
        i -= 1;

        if solver.trimmer.proof[index].deleted {
            revive_clause(solver, index);
            continue;
        }

        if index == proof_sz {
            mark_failing(solver, proof_sz);
        }

        let clause = solver.trimmer.proof[index].clause();
        invariant!(!solver.db.fields(clause).garbage());

        if is_on_trail(solver, clause) {
            if solver.trimmer.settings.core_units {
                mark_core(solver, clause);
            }
            undo_trail_core(solver, clause, &mut trail_sz);
            solver.report('m');
        }

        solver.db.proof_mut(clause).set_lemma(true);
        stagnate_clause(solver, clause);

        if solver.db.proof(clause).core() {
            shrink_internal_trail(solver, trail_sz);
            assume_negation(solver, clause);
            let validated = propagate_conflict(solver);
            invariant!(validated, "lemma failed to re-validate");
            conflict_analysis_core(solver);
            clean_conflict(solver);
        }
    }

    shrink_internal_trail(solver, trail_sz);
    mark_core_trail_antecedents(solver);

    solver.report('M');

    // This is a good point to hand out core clauses as some might be
    // collected later.
    traverse_core(solver, it);
    if let Some(filename) = solver.trimmer.settings.dump_core.clone() {
        let stdout = io::stdout();
        let mut file = open_file_for_writing(&filename, &stdout);
        let mut printer =
            CorePrinter::new(&mut file, solver.maxvar, solver.trimmer.stats.core.clauses);
        traverse_core_readonly(solver, &mut printer);
    }
    if solver.trimmer.settings.check_core {
        let mut verifier = CoreVerifier::new(solver.maxvar);
        traverse_core_readonly(solver, &mut verifier);
        invariant!(verifier.verified(), "core verification failed");
    }

    restore_proof_garbage_marks(solver);

    if solver.trimmer.settings.unmark_core {
        unmark_core_marks(solver);
    }
    if solver.trimmer.settings.reconstruct {
        reconstruct(solver, proof_sz);
    }

    restore_trail(solver);
    solver.trimmer.validating = false;
    solver.unsat = saved_unsat;
}

/// Stream the core to the visitor, collecting core statistics.
pub fn traverse_core(solver: &mut Solver, it: &mut dyn CoreIterator) -> bool {
    let mut eclause: Vec<i32> = Vec::new();
    let mut seen: Array<Variable, bool> =
        Array::new(false, solver.maxvar.array_size_for_variables());
    let mut core = CoreStats::default();

    for i in 0..solver.clauses.len() {
        let clause = solver.clauses[i];
        if solver.db.is_deallocated(clause) || !solver.db.proof(clause).core() {
            continue;
        }
        if Some(clause) == solver.trimmer.failed_constraint {
            continue;
        }
        if solver.db.proof(clause).lemma() {
            core.lemmas += 1;
            continue;
        }
        core.clauses += 1;
        for j in 0..solver.db.size(clause) {
            let literal = solver.db.clause(clause)[j];
            eclause.push(solver.externalize(literal));
            if !seen[literal.var()] {
                seen[literal.var()] = true;
                core.variables += 1;
            }
        }
        if !it.clause(&eclause) {
            return false;
        }
        eclause.clear();
    }

    for i in 0..solver.trimmer.unit_clauses.len() {
        let clause = solver.trimmer.unit_clauses[i];
        if !solver.db.proof(clause).core() {
            continue;
        }
        if solver.db.proof(clause).lemma() {
            core.lemmas += 1;
            continue;
        }
        core.clauses += 1;
        let literal = solver.db.clause(clause)[0];
        eclause.push(solver.externalize(literal));
        if !seen[literal.var()] {
            seen[literal.var()] = true;
            core.variables += 1;
        }
        if !it.clause(&eclause) {
            return false;
        }
        eclause.clear();
    }

    for i in 0..solver.assumptions.len() {
        let literal = solver.assumptions[i];
        if !it.assumption(solver.externalize(literal)) {
            return false;
        }
        if !seen[literal.var()] {
            seen[literal.var()] = true;
            core.variables += 1;
        }
    }

    if solver.unsat_constraint {
        core.clauses += 1;
        for i in 0..solver.constraint.len() {
            let literal = solver.constraint[i];
            eclause.push(solver.externalize(literal));
            if !seen[literal.var()] {
                seen[literal.var()] = true;
                core.variables += 1;
            }
        }
        if !it.constraint(&eclause) {
            return false;
        }
        eclause.clear();
    }

    solver.trimmer.stats.core = core;
    true
}

/// Stream the core to the visitor without touching any statistics.
pub fn traverse_core_readonly(solver: &Solver, it: &mut dyn CoreIterator) -> bool {
    let mut eclause: Vec<i32> = Vec::new();

    for i in 0..solver.clauses.len() {
        let clause = solver.clauses[i];
        if solver.db.is_deallocated(clause) || !solver.db.proof(clause).core() {
            continue;
        }
        if solver.db.proof(clause).lemma() || Some(clause) == solver.trimmer.failed_constraint {
            continue;
        }
        for j in 0..solver.db.size(clause) {
            eclause.push(solver.externalize(solver.db.clause(clause)[j]));
        }
        if !it.clause(&eclause) {
            return false;
        }
        eclause.clear();
    }

    for i in 0..solver.trimmer.unit_clauses.len() {
        let clause = solver.trimmer.unit_clauses[i];
        if !solver.db.proof(clause).core() || solver.db.proof(clause).lemma() {
            continue;
        }
        eclause.push(solver.externalize(solver.db.clause(clause)[0]));
        if !it.clause(&eclause) {
            return false;
        }
        eclause.clear();
    }

    for i in 0..solver.assumptions.len() {
        if !it.assumption(solver.externalize(solver.assumptions[i])) {
            return false;
        }
    }

    if solver.unsat_constraint {
        for i in 0..solver.constraint.len() {
            eclause.push(solver.externalize(solver.constraint[i]));
        }
        if !it.constraint(&eclause) {
            return false;
        }
        eclause.clear();
    }

    true
}

/// A visitor that stores the core for later inspection.
#[derive(Debug, Default)]
pub struct CoreCollector {
    pub clauses: Vec<Vec<i32>>,
    pub assumptions: Vec<i32>,
    pub constraint: Option<Vec<i32>>,
}

impl CoreIterator for CoreCollector {
    fn clause(&mut self, literals: &[i32]) -> bool {
        self.clauses.push(literals.to_vec());
        true
    }
    fn assumption(&mut self, literal: i32) -> bool {
        self.assumptions.push(literal);
        true
    }
    fn constraint(&mut self, literals: &[i32]) -> bool {
        self.constraint = Some(literals.to_vec());
        true
    }
}

/// A visitor that writes the core as DIMACS.
pub struct CorePrinter<'a> {
    file: &'a mut dyn Write,
}

impl<'a> CorePrinter<'a> {
    /// Write the DIMACS header. `clauses` must count units and the
    /// constraint.
    pub fn new(file: &'a mut dyn Write, maxvar: Variable, clauses: usize) -> CorePrinter<'a> {
        writeln!(file, "p cnf {} {}", maxvar, clauses)
            .unwrap_or_else(|err| die!("failed to write core: {}", err));
        CorePrinter { file }
    }
    fn put(&mut self, literals: &[i32]) -> bool {
        for &literal in literals {
            if write!(self.file, "{} ", literal).is_err() {
                return false;
            }
        }
        writeln!(self.file, "0").is_ok()
    }
}

impl CoreIterator for CorePrinter<'_> {
    fn clause(&mut self, literals: &[i32]) -> bool {
        self.put(literals)
    }
    fn assumption(&mut self, literal: i32) -> bool {
        self.put(&[literal])
    }
    fn constraint(&mut self, literals: &[i32]) -> bool {
        self.put(literals)
    }
}

/// A visitor that replays the core into a fresh solver and checks that it
/// is unsatisfiable.
pub struct CoreVerifier {
    solver: Solver,
}

impl CoreVerifier {
    pub fn new(maxvar: Variable) -> CoreVerifier {
        CoreVerifier {
            solver: Solver::new(maxvar, Default::default()),
        }
    }
    /// Solve the collected core; it must be unsatisfiable.
    pub fn verified(&mut self) -> bool {
        self.solver.solve() == SolveResult::Unsatisfiable
    }
}

impl CoreIterator for CoreVerifier {
    fn clause(&mut self, literals: &[i32]) -> bool {
        self.solver.add_original_clause(literals);
        true
    }
    fn assumption(&mut self, literal: i32) -> bool {
        self.solver.assume(literal);
        true
    }
    fn constraint(&mut self, literals: &[i32]) -> bool {
        self.solver.constrain(literals);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Config;

    fn lits(values: &[i32]) -> Vec<Literal> {
        values.iter().cloned().map(Literal::new).collect()
    }

    fn trimming_solver(maxvar: u32) -> Solver {
        let config = Config {
            trim: true,
            ..Default::default()
        };
        Solver::new(Variable(maxvar), config)
    }

    #[test]
    fn tautology_detection() {
        assert!(trivially_satisfied(&lits(&[1, -2, -1])));
        assert!(!trivially_satisfied(&lits(&[1, 2, 3])));
        assert!(!trivially_satisfied(&lits(&[1])));
    }

    #[test]
    fn failing_assumption_pair_is_linked() {
        let mut solver = trimming_solver(3);
        add_failing_assumption(&mut solver, &lits(&[1, 2]));
        assert_eq!(solver.trimmer.proof.len(), 2);
        assert!(!solver.trimmer.proof[0].deleted);
        assert!(solver.trimmer.proof[1].deleted);
        assert_eq!(solver.trimmer.proof[1].revive_at, 1);
        assert_eq!(solver.trimmer.proof[0].revive_at, 0);
        check_environment(&solver);
    }

    #[test]
    fn tautological_failing_assumption_does_not_grow_proof() {
        let mut solver = trimming_solver(3);
        add_failing_assumption(&mut solver, &lits(&[1, -1, 2]));
        assert!(solver.trimmer.proof.is_empty());
        assert_eq!(solver.trimmer.stats.derived, 0);
        assert_eq!(solver.trimmer.stats.deleted, 0);
    }

    #[test]
    fn derived_clause_sets_footer() {
        let mut solver = trimming_solver(3);
        let clause = solver.new_redundant_clause(lits(&[1, 2, 3]));
        add_derived_clause(&mut solver, clause);
        assert_eq!(solver.db.proof(clause).index(), 1);
        assert!(solver.db.proof(clause).lemma());
        assert_eq!(solver.trimmer.proof[0].clause(), clause);
        check_environment(&solver);
    }

    #[test]
    fn deletion_links_to_derivation() {
        let mut solver = trimming_solver(3);
        let clause = solver.new_redundant_clause(lits(&[1, 2]));
        add_derived_clause(&mut solver, clause);
        solver.mark_garbage(clause);
        delete_clause(&mut solver, clause);
        assert_eq!(solver.trimmer.proof.len(), 2);
        assert_eq!(solver.trimmer.proof[1].revive_at, 1);
        check_environment(&solver);
    }

    #[test]
    fn deallocation_flips_variant_and_clears_pair() {
        let mut solver = trimming_solver(3);
        let clause = solver.new_redundant_clause(lits(&[1, 2]));
        add_derived_clause(&mut solver, clause);
        solver.mark_garbage(clause);
        delete_clause(&mut solver, clause);
        deallocate_clause(&mut solver, clause);
        assert!(!solver.trimmer.proof[1].is_clause());
        assert_eq!(solver.trimmer.proof[1].literals(), &lits(&[1, 2])[..]);
        assert!(solver.trimmer.proof[0].is_tombstone());
        check_environment(&solver);
    }

    #[test]
    fn moved_counterparts_are_retargeted() {
        let mut solver = trimming_solver(3);
        let clause = solver.new_redundant_clause(lits(&[1, 2]));
        add_derived_clause(&mut solver, clause);
        let copy = solver.new_redundant_clause(lits(&[1, 2]));
        solver.db.fields_mut(clause).set_moved(true);
        solver.db.set_copy(clause, copy);
        update_moved_counterparts(&mut solver);
        assert_eq!(solver.trimmer.proof[0].clause(), copy);
        assert_eq!(solver.db.proof(copy).index(), 1);
    }

    #[test]
    fn updated_clause_records_previous_form() {
        let mut solver = trimming_solver(3);
        let clause = solver.new_redundant_clause(lits(&[1, 2, 3]));
        add_derived_clause(&mut solver, clause);
        let previous = lits(&[1, 2, 3]);
        // pretend inprocessing shrank the clause in place
        add_updated_clause(&mut solver, clause, &previous);
        assert_eq!(solver.trimmer.proof.len(), 3);
        assert!(solver.trimmer.proof[0].is_tombstone());
        assert_eq!(solver.db.proof(clause).index(), 2);
        assert!(solver.trimmer.proof[2].deleted);
        assert_eq!(solver.trimmer.proof[2].revive_at, 1);
        assert_eq!(solver.trimmer.proof[2].literals(), &previous[..]);
    }
}
