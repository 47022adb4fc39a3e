//! The host CDCL kernel
//!
//! A deliberately small conflict-driven solver: two-watched-literal
//! propagation, first-UIP clause learning, assumptions as stacked
//! decisions, and an optional disjunctive constraint. Everything the
//! trimming engine consumes lives here: the trail with per-variable
//! reasons, the clause arena with garbage accounting, and the
//! notification calls into [trim](../trim/index.html).

use crate::{
    clausedb::ClauseDatabase,
    trim::{self, Trimmer},
};
use curt_common::{
    clause::{Clause, Reason},
    comment, invariant,
    literal::{Literal, Variable},
    memory::{Array, HeapSpace},
    requires,
};
use std::cmp;

/// A boolean value that states whether a conflict has been reached by unit
/// propagation.
///
/// We use the newtype pattern here to clearly distinguish from other
/// boolean values.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct MaybeConflict(pub bool);
/// A conflict has been found
pub const CONFLICT: MaybeConflict = MaybeConflict(true);
/// No conflict has been found yet
pub const NO_CONFLICT: MaybeConflict = MaybeConflict(false);

/// The result of a solve call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SolveResult {
    Satisfiable,
    Unsatisfiable,
}

/// Runtime options of the host solver.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Print progress lines.
    pub verbose: bool,
    /// Record a derivation trace for trimming.
    pub trim: bool,
    /// Chronological backtracking. Incompatible with trimming.
    pub chrono: bool,
    /// Failed-literal probing. Incompatible with trimming.
    pub probe: bool,
    /// Compacting collection of the clause arena. Incompatible with trimming.
    pub compact: bool,
    /// On-the-fly proof checking. Incompatible with trimming.
    pub checkproof: bool,
}

/// Activation state of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    /// Assigned at the root level.
    Fixed,
}

impl Default for Status {
    fn default() -> Status {
        Status::Active
    }
}

/// Per-variable search bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct Var {
    pub reason: Reason,
    pub level: u32,
    /// Position in the trail.
    pub trail: usize,
}

/// Per-variable flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub status: Status,
    /// Temporary mark used by conflict analysis and `failing`.
    pub seen: bool,
}

/// Host statistics.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub conflicts: usize,
    pub decisions: usize,
    pub propagations: usize,
    pub learned: usize,
    pub reductions: usize,
    /// Variables currently fixed at the root level.
    pub fixed: usize,
    pub reactivated: usize,
    pub current_redundant: usize,
    pub current_irredundant: usize,
    /// Literals in irredundant clauses.
    pub irrlits: usize,
    pub garbage_bytes: usize,
    pub garbage_clauses: usize,
    pub garbage_literals: usize,
}

/// The solver.
#[derive(Debug)]
pub struct Solver {
    pub config: Config,
    pub maxvar: Variable,
    pub db: ClauseDatabase,
    /// Pool of non-unit clauses, in allocation order. Unit clauses are
    /// tracked by the trimmer instead.
    pub clauses: Vec<Clause>,
    /// values[lit] is true iff lit is assigned true.
    pub(crate) values: Array<Literal, bool>,
    /// Scratch marks used by duplicate removal.
    pub(crate) marks: Array<Literal, bool>,
    pub trail: Vec<Literal>,
    /// Index of the first trail literal that has not been propagated.
    pub propagated: usize,
    pub(crate) vars: Array<Variable, Var>,
    pub(crate) flags: Array<Variable, Flags>,
    /// Trail marks, one per decision level. control[0] is always 0.
    pub(crate) control: Vec<usize>,
    pub(crate) watches: Array<Literal, Vec<Clause>>,
    pub conflict: Option<Clause>,
    pub unsat: bool,
    pub assumptions: Vec<Literal>,
    pub constraint: Vec<Literal>,
    pub unsat_constraint: bool,
    /// Whether `failing` has run for the current refutation.
    pub marked_failed: bool,
    pub(crate) failed_assumption: Option<Literal>,
    pub stats: Stats,
    pub trimmer: Trimmer,
}

impl Solver {
    /// Create a solver for variables 1 up to and including `maxvar`.
    pub fn new(maxvar: Variable, config: Config) -> Solver {
        let mut solver = Solver {
            maxvar,
            db: ClauseDatabase::default(),
            clauses: Vec::new(),
            values: Array::new(false, maxvar.array_size_for_literals()),
            marks: Array::new(false, maxvar.array_size_for_literals()),
            trail: Vec::new(),
            propagated: 0,
            vars: Array::new(Var::default(), maxvar.array_size_for_variables()),
            flags: Array::new(Flags::default(), maxvar.array_size_for_variables()),
            control: vec![0],
            watches: Array::new(Vec::new(), maxvar.array_size_for_literals()),
            conflict: None,
            unsat: false,
            assumptions: Vec::new(),
            constraint: Vec::new(),
            unsat_constraint: false,
            marked_failed: true,
            failed_assumption: None,
            stats: Stats::default(),
            trimmer: Trimmer::new(maxvar, config.trim),
            config,
        };
        if solver.trimmer.enabled {
            let forced = solver.setup_trimming_options();
            solver.trimmer.forced_options = forced;
        }
        solver
    }

    /// Disable host options that are incompatible with trimming. Returns
    /// true if any of them had been enabled.
    pub fn setup_trimming_options(&mut self) -> bool {
        let updated =
            self.config.chrono || self.config.probe || self.config.compact || self.config.checkproof;
        self.config.chrono = false;
        self.config.probe = false;
        self.config.compact = false;
        self.config.checkproof = false;
        updated
    }

    /// Whether the literal is assigned true.
    pub fn assigned(&self, literal: Literal) -> bool {
        self.values[literal]
    }
    /// Whether the literal is assigned false.
    pub fn falsified(&self, literal: Literal) -> bool {
        self.values[-literal]
    }
    /// Whether the literal is unassigned.
    pub fn unassigned(&self, literal: Literal) -> bool {
        !self.assigned(literal) && !self.falsified(literal)
    }
    /// The search bookkeeping of the literal's variable.
    pub fn var(&self, literal: Literal) -> &Var {
        &self.vars[literal.var()]
    }
    /// The current decision level.
    pub fn level(&self) -> usize {
        self.control.len() - 1
    }
    /// The trail mark of the current decision level.
    pub(crate) fn top_level_mark(&self) -> usize {
        *self.control.last().unwrap()
    }
    /// Whether the variable of this literal is fixed at the root level.
    pub fn is_fixed(&self, literal: Literal) -> bool {
        self.flags[literal.var()].status == Status::Fixed
    }
    /// Translate an internal literal to the user-visible numbering.
    pub fn externalize(&self, literal: Literal) -> i32 {
        literal.decode()
    }

    /// Add a literal to the trail with a given reason.
    pub fn assign(&mut self, literal: Literal, reason: Reason) {
        requires!(self.unassigned(literal));
        let variable = literal.var();
        self.vars[variable] = Var {
            reason,
            level: self.level() as u32,
            trail: self.trail.len(),
        };
        self.values[literal] = true;
        if self.level() == 0 && self.flags[variable].status == Status::Active {
            self.flags[variable].status = Status::Fixed;
            self.stats.fixed += 1;
        }
        self.trail.push(literal);
    }

    /// Remove a literal from the assignment. The trail itself is shrunk
    /// lazily by the caller.
    pub fn unassign(&mut self, literal: Literal) {
        requires!(self.assigned(literal));
        self.values[literal] = false;
    }

    /// Reactivate a variable that was fixed at the root level so that it
    /// can be assigned again.
    pub fn reactivate_fixed(&mut self, literal: Literal) {
        let flags = &mut self.flags[literal.var()];
        requires!(flags.status == Status::Fixed);
        flags.status = Status::Active;
        requires!(self.stats.fixed > 0);
        self.stats.fixed -= 1;
        self.stats.reactivated += 1;
    }

    /// Undo all assignments above the given decision level.
    pub fn backtrack(&mut self, new_level: usize) {
        requires!(new_level <= self.level());
        if new_level == self.level() {
            return;
        }
        let mark = self.control[new_level + 1];
        while self.trail.len() > mark {
            let literal = self.trail.pop().unwrap();
            self.unassign(literal);
        }
        self.control.truncate(new_level + 1);
        self.propagated = cmp::min(self.propagated, self.trail.len());
    }

    /// Open a new decision level and assign the literal.
    pub fn search_assume_decision(&mut self, literal: Literal) {
        self.control.push(self.trail.len());
        self.assign(literal, Reason::decision());
    }

    /// Open one decision level per literal, without propagating in between.
    pub fn search_assume_multiple_decisions(&mut self, decisions: &[Literal]) {
        for &literal in decisions {
            self.search_assume_decision(literal);
        }
    }

    /// Connect a clause to the watch lists of its first two literals.
    pub fn watch_clause(&mut self, clause: Clause) {
        requires!(self.db.size(clause) > 1);
        requires!(!self.db.fields(clause).watched());
        let w0 = self.db.clause(clause)[0];
        let w1 = self.db.clause(clause)[1];
        self.watches[w0].push(clause);
        self.watches[w1].push(clause);
        self.db.fields_mut(clause).set_watched(true);
    }

    /// Remove the watch list entries of a clause.
    pub fn unwatch_clause(&mut self, clause: Clause) {
        requires!(self.db.fields(clause).watched());
        let w0 = self.db.clause(clause)[0];
        let w1 = self.db.clause(clause)[1];
        self.watch_find_and_remove(w0, clause);
        self.watch_find_and_remove(w1, clause);
        self.db.fields_mut(clause).set_watched(false);
    }

    fn watch_find_and_remove(&mut self, literal: Literal, clause: Clause) {
        let position = self.watches[literal]
            .iter()
            .position(|&watched| watched == clause);
        invariant!(position.is_some(), "clause missing from watch list");
        if let Some(position) = position {
            self.watches[literal].swap_remove(position);
        }
    }

    /// Order the literals of a clause for watching and connect it.
    /// Assigns the unit literal if the clause is unit under the current
    /// trail; returns a conflict if it is falsified.
    pub fn connect_clause(&mut self, clause: Clause) -> MaybeConflict {
        let size = self.db.size(clause);
        requires!(size > 1);
        let first = (0..size).find(|&i| !self.falsified(self.db.clause(clause)[i]));
        match first {
            None => {
                self.conflict = Some(clause);
                CONFLICT
            }
            Some(i1) => {
                self.db.swap(clause, 0, i1);
                let second = (1..size).find(|&i| !self.falsified(self.db.clause(clause)[i]));
                match second {
                    None => {
                        let unit = self.db.clause(clause)[0];
                        self.watch_clause(clause);
                        if !self.assigned(unit) {
                            self.assign(unit, Reason::forced(clause));
                        }
                        NO_CONFLICT
                    }
                    Some(i2) => {
                        self.db.swap(clause, 1, i2);
                        self.watch_clause(clause);
                        NO_CONFLICT
                    }
                }
            }
        }
    }

    /// Disconnect all watch lists and reconnect every active clause.
    pub fn flush_watches(&mut self) {
        for literal in Literal::all(self.maxvar) {
            self.watches[literal].clear();
        }
        for i in 0..self.clauses.len() {
            let clause = self.clauses[i];
            self.db.fields_mut(clause).set_watched(false);
        }
        for i in 0..self.clauses.len() {
            let clause = self.clauses[i];
            if self.db.is_deallocated(clause) || self.db.fields(clause).garbage() {
                continue;
            }
            let size = self.db.size(clause);
            // Move up to two non-falsified literals to the watched
            // positions. A satisfied first literal stays put, which keeps
            // reason clauses intact.
            if let Some(i1) = (0..size).find(|&i| !self.falsified(self.db.clause(clause)[i])) {
                self.db.swap(clause, 0, i1);
                if let Some(i2) = (1..size).find(|&i| !self.falsified(self.db.clause(clause)[i]))
                {
                    self.db.swap(clause, 1, i2);
                }
            }
            self.watch_clause(clause);
        }
    }

    /// Move clauses with a core watch to the front of the watch list so
    /// that propagation prefers them.
    pub(crate) fn prefer_core_watches(&mut self, literal: Literal) {
        let length = self.watches[literal].len();
        if length == 0 {
            return;
        }
        let mut low = 0;
        let mut high = length - 1;
        while low < high {
            let clause = self.watches[literal][high];
            if !self.db.proof(clause).core() {
                high -= 1;
                continue;
            }
            self.watches[literal].swap(low, high);
            low += 1;
        }
    }

    /// Propagate all assigned literals. With `prefer_core`, clauses with a
    /// core watch are tried first.
    pub fn propagate(&mut self, prefer_core: bool) -> MaybeConflict {
        while self.propagated < self.trail.len() {
            let literal = -self.trail[self.propagated];
            self.propagated += 1;
            self.stats.propagations += 1;
            if prefer_core {
                self.prefer_core_watches(literal);
            }
            let mut i = 0;
            while i < self.watches[literal].len() {
                let clause = self.watches[literal][i];
                if self.db.fields(clause).garbage() {
                    i += 1;
                    continue;
                }
                if self.db.clause(clause)[0] == literal {
                    self.db.swap(clause, 0, 1);
                }
                invariant!(self.db.clause(clause)[1] == literal);
                let other = self.db.clause(clause)[0];
                if self.assigned(other) {
                    i += 1;
                    continue;
                }
                let size = self.db.size(clause);
                let replacement =
                    (2..size).find(|&k| !self.falsified(self.db.clause(clause)[k]));
                if let Some(k) = replacement {
                    let new_watch = self.db.clause(clause)[k];
                    self.db.swap(clause, 1, k);
                    self.watches[literal].swap_remove(i);
                    self.watches[new_watch].push(clause);
                    continue;
                }
                if self.falsified(other) {
                    self.conflict = Some(clause);
                    return CONFLICT;
                }
                self.assign(other, Reason::forced(clause));
                i += 1;
            }
        }
        NO_CONFLICT
    }

    /// Allocate a redundant clause in the pool without connecting it.
    pub fn new_redundant_clause(&mut self, literals: Vec<Literal>) -> Clause {
        requires!(literals.len() >= 2);
        let clause = self.db.alloc(literals);
        self.db.fields_mut(clause).set_redundant(true);
        self.db.proof_mut(clause).set_lemma(true);
        self.stats.current_redundant += 1;
        self.clauses.push(clause);
        clause
    }

    /// Allocate an irredundant clause in the pool without connecting it.
    pub fn new_irredundant_clause(&mut self, literals: Vec<Literal>) -> Clause {
        requires!(literals.len() >= 2);
        let size = literals.len();
        let clause = self.db.alloc(literals);
        self.stats.current_irredundant += 1;
        self.stats.irrlits += size;
        self.clauses.push(clause);
        clause
    }

    /// Allocate a unit clause. Unit clauses are exempt from garbage
    /// collection and live in the trimmer's private list.
    pub fn new_unit_clause(&mut self, literal: Literal, original: bool) -> Clause {
        let clause = self.db.alloc(vec![literal]);
        self.db.fields_mut(clause).set_keep(true);
        self.db.fields_mut(clause).set_redundant(!original);
        self.db.proof_mut(clause).set_lemma(!original);
        self.trimmer.unit_clauses.push(clause);
        self.trimmer.stats.units += 1;
        clause
    }

    /// Account for a clause becoming garbage. Size-1 clauses bypass the
    /// accounting. Idempotent.
    pub fn mark_garbage(&mut self, clause: Clause) {
        if self.db.fields(clause).garbage() {
            return;
        }
        self.db.fields_mut(clause).set_garbage(true);
        let size = self.db.size(clause);
        if size == 1 {
            return;
        }
        let bytes = self.db.bytes(clause);
        if self.db.fields(clause).redundant() {
            requires!(self.stats.current_redundant > 0);
            self.stats.current_redundant -= 1;
        } else {
            requires!(self.stats.current_irredundant > 0);
            self.stats.current_irredundant -= 1;
            requires!(self.stats.irrlits >= size);
            self.stats.irrlits -= size;
        }
        self.stats.garbage_bytes += bytes;
        self.stats.garbage_clauses += 1;
        self.stats.garbage_literals += size;
    }

    /// Account for a garbage clause becoming active again. Idempotent.
    pub fn mark_active(&mut self, clause: Clause) {
        if !self.db.fields(clause).garbage() {
            return;
        }
        self.db.fields_mut(clause).set_garbage(false);
        let size = self.db.size(clause);
        if size == 1 {
            return;
        }
        let bytes = self.db.bytes(clause);
        if self.db.fields(clause).redundant() {
            self.stats.current_redundant += 1;
        } else {
            self.stats.current_irredundant += 1;
            self.stats.irrlits += size;
        }
        requires!(self.stats.garbage_bytes >= bytes);
        self.stats.garbage_bytes -= bytes;
        requires!(self.stats.garbage_clauses > 0);
        self.stats.garbage_clauses -= 1;
        requires!(self.stats.garbage_literals >= size);
        self.stats.garbage_literals -= size;
    }

    /// Remove duplicate literals. Must be called when no literals are
    /// marked.
    pub fn remove_duplicates(&mut self, literals: &[Literal]) -> Vec<Literal> {
        let mut unique = Vec::new();
        for &literal in literals {
            if self.marks[literal] {
                continue;
            }
            self.marks[literal] = true;
            unique.push(literal);
        }
        for &literal in &unique {
            self.marks[literal] = false;
        }
        unique
    }

    /// Add a clause of the input formula, in the user-visible numbering.
    pub fn add_original_clause(&mut self, literals: &[i32]) {
        if self.unsat {
            return;
        }
        requires!(self.level() == 0);
        let internal: Vec<Literal> = literals.iter().map(|&value| Literal::new(value)).collect();
        let unique = self.remove_duplicates(&internal);
        if trim::trivially_satisfied(&unique) {
            return;
        }
        if unique.is_empty() {
            // An empty input clause refutes the formula outright; there is
            // no conflict clause the trimmer could point at.
            self.unsat = true;
            return;
        }
        if unique.len() == 1 {
            let literal = unique[0];
            if self.assigned(literal) {
                return;
            }
            if self.falsified(literal) {
                trim::add_falsified_original_clause(self, &unique, false);
                self.unsat = true;
                return;
            }
            let reason = if self.trimmer.enabled {
                Reason::forced(trim::add_derived_unit_clause(self, literal, true))
            } else {
                Reason::decision()
            };
            self.assign(literal, reason);
            return;
        }
        if unique.iter().all(|&literal| self.falsified(literal)) {
            trim::add_falsified_original_clause(self, &unique, false);
            self.unsat = true;
            return;
        }
        let clause = self.new_irredundant_clause(unique);
        let conflict = self.connect_clause(clause);
        invariant!(conflict == NO_CONFLICT);
    }

    /// Assume a literal for the next solve call.
    pub fn assume(&mut self, literal: i32) {
        self.assumptions.push(Literal::new(literal));
    }

    /// Install a disjunctive constraint for the next solve call.
    pub fn constrain(&mut self, literals: &[i32]) {
        self.constraint = literals.iter().map(|&value| Literal::new(value)).collect();
    }

    fn constraint_satisfied(&self) -> bool {
        self.constraint.iter().any(|&literal| self.assigned(literal))
    }

    /// Solve the formula under the installed assumptions and constraint.
    pub fn solve(&mut self) -> SolveResult {
        if self.unsat {
            if self.trimmer.enabled && self.trimmer.final_conflict.is_none() {
                // A previous trim cleaned the final conflict. Re-derive it
                // from the retained units and clauses.
                self.propagated = 0;
                if self.propagate(false) == CONFLICT {
                    trim::add_derived_empty_clause(self);
                }
            }
            return SolveResult::Unsatisfiable;
        }
        if self.propagate(false) == CONFLICT {
            self.unsat = true;
            trim::add_derived_empty_clause(self);
            return SolveResult::Unsatisfiable;
        }
        loop {
            if self.level() < self.assumptions.len() {
                let assumption = self.assumptions[self.level()];
                if self.assigned(assumption) {
                    // Keep the level-to-assumption correspondence with an
                    // empty decision level.
                    self.control.push(self.trail.len());
                } else if self.falsified(assumption) {
                    self.failed_assumption = Some(assumption);
                    self.marked_failed = false;
                    return SolveResult::Unsatisfiable;
                } else {
                    self.search_assume_decision(assumption);
                }
            } else if !self.constraint.is_empty() && !self.constraint_satisfied() {
                match self
                    .constraint
                    .iter()
                    .cloned()
                    .find(|&literal| self.unassigned(literal))
                {
                    Some(literal) => {
                        self.stats.decisions += 1;
                        self.search_assume_decision(literal);
                    }
                    None => {
                        let deepest = self
                            .constraint
                            .iter()
                            .map(|&literal| self.var(literal).level as usize)
                            .max()
                            .unwrap();
                        if deepest <= self.assumptions.len() {
                            self.unsat_constraint = true;
                            self.marked_failed = false;
                            return SolveResult::Unsatisfiable;
                        }
                        // The falsification depends on search decisions;
                        // undo the deepest one and try again.
                        self.backtrack(deepest - 1);
                    }
                }
            } else if let Some(literal) = self.next_decision() {
                self.stats.decisions += 1;
                self.search_assume_decision(literal);
            } else {
                return SolveResult::Satisfiable;
            }
            while self.propagate(false) == CONFLICT {
                self.stats.conflicts += 1;
                if self.level() == 0 {
                    self.unsat = true;
                    trim::add_derived_empty_clause(self);
                    return SolveResult::Unsatisfiable;
                }
                self.analyze();
                if self.stats.conflicts % 300 == 0 {
                    self.reduce();
                    self.collect_garbage();
                }
            }
        }
    }

    /// Pick the next decision literal: the first unassigned variable.
    fn next_decision(&self) -> Option<Literal> {
        (1..=self.maxvar.0)
            .map(|value| Variable(value).literal())
            .find(|&literal| self.unassigned(literal))
    }

    /// First-UIP conflict analysis. Learns a clause, backjumps and assigns
    /// the asserting literal.
    fn analyze(&mut self) {
        let conflict = self.conflict.take().unwrap();
        let current = self.level() as u32;
        let mut learned: Vec<Literal> = Vec::new();
        let mut pending = 0usize;
        for i in 0..self.db.size(conflict) {
            let literal = self.db.clause(conflict)[i];
            self.analyze_literal(literal, current, &mut learned, &mut pending);
        }
        let mut position = self.trail.len();
        let uip;
        loop {
            invariant!(position > self.top_level_mark());
            position -= 1;
            let literal = self.trail[position];
            if !self.flags[literal.var()].seen {
                continue;
            }
            self.flags[literal.var()].seen = false;
            pending -= 1;
            if pending == 0 {
                uip = literal;
                break;
            }
            let reason = self.vars[literal.var()].reason;
            invariant!(reason.is_forced());
            let clause = reason.clause();
            invariant!(self.db.clause(clause)[0] == literal);
            for i in 1..self.db.size(clause) {
                let other = self.db.clause(clause)[i];
                self.analyze_literal(other, current, &mut learned, &mut pending);
            }
        }
        for &literal in &learned {
            self.flags[literal.var()].seen = false;
        }
        let asserting = -uip;
        let jump = learned
            .iter()
            .map(|&literal| self.var(literal).level as usize)
            .max()
            .unwrap_or(0);
        if learned.is_empty() {
            self.backtrack(0);
            let reason = if self.trimmer.enabled {
                Reason::forced(trim::add_derived_unit_clause(self, asserting, false))
            } else {
                Reason::decision()
            };
            self.assign(asserting, reason);
        } else {
            // Watch the asserting literal and a literal of the jump level.
            let mut literals = Vec::with_capacity(learned.len() + 1);
            literals.push(asserting);
            literals.extend_from_slice(&learned);
            let watch2 = (1..literals.len())
                .find(|&i| self.var(literals[i]).level as usize == jump)
                .unwrap();
            literals.swap(1, watch2);
            self.backtrack(jump);
            let clause = self.new_redundant_clause(literals);
            trim::add_derived_clause(self, clause);
            self.watch_clause(clause);
            self.assign(asserting, Reason::forced(clause));
            self.stats.learned += 1;
        }
    }

    fn analyze_literal(
        &mut self,
        literal: Literal,
        current: u32,
        learned: &mut Vec<Literal>,
        pending: &mut usize,
    ) {
        let variable = literal.var();
        if self.vars[variable].level == 0 {
            return;
        }
        if self.flags[variable].seen {
            return;
        }
        self.flags[variable].seen = true;
        if self.vars[variable].level == current {
            *pending += 1;
        } else {
            learned.push(literal);
        }
    }

    /// Compute the failed assumptions for the current refutation, marking
    /// every traversed reason clause as core, and report the failed clause
    /// to the trimmer. Must run exactly once per refutation.
    pub fn failing(&mut self) {
        requires!(!self.marked_failed);
        let mut work: Vec<Literal> = Vec::new();
        let mut failed: Vec<Literal> = Vec::new();
        if self.unsat_constraint {
            for i in 0..self.constraint.len() {
                let literal = self.constraint[i];
                invariant!(self.falsified(literal));
                work.push(-literal);
            }
        } else {
            let assumption = self.failed_assumption.expect("no failed assumption");
            invariant!(self.falsified(assumption));
            failed.push(assumption);
            work.push(-assumption);
        }
        let mut seen: Vec<Variable> = Vec::new();
        while let Some(literal) = work.pop() {
            let variable = literal.var();
            if self.flags[variable].seen {
                continue;
            }
            self.flags[variable].seen = true;
            seen.push(variable);
            invariant!(self.assigned(literal));
            let reason = self.vars[variable].reason;
            if reason.is_forced() {
                let clause = reason.clause();
                if self.trimmer.enabled {
                    self.db.proof_mut(clause).set_core(true);
                }
                for i in 0..self.db.size(clause) {
                    let other = self.db.clause(clause)[i];
                    if other == literal {
                        continue;
                    }
                    invariant!(self.falsified(other));
                    work.push(-other);
                }
            } else if !failed.contains(&literal) {
                failed.push(literal);
            }
        }
        for variable in seen {
            self.flags[variable].seen = false;
        }
        let clause: Vec<Literal> = failed.iter().map(|&literal| -literal).collect();
        if !clause.is_empty() {
            trim::add_failing_assumption(self, &clause);
        }
    }

    /// Set the protect flag on every reason clause of the trail.
    pub fn protect_reasons(&mut self) {
        for i in 0..self.trail.len() {
            let reason = self.vars[self.trail[i].var()].reason;
            if reason.is_forced() {
                self.db.fields_mut(reason.clause()).set_protect(true);
            }
        }
    }

    /// Clear the protect flag on every reason clause of the trail.
    pub fn unprotect_reasons(&mut self) {
        for i in 0..self.trail.len() {
            let reason = self.vars[self.trail[i].var()].reason;
            if reason.is_forced() {
                self.db.fields_mut(reason.clause()).set_protect(false);
            }
        }
    }

    /// Delete a redundant clause, notifying the trimmer.
    pub fn delete_clause(&mut self, clause: Clause) {
        requires!(!self.db.fields(clause).garbage());
        trim::delete_clause(self, clause);
        if self.db.fields(clause).watched() {
            self.unwatch_clause(clause);
        }
        self.mark_garbage(clause);
    }

    /// Delete redundant clauses that are neither reasons nor exempt.
    pub fn reduce(&mut self) {
        self.protect_reasons();
        for i in 0..self.clauses.len() {
            let clause = self.clauses[i];
            if self.db.is_deallocated(clause) {
                continue;
            }
            let fields = self.db.fields(clause);
            if fields.garbage() || !fields.redundant() || fields.keep() || fields.protect() {
                continue;
            }
            self.delete_clause(clause);
        }
        self.unprotect_reasons();
        self.stats.reductions += 1;
    }

    /// Release the storage of garbage clauses. Clauses referenced from the
    /// derivation log are flipped to literal copies first.
    pub fn collect_garbage(&mut self) {
        if self.trimmer.isolated() {
            return;
        }
        self.protect_reasons();
        for i in 0..self.clauses.len() {
            let clause = self.clauses[i];
            if self.db.is_deallocated(clause) {
                continue;
            }
            let fields = self.db.fields(clause);
            if !fields.garbage() || fields.keep() || fields.protect() {
                continue;
            }
            if self.db.fields(clause).watched() {
                self.unwatch_clause(clause);
            }
            if self.db.proof(clause).index() != 0 {
                trim::deallocate_clause(self, clause);
            }
            self.db.deallocate(clause);
        }
        self.unprotect_reasons();
    }

    /// Print a one-letter progress line.
    pub fn report(&self, kind: char) {
        if self.config.verbose {
            comment!(
                "{} trail {} irredundant {} redundant {}",
                kind,
                self.trail.len(),
                self.stats.current_irredundant,
                self.stats.current_redundant
            );
        }
    }

    /// The value of a variable in the current (satisfying) assignment.
    pub fn value_of(&self, variable: Variable) -> bool {
        self.assigned(variable.literal())
    }

    /// Heap memory owned by the solver.
    pub fn heap_space(&self) -> usize {
        self.db.heap_space()
            + self.trail.heap_space()
            + self.watches.heap_space()
            + self.clauses.heap_space()
            + self.trimmer.heap_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver_for(maxvar: u32, clauses: &[&[i32]]) -> Solver {
        let mut solver = Solver::new(Variable(maxvar), Config::default());
        for clause in clauses {
            solver.add_original_clause(clause);
        }
        solver
    }

    #[test]
    fn propagates_units() {
        let mut solver = solver_for(2, &[&[1], &[-1, 2]]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert!(solver.assigned(Literal::new(1)));
        assert!(solver.assigned(Literal::new(2)));
    }

    #[test]
    fn simple_unsat() {
        let mut solver = solver_for(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        assert!(solver.unsat);
    }

    #[test]
    fn simple_sat_with_model() {
        let mut solver = solver_for(3, &[&[1, 2], &[-1, 3]]);
        assert_eq!(solver.solve(), SolveResult::Satisfiable);
        assert!(solver.value_of(Variable(1)) || solver.value_of(Variable(2)));
    }

    #[test]
    fn failed_assumptions() {
        let mut solver = solver_for(2, &[&[1, 2]]);
        solver.assume(-1);
        solver.assume(-2);
        assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
        // UNSAT under assumptions, not globally.
        assert!(!solver.unsat);
        assert!(!solver.marked_failed);
    }

    #[test]
    fn duplicate_literals_are_removed() {
        let mut solver = Solver::new(Variable(2), Config::default());
        let literals: Vec<Literal> = [1, 1, 2].iter().map(|&l| Literal::new(l)).collect();
        let unique = solver.remove_duplicates(&literals);
        assert_eq!(unique.len(), 2);
    }
}
