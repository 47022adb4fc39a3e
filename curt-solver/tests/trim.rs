//! End-to-end trimming scenarios driving the public solver API

use curt_common::literal::{Literal, Variable};
use curt_solver::{
    trim::{self, CoreCollector, CoreVerifier},
    Config, Solver, SolveResult,
};

fn trimming_solver(maxvar: u32, clauses: &[&[i32]]) -> Solver {
    let config = Config {
        trim: true,
        ..Default::default()
    };
    let mut solver = Solver::new(Variable(maxvar), config);
    for clause in clauses {
        solver.add_original_clause(clause);
    }
    solver
}

fn sorted(mut clause: Vec<i32>) -> Vec<i32> {
    clause.sort_unstable_by_key(|literal| (literal.abs(), *literal));
    clause
}

fn sorted_clauses(clauses: &[Vec<i32>]) -> Vec<Vec<i32>> {
    let mut result: Vec<Vec<i32>> = clauses.iter().map(|c| sorted(c.clone())).collect();
    result.sort();
    result
}

/// Replay the collected core into a fresh solver and require UNSAT.
fn assert_core_unsat(core: &CoreCollector, maxvar: u32) {
    use curt_solver::trim::CoreIterator;
    let mut verifier = CoreVerifier::new(Variable(maxvar));
    for clause in &core.clauses {
        verifier.clause(clause);
    }
    for &assumption in &core.assumptions {
        verifier.assumption(assumption);
    }
    if let Some(constraint) = &core.constraint {
        verifier.constraint(constraint);
    }
    assert!(verifier.verified(), "core is not unsatisfiable");
}

#[test]
fn empty_clause_unsat_core_is_whole_formula() {
    // S1: all four clauses over two variables.
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(
        sorted_clauses(&core.clauses),
        sorted_clauses(&[vec![1, 2], vec![-1, 2], vec![1, -2], vec![-1, -2]])
    );
    assert_eq!(solver.trimmer.stats.core.clauses, 4);
    assert_eq!(solver.trimmer.stats.core.variables, 2);
    assert_core_unsat(&core, 2);
}

#[test]
fn single_unit_reason() {
    // S2: two conflicting units.
    let mut solver = trimming_solver(1, &[&[1], &[-1]]);
    assert!(solver.unsat);
    let conflict = solver.trimmer.final_conflict.expect("final conflict");
    assert_eq!(solver.db.size(conflict), 1);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(sorted_clauses(&core.clauses), vec![vec![-1], vec![1]]);
    assert_eq!(solver.trimmer.stats.core.clauses, 2);
    assert_core_unsat(&core, 1);
}

#[test]
fn assumption_failure() {
    // S3: a single clause refuted by two assumptions.
    let mut solver = trimming_solver(2, &[&[1, 2]]);
    solver.assume(-1);
    solver.assume(-2);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    assert!(!solver.unsat);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(sorted_clauses(&core.clauses), vec![vec![1, 2]]);
    assert_eq!(sorted(core.assumptions.clone()), vec![-1, -2]);
    assert_eq!(solver.trimmer.stats.core.variables, 2);
    assert_core_unsat(&core, 2);
}

#[test]
fn constraint_failure() {
    // S4: two units against a disjunctive constraint.
    let mut solver = trimming_solver(2, &[&[1], &[2]]);
    solver.constrain(&[-1, -2]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    assert!(!solver.unsat);
    assert!(solver.unsat_constraint);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(sorted_clauses(&core.clauses), vec![vec![1], vec![2]]);
    assert_eq!(core.constraint, Some(vec![-1, -2]));
    assert_eq!(solver.trimmer.stats.core.clauses, 3);
    assert_core_unsat(&core, 2);
}

#[test]
fn overconstrained_revives_last_deletion() {
    // S5: inprocessing reduces an original clause to a falsified clause
    // that is already the most recent deletion. Driven through the
    // notification hooks, the way a host's root-level shrinking would.
    let mut solver = trimming_solver(2, &[&[-1], &[-2]]);
    assert_eq!(solver.solve(), SolveResult::Satisfiable);
    let literals: Vec<Literal> = [1, 2].iter().map(|&l| Literal::new(l)).collect();
    trim::delete_clause_literals(&mut solver, &literals, true);
    trim::add_falsified_original_clause(&mut solver, &literals, true);
    solver.unsat = true;
    assert!(solver.trimmer.overconstrained);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    let expected = sorted_clauses(&[vec![-1], vec![-2], vec![1, 2]]);
    assert_eq!(sorted_clauses(&core.clauses), expected);
    // The revived final conflict appears in the core exactly once.
    assert_eq!(
        core.clauses
            .iter()
            .filter(|clause| sorted((*clause).clone()) == vec![1, 2])
            .count(),
        1
    );
    assert_core_unsat(&core, 2);
}

#[test]
fn retrim_core_is_subset() {
    // S6: solve and trim, add a unit, solve and trim again.
    let mut solver = trimming_solver(3, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut first = CoreCollector::default();
    trim::trim(&mut solver, &mut first);
    solver.add_original_clause(&[3]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut second = CoreCollector::default();
    trim::trim(&mut solver, &mut second);
    let mut allowed = sorted_clauses(&first.clauses);
    allowed.push(vec![3]);
    allowed.sort();
    for clause in sorted_clauses(&second.clauses) {
        assert!(allowed.contains(&clause), "unexpected core clause {:?}", clause);
    }
}

#[test]
fn retrim_without_reconstruct_is_monotone() {
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    solver.trimmer.settings.reconstruct = false;
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut first = CoreCollector::default();
    trim::trim(&mut solver, &mut first);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut second = CoreCollector::default();
    trim::trim(&mut solver, &mut second);
    let first_clauses = sorted_clauses(&first.clauses);
    for clause in sorted_clauses(&second.clauses) {
        assert!(first_clauses.contains(&clause));
    }
}

#[test]
fn core_units_marks_unit_reasons() {
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    solver.trimmer.settings.core_units = true;
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(solver.trimmer.stats.core.clauses, 4);
    assert_core_unsat(&core, 2);
}

#[test]
fn prefer_core_watches_during_replay() {
    let mut solver = trimming_solver(3, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2], &[1, 2, 3]]);
    solver.trimmer.settings.prefer_core = true;
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(solver.trimmer.stats.core.clauses, 4);
    assert_core_unsat(&core, 3);
}

#[test]
fn check_core_option_verifies() {
    let mut solver = trimming_solver(2, &[&[1], &[-1]]);
    solver.trimmer.settings.check_core = true;
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(solver.trimmer.stats.core.clauses, 2);
}

#[test]
fn unmark_core_clears_marks_and_stats() {
    let mut solver = trimming_solver(2, &[&[1], &[-1]]);
    solver.trimmer.settings.unmark_core = true;
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert_eq!(solver.trimmer.stats.core.clauses, 0);
    for i in 0..solver.clauses.len() {
        let clause = solver.clauses[i];
        if !solver.db.is_deallocated(clause) {
            assert!(!solver.db.proof(clause).core());
        }
    }
}

#[test]
fn proof_well_formedness_is_maintained() {
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    trim::check_environment(&solver);
    assert_eq!(
        solver.trimmer.proof.len(),
        solver.trimmer.stats.derived + solver.trimmer.stats.deleted
    );
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    trim::check_environment(&solver);
}

#[test]
fn garbage_marks_are_restored_after_trim() {
    // Property 8: trimming leaves the clause-garbage state as dictated by
    // the log, so a second restoration round-trips.
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    solver.trimmer.settings.reconstruct = false;
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let garbage_before: Vec<bool> = solver
        .clauses
        .iter()
        .map(|&clause| solver.db.fields(clause).garbage())
        .collect();
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    let garbage_after: Vec<bool> = solver
        .clauses
        .iter()
        .take(garbage_before.len())
        .map(|&clause| solver.db.fields(clause).garbage())
        .collect();
    assert_eq!(garbage_before, garbage_after);
}

#[test]
fn trail_is_usable_after_trim() {
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    // The solver can still answer queries after trimming.
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
}

#[test]
fn visitor_short_circuits_traversal() {
    struct StopAfterOne {
        seen: usize,
    }
    impl trim::CoreIterator for StopAfterOne {
        fn clause(&mut self, _literals: &[i32]) -> bool {
            self.seen += 1;
            self.seen < 1
        }
        fn assumption(&mut self, _literal: i32) -> bool {
            true
        }
        fn constraint(&mut self, _literals: &[i32]) -> bool {
            true
        }
    }
    let mut solver = trimming_solver(2, &[&[1, 2], &[-1, 2], &[1, -2], &[-1, -2]]);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut visitor = StopAfterOne { seen: 0 };
    trim::trim(&mut solver, &mut visitor);
    assert_eq!(visitor.seen, 1);
}

#[test]
fn larger_pigeonhole_core() {
    // Three pigeons, two holes. Every clause participates in some
    // refutation, but the trimmed core must at least be unsatisfiable.
    let clauses: Vec<Vec<i32>> = vec![
        vec![1, 2],
        vec![3, 4],
        vec![5, 6],
        vec![-1, -3],
        vec![-1, -5],
        vec![-3, -5],
        vec![-2, -4],
        vec![-2, -6],
        vec![-4, -6],
    ];
    let refs: Vec<&[i32]> = clauses.iter().map(|c| c.as_slice()).collect();
    let mut solver = trimming_solver(6, &refs);
    assert_eq!(solver.solve(), SolveResult::Unsatisfiable);
    let mut core = CoreCollector::default();
    trim::trim(&mut solver, &mut core);
    assert!(solver.trimmer.stats.core.clauses > 0);
    assert!(core.clauses.len() <= clauses.len());
    assert_core_unsat(&core, 6);
}
