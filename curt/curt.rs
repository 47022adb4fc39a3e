//! Solve a DIMACS CNF and trim the refutation to an unsatisfiable core

use clap::{Arg, ArgMatches};
use curt_common::{
    as_warning, comment, die,
    literal::Literal,
    memory::format_memory_usage,
    output::{install_signal_handler, print_key_value, print_solution, Timer},
    parser::{parse_formula_file, parse_literal_list},
    puts,
};
use curt_solver::{trim, Config, CoreCollector, Solver, SolveResult, TrimSettings};
use serde_derive::Serialize;
use std::fs;

/// Run `curt`.
fn main() {
    std::process::exit(run_frontend());
}

/// Parsed arguments. See `curt --help`.
#[derive(Debug)]
struct Flags {
    formula_filename: String,
    assumptions: Vec<Literal>,
    constraint: Vec<Literal>,
    settings: TrimSettings,
    report_filename: Option<String>,
    verbose: bool,
}

impl Flags {
    /// Create a flags instance from commandline arguments.
    fn new(matches: ArgMatches) -> Flags {
        let mut settings = TrimSettings::default();
        settings.core_units = matches.is_present("CORE_UNITS");
        settings.unmark_core = matches.is_present("UNMARK_CORE");
        settings.reconstruct = !matches.is_present("NO_RECONSTRUCT");
        settings.prefer_core = matches.is_present("PREFER_CORE");
        settings.check_core = matches.is_present("CHECK_CORE");
        settings.dump_core = matches.value_of("DUMP_CORE").map(String::from);
        let assumptions = matches
            .value_of("ASSUME")
            .map(|text| {
                parse_literal_list(text)
                    .unwrap_or_else(|err| die!("failed to parse assumptions: {}", err))
            })
            .unwrap_or_default();
        let constraint = matches
            .value_of("CONSTRAIN")
            .map(|text| {
                parse_literal_list(text)
                    .unwrap_or_else(|err| die!("failed to parse constraint: {}", err))
            })
            .unwrap_or_default();
        Flags {
            formula_filename: matches.value_of("INPUT").unwrap().to_string(),
            assumptions,
            constraint,
            settings,
            report_filename: matches.value_of("REPORT").map(String::from),
            verbose: matches.is_present("v"),
        }
    }
}

/// Trim statistics as written to the TOML report.
#[derive(Debug, Serialize)]
struct TrimReport {
    core_clauses: usize,
    core_lemmas: usize,
    core_variables: usize,
    derived: usize,
    deleted: usize,
    revived: usize,
    units: usize,
    trims: usize,
    repropagations: usize,
}

/// Run `curt`, returning its exit code.
///
/// This is a separate function because `std::process::exit` does not
/// call destructors.
fn run_frontend() -> i32 {
    install_signal_handler();
    let app = clap::App::new("curt")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("INPUT")
                .required(true)
                .help("input file in DIMACS format"),
        )
        .arg(
            Arg::with_name("ASSUME")
                .takes_value(true)
                .short("a")
                .long("assume")
                .allow_hyphen_values(true)
                .help("Solve under these assumptions (space-separated literals)."),
        )
        .arg(
            Arg::with_name("CONSTRAIN")
                .takes_value(true)
                .long("constrain")
                .allow_hyphen_values(true)
                .help("Require this disjunction to hold (space-separated literals)."),
        )
        .arg(
            Arg::with_name("DUMP_CORE")
                .takes_value(true)
                .short("d")
                .long("dump-core")
                .help("Write the unsatisfiable core to this file in DIMACS format."),
        )
        .arg(
            Arg::with_name("CHECK_CORE")
                .short("c")
                .long("check-core")
                .help("Verify the extracted core with a fresh solver."),
        )
        .arg(
            Arg::with_name("CORE_UNITS")
                .long("core-units")
                .help("Mark reason clauses of undone trail literals as core."),
        )
        .arg(
            Arg::with_name("UNMARK_CORE")
                .long("unmark-core")
                .help("Clear core marks after trimming."),
        )
        .arg(
            Arg::with_name("NO_RECONSTRUCT")
                .long("no-reconstruct")
                .help("Keep the derivation log intact after trimming."),
        )
        .arg(
            Arg::with_name("PREFER_CORE")
                .long("prefer-core")
                .help("Prefer core clauses during trim-time propagation."),
        )
        .arg(
            Arg::with_name("REPORT")
                .takes_value(true)
                .short("r")
                .long("report")
                .help("Write a TOML report with trim statistics to this file."),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .help("Verbose output. Print a line for each trimming step."),
        );

    let flags = Flags::new(app.get_matches());
    let timer = Timer::name("total time");
    let formula = parse_formula_file(&flags.formula_filename)
        .unwrap_or_else(|err| die!("failed to parse {}: {}", flags.formula_filename, err));
    if formula.clauses.iter().any(|clause| clause.is_empty()) {
        // The input contains the empty clause; the core is trivial.
        as_warning!(comment!("input contains the empty clause"));
        print_solution("UNSATISFIABLE");
        return 20;
    }

    for literal in flags.assumptions.iter().chain(flags.constraint.iter()) {
        if literal.var() > formula.maxvar {
            die!("literal {} exceeds the formula's variables", literal);
        }
    }

    let config = Config {
        verbose: flags.verbose,
        trim: true,
        ..Default::default()
    };
    let mut solver = Solver::new(formula.maxvar, config);
    solver.trimmer.settings = flags.settings.clone();
    for clause in &formula.clauses {
        let external: Vec<i32> = clause.iter().map(|literal| literal.decode()).collect();
        solver.add_original_clause(&external);
    }
    for &assumption in &flags.assumptions {
        solver.assume(assumption.decode());
    }
    if !flags.constraint.is_empty() {
        let external: Vec<i32> = flags
            .constraint
            .iter()
            .map(|literal| literal.decode())
            .collect();
        solver.constrain(&external);
    }

    let result = solver.solve();
    print_key_value("variables", formula.maxvar);
    print_key_value("clauses", formula.clauses.len());
    print_key_value("conflicts", solver.stats.conflicts);
    print_key_value("decisions", solver.stats.decisions);
    print_key_value("propagations", solver.stats.propagations);

    let code = match result {
        SolveResult::Satisfiable => {
            print_solution("SATISFIABLE");
            print_model(&solver);
            10
        }
        SolveResult::Unsatisfiable => {
            let mut core = CoreCollector::default();
            trim::trim(&mut solver, &mut core);
            let stats = &solver.trimmer.stats;
            print_key_value("core clauses", stats.core.clauses);
            print_key_value("core lemmas", stats.core.lemmas);
            print_key_value("core variables", stats.core.variables);
            print_key_value("derived", stats.derived);
            print_key_value("deleted", stats.deleted);
            print_key_value("revived", stats.revived);
            if stats.repropagations != 0 {
                print_key_value("repropagations", stats.repropagations);
            }
            if let Some(filename) = &flags.report_filename {
                write_report(&solver, filename);
            }
            print_solution("UNSATISFIABLE");
            20
        }
    };
    drop(timer);
    print_key_value("memory (MB)", format_memory_usage(solver.heap_space()));
    code
}

/// Write the satisfying assignment as `v` lines.
fn print_model(solver: &Solver) {
    puts!("v");
    for value in 1..=solver.maxvar.0 {
        let variable = curt_common::literal::Variable(value);
        let literal = if solver.value_of(variable) {
            value as i32
        } else {
            -(value as i32)
        };
        puts!(" {}", literal);
    }
    puts!(" 0\n");
}

/// Write the trim statistics as TOML.
fn write_report(solver: &Solver, filename: &str) {
    let stats = &solver.trimmer.stats;
    let report = TrimReport {
        core_clauses: stats.core.clauses,
        core_lemmas: stats.core.lemmas,
        core_variables: stats.core.variables,
        derived: stats.derived,
        deleted: stats.deleted,
        revived: stats.revived,
        units: stats.units,
        trims: stats.trims,
        repropagations: stats.repropagations,
    };
    let text = toml::to_string(&report)
        .unwrap_or_else(|err| die!("failed to serialize report: {}", err));
    fs::write(filename, text)
        .unwrap_or_else(|err| die!("failed to write report {}: {}", filename, err));
}
