//! Minimal CLI for driving agreement-protocol scenarios.
//!
//! This binary exposes helper commands for executing a single scenario
//! against the bundled simulated source, sweeping a batch of independently
//! seeded trials, and replaying the canonical ideal/eavesdropped showcase
//! scenarios.

use ghz_accord::{
    run_trials, simulated_source, AdversaryConfig, AdversaryTiming, Basis, ProtocolRun,
    RunOutcome, ScenarioConfig, TrialSummary,
};
use serde::Serialize;
use std::env;
use std::path::PathBuf;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_run_help() {
    println!("Usage: accord run [flags]");
    println!("  --config <scenario.json>   load the scenario from a file");
    println!("  --nodes <N>                party count (default 4)");
    println!("  --bits <M>                 target value bits (default 4)");
    println!("  --interval <K>             check cadence (default 2)");
    println!("  --budget <R>               round budget (default derived from M and K)");
    println!("  --seed <S>                 scenario seed (default 0)");
    println!("  --eavesdrop <z|x>          enable an eavesdropper in the given basis");
    println!("  --target <i>               eavesdropped party index (default 0)");
    println!("  --tick <t>                 restrict the eavesdropper to one tick");
    println!("  --transcript-dir <dir>     write the round transcript to a file");
    println!("  --json                     emit the report as JSON");
}

fn print_trials_help() {
    println!("Usage: accord trials [flags]");
    println!("  --trials <N>               batch size (default 100)");
    println!("  --json                     emit the summary as JSON");
    println!("  plus every scenario flag accepted by `accord run`");
}

fn print_demo_help() {
    println!("Usage: accord demo [--seed <S>]");
    println!("  Runs the ideal scenario, then a Z-basis and an X-basis");
    println!("  eavesdropper, against otherwise identical configurations.");
}

fn print_help() {
    println!("Usage: accord <run|trials|demo> [flags]");
    println!("  run      execute one scenario and report its outcome");
    println!("  trials   execute a batch of independently seeded runs");
    println!("  demo     replay the canonical showcase scenarios");
}

/// Scenario flags shared by `run` and `trials`, plus command-local extras.
struct ParsedArgs {
    config: ScenarioConfig,
    json: bool,
    trials: usize,
    transcript_dir: Option<PathBuf>,
}

fn parse_args(args: Vec<String>, help: fn()) -> ParsedArgs {
    let mut config_file: Option<PathBuf> = None;
    let mut num_nodes = 4usize;
    let mut target_value_bits = 4usize;
    let mut check_interval = 2usize;
    let mut round_budget: Option<usize> = None;
    let mut seed = 0u64;
    let mut eavesdrop_basis: Option<Basis> = None;
    let mut eavesdrop_target = 0usize;
    let mut eavesdrop_tick: Option<u64> = None;
    let mut json = false;
    let mut trials = 100usize;
    let mut transcript_dir: Option<PathBuf> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                help();
                std::process::exit(0);
            }
            "--config" => {
                config_file = Some(PathBuf::from(
                    iter.next()
                        .unwrap_or_else(|| fatal("--config expects a value")),
                ));
            }
            "--nodes" => {
                num_nodes = iter
                    .next()
                    .unwrap_or_else(|| fatal("--nodes expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --nodes value"));
            }
            "--bits" => {
                target_value_bits = iter
                    .next()
                    .unwrap_or_else(|| fatal("--bits expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --bits value"));
            }
            "--interval" => {
                check_interval = iter
                    .next()
                    .unwrap_or_else(|| fatal("--interval expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --interval value"));
            }
            "--budget" => {
                round_budget = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--budget expects a value"))
                        .parse()
                        .unwrap_or_else(|_| fatal("invalid --budget value")),
                );
            }
            "--seed" => {
                seed = iter
                    .next()
                    .unwrap_or_else(|| fatal("--seed expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --seed value"));
            }
            "--eavesdrop" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal("--eavesdrop expects z or x"));
                eavesdrop_basis = Some(match value.as_str() {
                    "z" | "Z" => Basis::Z,
                    "x" | "X" => Basis::X,
                    other => fatal(&format!("unknown eavesdrop basis: {other}")),
                });
            }
            "--target" => {
                eavesdrop_target = iter
                    .next()
                    .unwrap_or_else(|| fatal("--target expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --target value"));
            }
            "--tick" => {
                eavesdrop_tick = Some(
                    iter.next()
                        .unwrap_or_else(|| fatal("--tick expects a value"))
                        .parse()
                        .unwrap_or_else(|_| fatal("invalid --tick value")),
                );
            }
            "--trials" => {
                trials = iter
                    .next()
                    .unwrap_or_else(|| fatal("--trials expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --trials value"));
            }
            "--transcript-dir" => {
                transcript_dir = Some(PathBuf::from(
                    iter.next()
                        .unwrap_or_else(|| fatal("--transcript-dir expects a value")),
                ));
            }
            "--json" => json = true,
            other => fatal(&format!("unknown argument: {other}")),
        }
    }

    let config = match config_file {
        Some(path) => ScenarioConfig::load(&path)
            .unwrap_or_else(|err| fatal(&format!("failed to load scenario: {err}"))),
        None => {
            let adversary = eavesdrop_basis.map(|basis| AdversaryConfig {
                target_index: eavesdrop_target,
                basis,
                timing: match eavesdrop_tick {
                    Some(tick) => AdversaryTiming::SingleTick(tick),
                    None => AdversaryTiming::EveryRound,
                },
            });
            let config = ScenarioConfig {
                num_nodes,
                target_value_bits,
                check_interval,
                round_budget: round_budget.unwrap_or_else(|| {
                    ScenarioConfig::suggested_round_budget(target_value_bits, check_interval)
                }),
                seed,
                adversary,
            };
            config
                .validate()
                .unwrap_or_else(|err| fatal(&format!("invalid scenario: {err}")));
            config
        }
    };

    ParsedArgs {
        config,
        json,
        trials,
        transcript_dir,
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    config: &'a ScenarioConfig,
    outcome: &'a RunOutcome,
    rounds_executed: usize,
    collected_value_bits: usize,
    transcript_digest: String,
}

fn describe_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Success {
            shared_value,
            leader_index,
        } => {
            println!("outcome: success");
            println!("shared value: {shared_value}");
            println!("leader index: {leader_index}");
        }
        RunOutcome::Compromised => {
            println!("outcome: compromised");
            println!("a check round detected disturbance; sum withheld");
        }
        RunOutcome::Inconsistent { per_node_values } => {
            println!("outcome: inconsistent");
            println!("per-node values: {per_node_values:?}");
        }
        RunOutcome::Exhausted => {
            println!("outcome: exhausted");
            println!("round budget ran out before the target was reached");
        }
    }
}

fn cmd_run(args: Vec<String>) {
    let parsed = parse_args(args, print_run_help);
    let mut run = ProtocolRun::new(parsed.config.clone())
        .unwrap_or_else(|err| fatal(&format!("invalid scenario: {err}")));
    let mut source = simulated_source(&parsed.config);
    let outcome = run.execute(&mut source);

    if let Some(dir) = &parsed.transcript_dir {
        let lines = run.transcript().render_lines();
        let path = ghz_accord::write_run_lines(dir, "scenario", 0, &lines)
            .unwrap_or_else(|err| fatal(&format!("failed to write transcript: {err}")));
        eprintln!("transcript written to {}", path.display());
    }

    if parsed.json {
        let report = RunReport {
            config: &parsed.config,
            outcome: &outcome,
            rounds_executed: run.tick(),
            collected_value_bits: run.collected_value_bits(),
            transcript_digest: run.transcript().digest(),
        };
        let encoded =
            serde_json::to_string_pretty(&report).unwrap_or_else(|err| fatal(&err.to_string()));
        println!("{encoded}");
    } else {
        println!(
            "scenario: {} nodes, {} bits, check every {} value rounds, seed {}",
            parsed.config.num_nodes,
            parsed.config.target_value_bits,
            parsed.config.check_interval,
            parsed.config.seed
        );
        println!(
            "rounds executed: {} ({} value bits collected)",
            run.tick(),
            run.collected_value_bits()
        );
        describe_outcome(&outcome);
        println!("transcript digest: {}", run.transcript().digest());
    }
}

fn print_summary(summary: &TrialSummary) {
    println!("trials: {}", summary.trials);
    println!("  succeeded:    {}", summary.succeeded);
    println!("  compromised:  {}", summary.compromised);
    println!("  inconsistent: {}", summary.inconsistent);
    println!("  exhausted:    {}", summary.exhausted);
    println!(
        "detection rate: {:.1}%",
        summary.compromised_fraction() * 100.0
    );
}

fn cmd_trials(args: Vec<String>) {
    let parsed = parse_args(args, print_trials_help);
    let summary = run_trials(&parsed.config, parsed.trials)
        .unwrap_or_else(|err| fatal(&format!("invalid scenario: {err}")));
    if parsed.json {
        let encoded =
            serde_json::to_string_pretty(&summary).unwrap_or_else(|err| fatal(&err.to_string()));
        println!("{encoded}");
    } else {
        print_summary(&summary);
    }
}

fn cmd_demo(args: Vec<String>) {
    let mut seed = 0u64;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_demo_help();
                return;
            }
            "--seed" => {
                seed = iter
                    .next()
                    .unwrap_or_else(|| fatal("--seed expects a value"))
                    .parse()
                    .unwrap_or_else(|_| fatal("invalid --seed value"));
            }
            other => fatal(&format!("unknown argument: {other}")),
        }
    }

    // Generous budget: the X-interception scenario discards half of its
    // value rounds and would otherwise exhaust before it can be detected.
    let base = ScenarioConfig {
        num_nodes: 4,
        target_value_bits: 4,
        check_interval: 2,
        round_budget: 24,
        seed,
        adversary: None,
    };

    let scenarios = [
        ("ideal (no eavesdropper)", None),
        ("Z-basis eavesdropper on party 0", Some(Basis::Z)),
        ("X-basis eavesdropper on party 0", Some(Basis::X)),
    ];

    for (label, basis) in scenarios {
        let mut config = base.clone();
        config.adversary = basis.map(|basis| AdversaryConfig {
            target_index: 0,
            basis,
            timing: AdversaryTiming::EveryRound,
        });
        println!("=== {label} ===");
        let mut run = ProtocolRun::new(config.clone())
            .unwrap_or_else(|err| fatal(&format!("invalid scenario: {err}")));
        let mut source = simulated_source(&config);
        let outcome = run.execute(&mut source);
        println!(
            "rounds executed: {} ({} value bits collected)",
            run.tick(),
            run.collected_value_bits()
        );
        describe_outcome(&outcome);
        println!();
    }
}

fn main() {
    let mut args = env::args().skip(1);
    let command = args.next();
    let tail: Vec<String> = args.collect();
    match command.as_deref() {
        Some("run") => cmd_run(tail),
        Some("trials") => cmd_trials(tail),
        Some("demo") => cmd_demo(tail),
        Some("-h") | Some("--help") | Some("help") | None => print_help(),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            std::process::exit(1);
        }
    }
}
