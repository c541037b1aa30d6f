//! Round scheduler, value and check rounds, and the run loop.
//!
//! A [`ProtocolRun`] owns one scenario's entire mutable state: the node
//! set, the tick counters, the compromised flag and the transcript.  Rounds
//! execute strictly one at a time; each round performs exactly one
//! [`CorrelatedSource::draw`] and applies its post-processing to the whole
//! node set before the next tick is evaluated.  The scheduler interleaves
//! one check round after every `check_interval` consecutive value rounds
//! and halts on the first of three conditions: the target bit count is
//! reached, a check round detects disturbance, or the round budget is
//! exhausted.
//!
//! Detection policy: a failed check round sets the run-wide compromised
//! flag and the run aborts rather than attempting recovery.  A value round
//! whose outcome vector is not unanimous is tolerated noise; its bit is
//! discarded for every node and the run continues.

use crate::aggregate::{elect_leader, shared_sum, unanimous, AggregateFailure};
use crate::node::Node;
use crate::prng::{derive_subseed, SeededPrng};
use crate::scenario::{ConfigError, ScenarioConfig};
use crate::source::{Basis, CorrelatedSource, GhzSource, Transform};
use crate::transcript::{RoundKind, RoundRecord, RunTranscript};
use serde::Serialize;

const BASIS_DOMAIN: &[u8] = b"GHZ_ACCORD:BASIS";
const SOURCE_DOMAIN: &[u8] = b"GHZ_ACCORD:SOURCE_SUBSEED";

/// Why a run left its scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    /// The target number of value bits was collected.
    Success,
    /// A check round detected disturbance.
    Compromised,
    /// The round budget ran out before the target was reached.
    Exhausted,
}

/// Terminal result of one protocol run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every node derived the same integer; a leader was elected.
    Success {
        /// The agreed shared integer.
        shared_value: u64,
        /// `shared_value` reduced modulo the party count.
        leader_index: usize,
    },
    /// A check round detected disturbance; the sum is withheld.
    Compromised,
    /// Nodes derived different integers despite no detected compromise.
    Inconsistent {
        /// Every node's integer, in node order.
        per_node_values: Vec<u64>,
    },
    /// The round budget ran out before the target was reached.
    Exhausted,
}

/// Joint verdict of the two check-round sub-tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckEvaluation {
    /// `true` when all Z-basis outcomes agree, or fewer than two exist.
    pub z_agreement: bool,
    /// `true` when the X-basis outcomes have even joint parity, or fewer
    /// than two exist.
    pub x_parity_even: bool,
}

impl CheckEvaluation {
    /// Returns `true` when neither sub-test detected disturbance.
    pub fn passed(&self) -> bool {
        self.z_agreement && self.x_parity_even
    }
}

/// Applies the dual disturbance test to one check round's observations.
///
/// Outcomes of parties that chose Z must be identical when two or more
/// exist; outcomes of parties that chose X must have even joint parity
/// when two or more exist.  A sub-test with fewer than two participants is
/// not triggered and counts as passed.
///
/// # Examples
///
/// ```
/// use ghz_accord::{evaluate_check, Basis};
///
/// let odd = [(Basis::Z, 0), (Basis::X, 1), (Basis::X, 0), (Basis::Z, 0)];
/// assert!(!evaluate_check(&odd).passed());
///
/// let even = [(Basis::Z, 0), (Basis::X, 1), (Basis::X, 1), (Basis::Z, 0)];
/// assert!(evaluate_check(&even).passed());
/// ```
pub fn evaluate_check(observations: &[(Basis, u8)]) -> CheckEvaluation {
    let z_outcomes: Vec<u8> = observations
        .iter()
        .filter(|(basis, _)| *basis == Basis::Z)
        .map(|(_, outcome)| *outcome)
        .collect();
    let x_outcomes: Vec<u8> = observations
        .iter()
        .filter(|(basis, _)| *basis == Basis::X)
        .map(|(_, outcome)| *outcome)
        .collect();
    let z_agreement = z_outcomes.len() < 2 || unanimous(&z_outcomes);
    let x_parity_even =
        x_outcomes.len() < 2 || x_outcomes.iter().fold(0u8, |acc, &bit| acc ^ (bit & 1)) == 0;
    CheckEvaluation {
        z_agreement,
        x_parity_even,
    }
}

/// One scenario's complete mutable run state.
///
/// Constructed fresh per scenario; nothing is shared across runs.  The
/// [`ProtocolRun::execute`] loop drives the run to completion, but the
/// per-round methods are public so a run can also be stepped tick by tick.
#[derive(Debug, Clone)]
pub struct ProtocolRun {
    config: ScenarioConfig,
    nodes: Vec<Node>,
    prng: SeededPrng,
    tick: usize,
    since_last_check: usize,
    collected_value_bits: usize,
    compromised: bool,
    exit: Option<ExitReason>,
    transcript: RunTranscript,
}

impl ProtocolRun {
    /// Creates a run for the given scenario, validating it first.
    pub fn new(config: ScenarioConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let nodes = (0..config.num_nodes).map(Node::new).collect();
        let prng = SeededPrng::from_seed_bytes(derive_subseed(config.seed, BASIS_DOMAIN));
        Ok(Self {
            config,
            nodes,
            prng,
            tick: 0,
            since_last_check: 0,
            collected_value_bits: 0,
            compromised: false,
            exit: None,
            transcript: RunTranscript::new(),
        })
    }

    /// Returns the scenario this run was built from.
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Returns the node set in id order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the transcript of executed rounds.
    pub fn transcript(&self) -> &RunTranscript {
        &self.transcript
    }

    /// Returns the number of executed rounds.
    pub fn tick(&self) -> usize {
        self.tick
    }

    /// Returns the number of accepted value bits.
    pub fn collected_value_bits(&self) -> usize {
        self.collected_value_bits
    }

    /// Returns `true` once a check round has detected disturbance.
    pub fn compromised(&self) -> bool {
        self.compromised
    }

    /// Returns why the run halted, once it has.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit
    }

    /// Decides whether the next tick runs a value round or a check round.
    pub fn next_round_kind(&self) -> RoundKind {
        if self.since_last_check > 0 && self.since_last_check % self.config.check_interval == 0 {
            RoundKind::Check
        } else {
            RoundKind::Value
        }
    }

    fn draw(&mut self, source: &mut dyn CorrelatedSource, transforms: &[Transform]) -> Vec<u8> {
        let adversary = self
            .config
            .adversary
            .as_ref()
            .and_then(|adversary| adversary.active_at(self.tick as u64));
        let outcome = source.draw(transforms, adversary);
        assert_eq!(
            outcome.len(),
            self.nodes.len(),
            "source outcome arity violates the draw contract"
        );
        outcome
    }

    /// Executes one value round; returns `true` when a bit was accepted.
    ///
    /// All parties request the identity transform.  A unanimous outcome
    /// vector appends its bit to every node; anything else is discarded
    /// for every node without affecting the compromised flag.
    pub fn value_round(&mut self, source: &mut dyn CorrelatedSource) -> bool {
        let transforms = vec![Transform::Identity; self.nodes.len()];
        let outcome = self.draw(source, &transforms);
        let accepted = unanimous(&outcome);
        if accepted {
            let bit = outcome[0];
            for node in &mut self.nodes {
                node.record_value_bit(bit);
            }
            self.collected_value_bits += 1;
        }
        self.transcript
            .record(RoundRecord::value(self.tick, outcome, accepted));
        self.tick += 1;
        self.since_last_check += 1;
        accepted
    }

    /// Executes one check round; returns `true` when the test passed.
    ///
    /// Every node draws a fresh uniform basis from the run's generator, the
    /// source is queried with the matching transforms, and the dual
    /// disturbance test of [`evaluate_check`] decides the verdict.  A
    /// failed verdict sets the compromised flag for the rest of the run.
    pub fn check_round(&mut self, source: &mut dyn CorrelatedSource) -> bool {
        let bases: Vec<Basis> = (0..self.nodes.len())
            .map(|_| Basis::sample(&mut self.prng))
            .collect();
        self.check_round_with_bases(source, bases)
    }

    fn check_round_with_bases(
        &mut self,
        source: &mut dyn CorrelatedSource,
        bases: Vec<Basis>,
    ) -> bool {
        let transforms: Vec<Transform> = bases.iter().map(|basis| basis.transform()).collect();
        let outcome = self.draw(source, &transforms);
        for ((node, &basis), &bit) in self.nodes.iter_mut().zip(&bases).zip(&outcome) {
            node.note_check(basis, bit);
        }
        let observations: Vec<(Basis, u8)> = bases
            .iter()
            .copied()
            .zip(outcome.iter().copied())
            .collect();
        let passed = evaluate_check(&observations).passed();
        if !passed {
            self.compromised = true;
        }
        self.transcript
            .record(RoundRecord::check(self.tick, bases, outcome, passed));
        self.tick += 1;
        self.since_last_check = 0;
        passed
    }

    /// Drives the run until it halts and returns the terminal outcome.
    ///
    /// Halt conditions are evaluated before each tick, in order: a set
    /// compromised flag aborts the run, a reached target exits with
    /// success (so a check round due on the same tick is never issued),
    /// and an exhausted budget exits with an indeterminate result.
    pub fn execute(&mut self, source: &mut dyn CorrelatedSource) -> RunOutcome {
        loop {
            if self.compromised {
                self.exit = Some(ExitReason::Compromised);
                return RunOutcome::Compromised;
            }
            if self.collected_value_bits == self.config.target_value_bits {
                self.exit = Some(ExitReason::Success);
                break;
            }
            if self.tick >= self.config.round_budget {
                self.exit = Some(ExitReason::Exhausted);
                return RunOutcome::Exhausted;
            }
            match self.next_round_kind() {
                RoundKind::Value => {
                    self.value_round(source);
                }
                RoundKind::Check => {
                    self.check_round(source);
                }
            }
        }
        match shared_sum(&self.nodes, self.compromised) {
            Ok(shared_value) => {
                let leader_index = elect_leader(shared_value, self.nodes.len())
                    .expect("node count validated at construction");
                RunOutcome::Success {
                    shared_value,
                    leader_index,
                }
            }
            Err(AggregateFailure::Inconsistent { per_node_values }) => {
                RunOutcome::Inconsistent { per_node_values }
            }
            Err(AggregateFailure::Compromised) => {
                unreachable!("compromised runs halt before aggregation")
            }
            Err(AggregateFailure::EmptyAccumulator { .. }) => {
                unreachable!("a success exit implies every node accepted a bit")
            }
        }
    }

    /// Clears all per-run state, as if the run had just been constructed.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
        self.prng = SeededPrng::from_seed_bytes(derive_subseed(self.config.seed, BASIS_DOMAIN));
        self.tick = 0;
        self.since_last_check = 0;
        self.collected_value_bits = 0;
        self.compromised = false;
        self.exit = None;
        self.transcript.clear();
    }
}

/// Builds the simulated source a scenario's seed designates.
pub fn simulated_source(config: &ScenarioConfig) -> GhzSource {
    GhzSource::from_seed_bytes(derive_subseed(config.seed, SOURCE_DOMAIN))
}

/// Runs one scenario against the bundled simulated source.
pub fn run_scenario(config: &ScenarioConfig) -> Result<RunOutcome, ConfigError> {
    let mut run = ProtocolRun::new(config.clone())?;
    let mut source = simulated_source(config);
    Ok(run.execute(&mut source))
}

#[cfg(test)]
mod tests {
    use super::{evaluate_check, run_scenario, simulated_source, ExitReason, ProtocolRun, RunOutcome};
    use crate::scenario::{AdversaryConfig, AdversaryTiming, ScenarioConfig};
    use crate::source::{Adversary, Basis, CorrelatedSource, Transform};
    use crate::transcript::RoundKind;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Replays a fixed queue of outcome vectors, one per draw.
    struct ScriptedSource {
        draws: VecDeque<Vec<u8>>,
    }

    impl ScriptedSource {
        fn new(draws: &[&[u8]]) -> Self {
            Self {
                draws: draws.iter().map(|row| row.to_vec()).collect(),
            }
        }
    }

    impl CorrelatedSource for ScriptedSource {
        fn draw(&mut self, transforms: &[Transform], _adversary: Option<Adversary>) -> Vec<u8> {
            let outcome = self.draws.pop_front().expect("script exhausted");
            assert_eq!(outcome.len(), transforms.len());
            outcome
        }
    }

    /// Always returns the all-zero vector; every round succeeds.
    struct ZeroSource;

    impl CorrelatedSource for ZeroSource {
        fn draw(&mut self, transforms: &[Transform], _adversary: Option<Adversary>) -> Vec<u8> {
            vec![0; transforms.len()]
        }
    }

    fn config(num_nodes: usize, target: usize, interval: usize, budget: usize) -> ScenarioConfig {
        ScenarioConfig {
            num_nodes,
            target_value_bits: target,
            check_interval: interval,
            round_budget: budget,
            seed: 11,
            adversary: None,
        }
    }

    #[test]
    fn test_evaluate_check_z_agreement() {
        let mismatch = [(Basis::Z, 0), (Basis::Z, 1), (Basis::X, 0)];
        let evaluation = evaluate_check(&mismatch);
        assert!(!evaluation.z_agreement);
        assert!(!evaluation.passed());

        let agree = [(Basis::Z, 1), (Basis::Z, 1), (Basis::X, 0)];
        assert!(evaluate_check(&agree).passed());
    }

    #[test]
    fn test_evaluate_check_x_parity() {
        let odd = [(Basis::Z, 0), (Basis::Z, 0), (Basis::X, 1), (Basis::X, 0)];
        let evaluation = evaluate_check(&odd);
        assert!(evaluation.z_agreement);
        assert!(!evaluation.x_parity_even);

        let even = [(Basis::Z, 0), (Basis::Z, 0), (Basis::X, 1), (Basis::X, 1)];
        assert!(evaluate_check(&even).passed());
    }

    #[test]
    fn test_lone_basis_chooser_triggers_no_test() {
        // One Z and one X participant: neither sub-test runs.
        let observations = [(Basis::Z, 0), (Basis::X, 1)];
        assert!(evaluate_check(&observations).passed());
    }

    #[test]
    fn test_concrete_four_node_scenario() {
        // Value rounds deliver 1, 0, 1, 0; the interleaved check passes.
        let mut run = ProtocolRun::new(config(4, 4, 2, 12)).unwrap();
        let mut source = ScriptedSource::new(&[
            &[1, 1, 1, 1],
            &[0, 0, 0, 0],
            &[0, 0, 0, 0],
            &[1, 1, 1, 1],
            &[0, 0, 0, 0],
        ]);
        let outcome = run.execute(&mut source);
        assert_eq!(
            outcome,
            RunOutcome::Success {
                shared_value: 10,
                leader_index: 2
            }
        );
        for node in run.nodes() {
            assert_eq!(node.value_bits(), &[1, 0, 1, 0]);
        }
        assert_eq!(run.exit_reason(), Some(ExitReason::Success));
    }

    #[test]
    fn test_target_reached_skips_due_check() {
        // Two value rounds fill the target; the script holds no third
        // draw, so issuing the due check round would panic.
        let mut run = ProtocolRun::new(config(4, 2, 2, 12)).unwrap();
        let mut source = ScriptedSource::new(&[&[1, 1, 1, 1], &[0, 0, 0, 0]]);
        let outcome = run.execute(&mut source);
        assert_eq!(
            outcome,
            RunOutcome::Success {
                shared_value: 2,
                leader_index: 2
            }
        );
        assert_eq!(run.tick(), 2);
    }

    #[test]
    fn test_inconsistent_value_round_is_tolerated() {
        let mut run = ProtocolRun::new(config(4, 1, 2, 12)).unwrap();
        let mut source = ScriptedSource::new(&[&[0, 1, 0, 0], &[1, 1, 1, 1]]);

        assert!(!run.value_round(&mut source));
        assert!(!run.compromised());
        assert_eq!(run.collected_value_bits(), 0);
        for node in run.nodes() {
            assert!(node.value_bits().is_empty());
        }
        // The discarded round still counts toward the schedule.
        assert_eq!(run.tick(), 1);
        assert_eq!(run.next_round_kind(), RoundKind::Value);

        let outcome = run.execute(&mut source);
        assert_eq!(
            outcome,
            RunOutcome::Success {
                shared_value: 1,
                leader_index: 1
            }
        );
    }

    #[test]
    fn test_failed_check_halts_run() {
        let mut run = ProtocolRun::new(config(2, 4, 2, 12)).unwrap();
        let mut source = ScriptedSource::new(&[&[1, 0]]);
        let passed = run.check_round_with_bases(&mut source, vec![Basis::X, Basis::X]);
        assert!(!passed);
        assert!(run.compromised());

        // No further draws: the run must abort without scheduling a round.
        let mut empty = ScriptedSource::new(&[]);
        assert_eq!(run.execute(&mut empty), RunOutcome::Compromised);
        assert_eq!(run.exit_reason(), Some(ExitReason::Compromised));
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut run = ProtocolRun::new(config(2, 1, 9, 3)).unwrap();
        let mut source = ScriptedSource::new(&[&[0, 1], &[0, 1], &[0, 1]]);
        assert_eq!(run.execute(&mut source), RunOutcome::Exhausted);
        assert_eq!(run.tick(), 3);
        assert_eq!(run.exit_reason(), Some(ExitReason::Exhausted));
    }

    #[test]
    fn test_check_cadence() {
        let mut run = ProtocolRun::new(config(2, 6, 2, 24)).unwrap();
        let mut source = ZeroSource;
        let mut kinds = Vec::new();
        while run.collected_value_bits() < 4 {
            kinds.push(run.next_round_kind());
            match run.next_round_kind() {
                RoundKind::Value => {
                    run.value_round(&mut source);
                }
                RoundKind::Check => {
                    run.check_round(&mut source);
                }
            }
        }
        assert_eq!(
            kinds,
            vec![
                RoundKind::Value,
                RoundKind::Value,
                RoundKind::Check,
                RoundKind::Value,
                RoundKind::Value,
            ]
        );
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let scenario = config(3, 2, 2, 12);
        let mut run = ProtocolRun::new(scenario.clone()).unwrap();
        let mut source = simulated_source(&scenario);
        let first = run.execute(&mut source);
        let first_digest = run.transcript().digest();

        run.reset();
        assert_eq!(run.tick(), 0);
        assert_eq!(run.collected_value_bits(), 0);
        assert!(!run.compromised());
        assert_eq!(run.exit_reason(), None);
        assert!(run.transcript().is_empty());
        for node in run.nodes() {
            assert!(node.value_bits().is_empty());
            assert_eq!(node.check_basis(), None);
        }

        // A fresh source replays the identical run.
        let mut source = simulated_source(&scenario);
        assert_eq!(run.execute(&mut source), first);
        assert_eq!(run.transcript().digest(), first_digest);
    }

    #[test]
    fn test_run_scenario_is_deterministic() {
        let scenario = ScenarioConfig {
            num_nodes: 4,
            target_value_bits: 8,
            check_interval: 2,
            round_budget: 24,
            seed: 99,
            adversary: Some(AdversaryConfig {
                target_index: 0,
                basis: Basis::Z,
                timing: AdversaryTiming::EveryRound,
            }),
        };
        assert_eq!(
            run_scenario(&scenario).unwrap(),
            run_scenario(&scenario).unwrap()
        );
    }

    #[test]
    fn test_ideal_run_succeeds() {
        let scenario = config(4, 8, 2, 24);
        match run_scenario(&scenario).unwrap() {
            RunOutcome::Success {
                shared_value,
                leader_index,
            } => {
                assert_eq!(leader_index, (shared_value % 4) as usize);
                assert!(shared_value < 1 << 8);
            }
            other => panic!("ideal run must succeed, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn test_perfect_correlation_always_succeeds(
            num_nodes in 2usize..8,
            target in 1usize..12,
            interval in 1usize..5,
        ) {
            let budget = ScenarioConfig::suggested_round_budget(target, interval);
            let mut run = ProtocolRun::new(config(num_nodes, target, interval, budget)).unwrap();
            let outcome = run.execute(&mut ZeroSource);
            prop_assert_eq!(
                outcome,
                RunOutcome::Success { shared_value: 0, leader_index: 0 }
            );
            for node in run.nodes() {
                prop_assert_eq!(node.value_bits().len(), target);
            }
        }
    }
}
