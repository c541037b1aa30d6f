//! Batch execution of independently seeded runs.
//!
//! Detection is statistical: a single eavesdropped run may escape every
//! check round, so meaningful claims about a scenario are claims about the
//! distribution of terminal outcomes.  [`run_trials`] executes many runs
//! of one scenario, each under its own derived seed, and tallies how the
//! runs ended.  Trials are independent, so they run in parallel on
//! non-wasm targets.

use crate::prng::derive_seed_word;
use crate::protocol::{run_scenario, RunOutcome};
use crate::scenario::{ConfigError, ScenarioConfig};
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::Serialize;

const TRIAL_DOMAIN: &[u8] = b"GHZ_ACCORD:TRIAL";

/// Tally of terminal outcomes across a batch of runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrialSummary {
    /// Number of runs executed.
    pub trials: usize,
    /// Runs that ended with an agreed shared value.
    pub succeeded: usize,
    /// Runs aborted by a failed check round.
    pub compromised: usize,
    /// Runs whose nodes disagreed after an apparently clean run.
    pub inconsistent: usize,
    /// Runs that ran out of budget.
    pub exhausted: usize,
}

impl TrialSummary {
    /// Fraction of runs that ended compromised, in `[0, 1]`.
    pub fn compromised_fraction(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.compromised as f64 / self.trials as f64
        }
    }

    fn absorb(&mut self, outcome: &RunOutcome) {
        self.trials += 1;
        match outcome {
            RunOutcome::Success { .. } => self.succeeded += 1,
            RunOutcome::Compromised => self.compromised += 1,
            RunOutcome::Inconsistent { .. } => self.inconsistent += 1,
            RunOutcome::Exhausted => self.exhausted += 1,
        }
    }
}

fn trial_outcome(config: &ScenarioConfig, index: usize) -> Result<RunOutcome, ConfigError> {
    let mut trial_config = config.clone();
    trial_config.seed = derive_seed_word(config.seed, TRIAL_DOMAIN, index as u64);
    run_scenario(&trial_config)
}

/// Runs `trials` independently seeded copies of `config` and tallies them.
///
/// Trial `i` replaces the scenario seed with a domain-separated derivation
/// of `(config.seed, i)`, so a batch is reproducible as a whole while no
/// two trials share randomness.
pub fn run_trials(config: &ScenarioConfig, trials: usize) -> Result<TrialSummary, ConfigError> {
    config.validate()?;

    #[cfg(not(target_arch = "wasm32"))]
    let outcomes: Vec<RunOutcome> = (0..trials)
        .into_par_iter()
        .map(|index| trial_outcome(config, index))
        .collect::<Result<_, _>>()?;
    #[cfg(target_arch = "wasm32")]
    let outcomes: Vec<RunOutcome> = (0..trials)
        .map(|index| trial_outcome(config, index))
        .collect::<Result<_, _>>()?;

    let mut summary = TrialSummary::default();
    for outcome in &outcomes {
        summary.absorb(outcome);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::run_trials;
    use crate::scenario::{AdversaryConfig, AdversaryTiming, ScenarioConfig};
    use crate::source::Basis;

    fn scenario(adversary: Option<AdversaryConfig>) -> ScenarioConfig {
        ScenarioConfig {
            num_nodes: 4,
            target_value_bits: 8,
            check_interval: 1,
            round_budget: 64,
            seed: 2024,
            adversary,
        }
    }

    #[test]
    fn test_ideal_batch_always_succeeds() {
        let summary = run_trials(&scenario(None), 32).unwrap();
        assert_eq!(summary.trials, 32);
        assert_eq!(summary.succeeded, 32);
        assert_eq!(summary.compromised, 0);
        assert_eq!(summary.compromised_fraction(), 0.0);
    }

    #[test]
    fn test_z_interception_is_usually_detected() {
        // With a check after every value round, eight value bits give the
        // dual test several chances; the X-parity arm fires on roughly a
        // third of checks, so most trials abort.
        let adversary = AdversaryConfig {
            target_index: 0,
            basis: Basis::Z,
            timing: AdversaryTiming::EveryRound,
        };
        let summary = run_trials(&scenario(Some(adversary)), 64).unwrap();
        assert_eq!(summary.trials, 64);
        assert_eq!(summary.inconsistent, 0);
        assert!(
            summary.compromised > summary.trials / 2,
            "detection rate collapsed: {summary:?}"
        );
    }

    #[test]
    fn test_x_interception_is_detected_sometimes() {
        let adversary = AdversaryConfig {
            target_index: 1,
            basis: Basis::X,
            timing: AdversaryTiming::EveryRound,
        };
        let summary = run_trials(&scenario(Some(adversary)), 32).unwrap();
        assert_eq!(summary.trials, 32);
        assert!(summary.compromised > 0, "no trial detected: {summary:?}");
    }

    #[test]
    fn test_batches_are_reproducible() {
        let summary = run_trials(&scenario(None), 16).unwrap();
        assert_eq!(summary, run_trials(&scenario(None), 16).unwrap());
    }
}
