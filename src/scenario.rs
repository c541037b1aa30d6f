//! Scenario configuration and fail-fast validation.
//!
//! A [`ScenarioConfig`] captures everything that is static for the
//! lifetime of one protocol run: the party count, the target number of
//! value bits, the check cadence, the hard round budget, the scenario seed
//! and the optional eavesdropper.  Configurations are plain serde values so
//! scenario files can be stored and replayed as JSON.

use crate::source::{Adversary, Basis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while constructing or loading a scenario.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("num_nodes must be at least 1")]
    /// The run needs at least one party.
    NodeCount,
    #[error("target_value_bits must be between 1 and 64")]
    /// The shared integer must hold at least one bit and fit in 64.
    TargetBits,
    #[error("check_interval must be at least 1")]
    /// A check cadence of zero would divide by zero in the scheduler.
    CheckInterval,
    #[error("round_budget must be at least 1")]
    /// A run must be allowed to execute at least one round.
    RoundBudget,
    #[error("adversary target_index {target_index} out of range for {num_nodes} nodes")]
    /// The eavesdropper must target an existing party.
    AdversaryTarget {
        /// Configured target index.
        target_index: usize,
        /// Configured party count.
        num_nodes: usize,
    },
    #[error("io error: {0}")]
    /// Underlying filesystem failure while loading a scenario file.
    Io(String),
    #[error("decode error: {0}")]
    /// Scenario file did not parse as a configuration.
    Decode(String),
}

/// When the configured eavesdropper intercepts draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdversaryTiming {
    /// Intercept every round of the run.
    EveryRound,
    /// Intercept exactly one round, identified by its 0-indexed tick.
    SingleTick(u64),
}

impl Default for AdversaryTiming {
    fn default() -> Self {
        AdversaryTiming::EveryRound
    }
}

/// Static description of the eavesdropper present in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversaryConfig {
    /// Index of the intercepted party's share.
    pub target_index: usize,
    /// Basis the eavesdropper measures in.
    pub basis: Basis,
    /// Which rounds the eavesdropper acts on.
    #[serde(default)]
    pub timing: AdversaryTiming,
}

impl AdversaryConfig {
    /// Returns the interception applied at `tick`, if the eavesdropper acts then.
    pub fn active_at(&self, tick: u64) -> Option<Adversary> {
        let acts = match self.timing {
            AdversaryTiming::EveryRound => true,
            AdversaryTiming::SingleTick(t) => t == tick,
        };
        acts.then_some(Adversary {
            target_index: self.target_index,
            basis: self.basis,
        })
    }
}

/// Static configuration of one protocol run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Number of parties N; the width of every outcome vector.
    pub num_nodes: usize,
    /// Number of agreed bits M forming the shared sum.
    pub target_value_bits: usize,
    /// Run one check round after every K consecutive value rounds.
    pub check_interval: usize,
    /// Hard cap on executed rounds before the run exits as exhausted.
    pub round_budget: usize,
    /// Scenario seed; fixes basis choices and the simulated source.
    pub seed: u64,
    /// Optional eavesdropper present in this scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adversary: Option<AdversaryConfig>,
}

impl ScenarioConfig {
    /// Checks every configuration bound, failing fast before any round runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_nodes < 1 {
            return Err(ConfigError::NodeCount);
        }
        if self.target_value_bits < 1 || self.target_value_bits > 64 {
            return Err(ConfigError::TargetBits);
        }
        if self.check_interval < 1 {
            return Err(ConfigError::CheckInterval);
        }
        if self.round_budget < 1 {
            return Err(ConfigError::RoundBudget);
        }
        if let Some(adversary) = &self.adversary {
            if adversary.target_index >= self.num_nodes {
                return Err(ConfigError::AdversaryTarget {
                    target_index: adversary.target_index,
                    num_nodes: self.num_nodes,
                });
            }
        }
        Ok(())
    }

    /// Loads a configuration from a JSON scenario file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let config: ScenarioConfig =
            serde_json::from_str(&contents).map_err(|err| ConfigError::Decode(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Suggests a round budget for a target bit count and check cadence.
    ///
    /// An undisturbed run needs `target + (target - 1) / interval` rounds;
    /// the suggestion doubles that so discarded value rounds under noise do
    /// not starve the run.
    ///
    /// # Examples
    ///
    /// ```
    /// use ghz_accord::ScenarioConfig;
    ///
    /// assert_eq!(ScenarioConfig::suggested_round_budget(4, 2), 10);
    /// ```
    pub fn suggested_round_budget(target_value_bits: usize, check_interval: usize) -> usize {
        let checks = target_value_bits.saturating_sub(1) / check_interval.max(1);
        (target_value_bits + checks) * 2
    }
}
