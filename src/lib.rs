#![deny(missing_docs)]

//! # ghz_accord
//!
//! **ghz_accord** simulates a multi-party agreement protocol built on
//! GHZ-type correlated randomness.  A set of N nodes consumes one shared
//! draw per round to extract, bit by bit, a common integer; a deterministic
//! leader index follows from that integer by modular reduction.  Interleaved
//! with the value-extraction rounds, dedicated check rounds randomize each
//! node's measurement basis and apply a two-part statistical test —
//! same-basis agreement and cross-basis parity — that detects an
//! intermediate eavesdropper with tunable probability, without ever
//! comparing the value bits themselves.
//!
//! The physics of the correlated source is deliberately out of scope: the
//! protocol sees it only through the [`CorrelatedSource`] trait, and the
//! bundled [`GhzSource`] simulator reproduces the statistical behaviour an
//! idealized GHZ state would exhibit, including the ways a Z- or X-basis
//! interception disturbs it.
//!
//! ## Features
//!
//! * **Protocol runs**: [`ProtocolRun`] owns one scenario's node set and
//!   drives the value/check round schedule to a [`RunOutcome`].
//! * **Disturbance testing**: [`evaluate_check`] applies the dual
//!   Z-agreement / X-parity test to one check round's observations.
//! * **Aggregation and election**: [`shared_sum`] folds per-node bits into
//!   the agreed integer and [`elect_leader`] reduces it to a leader index.
//! * **Deterministic randomness**: every run replays exactly from a single
//!   `u64` seed via the domain-separated [`SeededPrng`].
//! * **Transcripts**: each run records a tamper-evident, digest-sealed
//!   [`RunTranscript`] of every executed round.
//! * **Trial batches**: [`run_trials`] executes many independently seeded
//!   runs (in parallel off wasm) to measure detection rates.
//!
//! ## Usage
//!
//! ```rust
//! use ghz_accord::{run_scenario, RunOutcome, ScenarioConfig};
//!
//! let config = ScenarioConfig {
//!     num_nodes: 4,
//!     target_value_bits: 8,
//!     check_interval: 2,
//!     round_budget: 24,
//!     seed: 7,
//!     adversary: None,
//! };
//! match run_scenario(&config).unwrap() {
//!     RunOutcome::Success { shared_value, leader_index } => {
//!         assert_eq!(leader_index, (shared_value % 4) as usize);
//!     }
//!     other => panic!("undisturbed run must succeed, got {other:?}"),
//! }
//! ```

pub mod protocol;
pub mod source;
pub mod trials;

mod aggregate;
mod io;
mod node;
mod prng;
mod scenario;
mod transcript;

pub use aggregate::{elect_leader, shared_sum, unanimous, AggregateFailure};
pub use io::write_run_lines;
pub use node::Node;
pub use prng::{derive_seed_word, derive_subseed, SeededPrng};
pub use protocol::{
    evaluate_check, run_scenario, simulated_source, CheckEvaluation, ExitReason, ProtocolRun,
    RunOutcome,
};
pub use scenario::{AdversaryConfig, AdversaryTiming, ConfigError, ScenarioConfig};
pub use source::{Adversary, Basis, CorrelatedSource, GhzSource, Transform};
pub use transcript::{RoundKind, RoundRecord, RunTranscript};
pub use trials::{run_trials, TrialSummary};
