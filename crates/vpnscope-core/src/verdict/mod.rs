//! Verdicts and the reducers that produce them.
//!
//! Reducers are pure functions over a result set: they never look at arrival order and never
//! touch shared state, so the orchestrator can run them synchronously after the join.

pub mod cascade;
pub mod consensus;

pub use cascade::CascadeReducer;
pub use consensus::ConsensusReducer;

use crate::{
    key::Key,
    source::{SourceOutcome, SourceResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Default minimum fraction of contributing sources that must agree.
pub const DEFAULT_MIN_CONSENSUS: f64 = 0.6;

/// Verdict-combination strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmMethod {
    /// Flag when the positive fraction of contributing sources reaches the threshold.
    #[default]
    Consensus,
    /// Flag when any contributing source is positive.
    Cascade,
}

impl AlgorithmMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consensus => "consensus",
            Self::Cascade => "cascade",
        }
    }
}

impl fmt::Display for AlgorithmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consensus" => Ok(Self::Consensus),
            "cascade" | "cascading" => Ok(Self::Cascade),
            other => Err(format!("unknown algorithm '{other}', expected consensus or cascade")),
        }
    }
}

/// Output of a reducer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reduction {
    pub flagged: bool,
    /// In `[0, 1]`. Binary under cascade.
    pub confidence: f64,
}

/// Folds a result set into a single decision.
pub trait Reducer {
    fn algorithm(&self) -> AlgorithmMethod;

    fn reduce(&self, results: &[SourceResult]) -> Reduction;
}

/// Runs the reducer for `algorithm`.
#[must_use]
pub fn reduce(algorithm: AlgorithmMethod, min_consensus: f64, results: &[SourceResult]) -> Reduction {
    match algorithm {
        AlgorithmMethod::Consensus => ConsensusReducer::new(min_consensus).reduce(results),
        AlgorithmMethod::Cascade => CascadeReducer.reduce(results),
    }
}

/// Final decision for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub key: Key,
    pub flagged: bool,
    pub confidence: f64,
    pub algorithm: AlgorithmMethod,
    /// Threshold in effect when the verdict was reduced.
    pub min_consensus: f64,
    /// Per-source results in registration order.
    pub results: Vec<SourceResult>,
    pub checked_at: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
    /// `false` when dispatch stopped before every enabled source answered (sequential
    /// cascade). Such a result set only supports a cascade reduction.
    #[serde(default = "default_complete")]
    pub complete: bool,
}

fn default_complete() -> bool {
    true
}

impl Verdict {
    /// Reduces `results` into a verdict.
    #[must_use]
    pub fn reduce(
        key: Key,
        algorithm: AlgorithmMethod,
        min_consensus: f64,
        results: Vec<SourceResult>,
    ) -> Self {
        let Reduction { flagged, confidence } = reduce(algorithm, min_consensus, &results);
        Self {
            key,
            flagged,
            confidence,
            algorithm,
            min_consensus,
            results,
            checked_at: Utc::now(),
            from_cache: false,
            complete: true,
        }
    }

    /// Marks the result set as covering only part of the enabled sources.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.complete = false;
        self
    }

    /// Whether the stored results can answer a check with `algorithm`.
    ///
    /// A partial result set ends at a positive, so it settles a cascade but not a consensus.
    #[must_use]
    pub fn serves(&self, algorithm: AlgorithmMethod) -> bool {
        self.complete || algorithm == AlgorithmMethod::Cascade
    }

    /// Number of sources that answered positive or negative.
    #[must_use]
    pub fn contributing_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_contributing()).count()
    }

    #[must_use]
    pub fn positive_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_positive()).count()
    }

    /// `false` when no source contributed, i.e. "could not verify" rather than "clean".
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.contributing_count() > 0
    }

    #[must_use]
    pub fn timed_out_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome == SourceOutcome::TimedOut).count()
    }

    /// Returns `true` if this verdict was reduced with the given settings.
    #[must_use]
    pub fn matches(&self, algorithm: AlgorithmMethod, min_consensus: f64) -> bool {
        self.algorithm == algorithm &&
            (algorithm == AlgorithmMethod::Cascade ||
                (self.min_consensus - min_consensus).abs() < f64::EPSILON)
    }

    /// Reduces the stored results again under different settings, keeping `checked_at`.
    #[must_use]
    pub fn rereduce(&self, algorithm: AlgorithmMethod, min_consensus: f64) -> Self {
        let Reduction { flagged, confidence } = reduce(algorithm, min_consensus, &self.results);
        Self { flagged, confidence, algorithm, min_consensus, ..self.clone() }
    }
}
