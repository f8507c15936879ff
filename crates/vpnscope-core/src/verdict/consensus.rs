use super::{AlgorithmMethod, Reducer, Reduction};
use crate::source::SourceResult;

/// Flags a key when `positives / contributing >= threshold`.
///
/// Failed and timed-out results are excluded from the denominator. With no contributing
/// results the confidence is 0 and the key is never flagged, whatever the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusReducer {
    threshold: f64,
}

impl ConsensusReducer {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// Returns `(positive, contributing)` counts.
#[must_use]
pub fn tally(results: &[SourceResult]) -> (usize, usize) {
    results.iter().fold((0, 0), |(positive, contributing), result| {
        if result.outcome.is_contributing() {
            (positive + usize::from(result.outcome.is_positive()), contributing + 1)
        } else {
            (positive, contributing)
        }
    })
}

impl Reducer for ConsensusReducer {
    fn algorithm(&self) -> AlgorithmMethod {
        AlgorithmMethod::Consensus
    }

    #[allow(clippy::cast_precision_loss)]
    fn reduce(&self, results: &[SourceResult]) -> Reduction {
        let (positive, contributing) = tally(results);
        if contributing == 0 {
            return Reduction { flagged: false, confidence: 0.0 };
        }

        let confidence = positive as f64 / contributing as f64;
        Reduction { flagged: confidence >= self.threshold, confidence }
    }
}
