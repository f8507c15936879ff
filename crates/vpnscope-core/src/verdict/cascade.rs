use super::{AlgorithmMethod, Reducer, Reduction};
use crate::source::SourceResult;

/// Flags a key when any source answered positive.
///
/// Computed as an OR over the full result set, so the decision does not depend on which
/// source answered first. Confidence is 1.0 when flagged and 0.0 otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReducer;

impl Reducer for CascadeReducer {
    fn algorithm(&self) -> AlgorithmMethod {
        AlgorithmMethod::Cascade
    }

    fn reduce(&self, results: &[SourceResult]) -> Reduction {
        let flagged = results.iter().any(|r| r.outcome.is_positive());
        Reduction { flagged, confidence: if flagged { 1.0 } else { 0.0 } }
    }
}
