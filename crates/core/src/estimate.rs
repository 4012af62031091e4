//! Token estimation trait.
//!
//! Estimation is pluggable: the budget engine only needs a pure, total
//! function from text to a nonnegative count. `estimate` is the cheap pass
//! run on every mutation; `exact` is the authoritative pass run on demand.

/// A pure token counter. Implementations must never panic and must return
/// the same count for the same text.
pub trait TokenEstimator: Send + Sync {
    /// Cheap approximate count.
    fn estimate(&self, text: &str) -> u64;

    /// Authoritative count. Defaults to the cheap pass for estimators that
    /// have no better answer.
    fn exact(&self, text: &str) -> u64 {
        self.estimate(text)
    }
}
