//! Driver error types

use dx_keep::RuleError;
use dx_lens::LensError;
use dx_merge::MergeError;

/// Whole-compilation failures
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// An engine-internal invariant failed; compilation aborts
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Lens construction or composition failed
    #[error(transparent)]
    Lens(#[from] LensError),

    /// Horizontal merging failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// The rule set is self-contradictory
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Fatal diagnostics were reported during a pass
    #[error("{0} fatal diagnostic(s) reported")]
    FatalDiagnostics(usize),

    /// The worker pool could not be created
    #[error("worker pool: {0}")]
    WorkerPool(String),
}
