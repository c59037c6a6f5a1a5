//! Error types.
//!
//! Two layers, matching how failures are handled:
//!
//! - [`SplitError`]: a single split candidate failed. These are recoverable —
//!   the learning loop discards the candidate and keeps evaluating other
//!   leaves and actions.
//! - [`ModelError`]: a caller error (mismatched lengths, unknown action) or a
//!   bookkeeping invariant violation. Invariant violations indicate corrupted
//!   state and abort the running operation.

use crate::data::Action;

/// A split candidate could not be produced or scored. Recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    /// The proposed test does not separate the leaf's data into two
    /// non-empty parts, or an intermediate structure collapsed to one class.
    #[error("degenerate split: {0}")]
    Degenerate(&'static str),

    /// An iterative numeric routine exhausted its iteration budget.
    #[error("{what} did not converge")]
    NonConvergence { what: &'static str },

    /// The leaf has fewer strict transitions than the candidate needs.
    #[error("insufficient data: {have} strict transitions, {need} required")]
    InsufficientData { have: usize, need: usize },
}

/// Model-level errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// `actions` must have the same length as the observation batch, or be
    /// exactly one element shorter (unknown boundary action).
    #[error("actions length {actions} does not match {rows} observations (or {rows} - 1)")]
    ActionLenMismatch { rows: usize, actions: usize },

    /// Observation batch has a different feature dimension than the store.
    #[error("observation dimension {got} does not match store dimension {expected}")]
    DimMismatch { expected: usize, got: usize },

    /// No partitioning exists for this action.
    #[error("no partitioning for action {0}")]
    UnknownAction(Action),

    /// The model holds no data yet.
    #[error("model holds no data")]
    NoData,

    /// A tree operation was applied to the wrong kind of node.
    #[error("node {0} is not a leaf")]
    NotALeaf(u32),

    /// Bookkeeping is corrupted (count mismatch, non-contiguous labels,
    /// negative entropy input). Fatal for the running operation.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A candidate-local failure bubbling through a fallible call chain.
    /// Callers that drive candidate evaluation match on this variant and
    /// recover; everything else propagates.
    #[error(transparent)]
    Split(#[from] SplitError),
}

impl ModelError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        ModelError::InvariantViolation(msg.into())
    }
}
