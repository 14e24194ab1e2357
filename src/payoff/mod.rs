//! Payoff functions: turning new observations into a scalar gain/loss.
//!
//! Defines the `PayoffFunction` trait and provides implementations for:
//! - one-sample mean tests (difference from a hypothesised mean)
//! - two-sample scalar tests (difference between paired observations)
//! - kernel MMD two-sample tests with incremental Gram evaluation

pub mod mmd;
pub mod scalar;
pub mod transform;

use crate::types::{Arity, Sample, TestingError};

pub use mmd::{KernelMmd, KernelMmdBuilder};
pub use scalar::{OneSampleMean, TwoSampleDifference};
pub use transform::PostProcessing;

/// Abstraction over per-step payoff computations.
///
/// A payoff at step `t` may depend only on observations up to and
/// including step `t`. Implementations that keep history must append on
/// `predict` and undo exactly that append on `discard_last`.
pub trait PayoffFunction: Send {
    /// Payoff for the newest observation(s).
    fn predict(&mut self, sample: Sample<'_>) -> Result<f64, TestingError>;

    /// Undo the most recent successful `predict`. Stateless payoffs keep
    /// the default no-op.
    fn discard_last(&mut self) {}

    /// Number of observation streams consumed per step.
    fn arity(&self) -> Arity;

    /// Human-readable test name.
    fn name(&self) -> &str;
}
