//! Shared types for sequential testing by betting.
//!
//! These types form the data model used across all modules so that the
//! strategy, payoff, and tester layers can depend on them without
//! circular references.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// A single observation. Scalars are one-element vectors.
pub type Observation = Vec<f64>;

/// The observation(s) fed to a test at one time step.
#[derive(Debug, Clone, Copy)]
pub enum Sample<'a> {
    /// One-sample tests receive a single observation.
    One(&'a [f64]),
    /// Two-sample tests receive one observation from each stream.
    Two(&'a [f64], &'a [f64]),
}

impl Sample<'_> {
    pub fn arity(&self) -> Arity {
        match self {
            Sample::One(_) => Arity::One,
            Sample::Two(_, _) => Arity::Two,
        }
    }
}

/// Number of observation streams a test consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    One,
    Two,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::One => write!(f, "one-sample"),
            Arity::Two => write!(f, "two-sample"),
        }
    }
}

// ---------------------------------------------------------------------------
// Test state
// ---------------------------------------------------------------------------

/// Lifecycle of a single test. `Rejected` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestState {
    Testing,
    Rejected,
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestState::Testing => write!(f, "TESTING"),
            TestState::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Result of one completed `Tester::step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// 1-based index of the step that just completed.
    pub iteration: u64,
    pub bet: f64,
    pub payoff: f64,
    /// Wealth after applying `1 + bet * payoff`.
    pub wealth: f64,
    /// True only on the step where the rejection latch first fired.
    pub newly_rejected: bool,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {} | bet {:+.4} | payoff {:+.4} | wealth {:.4}{}",
            self.iteration,
            self.bet,
            self.payoff,
            self.wealth,
            if self.newly_rejected { " | REJECT" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for sequential tests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TestingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Contract violation: bet {bet} with payoff {payoff} leaves non-positive wealth")]
    ContractViolation { bet: f64, payoff: f64 },

    #[error("Kernel unavailable: {0}")]
    KernelUnavailable(String),

    #[error("Arity mismatch: test expects {expected} data, got {got}")]
    ArityMismatch { expected: Arity, got: Arity },

    #[error("Dimension mismatch: expected observations of length {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
