//! Sequential experiment driver.
//!
//! Replays one or two observation streams through a freshly built
//! `Tester`, recording wealth after every step and stopping at the first
//! rejection. If the data runs out first, the randomised Ville rule gets
//! one look at the stopping time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::tester::Tester;
use crate::types::{Arity, Observation, Sample, TestingError};

/// Record of a single sequential experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentOutcome {
    pub run_id: Uuid,
    pub test_name: String,
    pub strategy: String,
    pub alpha: f64,
    /// Wealth after each completed step.
    pub wealth: Vec<f64>,
    /// 0-based index of the observation at which the null was rejected.
    pub reject_time: Option<usize>,
    /// Stop-time decision when the stream exhausted without rejection.
    pub rejected_at_stop: bool,
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExperimentOutcome {
    /// Whether the null was rejected, either mid-stream or at the stop.
    pub fn rejected(&self) -> bool {
        self.reject_time.is_some() || self.rejected_at_stop
    }

    pub fn final_wealth(&self) -> f64 {
        self.wealth.last().copied().unwrap_or(1.0)
    }
}

/// Run a sequential test built by `factory` over `sample_a` (and
/// `sample_b` for two-sample tests).
///
/// Two-sample runs stop at the shorter stream's length.
pub fn sequential_experiment<F>(
    factory: F,
    sample_a: &[Observation],
    sample_b: Option<&[Observation]>,
) -> Result<ExperimentOutcome, TestingError>
where
    F: FnOnce() -> Result<Tester, TestingError>,
{
    let mut test = factory()?;
    let started_at = Utc::now();

    let supplied = if sample_b.is_some() { Arity::Two } else { Arity::One };
    if supplied != test.arity() {
        return Err(TestingError::ArityMismatch {
            expected: test.arity(),
            got: supplied,
        });
    }

    let horizon = match sample_b {
        Some(b) => sample_a.len().min(b.len()),
        None => sample_a.len(),
    };

    info!(
        test = test.name(),
        strategy = test.strategy_name(),
        alpha = test.config().alpha,
        horizon,
        "Testing with {}",
        test.name()
    );

    let mut wealth = Vec::with_capacity(horizon);
    let mut reject_time = None;

    for i in 0..horizon {
        let sample = match sample_b {
            Some(b) => Sample::Two(&sample_a[i], &b[i]),
            None => Sample::One(&sample_a[i]),
        };
        test.step(sample)?;
        wealth.push(test.wealth());

        if test.rejected() {
            reject_time = Some(i);
            break;
        }
    }

    let rejected_at_stop = reject_time.is_none() && test.reject(true);

    let outcome = ExperimentOutcome {
        run_id: Uuid::new_v4(),
        test_name: test.name().to_string(),
        strategy: test.strategy_name().to_string(),
        alpha: test.config().alpha,
        steps: wealth.len(),
        wealth,
        reject_time,
        rejected_at_stop,
        started_at,
        finished_at: Utc::now(),
    };

    info!(
        run_id = %outcome.run_id,
        steps = outcome.steps,
        final_wealth = outcome.final_wealth(),
        reject_time = ?outcome.reject_time,
        rejected_at_stop = outcome.rejected_at_stop,
        "Experiment complete"
    );

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
