//! Scalar one-sample and two-sample payoffs.

use super::PayoffFunction;
use crate::types::{Arity, Sample, TestingError};

fn scalar(observation: &[f64]) -> Result<f64, TestingError> {
    match observation {
        [value] => Ok(*value),
        other => Err(TestingError::DimensionMismatch {
            expected: 1,
            got: other.len(),
        }),
    }
}

/// Tests `H0: E[X] = mu` with payoff `x − mu`.
#[derive(Debug, Clone)]
pub struct OneSampleMean {
    mu: f64,
}

impl OneSampleMean {
    pub fn new(mu: f64) -> Self {
        Self { mu }
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }
}

impl PayoffFunction for OneSampleMean {
    fn predict(&mut self, sample: Sample<'_>) -> Result<f64, TestingError> {
        match sample {
            Sample::One(x) => Ok(scalar(x)? - self.mu),
            other => Err(TestingError::ArityMismatch {
                expected: Arity::One,
                got: other.arity(),
            }),
        }
    }

    fn arity(&self) -> Arity {
        Arity::One
    }

    fn name(&self) -> &str {
        "Scalar one sample mean test"
    }
}

/// Tests `H0: E[X] = E[Y]` on paired scalars with payoff `x − y`.
#[derive(Debug, Clone, Default)]
pub struct TwoSampleDifference;

impl TwoSampleDifference {
    pub fn new() -> Self {
        Self
    }
}

impl PayoffFunction for TwoSampleDifference {
    fn predict(&mut self, sample: Sample<'_>) -> Result<f64, TestingError> {
        match sample {
            Sample::Two(x, y) => Ok(scalar(x)? - scalar(y)?),
            other => Err(TestingError::ArityMismatch {
                expected: Arity::Two,
                got: other.arity(),
            }),
        }
    }

    fn arity(&self) -> Arity {
        Arity::Two
    }

    fn name(&self) -> &str {
        "Scalar two sample difference test"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_sample_payoff() {
        let mut payoff = OneSampleMean::new(0.25);
        assert_eq!(payoff.predict(Sample::One(&[1.0])).unwrap(), 0.75);
        assert_eq!(payoff.predict(Sample::One(&[-0.75])).unwrap(), -1.0);
    }

    #[test]
    fn test_two_sample_payoff() {
        let mut payoff = TwoSampleDifference::new();
        assert_eq!(payoff.predict(Sample::Two(&[0.5], &[0.25])).unwrap(), 0.25);
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let mut one = OneSampleMean::new(0.0);
        assert_eq!(
            one.predict(Sample::Two(&[1.0], &[2.0])),
            Err(TestingError::ArityMismatch {
                expected: Arity::One,
                got: Arity::Two
            })
        );

        let mut two = TwoSampleDifference::new();
        assert!(matches!(
            two.predict(Sample::One(&[1.0])),
            Err(TestingError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn test_vector_observation_is_rejected() {
        let mut one = OneSampleMean::new(0.0);
        assert_eq!(
            one.predict(Sample::One(&[1.0, 2.0])),
            Err(TestingError::DimensionMismatch {
                expected: 1,
                got: 2
            })
        );
    }
}
