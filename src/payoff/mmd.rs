//! Kernel MMD two-sample payoff.
//!
//! Keeps both observation histories and, at each step, scores the newest
//! pair against everything seen before it:
//!
//! ```text
//!   termA  = mean_j<n ( k(a_n, a_j) − k(a_n, b_j) )
//!   termB  = mean_j<n ( k(a_j, b_n) − k(b_j, b_n) )
//!   payoff = termA − termB
//! ```
//!
//! The bandwidth is re-derived from the full history by a
//! `BandwidthPolicy` before every evaluation, and the kernel is evaluated
//! only on the `O(n)` entries the newest row/column needs. Raw payoffs are
//! rescaled by their running maximum magnitude once enough steps have
//! passed; before that, kernels with a known bound are scaled by it so the
//! payoff stays in `[-1, 1]`. The result then runs through an optional
//! `PostProcessing` map.

use nalgebra::DMatrix;
use tracing::debug;

use super::{PayoffFunction, PostProcessing};
use crate::kernel::{BandwidthPolicy, FixedBandwidth, Kernel, MedianHeuristic, Rbf};
use crate::types::{Arity, Observation, Sample, TestingError};

/// Steps after which raw payoffs are normalised.
pub const DEFAULT_NORMALIZE_AFTER: usize = 10;
/// Bandwidth used until the policy first moves it.
pub const DEFAULT_BANDWIDTH: f64 = 1.0;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures a `KernelMmd`.
///
/// With neither a kernel nor a policy the payoff uses an RBF kernel with
/// the median heuristic. A custom kernel without a policy keeps the
/// initial bandwidth fixed.
pub struct KernelMmdBuilder {
    kernel: Option<Box<dyn Kernel>>,
    bandwidth_policy: Option<Box<dyn BandwidthPolicy>>,
    post_processing: PostProcessing,
    normalize_after: usize,
    initial_bandwidth: f64,
}

impl Default for KernelMmdBuilder {
    fn default() -> Self {
        Self {
            kernel: None,
            bandwidth_policy: None,
            post_processing: PostProcessing::None,
            normalize_after: DEFAULT_NORMALIZE_AFTER,
            initial_bandwidth: DEFAULT_BANDWIDTH,
        }
    }
}

impl KernelMmdBuilder {
    pub fn kernel(mut self, kernel: impl Kernel + 'static) -> Self {
        self.kernel = Some(Box::new(kernel));
        self
    }

    pub fn bandwidth_policy(mut self, policy: impl BandwidthPolicy + 'static) -> Self {
        self.bandwidth_policy = Some(Box::new(policy));
        self
    }

    pub fn post_processing(mut self, post_processing: PostProcessing) -> Self {
        self.post_processing = post_processing;
        self
    }

    pub fn normalize_after(mut self, steps: usize) -> Self {
        self.normalize_after = steps;
        self
    }

    pub fn initial_bandwidth(mut self, bandwidth: f64) -> Self {
        self.initial_bandwidth = bandwidth;
        self
    }

    pub fn build(self) -> KernelMmd {
        let (kernel, bandwidth_policy): (Box<dyn Kernel>, Box<dyn BandwidthPolicy>) =
            match (self.kernel, self.bandwidth_policy) {
                (None, None) => (Box::new(Rbf), Box::new(MedianHeuristic::default())),
                (None, Some(policy)) => (Box::new(Rbf), policy),
                (Some(kernel), None) => (kernel, Box::new(FixedBandwidth(self.initial_bandwidth))),
                (Some(kernel), Some(policy)) => (kernel, policy),
            };

        KernelMmd {
            kernel,
            bandwidth_policy,
            post_processing: self.post_processing,
            normalize_after: self.normalize_after,
            history_a: Vec::new(),
            history_b: Vec::new(),
            dimension: None,
            bandwidth: self.initial_bandwidth,
            previous_bandwidth: self.initial_bandwidth,
            unnormalized_history: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payoff
// ---------------------------------------------------------------------------

/// Incremental kernel MMD payoff over two growing samples.
pub struct KernelMmd {
    kernel: Box<dyn Kernel>,
    bandwidth_policy: Box<dyn BandwidthPolicy>,
    post_processing: PostProcessing,
    normalize_after: usize,
    history_a: Vec<Observation>,
    history_b: Vec<Observation>,
    /// Observation length fixed by the first pair.
    dimension: Option<usize>,
    bandwidth: f64,
    /// Bandwidth before the latest `predict`, restored by `discard_last`.
    previous_bandwidth: f64,
    /// Raw payoffs, one per step after the first.
    unnormalized_history: Vec<f64>,
}

impl KernelMmd {
    pub fn builder() -> KernelMmdBuilder {
        KernelMmdBuilder::default()
    }

    /// RBF kernel, median-heuristic bandwidth, the given post-processing.
    pub fn new(post_processing: PostProcessing) -> Self {
        Self::builder().post_processing(post_processing).build()
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Number of observation pairs seen.
    pub fn len(&self) -> usize {
        self.history_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history_a.is_empty()
    }

    pub fn unnormalized_history(&self) -> &[f64] {
        &self.unnormalized_history
    }

    /// `(K_AA, K_BB, K_AB)` over the current histories at the current
    /// bandwidth.
    pub fn gram_matrices(&self) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let bw = self.bandwidth;
        (
            self.kernel.gram(&self.history_a, &self.history_a, bw),
            self.kernel.gram(&self.history_b, &self.history_b, bw),
            self.kernel.gram(&self.history_a, &self.history_b, bw),
        )
    }

    fn check_dimension(&self, a: &[f64], b: &[f64]) -> Result<usize, TestingError> {
        let expected = self.dimension.unwrap_or(a.len());
        for got in [a.len(), b.len()] {
            if got != expected {
                return Err(TestingError::DimensionMismatch { expected, got });
            }
        }
        Ok(expected)
    }

    fn ensure_kernel_ready(&self) -> Result<(), TestingError> {
        if self.bandwidth.is_finite() && self.bandwidth > 0.0 {
            Ok(())
        } else {
            Err(TestingError::KernelUnavailable(format!(
                "bandwidth {} is not a positive finite number",
                self.bandwidth
            )))
        }
    }

    /// `termA − termB` for the newest pair against all earlier ones.
    fn raw_payoff(&self) -> f64 {
        let n0 = self.history_a.len() - 1;
        let bw = self.bandwidth;
        let k = &self.kernel;
        let (a_new, b_new) = (&self.history_a[n0], &self.history_b[n0]);

        let mut term_a = 0.0;
        let mut term_b = 0.0;
        for j in 0..n0 {
            let (a_j, b_j) = (&self.history_a[j], &self.history_b[j]);
            term_a += k.evaluate(a_new, a_j, bw) - k.evaluate(a_new, b_j, bw);
            term_b += k.evaluate(a_j, b_new, bw) - k.evaluate(b_j, b_new, bw);
        }

        (term_a - term_b) / n0 as f64
    }

    fn normalize(&self, raw: f64) -> f64 {
        if self.history_a.len() <= self.normalize_after {
            // A kernel bounded by m gives raw payoffs in [-2m, 2m].
            return match self.kernel.upper_bound() {
                Some(bound) if bound > 0.0 => raw / (2.0 * bound),
                _ => raw,
            };
        }
        let scale = self
            .unnormalized_history
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if scale < f64::EPSILON {
            0.0
        } else {
            raw / scale
        }
    }

    fn rollback(&mut self) {
        if self.history_a.len() >= 2 && self.unnormalized_history.len() == self.history_a.len() - 1
        {
            self.unnormalized_history.pop();
        }
        self.history_a.pop();
        self.history_b.pop();
        if self.history_a.is_empty() {
            self.dimension = None;
        }
        self.bandwidth = self.previous_bandwidth;
    }
}

impl PayoffFunction for KernelMmd {
    fn predict(&mut self, sample: Sample<'_>) -> Result<f64, TestingError> {
        let (a, b) = match sample {
            Sample::Two(a, b) => (a, b),
            other => {
                return Err(TestingError::ArityMismatch {
                    expected: Arity::Two,
                    got: other.arity(),
                })
            }
        };
        let dimension = self.check_dimension(a, b)?;

        self.dimension = Some(dimension);
        self.history_a.push(a.to_vec());
        self.history_b.push(b.to_vec());
        self.previous_bandwidth = self.bandwidth;

        if self.history_a.len() == 1 {
            return Ok(0.0);
        }

        let updated = self
            .bandwidth_policy
            .update(self.bandwidth, &self.history_a, &self.history_b);
        if updated != self.bandwidth {
            debug!(from = self.bandwidth, to = updated, pairs = self.len(), "Bandwidth updated");
        }
        self.bandwidth = updated;

        // Leave no trace of this pair if the kernel cannot be evaluated.
        if let Err(e) = self.ensure_kernel_ready() {
            self.rollback();
            return Err(e);
        }

        let raw = self.raw_payoff();
        self.unnormalized_history.push(raw);
        let payoff = self.post_processing.apply(self.normalize(raw));

        debug!(
            pairs = self.len(),
            bandwidth = self.bandwidth,
            raw,
            payoff,
            "Kernel MMD payoff"
        );

        Ok(payoff)
    }

    fn discard_last(&mut self) {
        if !self.history_a.is_empty() {
            self.rollback();
        }
    }

    fn arity(&self) -> Arity {
        Arity::Two
    }

    fn name(&self) -> &str {
        "Kernel MMD two sample test"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Linear;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn uniform_pairs(seed: u64, n: usize, shift: f64) -> Vec<(Observation, Observation)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let a = vec![rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)];
                let b = vec![
                    rng.random_range(-1.0..1.0) + shift,
                    rng.random_range(-1.0..1.0) + shift,
                ];
                (a, b)
            })
            .collect()
    }

    /// Payoff at the newest step computed from full Gram matrices.
    fn payoff_from_gram(mmd: &KernelMmd) -> f64 {
        let (k_aa, k_bb, k_ab) = mmd.gram_matrices();
        let n0 = mmd.len() - 1;
        let term_a: f64 = (0..n0).map(|j| k_aa[(n0, j)] - k_ab[(n0, j)]).sum::<f64>() / n0 as f64;
        let term_b: f64 = (0..n0).map(|j| k_ab[(j, n0)] - k_bb[(j, n0)]).sum::<f64>() / n0 as f64;
        term_a - term_b
    }

    #[test]
    fn test_first_payoff_is_zero() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        assert_eq!(mmd.predict(Sample::Two(&[100.0], &[-100.0])).unwrap(), 0.0);
        assert_eq!(mmd.len(), 1);
        assert!(mmd.unnormalized_history().is_empty());
    }

    #[test]
    fn test_raw_payoff_matches_gram_computation() {
        let mut mmd = KernelMmd::builder().normalize_after(usize::MAX).build();
        for (a, b) in uniform_pairs(11, 30, 0.3) {
            let payoff = mmd.predict(Sample::Two(&a, &b)).unwrap();
            if mmd.len() > 1 {
                let expected = payoff_from_gram(&mmd);
                let raw = *mmd.unnormalized_history().last().unwrap();
                assert!((raw - expected).abs() < 1e-12, "{raw} vs {expected}");
                // RBF is bounded by 1, so the warm-up payoff is raw / 2.
                assert!((payoff - expected / 2.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_second_step_closed_form() {
        // Linear kernel, scalars: a = [1, 2], b = [0, 0]
        // termA = k(2,1) − k(2,0) = 2, termB = k(1,0) − k(0,0) = 0
        let mut mmd = KernelMmd::builder().kernel(Linear).build();
        mmd.predict(Sample::Two(&[1.0], &[0.0])).unwrap();
        let payoff = mmd.predict(Sample::Two(&[2.0], &[0.0])).unwrap();
        assert_eq!(payoff, 2.0);
    }

    #[test]
    fn test_bandwidth_fixed_until_twenty_pairs() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        let pairs = uniform_pairs(3, 25, 2.0);
        for (i, (a, b)) in pairs.iter().enumerate() {
            mmd.predict(Sample::Two(a, b)).unwrap();
            if i + 1 < 20 {
                assert_eq!(mmd.bandwidth(), DEFAULT_BANDWIDTH);
            }
        }
        assert_ne!(mmd.bandwidth(), DEFAULT_BANDWIDTH);

        let pooled: Vec<&Observation> = pairs
            .iter()
            .map(|(a, _)| a)
            .chain(pairs.iter().map(|(_, b)| b))
            .collect();
        let median = crate::kernel::median_pairwise_distance(&pooled).unwrap();
        assert!((mmd.bandwidth() - median).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_payoffs_are_bounded() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        for (i, (a, b)) in uniform_pairs(5, 60, 1.0).iter().enumerate() {
            let payoff = mmd.predict(Sample::Two(a, b)).unwrap();
            if i + 1 > DEFAULT_NORMALIZE_AFTER {
                assert!(payoff.abs() <= 1.0 + 1e-12, "step {i}: {payoff}");
            }
        }
        assert_eq!(mmd.unnormalized_history().len(), 59);
    }

    #[test]
    fn test_shifted_samples_give_positive_payoffs_on_average() {
        let mut mmd = KernelMmd::new(PostProcessing::Tanh);
        let payoffs: Vec<f64> = uniform_pairs(9, 80, 1.5)
            .iter()
            .map(|(a, b)| mmd.predict(Sample::Two(a, b)).unwrap())
            .collect();
        let mean = payoffs.iter().sum::<f64>() / payoffs.len() as f64;
        assert!(mean > 0.0, "mean payoff {mean}");
    }

    #[test]
    fn test_one_sample_input_rejected() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        assert!(matches!(
            mmd.predict(Sample::One(&[1.0])),
            Err(TestingError::ArityMismatch { .. })
        ));
        assert!(mmd.is_empty());
    }

    #[test]
    fn test_dimension_must_stay_fixed() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        mmd.predict(Sample::Two(&[1.0, 2.0], &[0.0, 0.0])).unwrap();
        assert_eq!(
            mmd.predict(Sample::Two(&[1.0], &[0.0])),
            Err(TestingError::DimensionMismatch { expected: 2, got: 1 })
        );
        assert_eq!(
            mmd.predict(Sample::Two(&[1.0, 2.0], &[0.0])),
            Err(TestingError::DimensionMismatch { expected: 2, got: 1 })
        );
        assert_eq!(mmd.len(), 1);
    }

    #[test]
    fn test_broken_policy_reports_kernel_unavailable() {
        let zero = |_: f64, _: &[Observation], _: &[Observation]| 0.0;
        let mut mmd = KernelMmd::builder().bandwidth_policy(zero).build();
        mmd.predict(Sample::Two(&[1.0], &[0.0])).unwrap();

        let err = mmd.predict(Sample::Two(&[2.0], &[0.5])).unwrap_err();
        assert!(matches!(err, TestingError::KernelUnavailable(_)));
        // State is as it was before the failed call.
        assert_eq!(mmd.len(), 1);
        assert_eq!(mmd.bandwidth(), DEFAULT_BANDWIDTH);
        assert!(mmd.unnormalized_history().is_empty());
    }

    #[test]
    fn test_discard_last_restores_previous_state() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        let pairs = uniform_pairs(21, 22, 0.5);
        for (a, b) in &pairs[..21] {
            mmd.predict(Sample::Two(a, b)).unwrap();
        }
        let bandwidth = mmd.bandwidth();
        let history = mmd.unnormalized_history().to_vec();

        let (a, b) = &pairs[21];
        let first = mmd.predict(Sample::Two(a, b)).unwrap();
        mmd.discard_last();

        assert_eq!(mmd.len(), 21);
        assert_eq!(mmd.bandwidth(), bandwidth);
        assert_eq!(mmd.unnormalized_history(), history.as_slice());

        let again = mmd.predict(Sample::Two(a, b)).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_gram_matrices_symmetric_with_unit_diagonal() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        for (a, b) in uniform_pairs(4, 25, 0.0) {
            mmd.predict(Sample::Two(&a, &b)).unwrap();
        }
        let (k_aa, k_bb, k_ab) = mmd.gram_matrices();
        for k in [&k_aa, &k_bb] {
            for i in 0..k.nrows() {
                assert!((k[(i, i)] - 1.0).abs() < 1e-15);
                for j in 0..k.ncols() {
                    assert_eq!(k[(i, j)], k[(j, i)]);
                }
            }
        }
        assert_eq!(k_ab.shape(), (25, 25));
    }

    #[test]
    fn test_warm_up_payoffs_stay_in_unit_interval() {
        // Separated pairs, a swapped pair, then separated again.
        let mut mmd = KernelMmd::new(PostProcessing::None);
        let a = [0.0, 0.0, 100.0, 0.0];
        let b = [100.0, 100.0, 0.0, 100.0];
        let payoffs: Vec<f64> = a
            .iter()
            .zip(&b)
            .map(|(x, y)| mmd.predict(Sample::Two(&[*x], &[*y])).unwrap())
            .collect();
        let raw = mmd.unnormalized_history();
        assert_eq!(raw[..2], [2.0, -2.0]);
        assert!((raw[2] - 2.0 / 3.0).abs() < 1e-12);

        assert_eq!(payoffs[..3], [0.0, 1.0, -1.0]);
        assert!((payoffs[3] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unbounded_kernel_is_not_rescaled_in_warm_up() {
        let mut mmd = KernelMmd::builder()
            .kernel(|x: &[f64], y: &[f64], _bw: f64| x[0] * y[0])
            .build();
        mmd.predict(Sample::Two(&[1.0], &[0.0])).unwrap();
        assert_eq!(mmd.predict(Sample::Two(&[2.0], &[0.0])).unwrap(), 2.0);
    }

    #[test]
    fn test_zero_scale_normalizes_to_zero() {
        let mut mmd = KernelMmd::new(PostProcessing::None);
        for step in 1..=15 {
            let payoff = mmd.predict(Sample::Two(&[0.3, -0.7], &[0.3, -0.7])).unwrap();
            assert_eq!(payoff, 0.0, "step {step}");
        }
        assert!(mmd.unnormalized_history().iter().all(|v| *v == 0.0));
        assert!(mmd.len() > DEFAULT_NORMALIZE_AFTER);
    }
}
