//! Kernel functions and bandwidth policies for kernel two-sample payoffs.
//!
//! Kernels are pure: the bandwidth is always passed in, never captured.
//! Any `Fn(&[f64], &[f64], f64) -> f64` closure is a `Kernel`, and any
//! `Fn(f64, &[Observation], &[Observation]) -> f64` closure is a
//! `BandwidthPolicy`, so callers can swap either without new types.

use std::str::FromStr;

use nalgebra::DMatrix;
use statrs::statistics::{Data, Median};

use crate::types::{Observation, TestingError};

// ---------------------------------------------------------------------------
// Point helpers
// ---------------------------------------------------------------------------

/// Squared Euclidean distance between two points of equal length.
pub fn squared_distance(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Euclidean distance between two points of equal length.
pub fn euclidean_distance(x: &[f64], y: &[f64]) -> f64 {
    squared_distance(x, y).sqrt()
}

fn dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// Median of the Euclidean distances over all unordered pairs `i < j`.
///
/// Returns `None` for fewer than two points.
pub fn median_pairwise_distance<P: AsRef<[f64]>>(points: &[P]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len();
    let mut distances = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            distances.push(euclidean_distance(points[i].as_ref(), points[j].as_ref()));
        }
    }

    Some(Data::new(distances).median())
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

/// A positive-definite kernel evaluated pointwise.
pub trait Kernel: Send {
    /// `k(x, y)` at the given bandwidth. Kernels without a scale ignore it.
    fn evaluate(&self, x: &[f64], y: &[f64], bandwidth: f64) -> f64;

    /// `Some(m)` when every value lies in `[0, m]`. Unbounded by default.
    fn upper_bound(&self) -> Option<f64> {
        None
    }

    /// Gram matrix `K[i, j] = k(xs[i], ys[j])`.
    fn gram(&self, xs: &[Observation], ys: &[Observation], bandwidth: f64) -> DMatrix<f64> {
        DMatrix::from_fn(xs.len(), ys.len(), |i, j| {
            self.evaluate(&xs[i], &ys[j], bandwidth)
        })
    }
}

impl<F> Kernel for F
where
    F: Fn(&[f64], &[f64], f64) -> f64 + Send,
{
    fn evaluate(&self, x: &[f64], y: &[f64], bandwidth: f64) -> f64 {
        self(x, y, bandwidth)
    }
}

/// Squared-exponential kernel `exp(-‖x − y‖² / (2·bw²))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rbf;

impl Kernel for Rbf {
    fn evaluate(&self, x: &[f64], y: &[f64], bandwidth: f64) -> f64 {
        (-squared_distance(x, y) / (2.0 * bandwidth * bandwidth)).exp()
    }

    fn upper_bound(&self) -> Option<f64> {
        Some(1.0)
    }
}

/// Inner-product kernel `⟨x, y⟩`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl Kernel for Linear {
    fn evaluate(&self, x: &[f64], y: &[f64], _bandwidth: f64) -> f64 {
        dot(x, y)
    }
}

/// Polynomial kernel `(offset + ⟨x, y⟩)^degree`.
#[derive(Debug, Clone, Copy)]
pub struct Polynomial {
    pub offset: f64,
    pub degree: i32,
}

impl Default for Polynomial {
    fn default() -> Self {
        Self {
            offset: 1.0,
            degree: 2,
        }
    }
}

impl Kernel for Polynomial {
    fn evaluate(&self, x: &[f64], y: &[f64], _bandwidth: f64) -> f64 {
        (self.offset + dot(x, y)).powi(self.degree)
    }
}

/// Kernel selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelChoice {
    Rbf,
    Linear,
    Polynomial,
}

impl FromStr for KernelChoice {
    type Err = TestingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rbf" | "gaussian" => Ok(KernelChoice::Rbf),
            "linear" => Ok(KernelChoice::Linear),
            "polynomial" | "poly" => Ok(KernelChoice::Polynomial),
            other => Err(TestingError::Config(format!("Kernel unrecognized: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Bandwidth policies
// ---------------------------------------------------------------------------

/// Decides the kernel bandwidth from the full observation histories.
pub trait BandwidthPolicy: Send {
    /// New bandwidth given the current one and both histories (equal length,
    /// newest observation last).
    fn update(&self, current: f64, sample_a: &[Observation], sample_b: &[Observation]) -> f64;
}

impl<F> BandwidthPolicy for F
where
    F: Fn(f64, &[Observation], &[Observation]) -> f64 + Send,
{
    fn update(&self, current: f64, sample_a: &[Observation], sample_b: &[Observation]) -> f64 {
        self(current, sample_a, sample_b)
    }
}

/// Median pairwise distance over the pooled histories, recomputed on every
/// update once `min_samples` pairs have been seen.
#[derive(Debug, Clone, Copy)]
pub struct MedianHeuristic {
    pub min_samples: usize,
}

impl Default for MedianHeuristic {
    fn default() -> Self {
        Self { min_samples: 20 }
    }
}

impl BandwidthPolicy for MedianHeuristic {
    fn update(&self, current: f64, sample_a: &[Observation], sample_b: &[Observation]) -> f64 {
        if sample_a.len() < self.min_samples {
            return current;
        }

        let pooled: Vec<&Observation> = sample_a.iter().chain(sample_b).collect();
        match median_pairwise_distance(&pooled) {
            Some(median) if median.is_finite() && median > 0.0 => median,
            // Degenerate (all points identical): keep what we had.
            _ => current,
        }
    }
}

/// Bandwidth that never changes.
#[derive(Debug, Clone, Copy)]
pub struct FixedBandwidth(pub f64);

impl BandwidthPolicy for FixedBandwidth {
    fn update(&self, _current: f64, _sample_a: &[Observation], _sample_b: &[Observation]) -> f64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
