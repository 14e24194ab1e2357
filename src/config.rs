//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. String
//! options (strategy, kernel, post-processing) stay as text here and are
//! resolved to typed values when the tester is built, so a typo fails once,
//! before any data is touched.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::kernel::{FixedBandwidth, KernelChoice, Linear, MedianHeuristic, Polynomial, Rbf};
use crate::payoff::mmd::{DEFAULT_BANDWIDTH, DEFAULT_NORMALIZE_AFTER};
use crate::payoff::{KernelMmd, OneSampleMean, PayoffFunction, PostProcessing, TwoSampleDifference};
use crate::strategy::StrategyRegistry;
use crate::tester::{Tester, TesterConfig};
use crate::types::{Arity, TestingError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub test: TestSettings,
    #[serde(default)]
    pub one_sample: OneSampleSettings,
    #[serde(default)]
    pub kernel: KernelSettings,
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which payoff function drives the test.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    #[default]
    OneSample,
    TwoSample,
    KernelMmd,
}

impl TestKind {
    pub fn arity(self) -> Arity {
        match self {
            TestKind::OneSample => Arity::One,
            TestKind::TwoSample | TestKind::KernelMmd => Arity::Two,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TestSettings {
    #[serde(default)]
    pub kind: TestKind,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_true")]
    pub randomized_ville: bool,
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            kind: TestKind::default(),
            alpha: default_alpha(),
            strategy: default_strategy(),
            randomized_ville: true,
            verbose: true,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OneSampleSettings {
    /// Hypothesised mean under the null.
    #[serde(default)]
    pub mu: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KernelSettings {
    #[serde(default = "default_kernel")]
    pub kernel: String,
    /// Starting bandwidth; stays fixed unless the median heuristic is on.
    #[serde(default = "default_bandwidth")]
    pub bandwidth: f64,
    #[serde(default = "default_true")]
    pub median_heuristic: bool,
    #[serde(default = "default_min_samples")]
    pub min_samples_for_bandwidth: usize,
    #[serde(default)]
    pub post_processing: String,
    #[serde(default = "default_normalize_after")]
    pub normalize_after: usize,
    #[serde(default = "default_poly_offset")]
    pub poly_offset: f64,
    #[serde(default = "default_poly_degree")]
    pub poly_degree: i32,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            kernel: default_kernel(),
            bandwidth: default_bandwidth(),
            median_heuristic: true,
            min_samples_for_bandwidth: default_min_samples(),
            post_processing: String::new(),
            normalize_after: default_normalize_after(),
            poly_offset: default_poly_offset(),
            poly_degree: default_poly_degree(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataConfig {
    pub sample_a: PathBuf,
    #[serde(default)]
    pub sample_b: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_alpha() -> f64 {
    0.05
}

fn default_strategy() -> String {
    "ONS".to_string()
}

fn default_true() -> bool {
    true
}

fn default_kernel() -> String {
    "rbf".to_string()
}

fn default_bandwidth() -> f64 {
    DEFAULT_BANDWIDTH
}

fn default_min_samples() -> usize {
    MedianHeuristic::default().min_samples
}

fn default_normalize_after() -> usize {
    DEFAULT_NORMALIZE_AFTER
}

fn default_poly_offset() -> f64 {
    Polynomial::default().offset
}

fn default_poly_degree() -> i32 {
    Polynomial::default().degree
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match (self.test.kind.arity(), &self.data.sample_b) {
            (Arity::Two, None) => bail!(
                "test kind {:?} needs two samples but data.sample_b is not set",
                self.test.kind
            ),
            (Arity::One, Some(_)) => bail!(
                "test kind {:?} takes one sample but data.sample_b is set",
                self.test.kind
            ),
            _ => {}
        }
        self.tester_config().validate()?;
        Ok(())
    }

    pub fn tester_config(&self) -> TesterConfig {
        TesterConfig {
            alpha: self.test.alpha,
            randomized_ville: self.test.randomized_ville,
            verbose: self.test.verbose,
            seed: self.test.seed,
        }
    }

    /// Resolve every named option and assemble a fresh tester.
    pub fn build_tester(&self) -> Result<Tester, TestingError> {
        let payoff = self.build_payoff()?;
        Tester::with_strategy_name(
            payoff,
            &self.test.strategy,
            &StrategyRegistry::default(),
            self.tester_config(),
        )
    }

    fn build_payoff(&self) -> Result<Box<dyn PayoffFunction>, TestingError> {
        match self.test.kind {
            TestKind::OneSample => Ok(Box::new(OneSampleMean::new(self.one_sample.mu))),
            TestKind::TwoSample => Ok(Box::new(TwoSampleDifference::new())),
            TestKind::KernelMmd => Ok(Box::new(self.kernel.build()?)),
        }
    }
}

impl KernelSettings {
    pub fn build(&self) -> Result<KernelMmd, TestingError> {
        let post_processing: PostProcessing = self.post_processing.parse()?;
        let choice: KernelChoice = self.kernel.parse()?;

        let builder = KernelMmd::builder()
            .post_processing(post_processing)
            .normalize_after(self.normalize_after)
            .initial_bandwidth(self.bandwidth);

        let builder = match choice {
            KernelChoice::Rbf => builder.kernel(Rbf),
            KernelChoice::Linear => builder.kernel(Linear),
            KernelChoice::Polynomial => builder.kernel(Polynomial {
                offset: self.poly_offset,
                degree: self.poly_degree,
            }),
        };

        // Linear and polynomial kernels ignore the bandwidth entirely.
        let builder = if choice == KernelChoice::Rbf && self.median_heuristic {
            builder.bandwidth_policy(MedianHeuristic {
                min_samples: self.min_samples_for_bandwidth,
            })
        } else {
            builder.bandwidth_policy(FixedBandwidth(self.bandwidth))
        };

        Ok(builder.build())
    }
}
