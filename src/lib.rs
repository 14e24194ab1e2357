//! testing-by-betting: anytime-valid sequential hypothesis tests.
//!
//! A test keeps a non-negative wealth process that grows under the
//! alternative and stays bounded in expectation under the null; the null
//! is rejected the first time wealth reaches `1/alpha`.
//!
//! Library crate exposing all modules for use by integration tests
//! and the `tbb` binary.

pub mod config;
pub mod data;
pub mod experiment;
pub mod kernel;
pub mod payoff;
pub mod strategy;
pub mod tester;
pub mod types;

pub use experiment::{sequential_experiment, ExperimentOutcome};
pub use tester::{Tester, TesterConfig};
pub use types::{Observation, Sample, TestingError};
