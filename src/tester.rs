//! Wealth process and rejection rule.
//!
//! A `Tester` composes one `PayoffFunction` with one `BettingStrategy`.
//! Each `step` places a predictable bet, observes the payoff, multiplies
//! wealth by `1 + bet·payoff`, and checks the rejection threshold. The
//! three histories and the wealth are committed together or not at all.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::payoff::PayoffFunction;
use crate::strategy::{BettingStrategy, StrategyRegistry};
use crate::types::{Arity, Sample, StepOutcome, TestState, TestingError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction-time options shared by every test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterConfig {
    /// Significance level in `(0, 1)`; the threshold is `1/alpha`.
    pub alpha: f64,
    /// Use a uniform-randomised threshold when the caller stops.
    pub randomized_ville: bool,
    /// Log rejections at info level instead of debug.
    pub verbose: bool,
    /// Seed for the randomised threshold. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            randomized_ville: true,
            verbose: true,
            seed: None,
        }
    }
}

impl TesterConfig {
    pub fn validate(&self) -> Result<(), TestingError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(TestingError::Config(format!(
                "significance level must be in (0, 1), got {}",
                self.alpha
            )));
        }
        Ok(())
    }

    /// Rejection threshold `1/alpha`.
    pub fn threshold(&self) -> f64 {
        1.0 / self.alpha
    }
}

// ---------------------------------------------------------------------------
// Tester
// ---------------------------------------------------------------------------

/// A single sequential test over one observation stream.
pub struct Tester {
    payoff: Box<dyn PayoffFunction>,
    strategy: Box<dyn BettingStrategy>,
    config: TesterConfig,
    rng: Box<dyn RngCore + Send>,

    wealth: f64,
    iteration_count: u64,
    rejected: bool,

    wealth_history: Vec<f64>,
    bet_history: Vec<f64>,
    payoff_history: Vec<f64>,
}

impl Tester {
    pub fn new(
        payoff: Box<dyn PayoffFunction>,
        strategy: Box<dyn BettingStrategy>,
        config: TesterConfig,
    ) -> Result<Self, TestingError> {
        config.validate()?;

        let rng: Box<dyn RngCore + Send> = match config.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_os_rng()),
        };

        debug!(
            test = payoff.name(),
            strategy = strategy.name(),
            alpha = config.alpha,
            randomized_ville = config.randomized_ville,
            "Tester created"
        );

        Ok(Self {
            payoff,
            strategy,
            config,
            rng,
            wealth: 1.0,
            iteration_count: 0,
            rejected: false,
            wealth_history: Vec::new(),
            bet_history: Vec::new(),
            payoff_history: Vec::new(),
        })
    }

    /// Build a tester whose strategy is looked up by name in `registry`.
    pub fn with_strategy_name(
        payoff: Box<dyn PayoffFunction>,
        strategy_name: &str,
        registry: &StrategyRegistry,
        config: TesterConfig,
    ) -> Result<Self, TestingError> {
        let strategy = registry.resolve(strategy_name)?;
        Self::new(payoff, strategy, config)
    }

    /// Replace the source of randomness used by `reject(true)`.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    // -- Accessors ---------------------------------------------------------

    pub fn name(&self) -> &str {
        self.payoff.name()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn arity(&self) -> Arity {
        self.payoff.arity()
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    pub fn wealth(&self) -> f64 {
        self.wealth
    }

    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }

    /// Sticky: true once any `reject` call has fired.
    pub fn rejected(&self) -> bool {
        self.rejected
    }

    pub fn state(&self) -> TestState {
        if self.rejected {
            TestState::Rejected
        } else {
            TestState::Testing
        }
    }

    /// Current (non-sticky) comparison `wealth ≥ 1/alpha`.
    pub fn above_threshold(&self) -> bool {
        self.wealth >= self.config.threshold()
    }

    pub fn wealth_history(&self) -> &[f64] {
        &self.wealth_history
    }

    pub fn bet_history(&self) -> &[f64] {
        &self.bet_history
    }

    pub fn payoff_history(&self) -> &[f64] {
        &self.payoff_history
    }

    // -- Transitions -------------------------------------------------------

    /// Advance the wealth process by one observation (or pair).
    ///
    /// On error nothing is committed: histories, wealth, and the payoff
    /// function's internal state are as they were before the call.
    pub fn step(&mut self, sample: Sample<'_>) -> Result<StepOutcome, TestingError> {
        let bet = self.strategy.next_bet(&self.payoff_history);
        let payoff = self.payoff.predict(sample)?;

        let factor = 1.0 + bet * payoff;
        if !(bet.is_finite() && payoff.is_finite() && factor > 0.0) {
            self.payoff.discard_last();
            warn!(
                test = self.payoff.name(),
                iteration = self.iteration_count + 1,
                bet,
                payoff,
                "Payoff outside the range the bet can absorb"
            );
            return Err(TestingError::ContractViolation { bet, payoff });
        }

        self.bet_history.push(bet);
        self.payoff_history.push(payoff);
        self.wealth *= factor;
        self.wealth_history.push(self.wealth);
        self.iteration_count += 1;

        let was_rejected = self.rejected;
        let fired = self.reject(false);
        let newly_rejected = fired && !was_rejected;

        if newly_rejected {
            if self.config.verbose {
                info!(
                    test = self.payoff.name(),
                    iters = self.iteration_count,
                    wealth = self.wealth,
                    threshold = self.config.threshold(),
                    "Reject null"
                );
            } else {
                debug!(iters = self.iteration_count, wealth = self.wealth, "Reject null");
            }
        }

        Ok(StepOutcome {
            iteration: self.iteration_count,
            bet,
            payoff,
            wealth: self.wealth,
            newly_rejected,
        })
    }

    /// Evaluate the rejection condition against current wealth.
    ///
    /// With `stopped` and randomised Ville enabled, the threshold is
    /// `u/alpha` for a fresh `u ~ U(0, 1)`; otherwise it is `1/alpha`.
    /// The return value is this evaluation; `rejected()` latches the
    /// first `true` permanently.
    pub fn reject(&mut self, stopped: bool) -> bool {
        let condition = if stopped && self.config.randomized_ville {
            let u: f64 = self.rng.random();
            self.wealth >= u / self.config.alpha
        } else {
            self.wealth >= self.config.threshold()
        };

        if condition {
            self.rejected = true;
        }
        condition
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
