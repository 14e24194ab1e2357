//! Betting strategies: how much capital to wager at each step.
//!
//! A strategy sees only the payoff history, so every bet is predictable
//! (fixed before the payoff it multiplies is observed). Strategies are
//! resolved once at construction through an explicit `StrategyRegistry`.

pub mod ons;

use std::collections::HashMap;

use tracing::debug;

use crate::types::TestingError;
pub use ons::OnlineNewtonStep;

/// Largest absolute bet any built-in strategy places. Keeps
/// `1 + bet * payoff` strictly positive for payoffs in `[-1, 1]`.
pub const MAX_BET: f64 = 0.5;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Maps a payoff history to the next bet (signed fraction of wealth).
///
/// Implementations must be idempotent for an unchanged history: calling
/// `next_bet` twice with the same slice returns the same bet and leaves
/// the strategy's state as it was after the first call.
#[cfg_attr(test, mockall::automock)]
pub trait BettingStrategy: Send {
    /// Bet for the step following `payoff_history`.
    fn next_bet(&mut self, payoff_history: &[f64]) -> f64;

    /// Strategy identifier for logging.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type StrategyFactory = fn() -> Box<dyn BettingStrategy>;

/// Name → constructor table for betting strategies.
///
/// Lookups are case-insensitive. `StrategyRegistry::default()` knows `ONS`.
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) a strategy under `name`.
    pub fn register(&mut self, name: &str, factory: StrategyFactory) -> &mut Self {
        self.factories.insert(name.to_ascii_lowercase(), factory);
        self
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a fresh strategy instance for `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn BettingStrategy>, TestingError> {
        let factory = self
            .factories
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                TestingError::Config(format!(
                    "Betting strategy unrecognized: {name} (known: {})",
                    self.names().join(", ")
                ))
            })?;
        let strategy = factory();
        debug!(strategy = strategy.name(), "Betting strategy resolved");
        Ok(strategy)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("ONS", || Box::new(OnlineNewtonStep::new()));
        registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
