//! Online Newton Step bet selection.
//!
//! Treats betting as online convex optimisation of the log-wealth loss
//! `-ln(1 + λ·payoff)`. Each new payoff contributes its gradient
//! `z = -payoff / (1 + λ·payoff)`; the bet takes a Newton-style step scaled
//! by the running sum of squared gradients and is clipped to
//! `[-MAX_BET, MAX_BET]`.

use tracing::debug;

use super::{BettingStrategy, MAX_BET};

/// Online Newton Step strategy state.
#[derive(Debug, Clone)]
pub struct OnlineNewtonStep {
    /// `2 / (2 - ln 3)`.
    step_scale: f64,
    /// Running sum of squared gradients, seeded with one pseudo-observation.
    sum_squared_gradient: f64,
    /// Bet placed on the most recent step (the one awaiting its payoff).
    previous_bet: f64,
    /// How many entries of the payoff history have been folded in.
    absorbed: usize,
}

impl OnlineNewtonStep {
    pub fn new() -> Self {
        Self {
            step_scale: 2.0 / (2.0 - 3.0_f64.ln()),
            sum_squared_gradient: 1.0,
            previous_bet: 0.0,
            absorbed: 0,
        }
    }

    /// Current running sum of squared gradients (always ≥ 1).
    pub fn sum_squared_gradient(&self) -> f64 {
        self.sum_squared_gradient
    }

    /// Bet most recently returned by `next_bet`.
    pub fn previous_bet(&self) -> f64 {
        self.previous_bet
    }

    fn absorb(&mut self, payoff: f64) {
        let z = -payoff / (1.0 + self.previous_bet * payoff);
        self.sum_squared_gradient += z * z;
        let unclipped = self.previous_bet - self.step_scale * z / self.sum_squared_gradient;
        self.previous_bet = unclipped.clamp(-MAX_BET, MAX_BET);
    }
}

impl Default for OnlineNewtonStep {
    fn default() -> Self {
        Self::new()
    }
}

impl BettingStrategy for OnlineNewtonStep {
    fn next_bet(&mut self, payoff_history: &[f64]) -> f64 {
        if payoff_history.is_empty() {
            return 0.0;
        }

        // Only payoffs not yet seen move the state; a repeated call with
        // the same history returns the stored bet.
        if payoff_history.len() > self.absorbed {
            for &payoff in &payoff_history[self.absorbed..] {
                self.absorb(payoff);
            }
            self.absorbed = payoff_history.len();

            debug!(
                bet = self.previous_bet,
                sum_z_squared = self.sum_squared_gradient,
                absorbed = self.absorbed,
                "ONS bet updated"
            );
        }

        self.previous_bet
    }

    fn name(&self) -> &'static str {
        "ONS"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_first_bet_is_zero() {
        let mut ons = OnlineNewtonStep::new();
        assert_eq!(ons.next_bet(&[]), 0.0);
        assert_eq!(ons.sum_squared_gradient(), 1.0);
    }

    #[test]
    fn test_single_update_matches_closed_form() {
        let mut ons = OnlineNewtonStep::new();
        let bet = ons.next_bet(&[0.1]);

        // z = -0.1 / (1 + 0) = -0.1, sum = 1.01, bet = c·0.1/1.01 (inside the clip)
        let c = 2.0 / (2.0 - 3.0_f64.ln());
        let expected = c * 0.1 / 1.01;
        assert!(expected < MAX_BET);
        assert!((bet - expected).abs() < 1e-12, "bet {bet} != {expected}");
        assert!((ons.sum_squared_gradient() - 1.01).abs() < 1e-12);
    }

    #[test]
    fn test_large_single_update_clips_to_max_bet() {
        // Unclipped value c·0.5/1.25 ≈ 0.8875
        let mut ons = OnlineNewtonStep::new();
        assert_eq!(ons.next_bet(&[0.5]), MAX_BET);
        assert!((ons.sum_squared_gradient() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_positive_payoffs_push_bet_to_upper_clip() {
        let mut ons = OnlineNewtonStep::new();
        let mut history = Vec::new();
        let mut bet = 0.0;
        for _ in 0..5 {
            history.push(5.0);
            bet = ons.next_bet(&history);
        }
        assert_eq!(bet, MAX_BET);
    }

    #[test]
    fn test_negative_payoffs_push_bet_to_lower_clip() {
        let mut ons = OnlineNewtonStep::new();
        let mut history = Vec::new();
        let mut bet = 0.0;
        for _ in 0..10 {
            history.push(-1.0);
            bet = ons.next_bet(&history);
        }
        assert_eq!(bet, -MAX_BET);
    }

    #[test]
    fn test_repeated_call_is_idempotent() {
        let mut ons = OnlineNewtonStep::new();
        let history = [0.3, -0.2, 0.7];
        let first = ons.next_bet(&history);
        let sum = ons.sum_squared_gradient();
        let second = ons.next_bet(&history);
        assert_eq!(first, second);
        assert_eq!(sum, ons.sum_squared_gradient());
    }

    #[test]
    fn test_catch_up_matches_incremental_updates() {
        let payoffs = [0.4, -0.1, 0.9, 0.2, -0.6];

        let mut incremental = OnlineNewtonStep::new();
        let mut last = 0.0;
        for t in 1..=payoffs.len() {
            last = incremental.next_bet(&payoffs[..t]);
        }

        let mut batch = OnlineNewtonStep::new();
        let caught_up = batch.next_bet(&payoffs);

        assert_eq!(last, caught_up);
    }

    #[test]
    fn test_sum_squared_gradient_is_non_decreasing() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ons = OnlineNewtonStep::new();
        let mut history = Vec::new();
        let mut previous = ons.sum_squared_gradient();
        for _ in 0..500 {
            history.push(rng.random_range(-1.0..=1.0));
            ons.next_bet(&history);
            assert!(ons.sum_squared_gradient() >= previous);
            previous = ons.sum_squared_gradient();
        }
    }

    #[test]
    fn test_bets_stay_clipped_for_random_histories() {
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..10_000 {
            let mut ons = OnlineNewtonStep::new();
            let len = rng.random_range(1..=40);
            let mut history = Vec::with_capacity(len);
            for _ in 0..len {
                history.push(rng.random_range(-1.0..=1.0));
                let bet = ons.next_bet(&history);
                assert!((-MAX_BET..=MAX_BET).contains(&bet), "bet {bet} escaped clip");
            }
        }
    }
}
