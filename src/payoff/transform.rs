//! Variance-stabilising maps applied to kernel payoffs before betting.

use std::f64::consts::FRAC_2_PI;
use std::fmt;
use std::str::FromStr;

use crate::types::TestingError;

/// De la Peña martingale transform: `exp(v − v²/2) − 1` when that branch
/// dominates `exp(−v − v²/2)`, otherwise `1 − exp(−v − v²/2)`.
pub fn de_la_pena(value: f64) -> f64 {
    let half_square = value * value / 2.0;
    let plus = (value - half_square).exp();
    let minus = (-value - half_square).exp();
    if plus >= minus {
        plus - 1.0
    } else {
        1.0 - minus
    }
}

/// Optional post-processing of a (possibly normalised) payoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostProcessing {
    #[default]
    None,
    Sinh,
    Tanh,
    /// `(2/π)·arctan(v)`, mapping onto `(-1, 1)`.
    Arctan,
    DeLaPena,
}

impl PostProcessing {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            PostProcessing::None => value,
            PostProcessing::Sinh => value.sinh(),
            PostProcessing::Tanh => value.tanh(),
            PostProcessing::Arctan => FRAC_2_PI * value.atan(),
            PostProcessing::DeLaPena => de_la_pena(value),
        }
    }
}

impl fmt::Display for PostProcessing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostProcessing::None => "none",
            PostProcessing::Sinh => "sinh",
            PostProcessing::Tanh => "tanh",
            PostProcessing::Arctan => "arctan",
            PostProcessing::DeLaPena => "deLaPena",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PostProcessing {
    type Err = TestingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(PostProcessing::None),
            "sinh" => Ok(PostProcessing::Sinh),
            "tanh" => Ok(PostProcessing::Tanh),
            "arctan" => Ok(PostProcessing::Arctan),
            "delapena" | "de_la_pena" => Ok(PostProcessing::DeLaPena),
            _ => Err(TestingError::Config(format!(
                "Post-processing unrecognized: {s} (expected sinh, tanh, arctan, deLaPena or none)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
