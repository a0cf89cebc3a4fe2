//! Generator tier selection for coding attempts.
//!
//! The policy is a pure function of the attempt index and the attempt ceiling,
//! so it can be swapped without changing the loop structure.

use crate::core::error::ConfigError;
use crate::core::types::Tier;

/// Decides which generator tier serves a given attempt.
pub trait EscalationPolicy: Send + Sync {
    fn tier(&self, attempt: usize, max_attempts: usize) -> Tier;
}

impl<F> EscalationPolicy for F
where
    F: Fn(usize, usize) -> Tier + Send + Sync,
{
    fn tier(&self, attempt: usize, max_attempts: usize) -> Tier {
        self(attempt, max_attempts)
    }
}

/// Escalate once `attempt >= ceil(numerator / denominator * max_attempts)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractionEscalation {
    numerator: usize,
    denominator: usize,
}

impl FractionEscalation {
    pub fn new(numerator: usize, denominator: usize) -> Result<Self, ConfigError> {
        if numerator == 0 || denominator == 0 || numerator > denominator {
            return Err(ConfigError::EscalationFraction {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// First attempt index served by the master tier.
    pub fn threshold(&self, max_attempts: usize) -> usize {
        (self.numerator * max_attempts).div_ceil(self.denominator)
    }
}

impl Default for FractionEscalation {
    fn default() -> Self {
        Self {
            numerator: 2,
            denominator: 3,
        }
    }
}

impl EscalationPolicy for FractionEscalation {
    fn tier(&self, attempt: usize, max_attempts: usize) -> Tier {
        if attempt >= self.threshold(max_attempts) {
            Tier::Master
        } else {
            Tier::Standard
        }
    }
}

/// Never escalate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscalation;

impl EscalationPolicy for NoEscalation {
    fn tier(&self, _attempt: usize, _max_attempts: usize) -> Tier {
        Tier::Standard
    }
}
