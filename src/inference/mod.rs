//! Reusable MCMC schedule and adaptation utilities.

use thiserror::Error;

use crate::utils::usize_to_f64;

/// Acceptance rate targeted by the Robbins-Monro proposal adaptation.
pub const ACCEPTANCE_TARGET: f64 = 0.23;

/// Errors for MCMC schedule configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("schedule must run at least one iteration")]
    InvalidIterations,
    #[error("burn-in ({burn_in}) leaves no retained iterations out of {iterations}")]
    InvalidBurnIn { burn_in: usize, iterations: usize },
    #[error("thinning interval must be at least 1")]
    InvalidThinning,
}

/// MCMC schedule for one chain run.
///
/// The defaults are sized to this sampler, not to a generic chain: the
/// error-rate blocks recompute every `(locus, sample)` cell per proposal and
/// are the slowest to equilibrate, so half of a ten-thousand-iteration run is
/// discarded as burn-in (by which point the `1 / sqrt(iteration)` adaptation
/// step has decayed to roughly a percent of its starting size). Draws are
/// retained unthinned; storing a draw is negligible next to the importance
/// sampling behind it, and there is no adaptive thinning to interact with.
#[derive(Debug, Clone, Copy)]
pub struct McmcConfig {
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub seed: u64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            burn_in: 5_000,
            thin: 1,
            seed: 0,
        }
    }
}

impl McmcConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.iterations == 0 {
            return Err(InferenceError::InvalidIterations);
        }
        if self.burn_in >= self.iterations {
            return Err(InferenceError::InvalidBurnIn {
                burn_in: self.burn_in,
                iterations: self.iterations,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        Ok(())
    }

    /// Number of retained draws implied by this configuration.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        (self.iterations - self.burn_in) / self.thin
    }
}

/// Robbins-Monro step size at a one-based iteration, `1 / sqrt(iteration)`.
#[must_use]
pub fn adaptation_step(iteration: usize) -> f64 {
    1.0 / usize_to_f64(iteration).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_schedule_retains_the_post_burn_in_half() {
        let config = McmcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retained_draws(), 5_000);
    }

    #[test]
    fn config_validation_rejects_zero_iterations() {
        let config = McmcConfig {
            iterations: 0,
            ..McmcConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidIterations));
    }

    #[test]
    fn config_validation_rejects_burn_in_past_iterations() {
        let config = McmcConfig {
            iterations: 10,
            burn_in: 10,
            ..McmcConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(InferenceError::InvalidBurnIn { .. })
        ));
    }

    #[test]
    fn retained_draws_floor_divides_post_burn_in_span() {
        let config = McmcConfig {
            iterations: 103,
            burn_in: 3,
            thin: 4,
            ..McmcConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.retained_draws(), 25);
    }

    #[test]
    fn adaptation_step_shrinks_with_iteration() {
        assert_relative_eq!(adaptation_step(1), 1.0);
        assert_relative_eq!(adaptation_step(4), 0.5);
        assert!(adaptation_step(100) < adaptation_step(99));
    }
}
