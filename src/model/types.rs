//! Core public types for the MOI model.

use thiserror::Error;

use super::posterior::PosteriorSummary;
use crate::inference::InferenceError;
use crate::input::InputError;

/// Errors returned by MOI configuration, validation, and fitting.
#[derive(Debug, Error)]
pub enum MoiError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    InvalidSchedule(#[from] InferenceError),
    #[error("importance sampling depth must be at least 1")]
    InvalidImportanceSamplingDepth,
    #[error("max COI must be at least 1")]
    InvalidMaxCoi,
    #[error("error-rate bound ({found}) must lie strictly inside (0, 1)")]
    InvalidErrorRateBound { found: f64 },
    #[error("initial error rate ({found}) must lie strictly inside (0, {bound})")]
    InvalidInitialErrorRate { found: f64, bound: f64 },
    #[error("observed COI ({observed}) for sample {sample} exceeds max COI ({max_coi})")]
    ObservedCoiOutOfRange {
        sample: usize,
        observed: usize,
        max_coi: usize,
    },
    #[error(
        "lookup covers COI up to {table_coi} and {table_alleles} alleles; \
         chain needs COI {needed_coi} and {needed_alleles} alleles"
    )]
    LookupTooSmall {
        table_coi: usize,
        table_alleles: usize,
        needed_coi: usize,
        needed_alleles: usize,
    },
    #[error("sampling depth cap for COI {coi} and {num_alleles} alleles must be at least 1")]
    InvalidSamplingDepthCap { coi: usize, num_alleles: usize },
    #[error("replicated runs require at least {min} chains; found {found}")]
    InvalidChainCount { min: usize, found: usize },
    #[error("replicate seed stride must be positive")]
    InvalidSeedStride,
    #[error("chain worker terminated abnormally")]
    ChainFailed,
}

/// Immutable sampler configuration consumed by the chain.
#[derive(Debug, Clone, Copy)]
pub struct Parameters {
    /// Latent genotypes drawn per marginal likelihood evaluation.
    pub importance_sampling_depth: usize,
    /// Upper bound on per-sample complexity of infection.
    pub max_coi: usize,
    /// Starting false-positive call rate.
    pub eps_pos_0: f64,
    /// Starting false-negative call rate.
    pub eps_neg_0: f64,
    /// Open upper bound for the false-positive rate.
    pub max_eps_pos: f64,
    /// Open upper bound for the false-negative rate.
    pub max_eps_neg: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            importance_sampling_depth: 100,
            max_coi: 25,
            eps_pos_0: 0.05,
            eps_neg_0: 0.05,
            max_eps_pos: 0.5,
            max_eps_neg: 0.5,
        }
    }
}

impl Parameters {
    /// # Errors
    ///
    /// Returns `MoiError` if any field is out of range.
    pub fn validate(self) -> Result<(), MoiError> {
        if self.importance_sampling_depth == 0 {
            return Err(MoiError::InvalidImportanceSamplingDepth);
        }
        if self.max_coi == 0 {
            return Err(MoiError::InvalidMaxCoi);
        }
        for bound in [self.max_eps_pos, self.max_eps_neg] {
            if !(bound > 0.0 && bound < 1.0) {
                return Err(MoiError::InvalidErrorRateBound { found: bound });
            }
        }
        if !(self.eps_pos_0 > 0.0 && self.eps_pos_0 < self.max_eps_pos) {
            return Err(MoiError::InvalidInitialErrorRate {
                found: self.eps_pos_0,
                bound: self.max_eps_pos,
            });
        }
        if !(self.eps_neg_0 > 0.0 && self.eps_neg_0 < self.max_eps_neg) {
            return Err(MoiError::InvalidInitialErrorRate {
                found: self.eps_neg_0,
                bound: self.max_eps_neg,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.validate().is_ok()
    }
}

/// Block-wise mean acceptance rates over a completed run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptanceRates {
    /// Mean over samples of per-sample COI acceptance.
    pub m: f64,
    /// Mean over loci of per-locus allele-frequency acceptance.
    pub p: f64,
    pub eps_pos: f64,
    pub eps_neg: f64,
}

/// Sampler diagnostics summary.
#[derive(Debug, Clone, Default)]
pub struct ChainDiagnostics {
    pub iterations_completed: usize,
    pub retained_draws: usize,
    pub acceptance_rates: Option<AcceptanceRates>,
}

/// Output report from fitting a single chain.
#[derive(Debug, Clone, Default)]
pub struct FitReport {
    pub diagnostics: ChainDiagnostics,
    pub posterior_summary: Option<PosteriorSummary>,
}

/// Configuration for running independent replicate chains.
#[derive(Debug, Clone, Copy)]
pub struct ReplicateOptions {
    /// Number of independent chains to run.
    pub chains: usize,
    /// Seed increment between adjacent chains.
    ///
    /// Chain `i` uses `base_seed + i * seed_stride` with wrapping arithmetic.
    pub seed_stride: u64,
}

impl Default for ReplicateOptions {
    fn default() -> Self {
        Self {
            chains: 4,
            seed_stride: 10_000,
        }
    }
}

impl ReplicateOptions {
    /// # Errors
    ///
    /// Returns `MoiError` if replicate options are invalid.
    pub const fn validate(self) -> Result<(), MoiError> {
        if self.chains < 2 {
            return Err(MoiError::InvalidChainCount {
                min: 2,
                found: self.chains,
            });
        }
        if self.seed_stride == 0 {
            return Err(MoiError::InvalidSeedStride);
        }
        Ok(())
    }
}

/// Output report for replicated fitting.
#[derive(Debug, Clone, Default)]
pub struct ReplicatedReport {
    /// Chain-specific reports in execution order.
    pub chain_reports: Vec<FitReport>,
    /// Posterior summary from pooled draws across all chains.
    pub pooled_posterior_summary: Option<PosteriorSummary>,
}
