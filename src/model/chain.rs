//! Chain state and the four adaptive Metropolis-Hastings update blocks.
//!
//! One chain owns its RNG, its parameter snapshot, and two `(locus, sample)`
//! log-likelihood surfaces. `llik_old` is authoritative for the current state
//! at every block boundary; `llik_new` is scratch for candidate evaluations
//! and is copied back cell-by-cell on acceptance. Every proposal scale adapts
//! toward the common acceptance target with a `1 / sqrt(iteration)` step.

use super::likelihood;
use super::lookup::Lookup;
use super::sampler::Sampler;
use super::types::{AcceptanceRates, MoiError, Parameters};
use crate::inference::{ACCEPTANCE_TARGET, adaptation_step};
use crate::input::GenotypingData;
use crate::utils::{UNDERFLO, usize_to_f64};

/// Which scalar error rate a block updates.
#[derive(Debug, Clone, Copy)]
enum ErrorRateBlock {
    FalsePositive,
    FalseNegative,
}

/// Single MCMC chain over COI, allele frequencies, and error rates.
#[derive(Debug, Clone)]
pub struct Chain {
    data: GenotypingData,
    lookup: Lookup,
    params: Parameters,
    sampler: Sampler,

    m: Vec<usize>,
    p: Vec<Vec<f64>>,
    eps_neg: f64,
    eps_pos: f64,
    llik_old: Vec<Vec<f64>>,
    llik_new: Vec<Vec<f64>>,

    m_prop_mean: Vec<f64>,
    p_prop_var: Vec<f64>,
    eps_pos_var: f64,
    eps_neg_var: f64,
    m_accept: Vec<u64>,
    p_accept: Vec<u64>,
    eps_pos_accept: u64,
    eps_neg_accept: u64,
}

impl Chain {
    /// Build a chain from observations, lookup tables, and configuration,
    /// seeding its RNG with `seed`.
    ///
    /// Allele frequencies start at the empirical call proportions per locus,
    /// COI starts at the observed values, and both likelihood surfaces are
    /// filled from the marginal kernel at the initial state.
    ///
    /// # Errors
    ///
    /// Returns `MoiError` if the parameters are invalid, an observed COI
    /// exceeds `max_coi`, or the lookup tables do not cover the chain.
    pub fn new(
        data: GenotypingData,
        lookup: Lookup,
        params: Parameters,
        seed: u64,
    ) -> Result<Self, MoiError> {
        params.validate()?;
        for (sample, observed) in data.observed_coi().iter().enumerate() {
            if *observed > params.max_coi {
                return Err(MoiError::ObservedCoiOutOfRange {
                    sample,
                    observed: *observed,
                    max_coi: params.max_coi,
                });
            }
        }
        if lookup.max_coi() < params.max_coi || lookup.max_alleles() < data.max_alleles() {
            return Err(MoiError::LookupTooSmall {
                table_coi: lookup.max_coi(),
                table_alleles: lookup.max_alleles(),
                needed_coi: params.max_coi,
                needed_alleles: data.max_alleles(),
            });
        }

        let num_loci = data.num_loci();
        let num_samples = data.num_samples();
        let p = empirical_allele_frequencies(&data);
        let m = data.observed_coi().to_vec();

        let mut chain = Self {
            sampler: Sampler::new(seed),
            m,
            p,
            eps_neg: params.eps_neg_0,
            eps_pos: params.eps_pos_0,
            llik_old: vec![vec![0.0; num_samples]; num_loci],
            llik_new: vec![vec![0.0; num_samples]; num_loci],
            m_prop_mean: vec![1.0; num_samples],
            p_prop_var: vec![1.0; num_loci],
            eps_pos_var: 0.05,
            eps_neg_var: 0.05,
            m_accept: vec![0; num_samples],
            p_accept: vec![0; num_loci],
            eps_pos_accept: 0,
            eps_neg_accept: 0,
            data,
            lookup,
            params,
        };
        chain.initialize_likelihood();
        Ok(chain)
    }

    fn initialize_likelihood(&mut self) {
        for locus in 0..self.data.num_loci() {
            for sample in 0..self.data.num_samples() {
                let marginal = likelihood::marginal_log_likelihood(
                    self.data.observed(locus, sample),
                    self.m[sample],
                    &self.p[locus],
                    self.eps_neg,
                    self.eps_pos,
                    &mut self.sampler,
                    &self.lookup,
                    self.params.importance_sampling_depth,
                );
                self.llik_old[locus][sample] = marginal;
                self.llik_new[locus][sample] = marginal;
            }
        }
    }

    /// Advance every block once: m, then p, then eps-pos, then eps-neg.
    ///
    /// # Panics
    ///
    /// Panics if `iteration` is zero; adaptation steps are `1 / sqrt(iteration)`
    /// on a one-based schedule.
    pub fn step(&mut self, iteration: usize) {
        assert!(iteration > 0, "iteration must be positive");
        self.update_m(iteration);
        self.update_p(iteration);
        self.update_eps_pos(iteration);
        self.update_eps_neg(iteration);
    }

    /// Per-sample COI block: geometric jump, MH over all loci of the sample.
    pub fn update_m(&mut self, iteration: usize) {
        let step = adaptation_step(iteration);
        let max_coi = i64::try_from(self.params.max_coi).unwrap_or(i64::MAX);
        for sample in 0..self.data.num_samples() {
            let current = i64::try_from(self.m[sample]).unwrap_or(i64::MAX);
            let delta = self.sampler.sample_coi_delta(self.m_prop_mean[sample]);
            let proposal = current.saturating_add(delta);

            // Unreachable with the geometric jump; kept for alternate jump rules.
            if proposal == current {
                self.m_prop_mean[sample] += (1.0 - ACCEPTANCE_TARGET) * step;
                self.m_accept[sample] += 1;
                continue;
            }
            if proposal < 1 || proposal > max_coi {
                continue;
            }
            let proposal = usize::try_from(proposal).unwrap_or(usize::MAX);

            let mut sum_candidate = 0.0;
            let mut sum_current = 0.0;
            for locus in 0..self.data.num_loci() {
                self.llik_new[locus][sample] = likelihood::marginal_log_likelihood(
                    self.data.observed(locus, sample),
                    proposal,
                    &self.p[locus],
                    self.eps_neg,
                    self.eps_pos,
                    &mut self.sampler,
                    &self.lookup,
                    self.params.importance_sampling_depth,
                );
                sum_candidate += self.llik_new[locus][sample];
                sum_current += self.llik_old[locus][sample];
            }

            if self.sampler.sample_log_mh_acceptance() <= sum_candidate - sum_current {
                self.m[sample] = proposal;
                self.m_prop_mean[sample] += (1.0 - ACCEPTANCE_TARGET) * step;
                self.m_accept[sample] += 1;
                for locus in 0..self.data.num_loci() {
                    self.llik_old[locus][sample] = self.llik_new[locus][sample];
                }
            } else {
                self.m_prop_mean[sample] =
                    (self.m_prop_mean[sample] - ACCEPTANCE_TARGET * step).max(0.0);
            }
        }
    }

    /// Per-locus allele-frequency block: logit-normal simplex proposal, MH
    /// over all samples of the locus, multiplicative scale adaptation.
    pub fn update_p(&mut self, iteration: usize) {
        let step = adaptation_step(iteration);
        for locus in 0..self.data.num_loci() {
            let proposal = self
                .sampler
                .sample_allele_frequencies(&self.p[locus], self.p_prop_var[locus]);

            let mut sum_candidate = 0.0;
            let mut sum_current = 0.0;
            for sample in 0..self.data.num_samples() {
                self.llik_new[locus][sample] = likelihood::marginal_log_likelihood(
                    self.data.observed(locus, sample),
                    self.m[sample],
                    &proposal,
                    self.eps_neg,
                    self.eps_pos,
                    &mut self.sampler,
                    &self.lookup,
                    self.params.importance_sampling_depth,
                );
                sum_candidate += self.llik_new[locus][sample];
                sum_current += self.llik_old[locus][sample];
            }

            if self.sampler.sample_log_mh_acceptance() <= sum_candidate - sum_current {
                self.p[locus] = proposal;
                self.p_accept[locus] += 1;
                self.p_prop_var[locus] =
                    ((1.0 - ACCEPTANCE_TARGET) * step + self.p_prop_var[locus].ln()).exp();
                for sample in 0..self.data.num_samples() {
                    self.llik_old[locus][sample] = self.llik_new[locus][sample];
                }
            } else {
                self.p_prop_var[locus] = (self.p_prop_var[locus].ln()
                    - ACCEPTANCE_TARGET * step)
                    .exp()
                    .max(UNDERFLO);
            }
        }
    }

    /// False-positive rate block.
    pub fn update_eps_pos(&mut self, iteration: usize) {
        self.update_error_rate(ErrorRateBlock::FalsePositive, iteration);
    }

    /// False-negative rate block.
    pub fn update_eps_neg(&mut self, iteration: usize) {
        self.update_error_rate(ErrorRateBlock::FalseNegative, iteration);
    }

    fn update_error_rate(&mut self, block: ErrorRateBlock, iteration: usize) {
        let step = adaptation_step(iteration);
        let (current, bound, variance) = match block {
            ErrorRateBlock::FalsePositive => {
                (self.eps_pos, self.params.max_eps_pos, self.eps_pos_var)
            }
            ErrorRateBlock::FalseNegative => {
                (self.eps_neg, self.params.max_eps_neg, self.eps_neg_var)
            }
        };

        let proposal = self.sampler.sample_epsilon(current, variance);
        // Out-of-range proposals are an implicit reject without adaptation.
        if !(proposal > 0.0 && proposal < bound) {
            return;
        }

        let (candidate_neg, candidate_pos) = match block {
            ErrorRateBlock::FalsePositive => (self.eps_neg, proposal),
            ErrorRateBlock::FalseNegative => (proposal, self.eps_pos),
        };

        let mut sum_candidate = 0.0;
        let mut sum_current = 0.0;
        for locus in 0..self.data.num_loci() {
            for sample in 0..self.data.num_samples() {
                self.llik_new[locus][sample] = likelihood::marginal_log_likelihood(
                    self.data.observed(locus, sample),
                    self.m[sample],
                    &self.p[locus],
                    candidate_neg,
                    candidate_pos,
                    &mut self.sampler,
                    &self.lookup,
                    self.params.importance_sampling_depth,
                );
                sum_candidate += self.llik_new[locus][sample];
                sum_current += self.llik_old[locus][sample];
            }
        }

        if self.sampler.sample_log_mh_acceptance() <= sum_candidate - sum_current {
            for locus in 0..self.data.num_loci() {
                for sample in 0..self.data.num_samples() {
                    self.llik_old[locus][sample] = self.llik_new[locus][sample];
                }
            }
            match block {
                ErrorRateBlock::FalsePositive => {
                    self.eps_pos = proposal;
                    self.eps_pos_var += (1.0 - ACCEPTANCE_TARGET) * step;
                    self.eps_pos_accept += 1;
                }
                ErrorRateBlock::FalseNegative => {
                    self.eps_neg = proposal;
                    self.eps_neg_var += (1.0 - ACCEPTANCE_TARGET) * step;
                    self.eps_neg_accept += 1;
                }
            }
        } else {
            match block {
                ErrorRateBlock::FalsePositive => {
                    self.eps_pos_var = (self.eps_pos_var - ACCEPTANCE_TARGET * step).max(UNDERFLO);
                }
                ErrorRateBlock::FalseNegative => {
                    self.eps_neg_var = (self.eps_neg_var - ACCEPTANCE_TARGET * step).max(UNDERFLO);
                }
            }
        }
    }

    /// Current COI per sample.
    #[must_use]
    pub fn m(&self) -> &[usize] {
        &self.m
    }

    /// Current allele-frequency simplex per locus.
    #[must_use]
    pub fn allele_frequencies(&self) -> &[Vec<f64>] {
        &self.p
    }

    #[must_use]
    pub const fn eps_pos(&self) -> f64 {
        self.eps_pos
    }

    #[must_use]
    pub const fn eps_neg(&self) -> f64 {
        self.eps_neg
    }

    /// Sum of the authoritative log-likelihood surface.
    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        self.llik_old
            .iter()
            .map(|row| row.iter().sum::<f64>())
            .sum()
    }

    #[must_use]
    pub fn m_accept(&self) -> &[u64] {
        &self.m_accept
    }

    #[must_use]
    pub fn p_accept(&self) -> &[u64] {
        &self.p_accept
    }

    #[must_use]
    pub const fn eps_pos_accept(&self) -> u64 {
        self.eps_pos_accept
    }

    #[must_use]
    pub const fn eps_neg_accept(&self) -> u64 {
        self.eps_neg_accept
    }

    /// Adaptive geometric jump mean per sample.
    #[must_use]
    pub fn m_prop_mean(&self) -> &[f64] {
        &self.m_prop_mean
    }

    /// Adaptive logit-normal scale per locus.
    #[must_use]
    pub fn p_prop_var(&self) -> &[f64] {
        &self.p_prop_var
    }

    #[must_use]
    pub const fn eps_pos_var(&self) -> f64 {
        self.eps_pos_var
    }

    #[must_use]
    pub const fn eps_neg_var(&self) -> f64 {
        self.eps_neg_var
    }

    #[must_use]
    pub const fn params(&self) -> Parameters {
        self.params
    }

    #[must_use]
    pub const fn data(&self) -> &GenotypingData {
        &self.data
    }

    /// Mean per-block acceptance rates after `iterations` completed steps.
    #[must_use]
    pub fn acceptance_rates(&self, iterations: usize) -> AcceptanceRates {
        let denominator = usize_to_f64(iterations.max(1));
        let mean_counts = |counts: &[u64]| {
            counts
                .iter()
                .map(|count| u64_to_f64(*count) / denominator)
                .sum::<f64>()
                / usize_to_f64(counts.len().max(1))
        };
        AcceptanceRates {
            m: mean_counts(&self.m_accept),
            p: mean_counts(&self.p_accept),
            eps_pos: u64_to_f64(self.eps_pos_accept) / denominator,
            eps_neg: u64_to_f64(self.eps_neg_accept) / denominator,
        }
    }
}

/// Empirical per-locus allele frequencies from the presence calls.
///
/// A locus with no observed allele across all samples falls back to the
/// uniform simplex so the chain never starts from an undefined state.
fn empirical_allele_frequencies(data: &GenotypingData) -> Vec<Vec<f64>> {
    (0..data.num_loci())
        .map(|locus| {
            let allele_count = data.num_alleles()[locus];
            let mut counts = vec![0u32; allele_count];
            let mut total = 0u32;
            for sample in 0..data.num_samples() {
                for (allele, call) in data.observed(locus, sample).iter().enumerate() {
                    counts[allele] += u32::from(*call);
                    total += u32::from(*call);
                }
            }
            if total == 0 {
                vec![1.0 / usize_to_f64(allele_count); allele_count]
            } else {
                counts
                    .iter()
                    .map(|count| f64::from(*count) / f64::from(total))
                    .collect()
            }
        })
        .collect()
}

fn u64_to_f64(value: u64) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_data() -> GenotypingData {
        GenotypingData::new(
            vec![
                vec![vec![1, 0], vec![1, 1], vec![0, 1]],
                vec![vec![0, 1, 1], vec![1, 0, 0], vec![0, 0, 0]],
            ],
            vec![1, 2, 1],
        )
        .expect("observations are valid")
    }

    fn small_chain(seed: u64) -> Chain {
        let params = Parameters {
            importance_sampling_depth: 20,
            max_coi: 5,
            ..Parameters::default()
        };
        let lookup = Lookup::with_constant_depth(5, 3, 20).expect("tables build");
        Chain::new(small_data(), lookup, params, seed).expect("chain builds")
    }

    #[test]
    fn empirical_frequencies_match_call_proportions() {
        let p = empirical_allele_frequencies(&small_data());
        assert_relative_eq!(p[0][0], 0.5);
        assert_relative_eq!(p[0][1], 0.5);
        assert_relative_eq!(p[1][0], 1.0 / 3.0);
        assert_relative_eq!(p[1][1], 1.0 / 3.0);
        assert_relative_eq!(p[1][2], 1.0 / 3.0);
    }

    #[test]
    fn silent_locus_falls_back_to_uniform_frequencies() {
        let data = GenotypingData::new(
            vec![vec![vec![0, 0, 0, 0], vec![0, 0, 0, 0]]],
            vec![1, 1],
        )
        .expect("observations are valid");
        let p = empirical_allele_frequencies(&data);
        assert!(p[0].iter().all(|mass| (*mass - 0.25).abs() < 1.0e-12));
    }

    #[test]
    fn construction_starts_from_observed_coi_and_finite_likelihood() {
        let chain = small_chain(1);
        assert_eq!(chain.m(), &[1, 2, 1]);
        assert!(chain.log_likelihood().is_finite());
        assert_relative_eq!(chain.eps_pos(), chain.params().eps_pos_0);
        assert_relative_eq!(chain.eps_neg(), chain.params().eps_neg_0);
    }

    #[test]
    fn construction_rejects_observed_coi_above_bound() {
        let params = Parameters {
            max_coi: 2,
            ..Parameters::default()
        };
        let lookup = Lookup::with_constant_depth(2, 3, 20).expect("tables build");
        let data = GenotypingData::new(vec![vec![vec![1, 0], vec![0, 1]]], vec![1, 3])
            .expect("observations are valid");
        assert!(matches!(
            Chain::new(data, lookup, params, 0),
            Err(MoiError::ObservedCoiOutOfRange {
                sample: 1,
                observed: 3,
                max_coi: 2
            })
        ));
    }

    #[test]
    fn construction_rejects_undersized_lookup() {
        let params = Parameters {
            max_coi: 8,
            ..Parameters::default()
        };
        let lookup = Lookup::with_constant_depth(5, 3, 20).expect("tables build");
        assert!(matches!(
            Chain::new(small_data(), lookup, params, 0),
            Err(MoiError::LookupTooSmall { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "iteration must be positive")]
    fn step_rejects_zero_iteration() {
        small_chain(2).step(0);
    }

    #[test]
    fn state_invariants_hold_across_steps() {
        let mut chain = small_chain(3);
        for iteration in 1..=50 {
            chain.step(iteration);
            for frequencies in chain.allele_frequencies() {
                let total = frequencies.iter().sum::<f64>();
                assert!((total - 1.0).abs() <= 1.0e-9);
                assert!(frequencies.iter().all(|mass| *mass >= 0.0));
            }
            for coi in chain.m() {
                assert!(*coi >= 1 && *coi <= chain.params().max_coi);
            }
            assert!(chain.eps_pos() > 0.0 && chain.eps_pos() < chain.params().max_eps_pos);
            assert!(chain.eps_neg() > 0.0 && chain.eps_neg() < chain.params().max_eps_neg);
            assert!(chain.eps_pos_var() >= UNDERFLO);
            assert!(chain.eps_neg_var() >= UNDERFLO);
            assert!(chain.p_prop_var().iter().all(|var| *var >= UNDERFLO));
            assert!(chain.m_prop_mean().iter().all(|mean| *mean >= 0.0));
        }
    }

    #[test]
    fn skipping_the_p_block_leaves_frequencies_untouched() {
        let mut chain = small_chain(4);
        let initial = chain.allele_frequencies().to_vec();
        for iteration in 1..=100 {
            chain.update_m(iteration);
            chain.update_eps_pos(iteration);
            chain.update_eps_neg(iteration);
        }
        for (locus, frequencies) in chain.allele_frequencies().iter().enumerate() {
            assert_eq!(crate::utils::max_slice_abs_diff(frequencies, &initial[locus]), 0.0);
            for (allele, mass) in frequencies.iter().enumerate() {
                assert_eq!(mass.to_bits(), initial[locus][allele].to_bits());
            }
        }
        let moved = chain.m_accept().iter().sum::<u64>()
            + chain.eps_pos_accept()
            + chain.eps_neg_accept();
        assert!(moved > 0, "other blocks should keep moving");
    }

    #[test]
    fn acceptance_counters_are_bounded_by_iterations() {
        let mut chain = small_chain(5);
        let iterations = 30usize;
        for iteration in 1..=iterations {
            chain.step(iteration);
        }
        let bound = u64::try_from(iterations).expect("iteration count fits");
        assert!(chain.m_accept().iter().all(|count| *count <= bound));
        assert!(chain.p_accept().iter().all(|count| *count <= bound));
        assert!(chain.eps_pos_accept() <= bound);
        assert!(chain.eps_neg_accept() <= bound);
        let rates = chain.acceptance_rates(iterations);
        for rate in [rates.m, rates.p, rates.eps_pos, rates.eps_neg] {
            assert!((0.0..=1.0).contains(&rate));
        }
    }
}
