//! Importance-sampled marginal likelihood of one observed genotype.
//!
//! The marginal probability of a presence/absence observation sums the
//! emission probability over every latent multilocus count vector compatible
//! with the COI. The sum is estimated by importance sampling: latent
//! genotypes are drawn from a multinomial whose frequencies are reweighted
//! toward the observation, then each draw is corrected by the prior-to-
//! proposal density ratio.

use super::lookup::Lookup;
use super::sampler::Sampler;
use crate::utils::{log_sum_exp, usize_to_f64};

/// Shift keeping multinomial log-probabilities finite at zero frequency.
const FREQUENCY_EPS: f64 = 1.0e-12;

/// Shift guaranteeing strictly positive proposal mass for every allele.
const REWEIGHT_EPS: f64 = 1.0e-6;

/// Proposal allele frequencies tilted toward the observed presence calls.
///
/// Each allele keeps mass `p_a * (obs_a (1 - eps_neg) + (1 - obs_a) eps_neg)
/// + eps_pos + 1e-6`, normalized to a simplex. The additive terms keep every
/// multinomial outcome reachable regardless of the observation pattern.
#[must_use]
pub fn reweight_allele_frequencies(
    frequencies: &[f64],
    observed: &[u8],
    eps_neg: f64,
    eps_pos: f64,
) -> Vec<f64> {
    let mut reweighted = Vec::with_capacity(frequencies.len());
    let mut total = 0.0;
    for (frequency, call) in frequencies.iter().zip(observed) {
        let presence = f64::from(*call);
        let mass = frequency * presence.mul_add(1.0 - eps_neg, (1.0 - presence) * eps_neg)
            + eps_pos
            + REWEIGHT_EPS;
        reweighted.push(mass);
        total += mass;
    }
    for mass in &mut reweighted {
        *mass /= total;
    }
    reweighted
}

/// Multinomial log-pmf of each latent genotype under `frequencies`.
pub(crate) fn genotype_log_pmf(
    genotypes: &[Vec<u32>],
    coi: usize,
    frequencies: &[f64],
    lookup: &Lookup,
) -> Vec<f64> {
    genotypes
        .iter()
        .map(|genotype| {
            let mut log_pmf = lookup.ln_gamma(coi + 1);
            for (count, frequency) in genotype.iter().zip(frequencies) {
                if *count > 0 {
                    let index = usize::try_from(*count + 1).unwrap_or(usize::MAX);
                    log_pmf += f64::from(*count) * (frequency + FREQUENCY_EPS).ln()
                        - lookup.ln_gamma(index);
                }
            }
            log_pmf
        })
        .collect()
}

/// Log-probability of the observed presence calls given each latent genotype.
///
/// Per allele: a truly present allele is seen with `count * ln(1 - eps_neg)`
/// and missed with `count * ln(eps_neg)`; an absent allele is falsely called
/// with `ln(eps_pos)` and correctly silent with `ln(1 - eps_pos)`. The count
/// scaling on the present branches is part of the emission model.
pub(crate) fn observation_log_likelihoods(
    observed: &[u8],
    genotypes: &[Vec<u32>],
    eps_neg: f64,
    eps_pos: f64,
) -> Vec<f64> {
    let true_positive = (1.0 - eps_neg).ln();
    let true_negative = (1.0 - eps_pos).ln();
    let false_positive = eps_pos.ln();
    let false_negative = eps_neg.ln();

    genotypes
        .iter()
        .map(|genotype| {
            let mut log_likelihood = 0.0;
            for (count, call) in genotype.iter().zip(observed) {
                log_likelihood += if *call == 1 {
                    if *count > 0 {
                        f64::from(*count) * true_positive
                    } else {
                        false_positive
                    }
                } else if *count > 0 {
                    f64::from(*count) * false_negative
                } else {
                    true_negative
                };
            }
            log_likelihood
        })
        .collect()
}

/// Monte Carlo estimate of `ln P(observed | coi, frequencies, eps_neg, eps_pos)`.
///
/// Draws `min(depth, lookup cap)` latent genotypes from the reweighted
/// proposal and averages the importance ratios in log space. The reduction
/// subtracts the maximum log-weight before exponentiating, so finite inputs
/// cannot collapse to negative infinity even when every weight underflows.
#[allow(clippy::too_many_arguments)]
pub fn marginal_log_likelihood(
    observed: &[u8],
    coi: usize,
    frequencies: &[f64],
    eps_neg: f64,
    eps_pos: f64,
    sampler: &mut Sampler,
    lookup: &Lookup,
    depth: usize,
) -> f64 {
    let depth = depth.min(lookup.sampling_depth(coi, frequencies.len())).max(1);
    let proposal = reweight_allele_frequencies(frequencies, observed, eps_neg, eps_pos);
    let genotypes = sampler.sample_genotypes(coi, &proposal, depth);
    let log_proposal = genotype_log_pmf(genotypes, coi, &proposal, lookup);
    let log_prior = genotype_log_pmf(genotypes, coi, frequencies, lookup);
    let log_emission = observation_log_likelihoods(observed, genotypes, eps_neg, eps_pos);

    let log_weights = (0..depth)
        .map(|draw| log_emission[draw] + log_prior[draw] - log_proposal[draw])
        .collect::<Vec<_>>();
    log_sum_exp(&log_weights) - usize_to_f64(depth).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_simplex;
    use approx::assert_relative_eq;

    #[test]
    fn reweighting_returns_a_simplex_for_any_observation_pattern() {
        for (frequencies, observed) in [
            (vec![0.5, 0.5], vec![1u8, 0]),
            (vec![1.0, 0.0], vec![0, 0]),
            (vec![0.0, 0.0, 1.0], vec![1, 1, 1]),
            (vec![0.25; 4], vec![0, 1, 0, 1]),
        ] {
            let proposal = reweight_allele_frequencies(&frequencies, &observed, 0.1, 0.05);
            assert!(is_simplex(&proposal, 1.0e-9), "proposal {proposal:?}");
            assert!(proposal.iter().all(|mass| *mass > 0.0));
        }
    }

    #[test]
    fn reweighting_favors_observed_alleles() {
        let proposal = reweight_allele_frequencies(&[0.5, 0.5], &[1, 0], 0.05, 0.01);
        assert!(proposal[0] > proposal[1]);
    }

    #[test]
    fn genotype_log_pmf_matches_closed_form() {
        let lookup = Lookup::with_constant_depth(4, 3, 10).expect("tables build");
        let genotypes = vec![vec![1, 1], vec![2, 0]];
        let log_pmf = genotype_log_pmf(&genotypes, 2, &[0.3, 0.7], &lookup);
        assert_relative_eq!(log_pmf[0], (2.0 * 0.3 * 0.7f64).ln(), epsilon = 1.0e-9);
        assert_relative_eq!(log_pmf[1], (0.3 * 0.3f64).ln(), epsilon = 1.0e-9);
    }

    #[test]
    fn emission_branches_match_error_rate_logs() {
        let eps_neg = 0.1;
        let eps_pos = 0.05;
        let genotypes = vec![vec![2, 0], vec![0, 2]];
        let lliks = observation_log_likelihoods(&[1, 0], &genotypes, eps_neg, eps_pos);
        assert_relative_eq!(
            lliks[0],
            2.0f64.mul_add((1.0 - eps_neg).ln(), (1.0 - eps_pos).ln()),
            epsilon = 1.0e-12
        );
        assert_relative_eq!(
            lliks[1],
            2.0f64.mul_add(eps_neg.ln(), eps_pos.ln()),
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn marginal_estimate_is_close_to_exact_single_strain_sum() {
        let lookup = Lookup::with_constant_depth(4, 2, 5_000).expect("tables build");
        let mut sampler = Sampler::new(31);
        // COI 1 marginal is p0 * P(obs | e0) + p1 * P(obs | e1).
        let exact: f64 = 0.6 * (0.9 * 0.95) + 0.4 * (0.05 * 0.1);
        let estimate = marginal_log_likelihood(
            &[1, 0],
            1,
            &[0.6, 0.4],
            0.1,
            0.05,
            &mut sampler,
            &lookup,
            5_000,
        );
        assert!((estimate - exact.ln()).abs() < 0.06, "estimate {estimate}");
    }

    #[test]
    fn marginal_is_finite_at_depth_one_and_for_all_zero_observations() {
        let lookup = Lookup::with_constant_depth(6, 3, 50).expect("tables build");
        let mut sampler = Sampler::new(37);
        let shallow =
            marginal_log_likelihood(&[0, 1, 0], 3, &[0.2, 0.5, 0.3], 0.1, 0.05, &mut sampler, &lookup, 1);
        assert!(shallow.is_finite());
        let silent =
            marginal_log_likelihood(&[0, 0, 0], 4, &[0.2, 0.5, 0.3], 0.2, 0.05, &mut sampler, &lookup, 50);
        assert!(silent.is_finite());
        assert!(silent < 0.0);
    }

    #[test]
    fn fixed_seed_reproduces_the_estimate() {
        let lookup = Lookup::with_constant_depth(5, 3, 100).expect("tables build");
        let mut first = Sampler::new(41);
        let mut second = Sampler::new(41);
        let args = ([1u8, 1, 0], 3usize, [0.4, 0.4, 0.2], 0.1, 0.02);
        let one = marginal_log_likelihood(
            &args.0, args.1, &args.2, args.3, args.4, &mut first, &lookup, 100,
        );
        let two = marginal_log_likelihood(
            &args.0, args.1, &args.2, args.3, args.4, &mut second, &lookup, 100,
        );
        assert_eq!(one.to_bits(), two.to_bits());
    }
}
