//! Stateful RNG façade behind every chain proposal and latent-genotype draw.
//!
//! One seedable engine feeds all distributions; no other component holds
//! randomness, so a fixed seed reproduces a run byte for byte.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::function::gamma::ln_gamma;

use crate::utils::{OVERFLO, floor_to_usize, usize_to_f64};

/// Floor keeping logit transforms finite when a simplex entry is exactly zero.
const LOGIT_EPS: f64 = 1.0e-12;

/// RNG façade owning the engine and the per-COI genotype draw buffers.
///
/// The genotype buffers are memoized per COI and overwritten on each call;
/// the returned borrow ties them to the `Sampler`, so callers cannot retain
/// draws across calls.
#[derive(Debug, Clone)]
pub struct Sampler {
    rng: StdRng,
    genotype_draws: BTreeMap<usize, Vec<Vec<u32>>>,
}

impl Sampler {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            genotype_draws: BTreeMap::new(),
        }
    }

    /// Signed COI jump: `±(G + 1)` with `G ~ Geometric(1 / (1 + prop_mean))`.
    ///
    /// The magnitude is never zero; a degenerate `prop_mean` of zero yields
    /// unit jumps in either direction.
    pub fn sample_coi_delta(&mut self, prop_mean: f64) -> i64 {
        let success = 1.0 / (1.0 + prop_mean.max(0.0));
        let jump = if success < 1.0 {
            let uniform = self.rng.random::<f64>();
            floor_to_usize((1.0 - uniform).max(f64::MIN_POSITIVE).ln() / (1.0 - success).ln())
        } else {
            0
        };
        let magnitude = i64::try_from(jump.saturating_add(1)).unwrap_or(i64::MAX);
        if self.rng.random::<f64>() < 0.5 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Logit-normal proposal on the simplex.
    ///
    /// Log-ratio coordinates against the final (pivot) entry receive
    /// independent `N(0, variance)` noise; the result is renormalized so the
    /// output is a simplex for any valid input.
    pub fn sample_allele_frequencies(&mut self, frequencies: &[f64], variance: f64) -> Vec<f64> {
        let pivot = frequencies[frequencies.len() - 1].max(LOGIT_EPS);
        let sd = variance.sqrt();
        let mut weights = Vec::with_capacity(frequencies.len());
        for frequency in &frequencies[..frequencies.len() - 1] {
            let logit = sd.mul_add(
                sample_standard_normal(&mut self.rng),
                (frequency.max(LOGIT_EPS) / pivot).ln(),
            );
            weights.push(logit.exp().clamp(0.0, OVERFLO));
        }
        weights.push(1.0);
        let total = weights.iter().sum::<f64>();
        for weight in &mut weights {
            *weight /= total;
        }
        weights
    }

    /// Dirichlet proposal centered on the current frequencies with the given
    /// concentration mass.
    pub fn sample_allele_frequencies_dirichlet(
        &mut self,
        frequencies: &[f64],
        concentration: f64,
    ) -> Vec<f64> {
        let shape = frequencies
            .iter()
            .map(|frequency| (concentration * frequency).max(LOGIT_EPS))
            .collect::<Vec<_>>();
        self.sample_dirichlet(&shape)
    }

    /// Draw from `Dirichlet(shape)`.
    pub fn sample_dirichlet(&mut self, shape: &[f64]) -> Vec<f64> {
        let mut draws = shape
            .iter()
            .map(|entry| sample_gamma(&mut self.rng, *entry, 1.0))
            .collect::<Vec<_>>();
        let total = draws.iter().sum::<f64>();
        if total > 0.0 && total.is_finite() {
            for draw in &mut draws {
                *draw /= total;
            }
        } else {
            draws.fill(1.0 / usize_to_f64(shape.len()));
        }
        draws
    }

    /// Scalar logit-normal random walk on `(0, 1)`.
    pub fn sample_epsilon(&mut self, current: f64, variance: f64) -> f64 {
        let logit = variance.sqrt().mul_add(
            sample_standard_normal(&mut self.rng),
            (current / (1.0 - current)).ln(),
        );
        if logit >= 0.0 {
            1.0 / (1.0 + (-logit).exp())
        } else {
            let weight = logit.exp();
            weight / (1.0 + weight)
        }
    }

    /// Draw `depth` genotypes from `Multinomial(coi, frequencies)` as count
    /// vectors, reusing the per-COI buffer.
    pub fn sample_genotypes(
        &mut self,
        coi: usize,
        frequencies: &[f64],
        depth: usize,
    ) -> &[Vec<u32>] {
        let draws = self.genotype_draws.entry(coi).or_default();
        draws.resize_with(depth, Vec::new);
        for draw in draws.iter_mut() {
            draw.clear();
            draw.resize(frequencies.len(), 0);
            for _ in 0..coi {
                draw[sample_category(&mut self.rng, frequencies)] += 1;
            }
        }
        draws
    }

    /// Log of a uniform draw on `(0, 1)` for Metropolis-Hastings acceptance.
    pub fn sample_log_mh_acceptance(&mut self) -> f64 {
        self.rng.random::<f64>().max(f64::MIN_POSITIVE).ln()
    }

    /// `Beta(alpha, beta)` log-density, for host-side error-rate priors.
    #[must_use]
    pub fn epsilon_log_prior(&self, value: f64, alpha: f64, beta: f64) -> f64 {
        if !(value > 0.0 && value < 1.0 && alpha > 0.0 && beta > 0.0) {
            return f64::NEG_INFINITY;
        }
        (alpha - 1.0).mul_add(value.ln(), (beta - 1.0) * (1.0 - value).ln())
            + ln_gamma(alpha + beta)
            - ln_gamma(alpha)
            - ln_gamma(beta)
    }

    /// `Poisson(mean)` log-pmf at `coi`, for host-side COI priors.
    #[must_use]
    pub fn coi_log_prior(&self, coi: usize, mean: f64) -> f64 {
        if mean <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let count = usize_to_f64(coi);
        count.mul_add(mean.ln(), -mean) - ln_gamma(count + 1.0)
    }
}

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }

    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let shape_minus_third = shape - (1.0 / 3.0);
    let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
    loop {
        let standard_normal = sample_standard_normal(rng);
        let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
        if one_plus_coeff_noise <= 0.0 {
            continue;
        }
        let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
        let uniform = rng.random::<f64>();
        if uniform
            < (0.0331 * standard_normal * standard_normal * standard_normal)
                .mul_add(-standard_normal, 1.0)
        {
            return scale * shape_minus_third * cubic_term;
        }
        if uniform.ln()
            < (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            )
        {
            return scale * shape_minus_third * cubic_term;
        }
    }
}

fn sample_category(rng: &mut StdRng, frequencies: &[f64]) -> usize {
    let uniform = rng.random::<f64>();
    let mut cumulative = 0.0;
    for (index, weight) in frequencies.iter().enumerate() {
        cumulative += weight;
        if uniform < cumulative {
            return index;
        }
    }
    frequencies.len() - 1
}
