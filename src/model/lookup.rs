//! Precomputed tables consumed by the likelihood kernel.

use statrs::function::gamma::ln_gamma;

use super::types::MoiError;
use crate::utils::usize_to_f64;

/// Immutable lookup tables for multinomial log-pmf evaluation and
/// importance-sample capping.
///
/// The log-gamma table holds `ln Γ(k)` for `k` in `[0, max_coi + max_alleles + 2]`,
/// which covers every factorial term the kernel touches. The sampling-depth
/// table is a host-supplied cap on importance draws per `(COI, allele count)`
/// pair; small latent supports need fewer draws than the global depth.
#[derive(Debug, Clone)]
pub struct Lookup {
    ln_gamma: Vec<f64>,
    sampling_depth: Vec<Vec<usize>>,
    max_coi: usize,
    max_alleles: usize,
}

impl Lookup {
    /// Build lookup tables for chains with COI up to `max_coi` over loci with
    /// at most `max_alleles` alleles, using a host-supplied depth table
    /// indexed as `sampling_depth[coi][num_alleles]`.
    ///
    /// # Errors
    ///
    /// Returns `MoiError` if the depth table does not cover the requested
    /// ranges or contains a zero cap for a reachable `(COI, alleles)` pair.
    pub fn new(
        max_coi: usize,
        max_alleles: usize,
        sampling_depth: Vec<Vec<usize>>,
    ) -> Result<Self, MoiError> {
        if max_coi == 0 {
            return Err(MoiError::InvalidMaxCoi);
        }
        let table_coi = sampling_depth.len().saturating_sub(1);
        let table_alleles = sampling_depth
            .iter()
            .map(|row| row.len().saturating_sub(1))
            .min()
            .unwrap_or(0);
        if table_coi < max_coi || table_alleles < max_alleles {
            return Err(MoiError::LookupTooSmall {
                table_coi,
                table_alleles,
                needed_coi: max_coi,
                needed_alleles: max_alleles,
            });
        }
        for (coi, row) in sampling_depth.iter().enumerate().skip(1).take(max_coi) {
            for (num_alleles, cap) in row.iter().enumerate().skip(1).take(max_alleles) {
                if *cap == 0 {
                    return Err(MoiError::InvalidSamplingDepthCap { coi, num_alleles });
                }
            }
        }

        let table_len = max_coi + max_alleles + 3;
        let ln_gamma_table = (0..table_len)
            .map(|k| ln_gamma(usize_to_f64(k)))
            .collect();

        Ok(Self {
            ln_gamma: ln_gamma_table,
            sampling_depth,
            max_coi,
            max_alleles,
        })
    }

    /// Build lookup tables with one constant depth cap for every
    /// `(COI, alleles)` pair.
    ///
    /// # Errors
    ///
    /// Returns `MoiError` if `max_coi` or `cap` is zero.
    pub fn with_constant_depth(
        max_coi: usize,
        max_alleles: usize,
        cap: usize,
    ) -> Result<Self, MoiError> {
        if cap == 0 {
            return Err(MoiError::InvalidSamplingDepthCap {
                coi: 1,
                num_alleles: 1,
            });
        }
        let table = vec![vec![cap; max_alleles + 1]; max_coi + 1];
        Self::new(max_coi, max_alleles, table)
    }

    /// `ln Γ(k)`.
    ///
    /// # Panics
    ///
    /// Panics if `k` exceeds the covered range.
    #[must_use]
    pub fn ln_gamma(&self, k: usize) -> f64 {
        self.ln_gamma[k]
    }

    /// Importance-sample cap for one `(COI, allele count)` pair.
    ///
    /// # Panics
    ///
    /// Panics if the pair lies outside the covered range.
    #[must_use]
    pub fn sampling_depth(&self, coi: usize, num_alleles: usize) -> usize {
        self.sampling_depth[coi][num_alleles]
    }

    #[must_use]
    pub const fn max_coi(&self) -> usize {
        self.max_coi
    }

    #[must_use]
    pub const fn max_alleles(&self) -> usize {
        self.max_alleles
    }
}
