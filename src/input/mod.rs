//! # Genotyping inputs
//!
//! Defines the immutable container for presence/absence genotyping
//! observations consumed by the MCMC chain.
//!
//! # Examples
//!
//! ```
//! use moi_inference::GenotypingData;
//!
//! // Two loci, two samples. Locus 0 has two alleles, locus 1 has three.
//! let observed_alleles = vec![
//!     vec![vec![1, 0], vec![1, 1]],
//!     vec![vec![0, 1, 0], vec![1, 0, 1]],
//! ];
//! let data = GenotypingData::new(observed_alleles, vec![1, 2]).unwrap();
//!
//! assert_eq!(data.num_loci(), 2);
//! assert_eq!(data.num_samples(), 2);
//! assert_eq!(data.num_alleles(), &[2, 3]);
//! ```

use thiserror::Error;

/// Errors returned when validating genotyping observations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("at least one locus is required")]
    NoLoci,
    #[error("at least one sample is required")]
    NoSamples,
    #[error("locus {locus} must define at least one allele")]
    NoAlleles { locus: usize },
    #[error("locus {locus} has {found} sample rows; expected {expected}")]
    JaggedSamples {
        locus: usize,
        expected: usize,
        found: usize,
    },
    #[error("locus {locus}, sample {sample} has {found} allele calls; expected {expected}")]
    JaggedAlleleCalls {
        locus: usize,
        sample: usize,
        expected: usize,
        found: usize,
    },
    #[error("locus {locus}, sample {sample} contains a presence call other than 0 or 1")]
    InvalidPresenceCall { locus: usize, sample: usize },
    #[error("observed COI length ({found}) must match sample count ({expected})")]
    ObservedCoiLengthMismatch { expected: usize, found: usize },
    #[error("observed COI for sample {sample} must be at least 1")]
    InvalidObservedCoi { sample: usize },
}

/// Presence/absence genotyping observations for a panel of samples.
///
/// `observed_alleles[locus][sample]` is a 0/1 vector over the locus alleles.
/// An all-zero row (no allele called) is a legal observation. The container
/// is immutable for the life of a chain.
#[derive(Debug, Clone)]
pub struct GenotypingData {
    num_loci: usize,
    num_samples: usize,
    num_alleles: Vec<usize>,
    observed_alleles: Vec<Vec<Vec<u8>>>,
    observed_coi: Vec<usize>,
}

impl GenotypingData {
    /// Build and validate an observation container.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the observation matrix is empty, jagged,
    /// contains calls other than 0/1, or if `observed_coi` does not provide
    /// a positive starting COI per sample.
    pub fn new(
        observed_alleles: Vec<Vec<Vec<u8>>>,
        observed_coi: Vec<usize>,
    ) -> Result<Self, InputError> {
        let num_loci = observed_alleles.len();
        if num_loci == 0 {
            return Err(InputError::NoLoci);
        }
        let num_samples = observed_alleles[0].len();
        if num_samples == 0 {
            return Err(InputError::NoSamples);
        }

        let mut num_alleles = Vec::with_capacity(num_loci);
        for (locus, locus_rows) in observed_alleles.iter().enumerate() {
            if locus_rows.len() != num_samples {
                return Err(InputError::JaggedSamples {
                    locus,
                    expected: num_samples,
                    found: locus_rows.len(),
                });
            }
            let allele_count = locus_rows[0].len();
            if allele_count == 0 {
                return Err(InputError::NoAlleles { locus });
            }
            for (sample, calls) in locus_rows.iter().enumerate() {
                if calls.len() != allele_count {
                    return Err(InputError::JaggedAlleleCalls {
                        locus,
                        sample,
                        expected: allele_count,
                        found: calls.len(),
                    });
                }
                if calls.iter().any(|call| *call > 1) {
                    return Err(InputError::InvalidPresenceCall { locus, sample });
                }
            }
            num_alleles.push(allele_count);
        }

        if observed_coi.len() != num_samples {
            return Err(InputError::ObservedCoiLengthMismatch {
                expected: num_samples,
                found: observed_coi.len(),
            });
        }
        if let Some(sample) = observed_coi.iter().position(|coi| *coi == 0) {
            return Err(InputError::InvalidObservedCoi { sample });
        }

        Ok(Self {
            num_loci,
            num_samples,
            num_alleles,
            observed_alleles,
            observed_coi,
        })
    }

    #[must_use]
    pub const fn num_loci(&self) -> usize {
        self.num_loci
    }

    #[must_use]
    pub const fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Allele count per locus.
    #[must_use]
    pub fn num_alleles(&self) -> &[usize] {
        &self.num_alleles
    }

    /// Largest allele count over all loci.
    #[must_use]
    pub fn max_alleles(&self) -> usize {
        self.num_alleles.iter().copied().max().unwrap_or(0)
    }

    /// Presence calls for one (locus, sample) cell.
    #[must_use]
    pub fn observed(&self, locus: usize, sample: usize) -> &[u8] {
        &self.observed_alleles[locus][sample]
    }

    /// Data-driven starting COI per sample.
    #[must_use]
    pub fn observed_coi(&self) -> &[usize] {
        &self.observed_coi
    }
}
