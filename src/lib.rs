#![forbid(unsafe_code)]

//! # `moi_inference`
//!
//! Bayesian inference of multiplicity of infection (MOI, also complexity of
//! infection) and per-locus allele frequencies from presence/absence
//! genotyping data, jointly with false-positive and false-negative call
//! rates.
//!
//! The engine is a single-threaded adaptive Metropolis-Hastings sampler. The
//! marginal likelihood of each `(locus, sample)` observation is estimated by
//! importance sampling over latent multilocus genotypes, with the proposal
//! reweighted toward the observed presence calls. Hosts drive a [`Chain`]
//! step by step, or use the [`fit_chain`] / [`fit_replicated_chains`] entry
//! points to collect and summarize a posterior trace in memory.

pub mod inference;
pub mod input;
pub mod model;
pub mod utils;

pub use inference::{ACCEPTANCE_TARGET, InferenceError, McmcConfig, adaptation_step};
pub use input::{GenotypingData, InputError};

pub use model::{
    AcceptanceRates, Chain, ChainDiagnostics, FitReport, Lookup, MoiError, ParameterSummary,
    Parameters, PosteriorDraw, PosteriorSamples, PosteriorSummary, PosteriorTables,
    ReplicateOptions, ReplicatedReport, Sampler, fit_chain, fit_replicated_chains,
    marginal_log_likelihood, render_posterior_tables, reweight_allele_frequencies,
    summarize_posterior,
};
