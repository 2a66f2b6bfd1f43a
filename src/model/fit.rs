//! Entry points running chains to completion under an MCMC schedule.

use super::chain::Chain;
use super::lookup::Lookup;
use super::posterior::{PosteriorDraw, PosteriorSamples, summarize_posterior};
use super::types::{
    ChainDiagnostics, FitReport, MoiError, Parameters, ReplicateOptions, ReplicatedReport,
};
use crate::inference::McmcConfig;
use crate::input::GenotypingData;

/// Run one chain and collect the retained posterior trace.
///
/// Iterations are one-based; draws are retained after `burn_in` at every
/// `thin`-th iteration. The chain RNG is seeded from `schedule.seed`, so a
/// fixed schedule reproduces the trace byte for byte.
///
/// # Errors
///
/// Returns `MoiError` if the schedule, parameters, observations, or lookup
/// tables are invalid.
pub fn fit_chain(
    data: &GenotypingData,
    lookup: &Lookup,
    params: Parameters,
    schedule: McmcConfig,
) -> Result<(FitReport, PosteriorSamples), MoiError> {
    schedule.validate()?;
    let mut chain = Chain::new(data.clone(), lookup.clone(), params, schedule.seed)?;

    let mut draws = Vec::with_capacity(schedule.retained_draws());
    for iteration in 1..=schedule.iterations {
        chain.step(iteration);
        if iteration > schedule.burn_in && (iteration - schedule.burn_in).is_multiple_of(schedule.thin)
        {
            draws.push(PosteriorDraw {
                m: chain.m().to_vec(),
                allele_frequencies: chain.allele_frequencies().to_vec(),
                eps_pos: chain.eps_pos(),
                eps_neg: chain.eps_neg(),
                log_likelihood: chain.log_likelihood(),
            });
        }
    }

    let samples = PosteriorSamples { draws };
    let posterior_summary = if samples.is_empty() {
        None
    } else {
        Some(summarize_posterior(&samples))
    };
    let report = FitReport {
        diagnostics: ChainDiagnostics {
            iterations_completed: schedule.iterations,
            retained_draws: samples.len(),
            acceptance_rates: Some(chain.acceptance_rates(schedule.iterations)),
        },
        posterior_summary,
    };
    Ok((report, samples))
}

/// Run independent replicate chains and pool their draws.
///
/// Chain `i` is seeded with `schedule.seed + i * seed_stride` (wrapping) and
/// runs on its own scoped thread with its own RNG and state; replicates never
/// share mutable state.
///
/// # Errors
///
/// Returns `MoiError` if replicate options or any chain input is invalid, or
/// if a chain worker terminates abnormally.
pub fn fit_replicated_chains(
    data: &GenotypingData,
    lookup: &Lookup,
    params: Parameters,
    schedule: McmcConfig,
    replicates: ReplicateOptions,
) -> Result<(ReplicatedReport, Vec<PosteriorSamples>), MoiError> {
    replicates.validate()?;
    schedule.validate()?;

    let mut results = (0..replicates.chains)
        .map(|_| None)
        .collect::<Vec<Option<Result<(FitReport, PosteriorSamples), MoiError>>>>();

    std::thread::scope(|scope| -> Result<(), MoiError> {
        let mut handles = Vec::with_capacity(replicates.chains);
        for chain_index in 0..replicates.chains {
            let index_u64 = u64::try_from(chain_index).unwrap_or(u64::MAX);
            let chain_schedule = McmcConfig {
                seed: schedule
                    .seed
                    .wrapping_add(index_u64.wrapping_mul(replicates.seed_stride)),
                ..schedule
            };
            handles.push((
                chain_index,
                scope.spawn(move || fit_chain(data, lookup, params, chain_schedule)),
            ));
        }

        for (chain_index, handle) in handles {
            let result = handle.join().map_err(|_| MoiError::ChainFailed)?;
            results[chain_index] = Some(result);
        }

        Ok(())
    })?;

    let mut chain_reports = Vec::with_capacity(replicates.chains);
    let mut chain_samples = Vec::with_capacity(replicates.chains);
    for result in results {
        let (report, samples) = result.ok_or(MoiError::ChainFailed)??;
        chain_reports.push(report);
        chain_samples.push(samples);
    }

    let pooled = combine_posteriors(&chain_samples);
    let pooled_posterior_summary = if pooled.is_empty() {
        None
    } else {
        Some(summarize_posterior(&pooled))
    };

    Ok((
        ReplicatedReport {
            chain_reports,
            pooled_posterior_summary,
        },
        chain_samples,
    ))
}

fn combine_posteriors(chains: &[PosteriorSamples]) -> PosteriorSamples {
    let total_draws = chains.iter().map(PosteriorSamples::len).sum();
    let mut draws = Vec::with_capacity(total_draws);
    for chain in chains {
        draws.extend(chain.draws.iter().cloned());
    }
    PosteriorSamples { draws }
}
