//! Joint MOI / allele-frequency model: chain, likelihood kernel, and
//! supporting tables.

pub mod chain;
pub mod fit;
pub mod likelihood;
pub mod lookup;
pub mod posterior;
pub mod sampler;
pub mod types;

pub use chain::Chain;
pub use fit::{fit_chain, fit_replicated_chains};
pub use likelihood::{marginal_log_likelihood, reweight_allele_frequencies};
pub use lookup::Lookup;
pub use posterior::{
    ParameterSummary, PosteriorDraw, PosteriorSamples, PosteriorSummary, PosteriorTables,
    render_posterior_tables, summarize_posterior,
};
pub use sampler::Sampler;
pub use types::{
    AcceptanceRates, ChainDiagnostics, FitReport, MoiError, Parameters, ReplicateOptions,
    ReplicatedReport,
};
