//! Posterior trace storage and summaries.

use comfy_table::{
    Attribute, Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};
use num_traits::ToPrimitive;

use crate::utils::usize_to_f64;

/// A single retained draw of the joint chain state.
#[derive(Debug, Clone)]
pub struct PosteriorDraw {
    /// COI per sample.
    pub m: Vec<usize>,
    /// Allele-frequency simplex per locus.
    pub allele_frequencies: Vec<Vec<f64>>,
    pub eps_pos: f64,
    pub eps_neg: f64,
    /// Total cached log-likelihood at the draw.
    pub log_likelihood: f64,
}

/// Posterior draw collection.
#[derive(Debug, Clone, Default)]
pub struct PosteriorSamples {
    pub draws: Vec<PosteriorDraw>,
}

impl PosteriorSamples {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.draws.len()
    }
}

/// Scalar posterior summary statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
}

/// Posterior summary for every tracked chain dimension.
#[derive(Debug, Clone, Default)]
pub struct PosteriorSummary {
    /// Per-sample COI summaries.
    pub m: Vec<ParameterSummary>,
    /// Per-locus, per-allele frequency summaries.
    pub allele_frequencies: Vec<Vec<ParameterSummary>>,
    pub eps_pos: ParameterSummary,
    pub eps_neg: ParameterSummary,
    pub log_likelihood: ParameterSummary,
    pub draw_count: usize,
}

/// Compute posterior summaries for all stored chain dimensions.
#[must_use]
pub fn summarize_posterior(samples: &PosteriorSamples) -> PosteriorSummary {
    let draw_count = samples.len();
    let Some(first) = samples.draws.first() else {
        return PosteriorSummary::default();
    };

    let m = (0..first.m.len())
        .map(|sample| {
            let values: Vec<f64> = samples
                .draws
                .iter()
                .map(|draw| usize_to_f64(draw.m[sample]))
                .collect();
            summarize_scalar(&values)
        })
        .collect();

    let allele_frequencies = (0..first.allele_frequencies.len())
        .map(|locus| {
            (0..first.allele_frequencies[locus].len())
                .map(|allele| {
                    let values: Vec<f64> = samples
                        .draws
                        .iter()
                        .map(|draw| draw.allele_frequencies[locus][allele])
                        .collect();
                    summarize_scalar(&values)
                })
                .collect()
        })
        .collect();

    let eps_pos_values: Vec<f64> = samples.draws.iter().map(|draw| draw.eps_pos).collect();
    let eps_neg_values: Vec<f64> = samples.draws.iter().map(|draw| draw.eps_neg).collect();
    let log_likelihood_values: Vec<f64> = samples
        .draws
        .iter()
        .map(|draw| draw.log_likelihood)
        .collect();

    PosteriorSummary {
        m,
        allele_frequencies,
        eps_pos: summarize_scalar(&eps_pos_values),
        eps_neg: summarize_scalar(&eps_neg_values),
        log_likelihood: summarize_scalar(&log_likelihood_values),
        draw_count,
    }
}

#[must_use]
fn summarize_scalar(values: &[f64]) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let n = usize_to_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n.max(1.0);

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    ParameterSummary {
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
    }
}

#[must_use]
fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }

    let clamped = probability.clamp(0.0, 1.0);
    let last = sorted_values.len() - 1;
    let position = clamped * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(last);

    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}

/// Rendered posterior summary tables.
#[derive(Debug)]
pub struct PosteriorTables {
    /// One row per sample: COI summaries.
    pub sample_coi: Table,
    /// Error rates and total log-likelihood.
    pub error_rates: Table,
    /// One table per locus, one row per allele.
    pub allele_frequencies: Vec<Table>,
}

/// Render a posterior summary to formatted tables using `comfy_table`.
#[must_use]
pub fn render_posterior_tables(summary: &PosteriorSummary) -> PosteriorTables {
    let mut sample_coi = make_table(&["sample", "mean", "sd", "q2.5", "median", "q97.5"]);
    for (sample, coi) in summary.m.iter().enumerate() {
        add_summary_row(&mut sample_coi, &sample.to_string(), *coi);
    }

    let mut error_rates = make_table(&["parameter", "mean", "sd", "q2.5", "median", "q97.5"]);
    add_summary_row(&mut error_rates, "eps_pos", summary.eps_pos);
    add_summary_row(&mut error_rates, "eps_neg", summary.eps_neg);
    add_summary_row(&mut error_rates, "log_likelihood", summary.log_likelihood);

    let allele_frequencies = summary
        .allele_frequencies
        .iter()
        .map(|locus_summaries| {
            let mut table = make_table(&["allele", "mean", "sd", "q2.5", "median", "q97.5"]);
            for (allele, frequency) in locus_summaries.iter().enumerate() {
                add_summary_row(&mut table, &allele.to_string(), *frequency);
            }
            table
        })
        .collect();

    PosteriorTables {
        sample_coi,
        error_rates,
        allele_frequencies,
    }
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|header| Cell::new(header).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn add_summary_row(table: &mut Table, label: &str, summary: ParameterSummary) {
    table.add_row(vec![
        Cell::new(label),
        Cell::new(format!("{:.4}", summary.mean)),
        Cell::new(format!("{:.4}", summary.std_dev)),
        Cell::new(format!("{:.4}", summary.q025)),
        Cell::new(format!("{:.4}", summary.q50)),
        Cell::new(format!("{:.4}", summary.q975)),
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_draws() -> PosteriorSamples {
        PosteriorSamples {
            draws: vec![
                PosteriorDraw {
                    m: vec![1, 2],
                    allele_frequencies: vec![vec![0.6, 0.4]],
                    eps_pos: 0.02,
                    eps_neg: 0.10,
                    log_likelihood: -12.0,
                },
                PosteriorDraw {
                    m: vec![3, 2],
                    allele_frequencies: vec![vec![0.4, 0.6]],
                    eps_pos: 0.04,
                    eps_neg: 0.20,
                    log_likelihood: -10.0,
                },
            ],
        }
    }

    #[test]
    fn summarize_empty_samples() {
        let summary = summarize_posterior(&PosteriorSamples::default());
        assert_eq!(summary.draw_count, 0);
        assert!(summary.m.is_empty());
        assert!(summary.allele_frequencies.is_empty());
    }

    #[test]
    fn summarize_non_empty_samples() {
        let summary = summarize_posterior(&two_draws());
        assert_eq!(summary.draw_count, 2);
        assert_eq!(summary.m.len(), 2);
        assert!((summary.m[0].mean - 2.0).abs() < 1.0e-12);
        assert!((summary.m[1].std_dev).abs() < 1.0e-12);
        assert!((summary.allele_frequencies[0][0].mean - 0.5).abs() < 1.0e-12);
        assert!((summary.eps_neg.mean - 0.15).abs() < 1.0e-12);
        assert!((summary.log_likelihood.q50 + 11.0).abs() < 1.0e-12);
    }

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&sorted, 0.5) - 2.5).abs() < 1.0e-12);
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1.0e-12);
        assert!((percentile(&sorted, 1.0) - 4.0).abs() < 1.0e-12);
    }

    #[test]
    fn rendered_tables_cover_every_dimension() {
        let summary = summarize_posterior(&two_draws());
        let tables = render_posterior_tables(&summary);
        assert_eq!(tables.allele_frequencies.len(), 1);
        let rendered = tables.sample_coi.to_string();
        assert!(rendered.contains("mean"));
        let rates = tables.error_rates.to_string();
        assert!(rates.contains("eps_pos"));
        assert!(rates.contains("eps_neg"));
    }
}
