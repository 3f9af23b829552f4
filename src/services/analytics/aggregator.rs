use rayon::prelude::*;
use std::collections::BTreeSet;

use super::sanitizer::{indexed_sample, sample};
use super::types::*;
use super::utils::{mean, percentage};
use crate::models::{cell_at, Cell, Dataset, Row};

#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub date_range: Option<DateRange>,
    pub correlation_mode: CorrelationMode,
}

pub struct MetricAggregator {
    options: AggregateOptions,
}

impl MetricAggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self { options }
    }

    pub fn aggregate(&self, dataset: &Dataset, roles: &RoleMap) -> AnalyticsSummary {
        let start = std::time::Instant::now();
        let (rows, date_filter_applied) =
            filter_by_date(dataset, roles, self.options.date_range.as_ref());

        let nps_name = roles.nps.map(|column| dataset.header(column).to_string());
        let nps = match roles.nps {
            Some(column) => {
                let scores = sample(rows.iter().copied(), column, MetricKind::Nps);
                nps_summary(&scores, nps_name)
            }
            None => nps_summary(&[], None),
        };

        let likert: Vec<LikertSummary> = roles
            .likert
            .par_iter()
            .map(|&column| {
                let values = sample(rows.iter().copied(), column, MetricKind::Likert);
                likert_summary(dataset.header(column), column, &values)
            })
            .collect();

        let correlations = roles
            .likert
            .iter()
            .map(|&column| Correlation {
                column: dataset.header(column).to_string(),
                index: column,
                coefficient: correlation(&rows, roles.nps, column, self.options.correlation_mode),
            })
            .collect();

        tracing::info!(
            "Aggregated {} rows ({} Likert columns, date filter: {}) in {:?}",
            rows.len(),
            likert.len(),
            date_filter_applied,
            start.elapsed()
        );

        AnalyticsSummary {
            rows_considered: rows.len(),
            date_filter_applied,
            nps,
            likert,
            correlations,
        }
    }
}

impl Default for MetricAggregator {
    fn default() -> Self {
        Self::new(AggregateOptions::default())
    }
}

/// Restricts rows to the date range by raw string comparison of the date cell.
///
/// The range only applies when both bounds are set and a date column exists;
/// the flag in the result says whether it did.
pub fn filter_by_date<'a>(
    dataset: &'a Dataset,
    roles: &RoleMap,
    range: Option<&DateRange>,
) -> (Vec<&'a Row>, bool) {
    match (roles.date, range) {
        (Some(column), Some(range)) if range.is_active() => {
            let rows = dataset
                .rows
                .iter()
                .filter(|row| {
                    let cell = cell_at(row, column);
                    !cell.is_unset() && range.contains(&cell.raw_text())
                })
                .collect();
            (rows, true)
        }
        _ => (dataset.rows.iter().collect(), false),
    }
}

/// Scores above 10 are ignored and do not count towards `total`.
pub fn nps_summary(scores: &[u8], column: Option<String>) -> NpsSummary {
    let scores: Vec<u8> = scores.iter().copied().filter(|&s| s <= 10).collect();
    let total = scores.len();
    let mut histogram = [0usize; 11];
    for &score in &scores {
        histogram[score as usize] += 1;
    }

    let detractors: usize = histogram[..=6].iter().sum();
    let passives = histogram[7] + histogram[8];
    let promoters = histogram[9] + histogram[10];
    let share = |count: usize| Figure::fixed(percentage(count, total).unwrap_or(0.0), 2);

    let score = match (percentage(promoters, total), percentage(detractors, total)) {
        (Some(promoter_pct), Some(detractor_pct)) => promoter_pct - detractor_pct,
        _ => 0.0,
    };
    let values: Vec<f64> = scores.iter().map(|&s| s as f64).collect();

    NpsSummary {
        column,
        total,
        histogram,
        detractors,
        passives,
        promoters,
        detractor_pct: share(detractors),
        passive_pct: share(passives),
        promoter_pct: share(promoters),
        score: Figure::fixed(score, 2),
        average: Figure::from_option(mean(&values), 2),
        coarse: CoarseNpsDistribution {
            zero_to_five: histogram[..=5].iter().sum(),
            six_to_ten: histogram[6..].iter().sum(),
        },
    }
}

pub fn likert_summary(column: &str, index: usize, values: &[u8]) -> LikertSummary {
    let total = values.len();
    let count = |pred: fn(u8) -> bool| values.iter().filter(|&&v| pred(v)).count();

    let distribution = LikertDistribution {
        low: count(|v| v <= 2),
        mid: count(|v| v == 3 || v == 4),
        high: count(|v| v == 5),
    };
    let unsatisfied = distribution.low;
    let neutral = count(|v| v == 3);
    let satisfied = count(|v| v >= 4);
    let share = |n: usize| Figure::fixed(percentage(n, total).unwrap_or(0.0), 1);

    let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();

    LikertSummary {
        column: column.to_string(),
        index,
        total,
        average: Figure::from_option(mean(&as_f64), 2),
        distribution,
        satisfaction_pct: share(satisfied),
        sentiment: Sentiment {
            unsatisfied,
            neutral,
            satisfied,
            unsatisfied_pct: share(unsatisfied),
            neutral_pct: share(neutral),
            satisfied_pct: share(satisfied),
        },
    }
}

/// Correlation between the NPS column and one Likert column over `rows`.
pub fn correlation(
    rows: &[&Row],
    nps_column: Option<usize>,
    likert_column: usize,
    mode: CorrelationMode,
) -> Figure {
    let Some(nps_column) = nps_column else {
        return Figure::NotAvailable;
    };

    let (xs, ys): (Vec<f64>, Vec<f64>) = match mode {
        CorrelationMode::Independent => {
            let nps = sample(rows.iter().copied(), nps_column, MetricKind::Nps);
            let likert = sample(rows.iter().copied(), likert_column, MetricKind::Likert);
            if nps.len() != likert.len() {
                tracing::debug!(
                    "Correlation for column {} skipped: {} NPS values vs {} Likert values",
                    likert_column,
                    nps.len(),
                    likert.len()
                );
                return Figure::NotAvailable;
            }
            (
                nps.into_iter().map(f64::from).collect(),
                likert.into_iter().map(f64::from).collect(),
            )
        }
        CorrelationMode::Paired => {
            let likert = indexed_sample(rows.iter().copied(), likert_column, MetricKind::Likert);
            let nps = indexed_sample(rows.iter().copied(), nps_column, MetricKind::Nps);
            pair_by_position(&nps, &likert).into_iter().unzip()
        }
    };

    Figure::from_option(pearson(&xs, &ys), 2)
}

fn pair_by_position(left: &[(usize, u8)], right: &[(usize, u8)]) -> Vec<(f64, f64)> {
    let mut pairs = Vec::new();
    let mut r = right.iter().peekable();
    for &(position, x) in left {
        while r.next_if(|(p, _)| *p < position).is_some() {}
        if let Some(&&(p, y)) = r.peek() {
            if p == position {
                pairs.push((x as f64, y as f64));
            }
        }
    }
    pairs
}

/// Pearson product-moment coefficient. `None` for empty or unequal inputs and
/// when either side has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.is_empty() || xs.len() != ys.len() {
        return None;
    }
    let mean_x = mean(xs)?;
    let mean_y = mean(ys)?;

    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(covariance / (var_x.sqrt() * var_y.sqrt()))
}

/// Distinct non-empty raw values of the date column, sorted.
pub fn unique_dates(dataset: &Dataset, roles: &RoleMap) -> Vec<String> {
    let Some(column) = roles.date else {
        return Vec::new();
    };
    dataset
        .rows
        .iter()
        .map(|row| cell_at(row, column))
        .filter(|cell| !cell.is_unset() && **cell != Cell::Number(0.0))
        .map(|cell| cell.raw_text().into_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
