use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use smallvec::SmallVec;

use super::types::RoleMap;
use crate::models::{cell_at, Dataset, Row};

static NPS_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)nps").expect("NPS header pattern compiles"));

const LIKERT_VALUES: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// When set, a column with no values at all is not treated as a Likert column.
    pub likert_requires_values: bool,
}

pub struct ColumnRoleResolver {
    options: ResolveOptions,
}

impl ColumnRoleResolver {
    pub fn new(options: ResolveOptions) -> Self {
        Self { options }
    }

    pub fn resolve_dataset(&self, dataset: &Dataset) -> RoleMap {
        self.resolve(&dataset.headers, &dataset.rows)
    }

    pub fn resolve(&self, headers: &[String], rows: &[Row]) -> RoleMap {
        let start = std::time::Instant::now();

        let nps = headers.iter().position(|header| is_nps_header(header));
        let date = headers.iter().position(|header| is_date_header(header));

        let likert: SmallVec<[usize; 8]> = (0..headers.len())
            .into_par_iter()
            .filter(|&column| Some(column) != nps)
            .filter(|&column| self.is_likert_column(rows, column))
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        tracing::debug!(
            "Resolved roles for {} columns in {:?}: nps={:?}, date={:?}, likert={:?}",
            headers.len(),
            start.elapsed(),
            nps.map(|i| &headers[i]),
            date.map(|i| &headers[i]),
            likert.iter().map(|&i| &headers[i]).collect::<Vec<_>>()
        );

        RoleMap {
            columns: headers.len(),
            nps,
            date,
            likert,
            feedback: None,
        }
    }

    fn is_likert_column(&self, rows: &[Row], column: usize) -> bool {
        let mut seen = 0usize;
        for cell in rows.iter().map(|row| cell_at(row, column)) {
            if cell.is_unset() {
                continue;
            }
            seen += 1;
            match cell.to_number() {
                Some(value) if LIKERT_VALUES.contains(&value) => {}
                _ => return false,
            }
        }
        seen > 0 || !self.options.likert_requires_values
    }
}

impl Default for ColumnRoleResolver {
    fn default() -> Self {
        Self::new(ResolveOptions::default())
    }
}

pub fn is_nps_header(header: &str) -> bool {
    NPS_HEADER.is_match(header)
}

pub fn is_date_header(header: &str) -> bool {
    header.to_lowercase().contains("date")
}
