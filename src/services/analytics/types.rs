use serde::{Deserialize, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use super::utils::round_to;

/// A rounded statistic as it is shown to users: a fixed number of decimals,
/// or `N/A` when the inputs did not allow computing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Figure {
    Fixed { value: f64, places: usize },
    NotAvailable,
}

impl Figure {
    pub fn fixed(value: f64, places: usize) -> Self {
        Figure::Fixed {
            value: round_to(value, places),
            places,
        }
    }

    pub fn from_option(value: Option<f64>, places: usize) -> Self {
        value.map_or(Figure::NotAvailable, |v| Figure::fixed(v, places))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Figure::Fixed { value, .. } => Some(*value),
            Figure::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Figure::Fixed { .. })
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Figure::Fixed { value, places } => write!(f, "{:.*}", places, value),
            Figure::NotAvailable => write!(f, "N/A"),
        }
    }
}

impl Serialize for Figure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Nps,
    Likert,
    Date,
    Feedback,
    Unclassified,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleMap {
    pub columns: usize,
    pub nps: Option<usize>,
    pub date: Option<usize>,
    pub likert: SmallVec<[usize; 8]>,
    pub feedback: Option<usize>,
}

impl RoleMap {
    pub fn with_feedback(mut self, column: Option<usize>) -> Self {
        self.feedback = column;
        self
    }

    /// A column can qualify for several roles; the most specific one wins.
    pub fn role_of(&self, column: usize) -> ColumnRole {
        if self.nps == Some(column) {
            ColumnRole::Nps
        } else if self.date == Some(column) {
            ColumnRole::Date
        } else if self.feedback == Some(column) {
            ColumnRole::Feedback
        } else if self.likert.contains(&column) {
            ColumnRole::Likert
        } else {
            ColumnRole::Unclassified
        }
    }

    pub fn roles(&self) -> Vec<ColumnRole> {
        (0..self.columns).map(|column| self.role_of(column)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Nps,
    Likert,
}

impl MetricKind {
    pub fn range(self) -> RangeInclusive<i64> {
        match self {
            MetricKind::Nps => 0..=10,
            MetricKind::Likert => 1..=5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMode {
    /// Each column is sanitized on its own; samples of different length give `N/A`.
    #[default]
    Independent,
    /// Only rows valid for both columns are paired up.
    Paired,
}

impl FromStr for CorrelationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "independent" => Ok(CorrelationMode::Independent),
            "paired" => Ok(CorrelationMode::Paired),
            other => Err(format!("unknown correlation mode '{}'", other)),
        }
    }
}

/// Inclusive bounds compared against the raw text of the date column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Both bounds must be filled in for the filter to apply.
    pub fn is_active(&self) -> bool {
        !self.start.is_empty() && !self.end.is_empty()
    }

    pub fn contains(&self, raw: &str) -> bool {
        raw >= self.start.as_str() && raw <= self.end.as_str()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoarseNpsDistribution {
    #[serde(rename = "0-5")]
    pub zero_to_five: usize,
    #[serde(rename = "6-10")]
    pub six_to_ten: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NpsSummary {
    pub column: Option<String>,
    pub total: usize,
    pub histogram: [usize; 11],
    pub detractors: usize,
    pub passives: usize,
    pub promoters: usize,
    pub detractor_pct: Figure,
    pub passive_pct: Figure,
    pub promoter_pct: Figure,
    pub score: Figure,
    pub average: Figure,
    pub coarse: CoarseNpsDistribution,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikertDistribution {
    /// Ratings 1-2.
    pub low: usize,
    /// Ratings 3-4.
    pub mid: usize,
    /// Rating 5.
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sentiment {
    pub unsatisfied: usize,
    pub neutral: usize,
    pub satisfied: usize,
    pub unsatisfied_pct: Figure,
    pub neutral_pct: Figure,
    pub satisfied_pct: Figure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikertSummary {
    pub column: String,
    pub index: usize,
    pub total: usize,
    pub average: Figure,
    pub distribution: LikertDistribution,
    pub satisfaction_pct: Figure,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub column: String,
    pub index: usize,
    pub coefficient: Figure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub rows_considered: usize,
    pub date_filter_applied: bool,
    pub nps: NpsSummary,
    pub likert: Vec<LikertSummary>,
    pub correlations: Vec<Correlation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn figure_formats_fixed_and_missing_values() {
        assert_eq!(Figure::fixed(16.666_666, 2).to_string(), "16.67");
        assert_eq!(Figure::fixed(0.0, 2).to_string(), "0.00");
        assert_eq!(Figure::fixed(60.0, 1).to_string(), "60.0");
        assert_eq!(Figure::NotAvailable.to_string(), "N/A");
        assert_eq!(Figure::from_option(None, 2), Figure::NotAvailable);
    }

    #[test]
    fn figure_serializes_as_display_text() {
        let json = serde_json::to_string(&Figure::fixed(3.8, 2)).unwrap();
        assert_eq!(json, "\"3.80\"");
    }

    #[test]
    fn role_precedence_prefers_nps_then_date() {
        let roles = RoleMap {
            columns: 4,
            nps: Some(0),
            date: Some(1),
            likert: SmallVec::from_slice(&[1, 2]),
            feedback: Some(3),
        };
        assert_eq!(
            roles.roles(),
            vec![
                ColumnRole::Nps,
                ColumnRole::Date,
                ColumnRole::Likert,
                ColumnRole::Feedback
            ]
        );
    }

    #[test]
    fn date_range_needs_both_bounds() {
        assert!(!DateRange::new("2024-01-01", "").is_active());
        let range = DateRange::new("2024-01-01", "2024-01-31");
        assert!(range.is_active());
        assert!(range.contains("2024-01-15"));
        assert!(!range.contains("2024-02-01"));
    }

    #[test]
    fn correlation_mode_parses_case_insensitively() {
        assert_eq!("Paired".parse::<CorrelationMode>(), Ok(CorrelationMode::Paired));
        assert!("joint".parse::<CorrelationMode>().is_err());
    }
}
