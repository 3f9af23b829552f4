use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::ClassifiedRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

/// Label counts across classified rows, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CategorySummary {
    entries: Vec<CategoryCount>,
}

impl CategorySummary {
    pub fn from_rows(rows: &[ClassifiedRow]) -> Self {
        let mut entries: Vec<CategoryCount> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for category in rows.iter().flat_map(|row| row.categories.iter()) {
            match positions.get(category.as_str()) {
                Some(&position) => entries[position].count += 1,
                None => {
                    positions.insert(category.as_str(), entries.len());
                    entries.push(CategoryCount {
                        name: category.clone(),
                        count: 1,
                    });
                }
            }
        }

        Self { entries }
    }

    pub fn count(&self, name: &str) -> usize {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map_or(0, |entry| entry.count)
    }

    /// Number of (row, category) pairs.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|entry| entry.count).sum()
    }

    pub fn entries(&self) -> &[CategoryCount] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sorted(&self, key: SummarySortKey, direction: SortDirection) -> Vec<CategoryCount> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| {
            let ordering = match key {
                SummarySortKey::Count => a.count.cmp(&b.count),
                SummarySortKey::Name => compare_case_insensitive(&a.name, &b.name),
            };
            direction.apply(ordering)
        });
        sorted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSortKey {
    #[default]
    Text,
    Categories,
    Confidence,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySortKey {
    #[default]
    Count,
    Name,
}

pub fn aggregate(rows: &[ClassifiedRow]) -> CategorySummary {
    CategorySummary::from_rows(rows)
}

/// Rows carrying `category`, or every row when no category is selected.
pub fn filter_by_category<'a>(
    rows: &'a [ClassifiedRow],
    category: Option<&str>,
) -> Vec<&'a ClassifiedRow> {
    match category {
        Some(category) => rows
            .iter()
            .filter(|row| row.categories.iter().any(|c| c == category))
            .collect(),
        None => rows.iter().collect(),
    }
}

/// Stable sort; rows with equal keys keep their relative order.
pub fn sort_rows(rows: &mut [&ClassifiedRow], key: RowSortKey, direction: SortDirection) {
    match key {
        RowSortKey::Confidence => {
            rows.sort_by(|a, b| direction.apply(a.confidence.cmp(&b.confidence)))
        }
        RowSortKey::Text => rows.sort_by(|a, b| {
            direction.apply(a.text.to_lowercase().cmp(&b.text.to_lowercase()))
        }),
        RowSortKey::Categories => {
            rows.sort_by(|a, b| direction.apply(categories_key(a).cmp(&categories_key(b))))
        }
    }
}

/// Filtered and sorted view over the classification results.
pub fn view<'a>(
    rows: &'a [ClassifiedRow],
    category: Option<&str>,
    key: RowSortKey,
    direction: SortDirection,
) -> Vec<&'a ClassifiedRow> {
    let mut selected = filter_by_category(rows, category);
    sort_rows(&mut selected, key, direction);
    selected
}

fn categories_key(row: &ClassifiedRow) -> String {
    row.categories.join(",").to_lowercase()
}

fn compare_case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(text: &str, categories: &[&str], confidence: u8) -> ClassifiedRow {
        ClassifiedRow {
            source_row: 0,
            text: text.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            confidence,
            language: None,
        }
    }

    fn texts(rows: &[&ClassifiedRow]) -> Vec<String> {
        rows.iter().map(|r| r.text.clone()).collect()
    }

    #[test]
    fn counts_every_label_of_every_row() {
        let rows = vec![
            row("a", &["Delay", "Payment"], 90),
            row("b", &[], 50),
            row("c", &["Delay"], 85),
        ];
        let summary = aggregate(&rows);
        assert_eq!(summary.count("Delay"), 2);
        assert_eq!(summary.count("Payment"), 1);
        assert_eq!(summary.count("Operation"), 0);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.entries()[0].name, "Delay");
    }

    #[test]
    fn filter_matches_exact_labels() {
        let rows = vec![
            row("a", &["Delay"], 90),
            row("b", &["delay"], 90),
            row("c", &["Delay", "Payment"], 90),
        ];
        assert_eq!(texts(&filter_by_category(&rows, Some("Delay"))), vec!["a", "c"]);
        assert_eq!(filter_by_category(&rows, None).len(), 3);
    }

    #[test]
    fn text_sort_ignores_case_and_keeps_ties_stable() {
        let rows = vec![
            row("beta", &[], 50),
            row("Alpha", &["x"], 90),
            row("alpha", &["y"], 80),
        ];
        let asc = view(&rows, None, RowSortKey::Text, SortDirection::Asc);
        assert_eq!(texts(&asc), vec!["Alpha", "alpha", "beta"]);

        let desc = view(&rows, None, RowSortKey::Text, SortDirection::Desc);
        assert_eq!(texts(&desc), vec!["beta", "Alpha", "alpha"]);
    }

    #[test]
    fn confidence_sort_is_numeric() {
        let rows = vec![row("a", &[], 9), row("b", &[], 80), row("c", &[], 45), row("d", &[], 80)];
        let desc = view(&rows, None, RowSortKey::Confidence, SortDirection::Desc);
        assert_eq!(texts(&desc), vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn categories_sort_uses_joined_labels() {
        let rows = vec![
            row("a", &["Payment"], 90),
            row("b", &["Delay", "Payment"], 90),
            row("c", &[], 50),
        ];
        let asc = view(&rows, None, RowSortKey::Categories, SortDirection::Asc);
        assert_eq!(texts(&asc), vec!["c", "b", "a"]);
    }

    #[test]
    fn summary_sorting_by_count_and_name() {
        let rows = vec![
            row("a", &["payment"], 90),
            row("b", &["Delay", "payment"], 90),
            row("c", &["Courier"], 90),
        ];
        let summary = aggregate(&rows);
        let by_count = summary.sorted(SummarySortKey::Count, SortDirection::Desc);
        assert_eq!(by_count[0].name, "payment");
        assert_eq!(by_count[1].name, "Delay");

        let by_name = summary.sorted(SummarySortKey::Name, SortDirection::Asc);
        let names: Vec<_> = by_name.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Courier", "Delay", "payment"]);
    }
}
