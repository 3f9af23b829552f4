use serde::Serialize;
use std::borrow::Cow;

use crate::services::analytics::utils::parse_js_number;

/// A single spreadsheet cell as it arrived from the source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

pub type Row = Vec<Cell>;

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// True when the cell holds nothing at all: no value, or a zero-length string.
    /// Whitespace-only text is *not* unset.
    pub fn is_unset(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// True when the cell is unset or only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// The raw textual form used for display, date comparison and exports.
    pub fn raw_text(&self) -> Cow<'_, str> {
        match self {
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Number(n) if *n == 0.0 => Cow::Borrowed("0"),
            Cell::Number(n) => Cow::Owned(n.to_string()),
            Cell::Empty => Cow::Borrowed(""),
        }
    }

    /// Numeric coercion of a set cell. Text is parsed with spreadsheet-style
    /// leniency (surrounding whitespace, hex literals, `Infinity`); blank text
    /// coerces to zero, which callers that care about blanks must exclude first.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => parse_js_number(s),
            Cell::Empty => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

/// Cell lookup that tolerates ragged rows.
pub fn cell_at(row: &[Cell], column: usize) -> &Cell {
    row.get(column).unwrap_or(&EMPTY_CELL)
}

/// An uploaded sheet: header names plus data rows in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self { headers, rows }
    }

    /// Index of the first header with exactly this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn header(&self, column: usize) -> &str {
        self.headers.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .map(|r| cell_at(r, column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One feedback text with the labels the classifier returned for it.
///
/// `confidence` is a presentation placeholder, not a model probability. See
/// [`crate::services::classifier::simulated_confidence`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRow {
    pub source_row: usize,
    pub text: String,
    pub categories: Vec<String>,
    pub confidence: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ClassifiedRow {
    pub fn joined_categories(&self) -> String {
        self.categories.join(", ")
    }
}
