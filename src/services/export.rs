use csv::{QuoteStyle, Terminator, WriterBuilder};
use rust_xlsxwriter::{Format, Workbook};

use crate::error::AppError;
use crate::models::{cell_at, Cell, ClassifiedRow, Dataset};
use crate::services::analytics::AnalyticsSummary;
use crate::services::categories::CategorySummary;

pub const CSV_FILE_NAME: &str = "classification_results.csv";
pub const WORKBOOK_FILE_NAME: &str = "analysis_results.xlsx";
pub const ANALYSIS_SHEET: &str = "Analysis";

const UTF8_BOM: &str = "\u{FEFF}";
const CSV_HEADER: &str = "Feedback,Predicted Categories,Confidence";

/// Classification results as CSV.
///
/// Starts with a UTF-8 BOM so spreadsheet tools pick the right encoding for
/// non-Latin feedback. The header line is bare; every data field is quoted.
pub fn classification_csv(rows: &[ClassifiedRow]) -> Result<Vec<u8>, AppError> {
    let mut buffer = Vec::with_capacity(64 + rows.len() * 48);
    buffer.extend_from_slice(UTF8_BOM.as_bytes());
    buffer.extend_from_slice(CSV_HEADER.as_bytes());
    buffer.push(b'\n');

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buffer);

    for row in rows.iter().filter(|row| !row.text.trim().is_empty()) {
        writer.write_record([
            row.text.as_str(),
            row.joined_categories().as_str(),
            row.confidence.to_string().as_str(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Export(format!("Failed to finish CSV export: {}", e)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SheetValue {
    Blank,
    Text(String),
    Number(f64),
}

impl From<&Cell> for SheetValue {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Empty => SheetValue::Blank,
            Cell::Text(s) if s.is_empty() => SheetValue::Blank,
            Cell::Text(s) => SheetValue::Text(s.clone()),
            Cell::Number(n) => SheetValue::Number(*n),
        }
    }
}

impl From<&str> for SheetValue {
    fn from(value: &str) -> Self {
        SheetValue::Text(value.to_string())
    }
}

fn label_row(label: &str) -> Vec<SheetValue> {
    vec![
        SheetValue::Blank,
        SheetValue::Blank,
        SheetValue::Blank,
        SheetValue::from(label),
    ]
}

/// Lays out the `Analysis` sheet: the classified rows with their original
/// cells, then the summary blocks.
pub fn compose_analysis_sheet(
    dataset: &Dataset,
    classified: &[ClassifiedRow],
    summary: &AnalyticsSummary,
    categories: &CategorySummary,
) -> Vec<Vec<SheetValue>> {
    let columns = dataset.column_count();
    let mut sheet =
        Vec::with_capacity(classified.len() + summary.likert.len() * 2 + categories.len() + 6);

    let mut header: Vec<SheetValue> = dataset
        .headers
        .iter()
        .map(|h| SheetValue::from(h.as_str()))
        .collect();
    header.push(SheetValue::from("Predicted Categories"));
    header.push(SheetValue::from("Confidence"));
    sheet.push(header);

    for row in classified {
        let source = dataset.rows.get(row.source_row).map(Vec::as_slice).unwrap_or(&[]);
        let mut line: Vec<SheetValue> = (0..columns)
            .map(|column| SheetValue::from(cell_at(source, column)))
            .collect();
        line.push(match row.categories.is_empty() {
            true => SheetValue::Blank,
            false => SheetValue::Text(row.joined_categories()),
        });
        line.push(SheetValue::Number(f64::from(row.confidence)));
        sheet.push(line);
    }

    sheet.push(label_row("Analysis Summary"));
    sheet.push(vec![
        SheetValue::from("NPS Average"),
        SheetValue::Text(summary.nps.average.to_string()),
    ]);
    for likert in &summary.likert {
        sheet.push(vec![
            SheetValue::Text(format!("{} Average", likert.column)),
            SheetValue::Text(likert.average.to_string()),
        ]);
    }

    sheet.push(label_row("Correlations"));
    for correlation in &summary.correlations {
        sheet.push(vec![
            SheetValue::Text(format!("{} vs NPS", correlation.column)),
            SheetValue::Text(correlation.coefficient.to_string()),
        ]);
    }

    sheet.push(label_row("Predicted Categories Analysis"));
    for entry in categories.entries() {
        sheet.push(vec![
            SheetValue::Text(entry.name.clone()),
            SheetValue::Number(entry.count as f64),
        ]);
    }

    sheet
}

pub fn analysis_workbook(sheet: &[Vec<SheetValue>]) -> Result<Vec<u8>, AppError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(ANALYSIS_SHEET)?;

    let header_format = Format::new().set_bold();

    for (row_index, line) in sheet.iter().enumerate() {
        let row = u32::try_from(row_index)
            .map_err(|_| AppError::Export(format!("Row {} is out of range", row_index)))?;
        for (col_index, value) in line.iter().enumerate() {
            let col = u16::try_from(col_index)
                .map_err(|_| AppError::Export(format!("Column {} is out of range", col_index)))?;
            match value {
                SheetValue::Blank => {}
                SheetValue::Text(text) if row == 0 => {
                    worksheet.write_string_with_format(row, col, text, &header_format)?;
                }
                SheetValue::Text(text) => {
                    worksheet.write_string(row, col, text)?;
                }
                SheetValue::Number(number) => {
                    worksheet.write_number(row, col, *number)?;
                }
            }
        }
    }

    let bytes = workbook.save_to_buffer()?;
    tracing::info!("Built analysis workbook: {} rows, {}KB", sheet.len(), bytes.len() / 1024);
    Ok(bytes)
}
