use bytes::{Bytes, BytesMut};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use csv::ReaderBuilder;
use reqwest::Client;
use std::io::Cursor;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{Cell, Dataset, Row};
use crate::services::analytics::sanitizer::drop_blank_rows;

pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Csv,
}

impl SourceFormat {
    /// Guesses the format from a file name extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".csv") {
            Some(SourceFormat::Csv)
        } else if lower.ends_with(".xlsx") {
            Some(SourceFormat::Xlsx)
        } else {
            None
        }
    }
}

impl FromStr for SourceFormat {
    type Err = AppError;

    /// Accepts short names as well as MIME types.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower.contains("csv") {
            Ok(SourceFormat::Csv)
        } else if lower.contains("xlsx") || lower.contains("spreadsheetml") {
            Ok(SourceFormat::Xlsx)
        } else {
            tracing::error!("Unsupported file type: {}", s);
            Err(AppError::InvalidInput(
                "Only XLSX and CSV files are supported".to_string(),
            ))
        }
    }
}

pub async fn load_file_from_url(url: &str, max_size: usize) -> Result<Bytes, AppError> {
    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::FileProcessingError(format!("Failed to fetch file: {}", e)))?;

    if !response.status().is_success() {
        return Err(AppError::FileProcessingError(format!(
            "Failed to fetch file. Status: {}",
            response.status()
        )));
    }

    if let Some(length) = response.content_length() {
        check_size(length as usize, max_size)?;
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| {
            AppError::FileProcessingError(format!("Failed to read response bytes: {}", e))
        })?
    {
        body.extend_from_slice(&chunk);
        check_size(body.len(), max_size)?;
    }

    Ok(body.freeze())
}

pub fn check_size(size: usize, max_size: usize) -> Result<(), AppError> {
    if size > max_size {
        return Err(AppError::InvalidInput(format!(
            "File is too large: {}KB (limit {}KB)",
            size / 1024,
            max_size / 1024
        )));
    }
    Ok(())
}

/// Reads the first worksheet (or the whole CSV) into a dataset. The first row
/// is the header; rows with nothing but blank cells are dropped.
pub fn parse_dataset(data: &[u8], format: SourceFormat) -> Result<Dataset, AppError> {
    let start = std::time::Instant::now();
    let mut rows = match format {
        SourceFormat::Xlsx => read_xlsx_rows(data)?,
        SourceFormat::Csv => read_csv_rows(data)?,
    };

    if rows.is_empty() {
        return Err(AppError::FileProcessingError(
            "No valid data found in file".to_string(),
        ));
    }

    let headers: Vec<String> = rows
        .remove(0)
        .iter()
        .map(|cell| cell.raw_text().trim_start_matches('\u{feff}').to_string())
        .collect();
    let rows = drop_blank_rows(rows);

    tracing::info!(
        "Parsed {:?} file: {} columns, {} rows in {:?}",
        format,
        headers.len(),
        rows.len(),
        start.elapsed()
    );
    Ok(Dataset::new(headers, rows))
}

fn read_xlsx_rows(data: &[u8]) -> Result<Vec<Row>, AppError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data)).map_err(|e| {
        tracing::error!("Failed to open Excel file: {}", e);
        AppError::FileProcessingError(format!("Failed to open Excel file: {}", e))
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .ok_or_else(|| AppError::FileProcessingError("No sheets found in workbook".to_string()))?;
    if sheet_names.len() > 1 {
        tracing::warn!(
            "Workbook has {} sheets; only '{}' is read",
            sheet_names.len(),
            first
        );
    }

    let range = workbook.worksheet_range(first)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

fn cell_from_data(value: &Data) -> Cell {
    match value {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::DateTime(d) => Cell::Number(d.as_f64()),
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Empty => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

fn read_csv_rows(data: &[u8]) -> Result<Vec<Row>, AppError> {
    let data = data.strip_prefix("\u{feff}".as_bytes()).unwrap_or(data);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|value| match value {
                    "" => Cell::Empty,
                    text => Cell::text(text),
                })
                .collect(),
        );
    }
    Ok(rows)
}

/// First rows rendered as text, for upload previews.
pub fn preview(dataset: &Dataset, limit: usize) -> Vec<Vec<String>> {
    dataset
        .rows
        .iter()
        .take(limit)
        .map(|row| row.iter().map(|cell| cell.raw_text().into_owned()).collect())
        .collect()
}
