//! Чтение таблиц из электронных таблиц и CSV

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{PipelineError, Result};
use crate::types::{Cell, Column, Table};

const MISSING_TOKENS: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

pub struct DataLoader;

impl DataLoader {
    /// Загрузка таблицы; формат определяется по расширению файла
    pub fn load(path: &Path, csv_delimiter: char) -> Result<Table> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let table = match extension.as_str() {
            "csv" | "txt" => Self::load_csv(path, csv_delimiter)?,
            _ => Self::load_spreadsheet(path)?,
        };

        tracing::info!(
            "Loaded {} rows x {} columns from {}",
            table.height(),
            table.width(),
            path.display()
        );
        Ok(table)
    }

    /// Первый лист книги, первая строка содержит заголовок
    pub fn load_spreadsheet(path: &Path) -> Result<Table> {
        let parse_error = |message: String| PipelineError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let mut workbook = open_workbook_auto(path).map_err(|e| parse_error(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| parse_error("workbook has no worksheets".to_string()))?
            .map_err(|e| parse_error(e.to_string()))?;

        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| parse_error("worksheet is empty".to_string()))?;
        let names: Vec<String> = header.iter().map(|c| c.to_string()).collect();

        let capacity = range.height().saturating_sub(1);
        let mut cells: Vec<Vec<Cell>> = vec![Vec::with_capacity(capacity); names.len()];
        for row in rows {
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(row.get(i).map(cell_from_excel).unwrap_or(Cell::Empty));
            }
        }

        Table::new(
            names
                .into_iter()
                .zip(cells)
                .map(|(name, cells)| Column::new(name, cells))
                .collect(),
        )
    }

    pub fn load_csv(path: &Path, delimiter: char) -> Result<Table> {
        let parse_error = |message: String| PipelineError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let delimiter = u8::try_from(delimiter)
            .map_err(|_| parse_error(format!("delimiter {delimiter:?} is not a single byte")))?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| parse_error(e.to_string()))?;

        let names: Vec<String> = reader
            .headers()
            .map_err(|e| parse_error(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if names.is_empty() {
            return Err(parse_error("missing header row".to_string()));
        }

        let mut cells: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];
        for record in reader.records() {
            let record = record.map_err(|e| parse_error(e.to_string()))?;
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(record.get(i).map(cell_from_text).unwrap_or(Cell::Empty));
            }
        }

        Table::new(
            names
                .into_iter()
                .zip(cells)
                .map(|(name, cells)| Column::new(name, cells))
                .collect(),
        )
    }
}

fn cell_from_excel(data: &Data) -> Cell {
    match data {
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::Number(*v),
        Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        // Даты хранятся как серийный номер Excel
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

fn cell_from_text(field: &str) -> Cell {
    let trimmed = field.trim();
    if MISSING_TOKENS.contains(&trimmed) {
        return Cell::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(v) => Cell::Number(v),
        Err(_) => Cell::Text(field.to_string()),
    }
}
