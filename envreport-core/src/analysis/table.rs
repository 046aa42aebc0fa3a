//! Загрузка CSV файлов статистики (одна строка на интервал сбора).

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, Result};
use crate::timestamp::parse_timestamp;

#[derive(Debug, Clone)]
struct Row {
    /// Номер строки в исходном файле (с учётом заголовка).
    line: u64,
    cells: Vec<String>,
}

/// Таблица статистики, прочитанная из CSV с заголовком.
#[derive(Debug, Clone)]
pub struct StatTable {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl StatTable {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| ReportError::csv(path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| ReportError::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ReportError::csv(path, e))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            rows.push(Row {
                line,
                cells: record.iter().map(str::to_string).collect(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReportError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Значения колонки вместе с номерами строк файла.
    ///
    /// Короткие строки дают пустое значение.
    pub fn column(&self, name: &str) -> Result<Vec<(u64, &str)>> {
        let index = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| (row.line, row.cells.get(index).map(String::as_str).unwrap_or("")))
            .collect())
    }

    /// Числовая колонка; пустые ячейки и `NaN` дают `None`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.column(name)?
            .into_iter()
            .map(|(line, cell)| {
                if cell.is_empty() {
                    return Ok(None);
                }
                let value: f64 = cell.parse().map_err(|_| {
                    ReportError::parse(
                        &self.path,
                        line,
                        format!("column '{name}': '{cell}' is not a number"),
                    )
                })?;
                Ok((!value.is_nan()).then_some(value))
            })
            .collect()
    }

    /// Колонка с датами; пустые ячейки дают `None`, нераспознанные даты дают ошибку.
    pub fn timestamp_column(&self, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
        self.column(name)?
            .into_iter()
            .map(|(line, cell)| {
                if cell.is_empty() {
                    return Ok(None);
                }
                parse_timestamp(cell).map(Some).ok_or_else(|| {
                    ReportError::parse(
                        &self.path,
                        line,
                        format!("column '{name}': '{cell}' is not a timestamp"),
                    )
                })
            })
            .collect()
    }
}
