//! Сводки по числовым полям CSV статистики демонов.
//!
//! Для каждого поля считаются минимум и максимум сырых значений, минимум и
//! максимум средних по файлам, а также наклон линейного тренда (МНК по номеру
//! строки). Все промежуточные значения усекаются до целых к нулю; дробными
//! остаются только итоговые `mean` и `mean_reg_cof`, полученные делением
//! сумм на количество файлов. Формат совместим с прежними отчётами, поэтому
//! усечение сохраняется.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use tracing::debug;

use super::agentd::{self, AgentdReport};
use super::remoted::RemotedReport;
use super::table::StatTable;
use crate::config::AnalysisConfig;
use crate::error::Result;

/// Сводка по одному полю статистики.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatFieldSummary {
    /// Среднее усечённых средних по файлам.
    pub mean: f64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub max_mean: Option<i64>,
    pub min_mean: Option<i64>,
    /// Среднее усечённых наклонов тренда по файлам.
    pub mean_reg_cof: f64,
    pub max_reg_cof: Option<i64>,
    pub min_reg_cof: Option<i64>,
    /// Количество файлов, в которых поле содержало значения.
    pub files: u64,
}

/// Сводки по набору полей в порядке запроса.
///
/// Сериализуется плоско: `mean_<field>`, `max_mean_<field>`, `min_mean_<field>`,
/// `min_<field>`, `max_<field>`, `mean_reg_cof_<field>`, `max_reg_cof_<field>`,
/// `min_reg_cof_<field>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSummaries {
    fields: Vec<(String, StatFieldSummary)>,
}

impl FieldSummaries {
    pub fn get(&self, field: &str) -> Option<&StatFieldSummary> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, summary)| summary)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatFieldSummary)> {
        self.fields.iter().map(|(name, summary)| (name.as_str(), summary))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for FieldSummaries {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() * 8))?;
        for (field, s) in &self.fields {
            map.serialize_entry(&format!("mean_{field}"), &s.mean)?;
            map.serialize_entry(&format!("max_mean_{field}"), &s.max_mean)?;
            map.serialize_entry(&format!("min_mean_{field}"), &s.min_mean)?;
            map.serialize_entry(&format!("min_{field}"), &s.min)?;
            map.serialize_entry(&format!("max_{field}"), &s.max)?;
            map.serialize_entry(&format!("mean_reg_cof_{field}"), &s.mean_reg_cof)?;
            map.serialize_entry(&format!("max_reg_cof_{field}"), &s.max_reg_cof)?;
            map.serialize_entry(&format!("min_reg_cof_{field}"), &s.min_reg_cof)?;
        }
        map.end()
    }
}

/// Наклон прямой МНК для точек `(x, y)`.
///
/// Меньше двух точек или вырожденный `x` дают нулевой наклон.
pub fn linear_trend(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance = 0.0;
    for (x, y) in points {
        covariance += (x - mean_x) * (y - mean_y);
        variance += (x - mean_x) * (x - mean_x);
    }

    if variance == 0.0 {
        0.0
    } else {
        covariance / variance
    }
}

/// Усечение к нулю, как `int()` для float.
fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

fn keep_min(slot: &mut Option<i64>, value: i64) {
    *slot = Some(slot.map_or(value, |current| current.min(value)));
}

fn keep_max(slot: &mut Option<i64>, value: i64) {
    *slot = Some(slot.map_or(value, |current| current.max(value)));
}

#[derive(Debug, Default)]
struct FieldAccumulator {
    files: u64,
    sum_means: i64,
    sum_slopes: i64,
    summary: StatFieldSummary,
}

impl FieldAccumulator {
    fn add_series(&mut self, values: &[Option<f64>]) {
        let points: Vec<(f64, f64)> = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
            .collect();
        if points.is_empty() {
            return;
        }

        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &(_, v) in &points {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = truncate(sum / points.len() as f64);
        let slope = truncate(linear_trend(&points));

        let s = &mut self.summary;
        keep_min(&mut s.min, truncate(min));
        keep_max(&mut s.max, truncate(max));
        keep_min(&mut s.min_mean, mean);
        keep_max(&mut s.max_mean, mean);
        keep_min(&mut s.min_reg_cof, slope);
        keep_max(&mut s.max_reg_cof, slope);

        self.files += 1;
        self.sum_means += mean;
        self.sum_slopes += slope;
    }

    fn finish(mut self) -> StatFieldSummary {
        if self.files > 0 {
            self.summary.mean = self.sum_means as f64 / self.files as f64;
            self.summary.mean_reg_cof = self.sum_slopes as f64 / self.files as f64;
        }
        self.summary.files = self.files;
        self.summary
    }
}

/// Сводки по полям для уже загруженных таблиц.
pub fn summarize_tables(tables: &[StatTable], fields: &[String]) -> Result<FieldSummaries> {
    let mut accumulators: Vec<FieldAccumulator> =
        fields.iter().map(|_| FieldAccumulator::default()).collect();

    for table in tables {
        for (field, acc) in fields.iter().zip(accumulators.iter_mut()) {
            let values = table.numeric_column(field)?;
            if values.iter().all(Option::is_none) {
                debug!(path = %table.path().display(), field = %field, "no values for field, skipping");
                continue;
            }
            acc.add_series(&values);
        }
    }

    Ok(FieldSummaries {
        fields: fields
            .iter()
            .cloned()
            .zip(accumulators.into_iter().map(FieldAccumulator::finish))
            .collect(),
    })
}

/// Загрузить существующие файлы статистики; отсутствующие пропускаются.
pub fn load_tables(files: &[PathBuf]) -> Result<Vec<StatTable>> {
    let mut tables = Vec::with_capacity(files.len());
    for file in files {
        if !file.is_file() {
            debug!(path = %file.display(), "statistics file is missing, skipping");
            continue;
        }
        tables.push(StatTable::load(file)?);
    }
    Ok(tables)
}

/// Сводки по полям для набора CSV файлов (по одному на хост).
pub fn summarize_fields(files: &[PathBuf], fields: &[String]) -> Result<FieldSummaries> {
    summarize_tables(&load_tables(files)?, fields)
}

/// Анализатор статистики демонов с явно заданными наборами полей.
#[derive(Debug, Clone)]
pub struct StatisticsAnalyzer {
    agentd_fields: Vec<String>,
    remoted_fields: Vec<String>,
}

impl StatisticsAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            agentd_fields: config.agentd_fields.clone(),
            remoted_fields: config.remoted_fields.clone(),
        }
    }

    /// Отчёт по состояниям соединения агентов (по одному файлу на агента).
    pub fn analyze_agent_connection_stats(&self, files: &[PathBuf]) -> Result<AgentdReport> {
        let tables = load_tables(files)?;
        agentd::analyze(&tables, &self.agentd_fields)
    }

    /// Отчёт по счётчикам демона удалённых соединений.
    pub fn analyze_remote_comm_stats(&self, files: &[PathBuf]) -> Result<RemotedReport> {
        Ok(RemotedReport {
            fields: summarize_fields(files, &self.remoted_fields)?,
            keep_alives: Default::default(),
        })
    }
}
