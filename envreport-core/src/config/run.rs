//! Конфигурация запуска: список фаз, на которые нарезается дерево артефактов.
//!
//! Формат YAML:
//!
//! ```yaml
//! - phase:
//!     hosts: agents
//!     timeframe:
//!       start: 2021/05/01 10:00:00
//!       end: 2021/05/01 10:30:00
//! - phase:
//!     hosts: all
//!     timeframe: all
//! ```

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::ensure;
use crate::artifacts::Component;
use crate::error::{ReportError, Result};
use crate::timestamp::{format_log_timestamp, LOG_TIMESTAMP_FORMAT};

/// Маркер фазы, охватывающей весь прогон.
pub const ALL_MARKER: &str = "all";

#[derive(Debug, Deserialize)]
struct PhaseEntry {
    phase: RawPhase,
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    hosts: String,
    #[serde(default = "default_hosts_regex")]
    hosts_regex: String,
    timeframe: RawTimeframe,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimeframe {
    Marker(String),
    Window { start: String, end: String },
}

fn default_hosts_regex() -> String {
    ".*".to_string()
}

/// Временные рамки фазы.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timeframe {
    /// Весь прогон, содержимое копируется без фильтрации.
    All,
    /// Окно `[start, end]` включительно.
    Window {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl Timeframe {
    /// Попадает ли метка строки лога в окно фазы.
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        match self {
            Timeframe::All => true,
            Timeframe::Window { start, end } => start <= ts && ts <= end,
        }
    }
}

/// Одна фаза прогона.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub hosts: Component,
    pub hosts_regex: String,
    pub timeframe: Timeframe,
}

impl Phase {
    /// Имя каталога фазы внутри каталога хоста.
    ///
    /// `phase-all` для полной фазы, иначе `phase-<start>-<end>` с `/`,
    /// заменёнными на `.`.
    pub fn dir_name(&self) -> String {
        match &self.timeframe {
            Timeframe::All => format!("phase-{ALL_MARKER}"),
            Timeframe::Window { start, end } => format!(
                "phase-{}-{}",
                format_log_timestamp(start).replace('/', "."),
                format_log_timestamp(end).replace('/', ".")
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub phases: Vec<Phase>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        Self::from_yaml(&data, path)
    }

    /// Разобрать конфигурацию из строки; `origin` используется в ошибках.
    pub fn from_yaml(data: &str, origin: &Path) -> Result<Self> {
        let entries: Vec<PhaseEntry> =
            serde_yaml::from_str(data).map_err(|source| ReportError::Yaml {
                path: origin.to_path_buf(),
                source,
            })?;

        let phases = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| parse_phase(index, entry.phase))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { phases })
    }
}

fn parse_phase(index: usize, raw: RawPhase) -> Result<Phase> {
    let hosts: Component = raw.hosts.parse()?;

    regex::Regex::new(&raw.hosts_regex).map_err(|source| ReportError::InvalidPattern {
        pattern: raw.hosts_regex.clone(),
        source,
    })?;

    let timeframe = match raw.timeframe {
        RawTimeframe::Marker(marker) => {
            ensure(marker == ALL_MARKER, || {
                format!("phase #{index}: timeframe must be '{ALL_MARKER}' or a start/end pair (got '{marker}')")
            })?;
            Timeframe::All
        }
        RawTimeframe::Window { start, end } => {
            let start = parse_bound(index, "start", &start)?;
            let end = parse_bound(index, "end", &end)?;
            ensure(start <= end, || {
                format!("phase #{index}: start must not be after end")
            })?;
            Timeframe::Window { start, end }
        }
    };

    Ok(Phase {
        hosts,
        hosts_regex: raw.hosts_regex,
        timeframe,
    })
}

fn parse_bound(index: usize, name: &str, value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), LOG_TIMESTAMP_FORMAT).map_err(|e| {
        ReportError::InvalidConfig(format!(
            "phase #{index}: {name} '{value}' is not a YYYY/MM/DD HH:MM:SS timestamp ({e})"
        ))
    })
}
