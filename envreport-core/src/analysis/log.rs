//! Анализ логов демонов: поиск строк с заданным уровнем и keep-alive сообщений.

use chrono::NaiveDateTime;
use regex::bytes::RegexBuilder;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::keepalive::{self, KeepAliveStat};
use crate::artifacts::HostLogs;
use crate::config::AnalysisConfig;
use crate::error::{ReportError, Result};
use crate::timestamp::parse_log_timestamp;

/// Уровень сообщения в логе демона.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// Флаги регулярного выражения для [`find_matches`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchFlags {
    /// `^` и `$` совпадают на границах строк.
    pub multi_line: bool,
    pub case_insensitive: bool,
}

/// Найти все совпадения регулярного выражения в содержимом файла.
///
/// Совпадения декодируются как UTF-8 с заменой некорректных байтов, так что
/// бинарный мусор в логах не прерывает анализ.
pub fn find_matches(blob: &[u8], pattern: &str, flags: MatchFlags) -> Result<Vec<String>> {
    let regex = RegexBuilder::new(pattern)
        .multi_line(flags.multi_line)
        .case_insensitive(flags.case_insensitive)
        .build()
        .map_err(|source| ReportError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

    Ok(regex
        .find_iter(blob)
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .collect())
}

/// Все строки файла, содержащие `<severity>:` (без учёта регистра).
///
/// Пустые файлы не читаются.
pub fn scan_severity(log_path: &Path, severity: Severity) -> Result<Vec<String>> {
    let metadata = fs::metadata(log_path).map_err(|e| ReportError::io(log_path, e))?;
    if metadata.len() == 0 {
        return Ok(Vec::new());
    }

    let content = fs::read(log_path).map_err(|e| ReportError::io(log_path, e))?;
    // `(?-u)`: `.` совпадает с любым байтом, включая невалидный UTF-8
    let pattern = format!(r"(?-u)^.*?{}:.*?$", regex::escape(severity.as_str()));
    let mut lines = find_matches(
        &content,
        &pattern,
        MatchFlags {
            multi_line: true,
            case_insensitive: true,
        },
    )?;

    // `$` в multi-line режиме не учитывает `\r`
    for line in &mut lines {
        if line.ends_with('\r') {
            line.pop();
        }
    }

    Ok(lines)
}

/// Строки одного хоста, найденные для одного уровня.
///
/// Сериализуется как `{"<host>": ["[<host>] line", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostErrors {
    pub host: String,
    pub lines: Vec<String>,
}

impl Serialize for HostErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.host, &self.lines)?;
        map.end()
    }
}

/// Найденные строки, сгруппированные по уровню и хосту.
pub type ErrorLogGroups = BTreeMap<Severity, Vec<HostErrors>>;

/// Анализатор логов с явно заданным набором уровней и демоном keep-alive.
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    severities: Vec<Severity>,
    remote_daemon: String,
}

impl LogAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            severities: config.severities.clone(),
            remote_daemon: config.remote_daemon.clone(),
        }
    }

    pub fn severities(&self) -> &[Severity] {
        &self.severities
    }

    /// Метка `YYYY/MM/DD HH:MM:SS` в начале строки лога, если есть.
    pub fn get_log_timestamp(line: &str) -> Option<NaiveDateTime> {
        parse_log_timestamp(line)
    }

    /// Собрать строки всех настроенных уровней по логам хостов.
    ///
    /// Каждая строка получает префикс `[<host>] `. Отсутствующие файлы
    /// пропускаются, хосты без совпадений не попадают в группу; ключи для
    /// всех настроенных уровней присутствуют всегда.
    pub fn collect_host_errors(&self, host_logs: &[HostLogs]) -> Result<ErrorLogGroups> {
        let mut groups = ErrorLogGroups::new();

        for &severity in &self.severities {
            let entry = groups.entry(severity).or_default();

            for host in host_logs {
                let mut host_lines = Vec::new();
                for log_path in host.logs.values() {
                    if !log_path.is_file() {
                        debug!(path = %log_path.display(), "log file is missing, skipping");
                        continue;
                    }
                    host_lines.extend(
                        scan_severity(log_path, severity)?
                            .into_iter()
                            .map(|line| format!("[{}] {}", host.name, line)),
                    );
                }

                if !host_lines.is_empty() {
                    entry.push(HostErrors {
                        host: host.name.clone(),
                        lines: host_lines,
                    });
                }
            }
        }

        Ok(groups)
    }

    /// Статистика keep-alive по IP агентов из логов демона удалённых соединений.
    pub fn parse_keep_alives(&self, log_files: &[PathBuf]) -> Result<BTreeMap<String, KeepAliveStat>> {
        keepalive::parse_keep_alives(log_files, &self.remote_daemon)
    }
}
