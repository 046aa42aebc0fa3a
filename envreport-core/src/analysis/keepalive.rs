//! Разбор keep-alive сообщений агентов в логе демона удалённых соединений.
//!
//! Keep-alive в отладочном логе занимает три физические строки:
//!
//! ```text
//! 2021/05/01 10:00:00 wazuh-remoted ... reading 'f1|f2|f3|f4|Wazuh v4.2.0 [Linux] ...
//! <произвольная строка>
//! ...:192.168.1.10
//! ```
//!
//! Токенизатор превращает такой блок в [`KeepAliveRecord`], после чего записи
//! агрегируются по IP агента в [`KeepAliveStat`].

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::timestamp::{self, parse_log_timestamp};

const READING_MARKER: &str = " reading '";

static AGENT_IP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*:(\d+\.\d+\.\d+\.\d+)").expect("static agent ip regex")
});

/// Одно keep-alive сообщение агента.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveRecord {
    pub timestamp: NaiveDateTime,
    /// Четыре служебных поля перед описанием версии, разделённые `|`.
    pub fields: [String; 4],
    /// Поле с версией агента и ОС (`... [...] ...`).
    pub version: String,
    /// Строка, следующая за заголовком сообщения.
    pub following_line: String,
    pub agent_ip: String,
}

/// Агрегированная статистика keep-alive одного агента.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeepAliveStat {
    pub n_keep_alive: u64,
    /// Максимальный интервал между соседними keep-alive, в секундах.
    pub max_difference: i64,
    /// Средний интервал между соседними keep-alive, в секундах.
    pub mean_difference: f64,
    #[serde(with = "timestamp::log_format")]
    pub first_keep_alive: NaiveDateTime,
    #[serde(with = "timestamp::log_format")]
    pub last_keep_alive: NaiveDateTime,
    /// Секунды от последнего keep-alive до последней метки в логе.
    /// `None`, если в логе нет ни одной строки с меткой времени.
    pub remainder: Option<i64>,
}

/// Промежуточное состояние агрегации по одному агенту.
#[derive(Debug)]
struct Accumulator {
    count: u64,
    max_gap: i64,
    total_gap: i64,
    first: NaiveDateTime,
    last: NaiveDateTime,
    log_end: Option<NaiveDateTime>,
}

impl Accumulator {
    fn new(ts: NaiveDateTime) -> Self {
        Self {
            count: 1,
            max_gap: 0,
            total_gap: 0,
            first: ts,
            last: ts,
            log_end: None,
        }
    }

    fn push(&mut self, ts: NaiveDateTime) {
        let gap = (ts - self.last).num_seconds().abs();
        self.count += 1;
        self.max_gap = self.max_gap.max(gap);
        self.total_gap += gap;
        self.last = ts;
    }

    fn finish(self) -> KeepAliveStat {
        let intervals = self.count.saturating_sub(1);
        let mean_difference = if intervals > 0 {
            self.total_gap as f64 / intervals as f64
        } else {
            0.0
        };

        KeepAliveStat {
            n_keep_alive: self.count,
            max_difference: self.max_gap,
            mean_difference,
            first_keep_alive: self.first,
            last_keep_alive: self.last,
            remainder: self
                .log_end
                .map(|end| (end - self.last).num_seconds().abs()),
        }
    }
}

/// Разбить содержимое лога на keep-alive записи демона `daemon`.
///
/// Блоки не перекрываются: после найденной записи разбор продолжается со
/// строки, следующей за строкой с IP. Остаток строки с IP не может начать
/// новую запись, так как заголовок обязан начинаться с метки времени.
pub fn tokenize(content: &str, daemon: &str) -> Vec<KeepAliveRecord> {
    let lines: Vec<&str> = content.lines().collect();
    let mut records = Vec::new();
    let mut i = 0;

    while i + 2 < lines.len() {
        match parse_block(lines[i], lines[i + 1], lines[i + 2], daemon) {
            Some(record) => {
                records.push(record);
                i += 3;
            }
            None => i += 1,
        }
    }

    records
}

fn parse_block(header: &str, following: &str, ip_line: &str, daemon: &str) -> Option<KeepAliveRecord> {
    let timestamp = parse_log_timestamp(header)?;
    // Метка имеет фиксированную ширину `YYYY/MM/DD HH:MM:SS`
    let rest = header.get(19..)?.strip_prefix(' ')?.strip_prefix(daemon)?;

    let (fields, version) = rest
        .rmatch_indices(READING_MARKER)
        .find_map(|(pos, _)| split_payload(&rest[pos + READING_MARKER.len()..]))?;

    let agent_ip = AGENT_IP_RE.captures(ip_line)?[1].to_string();

    Some(KeepAliveRecord {
        timestamp,
        fields,
        version,
        following_line: following.to_string(),
        agent_ip,
    })
}

/// Разделить полезную нагрузку на четыре поля и поле версии.
///
/// Первые поля могут содержать `|`, поэтому разделители выбираются как можно
/// правее при условии, что последнее поле имеет вид `... [...] ...`.
fn split_payload(payload: &str) -> Option<([String; 4], String)> {
    let pipes: Vec<usize> = payload.match_indices('|').map(|(pos, _)| pos).collect();
    if pipes.len() < 4 {
        return None;
    }

    for start in (0..=pipes.len() - 4).rev() {
        let seps = &pipes[start..start + 4];
        let version = &payload[seps[3] + 1..];
        if !looks_like_version(version) {
            continue;
        }

        let fields = [
            payload[..seps[0]].to_string(),
            payload[seps[0] + 1..seps[1]].to_string(),
            payload[seps[1] + 1..seps[2]].to_string(),
            payload[seps[2] + 1..seps[3]].to_string(),
        ];
        return Some((fields, version.to_string()));
    }

    None
}

fn looks_like_version(field: &str) -> bool {
    field
        .find(" [")
        .is_some_and(|open| field[open + 2..].contains(']'))
}

/// Собрать статистику keep-alive по IP агентов из логов менеджеров.
///
/// Отсутствующие файлы пропускаются. Остаток (`remainder`) считается
/// относительно последней метки времени того файла, в котором агент
/// встретился последним.
pub fn parse_keep_alives(
    log_files: &[PathBuf],
    daemon: &str,
) -> Result<BTreeMap<String, KeepAliveStat>> {
    let mut agents: BTreeMap<String, Accumulator> = BTreeMap::new();

    for log_file in log_files {
        if !log_file.is_file() {
            debug!(path = %log_file.display(), "keep-alive log is missing, skipping");
            continue;
        }

        let raw = fs::read(log_file).map_err(|e| ReportError::io(log_file, e))?;
        let content = String::from_utf8_lossy(&raw);

        let records = tokenize(&content, daemon);
        let log_end = content.lines().rev().find_map(parse_log_timestamp);
        debug!(
            path = %log_file.display(),
            records = records.len(),
            "parsed keep-alive records"
        );

        let mut seen = BTreeSet::new();
        for record in records {
            agents
                .entry(record.agent_ip.clone())
                .and_modify(|acc| acc.push(record.timestamp))
                .or_insert_with(|| Accumulator::new(record.timestamp));
            seen.insert(record.agent_ip);
        }

        for ip in seen {
            if let Some(acc) = agents.get_mut(&ip) {
                acc.log_end = log_end;
            }
        }
    }

    Ok(agents
        .into_iter()
        .map(|(ip, acc)| (ip, acc.finish()))
        .collect())
}
