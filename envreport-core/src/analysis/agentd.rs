//! Отчёт по статистике демона агента: состояния соединения с менеджером,
//! задержка ACK относительно keep-alive и сводки по счётчикам сообщений.

use serde::Serialize;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

use super::statistics::{summarize_tables, FieldSummaries};
use super::table::StatTable;
use crate::error::{ReportError, Result};

const STATUS_COLUMN: &str = "status";
const KEEPALIVE_COLUMN: &str = "last_keepalive";
const ACK_COLUMN: &str = "last_ack";

/// Состояние соединения агента.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Pending,
    Disconnected,
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "pending" => Ok(Self::Pending),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

/// Количество агентов по состоянию.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub connected: u64,
    pub pending: u64,
    pub disconnected: u64,
}

impl StatusCounts {
    fn bump(&mut self, status: ConnectionStatus) {
        match status {
            ConnectionStatus::Connected => self.connected += 1,
            ConnectionStatus::Pending => self.pending += 1,
            ConnectionStatus::Disconnected => self.disconnected += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentdReport {
    /// Состояние в первой строке статистики каждого агента.
    pub begin_status: StatusCounts,
    /// Состояние в последней строке статистики каждого агента.
    pub end_status: StatusCounts,
    pub ever_disconnected: u64,
    pub ever_connected: u64,
    pub ever_pending: u64,

    pub mean_status_change_count: f64,
    pub max_status_change_count: u64,

    /// Максимум `|last_keepalive - last_ack|`, в секундах.
    pub max_diff_ack_keep_alive: i64,
    /// Среднее по агентам от средней разницы ACK и keep-alive, в секундах.
    pub mean_diff_ack_keep_alive: f64,

    #[serde(flatten)]
    pub fields: FieldSummaries,
}

/// Количество смен состояния: число серий одинаковых значений минус один.
pub fn status_transitions(statuses: &[ConnectionStatus]) -> u64 {
    if statuses.is_empty() {
        return 0;
    }
    let runs = 1 + statuses.windows(2).filter(|w| w[0] != w[1]).count();
    (runs - 1) as u64
}

fn read_statuses(table: &StatTable) -> Result<Vec<ConnectionStatus>> {
    table
        .column(STATUS_COLUMN)?
        .into_iter()
        .filter(|(_, cell)| !cell.is_empty())
        .map(|(line, cell)| {
            cell.parse::<ConnectionStatus>()
                .map_err(|message: String| ReportError::parse(table.path(), line, message))
        })
        .collect()
}

/// Разницы `|last_keepalive - last_ack|` в секундах для строк, где заданы обе даты.
fn ack_keepalive_diffs(table: &StatTable) -> Result<Vec<i64>> {
    let keepalives = table.timestamp_column(KEEPALIVE_COLUMN)?;
    let acks = table.timestamp_column(ACK_COLUMN)?;

    Ok(keepalives
        .into_iter()
        .zip(acks)
        .filter_map(|(keepalive, ack)| Some((keepalive? - ack?).num_seconds().abs()))
        .collect())
}

pub(crate) fn analyze(tables: &[StatTable], fields: &[String]) -> Result<AgentdReport> {
    let mut report = AgentdReport::default();

    let mut status_files = 0u64;
    let mut transitions_sum = 0u64;
    let mut diff_files = 0u64;
    let mut diff_means_sum = 0.0;

    for table in tables {
        let statuses = read_statuses(table)?;
        if let (Some(&first), Some(&last)) = (statuses.first(), statuses.last()) {
            report.begin_status.bump(first);
            report.end_status.bump(last);

            let seen: HashSet<ConnectionStatus> = statuses.iter().copied().collect();
            report.ever_connected += u64::from(seen.contains(&ConnectionStatus::Connected));
            report.ever_pending += u64::from(seen.contains(&ConnectionStatus::Pending));
            report.ever_disconnected += u64::from(seen.contains(&ConnectionStatus::Disconnected));

            let transitions = status_transitions(&statuses);
            transitions_sum += transitions;
            report.max_status_change_count = report.max_status_change_count.max(transitions);
            status_files += 1;
        } else {
            debug!(path = %table.path().display(), "no agent status samples, skipping");
        }

        let diffs = ack_keepalive_diffs(table)?;
        if let Some(&max) = diffs.iter().max() {
            diff_means_sum += diffs.iter().sum::<i64>() as f64 / diffs.len() as f64;
            report.max_diff_ack_keep_alive = report.max_diff_ack_keep_alive.max(max);
            diff_files += 1;
        }
    }

    if status_files > 0 {
        report.mean_status_change_count = transitions_sum as f64 / status_files as f64;
    }
    if diff_files > 0 {
        report.mean_diff_ack_keep_alive = diff_means_sum / diff_files as f64;
    }

    report.fields = summarize_tables(tables, fields)?;
    Ok(report)
}
