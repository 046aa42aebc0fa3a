//! Отчёт по демону удалённых соединений менеджера.

use serde::Serialize;
use std::collections::BTreeMap;

use super::keepalive::KeepAliveStat;
use super::statistics::FieldSummaries;

/// Сводки по счётчикам очередей, сессий и трафика плюс keep-alive агентов.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemotedReport {
    #[serde(flatten)]
    pub fields: FieldSummaries,
    /// Статистика keep-alive по IP агента.
    pub keep_alives: BTreeMap<String, KeepAliveStat>,
}
