//! Конфигурация анализа.
//!
//! Описывает, какие уровни сообщений искать в логах, какие демоны и поля
//! статистики анализировать. Все ключи YAML необязательны, значения по
//! умолчанию соответствуют стандартной раскладке артефактов QA-прогонов.

pub mod run;

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::analysis::log::Severity;
use crate::error::{ReportError, Result};

pub use run::{Phase, RunConfig, Timeframe};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Уровни сообщений, которые ищутся в логах всех хостов.
    #[serde(default = "default_severities")]
    pub severities: Vec<Severity>,

    /// Имя демона агента (ключ отчёта и имя файла статистики).
    #[serde(default = "default_agent_daemon")]
    pub agent_daemon: String,

    /// Имя демона удалённых соединений менеджера.
    #[serde(default = "default_remote_daemon")]
    pub remote_daemon: String,

    /// Лог менеджера, в котором ищутся keep-alive сообщения.
    #[serde(default = "default_manager_log")]
    pub manager_log: String,

    /// Поля статистики демона агента, по которым строятся сводки.
    #[serde(default = "default_agentd_fields")]
    pub agentd_fields: Vec<String>,

    /// Счётчики статистики демона удалённых соединений.
    #[serde(default = "default_remoted_fields")]
    pub remoted_fields: Vec<String>,
}

fn default_severities() -> Vec<Severity> {
    vec![Severity::Critical, Severity::Error, Severity::Warning]
}

fn default_agent_daemon() -> String {
    "wazuh-agentd".to_string()
}

fn default_remote_daemon() -> String {
    "wazuh-remoted".to_string()
}

fn default_manager_log() -> String {
    "ossec.log".to_string()
}

fn default_agentd_fields() -> Vec<String> {
    ["msg_sent", "msg_count", "msg_buffer"]
        .iter()
        .map(|f| f.to_string())
        .collect()
}

fn default_remoted_fields() -> Vec<String> {
    [
        "queue_size",
        "total_queue_size",
        "tcp_sessions",
        "evt_count",
        "ctrl_msg_count",
        "discarded_count",
        "queued_msgs",
        "sent_bytes",
        "recv_bytes",
        "dequeued_after_close",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            severities: default_severities(),
            agent_daemon: default_agent_daemon(),
            remote_daemon: default_remote_daemon(),
            manager_log: default_manager_log(),
            agentd_fields: default_agentd_fields(),
            remoted_fields: default_remoted_fields(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        let cfg: AnalysisConfig =
            serde_yaml::from_str(&data).map_err(|source| ReportError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure(!self.severities.is_empty(), || {
            "severities must not be empty".to_string()
        })?;

        let mut seen = HashSet::new();
        for severity in &self.severities {
            ensure(seen.insert(*severity), || {
                format!("severity '{}' is listed more than once", severity.as_str())
            })?;
        }

        for (name, value) in [
            ("agent_daemon", &self.agent_daemon),
            ("remote_daemon", &self.remote_daemon),
            ("manager_log", &self.manager_log),
        ] {
            ensure(!value.trim().is_empty(), || format!("{name} must not be empty"))?;
        }

        ensure(!self.manager_log.contains(['/', '\\']), || {
            format!(
                "manager_log must be a file name, not a path (got {})",
                self.manager_log
            )
        })?;

        validate_fields("agentd_fields", &self.agentd_fields)?;
        validate_fields("remoted_fields", &self.remoted_fields)?;

        Ok(())
    }
}

fn validate_fields(name: &str, fields: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        ensure(!field.trim().is_empty(), || {
            format!("{name} must not contain empty field names")
        })?;
        ensure(seen.insert(field.as_str()), || {
            format!("{name}: field '{field}' is listed more than once")
        })?;
    }
    Ok(())
}

pub(crate) fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ReportError::InvalidConfig(message()))
    }
}
