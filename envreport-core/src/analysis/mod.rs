//! Анализаторы артефактов: логи демонов и CSV статистика.

pub mod agentd;
pub mod keepalive;
pub mod log;
pub mod remoted;
pub mod statistics;
pub mod table;

pub use agentd::{AgentdReport, ConnectionStatus, StatusCounts};
pub use keepalive::{KeepAliveRecord, KeepAliveStat};
pub use log::{ErrorLogGroups, HostErrors, LogAnalyzer, MatchFlags, Severity};
pub use remoted::RemotedReport;
pub use statistics::{FieldSummaries, StatFieldSummary, StatisticsAnalyzer};
pub use table::StatTable;
