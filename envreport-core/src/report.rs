//! Генератор отчёта об окружении.
//!
//! Связывает дерево артефактов с анализаторами логов и статистики и собирает
//! итоговый отчёт: метаданные топологии, строки ошибок по хостам и сводки по
//! демонам агентов и менеджеров.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analysis::{AgentdReport, ErrorLogGroups, LogAnalyzer, RemotedReport, StatisticsAnalyzer};
use crate::artifacts::phases::slice_phases;
use crate::artifacts::{ArtifactTree, Component, HostRef, ALL_LOGS};
use crate::config::{AnalysisConfig, RunConfig};
use crate::error::Result;

/// Регулярное выражение, совпадающее с любым хостом.
pub const ANY_HOST: &str = ".*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMetadata {
    pub n_agents: usize,
    pub n_workers: usize,
}

/// Отчёт по одной группе хостов: строки ошибок по уровням и отчёт демона.
///
/// Сериализуется плоско: ключи уровней и ключ с именем демона на одном уровне.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyReport<D> {
    pub errors: ErrorLogGroups,
    pub daemon_name: String,
    pub daemon: D,
}

impl<D: Serialize> Serialize for TopologyReport<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.errors.len() + 1))?;
        for (severity, groups) in &self.errors {
            map.serialize_entry(severity.as_str(), groups)?;
        }
        map.serialize_entry(&self.daemon_name, &self.daemon)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub agents: TopologyReport<AgentdReport>,
    pub managers: TopologyReport<RemotedReport>,
}

pub struct ReportGenerator {
    tree: ArtifactTree,
    config: AnalysisConfig,
    log_analyzer: LogAnalyzer,
    stats_analyzer: StatisticsAnalyzer,
}

impl ReportGenerator {
    /// Открыть дерево артефактов и, если задана конфигурация запуска,
    /// нарезать его на фазы.
    pub fn new(root: &Path, config: AnalysisConfig, run: Option<&RunConfig>) -> Result<Self> {
        config.validate()?;
        let tree = ArtifactTree::open(root)?;

        let generator = Self {
            log_analyzer: LogAnalyzer::new(&config),
            stats_analyzer: StatisticsAnalyzer::new(&config),
            tree,
            config,
        };

        if let Some(run) = run {
            generator.slice_phases(run)?;
        }

        Ok(generator)
    }

    pub fn tree(&self) -> &ArtifactTree {
        &self.tree
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Материализовать фазы; возвращает созданные каталоги.
    pub fn slice_phases(&self, run: &RunConfig) -> Result<Vec<PathBuf>> {
        let created = slice_phases(&self.tree, run)?;
        info!(phases = run.phases.len(), created = created.len(), "phase slicing finished");
        Ok(created)
    }

    /// Отчёт демона агента по выбранным хостам.
    pub fn agentd_report(&self, component: Component, hosts_regex: &str) -> Result<AgentdReport> {
        let files = self.statistic_files(&self.config.agent_daemon, component, hosts_regex)?;
        debug!(files = files.len(), component = %component, "building agent daemon report");
        self.stats_analyzer.analyze_agent_connection_stats(&files)
    }

    /// Отчёт демона удалённых соединений: сводки статистики плюс keep-alive
    /// агентов из лога менеджеров.
    pub fn remoted_report(&self, component: Component, hosts_regex: &str) -> Result<RemotedReport> {
        let files = self.statistic_files(&self.config.remote_daemon, component, hosts_regex)?;
        debug!(files = files.len(), component = %component, "building remote daemon report");
        let mut report = self.stats_analyzer.analyze_remote_comm_stats(&files)?;

        let logs: Vec<PathBuf> = self
            .tree
            .get_instances_logs(&self.config.manager_log, component, hosts_regex)?
            .into_iter()
            .flat_map(|host| host.logs.into_values())
            .collect();
        report.keep_alives = self.log_analyzer.parse_keep_alives(&logs)?;

        Ok(report)
    }

    /// Строки ошибок всех настроенных уровней во всех логах выбранных хостов.
    pub fn error_logs(&self, component: Component, hosts_regex: &str) -> Result<ErrorLogGroups> {
        let logs = self.tree.get_instances_logs(ALL_LOGS, component, hosts_regex)?;
        self.log_analyzer.collect_host_errors(&logs)
    }

    pub fn make_report(&self) -> Result<Report> {
        let report = Report {
            metadata: ReportMetadata {
                n_agents: self.tree.n_agents(),
                n_workers: self.tree.n_workers(),
            },
            agents: TopologyReport {
                errors: self.error_logs(Component::Agents, ANY_HOST)?,
                daemon_name: self.config.agent_daemon.clone(),
                daemon: self.agentd_report(Component::Agents, ANY_HOST)?,
            },
            managers: TopologyReport {
                errors: self.error_logs(Component::Managers, ANY_HOST)?,
                daemon_name: self.config.remote_daemon.clone(),
                daemon: self.remoted_report(Component::Managers, ANY_HOST)?,
            },
        };

        info!(
            n_agents = report.metadata.n_agents,
            n_workers = report.metadata.n_workers,
            "report generated"
        );
        Ok(report)
    }

    fn statistic_files(&self, daemon: &str, component: Component, hosts_regex: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .tree
            .get_instances_statistics(daemon, component, hosts_regex)?
            .into_iter()
            .map(|HostRef { path, .. }| path)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use std::fs;
    use tempfile::TempDir;

    fn host(root: &Path, rel: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join("logs")).unwrap();
        fs::create_dir_all(dir.join("data/stats")).unwrap();
        fs::create_dir_all(dir.join("data/binaries")).unwrap();
        dir
    }

    fn keep_alive(ts: &str, ip: &str) -> String {
        format!(
            "{ts} wazuh-remoted[1024] secure.c:245 at HandleSecureMessage(): DEBUG: reading '001|agent|linux|x86_64|Wazuh v4.2.0 [Ubuntu] ok\n\
             merged.mg 5d3a\n\
             #\"_agent_ip\":{ip}\n"
        )
    }

    #[test]
    fn critical_line_is_reported_per_topology() {
        let dir = TempDir::new().expect("temp dir");
        let agent = host(dir.path(), "agents/agent-1");
        let master = host(dir.path(), "managers/master/master-1");
        fs::write(
            agent.join("logs/ossec.log"),
            "2021/05/01 10:00:00 wazuh-agentd: INFO: started\n\
             2021/05/01 10:00:01 wazuh-agentd: CRITICAL: lost connection\n",
        )
        .unwrap();
        fs::write(master.join("logs/ossec.log"), "2021/05/01 10:00:00 wazuh-remoted: INFO: ok\n")
            .unwrap();

        let generator = ReportGenerator::new(dir.path(), AnalysisConfig::default(), None).unwrap();
        let report = generator.make_report().unwrap();

        assert_eq!(report.metadata, ReportMetadata { n_agents: 1, n_workers: 0 });
        let critical = &report.agents.errors[&Severity::Critical];
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].host, "agent-1");
        assert_eq!(
            critical[0].lines,
            vec!["[agent-1] 2021/05/01 10:00:01 wazuh-agentd: CRITICAL: lost connection"]
        );
        assert!(report.managers.errors[&Severity::Critical].is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json["agents"]["critical"][0]["agent-1"][0],
            "[agent-1] 2021/05/01 10:00:01 wazuh-agentd: CRITICAL: lost connection"
        );
        assert!(json["managers"]["critical"].as_array().unwrap().is_empty());
        assert!(json["agents"]["wazuh-agentd"].is_object());
        assert!(json["managers"]["wazuh-remoted"]["keep_alives"].is_object());
        assert_eq!(json["metadata"]["n_agents"], 1);
    }

    #[test]
    fn remoted_report_merges_keep_alives_from_manager_log() {
        let dir = TempDir::new().expect("temp dir");
        host(dir.path(), "agents/agent-1");
        let master = host(dir.path(), "managers/master/master-1");
        let worker = host(dir.path(), "managers/workers/worker-1");
        fs::write(
            master.join("logs/ossec.log"),
            keep_alive("2021/05/01 10:00:00", "10.0.0.2"),
        )
        .unwrap();
        fs::write(
            worker.join("logs/ossec.log"),
            [
                keep_alive("2021/05/01 10:00:00", "10.0.0.3"),
                keep_alive("2021/05/01 10:00:20", "10.0.0.3"),
            ]
            .concat(),
        )
        .unwrap();

        let generator = ReportGenerator::new(dir.path(), AnalysisConfig::default(), None).unwrap();
        let report = generator.remoted_report(Component::Managers, ANY_HOST).unwrap();

        assert_eq!(report.keep_alives.len(), 2);
        assert_eq!(report.keep_alives["10.0.0.2"].n_keep_alive, 1);
        let worker_agent = &report.keep_alives["10.0.0.3"];
        assert_eq!(worker_agent.n_keep_alive, 2);
        assert_eq!(worker_agent.max_difference, 20);
        assert_eq!(generator.tree().n_workers(), 1);
    }

    #[test]
    fn agentd_report_reads_agent_statistics() {
        let dir = TempDir::new().expect("temp dir");
        let agent = host(dir.path(), "agents/agent-1");
        host(dir.path(), "agents/agent-2");
        host(dir.path(), "managers/master/master-1");
        fs::write(
            agent.join("data/stats/wazuh-agentd_stats.csv"),
            "Timestamp,status,last_keepalive,last_ack,msg_sent,msg_count,msg_buffer\n\
             2021/05/01 10:00:00,pending,,,0,0,0\n\
             2021/05/01 10:00:05,connected,2021/05/01 10:00:05,2021/05/01 10:00:02,4,4,0\n",
        )
        .unwrap();

        let generator = ReportGenerator::new(dir.path(), AnalysisConfig::default(), None).unwrap();
        let report = generator.agentd_report(Component::Agents, ANY_HOST).unwrap();

        assert_eq!(report.begin_status.pending, 1);
        assert_eq!(report.end_status.connected, 1);
        assert_eq!(report.max_status_change_count, 1);
        assert_eq!(report.max_diff_ack_keep_alive, 3);
        assert_eq!(report.fields.get("msg_sent").unwrap().files, 1);
    }

    #[test]
    fn construction_slices_configured_phases() {
        let dir = TempDir::new().expect("temp dir");
        let agent = host(dir.path(), "agents/agent-1");
        host(dir.path(), "managers/master/master-1");
        fs::write(agent.join("logs/ossec.log"), "2021/05/01 10:00:00 a\n").unwrap();

        let run = RunConfig::from_yaml(
            "- phase:\n    hosts: agents\n    timeframe: all\n",
            Path::new("run.yaml"),
        )
        .unwrap();
        ReportGenerator::new(dir.path(), AnalysisConfig::default(), Some(&run)).unwrap();

        assert!(agent.join("phase-all/logs/ossec.log").is_file());
        assert!(!dir.path().join("managers/master/master-1/phase-all").exists());
    }

    #[test]
    fn invalid_config_is_rejected_before_touching_tree() {
        let dir = TempDir::new().expect("temp dir");
        let config = AnalysisConfig {
            severities: Vec::new(),
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            ReportGenerator::new(dir.path(), config, None),
            Err(crate::error::ReportError::InvalidConfig(_))
        ));
    }
}
