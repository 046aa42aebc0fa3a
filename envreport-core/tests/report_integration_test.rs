//! Интеграционные тесты генератора отчёта на полном дереве артефактов.
//!
//! Дерево содержит кластер (мастер и воркер) и два агента с логами,
//! статистикой демонов и keep-alive сообщениями в логе менеджера.

use envreport_core::analysis::Severity;
use envreport_core::artifacts::Component;
use envreport_core::report::ANY_HOST;
use envreport_core::{generate_report, AnalysisConfig, ArtifactTree, ReportError, ReportGenerator};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const AGENTD_HEADER: &str = "Timestamp,status,last_keepalive,last_ack,msg_sent,msg_count,msg_buffer";

fn make_host(root: &Path, rel: &str) -> PathBuf {
    let host = root.join(rel);
    fs::create_dir_all(host.join("logs")).unwrap();
    fs::create_dir_all(host.join("data/stats")).unwrap();
    fs::create_dir_all(host.join("data/binaries")).unwrap();
    host
}

fn keep_alive(ts: &str, ip: &str) -> String {
    format!(
        "{ts} wazuh-remoted[2048] secure.c:245 at HandleSecureMessage(): DEBUG: reading '002|agent-1|ubuntu|x86_64|Wazuh v4.2.0 [Ubuntu 20.04] merged\n\
         5d3a2e1f merged.mg\n\
         #\"_agent_ip\":{ip}\n"
    )
}

fn remoted_stats() -> String {
    let fields = AnalysisConfig::default().remoted_fields;
    let mut content = format!("Timestamp,{}\n", fields.join(","));
    for value in [1, 3] {
        let row = vec![value.to_string(); fields.len()].join(",");
        content.push_str(&format!("2021/05/01 10:00:0{value},{row}\n"));
    }
    content
}

fn cluster_tree() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    let root = dir.path();

    let agent_1 = make_host(root, "agents/agent-1");
    fs::write(
        agent_1.join("logs/ossec.log"),
        "2021/05/01 10:00:00 wazuh-agentd: INFO: Agent started.\n\
         2021/05/01 10:00:05 wazuh-agentd: ERROR: Unable to connect to manager.\n\
         2021/05/01 10:00:10 wazuh-agentd: WARNING: Server unavailable.\n",
    )
    .unwrap();
    fs::write(
        agent_1.join("data/stats/wazuh-agentd_stats.csv"),
        format!(
            "{AGENTD_HEADER}\n\
             2021/05/01 10:00:00,pending,,,0,0,0\n\
             2021/05/01 10:00:05,connected,2021/05/01 10:00:05,2021/05/01 10:00:05,4,4,0\n"
        ),
    )
    .unwrap();

    let agent_2 = make_host(root, "agents/agent-2");
    fs::write(agent_2.join("logs/ossec.log"), "2021/05/01 10:00:00 wazuh-agentd: INFO: ok\n").unwrap();
    fs::write(
        agent_2.join("data/stats/wazuh-agentd_stats.csv"),
        format!(
            "{AGENTD_HEADER}\n\
             2021/05/01 10:00:00,connected,2021/05/01 10:00:00,2021/05/01 10:00:00,2,2,0\n\
             2021/05/01 10:00:05,disconnected,2021/05/01 10:00:00,2021/05/01 10:00:00,2,2,1\n"
        ),
    )
    .unwrap();

    let master = make_host(root, "managers/master/master-1");
    fs::write(
        master.join("logs/ossec.log"),
        [
            keep_alive("2021/05/01 10:00:00", "172.16.0.11"),
            keep_alive("2021/05/01 10:00:10", "172.16.0.11"),
            "2021/05/01 10:00:15 wazuh-remoted: CRITICAL: queue full\n".to_string(),
        ]
        .concat(),
    )
    .unwrap();
    fs::write(master.join("data/stats/wazuh-remoted_stats.csv"), remoted_stats()).unwrap();

    let worker = make_host(root, "managers/workers/worker-1");
    fs::write(worker.join("logs/ossec.log"), keep_alive("2021/05/01 10:00:03", "172.16.0.12")).unwrap();
    fs::write(worker.join("data/stats/wazuh-remoted_stats.csv"), remoted_stats()).unwrap();

    dir
}

#[test]
fn single_critical_line_end_to_end() {
    let dir = TempDir::new().expect("temp dir");
    let agent = make_host(dir.path(), "agents/agent-007");
    let manager = make_host(dir.path(), "managers/master/manager");
    fs::write(
        agent.join("logs/ossec.log"),
        "2021/05/01 10:00:00 wazuh-agentd: critical: disk full\n",
    )
    .unwrap();
    fs::write(manager.join("logs/ossec.log"), "2021/05/01 10:00:00 wazuh-remoted: INFO: fine\n").unwrap();

    let report = generate_report(dir.path(), AnalysisConfig::default(), None).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    let critical = json["agents"]["critical"].as_array().unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(
        critical[0],
        serde_json::json!({
            "agent-007": ["[agent-007] 2021/05/01 10:00:00 wazuh-agentd: critical: disk full"]
        })
    );
    assert!(json["managers"]["critical"].as_array().unwrap().is_empty());
}

#[test]
fn cluster_report_has_expected_shape() {
    let dir = cluster_tree();
    let report = generate_report(dir.path(), AnalysisConfig::default(), None).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["metadata"], serde_json::json!({"n_agents": 2, "n_workers": 1}));

    for topology in ["agents", "managers"] {
        for severity in ["critical", "error", "warning"] {
            assert!(
                json[topology][severity].is_array(),
                "{topology}.{severity} must always be present"
            );
        }
    }

    assert_eq!(json["agents"]["error"].as_array().unwrap().len(), 1);
    assert_eq!(json["agents"]["warning"].as_array().unwrap().len(), 1);
    assert_eq!(json["managers"]["critical"][0]["master-1"].as_array().unwrap().len(), 1);

    let agentd = &json["agents"]["wazuh-agentd"];
    assert_eq!(agentd["begin_status"]["pending"], 1);
    assert_eq!(agentd["begin_status"]["connected"], 1);
    assert_eq!(agentd["end_status"]["disconnected"], 1);
    assert_eq!(agentd["ever_disconnected"], 1);
    assert_eq!(agentd["max_status_change_count"], 1);
    assert_eq!(agentd["mean_status_change_count"], 1.0);
    assert_eq!(agentd["max_msg_sent"], 4);

    let remoted = &json["managers"]["wazuh-remoted"];
    assert_eq!(remoted["mean_queue_size"], 2.0);
    assert_eq!(remoted["max_queue_size"], 3);
    assert_eq!(remoted["min_queue_size"], 1);

    let keep_alives = remoted["keep_alives"].as_object().unwrap();
    assert_eq!(keep_alives.len(), 2);
    assert_eq!(keep_alives["172.16.0.11"]["n_keep_alive"], 2);
    assert_eq!(keep_alives["172.16.0.11"]["max_difference"], 10);
    assert_eq!(keep_alives["172.16.0.11"]["mean_difference"], 10.0);
    assert_eq!(keep_alives["172.16.0.11"]["first_keep_alive"], "2021/05/01 10:00:00");
    assert_eq!(keep_alives["172.16.0.11"]["last_keep_alive"], "2021/05/01 10:00:10");
    assert_eq!(keep_alives["172.16.0.11"]["remainder"], 5);
    assert_eq!(keep_alives["172.16.0.12"]["n_keep_alive"], 1);
}

#[test]
fn reports_can_be_narrowed_by_host_pattern() {
    let dir = cluster_tree();
    let generator = ReportGenerator::new(dir.path(), AnalysisConfig::default(), None).unwrap();

    let only_worker = generator.remoted_report(Component::Workers, ANY_HOST).unwrap();
    assert_eq!(only_worker.keep_alives.len(), 1);
    assert!(only_worker.keep_alives.contains_key("172.16.0.12"));

    let only_second_agent = generator.agentd_report(Component::Agents, "agent-2").unwrap();
    assert_eq!(only_second_agent.begin_status.connected, 1);
    assert_eq!(only_second_agent.begin_status.pending, 0);

    let errors = generator.error_logs(Component::Agents, "agent-2").unwrap();
    assert!(errors[&Severity::Error].is_empty());
}

#[test]
fn all_component_is_union_of_managers_and_agents() {
    let dir = cluster_tree();
    let tree = ArtifactTree::open(dir.path()).unwrap();

    let all = tree.get_instances_artifacts(Component::All, ANY_HOST).unwrap();
    let managers = tree.get_instances_artifacts(Component::Managers, ANY_HOST).unwrap();
    let agents = tree.get_instances_artifacts(Component::Agents, ANY_HOST).unwrap();

    assert_eq!(all.len(), managers.len() + agents.len());
    assert_eq!(all.len(), 4);
    for host in managers.iter().chain(&agents) {
        assert!(all.contains(host));
    }
}

#[test]
fn missing_topology_directory_is_rejected() {
    let dir = TempDir::new().expect("temp dir");
    make_host(dir.path(), "agents/agent-1");

    match ReportGenerator::new(dir.path(), AnalysisConfig::default(), None) {
        Err(ReportError::InvalidArtifactTree { missing, .. }) => assert_eq!(missing, "managers"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("tree without managers must be rejected"),
    }
}

#[test]
fn unknown_component_is_rejected() {
    let err = "servers".parse::<Component>().unwrap_err();
    assert!(matches!(err, ReportError::UnknownComponent(ref name) if name == "servers"));
}
