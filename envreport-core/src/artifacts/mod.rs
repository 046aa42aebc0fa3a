//! Дерево артефактов QA-прогона.
//!
//! Ожидаемая структура:
//!
//! ```text
//! <root>
//! ├── agents
//! │   └── <agent>/{logs, data/{stats, binaries}}
//! └── managers
//!     ├── master
//!     │   └── <master>/{logs, data/{stats, binaries}}
//!     └── workers            (только в кластере)
//!         └── <worker>/{logs, data/{stats, binaries}}
//! ```

pub mod phases;

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{ReportError, Result};

/// Имя лога, означающее «все файлы каталога logs».
pub const ALL_LOGS: &str = "all";

const AGENTS_DIR: &str = "agents";
const MANAGERS_DIR: &str = "managers";
const MASTER_DIR: &str = "master";
const WORKERS_DIR: &str = "workers";

pub(crate) const LOGS_DIR: &str = "logs";
pub(crate) const DATA_DIR: &str = "data";
pub(crate) const STATS_DIR: &str = "stats";
pub(crate) const BINARIES_DIR: &str = "binaries";

/// Селектор группы хостов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Менеджеры и агенты.
    All,
    /// Мастер и (в кластере) воркеры.
    Managers,
    Agents,
    Master,
    Workers,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::All => "all",
            Component::Managers => "managers",
            Component::Agents => "agents",
            Component::Master => "master",
            Component::Workers => "workers",
        }
    }
}

impl FromStr for Component {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Component::All),
            "managers" => Ok(Component::Managers),
            "agents" => Ok(Component::Agents),
            "master" => Ok(Component::Master),
            "workers" => Ok(Component::Workers),
            other => Err(ReportError::UnknownComponent(other.to_string())),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Хост и путь, относящийся к нему (каталог хоста или файл внутри него).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRef {
    pub name: String,
    pub path: PathBuf,
}

/// Логи одного хоста: имя файла -> путь.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostLogs {
    pub name: String,
    pub logs: BTreeMap<String, PathBuf>,
}

/// Проверенное дерево артефактов.
#[derive(Debug, Clone)]
pub struct ArtifactTree {
    root: PathBuf,
    agents_dir: PathBuf,
    master_dir: PathBuf,
    workers_dir: PathBuf,
    cluster: bool,
    n_agents: usize,
    n_workers: usize,
}

impl ArtifactTree {
    /// Открыть дерево, проверив наличие каталогов `agents` и `managers`.
    ///
    /// Наличие `managers/workers` означает кластерную топологию.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(ReportError::InvalidArtifactTree {
                path: root.to_path_buf(),
                missing: ".".to_string(),
            });
        }

        let agents_dir = root.join(AGENTS_DIR);
        let managers_dir = root.join(MANAGERS_DIR);
        for (dir, name) in [(&agents_dir, AGENTS_DIR), (&managers_dir, MANAGERS_DIR)] {
            if !dir.is_dir() {
                return Err(ReportError::InvalidArtifactTree {
                    path: root.to_path_buf(),
                    missing: name.to_string(),
                });
            }
        }

        let master_dir = managers_dir.join(MASTER_DIR);
        let workers_dir = managers_dir.join(WORKERS_DIR);
        let cluster = workers_dir.is_dir();

        let n_agents = list_host_dirs(&agents_dir)?.len();
        let n_workers = if cluster {
            list_host_dirs(&workers_dir)?.len()
        } else {
            0
        };

        info!(
            root = %root.display(),
            cluster,
            n_agents,
            n_workers,
            "opened artifact tree"
        );

        Ok(Self {
            root: root.to_path_buf(),
            agents_dir,
            master_dir,
            workers_dir,
            cluster,
            n_agents,
            n_workers,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_cluster(&self) -> bool {
        self.cluster
    }

    pub fn n_agents(&self) -> usize {
        self.n_agents
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Каталоги хостов выбранной группы, имя которых совпадает с `hosts_regex`.
    ///
    /// Выражение привязано к началу имени хоста. Результат без дубликатов,
    /// менеджеры идут раньше агентов, внутри группы сортировка по имени.
    pub fn get_instances_artifacts(
        &self,
        component: Component,
        hosts_regex: &str,
    ) -> Result<Vec<HostRef>> {
        let pattern = compile_host_pattern(hosts_regex)?;
        let mut hosts = Vec::new();
        self.collect_hosts(component, &pattern, &mut hosts)?;

        let mut seen = HashSet::new();
        hosts.retain(|host| seen.insert(host.path.clone()));
        Ok(hosts)
    }

    fn collect_hosts(&self, component: Component, pattern: &Regex, out: &mut Vec<HostRef>) -> Result<()> {
        match component {
            Component::All => {
                self.collect_hosts(Component::Managers, pattern, out)?;
                self.collect_hosts(Component::Agents, pattern, out)?;
            }
            Component::Managers => {
                self.collect_hosts(Component::Master, pattern, out)?;
                if self.cluster {
                    self.collect_hosts(Component::Workers, pattern, out)?;
                }
            }
            Component::Agents | Component::Master | Component::Workers => {
                let dir = match component {
                    Component::Agents => &self.agents_dir,
                    Component::Master => &self.master_dir,
                    _ => &self.workers_dir,
                };
                if !dir.is_dir() {
                    debug!(component = %component, "component directory is absent");
                    return Ok(());
                }
                out.extend(
                    list_host_dirs(dir)?
                        .into_iter()
                        .filter(|host| pattern.is_match(&host.name)),
                );
            }
        }
        Ok(())
    }

    /// Найти хост по точному имени среди всех групп.
    pub fn find_host(&self, hostname: &str) -> Result<Option<HostRef>> {
        Ok(self
            .get_instances_artifacts(Component::All, &regex::escape(hostname))?
            .into_iter()
            .find(|host| host.name == hostname))
    }

    /// Имена всех файлов каталога логов хоста.
    pub fn get_instance_all_log_files(&self, hostname: &str) -> Result<Vec<String>> {
        match self.find_host(hostname)? {
            Some(host) => list_log_files(&host.path),
            None => {
                debug!(hostname, "host not found in artifact tree");
                Ok(Vec::new())
            }
        }
    }

    /// Пути к логу `log` (или ко всем логам при [`ALL_LOGS`]) выбранных хостов.
    ///
    /// Для конкретного имени путь возвращается, даже если файла нет.
    pub fn get_instances_logs(
        &self,
        log: &str,
        component: Component,
        hosts_regex: &str,
    ) -> Result<Vec<HostLogs>> {
        self.get_instances_artifacts(component, hosts_regex)?
            .into_iter()
            .map(|host| host_logs(&host, log))
            .collect()
    }

    /// Пути к CSV статистике демона: `<host>/data/stats/<statistic>_stats.csv`.
    pub fn get_instances_statistics(
        &self,
        statistic: &str,
        component: Component,
        hosts_regex: &str,
    ) -> Result<Vec<HostRef>> {
        let file_name = format!("{statistic}_stats.csv");
        Ok(self
            .get_instances_artifacts(component, hosts_regex)?
            .into_iter()
            .map(|host| HostRef {
                path: host.path.join(DATA_DIR).join(STATS_DIR).join(&file_name),
                name: host.name,
            })
            .collect())
    }

    /// Пути к CSV метрикам процесса: `<host>/data/binaries/<process>.csv`.
    pub fn get_instances_process_metrics(
        &self,
        process: &str,
        component: Component,
        hosts_regex: &str,
    ) -> Result<Vec<HostRef>> {
        let file_name = format!("{process}.csv");
        Ok(self
            .get_instances_artifacts(component, hosts_regex)?
            .into_iter()
            .map(|host| HostRef {
                path: host.path.join(DATA_DIR).join(BINARIES_DIR).join(&file_name),
                name: host.name,
            })
            .collect())
    }
}

pub(crate) fn host_logs(host: &HostRef, log: &str) -> Result<HostLogs> {
    let logs_dir = host.path.join(LOGS_DIR);
    let names = if log == ALL_LOGS {
        list_log_files(&host.path)?
    } else {
        vec![log.to_string()]
    };

    Ok(HostLogs {
        name: host.name.clone(),
        logs: names
            .into_iter()
            .map(|name| {
                let path = logs_dir.join(&name);
                (name, path)
            })
            .collect(),
    })
}

fn compile_host_pattern(hosts_regex: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{hosts_regex})")).map_err(|source| ReportError::InvalidPattern {
        pattern: hosts_regex.to_string(),
        source,
    })
}

/// Каталоги хостов внутри каталога группы, по имени.
fn list_host_dirs(dir: &Path) -> Result<Vec<HostRef>> {
    let mut hosts = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ReportError::io(dir, e))? {
        let entry = entry.map_err(|e| ReportError::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if !path.is_dir() {
            warn!(path = %path.display(), "unexpected file in component directory, skipping");
            continue;
        }
        if name.starts_with('.') {
            continue;
        }
        hosts.push(HostRef { name, path });
    }
    hosts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(hosts)
}

/// Имена обычных файлов в `<host>/logs`; отсутствующий каталог даёт пустой список.
fn list_log_files(host_dir: &Path) -> Result<Vec<String>> {
    let logs_dir = host_dir.join(LOGS_DIR);
    if !logs_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&logs_dir).map_err(|e| ReportError::io(&logs_dir, e))? {
        let entry = entry.map_err(|e| ReportError::io(&logs_dir, e))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
