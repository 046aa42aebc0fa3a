//! Нарезка дерева артефактов на фазы прогона.
//!
//! Для каждого хоста фазы создаётся каталог `<host>/<phase-dir>` с логами и
//! CSV, отфильтрованными по временному окну. Каталог собирается во временном
//! `<host>/.<phase-dir>.tmp` и переименовывается целиком, поэтому фаза на
//! диске либо полная, либо отсутствует. Существующие фазы не перезаписываются.

use chrono::NaiveDateTime;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{host_logs, ArtifactTree, HostRef, ALL_LOGS, BINARIES_DIR, DATA_DIR, LOGS_DIR, STATS_DIR};
use crate::config::{Phase, RunConfig, Timeframe};
use crate::error::{ReportError, Result};
use crate::timestamp::{parse_log_timestamp, parse_timestamp};

/// Колонка с временем сэмпла в CSV статистике и метриках.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Материализовать все фазы конфигурации запуска.
///
/// Возвращает пути к созданным в этом вызове каталогам фаз.
pub fn slice_phases(tree: &ArtifactTree, run: &RunConfig) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    for phase in &run.phases {
        let hosts = tree.get_instances_artifacts(phase.hosts, &phase.hosts_regex)?;
        info!(
            phase = %phase.dir_name(),
            hosts = hosts.len(),
            component = %phase.hosts,
            "slicing phase"
        );

        for host in &hosts {
            if let Some(dir) = materialize_phase(host, phase)? {
                created.push(dir);
            }
        }
    }

    Ok(created)
}

/// Создать каталог фазы для одного хоста.
///
/// `Ok(None)`, если каталог фазы уже существует.
pub fn materialize_phase(host: &HostRef, phase: &Phase) -> Result<Option<PathBuf>> {
    let dir_name = phase.dir_name();
    let final_dir = host.path.join(&dir_name);
    if final_dir.exists() {
        debug!(path = %final_dir.display(), "phase already exists, leaving untouched");
        return Ok(None);
    }

    let staging = host.path.join(format!(".{dir_name}.tmp"));
    if staging.exists() {
        warn!(path = %staging.display(), "removing stale phase staging directory");
        fs::remove_dir_all(&staging).map_err(|e| ReportError::io(&staging, e))?;
    }

    if let Err(err) = populate_phase(host, &phase.timeframe, &staging) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %cleanup, "failed to remove phase staging directory");
        }
        return Err(err);
    }

    fs::rename(&staging, &final_dir).map_err(|e| ReportError::io(&final_dir, e))?;
    info!(host = %host.name, path = %final_dir.display(), "phase created");
    Ok(Some(final_dir))
}

fn populate_phase(host: &HostRef, timeframe: &Timeframe, staging: &Path) -> Result<()> {
    let logs_out = staging.join(LOGS_DIR);
    let stats_out = staging.join(DATA_DIR).join(STATS_DIR);
    let binaries_out = staging.join(DATA_DIR).join(BINARIES_DIR);
    for dir in [&logs_out, &stats_out, &binaries_out] {
        fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))?;
    }

    for (name, path) in host_logs(host, ALL_LOGS)?.logs {
        slice_log(&path, &logs_out.join(name), timeframe)?;
    }

    for (source_dir, target_dir) in [
        (host.path.join(DATA_DIR).join(STATS_DIR), stats_out),
        (host.path.join(DATA_DIR).join(BINARIES_DIR), binaries_out),
    ] {
        for source in list_files(&source_dir)? {
            let Some(name) = source.file_name() else {
                continue;
            };
            slice_csv(&source, &target_dir.join(name), timeframe)?;
        }
    }

    Ok(())
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ReportError::io(dir, e))? {
        let path = entry.map_err(|e| ReportError::io(dir, e))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Скопировать строки лога, метка которых попадает в окно фазы.
///
/// Для [`Timeframe::All`] файл копируется целиком; в ограниченной фазе
/// строки без метки времени отбрасываются.
pub fn slice_log(source: &Path, target: &Path, timeframe: &Timeframe) -> Result<()> {
    if *timeframe == Timeframe::All {
        fs::copy(source, target).map_err(|e| ReportError::io(source, e))?;
        return Ok(());
    }

    let content = fs::read(source).map_err(|e| ReportError::io(source, e))?;
    let mut out = Vec::with_capacity(content.len());
    for line in content.split_inclusive(|&b| b == b'\n') {
        let in_window = parse_log_timestamp(&String::from_utf8_lossy(line))
            .is_some_and(|ts| timeframe.contains(&ts));
        if in_window {
            out.extend_from_slice(line);
        }
    }

    let mut file = fs::File::create(target).map_err(|e| ReportError::io(target, e))?;
    file.write_all(&out).map_err(|e| ReportError::io(target, e))?;
    Ok(())
}

/// Скопировать строки CSV, сэмплы которых сняты после начала фазы.
///
/// Заголовок сохраняется всегда. Строки с пустым `Timestamp` отбрасываются.
pub fn slice_csv(source: &Path, target: &Path, timeframe: &Timeframe) -> Result<()> {
    let start = match timeframe {
        Timeframe::All => {
            fs::copy(source, target).map_err(|e| ReportError::io(source, e))?;
            return Ok(());
        }
        Timeframe::Window { start, .. } => *start,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(source)
        .map_err(|e| ReportError::csv(source, e))?;
    let headers = reader.headers().map_err(|e| ReportError::csv(source, e))?.clone();
    let index = headers
        .iter()
        .position(|h| h.trim() == TIMESTAMP_COLUMN)
        .ok_or_else(|| ReportError::MissingColumn {
            path: source.to_path_buf(),
            column: TIMESTAMP_COLUMN.to_string(),
        })?;

    // Короткие строки читаются как пропуски значений и копируются как есть
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(target)
        .map_err(|e| ReportError::csv(target, e))?;
    writer
        .write_record(&headers)
        .map_err(|e| ReportError::csv(target, e))?;

    let mut kept = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| ReportError::csv(source, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let cell = record.get(index).unwrap_or("").trim();
        if cell.is_empty() {
            continue;
        }

        let ts: NaiveDateTime = parse_timestamp(cell).ok_or_else(|| {
            ReportError::parse(source, line, format!("'{cell}' is not a timestamp"))
        })?;
        if ts > start {
            writer
                .write_record(&record)
                .map_err(|e| ReportError::csv(target, e))?;
            kept += 1;
        }
    }

    writer
        .flush()
        .map_err(|e| ReportError::io(target, e))?;
    debug!(source = %source.display(), kept, "sliced CSV");
    Ok(())
}
