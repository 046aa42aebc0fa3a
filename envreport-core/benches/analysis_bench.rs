//! Бенчмарки поиска строк по уровню и сводок по полям статистики.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use envreport_core::analysis::log::scan_severity;
use envreport_core::analysis::statistics::summarize_fields;
use envreport_core::analysis::Severity;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const LOG_LINES: usize = 50_000;
const STAT_ROWS: usize = 2_000;
const STAT_FILES: usize = 20;

fn write_log(dir: &TempDir) -> PathBuf {
    let mut content = String::with_capacity(LOG_LINES * 80);
    for i in 0..LOG_LINES {
        let level = match i % 100 {
            0 => "ERROR",
            1 => "WARNING",
            _ => "INFO",
        };
        let _ = writeln!(
            content,
            "2021/05/01 10:{:02}:{:02} wazuh-agentd: {level}: message {i}",
            (i / 60) % 60,
            i % 60
        );
    }
    let path = dir.path().join("ossec.log");
    fs::write(&path, content).expect("write log");
    path
}

fn write_stats(dir: &TempDir) -> Vec<PathBuf> {
    (0..STAT_FILES)
        .map(|file| {
            let mut content = String::from("Timestamp,queue_size,evt_count\n");
            for row in 0..STAT_ROWS {
                let _ = writeln!(
                    content,
                    "2021/05/01 10:00:00,{},{}",
                    (row * file) % 97,
                    row * 3
                );
            }
            let path = dir.path().join(format!("stats-{file}.csv"));
            fs::write(&path, content).expect("write stats");
            path
        })
        .collect()
}

/// Поиск строк `error:` в логе на 50 тысяч строк.
fn benchmark_scan_severity(c: &mut Criterion) {
    let dir = TempDir::new().expect("temp dir");
    let log = write_log(&dir);

    c.bench_function("scan_severity_50k_lines", |b| {
        b.iter(|| scan_severity(black_box(&log), Severity::Error).expect("scan"))
    });
}

fn benchmark_summarize_fields(c: &mut Criterion) {
    let dir = TempDir::new().expect("temp dir");
    let files = write_stats(&dir);
    let fields = vec!["queue_size".to_string(), "evt_count".to_string()];

    c.bench_function("summarize_fields_20_files", |b| {
        b.iter(|| summarize_fields(black_box(&files), black_box(&fields)).expect("summarize"))
    });
}

criterion_group!(benches, benchmark_scan_severity, benchmark_summarize_fields);
criterion_main!(benches);
