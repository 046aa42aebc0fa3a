//! Ядро генератора отчётов об окружении QA-прогона.
//!
//! Разбирает дерево артефактов (логи и CSV статистика агентов и менеджеров),
//! при необходимости нарезает его на временные фазы и строит сводный отчёт.

pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod report;
pub mod timestamp;

use std::path::Path;

pub use analysis::{LogAnalyzer, Severity, StatisticsAnalyzer};
pub use artifacts::{ArtifactTree, Component};
pub use config::{AnalysisConfig, RunConfig};
pub use error::{ReportError, Result};
pub use report::{Report, ReportGenerator};

/// Построить отчёт по дереву `root` с опциональной нарезкой на фазы.
pub fn generate_report(
    root: &Path,
    config: AnalysisConfig,
    run: Option<&RunConfig>,
) -> Result<Report> {
    ReportGenerator::new(root, config, run)?.make_report()
}
