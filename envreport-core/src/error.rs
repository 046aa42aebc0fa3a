//! Типы ошибок генератора отчётов.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Ошибки, возникающие при анализе дерева артефактов.
///
/// Структурные ошибки и ошибки конфигурации фатальны и возвращаются сразу.
/// Отсутствующие файлы отдельных хостов ошибкой не считаются и пропускаются
/// на уровне анализаторов.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Дерево артефактов не соответствует ожидаемой схеме.
    #[error("invalid artifact tree at {path}: missing '{missing}' directory")]
    InvalidArtifactTree { path: PathBuf, missing: String },

    /// Неизвестный селектор компонента.
    #[error("unknown component selector '{0}' (expected all, managers, agents, master or workers)")]
    UnknownComponent(String),

    /// Некорректное регулярное выражение для имён хостов.
    #[error("invalid host pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Некорректная конфигурация анализа или запуска.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Не удалось разобрать содержимое файла.
    #[error("failed to parse {path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// В CSV файле нет обязательной колонки.
    #[error("column '{column}' is missing in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ReportError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
