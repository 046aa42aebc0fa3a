//! Разбор временных меток логов и CSV статистики.

use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Формат временной метки в начале строки лога демона.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Форматы, в которых сборщики статистики пишут колонки с датами.
const CSV_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

static LOG_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2})").expect("static timestamp regex")
});

/// Извлечь временную метку `YYYY/MM/DD HH:MM:SS` из начала строки лога.
///
/// Никогда не завершается ошибкой: строки без метки (продолжения
/// многострочных сообщений, служебный вывод) возвращают `None`.
pub fn parse_log_timestamp(line: &str) -> Option<NaiveDateTime> {
    let caps = LOG_TIMESTAMP_RE.captures(line)?;
    NaiveDateTime::parse_from_str(&caps[1], LOG_TIMESTAMP_FORMAT).ok()
}

/// Разобрать значение колонки с датой из CSV или конфигурации.
///
/// Пробует формат логов, ISO-варианты с пробелом и `T`, затем RFC 3339.
/// Пустые значения и мусор дают `None`.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for format in CSV_TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }

    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.naive_utc())
}

/// Форматировать метку так же, как она записана в логах.
pub fn format_log_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// Сериализация `NaiveDateTime` в формате логов (`YYYY/MM/DD HH:MM:SS`).
pub(crate) mod log_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_log_timestamp(ts))
    }
}
