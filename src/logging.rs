use crate::config::ensure_private_dir;
use crate::error::GeoCamError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{LazyLock, Mutex, Once};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// File name of the JSON application log inside the logs directory.
pub const APP_LOG_FILE: &str = "app.log";

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_LOG_BACKUPS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub details: Option<Value>,
}

static LOGGER_INITIALIZED: Once = Once::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: LazyLock<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> =
    LazyLock::new(|| Mutex::new(None));

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the console and JSON file layers. Only the first call installs
/// anything; later calls just make sure the logs directory exists.
pub fn init_logging(logs_dir: &Path) -> Result<(), GeoCamError> {
    ensure_private_dir(logs_dir)?;

    let log_file_path = logs_dir.join(APP_LOG_FILE);
    if should_rotate_log(&log_file_path)? {
        rotate_log_file(&log_file_path)?;
    }

    LOGGER_INITIALIZED.call_once(|| {
        // Console logging - compact format
        let console_layer = fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_filter(env_filter());

        // File logging as JSON lines so the log can be read back
        let file_appender = tracing_appender::rolling::never(logs_dir, APP_LOG_FILE);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if let Ok(mut guard_mutex) = FILE_APPENDER_GUARD.lock() {
            *guard_mutex = Some(guard);
        }

        let file_layer = fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_filter(env_filter());

        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();
    });

    Ok(())
}

fn should_rotate_log(log_file_path: &Path) -> Result<bool, GeoCamError> {
    if !log_file_path.exists() {
        return Ok(false);
    }

    let metadata = std::fs::metadata(log_file_path)?;
    Ok(metadata.len() > MAX_LOG_SIZE)
}

fn rotate_log_file(log_file_path: &Path) -> Result<(), GeoCamError> {
    // Rotate existing backup files (4 -> 5, 3 -> 4, etc.)
    for i in (1..MAX_LOG_BACKUPS).rev() {
        let current_backup = log_file_path.with_extension(format!("log.{}", i));
        let next_backup = log_file_path.with_extension(format!("log.{}", i + 1));

        if current_backup.exists() {
            std::fs::rename(&current_backup, &next_backup)?;
        }
    }

    if log_file_path.exists() {
        std::fs::rename(log_file_path, log_file_path.with_extension("log.1"))?;
    }

    Ok(())
}

/// Parse one line written by the JSON file layer.
fn parse_log_line(line: &str) -> Option<LogEntry> {
    let mut value: Value = serde_json::from_str(line).ok()?;
    let object = value.as_object_mut()?;

    let timestamp = object.get("timestamp")?.as_str()?.to_string();
    let level = object.get("level")?.as_str()?.to_uppercase();
    let target = object
        .get("target")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    let mut fields = object
        .remove("fields")
        .and_then(|f| match f {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();

    let message = fields
        .remove("message")
        .and_then(|m| m.as_str().map(str::to_string))
        .unwrap_or_default();

    let details = if fields.is_empty() {
        None
    } else {
        Some(Value::Object(fields))
    };

    Some(LogEntry {
        timestamp,
        level,
        target,
        message,
        details,
    })
}

/// Read the application log, newest first, keeping at most `max_lines`.
pub fn read_recent_logs(
    logs_dir: &Path,
    max_lines: Option<usize>,
) -> Result<Vec<LogEntry>, GeoCamError> {
    let log_file_path = logs_dir.join(APP_LOG_FILE);

    if !log_file_path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(&log_file_path)?);
    let mut entries = Vec::new();

    for line in reader.lines() {
        match line {
            Ok(line_content) => {
                if let Some(entry) = parse_log_line(&line_content) {
                    entries.push(entry);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading log line");
            }
        }
    }

    entries.reverse();

    if let Some(max) = max_lines {
        entries.truncate(max);
    }

    Ok(entries)
}
