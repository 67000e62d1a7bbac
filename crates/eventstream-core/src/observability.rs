use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_KEYS: [&str; 2] = [
    "EVENTSTREAM_OBSERVABILITY_ENABLED",
    "EVENTSTREAM_OBSERVABILITY",
];
const LOG_LEVEL_KEY: &str = "EVENTSTREAM_LOG_LEVEL";
const JSON_LOG_PATH_KEY: &str = "EVENTSTREAM_JSON_LOG_PATH";
const DEFAULT_JSON_LOG_FILE: &str = "eventstream.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Logging settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    level: Option<String>,
    json_path: Option<PathBuf>,
}

impl LogSettings {
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ENABLED_KEYS
            .into_iter()
            .find_map(&lookup)
            .map_or(true, |value| parse_bool_env(&value).unwrap_or(true));
        Self {
            enabled,
            level: lookup(LOG_LEVEL_KEY).filter(|v| !v.trim().is_empty()),
            json_path: lookup(JSON_LOG_PATH_KEY)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    }
}

/// Splits a log path into the directory and file name handed to the appender.
fn json_log_target(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `EVENTSTREAM_OBSERVABILITY_ENABLED` / `EVENTSTREAM_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `EVENTSTREAM_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `EVENTSTREAM_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs are emitted to stdout in a compact console format.
/// - `RUST_LOG`: optional filter override.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::resolve(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        if let Some(path) = &settings.json_path {
            let (dir, file_name) = json_log_target(path);
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
