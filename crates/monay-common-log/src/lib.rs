//! Logging infrastructure for Monay services.
//!
//! Besides the usual console/file output this can route the `audit` tracing
//! target, where [`TracingSink`]-style audit sinks write their records, into
//! a dedicated JSON Lines file.
//!
//! [`TracingSink`]: https://docs.rs/monay-audit-capture

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Tracing target carrying audit records.
pub const AUDIT_TARGET: &str = "audit";

/// Environment variable names.
pub mod vars {
    /// Level name; `RUST_LOG` is the fallback.
    pub const LEVEL: &str = "MONAY_LOG_LEVEL";
    /// `pretty`, `compact` or `json`.
    pub const FORMAT: &str = "MONAY_LOG_FORMAT";
    /// Optional log file.
    pub const FILE: &str = "MONAY_LOG_FILE";
    /// Optional JSON Lines file for `audit` records.
    pub const AUDIT_FILE: &str = "MONAY_LOG_AUDIT_FILE";
    /// Include file and line.
    pub const SOURCE: &str = "MONAY_LOG_SOURCE";
    /// Log span open/close.
    pub const SPANS: &str = "MONAY_LOG_SPANS";
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Minimum log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Also write all output to this file.
    pub file_path: Option<PathBuf>,
    /// Write `audit` target records, as JSON, to this file.
    pub audit_file: Option<PathBuf>,
    /// Include source location.
    pub source_location: bool,
    /// Include span events.
    pub span_events: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl LogLevel {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Lowercase directive name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON structured format.
    Json,
}

impl LogFormat {
    /// Parse from string; unknown values fall back to pretty.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            file_path: None,
            audit_file: None,
            source_location: false,
            span_events: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable lookup.
    ///
    /// `RUST_LOG` is consulted for the level only when `MONAY_LOG_LEVEL` is
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(vars::LEVEL)
            .or_else(|| lookup("RUST_LOG"))
            .and_then(|l| LogLevel::parse(&l))
        {
            config.level = level;
        }
        if let Some(format) = lookup(vars::FORMAT) {
            config.format = LogFormat::parse(&format);
        }
        config.file_path = lookup(vars::FILE).map(PathBuf::from);
        config.audit_file = lookup(vars::AUDIT_FILE).map(PathBuf::from);
        if let Some(source) = lookup(vars::SOURCE) {
            config.source_location = is_truthy(&source);
        }
        if let Some(spans) = lookup(vars::SPANS) {
            config.span_events = is_truthy(&spans);
        }

        config
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Global filter. `env_directives` (normally `RUST_LOG`) replace the
    /// configured level when they parse. Audit records stay enabled at
    /// `info` whenever they have their own file.
    fn env_filter(&self, env_directives: Option<&str>) -> Result<EnvFilter, LogError> {
        let filter = env_directives
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.as_str()));

        match self.audit_file {
            Some(_) => {
                let directive = format!("{}=info", AUDIT_TARGET)
                    .parse()
                    .map_err(|e| LogError::InitError(format!("invalid audit directive: {e}")))?;
                Ok(filter.add_directive(directive))
            }
            None => Ok(filter),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(config.span_events());

    match config.format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Open a log file for appending, creating parent directories.
pub fn open_log_file(path: &Path) -> Result<File, LogError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(file)
}

/// Initialize logging with the given configuration.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    // Full `RUST_LOG` directives apply unless MONAY_LOG_LEVEL pins the level.
    let env_directives = match std::env::var(vars::LEVEL) {
        Ok(_) => None,
        Err(_) => std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    };
    let filter = config.env_filter(env_directives.as_deref())?;

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(&config, io::stderr, true)];

    if let Some(path) = &config.file_path {
        let file = open_log_file(path)?;
        layers.push(fmt_layer(&config, Mutex::new(file), false));
    }

    if let Some(path) = &config.audit_file {
        let file = open_log_file(path)?;
        let audit_layer = fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_current_span(false)
            .with_span_list(false)
            .with_filter(Targets::new().with_target(AUDIT_TARGET, LevelFilter::INFO))
            .boxed();
        layers.push(audit_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LogError::InitError(e.to_string()))
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    #[error("failed to open log file: {0}")]
    FileError(#[from] io::Error),
}

/// Convenience macros re-exported from tracing.
pub use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("Warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("monay_audit=debug"), None);
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Error), LevelFilter::ERROR);
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file_path.is_none());
        assert!(config.audit_file.is_none());
        assert!(!config.source_location);
        assert!(!config.span_events);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = LogConfig::from_lookup(lookup(&[
            (vars::LEVEL, "debug"),
            (vars::FORMAT, "json"),
            (vars::FILE, "/var/log/monay/app.log"),
            (vars::AUDIT_FILE, "/var/log/monay/audit.jsonl"),
            (vars::SOURCE, "true"),
            (vars::SPANS, "1"),
        ]));

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file_path, Some(PathBuf::from("/var/log/monay/app.log")));
        assert_eq!(config.audit_file, Some(PathBuf::from("/var/log/monay/audit.jsonl")));
        assert!(config.source_location);
        assert!(config.span_events);
    }

    #[test]
    fn test_rust_log_fallback() {
        let config = LogConfig::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, LogLevel::Warn);

        let config =
            LogConfig::from_lookup(lookup(&[("RUST_LOG", "warn"), (vars::LEVEL, "error")]));
        assert_eq!(config.level, LogLevel::Error);
    }

    #[test]
    fn test_env_filter_uses_level() {
        let config = LogConfig {
            level: LogLevel::Warn,
            ..Default::default()
        };
        assert_eq!(config.env_filter(None).unwrap().to_string(), "warn");
        assert_eq!(config.env_filter(Some("debug")).unwrap().to_string(), "debug");
    }

    #[test]
    fn test_env_filter_keeps_audit_records_with_rust_log() {
        let config = LogConfig {
            audit_file: Some(PathBuf::from("audit.jsonl")),
            ..Default::default()
        };

        let filter = config.env_filter(Some("warn")).unwrap().to_string();
        assert!(filter.contains("warn"));
        assert!(filter.contains("audit=info"));

        let filter = config.env_filter(None).unwrap().to_string();
        assert!(filter.contains("audit=info"));
    }

    #[test]
    fn test_audit_records_reach_audit_layer_under_rust_log() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Count(Arc<AtomicUsize>);
        impl<S: tracing::Subscriber> Layer<S> for Count {
            fn on_event(
                &self,
                _event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let config = LogConfig {
            audit_file: Some(PathBuf::from("audit.jsonl")),
            ..Default::default()
        };
        let seen = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry()
            .with(
                Count(seen.clone())
                    .with_filter(Targets::new().with_target(AUDIT_TARGET, LevelFilter::INFO)),
            )
            .with(config.env_filter(Some("warn")).unwrap());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "audit", record = "{}", "audit record");
            tracing::info!(target: "monay_app", "ordinary info is filtered");
        });

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");

        open_log_file(&path).unwrap();

        assert!(path.exists());
    }
}
