use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Filter used when neither `DIFY_LOG_LEVEL` nor `RUST_LOG` is set: client
/// events at `info`, everything else (reqwest, hyper, ...) at `warn`.
pub const DEFAULT_FILTER: &str = "warn,dify_client=info,dify_cli=info";

const CLIENT_TARGETS: [&str; 2] = ["dify_client", "dify_cli"];

static INIT: OnceCell<()> = OnceCell::new();

/// Logging setup resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    /// `tracing_subscriber::EnvFilter` directives.
    pub filter: String,
    /// JSONL output file; console output on stderr when `None`.
    pub json_log_path: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_FILTER.to_string(),
            json_log_path: None,
        }
    }
}

impl ObservabilityConfig {
    /// Reads `DIFY_OBSERVABILITY`, `DIFY_LOG_LEVEL`, `RUST_LOG` and
    /// `DIFY_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("DIFY_OBSERVABILITY")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);
        let filter = resolve_filter(
            lookup("DIFY_LOG_LEVEL").as_deref(),
            lookup("RUST_LOG").as_deref(),
        );
        let json_log_path = lookup("DIFY_JSON_LOG_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            json_log_path,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Picks filter directives: `DIFY_LOG_LEVEL` first, then `RUST_LOG`, then
/// [`DEFAULT_FILTER`]. Unparseable values are skipped.
///
/// A bare level in `DIFY_LOG_LEVEL` (`debug`) applies to the client
/// targets only; dependencies stay at `warn`.
fn resolve_filter(dify_level: Option<&str>, rust_log: Option<&str>) -> String {
    let scoped = dify_level
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(scope_to_client);
    let candidates = [scoped, rust_log.map(|v| v.trim().to_string())];
    candidates
        .into_iter()
        .flatten()
        .find(|directives| !directives.is_empty() && EnvFilter::try_new(directives).is_ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn scope_to_client(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut directives = String::from("warn");
    for target in CLIENT_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Installs the global subscriber from [`ObservabilityConfig::from_env`].
pub fn init_observability() {
    init_with(ObservabilityConfig::from_env());
}

/// Installs the global subscriber once per process. Later calls, and calls
/// after another subscriber was installed, do nothing.
pub fn init_with(config: ObservabilityConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let filter = EnvFilter::try_new(&config.filter)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        match config.json_log_path {
            Some(path) => {
                let (dir, file_name) = split_log_path(&path);
                let _ = std::fs::create_dir_all(&dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            None => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dify-client.jsonl")
        .to_string();
    (dir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ObservabilityConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilityConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_scope_info_to_client() {
        assert_eq!(config(&[]), ObservabilityConfig::default());
    }

    #[test]
    fn dify_log_level_wins_over_rust_log() {
        let cfg = config(&[("DIFY_LOG_LEVEL", "debug"), ("RUST_LOG", "trace")]);
        assert_eq!(cfg.filter, "warn,dify_client=debug,dify_cli=debug");
    }

    #[test]
    fn full_directives_in_dify_log_level_are_kept() {
        let cfg = config(&[("DIFY_LOG_LEVEL", "info,reqwest=debug")]);
        assert_eq!(cfg.filter, "info,reqwest=debug");
    }

    #[test]
    fn rust_log_used_when_dify_level_is_missing_or_invalid() {
        assert_eq!(config(&[("RUST_LOG", "hyper=debug")]).filter, "hyper=debug");
        let cfg = config(&[("DIFY_LOG_LEVEL", "dify_client=loud"), ("RUST_LOG", "error")]);
        assert_eq!(cfg.filter, "error");
    }

    #[test]
    fn disabled_flag_and_json_path_are_read() {
        let cfg = config(&[
            ("DIFY_OBSERVABILITY", "off"),
            ("DIFY_JSON_LOG_PATH", "logs/dify.jsonl"),
        ]);
        assert!(!cfg.enabled);
        assert_eq!(cfg.json_log_path, Some(PathBuf::from("logs/dify.jsonl")));
        assert!(config(&[("DIFY_OBSERVABILITY", "maybe")]).enabled);
    }

    #[test]
    fn log_path_without_directory_goes_to_cwd() {
        let (dir, file) = split_log_path(Path::new("client.jsonl"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(file, "client.jsonl");
    }
}
