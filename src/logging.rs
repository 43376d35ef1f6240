//! Logging setup on top of tracing-subscriber
//!
//! Console output goes to stderr so it never mixes with answers on stdout.
//! `RUST_LOG` overrides the configured level when set.

use crate::config::{LogLevel, LoggingConfig};
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

// Dependencies that are chatty at debug level
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("sqlx", "warn"),
    ("reqwest", "warn"),
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("reedline", "warn"),
];

/// Keeps the file writer alive; drop it on exit to flush buffered lines
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Build the filter directive string.
///
/// An explicit `RUST_LOG` value wins over everything else. `--verbose` lifts
/// the configured level to at least `debug`.
fn filter_directives(level: LogLevel, verbose: bool, rust_log: Option<&str>) -> String {
    if let Some(rust_log) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        return rust_log.to_string();
    }

    let level = match level {
        LogLevel::Trace => LogLevel::Trace,
        _ if verbose => LogLevel::Debug,
        other => other,
    };

    let mut directives = vec![level.to_string()];
    for (target, lvl) in NOISY_TARGETS {
        directives.push(format!("{target}={lvl}"));
    }
    directives.join(",")
}

fn build_env_filter(directives: &str) -> io::Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid log filter '{directives}': {e}"),
        )
    })
}

/// Install the global subscriber.
///
/// `log_path` is only used when `config.file_output` is set.
pub fn init(config: &LoggingConfig, log_path: &Path, verbose: bool) -> io::Result<LogGuard> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(config.level, verbose, rust_log.as_deref());

    let console_layer = if config.console_output || verbose {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(build_env_filter(&directives)?),
        )
    } else {
        None
    };

    let (file_layer, file_guard) = if config.file_output {
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let directory = log_path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = log_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "askql.log".into());

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_target(true)
            .with_filter(build_env_filter(&directives)?);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::other(format!("Failed to install logger: {e}")))?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(LogLevel::Warn, false, None, "warn,sqlx=warn")]
    #[case(LogLevel::Warn, true, None, "debug,sqlx=warn")]
    #[case(LogLevel::Trace, true, None, "trace,sqlx=warn")]
    #[case(LogLevel::Error, false, None, "error,sqlx=warn")]
    #[case(LogLevel::Warn, true, Some("askql=trace"), "askql=trace")]
    #[case(LogLevel::Info, false, Some("  "), "info,sqlx=warn")]
    fn test_filter_directives(
        #[case] level: LogLevel,
        #[case] verbose: bool,
        #[case] rust_log: Option<&str>,
        #[case] expected_prefix: &str,
    ) {
        let directives = filter_directives(level, verbose, rust_log);
        assert!(
            directives.starts_with(expected_prefix),
            "{directives} does not start with {expected_prefix}"
        );
        assert!(build_env_filter(&directives).is_ok());
    }

    #[test]
    fn test_invalid_directive_is_rejected() {
        assert!(build_env_filter("askql=notalevel").is_err());
    }
}
