// SPDX-License-Identifier: MIT
//! Logging setup for embedding processes.
//!
//! The library itself only emits `tracing` events; hosts that want the
//! crate to own subscriber setup call [`setup_logging`] once at startup.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `log_format` may be `"pretty"` (compact human-readable, the default) or
/// `"json"` (structured JSON for log aggregators). With a `log_file`, logs
/// additionally go to a daily-rolling file through a non-blocking writer;
/// the returned `WorkerGuard` must stay alive for the process lifetime.
///
/// If the log directory cannot be created, falls back to stdout-only
/// logging with a warning rather than panicking.
pub fn setup_logging(
    log_level: &str,
    log_file: Option<&Path>,
    log_format: &str,
) -> Option<WorkerGuard> {
    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("connwatch.log"));

        // The directory must exist before tracing-appender opens the file.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e}; falling back to stdout",
                dir.display()
            );
            init_stdout(log_level, use_json);
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }
        Some(guard)
    } else {
        init_stdout(log_level, use_json);
        None
    }
}

fn init_stdout(log_level: &str, use_json: bool) {
    if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
    }
}
