//! Logging init: JSON or console lines to `LOG_FILE` or stderr.
//!
//! - `RUST_LOG` wins when set; otherwise `LOG_LEVEL` (trace|debug|info|warn|error, default info).
//! - `LOG_FORMAT`: `json` (default) or `console`.
//! - `LOG_FILE`: append to this file instead of stderr.
//!
//! Timestamps are RFC 3339 in UTC (the subscriber's system-time default).

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

/// Logging settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is absent.
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
        };
        let level = match get("LOG_LEVEL").as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("warn") | Some("warning") => "warn",
            Some("error") => "error",
            _ => "info",
        }
        .to_string();
        let format = match get("LOG_FORMAT").as_deref() {
            Some("console") => LogFormat::Console,
            _ => LogFormat::Json,
        };
        let file = lookup("LOG_FILE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self { level, format, file }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Writer that is either a file or stderr (used when file clone fails).
enum FileOrStderr {
    File(std::fs::File),
    Stderr,
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct FileMakeWriter(std::fs::File);

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileOrStderr;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(FileOrStderr::File)
            .unwrap_or(FileOrStderr::Stderr)
    }
}

fn install(settings: &LogSettings, writer: BoxMakeWriter) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_writer(writer)
        .with_ansi(false);
    match settings.format {
        LogFormat::Json => builder.json().flatten_event(true).init(),
        LogFormat::Console => builder.init(),
    }
}

/// Initialize logging per `settings`. Fails only when `LOG_FILE` cannot be
/// opened, so the caller can fall back to [`init_logging_stderr`].
pub fn init_logging(settings: &LogSettings) -> Result<()> {
    let writer = match &settings.file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            BoxMakeWriter::new(FileMakeWriter(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    install(settings, writer);
    Ok(())
}

/// Stderr-only logging, for when `init_logging` fails.
pub fn init_logging_stderr(settings: &LogSettings) {
    install(settings, BoxMakeWriter::new(io::stderr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> LogSettings {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        LogSettings::from_lookup(|k| map.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_are_info_json_stderr() {
        let s = settings(&[]);
        assert_eq!(s.level, "info");
        assert_eq!(s.format, LogFormat::Json);
        assert!(s.file.is_none());
    }

    #[test]
    fn level_and_format_are_case_insensitive() {
        let s = settings(&[("LOG_LEVEL", "DEBUG"), ("LOG_FORMAT", "Console"), ("LOG_FILE", "/tmp/raftsnap.log")]);
        assert_eq!(s.level, "debug");
        assert_eq!(s.format, LogFormat::Console);
        assert_eq!(s.file, Some(PathBuf::from("/tmp/raftsnap.log")));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(settings(&[("LOG_LEVEL", "verbose")]).level, "info");
        assert_eq!(settings(&[("LOG_LEVEL", "warning")]).level, "warn");
        assert_eq!(settings(&[("LOG_FORMAT", "xml")]).format, LogFormat::Json);
    }
}
