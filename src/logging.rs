//! Structured logging utilities for confcache
//!
//! All logs use structured fields for easy parsing and analysis.
//!
//! # Log Format Conventions
//!
//! - `operation`: The operation being performed ("encode", "decode", "load", "store")
//! - `status`: The result status ("hit", "miss", "stored", "invalid", "problem")
//! - `key`: Cache key of the entry involved
//! - `size_bytes`: Size in bytes
//! - `problem_count`: Number of disallowed references found while encoding
//!
//! # Examples
//!
//! ```rust,ignore
//! use tracing::info;
//!
//! info!(
//!     operation = "load",
//!     status = "hit",
//!     key = %key,
//!     "reusing configuration cache entry"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Shows "confcache" instead of the full module path
struct ConfCacheFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for ConfCacheFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(
                writer,
                "{}{:5}(confcache)\x1b[0m: ",
                level_style,
                meta.level()
            )?;
        } else {
            write!(writer, "{:5}(confcache): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    Pretty,
    /// Compact format (for CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Parse from environment variable (CONFCACHE_LOG_FORMAT)
    pub fn from_env() -> Option<Self> {
        std::env::var("CONFCACHE_LOG_FORMAT")
            .ok()
            .and_then(|value| Self::parse(&value))
    }

    /// Default when nothing is configured: pretty for dev, compact in CI
    pub fn detect() -> Self {
        if std::env::var("CI").is_ok() {
            Self::Compact
        } else {
            Self::Pretty
        }
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn"); overrides `default_level`
/// - `CONFCACHE_LOG_FORMAT`: Set format ("pretty", "compact", "json"); overrides `format`
/// - `CI`: If set, defaults to compact format
///
/// Calling this more than once keeps the first subscriber.
pub fn init(default_level: &str, format: Option<LogFormat>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = LogFormat::from_env()
        .or(format)
        .unwrap_or_else(LogFormat::detect);

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(ConfCacheFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(ConfCacheFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Operation names for consistent logging
pub mod operations {
    pub const ENCODE: &str = "encode";
    pub const DECODE: &str = "decode";
    pub const LOAD: &str = "load";
    pub const STORE: &str = "store";
    pub const PERSIST: &str = "persist";
    pub const CLEAN: &str = "clean";
}

/// Status values for consistent logging
pub mod status {
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const STORED: &str = "stored";
    pub const INVALID: &str = "invalid";
    pub const PROBLEM: &str = "problem";
}
