//! Stderr logging for scanmap binaries and hosts.
//!
//! Lines look like `[   0.412s  INFO registry] fused 3 observations`: the
//! time since the logger was installed, the level, and the scanmap
//! component that emitted the record (`core`, `registry`, `export`,
//! `session`, or `cli` for the facade crate). Records from other crates
//! keep their full target. The level comes from `SCANMAP_LOG` through
//! [`level_from_env`].

use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::EnvFilter;

/// Environment variable consulted by [`level_from_env`] and, with the
/// `tracing` feature, used as the `EnvFilter` directive source.
pub const LOG_ENV_VAR: &str = "SCANMAP_LOG";

/// Filter used by `init_tracing` when `SCANMAP_LOG` is unset: scanmap
/// crates at info, everything else at warn.
#[cfg(feature = "tracing")]
const DEFAULT_TRACING_DIRECTIVES: &str =
    "warn,scanmap=info,scanmap_core=info,scanmap_registry=info,scanmap_export=info,scanmap_session=info";

/// Short component name for a `log` target.
///
/// `scanmap_registry::registry` becomes `registry`; the facade crate and
/// its binary report as `cli`. Foreign targets are returned unchanged.
fn component(target: &str) -> &str {
    let krate = target.split("::").next().unwrap_or(target);
    match krate {
        "scanmap" => "cli",
        _ => krate.strip_prefix("scanmap_").unwrap_or(target),
    }
}

fn format_line(elapsed: f64, level: Level, target: &str, args: &fmt::Arguments<'_>) -> String {
    format!("[{elapsed:8.3}s {level:>5} {}] {args}", component(target))
}

struct ScanmapLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for ScanmapLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<ScanmapLogger> = OnceLock::new();

/// Install the stderr logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| ScanmapLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

fn parse_level(raw: Option<&str>) -> Option<LevelFilter> {
    LevelFilter::from_str(raw?.trim()).ok()
}

/// Read the level filter from [`LOG_ENV_VAR`], falling back to `default`
/// when the variable is unset or unparsable.
pub fn level_from_env(default: LevelFilter) -> LevelFilter {
    let raw = std::env::var(LOG_ENV_VAR).ok();
    parse_level(raw.as_deref()).unwrap_or(default)
}

/// Install a `tracing` fmt subscriber filtered by `SCANMAP_LOG` (full
/// `EnvFilter` syntax), emitting JSON when `json` is set. Span closings
/// are logged so instrumented fuse and export calls report their timing.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACING_DIRECTIVES));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(tracing_subscriber::fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
