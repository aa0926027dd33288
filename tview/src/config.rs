//! Capture session configuration
//!
//! Options arrive as a comma-separated `key=value` list, the same shape an
//! agent argument string has:
//!
//! ```text
//! output=/tmp/run.tview,buffer=4096,flush_ms=50,queue=512,debug=true
//! ```
//!
//! | key        | field                  | default       |
//! |------------|------------------------|---------------|
//! | `output`   | `output_path`          | `trace.tview` |
//! | `buffer`   | `buffer_capacity`      | 1024          |
//! | `flush_ms` | `flush_interval`       | 100 ms        |
//! | `queue`    | `max_pending_segments` | 256           |
//! | `debug`    | `debug`                | false         |

use log::warn;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::ConfigError;

/// Environment variable read by [`CaptureConfig::from_env`]
pub const OPTIONS_ENV_VAR: &str = "TVIEW_OPTIONS";

pub const DEFAULT_OUTPUT_PATH: &str = "trace.tview";
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_PENDING_SEGMENTS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Where [`Tracer::finish_to_file`](crate::capture::Tracer::finish_to_file) writes
    pub output_path: PathBuf,
    /// Events per thread-local segment before a size-triggered flush
    pub buffer_capacity: usize,
    /// Maximum age of buffered events before a time-triggered flush
    pub flush_interval: Duration,
    /// Depth of the bounded queue between buffers and the writer
    pub max_pending_segments: usize,
    pub debug: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_pending_segments: DEFAULT_MAX_PENDING_SEGMENTS,
            debug: false,
        }
    }
}

impl CaptureConfig {
    /// Parse an option string on top of the defaults.
    ///
    /// Empty input yields the defaults. Unknown keys are logged and skipped.
    ///
    /// # Errors
    /// [`ConfigError`] for an entry without `=` or a value that does not parse.
    pub fn from_agent_args(args: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply(args)?;
        Ok(config)
    }

    /// Read options from `TVIEW_OPTIONS`, or the defaults if it is unset.
    ///
    /// # Errors
    /// Same as [`CaptureConfig::from_agent_args`].
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(OPTIONS_ENV_VAR) {
            Ok(args) => Self::from_agent_args(&args),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Overlay `key=value` options onto this config.
    ///
    /// # Errors
    /// See [`CaptureConfig::from_agent_args`].
    pub fn apply(&mut self, args: &str) -> Result<(), ConfigError> {
        for entry in args.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::MissingValue(entry.to_string()))?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "output" => {
                    if value.is_empty() {
                        return Err(invalid(key, value));
                    }
                    self.output_path = PathBuf::from(value);
                }
                "buffer" => self.buffer_capacity = parse_positive(key, value)?,
                "flush_ms" => {
                    let ms = parse_positive(key, value)?;
                    self.flush_interval = Duration::from_millis(ms as u64);
                }
                "queue" => self.max_pending_segments = parse_positive(key, value)?,
                "debug" => self.debug = parse_bool(key, value)?,
                _ => warn!("Unknown trace option: {key}"),
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(key, value)),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}
