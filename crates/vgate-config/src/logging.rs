//! Log levels shared with the interception layer, and structured `tracing`
//! events for config loading.
//!
//! The layer does not emit `tracing` events on interposed paths; it keeps its
//! own allocation-free flight log and only shares [`LogLevel`]. Tooling that
//! loads config files installs whatever `tracing` subscriber it likes.
//!
//! ```ignore
//! log_config_debug!("loading project config", path = "/work/.vgate/config.toml");
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ConfigError;

/// Log levels for runtime configuration, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" => Ok(LogLevel::Off),
            _ => Err(ConfigError::InvalidValue {
                key: crate::ENV_LOG_LEVEL,
                value: s.to_string(),
            }),
        }
    }
}

#[macro_export]
macro_rules! log_config_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CONFIG", $($key = $value,)* $msg)
    };
}
