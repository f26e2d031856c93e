//! # vgate-config
//!
//! Configuration for the vgate interception layer.
//!
//! Sources, lowest priority first:
//! 1. a global config file
//! 2. a project config file (only the keys it sets)
//! 3. `VGATE_*` environment variables
//!
//! The layer itself only ever reads the environment ([`LayerConfig::from_env`]);
//! file configuration ([`Config::load_from`]) is for tooling and tests.

pub mod logging;
pub mod testing;

pub use logging::LogLevel;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Enables stderr mirroring of the flight log.
pub const ENV_DEBUG: &str = "VGATE_DEBUG";
/// Flight log level: `trace|debug|info|warn|error|off`.
pub const ENV_LOG_LEVEL: &str = "VGATE_LOG_LEVEL";
/// Forces the pass-through resolver table.
pub const ENV_PASSTHROUGH: &str = "VGATE_PASSTHROUGH";
/// Dumps the flight log to stderr at process exit.
pub const ENV_DUMP_ON_EXIT: &str = "VGATE_DUMP_ON_EXIT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layer: LayerConfig,
}

/// Settings consumed by the interception layer's ready hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Flight log level
    pub log_level: LogLevel,
    /// Mirror flight log records to stderr
    pub debug: bool,
    /// Ignore any registered resolver and forward every call to the kernel
    pub passthrough: bool,
    /// Write the flight log to stderr when the process exits
    pub dump_log_on_exit: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            debug: false,
            passthrough: false,
            dump_log_on_exit: false,
        }
    }
}

/// Project config as written on disk: every key optional so that only the
/// keys actually present override the global file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigOverlay {
    layer: LayerOverlay,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LayerOverlay {
    log_level: Option<LogLevel>,
    debug: Option<bool>,
    passthrough: Option<bool>,
    dump_log_on_exit: Option<bool>,
}

impl Config {
    /// Load from explicit file locations without consulting the environment.
    /// Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global.filter(|p| p.exists()) {
            crate::log_config_debug!("loading global config", path = tracing::field::debug(global_path));
            let contents = std::fs::read_to_string(global_path)?;
            config = toml::from_str(&contents)?;
        }

        if let Some(project_path) = project.filter(|p| p.exists()) {
            crate::log_config_debug!("loading project config", path = tracing::field::debug(project_path));
            let contents = std::fs::read_to_string(project_path)?;
            config.merge_toml(&contents)?;
        }

        Ok(config)
    }

    /// Merge a project config document; keys absent from it keep their value.
    pub fn merge_toml(&mut self, contents: &str) -> Result<(), ConfigError> {
        let overlay: ConfigOverlay = toml::from_str(contents)?;
        let layer = overlay.layer;
        if let Some(level) = layer.log_level {
            self.layer.log_level = level;
        }
        if let Some(debug) = layer.debug {
            self.layer.debug = debug;
        }
        if let Some(passthrough) = layer.passthrough {
            self.layer.passthrough = passthrough;
        }
        if let Some(dump) = layer.dump_log_on_exit {
            self.layer.dump_log_on_exit = dump;
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

impl LayerConfig {
    /// Defaults plus environment overrides, and the values that were
    /// rejected. The caller decides how to report those.
    pub fn from_env() -> (Self, Vec<ConfigError>) {
        let mut cfg = Self::default();
        let rejected = cfg.apply_overrides(|key| std::env::var(key).ok());
        (cfg, rejected)
    }

    /// Apply `VGATE_*` overrides read through `lookup`. Returns the values that
    /// were rejected; the accepted ones are applied regardless.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut rejected = Vec::new();

        if let Some(raw) = lookup(ENV_LOG_LEVEL) {
            match raw.parse::<LogLevel>() {
                Ok(level) => self.log_level = level,
                Err(e) => rejected.push(e),
            }
        }

        let flags: [(&'static str, &mut bool); 3] = [
            (ENV_DEBUG, &mut self.debug),
            (ENV_PASSTHROUGH, &mut self.passthrough),
            (ENV_DUMP_ON_EXIT, &mut self.dump_log_on_exit),
        ];
        for (key, slot) in flags {
            if let Some(raw) = lookup(key) {
                match parse_flag(&raw) {
                    Some(value) => *slot = value,
                    None => rejected.push(ConfigError::InvalidValue { key, value: raw }),
                }
            }
        }

        rejected
    }

    /// Environment a child process needs to reproduce this configuration
    /// inside the layer.
    pub fn layer_env(&self) -> Vec<(String, String)> {
        let flag = |b: bool| String::from(if b { "1" } else { "0" });
        vec![
            (ENV_LOG_LEVEL.to_string(), self.log_level.as_str().to_string()),
            (ENV_DEBUG.to_string(), flag(self.debug)),
            (ENV_PASSTHROUGH.to_string(), flag(self.passthrough)),
            (ENV_DUMP_ON_EXIT.to_string(), flag(self.dump_log_on_exit)),
        ]
    }
}

/// Boolean switch as accepted in environment variables.
pub fn parse_flag(raw: &str) -> Option<bool> {
    flag_value(raw.as_bytes())
}

const FLAG_TRUE: [&[u8]; 4] = [b"1", b"true", b"yes", b"on"];
const FLAG_FALSE: [&[u8]; 5] = [b"", b"0", b"false", b"no", b"off"];

/// [`parse_flag`] over raw bytes, without allocating. Surrounding ASCII
/// whitespace is ignored and matching is case-insensitive. The layer uses
/// this on `getenv` results before the allocator may be touched.
pub fn flag_value(raw: &[u8]) -> Option<bool> {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    let value = &raw[start..end];

    if FLAG_TRUE.iter().any(|word| value.eq_ignore_ascii_case(word)) {
        Some(true)
    } else if FLAG_FALSE.iter().any(|word| value.eq_ignore_ascii_case(word)) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.layer.log_level, LogLevel::Info);
        assert!(!config.layer.debug);
        assert!(!config.layer.passthrough);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[layer]"));
        assert!(toml_str.contains("log_level = \"info\""));
        assert!(toml_str.contains("passthrough = false"));
    }

    #[test]
    fn test_env_overrides_applied() {
        let mut cfg = LayerConfig::default();
        let rejected = cfg.apply_overrides(lookup_in(&[
            (ENV_LOG_LEVEL, "trace"),
            (ENV_DEBUG, "1"),
            (ENV_PASSTHROUGH, "true"),
        ]));
        assert!(rejected.is_empty());
        assert_eq!(cfg.log_level, LogLevel::Trace);
        assert!(cfg.debug);
        assert!(cfg.passthrough);
        assert!(!cfg.dump_log_on_exit);
    }

    #[test]
    fn test_invalid_env_values_are_reported_not_applied() {
        let mut cfg = LayerConfig::default();
        let rejected = cfg.apply_overrides(lookup_in(&[
            (ENV_LOG_LEVEL, "loud"),
            (ENV_PASSTHROUGH, "maybe"),
            (ENV_DEBUG, "on"),
        ]));
        assert_eq!(rejected.len(), 2);
        assert_eq!(cfg.log_level, LogLevel::Info);
        assert!(!cfg.passthrough);
        assert!(cfg.debug);
        assert!(rejected
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidValue { key, .. } if *key == ENV_PASSTHROUGH)));
    }

    #[test]
    fn test_merge_only_touches_present_keys() {
        let mut config = Config::default();
        config.layer.debug = true;
        config.layer.log_level = LogLevel::Warn;
        config
            .merge_toml("[layer]\npassthrough = true\n")
            .unwrap();
        assert!(config.layer.passthrough);
        assert!(config.layer.debug);
        assert_eq!(config.layer.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_layer_env_reproduces_config() {
        let cfg = LayerConfig {
            log_level: LogLevel::Debug,
            debug: true,
            passthrough: false,
            dump_log_on_exit: true,
        };
        let env = cfg.layer_env();
        let mut back = LayerConfig::default();
        let rejected = back.apply_overrides(|key| {
            env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        });
        assert!(rejected.is_empty());
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("YES"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("2"), None);
    }

    #[test]
    fn test_flag_value_matches_parse_flag() {
        for raw in ["1", "On", " yes\t", "TRUE", "0", "off", "  ", "", "2", "maybe", "y", "1 1"] {
            assert_eq!(flag_value(raw.as_bytes()), parse_flag(raw), "{:?}", raw);
        }
        assert_eq!(flag_value(b"\n on \n"), Some(true));
        assert_eq!(flag_value(b"enabled"), None);
    }

    #[test]
    fn test_from_env_reports_rejected_values() {
        // Uses a variable no other test sets
        std::env::set_var(ENV_DUMP_ON_EXIT, "sometimes");
        let (cfg, rejected) = LayerConfig::from_env();
        std::env::remove_var(ENV_DUMP_ON_EXIT);

        assert!(!cfg.dump_log_on_exit);
        assert!(rejected
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidValue { key, .. } if *key == ENV_DUMP_ON_EXIT)));
    }
}
