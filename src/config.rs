//! Configuration loading.
//!
//! Settings live in `config.json` in the ucon config directory. A missing
//! or unreadable file means defaults; environment variables override
//! whatever the file says.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};

/// Configuration for ucon.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Line rate used when no speed argument is given.
    pub default_speed: u32,
    /// Delay in milliseconds between bytes of a trigger response.
    pub response_pacing_ms: u64,
    /// Start with timestamp prefixes on.
    pub timestamps: bool,
    /// Apply 9600 bps before the target rate at startup.
    pub latch_baseline: bool,
    /// List the trigger rules after loading them at startup.
    pub show_triggers: bool,
    /// Pulse DTR while draining stale input to reset the target board.
    pub auto_reset: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_speed: 115_200,
            response_pacing_ms: 1,
            timestamps: false,
            latch_baseline: true,
            show_triggers: true,
            auto_reset: false,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `UCON_CONFIG_DIR` if set, otherwise the platform config dir
    /// (Linux: `~/.config/ucon`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("UCON_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("ucon"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default config: {e:#}");
            Self::default()
        });
        config.apply_env_overrides();
        config
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            anyhow::bail!("Config file not found");
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_json(&content)
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid config file")
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(speed) = lookup("UCON_DEFAULT_SPEED") {
            if let Ok(speed) = speed.parse::<u32>() {
                self.default_speed = speed;
            }
        }

        if let Some(pacing) = lookup("UCON_PACING_MS") {
            if let Ok(pacing) = pacing.parse::<u64>() {
                self.response_pacing_ms = pacing;
            }
        }

        if let Some(timestamps) = lookup("UCON_TIMESTAMPS") {
            if let Some(enabled) = parse_flag(&timestamps) {
                self.timestamps = enabled;
            }
        }

        if let Some(latch) = lookup("UCON_LATCH_BASELINE") {
            if let Some(enabled) = parse_flag(&latch) {
                self.latch_baseline = enabled;
            }
        }

        if let Some(reset) = lookup("UCON_AUTO_RESET") {
            if let Some(enabled) = parse_flag(&reset) {
                self.auto_reset = enabled;
            }
        }
    }

    /// Inter-byte delay for trigger responses.
    pub fn response_pacing(&self) -> Duration {
        Duration::from_millis(self.response_pacing_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_speed, 115_200);
        assert_eq!(config.response_pacing(), Duration::from_millis(1));
        assert!(!config.timestamps);
        assert!(config.latch_baseline);
        assert!(config.show_triggers);
        assert!(!config.auto_reset);
    }

    #[test]
    fn test_auto_reset_from_json_and_env() {
        let mut config = Config::from_json(r#"{"auto_reset": true}"#).unwrap();
        assert!(config.auto_reset);

        config.apply_overrides(|key| (key == "UCON_AUTO_RESET").then(|| "off".to_string()));
        assert!(!config.auto_reset);

        config.apply_overrides(|key| (key == "UCON_AUTO_RESET").then(|| "1".to_string()));
        assert!(config.auto_reset);
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "UCON_AUTO_RESET" => Some("sometimes".to_string()),
            "UCON_DEFAULT_SPEED" => Some("fast".to_string()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{"default_speed": 9600}"#).unwrap();
        assert_eq!(config.default_speed, 9600);
        assert!(config.latch_baseline);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = Config {
            timestamps: true,
            ..Config::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" On "), Some(true));
        assert_eq!(parse_flag("false"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
