//! Inspector configuration management

use crate::filter::DeviceFilter;
use crate::policy::Consent;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectConfig {
    #[serde(default)]
    pub inspector: InspectorSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    /// Consent policy for permission requests
    #[serde(default)]
    pub permissions: PermissionSettings,
    #[serde(default)]
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorSettings {
    #[serde(default = "InspectorSettings::default_log_level")]
    pub log_level: String,
    /// Run headless (no console prompts)
    #[serde(default)]
    pub service_mode: bool,
    /// Register for hot-plug notifications
    #[serde(default = "InspectorSettings::default_hotplug")]
    pub hotplug: bool,
    /// Quiet period after the last arrival before rescanning
    #[serde(default = "InspectorSettings::default_hotplug_debounce_ms")]
    pub hotplug_debounce_ms: u64,
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            service_mode: false,
            hotplug: Self::default_hotplug(),
            hotplug_debounce_ms: Self::default_hotplug_debounce_ms(),
        }
    }
}

impl InspectorSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_hotplug() -> bool {
        true
    }

    fn default_hotplug_debounce_ms() -> u64 {
        500
    }

    pub fn hotplug_debounce(&self) -> Duration {
        Duration::from_millis(self.hotplug_debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Only these devices are listed (empty = all)
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSettings {
    /// Decision for devices matching neither `allow` nor `deny`
    #[serde(default)]
    pub default: Consent,
    /// Devices granted without asking
    #[serde(default)]
    pub allow: Vec<String>,
    /// Devices always denied (wins over `allow`)
    #[serde(default)]
    pub deny: Vec<String>,
    /// How long `--list` waits for permission outcomes
    #[serde(default = "PermissionSettings::default_timeout")]
    pub permission_timeout_secs: u64,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            default: Consent::default(),
            allow: Vec::new(),
            deny: Vec::new(),
            permission_timeout_secs: Self::default_timeout(),
        }
    }
}

impl PermissionSettings {
    fn default_timeout() -> u64 {
        10
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_secs(self.permission_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub format: OutputFormat,
}

impl InspectConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-inspect/config.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: InspectConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-inspect").join("config.toml")
        } else {
            PathBuf::from(".config/usb-inspect/config.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.inspector.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.inspector.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.inspector.hotplug_debounce_ms > 60_000 {
            return Err(anyhow!(
                "hotplug_debounce_ms must be at most 60000, got {}",
                self.inspector.hotplug_debounce_ms
            ));
        }

        if self.permissions.permission_timeout_secs == 0 {
            return Err(anyhow!("permission_timeout_secs must be greater than 0"));
        }

        DeviceFilter::parse_all(&self.usb.filters).context("Invalid entry in usb.filters")?;
        DeviceFilter::parse_all(&self.permissions.allow)
            .context("Invalid entry in permissions.allow")?;
        DeviceFilter::parse_all(&self.permissions.deny)
            .context("Invalid entry in permissions.deny")?;

        Ok(())
    }
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InspectConfig::default();
        assert_eq!(config.inspector.log_level, "info");
        assert!(config.inspector.hotplug);
        assert_eq!(config.inspector.hotplug_debounce_ms, 500);
        assert_eq!(config.permissions.default, Consent::Ask);
        assert_eq!(config.display.format, OutputFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = InspectConfig::parse("").unwrap();
        assert_eq!(config.inspector.log_level, "info");
        assert_eq!(config.permissions.permission_timeout_secs, 10);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = InspectConfig::default();
        config.inspector.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.inspector.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_limits() {
        let mut config = InspectConfig::default();
        config.inspector.hotplug_debounce_ms = 60_001;
        assert!(config.validate().is_err());

        let mut config = InspectConfig::default();
        config.permissions.permission_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = InspectConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = InspectConfig::parse(&toml_str).unwrap();

        assert_eq!(config.inspector.log_level, parsed.inspector.log_level);
        assert_eq!(config.permissions.default, parsed.permissions.default);
    }

    #[test]
    fn test_expand_path_keeps_absolute() {
        assert_eq!(
            expand_path("/etc/usb-inspect/config.toml"),
            PathBuf::from("/etc/usb-inspect/config.toml")
        );
    }
}
