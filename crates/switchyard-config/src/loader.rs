//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;
use switchyard_telemetry::LogFormat;

use crate::{ConfigError, SwitchyardConfig};

/// Configuration loader.
///
/// Layers apply in order, later ones overriding earlier ones:
/// 1. a preset (defaults unless [`with_development`](Self::with_development)
///    or [`with_production`](Self::with_production) is used)
/// 2. files and strings, merged key by key so unset keys keep the preset
/// 3. environment variables `PREFIX__KEY`
///
/// The result is validated by [`load`](Self::load).
///
/// ```
/// use switchyard_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_string("[router]\nroute_prefix = \"/api\"", "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.router.route_prefix.as_deref(), Some("/api"));
/// assert!(config.router.mask_sensitive_data);
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: SwitchyardConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the default configuration.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = SwitchyardConfig::default();
        self
    }

    /// Resets to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = SwitchyardConfig::development();
        self
    }

    /// Resets to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = SwitchyardConfig::production();
        self
    }

    /// Merges a TOML or JSON file, chosen by extension.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        self.with_string(&content, format)
    }

    /// Merges a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges configuration text in `format` (`toml` or `json`).
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        let mut merged = serde_json::to_value(&self.config)?;
        merge(&mut merged, layer);
        self.config = serde_json::from_value(merged)?;
        Ok(self)
    }

    /// Enables `PREFIX__KEY` environment overrides, applied by [`load`](Self::load).
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads a `.env` file into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Applies environment overrides and validates.
    pub fn load(mut self) -> Result<SwitchyardConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without env overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> SwitchyardConfig {
        self.config
    }

    fn apply_env(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(&marker) {
                let name = name.to_string();
                self.apply_env_var(&key, &name, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, var: &str, name: &str, value: &str) -> Result<(), ConfigError> {
        let router = &mut self.config.router;
        let logging = &mut self.config.logging;
        let flag = || parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(var, "expected boolean"));

        match name.split("__").collect::<Vec<_>>().as_slice() {
            ["ROUTE_PREFIX"] | ["ROUTER", "ROUTE_PREFIX"] => {
                router.route_prefix = (!value.is_empty()).then(|| value.to_string());
            }
            ["PREFIX_VERSIONING"] | ["ROUTER", "PREFIX_VERSIONING"] => {
                router.prefix_versioning = flag()?;
            }
            ["MASK_SENSITIVE_DATA"] | ["ROUTER", "MASK_SENSITIVE_DATA"] => {
                router.mask_sensitive_data = flag()?;
            }
            ["ENABLE_CHILD_ROUTES"] | ["ROUTER", "ENABLE_CHILD_ROUTES"] => {
                router.enable_child_routes = flag()?;
            }
            ["DEBUG_ERRORS"] | ["ROUTER", "DEBUG_ERRORS"] => {
                router.debug_errors = flag()?;
            }
            ["ENVIRONMENT"] | ["ROUTER", "ENVIRONMENT"] => {
                router.environment = value.to_string();
            }
            ["LOGGING", "ENABLED"] => logging.enabled = flag()?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(var, "expected 'json' or 'pretty'")),
                };
            }
            // Unrelated variables sharing the prefix.
            _ => {}
        }
        Ok(())
    }
}

fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
