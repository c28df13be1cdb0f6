//! Configuration types.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use switchyard_telemetry::LogConfig;

/// Top-level configuration document.
///
/// ```toml
/// [router]
/// route_prefix = "/api"
/// prefix_versioning = true
/// enable_child_routes = true
///
/// [logging]
/// level = "info,switchyard::http=info"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwitchyardConfig {
    /// Route registration and dispatch settings.
    pub router: RouterConfig,
    /// Log subscriber settings.
    pub logging: LogConfig,
}

impl SwitchyardConfig {
    /// Development preset: unmasked logs, error detail in responses, pretty
    /// debug logging.
    #[must_use]
    pub fn development() -> Self {
        Self {
            router: RouterConfig::development(),
            logging: LogConfig::development(),
        }
    }

    /// Production preset.
    #[must_use]
    pub fn production() -> Self {
        Self {
            router: RouterConfig::production(),
            logging: LogConfig::production(),
        }
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.router.validate()?;
        switchyard_telemetry::create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        Ok(())
    }
}

/// Router settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Prefix prepended to every route path, e.g. `/api`.
    pub route_prefix: Option<String>,

    /// Insert `/v{version}` after the prefix, using the route's version or 1.
    pub prefix_versioning: bool,

    /// Mask fields annotated as sensitive in request logs.
    pub mask_sensitive_data: bool,

    /// Make GET routes reachable through the child dispatcher.
    pub enable_child_routes: bool,

    /// Include error detail (`stack`) in error bodies.
    pub debug_errors: bool,

    /// Deployment environment name.
    pub environment: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl RouterConfig {
    /// Development preset.
    #[must_use]
    pub fn development() -> Self {
        Self {
            route_prefix: None,
            prefix_versioning: false,
            mask_sensitive_data: false,
            enable_child_routes: false,
            debug_errors: true,
            environment: "development".to_string(),
        }
    }

    /// Production preset. Also the default.
    #[must_use]
    pub fn production() -> Self {
        Self {
            route_prefix: None,
            prefix_versioning: false,
            mask_sensitive_data: true,
            enable_child_routes: false,
            debug_errors: false,
            environment: "production".to_string(),
        }
    }

    /// Sets the route prefix.
    #[must_use]
    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables `/v{version}` path segments.
    #[must_use]
    pub fn with_prefix_versioning(mut self, enabled: bool) -> Self {
        self.prefix_versioning = enabled;
        self
    }

    /// Enables or disables log masking.
    #[must_use]
    pub fn with_mask_sensitive_data(mut self, enabled: bool) -> Self {
        self.mask_sensitive_data = enabled;
        self
    }

    /// Enables or disables the child dispatcher.
    #[must_use]
    pub fn with_child_routes(mut self, enabled: bool) -> Self {
        self.enable_child_routes = enabled;
        self
    }

    /// Enables or disables error detail in responses.
    #[must_use]
    pub fn with_debug_errors(mut self, enabled: bool) -> Self {
        self.debug_errors = enabled;
        self
    }

    /// Checks the prefix shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.route_prefix {
            if !prefix.starts_with('/') {
                return Err(ConfigError::invalid_value(
                    "router.route_prefix",
                    format!("must start with '/': {prefix}"),
                ));
            }
            if prefix.ends_with('/') {
                return Err(ConfigError::invalid_value(
                    "router.route_prefix",
                    format!("must not end with '/': {prefix}"),
                ));
            }
        }
        if self.environment.trim().is_empty() {
            return Err(ConfigError::invalid_value("router.environment", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.route_prefix, None);
        assert!(!config.prefix_versioning);
        assert!(config.mask_sensitive_data);
        assert!(!config.enable_child_routes);
        assert!(!config.debug_errors);
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_development_preset() {
        let config = RouterConfig::development();
        assert!(!config.mask_sensitive_data);
        assert!(config.debug_errors);
    }

    #[test]
    fn test_prefix_validation() {
        assert!(RouterConfig::default().with_route_prefix("/api").validate().is_ok());
        assert!(matches!(
            RouterConfig::default().with_route_prefix("api").validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(RouterConfig::default().with_route_prefix("/api/").validate().is_err());
        assert!(RouterConfig::default().with_route_prefix("/").validate().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<RouterConfig, _> =
            serde_json::from_str(r#"{ "route_prefix": "/api", "prefixVersioning": true }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let mut config = SwitchyardConfig::default();
        config.logging.level = "switchyard=loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }
}
