/*!
 * Configuration support for the home health library
 *
 * Settings are layered: built-in defaults, then a TOML file, then
 * `HOMEHEALTH_*` environment variables.
 */

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ExportFormat, HomeHealthError, Result};

/// Database used when neither the caller nor the configuration names one
pub const DEFAULT_DATABASE_PATH: &str = "data/processed/cms_homehealth.db";

/// Prefix for environment overrides, e.g. `HOMEHEALTH_DATABASE_PATH`
pub const ENV_PREFIX: &str = "HOMEHEALTH";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database with `providers` and `zip_county_crosswalk`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Radius for counting nearby providers when classifying deserts
    #[serde(default = "default_radius_miles")]
    pub default_radius_miles: f64,

    /// Minimum Medicare-eligible population for a desert candidate
    #[serde(default = "default_min_medicare_population")]
    pub default_min_medicare_population: u64,

    /// Most providers a ZIP may have in radius and still be a desert
    #[serde(default = "default_max_providers_in_radius")]
    pub default_max_providers_in_radius: usize,

    /// How far from a provider to look for expansion targets
    #[serde(default = "default_expansion_search_radius_miles")]
    pub expansion_search_radius_miles: f64,

    /// Rows shown by list commands
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub default_export_format: ExportFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            default_radius_miles: default_radius_miles(),
            default_min_medicare_population: default_min_medicare_population(),
            default_max_providers_in_radius: default_max_providers_in_radius(),
            expansion_search_radius_miles: default_expansion_search_radius_miles(),
            result_limit: default_result_limit(),
            log_level: default_log_level(),
            default_export_format: ExportFormat::Json,
        }
    }
}

// Default value functions for serde
fn default_radius_miles() -> f64 {
    crate::deserts::DEFAULT_RADIUS_MILES
}

fn default_min_medicare_population() -> u64 {
    crate::deserts::DEFAULT_MIN_MEDICARE_POPULATION
}

fn default_max_providers_in_radius() -> usize {
    crate::deserts::DEFAULT_MAX_PROVIDERS_IN_RADIUS
}

fn default_expansion_search_radius_miles() -> f64 {
    crate::expansion::DEFAULT_SEARCH_RADIUS_MILES
}

fn default_result_limit() -> usize {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer defaults, an optional TOML file and `HOMEHEALTH_*` variables.
    ///
    /// An explicit `file` must exist; when `None`, the default config path is
    /// used if present.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        match file {
            Some(path) => {
                if !path.exists() {
                    return Err(HomeHealthError::Configuration {
                        message: format!("config file not found: {}", path.display()),
                        suggestion: Some("Check the --config path".to_string()),
                    });
                }
                builder = builder.add_source(
                    config::File::from(path).format(config::FileFormat::Toml),
                );
            }
            None => {
                if let Some(path) = Self::default_config_path() {
                    debug!(path = %path.display(), "checking default config file");
                    builder = builder.add_source(
                        config::File::from(path)
                            .format(config::FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file only
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| HomeHealthError::Configuration {
                message: format!("Failed to parse config file: {}", e),
                suggestion: Some("Check that the file is valid TOML format".to_string()),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| HomeHealthError::Configuration {
                message: format!("Failed to serialize config: {}", e),
                suggestion: None,
            })?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/homehealth/config.toml` on Linux or the
    /// platform equivalent elsewhere
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "homehealth")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Explicit path, else the configured one, else [`DEFAULT_DATABASE_PATH`]
    pub fn resolve_database_path(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, value: f64| HomeHealthError::Configuration {
            message: format!("{field} must be a non-negative number, got {value}"),
            suggestion: Some(format!("Set {field} to a value such as 25")),
        };
        if !(self.default_radius_miles.is_finite() && self.default_radius_miles >= 0.0) {
            return Err(invalid("default_radius_miles", self.default_radius_miles));
        }
        if !(self.expansion_search_radius_miles.is_finite() && self.expansion_search_radius_miles >= 0.0) {
            return Err(invalid("expansion_search_radius_miles", self.expansion_search_radius_miles));
        }
        Ok(())
    }
}

/// Builder for customizing configuration
#[derive(Default)]
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn radius_miles(mut self, radius: f64) -> Self {
        self.config.default_radius_miles = radius;
        self
    }

    pub fn min_medicare_population(mut self, min: u64) -> Self {
        self.config.default_min_medicare_population = min;
        self
    }

    pub fn max_providers_in_radius(mut self, max: usize) -> Self {
        self.config.default_max_providers_in_radius = max;
        self
    }

    pub fn expansion_search_radius(mut self, radius: f64) -> Self {
        self.config.expansion_search_radius_miles = radius;
        self
    }

    pub fn result_limit(mut self, limit: usize) -> Self {
        self.config.result_limit = limit;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.log_level = level.to_string();
        self
    }

    pub fn export_format(mut self, format: ExportFormat) -> Self {
        self.config.default_export_format = format;
        self
    }

    pub fn build(self) -> Result<AppConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
