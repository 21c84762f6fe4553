/*!
 * Error handling for home health analytics operations
 *
 * Every failure the analytics surface can produce is a variant of
 * [`HomeHealthError`]. Lookups, statistical routines, and distance queries
 * return these as values so callers can render a message instead of crashing.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Home health library result type
pub type Result<T> = std::result::Result<T, HomeHealthError>;

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum HomeHealthError {
    /// A requested key (CCN, ZIP code) matched no record
    #[error("{entity} '{key}' not found")]
    NotFound {
        entity: String,
        key: String,
    },

    /// A statistical operation needs more rows than the filtered set holds
    #[error("Insufficient data: {reason}")]
    InsufficientData {
        reason: String,
        required: usize,
        found: usize,
    },

    /// A distance-dependent operation was requested for an entity without coordinates
    #[error("location unavailable for {entity} '{key}'")]
    MissingGeography {
        entity: String,
        key: String,
    },

    /// A caller-supplied identifier failed shape validation
    #[error("Malformed input '{value}': {reason}")]
    MalformedInput {
        value: String,
        reason: String,
    },

    /// An aggregation matched zero reference rows
    #[error("No data: {message}")]
    NoData {
        message: String,
    },

    /// Database file is missing
    #[error("Database not found: {path}")]
    DatabaseNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// A required column is absent from a table
    #[error("Schema mismatch in table '{table}': missing required columns {missing:?}")]
    SchemaMismatch {
        table: String,
        missing: Vec<String>,
    },

    /// SQLite errors
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Export format for result sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    JsonLines,
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::JsonLines => write!(f, "JSON Lines"),
            ExportFormat::Csv => write!(f, "CSV"),
        }
    }
}

impl HomeHealthError {
    /// Create a not-found error for a provider certification number
    pub fn provider_not_found(ccn: &str) -> Self {
        Self::NotFound {
            entity: "provider".to_string(),
            key: ccn.to_string(),
        }
    }

    /// Create a not-found error for a ZIP code
    pub fn zip_not_found(zip: &str) -> Self {
        Self::NotFound {
            entity: "ZIP code".to_string(),
            key: zip.to_string(),
        }
    }

    /// Create a missing-geography error for a provider
    pub fn provider_location_unavailable(ccn: &str) -> Self {
        Self::MissingGeography {
            entity: "provider".to_string(),
            key: ccn.to_string(),
        }
    }

    /// Create a missing-geography error for a ZIP code
    pub fn zip_location_unavailable(zip: &str) -> Self {
        Self::MissingGeography {
            entity: "ZIP code".to_string(),
            key: zip.to_string(),
        }
    }

    /// Create an insufficient-data error with sample size details
    pub fn insufficient_sample(what: &str, required: usize, found: usize) -> Self {
        Self::InsufficientData {
            reason: format!(
                "{} requires at least {} values, found {}",
                what, required, found
            ),
            required,
            found,
        }
    }

    /// Create a malformed ZIP code error explaining what went wrong
    pub fn malformed_zip(value: &str) -> Self {
        let reason = if value.trim().is_empty() {
            "ZIP code cannot be empty".to_string()
        } else if !value.trim().chars().all(|c| c.is_ascii_digit()) {
            "ZIP code must contain only digits".to_string()
        } else {
            format!("ZIP code must be exactly 5 digits, found {}", value.trim().len())
        };

        Self::MalformedInput {
            value: value.to_string(),
            reason,
        }
    }

    /// Create a malformed CCN error explaining what went wrong
    pub fn malformed_ccn(value: &str) -> Self {
        let reason = if value.trim().is_empty() {
            "CCN cannot be empty".to_string()
        } else if value.trim().len() > 6 {
            format!("CCN must be at most 6 characters, found {}", value.trim().len())
        } else {
            "CCN must contain only letters and digits".to_string()
        };

        Self::MalformedInput {
            value: value.to_string(),
            reason,
        }
    }

    /// Create a database-not-found error with a helpful suggestion
    pub fn database_not_found(path: PathBuf) -> Self {
        let suggestion = format!(
            "Check that '{}' exists. Pass --db, set HOMEHEALTH_DATABASE_PATH, \
            or set database_path in the config file.",
            path.display()
        );
        Self::DatabaseNotFound { path, suggestion }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::DatabaseNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::SchemaMismatch { .. } => {
                format!("{}\n\nSuggestion: rebuild the database with the ingestion scripts", self)
            }
            Self::MissingGeography { .. } => {
                format!("{}\n\nNo coordinates are recorded for this entity, so distances cannot be computed", self)
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }
}

// Convenience conversions
impl From<std::io::Error> for HomeHealthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<csv::Error> for HomeHealthError {
    fn from(err: csv::Error) -> Self {
        Self::Export {
            message: err.to_string(),
            format: ExportFormat::Csv,
        }
    }
}

impl From<serde_json::Error> for HomeHealthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Export {
            message: err.to_string(),
            format: ExportFormat::Json,
        }
    }
}

impl From<config::ConfigError> for HomeHealthError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
            suggestion: Some("Check the config file and HOMEHEALTH_* environment variables".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_geography_message() {
        let err = HomeHealthError::provider_location_unavailable("017000");
        assert_eq!(err.to_string(), "location unavailable for provider '017000'");
    }

    #[test]
    fn test_malformed_zip_reason() {
        match HomeHealthError::malformed_zip("12a45") {
            HomeHealthError::MalformedInput { reason, .. } => assert!(reason.contains("only digits")),
            other => panic!("unexpected error: {other:?}"),
        }
        match HomeHealthError::malformed_zip("1234") {
            HomeHealthError::MalformedInput { reason, .. } => assert!(reason.contains("found 4")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_user_message_includes_suggestion() {
        let err = HomeHealthError::database_not_found(PathBuf::from("/nope.db"));
        assert!(err.user_message().contains("Suggestion:"));
    }
}
