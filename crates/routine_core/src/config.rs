//! Engine configuration passed explicitly into services.
//!
//! # Responsibility
//! - Hold evaluation bounds, sweep cadence, pagination and logging settings.
//! - Load configuration from JSON with every field defaulted.
//!
//! # Invariants
//! - There is no process-wide mutable configuration; each service owns a copy.
//! - `validate()` must pass before a config is handed to services.

use crate::logging::{normalize_level, LoggingConfig};
use crate::recurrence::EvaluationLimits;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_ORGANIZER_ROLE: &str = "organizer";
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Background sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    /// Time between two sweep runs. Reminders due before the next run are
    /// dispatched by the current one.
    pub interval_secs: u64,
    /// Move Active routines with no further occurrence to Completed.
    pub auto_complete_exhausted: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            auto_complete_exhausted: true,
        }
    }
}

/// Page size policy for listing queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Complete configuration for the routine engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub evaluation: EvaluationLimits,
    pub sweep: SweepConfig,
    /// Participant role label that grants organizer rights.
    pub organizer_role: String,
    pub pagination: PaginationConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation: EvaluationLimits::default(),
            sweep: SweepConfig::default(),
            organizer_role: DEFAULT_ORGANIZER_ROLE.to_string(),
            pagination: PaginationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document and validates the result.
    ///
    /// Missing fields take their defaults; unknown fields are rejected.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "evaluation.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.evaluation.max_lookahead_years == 0 {
            return Err(ConfigError::Invalid(
                "evaluation.max_lookahead_years must be at least 1".to_string(),
            ));
        }
        if self.sweep.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.organizer_role.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "organizer_role must not be blank".to_string(),
            ));
        }
        let pagination = self.pagination;
        if pagination.default_page_size == 0
            || pagination.default_page_size > pagination.max_page_size
        {
            return Err(ConfigError::Invalid(format!(
                "pagination.default_page_size must be within 1..={}",
                pagination.max_page_size
            )));
        }
        normalize_level(&self.logging.level).map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid engine config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid engine config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig};

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults should validate");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.organizer_role, "organizer");
        assert!(config.sweep.auto_complete_exhausted);
    }

    #[test]
    fn partial_document_overrides_selected_fields() {
        let config = EngineConfig::from_json_str(
            r#"{"evaluation": {"max_iterations": 500}, "sweep": {"interval_secs": 60}}"#,
        )
        .expect("partial config should parse");
        assert_eq!(config.evaluation.max_iterations, 500);
        assert_eq!(config.evaluation.max_lookahead_years, 100);
        assert_eq!(config.sweep.interval_secs, 60);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{"sweep": {"every": 5}}"#)
            .expect_err("unknown field must fail");
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{"pagination": {"default_page_size": 500}}"#)
            .expect_err("page size above max must fail");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_json_str(r#"{"logging": {"level": "loud"}}"#)
            .expect_err("unknown level must fail");
        assert!(err.to_string().contains("unsupported log level"));
    }
}
