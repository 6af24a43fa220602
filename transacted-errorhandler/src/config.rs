//! Declarative error handler configuration.
//!
//! ```ron
//! (
//!     transacted_policy: "PROPAGATION_REQUIRES_NEW",
//!     redelivery_policy: (
//!         redelivery_delay_ms: 500,
//!         use_exponential_backoff: true,
//!     ),
//!     rollback_logging_level: Info,
//! )
//! ```
//!
//! Optional fields may be written bare, without `Some(..)`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ErrorHandlerError, RedeliveryPolicy};

/// Level at which transaction rollbacks are logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackLoggingLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    /// Do not log rollbacks at all
    Off,
}

impl RollbackLoggingLevel {
    /// The `tracing` level, `None` for [`RollbackLoggingLevel::Off`]
    #[must_use]
    pub const fn level(self) -> Option<tracing::Level> {
        match self {
            Self::Trace => Some(tracing::Level::TRACE),
            Self::Debug => Some(tracing::Level::DEBUG),
            Self::Info => Some(tracing::Level::INFO),
            Self::Warn => Some(tracing::Level::WARN),
            Self::Error => Some(tracing::Level::ERROR),
            Self::Off => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandlerConfig {
    /// Registry name of the transaction template to use
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transaction_template: Option<String>,

    /// Registry name of the transacted policy to use
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transacted_policy: Option<String>,

    /// Delay before a failed exchange is rolled back. No delay if absent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub redelivery_policy: Option<RedeliveryPolicy>,

    #[serde(default)]
    pub rollback_logging_level: RollbackLoggingLevel,
}

impl ErrorHandlerConfig {
    /// Parse a RON configuration.
    ///
    /// # Errors
    /// [`ErrorHandlerError::Config`] if the text does not parse or the
    /// redelivery policy is invalid
    pub fn from_ron_str(config: &str) -> Result<Self, ErrorHandlerError> {
        let config: Self = ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(config)
            .map_err(|e| ErrorHandlerError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Read and parse a RON configuration file.
    ///
    /// # Errors
    /// [`ErrorHandlerError::Config`] if the file cannot be read, or for the
    /// reasons given in [`ErrorHandlerConfig::from_ron_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ErrorHandlerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ErrorHandlerError::Config(format!(
                "Failed to read config from {}: {e}",
                path.display()
            ))
        })?;

        Self::from_ron_str(&content)
    }

    /// # Errors
    /// [`ErrorHandlerError::Config`] if the redelivery policy is invalid
    pub fn validate(&self) -> Result<(), ErrorHandlerError> {
        if let Some(policy) = &self.redelivery_policy {
            policy
                .validate()
                .map_err(|e| ErrorHandlerError::Config(e.to_string()))?;
        }

        Ok(())
    }
}
