use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How a transactional boundary relates to a transaction already running on
/// the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Propagation {
    /// Join the current transaction, or start one if there is none.
    #[default]
    #[serde(rename = "PROPAGATION_REQUIRED", alias = "required")]
    Required,
    /// Join the current transaction, or run without one.
    #[serde(rename = "PROPAGATION_SUPPORTS", alias = "supports")]
    Supports,
    /// Join the current transaction; fail if there is none.
    #[serde(rename = "PROPAGATION_MANDATORY", alias = "mandatory")]
    Mandatory,
    /// Always start a new transaction, suspending the current one.
    #[serde(rename = "PROPAGATION_REQUIRES_NEW", alias = "requires_new")]
    RequiresNew,
    /// Run without a transaction, suspending the current one.
    #[serde(rename = "PROPAGATION_NOT_SUPPORTED", alias = "not_supported")]
    NotSupported,
    /// Run without a transaction; fail if there is one.
    #[serde(rename = "PROPAGATION_NEVER", alias = "never")]
    Never,
    /// Run in a nested transaction (savepoint) of the current one.
    #[serde(rename = "PROPAGATION_NESTED", alias = "nested")]
    Nested,
}

impl Propagation {
    pub const ALL: [Self; 7] = [
        Self::Required,
        Self::Supports,
        Self::Mandatory,
        Self::RequiresNew,
        Self::NotSupported,
        Self::Never,
        Self::Nested,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Required => "PROPAGATION_REQUIRED",
            Self::Supports => "PROPAGATION_SUPPORTS",
            Self::Mandatory => "PROPAGATION_MANDATORY",
            Self::RequiresNew => "PROPAGATION_REQUIRES_NEW",
            Self::NotSupported => "PROPAGATION_NOT_SUPPORTED",
            Self::Never => "PROPAGATION_NEVER",
            Self::Nested => "PROPAGATION_NESTED",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Propagation {
    type Err = String;

    /// Accepts both `PROPAGATION_REQUIRES_NEW` and `requires_new`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("PROPAGATION_").unwrap_or(&upper);

        Self::ALL
            .into_iter()
            .find(|p| p.name().strip_prefix("PROPAGATION_") == Some(bare))
            .ok_or_else(|| format!("Unknown propagation behaviour: {s}"))
    }
}

/// What a caller asks of a transaction manager when opening a boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    /// Shown in logs
    pub name: Option<String>,
    pub read_only: bool,
}

impl TransactionDefinition {
    #[must_use]
    pub const fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            name: None,
            read_only: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}
