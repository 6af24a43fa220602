//! Typed errors for transaction handling and template resolution.
//!
//! - [`TransactionError`]: raised while a transaction is running
//! - [`ConfigurationError`]: raised while resolving a template, before anything runs

use thiserror::Error;

use crate::Propagation;

/// Failures reported by a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `Mandatory` propagation found no transaction to join.
    #[error("No existing transaction found for transaction marked with propagation 'mandatory'")]
    NoTransaction,

    /// `Never` propagation found a transaction.
    #[error("Existing transaction found for transaction marked with propagation 'never'")]
    ExistingTransaction,

    /// The manager does not implement this propagation behaviour.
    #[error("Propagation {0} is not supported by this transaction manager")]
    UnsupportedPropagation(Propagation),

    /// The status was not created by this manager, or was already completed.
    #[error("Illegal transaction status: {0}")]
    IllegalStatus(String),

    /// Commit was requested but a participant had marked the transaction
    /// rollback-only, so it was rolled back instead.
    #[error("Transaction {0} rolled back because it has been marked as rollback-only")]
    UnexpectedRollback(u64),
}

impl TransactionError {
    /// Returns `true` if the transaction was (or will be) rolled back.
    #[must_use]
    pub const fn is_rollback(&self) -> bool {
        matches!(self, Self::UnexpectedRollback(_))
    }
}

/// Failures resolving the transaction template an error handler runs on.
///
/// These are fatal: the error handler is never constructed.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Nothing in the configuration or registry yields a template.
    #[error(
        "No transaction template configured: set one explicitly, or register exactly one \
         transacted policy, transaction template or transaction manager (managers must be \
         bound as Arc<dyn TransactionManager>, see SimpleRegistry::bind_manager)"
    )]
    MissingTransactionTemplate,

    /// More than one candidate of the same kind was found and nothing with
    /// higher priority settled the choice.
    #[error("Found {} {kind} beans ({}); configure one explicitly", .candidates.len(), .candidates.join(", "))]
    AmbiguousConfiguration {
        kind: &'static str,
        candidates: Vec<String>,
    },

    /// A mandatory reference names a bean that does not exist or has the wrong type.
    #[error("No {kind} bean registered under '{name}'")]
    MissingBean { name: String, kind: &'static str },

    /// Both a template and a policy were configured explicitly.
    #[error("Both transaction template '{template}' and transacted policy '{policy}' configured")]
    ConflictingReferences { template: String, policy: String },
}

impl ConfigurationError {
    /// Returns `true` if the error was caused by too many candidates rather
    /// than too few.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::AmbiguousConfiguration { .. } | Self::ConflictingReferences { .. }
        )
    }
}
