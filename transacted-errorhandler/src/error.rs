//! Errors surfaced by the transaction error handler.

use thiserror::Error;
use transacted_common::Fault;
use transacted_tx::{ConfigurationError, TransactionError};

#[derive(Debug, Error)]
pub enum ErrorHandlerError {
    /// The exchange failed and nothing absorbed the failure, so the
    /// transaction was rolled back. `source` is the failure as it stood on
    /// the exchange.
    #[error("Transaction rolled back for exchange {exchange_id}: {source}")]
    RolledBack { exchange_id: String, source: Fault },

    /// The transaction manager could not begin or complete the transaction.
    #[error("Transaction failure: {0}")]
    Transaction(#[from] TransactionError),

    /// No usable transaction template could be resolved.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The configuration could not be read or is invalid.
    #[error("Invalid error handler configuration: {0}")]
    Config(String),
}

impl ErrorHandlerError {
    /// Returns `true` if this is an exchange failure rather than a setup or
    /// transaction manager problem.
    #[must_use]
    pub const fn is_rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack { .. })
    }

    /// Returns `true` if the handler could not be constructed.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Config(_))
    }

    /// The exchange failure that caused the rollback
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::RolledBack { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_rolled_back_keeps_cause() {
        let fault = Fault::new(io::Error::other("disk full"));
        let error = ErrorHandlerError::RolledBack {
            exchange_id: "01J".to_string(),
            source: fault.clone(),
        };

        assert!(error.is_rolled_back());
        assert!(!error.is_configuration());
        assert!(error.fault().is_some_and(|f| f.ptr_eq(&fault)));
        assert_eq!(
            error.to_string(),
            "Transaction rolled back for exchange 01J: disk full"
        );

        let wrapped = Fault::new(error);
        assert!(wrapped.root_cause().is::<io::Error>());
    }

    #[test]
    fn test_configuration_classification() {
        let error = ErrorHandlerError::from(ConfigurationError::MissingTransactionTemplate);
        assert!(error.is_configuration());
        assert!(error.fault().is_none());

        assert!(ErrorHandlerError::Config("bad".to_string()).is_configuration());
        assert!(!ErrorHandlerError::from(TransactionError::NoTransaction).is_configuration());
    }
}
