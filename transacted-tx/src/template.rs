use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    Propagation, TransactionDefinition, TransactionError, TransactionManager, TransactionStatus,
};

/// How to run a callback transactionally: a manager plus a definition.
///
/// Cheap to clone and immutable; the manager behind it is shared, not owned.
#[derive(Clone)]
pub struct TransactionTemplate {
    manager: Arc<dyn TransactionManager>,
    definition: TransactionDefinition,
}

impl fmt::Debug for TransactionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionTemplate")
            .field("manager", &self.manager.name())
            .field("definition", &self.definition)
            .finish()
    }
}

impl TransactionTemplate {
    /// A template with [`Propagation::Required`]
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self::with_propagation(manager, Propagation::Required)
    }

    pub fn with_propagation(
        manager: Arc<dyn TransactionManager>,
        propagation: Propagation,
    ) -> Self {
        Self::with_definition(manager, TransactionDefinition::new(propagation))
    }

    pub fn with_definition(
        manager: Arc<dyn TransactionManager>,
        definition: TransactionDefinition,
    ) -> Self {
        Self {
            manager,
            definition,
        }
    }

    #[must_use]
    pub const fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    #[must_use]
    pub const fn propagation(&self) -> Propagation {
        self.definition.propagation
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<dyn TransactionManager> {
        &self.manager
    }

    /// Run `callback` inside a transactional boundary on the calling thread.
    ///
    /// `Ok` commits (a status marked rollback-only is rolled back by the
    /// manager instead); `Err` rolls back and is returned unchanged. A panic
    /// in the callback rolls back and then resumes unwinding, so the boundary
    /// never outlives the call.
    ///
    /// # Errors
    /// The callback's error, or a [`TransactionError`] from the manager
    pub fn execute<T, E, F>(&self, callback: F) -> Result<T, E>
    where
        F: FnOnce(&dyn TransactionStatus) -> Result<T, E>,
        E: From<TransactionError>,
    {
        let status = self.manager.begin(&self.definition)?;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| callback(status.as_ref()))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                tracing::warn!(
                    manager = self.manager.name(),
                    transaction_id = status.transaction_id(),
                    "Callback panicked, rolling back"
                );
                if let Err(rollback) = self.manager.rollback(status) {
                    tracing::error!(
                        manager = self.manager.name(),
                        error = %rollback,
                        "Rollback failed after callback panic"
                    );
                }
                panic::resume_unwind(payload);
            }
        };

        match outcome {
            Ok(value) => {
                self.manager.commit(status)?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = self.manager.rollback(status) {
                    // The callback's error is the one the caller needs to see
                    tracing::error!(
                        manager = self.manager.name(),
                        error = %rollback,
                        "Rollback failed after callback error"
                    );
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{MemoryTransactionManager, TransactionEventKind};

    #[derive(Debug, PartialEq, Eq)]
    enum CallbackError {
        Refused,
        Transaction(String),
    }

    impl From<TransactionError> for CallbackError {
        fn from(error: TransactionError) -> Self {
            Self::Transaction(error.to_string())
        }
    }

    fn template() -> (Arc<MemoryTransactionManager>, TransactionTemplate) {
        let manager = Arc::new(MemoryTransactionManager::new());
        let template = TransactionTemplate::new(manager.clone());
        (manager, template)
    }

    #[test]
    fn test_ok_commits() {
        let (manager, template) = template();

        let value = template
            .execute(|status| {
                assert!(status.is_new_transaction());
                Ok::<_, CallbackError>(42)
            })
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(manager.commits(), 1);
        assert_eq!(manager.rollbacks(), 0);
    }

    #[test]
    fn test_err_rolls_back() {
        let (manager, template) = template();

        let result: Result<(), _> = template.execute(|_| Err(CallbackError::Refused));

        assert_eq!(result, Err(CallbackError::Refused));
        assert_eq!(manager.commits(), 0);
        assert_eq!(manager.rollbacks(), 1);
        assert_eq!(manager.open_boundaries(), 0);
    }

    #[test]
    fn test_rollback_only_without_error() {
        let (manager, template) = template();

        let result = template.execute(|status| {
            status.set_rollback_only();
            Ok::<_, CallbackError>(())
        });

        assert_eq!(result, Ok(()));
        assert_eq!(
            manager.events_for(1),
            vec![
                TransactionEventKind::Begin,
                TransactionEventKind::SetRollbackOnly,
                TransactionEventKind::Rollback
            ]
        );
    }

    #[test]
    fn test_begin_failure_is_converted() {
        let manager = Arc::new(MemoryTransactionManager::new());
        let template = TransactionTemplate::with_propagation(manager, Propagation::Mandatory);

        let result = template.execute(|_| Ok::<_, CallbackError>(()));
        assert!(matches!(result, Err(CallbackError::Transaction(_))));
    }

    #[test]
    fn test_panic_rolls_back_and_frees_the_thread() {
        let (manager, template) = template();

        let panicked = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), CallbackError> = template.execute(|_| panic!("callback exploded"));
        }));

        assert!(panicked.is_err());
        assert_eq!(manager.open_boundaries(), 0);
        assert_eq!(manager.events_for(1), vec![
            TransactionEventKind::Begin,
            TransactionEventKind::Rollback
        ]);

        // The next boundary on this thread starts its own transaction
        template
            .execute(|status| {
                assert!(status.is_new_transaction());
                Ok::<_, CallbackError>(())
            })
            .unwrap();
        assert_eq!(manager.events_for(2), vec![
            TransactionEventKind::Begin,
            TransactionEventKind::Commit
        ]);
    }

    #[test]
    fn test_debug_names_manager() {
        let (_, template) = template();
        let debug = format!("{template:?}");
        assert!(debug.contains("memory"));
        assert!(debug.contains("Required"));
    }
}
