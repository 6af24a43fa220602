use crate::{TransactionDefinition, TransactionError, TransactionStatus};

/// The begin/commit/rollback primitive.
///
/// Implementations own the physical transaction; callers only see the
/// [`TransactionStatus`] handed out by [`TransactionManager::begin`] and must
/// hand it back to exactly one of `commit` or `rollback`.
pub trait TransactionManager: Send + Sync {
    /// Open a boundary according to the definition's propagation behaviour.
    ///
    /// # Errors
    /// If the propagation cannot be honoured on the calling thread
    fn begin(
        &self,
        definition: &TransactionDefinition,
    ) -> Result<Box<dyn TransactionStatus>, TransactionError>;

    /// Complete the boundary successfully.
    ///
    /// A status marked rollback-only is rolled back instead.
    ///
    /// # Errors
    /// If the status is not one of ours, or the transaction could not commit
    fn commit(&self, status: Box<dyn TransactionStatus>) -> Result<(), TransactionError>;

    /// Roll the boundary back. For a joined transaction this marks the
    /// surrounding transaction rollback-only.
    ///
    /// # Errors
    /// If the status is not one of ours
    fn rollback(&self, status: Box<dyn TransactionStatus>) -> Result<(), TransactionError>;

    /// Shown in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
