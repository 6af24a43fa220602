use std::any::Any;

/// Handle on the transaction a boundary is running in.
///
/// Different managers know different things about the transaction they hand
/// out, so the "is there really a transaction" question is spread over
/// several methods with conservative defaults. Callers that need a reliable
/// answer should consult all of them.
pub trait TransactionStatus: Any {
    /// Identifier of the underlying transaction, if there is one
    fn transaction_id(&self) -> Option<u64>;

    /// `true` if this boundary started the transaction, rather than joining
    /// one or running without one
    fn is_new_transaction(&self) -> bool;

    /// `true` once the transaction has been committed or rolled back
    fn is_completed(&self) -> bool;

    /// Make sure this transaction can only be rolled back
    fn set_rollback_only(&self);

    fn is_rollback_only(&self) -> bool;

    /// Whether the boundary holds a transaction at all.
    ///
    /// `None` if the implementation cannot tell.
    fn has_transaction(&self) -> Option<bool> {
        None
    }

    /// Whether the calling context reports an actual transaction as active,
    /// as opposed to an empty boundary that merely synchronizes resources.
    fn is_actual_transaction_active(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}
