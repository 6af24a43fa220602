use std::{
    any::Any,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, ThreadId},
    time::Instant,
};

use dashmap::DashMap;
use parking_lot::Mutex;
use transacted_common::transaction;

use crate::{
    Propagation, TransactionDefinition, TransactionError, TransactionManager, TransactionStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEventKind {
    /// A new transaction was started
    Begin,
    /// A boundary joined an existing transaction
    Join,
    /// The transaction was marked rollback-only
    SetRollbackOnly,
    Commit,
    Rollback,
}

/// Journal entry recorded by [`MemoryTransactionManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionEvent {
    pub transaction_id: u64,
    pub kind: TransactionEventKind,
    pub at: Instant,
}

type Journal = Arc<Mutex<Vec<TransactionEvent>>>;

fn record(journal: &Journal, transaction_id: u64, kind: TransactionEventKind) {
    journal.lock().push(TransactionEvent {
        transaction_id,
        kind,
        at: Instant::now(),
    });
}

#[derive(Debug)]
struct Transaction {
    id: u64,
    /// Set when a participant rolls back, dooming the whole transaction
    rollback_only: AtomicBool,
}

/// Status handed out by [`MemoryTransactionManager`]
#[derive(Debug)]
pub struct MemoryTransactionStatus {
    transaction: Option<Arc<Transaction>>,
    new_transaction: bool,
    rollback_only: AtomicBool,
    completed: AtomicBool,
    thread: ThreadId,
    depth: usize,
    journal: Journal,
}

impl TransactionStatus for MemoryTransactionStatus {
    fn transaction_id(&self) -> Option<u64> {
        self.transaction.as_ref().map(|tx| tx.id)
    }

    fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::Release);
        if let Some(tx) = &self.transaction {
            record(&self.journal, tx.id, TransactionEventKind::SetRollbackOnly);
        }
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Acquire)
            || self
                .transaction
                .as_ref()
                .is_some_and(|tx| tx.rollback_only.load(Ordering::Acquire))
    }

    fn has_transaction(&self) -> Option<bool> {
        Some(self.transaction.is_some())
    }

    fn is_actual_transaction_active(&self) -> bool {
        self.transaction.is_some() && !self.is_completed()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// In-process transaction manager.
///
/// There is no resource behind the transactions; what it provides is correct
/// propagation bookkeeping and a journal of every boundary event, which makes
/// it the reference manager for tests. Each thread has its own stack of open
/// boundaries, so concurrent callers never see each other's transactions.
/// A thread's stack is dropped once its last boundary completes; the journal
/// is kept until [`drain_events`](Self::drain_events) is called.
///
/// `Nested` propagation is not supported.
#[derive(Debug, Default)]
pub struct MemoryTransactionManager {
    next_id: AtomicU64,
    /// Open boundaries per thread; `None` marks a boundary running without a transaction
    stacks: DashMap<ThreadId, Vec<Option<Arc<Transaction>>>>,
    journal: Journal,
}

impl MemoryTransactionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, in order
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.journal.lock().clone()
    }

    /// Remove and return everything recorded so far.
    ///
    /// The journal grows with every boundary; long-running users drain it
    /// periodically.
    pub fn drain_events(&self) -> Vec<TransactionEvent> {
        std::mem::take(&mut *self.journal.lock())
    }

    /// Events for a single transaction, in order
    pub fn events_for(&self, transaction_id: u64) -> Vec<TransactionEventKind> {
        self.journal
            .lock()
            .iter()
            .filter(|event| event.transaction_id == transaction_id)
            .map(|event| event.kind)
            .collect()
    }

    fn count(&self, kind: TransactionEventKind) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    /// Number of physical commits
    pub fn commits(&self) -> usize {
        self.count(TransactionEventKind::Commit)
    }

    /// Number of physical rollbacks
    pub fn rollbacks(&self) -> usize {
        self.count(TransactionEventKind::Rollback)
    }

    /// Number of boundaries currently open on the calling thread
    pub fn open_boundaries(&self) -> usize {
        self.stacks
            .get(&thread::current().id())
            .map_or(0, |stack| stack.len())
    }

    fn current(&self, thread: ThreadId) -> Option<Arc<Transaction>> {
        self.stacks
            .get(&thread)
            .and_then(|stack| stack.last().cloned().flatten())
    }

    fn start_new(&self) -> Arc<Transaction> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        record(&self.journal, id, TransactionEventKind::Begin);
        Arc::new(Transaction {
            id,
            rollback_only: AtomicBool::new(false),
        })
    }

    fn join(&self, transaction: Arc<Transaction>) -> Arc<Transaction> {
        record(&self.journal, transaction.id, TransactionEventKind::Join);
        transaction
    }

    fn push(
        &self,
        thread: ThreadId,
        transaction: Option<Arc<Transaction>>,
        new_transaction: bool,
    ) -> Box<dyn TransactionStatus> {
        let mut stack = self.stacks.entry(thread).or_default();
        let depth = stack.len();
        stack.push(transaction.clone());

        Box::new(MemoryTransactionStatus {
            transaction,
            new_transaction,
            rollback_only: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            thread,
            depth,
            journal: Arc::clone(&self.journal),
        })
    }

    /// Validate and pop the boundary a status belongs to, marking it completed
    fn complete<'a>(
        &self,
        status: &'a dyn TransactionStatus,
    ) -> Result<&'a MemoryTransactionStatus, TransactionError> {
        let status = status
            .as_any()
            .downcast_ref::<MemoryTransactionStatus>()
            .ok_or_else(|| {
                TransactionError::IllegalStatus(
                    "status was not created by a MemoryTransactionManager".to_string(),
                )
            })?;

        if status.is_completed() {
            return Err(TransactionError::IllegalStatus(
                "transaction is already completed".to_string(),
            ));
        }

        let emptied = {
            let Some(mut stack) = self.stacks.get_mut(&status.thread) else {
                return Err(TransactionError::IllegalStatus(
                    "no boundary is open on the status' thread".to_string(),
                ));
            };

            if stack.len() != status.depth + 1 {
                return Err(TransactionError::IllegalStatus(format!(
                    "boundary at depth {} completed while {} boundaries are open",
                    status.depth,
                    stack.len()
                )));
            }

            stack.pop();
            stack.is_empty()
        };

        status.completed.store(true, Ordering::Release);

        // Finished threads must not keep an entry
        if emptied {
            self.stacks.remove_if(&status.thread, |_, stack| stack.is_empty());
        }

        Ok(status)
    }

    fn rollback_status(status: &MemoryTransactionStatus) {
        let Some(tx) = &status.transaction else {
            return;
        };

        if status.new_transaction {
            record(&status.journal, tx.id, TransactionEventKind::Rollback);
            transaction!(level = DEBUG, "Rolled back transaction {}", tx.id);
        } else {
            tx.rollback_only.store(true, Ordering::Release);
            record(&status.journal, tx.id, TransactionEventKind::SetRollbackOnly);
            tracing::debug!(
                transaction_id = tx.id,
                "Participating boundary failed, marking transaction rollback-only"
            );
        }
    }
}

impl TransactionManager for MemoryTransactionManager {
    fn begin(
        &self,
        definition: &TransactionDefinition,
    ) -> Result<Box<dyn TransactionStatus>, TransactionError> {
        let thread = thread::current().id();
        let current = self.current(thread);

        let status = match (definition.propagation, current) {
            (Propagation::Required | Propagation::Supports | Propagation::Mandatory, Some(tx)) => {
                self.push(thread, Some(self.join(tx)), false)
            }
            (Propagation::Required | Propagation::RequiresNew, _) => {
                self.push(thread, Some(self.start_new()), true)
            }
            (Propagation::Mandatory, None) => return Err(TransactionError::NoTransaction),
            (Propagation::Never, Some(_)) => return Err(TransactionError::ExistingTransaction),
            (Propagation::Supports | Propagation::NotSupported | Propagation::Never, _) => {
                self.push(thread, None, false)
            }
            (Propagation::Nested, _) => {
                return Err(TransactionError::UnsupportedPropagation(Propagation::Nested));
            }
        };

        tracing::trace!(
            propagation = %definition.propagation,
            name = definition.name.as_deref().unwrap_or_default(),
            transaction_id = status.transaction_id(),
            new_transaction = status.is_new_transaction(),
            "Opened transaction boundary"
        );

        Ok(status)
    }

    fn commit(&self, status: Box<dyn TransactionStatus>) -> Result<(), TransactionError> {
        let status = self.complete(status.as_ref())?;

        if status.rollback_only.load(Ordering::Acquire) {
            Self::rollback_status(status);
            return Ok(());
        }

        let Some(tx) = &status.transaction else {
            return Ok(());
        };

        if !status.new_transaction {
            // The outermost boundary decides
            return Ok(());
        }

        if tx.rollback_only.load(Ordering::Acquire) {
            record(&status.journal, tx.id, TransactionEventKind::Rollback);
            return Err(TransactionError::UnexpectedRollback(tx.id));
        }

        record(&status.journal, tx.id, TransactionEventKind::Commit);
        transaction!(level = DEBUG, "Committed transaction {}", tx.id);
        Ok(())
    }

    fn rollback(&self, status: Box<dyn TransactionStatus>) -> Result<(), TransactionError> {
        let status = self.complete(status.as_ref())?;
        Self::rollback_status(status);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use super::TransactionEventKind::{Begin, Commit, Join, Rollback, SetRollbackOnly};

    fn definition(propagation: Propagation) -> TransactionDefinition {
        TransactionDefinition::new(propagation)
    }

    #[test]
    fn test_required_starts_and_commits() {
        let manager = MemoryTransactionManager::new();
        let status = manager.begin(&definition(Propagation::Required)).unwrap();

        assert!(status.is_new_transaction());
        assert!(status.is_actual_transaction_active());
        assert_eq!(status.has_transaction(), Some(true));
        assert_eq!(manager.open_boundaries(), 1);

        let id = status.transaction_id().unwrap();
        manager.commit(status).unwrap();

        assert_eq!(manager.events_for(id), vec![Begin, Commit]);
        assert_eq!(manager.open_boundaries(), 0);
    }

    #[test]
    fn test_local_rollback_only_rolls_back_on_commit() {
        let manager = MemoryTransactionManager::new();
        let status = manager.begin(&definition(Propagation::Required)).unwrap();
        let id = status.transaction_id().unwrap();

        status.set_rollback_only();
        manager.commit(status).unwrap();

        assert_eq!(manager.events_for(id), vec![Begin, SetRollbackOnly, Rollback]);
        assert_eq!(manager.commits(), 0);
        assert_eq!(manager.rollbacks(), 1);
    }

    #[test]
    fn test_participant_rollback_dooms_outer_transaction() {
        let manager = MemoryTransactionManager::new();
        let outer = manager.begin(&definition(Propagation::Required)).unwrap();
        let inner = manager.begin(&definition(Propagation::Required)).unwrap();

        assert!(!inner.is_new_transaction());
        assert!(inner.is_actual_transaction_active());
        assert_eq!(inner.transaction_id(), outer.transaction_id());

        let id = outer.transaction_id().unwrap();
        manager.rollback(inner).unwrap();
        assert!(outer.is_rollback_only());

        let result = manager.commit(outer);
        assert!(matches!(result, Err(TransactionError::UnexpectedRollback(tx)) if tx == id));
        assert_eq!(manager.events_for(id), vec![Begin, Join, SetRollbackOnly, Rollback]);
    }

    #[test]
    fn test_requires_new_suspends_outer() {
        let manager = MemoryTransactionManager::new();
        let outer = manager.begin(&definition(Propagation::Required)).unwrap();
        let inner = manager.begin(&definition(Propagation::RequiresNew)).unwrap();

        assert!(inner.is_new_transaction());
        assert_ne!(inner.transaction_id(), outer.transaction_id());

        manager.rollback(inner).unwrap();
        assert!(!outer.is_rollback_only());
        manager.commit(outer).unwrap();

        assert_eq!(manager.commits(), 1);
        assert_eq!(manager.rollbacks(), 1);
    }

    #[test]
    fn test_non_transactional_propagations() {
        let manager = MemoryTransactionManager::new();

        let status = manager.begin(&definition(Propagation::Supports)).unwrap();
        assert_eq!(status.has_transaction(), Some(false));
        assert!(!status.is_new_transaction());
        assert!(!status.is_actual_transaction_active());
        manager.commit(status).unwrap();

        assert!(matches!(
            manager.begin(&definition(Propagation::Mandatory)),
            Err(TransactionError::NoTransaction)
        ));

        let outer = manager.begin(&definition(Propagation::Required)).unwrap();
        assert!(matches!(
            manager.begin(&definition(Propagation::Never)),
            Err(TransactionError::ExistingTransaction)
        ));

        let suspended = manager.begin(&definition(Propagation::NotSupported)).unwrap();
        assert_eq!(suspended.transaction_id(), None);
        manager.commit(suspended).unwrap();
        manager.commit(outer).unwrap();

        assert!(manager.events().iter().all(|event| event.transaction_id == 1));
    }

    #[test]
    fn test_nested_is_unsupported() {
        let manager = MemoryTransactionManager::new();
        assert!(matches!(
            manager.begin(&definition(Propagation::Nested)),
            Err(TransactionError::UnsupportedPropagation(Propagation::Nested))
        ));
    }

    #[test]
    fn test_out_of_order_completion_is_rejected() {
        let manager = MemoryTransactionManager::new();
        let outer = manager.begin(&definition(Propagation::Required)).unwrap();
        let inner = manager.begin(&definition(Propagation::RequiresNew)).unwrap();

        assert!(matches!(
            manager.complete(outer.as_ref()),
            Err(TransactionError::IllegalStatus(_))
        ));
        // The rejected boundary is left untouched and can still complete in order
        assert!(!outer.is_completed());
        assert_eq!(manager.open_boundaries(), 2);

        manager.commit(inner).unwrap();
        manager.commit(outer).unwrap();
        assert_eq!(manager.commits(), 2);
    }

    #[test]
    fn test_finished_threads_leave_no_stack() {
        let manager = Arc::new(MemoryTransactionManager::new());

        let remote = Arc::clone(&manager);
        thread::spawn(move || {
            let status = remote.begin(&definition(Propagation::Required)).unwrap();
            remote.commit(status).unwrap();
        })
        .join()
        .unwrap();

        let status = manager.begin(&definition(Propagation::Supports)).unwrap();
        assert_eq!(manager.stacks.len(), 1);
        manager.commit(status).unwrap();

        assert!(manager.stacks.is_empty());
    }

    #[test]
    fn test_drain_events_empties_journal() {
        let manager = MemoryTransactionManager::new();
        let status = manager.begin(&definition(Propagation::Required)).unwrap();
        manager.commit(status).unwrap();

        let drained: Vec<_> = manager.drain_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(drained, vec![Begin, Commit]);
        assert!(manager.events().is_empty());
        assert_eq!(manager.commits(), 0);
    }

    #[test]
    fn test_foreign_status_is_rejected() {
        struct Foreign;

        impl TransactionStatus for Foreign {
            fn transaction_id(&self) -> Option<u64> {
                None
            }
            fn is_new_transaction(&self) -> bool {
                false
            }
            fn is_completed(&self) -> bool {
                false
            }
            fn set_rollback_only(&self) {}
            fn is_rollback_only(&self) -> bool {
                false
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let manager = MemoryTransactionManager::new();
        assert!(matches!(
            manager.rollback(Box::new(Foreign)),
            Err(TransactionError::IllegalStatus(_))
        ));
    }

    #[test]
    fn test_threads_do_not_share_transactions() {
        let manager = Arc::new(MemoryTransactionManager::new());
        let outer = manager.begin(&definition(Propagation::Required)).unwrap();

        let remote = Arc::clone(&manager);
        let remote_new = thread::spawn(move || {
            let status = remote.begin(&definition(Propagation::Required)).unwrap();
            let new = status.is_new_transaction();
            remote.commit(status).unwrap();
            new
        })
        .join()
        .unwrap();

        assert!(remote_new);
        manager.commit(outer).unwrap();
        assert_eq!(manager.commits(), 2);
    }
}
