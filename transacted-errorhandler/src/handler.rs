//! The transactional error handler.
//!
//! # State machine
//!
//! ```text
//! Idle ─> TransactionOpen ─┬─> Success ───────────────────────────> Commit ─> Idle
//!                          └─> Failed ─> HandlerDispatch ─┬─> Handled ─> Commit ─> Idle
//!                                                         └─> Unhandled ─> Rollback ─> Idle
//! ```
//!
//! Every exchange runs inside one boundary of the resolved transaction
//! template. A failure (an error returned by the wrapped processor, or one it
//! recorded on the exchange) is offered to the [`ExceptionPolicyTable`]. If
//! the failure is not absorbed, or the exchange was marked rollback-only, the
//! transaction is marked rollback-only, the redelivery delay is waited out
//! *inside* the boundary, and the failure is returned so the template rolls
//! back. Rollback-only without a failure rolls back silently.

use std::{fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use transacted_common::{Exchange, Fault, Processor, handler, transaction};
use transacted_tx::{TransactionStatus, TransactionTemplate};

use crate::{
    ErrorHandlerError, ExceptionPolicyTable, RedeliveryPolicy, RollbackLoggingLevel,
};

/// Lifecycle of a [`TransactionErrorHandler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Started,
    Stopped,
}

/// Whether the boundary really runs in a transaction.
///
/// Managers answer this differently: some only report an actual active
/// transaction, some only whether the boundary started one, and some only
/// whether the status holds one. Any of them is enough.
pub(crate) fn is_transaction_active(status: &dyn TransactionStatus) -> bool {
    status.is_actual_transaction_active()
        || (status.is_new_transaction() && !status.is_completed())
        || (status.has_transaction() == Some(true) && !status.is_completed())
}

/// Runs a processor transactionally and decides between commit and rollback.
///
/// Built with [`TransactionErrorHandlerBuilder`](crate::TransactionErrorHandlerBuilder).
/// Configuration is read-only after construction, so one handler can serve
/// concurrent exchanges on different threads.
pub struct TransactionErrorHandler {
    output: Option<Arc<dyn Processor>>,
    template: TransactionTemplate,
    policies: ExceptionPolicyTable,
    redelivery_policy: Option<RedeliveryPolicy>,
    rollback_logging_level: RollbackLoggingLevel,
    state: Mutex<ServiceState>,
}

impl fmt::Debug for TransactionErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionErrorHandler")
            .field("output", &self.output.is_some())
            .field("template", &self.template)
            .field("policies", &self.policies)
            .field("redelivery_policy", &self.redelivery_policy)
            .field("rollback_logging_level", &self.rollback_logging_level)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl TransactionErrorHandler {
    pub(crate) fn new(
        output: Option<Arc<dyn Processor>>,
        template: TransactionTemplate,
        policies: ExceptionPolicyTable,
        redelivery_policy: Option<RedeliveryPolicy>,
        rollback_logging_level: RollbackLoggingLevel,
    ) -> Self {
        Self {
            output,
            template,
            policies,
            redelivery_policy,
            rollback_logging_level,
            state: Mutex::new(ServiceState::Created),
        }
    }

    #[must_use]
    pub fn output(&self) -> Option<&Arc<dyn Processor>> {
        self.output.as_ref()
    }

    #[must_use]
    pub const fn template(&self) -> &TransactionTemplate {
        &self.template
    }

    #[must_use]
    pub const fn policies(&self) -> &ExceptionPolicyTable {
        &self.policies
    }

    #[must_use]
    pub const fn redelivery_policy(&self) -> Option<&RedeliveryPolicy> {
        self.redelivery_policy.as_ref()
    }

    #[must_use]
    pub const fn rollback_logging_level(&self) -> RollbackLoggingLevel {
        self.rollback_logging_level
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Process `exchange` inside a transaction.
    ///
    /// Without an output processor this does nothing.
    ///
    /// # Errors
    /// - [`ErrorHandlerError::RolledBack`] if the exchange failed and no
    ///   exception policy absorbed the failure
    /// - [`ErrorHandlerError::Transaction`] if the transaction manager failed
    #[tracing::instrument(skip_all, fields(exchange_id = %exchange.id()))]
    pub fn execute(&self, exchange: &mut Exchange) -> Result<(), ErrorHandlerError> {
        let Some(output) = &self.output else {
            return Ok(());
        };

        transaction!(
            level = DEBUG,
            "Transaction begin on {} for exchange {} (redelivered: {})",
            self.template.manager().name(),
            exchange.id(),
            exchange.is_redelivered()
        );

        let result = self
            .template
            .execute(|status| self.process_in_transaction(output.as_ref(), exchange, status));

        match &result {
            Ok(()) if exchange.is_rollback_only() => {
                self.log_rollback(exchange, "marked as rollback only without a failure");
            }
            Ok(()) => transaction!(
                level = DEBUG,
                "Transaction commit for exchange {}",
                exchange.id()
            ),
            Err(ErrorHandlerError::RolledBack { source, .. }) => {
                self.log_rollback(exchange, &format!("caused by: {source}"));
            }
            Err(error) => tracing::error!(
                exchange_id = exchange.id(),
                %error,
                "Transaction failed"
            ),
        }

        result
    }

    fn process_in_transaction(
        &self,
        output: &dyn Processor,
        exchange: &mut Exchange,
        status: &dyn TransactionStatus,
    ) -> Result<(), ErrorHandlerError> {
        let active = is_transaction_active(status);
        if active {
            exchange.set_transacted(true);
        }

        if let Err(fault) = output.process(exchange) {
            exchange.fail(fault);
        }

        if exchange.exception().is_some() {
            self.handle_exception(exchange);
        }

        if exchange.exception().is_none() && !exchange.is_rollback_only() {
            return Ok(());
        }

        let error = exchange
            .exception()
            .cloned()
            .map(|source| ErrorHandlerError::RolledBack {
                exchange_id: exchange.id().to_string(),
                source,
            });

        if active {
            status.set_rollback_only();
            tracing::debug!(
                exchange_id = exchange.id(),
                transaction_id = status.transaction_id(),
                "Marked transaction as rollback only"
            );
        }

        self.delay_before_redelivery(exchange);

        error.map_or(Ok(()), Err)
    }

    /// Offer the exchange's failure to the exception policies.
    fn handle_exception(&self, exchange: &mut Exchange) {
        let Some(fault) = exchange.exception().cloned() else {
            return;
        };
        exchange.set_exception_caught(Some(fault.clone()));

        let Some(entry) = self.policies.lookup(exchange, &fault) else {
            handler!(
                level = DEBUG,
                "No exception policy for exchange {}: {}",
                exchange.id(),
                fault
            );
            return;
        };

        let Some(processor) = entry.handler_processor() else {
            return;
        };

        // The handler starts from a clean exchange and a rewound body
        exchange.set_exception(None);
        exchange.set_rollback_only(false);
        exchange.message_mut().reset_stream_cache();

        if let Err(raised) = processor.process(exchange) {
            exchange.fail(raised);
        }

        if entry.is_handled(exchange) {
            exchange.set_exception_handled(true);
            handler!(
                level = DEBUG,
                "Exception policy handled failure on exchange {}: {}",
                exchange.id(),
                fault
            );
            return;
        }

        if let Some(raised) = exchange.exception().filter(|raised| !raised.ptr_eq(&fault)) {
            tracing::warn!(
                exchange_id = exchange.id(),
                error = %raised,
                original = %fault,
                "Exception policy handler failed, restoring the original failure"
            );
        }

        let caught = exchange.exception_caught().cloned();
        exchange.set_exception(caught);
        exchange.set_rollback_only(true);
    }

    /// Wait out the redelivery delay. An interrupt ends the wait early but
    /// stays raised on the exchange's interrupt handle.
    fn delay_before_redelivery(&self, exchange: &Exchange) {
        let delay_ms = self
            .redelivery_policy
            .as_ref()
            .map_or(0, |policy| policy.delay_for(exchange.redelivery_counter()));

        if delay_ms == 0 {
            return;
        }

        tracing::debug!(
            exchange_id = exchange.id(),
            delay_ms,
            "Sleeping before redelivery"
        );

        if exchange
            .interrupt()
            .sleep(Duration::from_millis(delay_ms))
            .is_err()
        {
            tracing::info!(
                exchange_id = exchange.id(),
                "Interrupted while sleeping before redelivery, rolling back now"
            );
        }
    }

    fn log_rollback(&self, exchange: &Exchange, reason: &str) {
        let id = exchange.id();
        let redelivered = exchange.is_redelivered();

        match self.rollback_logging_level {
            RollbackLoggingLevel::Trace => {
                tracing::trace!(exchange_id = id, redelivered, "Transaction rollback {reason}");
            }
            RollbackLoggingLevel::Debug => {
                tracing::debug!(exchange_id = id, redelivered, "Transaction rollback {reason}");
            }
            RollbackLoggingLevel::Info => {
                tracing::info!(exchange_id = id, redelivered, "Transaction rollback {reason}");
            }
            RollbackLoggingLevel::Warn => {
                tracing::warn!(exchange_id = id, redelivered, "Transaction rollback {reason}");
            }
            RollbackLoggingLevel::Error => {
                tracing::error!(exchange_id = id, redelivered, "Transaction rollback {reason}");
            }
            RollbackLoggingLevel::Off => {}
        }
    }

    /// Every processor this handler owns the lifecycle of, output first
    fn services(&self) -> impl Iterator<Item = &Arc<dyn Processor>> {
        self.output.iter().chain(self.policies.processors())
    }
}

impl Processor for TransactionErrorHandler {
    fn process(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        self.execute(exchange).map_err(Fault::new)
    }

    fn start(&self) -> Result<(), Fault> {
        let mut state = self.state.lock();
        if *state == ServiceState::Started {
            return Ok(());
        }

        let mut started: Vec<&Arc<dyn Processor>> = Vec::new();
        for service in self.services() {
            if let Err(fault) = service.start() {
                // Leave nothing half started
                for service in started.iter().rev() {
                    if let Err(stop) = service.stop() {
                        tracing::warn!(error = %stop, "Failed to stop service after a failed start");
                    }
                }
                tracing::error!(error = %fault, "Transaction error handler failed to start");
                return Err(fault);
            }
            started.push(service);
        }

        *state = ServiceState::Started;
        tracing::debug!(
            manager = self.template.manager().name(),
            policies = self.policies.entries().len(),
            "Transaction error handler started"
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), Fault> {
        let mut state = self.state.lock();
        if *state != ServiceState::Started {
            return Ok(());
        }

        let services: Vec<_> = self.services().collect();
        for service in services.into_iter().rev() {
            service.stop()?;
        }

        *state = ServiceState::Stopped;
        tracing::debug!("Transaction error handler stopped");
        Ok(())
    }
}
