//! Transactional error handling.
//!
//! A [`TransactionErrorHandler`] wraps a [`Processor`](transacted_common::Processor)
//! in a transaction. Failures are offered to an [`ExceptionPolicyTable`];
//! whatever is not absorbed marks the transaction rollback-only, waits out the
//! [`RedeliveryPolicy`] delay and is returned to the caller, so the transaction
//! rolls back and the surrounding redelivery machinery can try again.
//!
//! ```rust,ignore
//! let handler = TransactionErrorHandlerBuilder::new()
//!     .registry(registry)
//!     .output(route)
//!     .exception_policy(
//!         ExceptionPolicyEntry::on::<ValidationError>()
//!             .handler(dead_letter)
//!             .handled(constant(true)),
//!     )
//!     .redelivery_policy(RedeliveryPolicy::default().with_redelivery_delay(250))
//!     .build()?;
//!
//! handler.start()?;
//! handler.process(&mut exchange)?;
//! ```

mod builder;
mod config;
mod error;
mod handler;
pub mod policy;

pub use builder::TransactionErrorHandlerBuilder;
pub use config::{ErrorHandlerConfig, RollbackLoggingLevel};
pub use error::ErrorHandlerError;
pub use handler::{ServiceState, TransactionErrorHandler};
pub use policy::{
    DelayPattern, ExceptionMatcher, ExceptionPolicyEntry, ExceptionPolicyTable, PolicyError,
    RedeliveryPolicy,
};
