//! Policies consulted when an exchange fails.
//!
//! - [`ExceptionPolicyTable`]: picks the handler for a failure
//! - [`RedeliveryPolicy`]: how long to wait before the rollback goes ahead

pub mod exception;
pub mod redelivery;

pub use exception::{ExceptionMatcher, ExceptionPolicyEntry, ExceptionPolicyTable};
pub use redelivery::{DelayPattern, PolicyError, RedeliveryPolicy};
