//! Error types for the transacted-common crate.

use thiserror::Error;

/// Returned by [`Interrupt::sleep`](crate::Interrupt::sleep) when the wait was
/// cut short by [`Interrupt::interrupt`](crate::Interrupt::interrupt).
///
/// The interrupt flag stays set, so whoever owns the handle still observes the
/// cancellation after this error has been dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Interrupted while waiting")]
pub struct Interrupted;
