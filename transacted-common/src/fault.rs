//! Propagatable failures.
//!
//! A [`Fault`] wraps any `std::error::Error` behind an `Arc`, so the same
//! failure can sit on the exchange, be preserved as the caught exception and
//! still be handed back to the caller without cloning the error itself.

use std::{
    any::Any,
    error::Error,
    fmt::{self, Debug, Display},
    sync::Arc,
};

/// A failure raised by a unit of work or a handler processor.
#[derive(Clone)]
pub struct Fault(Arc<dyn Error + Send + Sync + 'static>);

impl Fault {
    /// Wrap an error as a fault.
    ///
    /// Wrapping a `Fault` again returns a clone of it rather than nesting.
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        if let Some(fault) = (&error as &dyn Any).downcast_ref::<Self>() {
            return fault.clone();
        }

        Self(Arc::new(error))
    }

    /// A fault carrying only a message, for callers without a dedicated error type
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// The wrapped error
    pub fn as_error(&self) -> &(dyn Error + 'static) {
        &*self.0
    }

    /// Returns `true` if the wrapped error (not its causes) is an `E`
    pub fn is<E: Error + 'static>(&self) -> bool {
        self.as_error().is::<E>()
    }

    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.as_error().downcast_ref::<E>()
    }

    /// Iterate the wrapped error and its causes, outermost first.
    ///
    /// Any `Fault` found in the chain is replaced by the error it wraps, so
    /// type checks see the original errors rather than the wrapper.
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            next: Some(self.as_error()),
        }
    }

    /// The innermost cause
    pub fn root_cause(&self) -> &(dyn Error + 'static) {
        self.chain().last().unwrap_or_else(|| self.as_error())
    }

    /// Returns `true` if both faults wrap the very same error instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn unwrap_fault<'a>(error: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    match error.downcast_ref::<Fault>() {
        Some(fault) => unwrap_fault(fault.as_error()),
        None => error,
    }
}

/// Iterator over a fault's cause chain, see [`Fault::chain`]
pub struct Chain<'a> {
    next: Option<&'a (dyn Error + 'static)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn Error + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = unwrap_fault(self.next?);
        self.next = current.source();
        Some(current)
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Error for Fault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

#[cfg(test)]
mod tests {
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    #[error("connection reset")]
    struct ConnectionReset;

    #[derive(Debug, Error)]
    #[error("write failed")]
    struct WriteFailed(#[source] ConnectionReset);

    #[derive(Debug, Error)]
    #[error("wrapped: {0}")]
    struct Wrapped(#[source] Fault);

    #[test]
    fn test_type_inspection() {
        let fault = Fault::new(ConnectionReset);
        assert!(fault.is::<ConnectionReset>());
        assert!(!fault.is::<WriteFailed>());
        assert!(fault.downcast_ref::<ConnectionReset>().is_some());
        assert_eq!(fault.to_string(), "connection reset");
    }

    #[test]
    fn test_chain_is_outermost_first() {
        let fault = Fault::new(WriteFailed(ConnectionReset));
        let chain: Vec<String> = fault.chain().map(ToString::to_string).collect();
        assert_eq!(chain, vec!["write failed", "connection reset"]);
        assert!(fault.root_cause().is::<ConnectionReset>());
    }

    #[test]
    fn test_chain_unwraps_nested_faults() {
        let inner = Fault::new(ConnectionReset);
        let outer = Fault::new(Wrapped(inner.clone()));

        let root = outer.root_cause();
        assert!(root.is::<ConnectionReset>());
        assert!(std::ptr::addr_eq(root, inner.as_error()));
        assert_eq!(outer.chain().count(), 2);
    }

    #[test]
    fn test_new_does_not_double_wrap() {
        let fault = Fault::new(ConnectionReset);
        let again = Fault::new(fault.clone());
        assert!(fault.ptr_eq(&again));
        assert!(again.is::<ConnectionReset>());
    }

    #[test]
    fn test_msg() {
        let fault = Fault::msg("boom");
        assert_eq!(fault.to_string(), "boom");
        assert!(fault.as_error().source().is_none());
    }
}
