use std::fmt;

use crate::Exchange;

/// A boolean test over an exchange, such as an exception policy's
/// handled or `on_when` condition.
pub trait Predicate: Send + Sync {
    fn matches(&self, exchange: &Exchange) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Exchange) -> bool + Send + Sync,
{
    fn matches(&self, exchange: &Exchange) -> bool {
        self(exchange)
    }
}

/// A predicate that ignores the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant(pub bool);

impl Predicate for Constant {
    fn matches(&self, _exchange: &Exchange) -> bool {
        self.0
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[must_use]
pub const fn constant(value: bool) -> Constant {
    Constant(value)
}
