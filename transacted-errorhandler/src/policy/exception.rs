//! Which handler, if any, deals with a given failure.
//!
//! An [`ExceptionPolicyTable`] is an ordered list of [`ExceptionPolicyEntry`]s.
//! Each entry names the failures it applies to with one or more
//! [`ExceptionMatcher`]s, and optionally narrows that with an exchange
//! predicate (`on_when`).
//!
//! # Matching
//!
//! The failure's cause chain is walked innermost cause first. For each error
//! in the chain, entries that match it by exact type are preferred over
//! entries that only match it through a predicate; among equals the entry
//! declared first wins. The first error in the chain that any entry matches
//! decides the result, so at most one entry is ever returned.

use std::{any::type_name, error::Error, fmt, sync::Arc};

use transacted_common::{Exchange, Fault, Predicate, Processor, handler};

type ErrorTest = dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync;

fn is_type<E: Error + 'static>(error: &(dyn Error + 'static)) -> bool {
    error.is::<E>()
}

/// Decides whether an entry applies to one error of a cause chain
#[derive(Clone)]
pub enum ExceptionMatcher {
    /// The error is exactly an `E`
    Type {
        name: &'static str,
        test: fn(&(dyn Error + 'static)) -> bool,
    },
    /// An arbitrary test over the error
    Predicate { name: String, test: Arc<ErrorTest> },
}

impl ExceptionMatcher {
    /// Match errors of exactly type `E`
    #[must_use]
    pub fn of<E: Error + 'static>() -> Self {
        Self::Type {
            name: type_name::<E>(),
            test: is_type::<E>,
        }
    }

    /// Match errors for which `test` returns `true`
    pub fn predicate<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Type { name, .. } => name,
            Self::Predicate { name, .. } => name.as_str(),
        }
    }

    #[must_use]
    pub const fn is_exact(&self) -> bool {
        matches!(self, Self::Type { .. })
    }

    #[must_use]
    pub fn matches(&self, error: &(dyn Error + 'static)) -> bool {
        match self {
            Self::Type { test, .. } => test(error),
            Self::Predicate { test, .. } => test(error),
        }
    }
}

impl fmt::Debug for ExceptionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } => f.debug_tuple("Type").field(name).finish(),
            Self::Predicate { name, .. } => f.debug_tuple("Predicate").field(name).finish(),
        }
    }
}

/// How strongly an entry matched a single error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Strength {
    Predicate,
    Exact,
}

/// One row of an [`ExceptionPolicyTable`].
///
/// Built fluently:
///
/// ```rust,ignore
/// ExceptionPolicyEntry::on::<IllegalState>()
///     .or::<Timeout>()
///     .handler(audit)
///     .handled(constant(true))
/// ```
#[derive(Clone, Default)]
pub struct ExceptionPolicyEntry {
    matchers: Vec<ExceptionMatcher>,
    on_when: Option<Arc<dyn Predicate>>,
    handler: Option<Arc<dyn Processor>>,
    handled: Option<Arc<dyn Predicate>>,
}

impl fmt::Debug for ExceptionPolicyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionPolicyEntry")
            .field("matchers", &self.matchers)
            .field("on_when", &self.on_when.is_some())
            .field("handler", &self.handler.is_some())
            .field("handled", &self.handled.is_some())
            .finish()
    }
}

impl ExceptionPolicyEntry {
    /// An entry for errors of exactly type `E`
    #[must_use]
    pub fn on<E: Error + 'static>() -> Self {
        Self::matching(ExceptionMatcher::of::<E>())
    }

    #[must_use]
    pub fn matching(matcher: ExceptionMatcher) -> Self {
        Self {
            matchers: vec![matcher],
            ..Self::default()
        }
    }

    /// Also apply to errors of exactly type `E`
    #[must_use]
    pub fn or<E: Error + 'static>(self) -> Self {
        self.or_matching(ExceptionMatcher::of::<E>())
    }

    #[must_use]
    pub fn or_matching(mut self, matcher: ExceptionMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Only apply when `predicate` also holds for the exchange
    #[must_use]
    pub fn on_when(mut self, predicate: impl Predicate + 'static) -> Self {
        self.on_when = Some(Arc::new(predicate));
        self
    }

    /// The processor run for a matched failure
    #[must_use]
    pub fn handler(mut self, processor: impl Processor + 'static) -> Self {
        self.handler = Some(Arc::new(processor));
        self
    }

    /// Decides whether the handler absorbed the failure. Without one, the
    /// failure is never considered handled.
    #[must_use]
    pub fn handled(mut self, predicate: impl Predicate + 'static) -> Self {
        self.handled = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn matchers(&self) -> &[ExceptionMatcher] {
        &self.matchers
    }

    #[must_use]
    pub fn handler_processor(&self) -> Option<&Arc<dyn Processor>> {
        self.handler.as_ref()
    }

    #[must_use]
    pub fn has_handled_predicate(&self) -> bool {
        self.handled.is_some()
    }

    /// Evaluate the handled predicate, `false` if there is none
    #[must_use]
    pub fn is_handled(&self, exchange: &Exchange) -> bool {
        self.handled
            .as_ref()
            .is_some_and(|predicate| predicate.matches(exchange))
    }

    fn strength(&self, exchange: &Exchange, error: &(dyn Error + 'static)) -> Option<Strength> {
        let strength = self
            .matchers
            .iter()
            .filter(|matcher| matcher.matches(error))
            .map(|matcher| {
                if matcher.is_exact() {
                    Strength::Exact
                } else {
                    Strength::Predicate
                }
            })
            .max()?;

        self.on_when
            .as_ref()
            .is_none_or(|predicate| predicate.matches(exchange))
            .then_some(strength)
    }
}

/// Ordered exception policies, see the [module docs](self) for matching rules
#[derive(Debug, Clone, Default)]
pub struct ExceptionPolicyTable {
    entries: Vec<ExceptionPolicyEntry>,
}

impl ExceptionPolicyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; earlier entries win ties
    #[must_use]
    pub fn with(mut self, entry: ExceptionPolicyEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: ExceptionPolicyEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[ExceptionPolicyEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every handler processor in the table, in declaration order
    pub fn processors(&self) -> impl Iterator<Item = &Arc<dyn Processor>> {
        self.entries
            .iter()
            .filter_map(ExceptionPolicyEntry::handler_processor)
    }

    /// The entry responsible for `fault` on this exchange, if any
    #[must_use]
    pub fn lookup(&self, exchange: &Exchange, fault: &Fault) -> Option<&ExceptionPolicyEntry> {
        let chain: Vec<_> = fault.chain().collect();

        for error in chain.into_iter().rev() {
            let mut best: Option<(Strength, &ExceptionPolicyEntry)> = None;

            for entry in &self.entries {
                let Some(strength) = entry.strength(exchange, error) else {
                    continue;
                };

                if best.is_none_or(|(current, _)| strength > current) {
                    best = Some((strength, entry));
                }
            }

            if let Some((strength, entry)) = best {
                handler!(
                    "Exception policy {:?} matched {} ({:?})",
                    entry.matchers,
                    error,
                    strength
                );
                return Some(entry);
            }
        }

        None
    }
}
